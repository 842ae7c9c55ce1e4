//! Scenario definitions for the prepared-statement harness.
//!
//! [`catalog`] builds the built-in scenarios from [`CatalogParams`];
//! [`file`] loads additional scenarios from JSON.

pub mod catalog;
pub mod file;
pub mod fixtures;

pub use catalog::CatalogParams;
pub use file::{load_scenarios, parse_scenarios, LoadError};

use stmtprobe_core::Scenario;

/// Look up built-in scenarios by name, preserving the order of `names`.
///
/// # Errors
///
/// Returns the first name that matches no built-in scenario.
pub fn select<'a>(
    scenarios: &'a [Scenario],
    names: &'a [String],
) -> Result<Vec<&'a Scenario>, &'a str> {
    if names.is_empty() {
        return Ok(scenarios.iter().collect());
    }
    names
        .iter()
        .map(|name| {
            scenarios
                .iter()
                .find(|s| &s.name == name)
                .ok_or(name.as_str())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_by_name_in_requested_order() {
        let scenarios = catalog::all(&CatalogParams::default());
        let names = vec!["no-data-read".to_owned(), "update-name".to_owned()];
        let picked = select(&scenarios, &names).unwrap();
        assert_eq!(picked[0].name, "no-data-read");
        assert_eq!(picked[1].name, "update-name");
        assert_eq!(select(&scenarios, &[]).unwrap().len(), scenarios.len());
        let unknown = vec!["nope".to_owned()];
        assert_eq!(select(&scenarios, &unknown), Err("nope"));
    }
}

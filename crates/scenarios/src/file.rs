//! Scenario lists loaded from JSON files.

use std::fs;
use std::path::Path;

use derive_more::{Display, Error, From};
use stmtprobe_core::scenario::error::Error as ScenarioError;
use stmtprobe_core::Scenario;

#[derive(Debug, Display, Error, From)]
pub enum LoadError {
    #[display("cannot read scenario file: {_0}")]
    Io(std::io::Error),
    #[display("malformed scenario file: {_0}")]
    Json(serde_json::Error),
    #[display("scenario `{name}` is invalid: {source}")]
    #[from(ignore)]
    Invalid { name: String, source: ScenarioError },
    #[display("scenario `{_0}` is defined more than once")]
    #[from(ignore)]
    Duplicate(#[error(not(source))] String),
}

/// Parse a JSON array of scenarios and validate each one.
///
/// # Errors
///
/// Returns [`LoadError`] if the JSON is malformed, a scenario name repeats,
/// or any scenario fails [`Scenario::validate`].
pub fn parse_scenarios(json: &str) -> Result<Vec<Scenario>, LoadError> {
    let scenarios: Vec<Scenario> = serde_json::from_str(json)?;
    for (index, scenario) in scenarios.iter().enumerate() {
        scenario.validate().map_err(|source| LoadError::Invalid {
            name: scenario.name.clone(),
            source,
        })?;
        if scenarios[..index].iter().any(|s| s.name == scenario.name) {
            return Err(LoadError::Duplicate(scenario.name.clone()));
        }
    }
    tracing::debug!(count = scenarios.len(), "loaded scenarios");
    Ok(scenarios)
}

/// Read and validate a scenario file.
///
/// # Errors
///
/// See [`parse_scenarios`]; I/O failures are reported as [`LoadError::Io`].
pub fn load_scenarios(path: &Path) -> Result<Vec<Scenario>, LoadError> {
    let json = fs::read_to_string(path)?;
    parse_scenarios(&json)
}

#[cfg(test)]
mod tests {
    use stmtprobe_core::{ExecKind, ParamType, Step, Value};

    use super::*;

    const FILE: &str = r#"[
      {
        "name": "rename",
        "setup": ["drop table if exists dogs"],
        "steps": [
          { "op": "prepare", "handle": "u", "sql": "update dogs set name = ? where id = ?",
            "params": ["text", "integer"] },
          { "op": "bind-execute", "handle": "u", "values": [{ "text": "fido" }, { "int": 1 }],
            "kind": "update" },
          { "op": "deallocate", "target": "all" }
        ],
        "requires": ["sql-deallocate"]
      }
    ]"#;

    #[test]
    fn parses_a_scenario_file() {
        let scenarios = parse_scenarios(FILE).unwrap();
        assert_eq!(scenarios.len(), 1);
        let scenario = &scenarios[0];
        assert_eq!(scenario.name, "rename");
        assert_eq!(
            scenario.steps[0],
            Step::prepare(
                "u",
                "update dogs set name = ? where id = ?",
                &[ParamType::Text, ParamType::Integer]
            )
        );
        assert_eq!(
            scenario.steps[1],
            Step::execute("u", vec![Value::text("fido"), Value::Int(1)], ExecKind::Update)
        );
        assert_eq!(scenario.steps[2], Step::deallocate_all());
    }

    #[test]
    fn rejects_invalid_scenarios() {
        let json = r#"[{ "name": "bad", "steps": [{ "op": "flush-batch", "handle": "x" }] }]"#;
        assert!(matches!(
            parse_scenarios(json),
            Err(LoadError::Invalid { ref name, .. }) if name == "bad"
        ));
    }

    #[test]
    fn rejects_duplicate_names() {
        let json = r#"[{ "name": "a", "steps": [] }, { "name": "a", "steps": [] }]"#;
        assert!(matches!(parse_scenarios(json), Err(LoadError::Duplicate(name)) if name == "a"));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(parse_scenarios("{"), Err(LoadError::Json(_))));
    }
}

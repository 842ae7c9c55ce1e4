use alloc::string::String;
use core::fmt::{Display, Formatter, Result, Write};
use core::time::Duration;

use super::{Observation, Outcome, RunResult, RunStatus};

struct Joined<'a, T>(&'a [T], &'a str);

impl<T: Display> Display for Joined<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(self.1)?;
            }
            write!(f, "{item}")?;
        }
        Ok(())
    }
}

struct Millis(Duration);

impl Display for Millis {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let micros = self.0.as_micros();
        write!(f, "{}.{:03}ms", micros / 1000, micros % 1000)
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Self::Prepared { params } => write!(f, "prepared ({params} params)"),
            Self::Rows { rows } => {
                write!(f, "{} row(s)", rows.len())?;
                for row in rows {
                    write!(f, " [{}]", Joined(row.as_slice(), ", "))?;
                }
                Ok(())
            }
            Self::Updated { count } => write!(f, "{count} row(s) affected"),
            Self::Queued { pending } => write!(f, "queued ({pending} pending)"),
            Self::Batch { counts } => write!(f, "batch [{}]", Joined(counts.as_slice(), ", ")),
            Self::Issued { statements } if statements.is_empty() => f.write_str("nothing issued"),
            Self::Issued { statements } => write!(f, "issued {}", Joined(statements.as_slice(), "; ")),
            Self::Deallocated {
                sent: None,
                ..
            } => f.write_str("deallocated all"),
            Self::Deallocated {
                sent: Some(sent),
                listed_as,
                case_folded,
            } => {
                write!(f, "deallocated {sent}")?;
                if let Some(listed) = listed_as {
                    write!(f, " (listed as {listed})")?;
                }
                if *case_folded {
                    f.write_str(" [case folded]")?;
                }
                Ok(())
            }
            Self::Listing { statements } => {
                write!(f, "{} live statement(s)", statements.len())?;
                for entry in statements {
                    let marker = if entry.internal { " (internal)" } else { "" };
                    write!(f, "\n      {} : {}{marker}", entry.name, entry.statement)?;
                }
                Ok(())
            }
            Self::Session { settings } => {
                for (i, (key, value)) in settings.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}={value}")?;
                }
                Ok(())
            }
            Self::Failed { kind, message } => write!(f, "FAILED {kind}: {message}"),
        }
    }
}

impl Display for Observation {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "[{}] {} {}: {} ({})",
            self.step,
            self.origin,
            self.label,
            self.outcome,
            Millis(self.duration)
        )
    }
}

impl Display for RunStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Aborted { step, kind } => write!(f, "aborted at step {step} ({kind})"),
            Self::Skipped { missing } => write!(f, "skipped (missing {})", Joined(missing.as_slice(), ", ")),
            Self::ConnectFailed { kind, message } => {
                write!(f, "connect failed ({kind}): {message}")
            }
        }
    }
}

/// Render a run as human-readable text, one observation per line.
#[must_use]
pub fn render(result: &RunResult) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "*** {} @ {}: {} ({}) ***",
        result.scenario,
        result.target,
        result.status,
        Millis(result.total_duration())
    );
    for observation in &result.observations {
        let _ = writeln!(output, "  {observation}");
    }
    output
}

#[cfg(test)]
mod tests {
    use alloc::borrow::ToOwned;
    use alloc::vec;

    use super::*;
    use crate::observation::{BatchCount, Cell, ErrorKind, Origin};
    use crate::target::BackendKind;

    fn observation(step: usize, origin: Origin, label: &str, outcome: Outcome) -> Observation {
        Observation {
            step,
            origin,
            label: label.to_owned(),
            outcome,
            duration: Duration::from_micros(1500),
        }
    }

    #[test]
    fn renders_header_and_observations() {
        let result = RunResult {
            scenario: "update-name".to_owned(),
            backend: BackendKind::Postgres,
            target: "postgres@127.0.0.1:5432".to_owned(),
            status: RunStatus::Completed,
            observations: vec![
                observation(0, Origin::Step, "prepare upd", Outcome::Prepared { params: 2 }),
                observation(1, Origin::Step, "update upd", Outcome::Updated { count: 1 }),
                observation(
                    2,
                    Origin::Step,
                    "query sel",
                    Outcome::Rows {
                        rows: vec![vec![Cell::Text("fido".to_owned())]],
                    },
                ),
            ],
        };
        let text = render(&result);
        let lines: vec::Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "*** update-name @ postgres@127.0.0.1:5432: completed (4.500ms) ***"
        );
        assert_eq!(lines[1], "  [0] step prepare upd: prepared (2 params) (1.500ms)");
        assert_eq!(lines[2], "  [1] step update upd: 1 row(s) affected (1.500ms)");
        assert_eq!(lines[3], "  [2] step query sel: 1 row(s) [\"fido\"] (1.500ms)");
    }

    #[test]
    fn renders_batches_and_failures() {
        let batch = Outcome::Batch {
            counts: vec![BatchCount::Rows(1), BatchCount::CountUnknown],
        };
        assert_eq!(alloc::format!("{batch}"), "batch [1, ?]");

        let failed = Outcome::Failed {
            kind: ErrorKind::Execution,
            message: "boom".to_owned(),
        };
        assert_eq!(alloc::format!("{failed}"), "FAILED execution: boom");

        let issued = Outcome::Issued { statements: vec![] };
        assert_eq!(alloc::format!("{issued}"), "nothing issued");
    }
}

//! Positional comparison of two runs of the same scenario.
//!
//! Step `i` of run A is compared only with step `i` of run B. Durations are
//! ignored, as are error messages: two failures of the same kind are treated
//! as equivalent since backends word their errors differently. Runs that were
//! skipped or never connected are not compared at all.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{Display, Formatter, Result as FmtResult, Write};
use core::hash::Hash;

use derive_more::Display;
use hashbrown::HashMap;

use crate::observation::{Observation, Origin, Outcome, RunResult};

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display)]
pub enum DivergenceKind {
    #[display("row-count-mismatch")]
    RowCountMismatch,
    #[display("error-vs-success")]
    ErrorVsSuccess,
    #[display("value-mismatch")]
    ValueMismatch,
    /// Same rows, different order.
    #[display("ordering-mismatch")]
    OrderingMismatch,
    /// One run produced observations for steps the other never reached.
    #[display("length-mismatch")]
    LengthMismatch,
    /// The client libraries issued different statements on their own.
    #[display("implicit-statement-mismatch")]
    ImplicitStatementMismatch,
}

/// A difference between two backends at one step.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    pub step: usize,
    pub kind: DivergenceKind,
    /// Outcome of run A, `None` when A has no observation for the step.
    pub left: Option<Outcome>,
    pub right: Option<Outcome>,
}

impl Display for Divergence {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "step {}: {}", self.step, self.kind)?;
        match &self.left {
            Some(outcome) => write!(f, "\n    A: {outcome}")?,
            None => f.write_str("\n    A: <none>")?,
        }
        match &self.right {
            Some(outcome) => write!(f, "\n    B: {outcome}"),
            None => f.write_str("\n    B: <none>"),
        }
    }
}

/// Observations of one step, split by origin.
#[derive(Default)]
struct StepGroup<'a> {
    implicit: Vec<&'a Outcome>,
    primary: Option<&'a Outcome>,
}

fn group(observations: &[Observation]) -> Vec<StepGroup<'_>> {
    let mut groups: Vec<StepGroup<'_>> = Vec::new();
    for observation in observations {
        if observation.origin == Origin::Rollback {
            continue;
        }
        let step = observation.step;
        while groups.len() <= step {
            groups.push(StepGroup::default());
        }
        match observation.origin {
            Origin::Implicit => groups[step].implicit.push(&observation.outcome),
            Origin::Step | Origin::Setup => groups[step].primary = Some(&observation.outcome),
            Origin::Rollback => {}
        }
    }
    groups
}

fn multiset<T: Eq + Hash>(items: &[T]) -> HashMap<&T, usize> {
    let mut counts = HashMap::with_capacity(items.len());
    for item in items {
        *counts.entry(item).or_insert(0) += 1;
    }
    counts
}

/// Classify a difference between two sequences where order may matter.
fn compare_sequences<T: Eq + Hash>(left: &[T], right: &[T]) -> Option<DivergenceKind> {
    if left == right {
        None
    } else if left.len() != right.len() {
        Some(DivergenceKind::RowCountMismatch)
    } else if multiset(left) == multiset(right) {
        Some(DivergenceKind::OrderingMismatch)
    } else {
        Some(DivergenceKind::ValueMismatch)
    }
}

/// Classify a difference between two step outcomes, `None` if equivalent.
#[must_use]
pub fn classify(left: &Outcome, right: &Outcome) -> Option<DivergenceKind> {
    match (left, right) {
        (Outcome::Failed { kind: a, .. }, Outcome::Failed { kind: b, .. }) => {
            (a != b).then_some(DivergenceKind::ValueMismatch)
        }
        (Outcome::Failed { .. }, _) | (_, Outcome::Failed { .. }) => {
            Some(DivergenceKind::ErrorVsSuccess)
        }
        (Outcome::Rows { rows: a }, Outcome::Rows { rows: b }) => compare_sequences(a, b),
        (Outcome::Updated { count: a }, Outcome::Updated { count: b }) => {
            (a != b).then_some(DivergenceKind::RowCountMismatch)
        }
        (Outcome::Batch { counts: a }, Outcome::Batch { counts: b }) => {
            if a.len() == b.len() {
                (a != b).then_some(DivergenceKind::ValueMismatch)
            } else {
                Some(DivergenceKind::RowCountMismatch)
            }
        }
        (Outcome::Listing { statements: a }, Outcome::Listing { statements: b }) => {
            // statement names are backend-generated; compare by text
            let a: Vec<(&String, bool)> = a.iter().map(|s| (&s.statement, s.internal)).collect();
            let b: Vec<(&String, bool)> = b.iter().map(|s| (&s.statement, s.internal)).collect();
            compare_sequences(&a, &b)
        }
        (
            Outcome::Deallocated {
                sent: sent_a,
                case_folded: folded_a,
                ..
            },
            Outcome::Deallocated {
                sent: sent_b,
                case_folded: folded_b,
                ..
            },
        ) => (sent_a.is_some() != sent_b.is_some() || folded_a != folded_b)
            .then_some(DivergenceKind::ValueMismatch),
        (Outcome::Session { .. }, Outcome::Session { .. }) => {
            // server versions always differ between backends
            None
        }
        (a, b) => (a != b).then_some(DivergenceKind::ValueMismatch),
    }
}

/// Compare two runs of the same scenario step by step.
#[must_use]
pub fn diff(left: &RunResult, right: &RunResult) -> Vec<Divergence> {
    if !comparable(left, right) {
        tracing::debug!(
            scenario = %left.scenario,
            left = %left.status,
            right = %right.status,
            "runs not compared"
        );
        return Vec::new();
    }
    tracing::debug!(
        scenario = %left.scenario,
        left = %left.target,
        right = %right.target,
        "diffing runs"
    );
    let left_groups = group(&left.observations);
    let right_groups = group(&right.observations);
    let mut divergences = Vec::new();

    for (step, (a, b)) in left_groups.iter().zip(right_groups.iter()).enumerate() {
        if a.implicit != b.implicit {
            divergences.push(Divergence {
                step,
                kind: DivergenceKind::ImplicitStatementMismatch,
                left: a.implicit.first().map(|o| (*o).clone()),
                right: b.implicit.first().map(|o| (*o).clone()),
            });
        }
        let kind = match (a.primary, b.primary) {
            (Some(x), Some(y)) => classify(x, y),
            (None, None) => None,
            _ => Some(DivergenceKind::LengthMismatch),
        };
        if let Some(kind) = kind {
            divergences.push(Divergence {
                step,
                kind,
                left: a.primary.cloned(),
                right: b.primary.cloned(),
            });
        }
    }

    if left_groups.len() != right_groups.len() {
        let step = left_groups.len().min(right_groups.len());
        divergences.push(Divergence {
            step,
            kind: DivergenceKind::LengthMismatch,
            left: left_groups.get(step).and_then(|g| g.primary.cloned()),
            right: right_groups.get(step).and_then(|g| g.primary.cloned()),
        });
    }
    divergences
}

/// Whether both runs executed their steps, so that their observations can
/// be compared.
#[must_use]
pub const fn comparable(left: &RunResult, right: &RunResult) -> bool {
    left.status.executed() && right.status.executed()
}

/// Render the divergences between two runs of one scenario.
#[must_use]
pub fn render_divergences(left: &RunResult, right: &RunResult, divergences: &[Divergence]) -> String {
    let mut output = String::new();
    if !comparable(left, right) {
        let _ = writeln!(
            output,
            "*** {}: A={} B={}: not compared (A {}, B {}) ***",
            left.scenario, left.target, right.target, left.status, right.status
        );
        return output;
    }
    let _ = writeln!(
        output,
        "*** {}: A={} B={}: {} divergence(s) ***",
        left.scenario,
        left.target,
        right.target,
        divergences.len()
    );
    for divergence in divergences {
        let _ = writeln!(output, "  {divergence}");
    }
    output
}

#[cfg(test)]
mod tests {
    use alloc::borrow::ToOwned;
    use alloc::vec;

    use super::*;
    use crate::observation::{Cell, ErrorKind, ListedStatement};

    fn rows(values: &[&[i64]]) -> Outcome {
        Outcome::Rows {
            rows: values
                .iter()
                .map(|r| r.iter().copied().map(Cell::Int).collect())
                .collect(),
        }
    }

    fn failed(kind: ErrorKind, message: &str) -> Outcome {
        Outcome::Failed {
            kind,
            message: message.to_owned(),
        }
    }

    #[test]
    fn equal_rows_do_not_diverge() {
        assert_eq!(classify(&rows(&[&[1], &[2]]), &rows(&[&[1], &[2]])), None);
    }

    #[test]
    fn reordered_rows_are_an_ordering_mismatch() {
        assert_eq!(
            classify(&rows(&[&[1], &[2]]), &rows(&[&[2], &[1]])),
            Some(DivergenceKind::OrderingMismatch)
        );
    }

    #[test]
    fn different_rows_are_value_or_count_mismatches() {
        assert_eq!(
            classify(&rows(&[&[1], &[2]]), &rows(&[&[1], &[3]])),
            Some(DivergenceKind::ValueMismatch)
        );
        assert_eq!(
            classify(&rows(&[&[1]]), &rows(&[])),
            Some(DivergenceKind::RowCountMismatch)
        );
        // duplicates matter
        assert_eq!(
            classify(&rows(&[&[1], &[1], &[2]]), &rows(&[&[1], &[2], &[2]])),
            Some(DivergenceKind::ValueMismatch)
        );
    }

    #[test]
    fn failures_compare_by_kind_only() {
        assert_eq!(
            classify(
                &failed(ErrorKind::Execution, "duplicate key"),
                &failed(ErrorKind::Execution, "Duplicate entry")
            ),
            None
        );
        assert_eq!(
            classify(&failed(ErrorKind::Prepare, "x"), &failed(ErrorKind::Execution, "x")),
            Some(DivergenceKind::ValueMismatch)
        );
        assert_eq!(
            classify(&failed(ErrorKind::Execution, "x"), &Outcome::Updated { count: 1 }),
            Some(DivergenceKind::ErrorVsSuccess)
        );
    }

    #[test]
    fn update_counts_are_row_count_mismatches() {
        assert_eq!(
            classify(&Outcome::Updated { count: 1 }, &Outcome::Updated { count: 0 }),
            Some(DivergenceKind::RowCountMismatch)
        );
    }

    #[test]
    fn listing_ignores_generated_names() {
        let listing = |name: &str| Outcome::Listing {
            statements: vec![ListedStatement {
                name: name.to_owned(),
                statement: "select name from dogs where id = $1".to_owned(),
                internal: false,
            }],
        };
        assert_eq!(classify(&listing("sqlx_s_1"), &listing("S_1")), None);
    }
}

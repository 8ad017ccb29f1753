//! Result records crossing the fan-out process boundary.
//!
//! Children never ship panics or exception objects to the parent;
//! everything arrives as one of these explicit tagged records, one
//! JSON line each on the child's stdout.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One record from a fan-out child.
///
/// The parent distinguishes "done" from "failed" from "data" purely by
/// the tag, never by inspecting payload contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartialResult {
    /// A chunk of computed output for one parameter set.
    Payload { task_id: usize, payload: Value },
    /// The child caught a computation failure.
    Error {
        task_id: usize,
        kind: String,
        message: String,
    },
    /// Per-task completion sentinel. Always the child's last record,
    /// emitted on success and failure alike.
    Done { task_id: usize },
}

impl PartialResult {
    /// The parameter set this record originated from.
    pub fn task_id(&self) -> usize {
        match self {
            PartialResult::Payload { task_id, .. }
            | PartialResult::Error { task_id, .. }
            | PartialResult::Done { task_id } => *task_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_distinguishes_variants() {
        let done = serde_json::to_value(PartialResult::Done { task_id: 3 }).unwrap();
        assert_eq!(done["type"], "done");

        let err = serde_json::to_value(PartialResult::Error {
            task_id: 1,
            kind: "numeric".into(),
            message: "diverged".into(),
        })
        .unwrap();
        assert_eq!(err["type"], "error");
        assert_eq!(err["kind"], "numeric");
        assert_eq!(err["task_id"], 1);
    }

    #[test]
    fn line_roundtrip() {
        let rec = PartialResult::Payload {
            task_id: 0,
            payload: serde_json::json!({"t": 0.1, "v": -65.0}),
        };
        let line = serde_json::to_string(&rec).unwrap();
        assert_eq!(serde_json::from_str::<PartialResult>(&line).unwrap(), rec);
    }
}

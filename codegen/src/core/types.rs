//! Shared deterministic types for the code generation loop.
//!
//! These types define stable contracts between the planner, the worker and the
//! orchestrator. They carry no I/O and serialize to the same JSON shape the
//! record store persists.

use serde::{Deserialize, Serialize};

/// Lowest score a review may carry.
pub const MIN_REVIEW_SCORE: i64 = 0;
/// Highest score a review may carry.
pub const MAX_REVIEW_SCORE: i64 = 10;

/// Ordered steps for the next generation iteration plus the files they touch.
///
/// `file_paths` are repository-relative and may name files that do not exist
/// yet (files the diff is expected to create).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    pub steps: Vec<String>,
    pub file_paths: Vec<String>,
}

impl Plan {
    pub fn new(steps: Vec<String>, file_paths: Vec<String>) -> Self {
        Self { steps, file_paths }
    }

    /// A plan without steps means there is nothing left to do.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Scored critique of the most recent diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Review {
    /// Score in `MIN_REVIEW_SCORE..=MAX_REVIEW_SCORE`.
    pub score: i64,
    pub comment: String,
}

impl Review {
    pub fn new(score: i64, comment: impl Into<String>) -> Self {
        Self {
            score,
            comment: comment.into(),
        }
    }

    pub fn meets(&self, threshold: i64) -> bool {
        self.score >= threshold
    }
}

/// Immutable snapshot of one loop iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub plan: Option<Plan>,
    pub review: Option<Review>,
    /// Diff produced in this iteration; `None` for the terminal snapshot.
    pub code_diff: Option<String>,
}

/// Final outcome of an orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeGenResult {
    /// Diff from the last productive iteration (empty if none ran).
    pub code_diff: String,
    /// True when the loop stopped because the attempt budget ran out.
    pub exceeded_max_attempts: bool,
    /// Iteration snapshots, most recent first.
    pub history: Vec<HistoryItem>,
}

/// Structured payload the planner backend must return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlannerOutput {
    pub review: Option<Review>,
    pub plan: Option<Plan>,
}

/// Structured payload the worker backend must return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerOutput {
    pub code_diff: String,
}

/// Why the orchestration loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The review met the success threshold.
    Accepted,
    /// The planner had no further steps (or no plan at all).
    NothingToDo,
    /// The attempt budget was exceeded.
    Exhausted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_item_serializes_nulls() {
        let item = HistoryItem {
            plan: Some(Plan::new(vec!["Step1".to_string()], vec!["path1".to_string()])),
            review: None,
            code_diff: None,
        };
        let json = serde_json::to_string(&item).expect("serialize");
        assert_eq!(
            json,
            r#"{"plan":{"steps":["Step1"],"file_paths":["path1"]},"review":null,"code_diff":null}"#
        );
    }

    #[test]
    fn planner_output_rejects_unknown_fields() {
        let raw = r#"{"review":null,"plan":null,"extra":1}"#;
        assert!(serde_json::from_str::<PlannerOutput>(raw).is_err());
    }

    #[test]
    fn review_threshold_is_inclusive() {
        assert!(Review::new(7, "ok").meets(7));
        assert!(!Review::new(6, "meh").meets(7));
    }
}

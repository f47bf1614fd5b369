//! Agent abstractions for planning and diff generation.
//!
//! The orchestrator talks to the [`Planner`] and [`Worker`] traits. The
//! production agents render a prompt, call a [`CompletionService`] and decode
//! the first choice against the agent's JSON Schema.
//!
//! [`CompletionService`]: crate::io::completion::CompletionService

use anyhow::Result;
use jsonschema::Draft;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::types::{Plan, Review};
use crate::error::{ApiOrigin, CodegenError};
use crate::io::completion::{Completion, OutputSchema};

pub mod planner;
pub mod worker;

/// Everything the planner sees in one iteration.
#[derive(Debug, Clone)]
pub struct PlanningInput<'a> {
    pub prompt: &'a str,
    /// Rendered repository file map.
    pub file_map: &'a str,
    /// Diff from the previous iteration, empty on the first.
    pub code_diff: &'a str,
    /// Steps from the previous iteration, empty on the first.
    pub steps: &'a [String],
}

/// Reviews the previous diff and plans the next iteration.
pub trait Planner {
    /// Return the review (if any) and the plan (if more work is warranted).
    ///
    /// Fails with [`CodegenError::Api`] when the backend yields no result or a
    /// payload that does not decode.
    fn review_and_plan(&self, input: &PlanningInput<'_>) -> Result<(Option<Review>, Option<Plan>)>;
}

/// Produces a diff for one content chunk.
///
/// Implementations are shared across threads when chunks run in parallel.
pub trait Worker: Sync {
    fn generate_diff(&self, chunk: &str, steps: &[String]) -> Result<String>;
}

impl<T: Planner + ?Sized> Planner for &T {
    fn review_and_plan(&self, input: &PlanningInput<'_>) -> Result<(Option<Review>, Option<Plan>)> {
        (**self).review_and_plan(input)
    }
}

impl<T: Worker + ?Sized> Worker for &T {
    fn generate_diff(&self, chunk: &str, steps: &[String]) -> Result<String> {
        (**self).generate_diff(chunk, steps)
    }
}

/// Decode the first choice of `completion` as `T`.
///
/// The payload must parse as JSON, validate against `schema` (Draft 2020-12)
/// and deserialize. Any failure is reported as the origin's decode error; an
/// empty choice list is reported as "no result".
pub(crate) fn decode_first_choice<T: DeserializeOwned>(
    completion: &Completion,
    schema: &OutputSchema,
    origin: ApiOrigin,
) -> Result<T> {
    let Some(raw) = completion.first() else {
        warn!(origin = origin.as_str(), "completion returned no choices");
        return Err(CodegenError::no_result(origin).into());
    };

    let value: Value = serde_json::from_str(raw).map_err(|err| {
        warn!(origin = origin.as_str(), error = %err, "completion payload is not JSON");
        CodegenError::undecodable(origin)
    })?;

    let validator = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema.schema)
        .map_err(|err| anyhow::anyhow!("compile {} schema: {err}", schema.name))?;
    let messages: Vec<String> = validator
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        warn!(
            origin = origin.as_str(),
            errors = %messages.join("; "),
            "completion payload failed schema validation"
        );
        return Err(CodegenError::undecodable(origin).into());
    }

    let decoded = serde_json::from_value(value).map_err(|err| {
        warn!(origin = origin.as_str(), error = %err, "completion payload did not deserialize");
        CodegenError::undecodable(origin)
    })?;
    debug!(origin = origin.as_str(), "decoded completion payload");
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::WorkerOutput;

    fn worker_schema() -> OutputSchema {
        worker::worker_schema().expect("schema")
    }

    fn api_message(err: &anyhow::Error) -> String {
        let typed = err.downcast_ref::<CodegenError>().expect("typed error");
        assert!(typed.is_api());
        typed.to_string()
    }

    #[test]
    fn decodes_valid_payload() {
        let completion = Completion::single(r#"{"code_diff":"diff"}"#);
        let output: WorkerOutput =
            decode_first_choice(&completion, &worker_schema(), ApiOrigin::Worker).expect("decode");
        assert_eq!(output.code_diff, "diff");
    }

    #[test]
    fn empty_choices_is_no_result() {
        let err = decode_first_choice::<WorkerOutput>(
            &Completion::default(),
            &worker_schema(),
            ApiOrigin::Worker,
        )
        .unwrap_err();
        assert_eq!(api_message(&err), "Failed to get code diff from API");
    }

    #[test]
    fn malformed_json_is_undecodable() {
        let err = decode_first_choice::<WorkerOutput>(
            &Completion::single("{not json"),
            &worker_schema(),
            ApiOrigin::Worker,
        )
        .unwrap_err();
        assert_eq!(
            api_message(&err),
            "Failed to decode codegen worker JSON response from API"
        );
    }

    #[test]
    fn schema_violation_is_undecodable() {
        let err = decode_first_choice::<WorkerOutput>(
            &Completion::single(r#"{"code_diff": 3}"#),
            &worker_schema(),
            ApiOrigin::Worker,
        )
        .unwrap_err();
        assert_eq!(
            api_message(&err),
            "Failed to decode codegen worker JSON response from API"
        );
    }
}

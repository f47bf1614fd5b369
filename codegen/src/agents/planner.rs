//! Planner agent: review the previous diff and plan the next iteration.

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::decision::accept_planner_output;
use crate::core::types::{Plan, PlannerOutput, Review};
use crate::error::ApiOrigin;
use crate::io::completion::{CompletionRequest, CompletionService, OutputSchema};
use crate::io::prompt::{PlannerPromptInputs, PromptBuilder};

use super::{Planner, PlanningInput, decode_first_choice};

const PLANNER_OUTPUT_SCHEMA: &str = include_str!("../../schemas/planner_output.schema.json");
const PLANNER_FUNCTION: &str = "get_codegen_review_and_plan";
const PLANNER_DESCRIPTION: &str =
    "Generate a review and plan for implementing a code diff based on the provided fields.";

pub fn planner_schema() -> Result<OutputSchema> {
    OutputSchema::from_json(PLANNER_FUNCTION, PLANNER_DESCRIPTION, PLANNER_OUTPUT_SCHEMA)
}

/// Configuration for a planner-agent invocation.
#[derive(Debug, Clone)]
pub struct PlannerAgentConfig {
    pub success_score_threshold: i64,
    pub prompt_budget_bytes: usize,
    pub timeout: Duration,
}

/// Planner backed by a completion service.
#[derive(Debug)]
pub struct PlannerAgent<C> {
    completion: C,
    schema: OutputSchema,
    config: PlannerAgentConfig,
}

impl<C: CompletionService> PlannerAgent<C> {
    pub fn new(completion: C, config: PlannerAgentConfig) -> Result<Self> {
        Ok(Self {
            completion,
            schema: planner_schema()?,
            config,
        })
    }
}

impl<C: CompletionService> Planner for PlannerAgent<C> {
    #[instrument(skip_all, fields(steps = input.steps.len(), diff_bytes = input.code_diff.len()))]
    fn review_and_plan(&self, input: &PlanningInput<'_>) -> Result<(Option<Review>, Option<Plan>)> {
        let prompt = PromptBuilder::new(self.config.prompt_budget_bytes)
            .build_planner(&PlannerPromptInputs {
                prompt: input.prompt,
                file_map: input.file_map,
                code_diff: input.code_diff,
                steps: input.steps,
                threshold: self.config.success_score_threshold,
            })?
            .render();

        let completion = self.completion.complete(&CompletionRequest {
            prompt,
            schema: self.schema.clone(),
            timeout: self.config.timeout,
        })?;
        let output: PlannerOutput =
            decode_first_choice(&completion, &self.schema, ApiOrigin::Planner)?;

        let (review, plan) = accept_planner_output(output, self.config.success_score_threshold);
        debug!(
            score = review.as_ref().map(|r| r.score),
            steps = plan.as_ref().map(|p| p.steps.len()),
            "planner decided"
        );
        Ok((review, plan))
    }
}

//! Worker agent: turn one content chunk plus the planned steps into a diff.

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::types::WorkerOutput;
use crate::error::ApiOrigin;
use crate::io::completion::{CompletionRequest, CompletionService, OutputSchema};
use crate::io::prompt::{PromptBuilder, WorkerPromptInputs};

use super::{Worker, decode_first_choice};

const WORKER_OUTPUT_SCHEMA: &str = include_str!("../../schemas/worker_output.schema.json");
const WORKER_FUNCTION: &str = "get_codegen_code_diff";
const WORKER_DESCRIPTION: &str = "Generate a code diff for the provided code chunk based on the provided steps. Return an empty string if no code diff is needed.";

pub fn worker_schema() -> Result<OutputSchema> {
    OutputSchema::from_json(WORKER_FUNCTION, WORKER_DESCRIPTION, WORKER_OUTPUT_SCHEMA)
}

#[derive(Debug, Clone)]
pub struct WorkerAgentConfig {
    pub prompt_budget_bytes: usize,
    pub timeout: Duration,
}

/// Worker backed by a completion service.
#[derive(Debug)]
pub struct WorkerAgent<C> {
    completion: C,
    schema: OutputSchema,
    config: WorkerAgentConfig,
}

impl<C: CompletionService> WorkerAgent<C> {
    pub fn new(completion: C, config: WorkerAgentConfig) -> Result<Self> {
        Ok(Self {
            completion,
            schema: worker_schema()?,
            config,
        })
    }
}

impl<C: CompletionService> Worker for WorkerAgent<C> {
    #[instrument(skip_all, fields(chunk_chars = chunk.chars().count(), steps = steps.len()))]
    fn generate_diff(&self, chunk: &str, steps: &[String]) -> Result<String> {
        let prompt = PromptBuilder::new(self.config.prompt_budget_bytes)
            .build_worker(&WorkerPromptInputs { chunk, steps })?
            .render();

        let completion = self.completion.complete(&CompletionRequest {
            prompt,
            schema: self.schema.clone(),
            timeout: self.config.timeout,
        })?;
        let output: WorkerOutput = decode_first_choice(&completion, &self.schema, ApiOrigin::Worker)?;
        debug!(diff_bytes = output.code_diff.len(), "worker produced diff");
        Ok(output.code_diff)
    }
}

//! Bounded plan → generate → review loop.
//!
//! One run owns one [`Workspace`]. Each iteration asks the planner to review
//! the latest diff and plan more work; if the loop continues, the planned
//! files are fetched, chunked and handed to the worker, and the joined
//! fragments become the next diff. History is kept most recent first.

use std::path::PathBuf;
use std::thread;

use anyhow::{Result, anyhow};
use tracing::{debug, info, info_span, instrument};

use crate::agents::{Planner, PlanningInput, Worker};
use crate::core::chunker::Chunker;
use crate::core::decision::stop_reason;
use crate::core::fingerprint::fingerprint;
use crate::core::types::{CodeGenResult, HistoryItem};
use crate::io::config::CodegenConfig;
use crate::io::source::SourceProvider;
use crate::io::workspace::Workspace;

/// File map lines shown to the planner before eliding the rest.
const FILE_MAP_MAX_LINES: usize = 2_000;

/// Loop settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_planning_attempts: u32,
    pub success_score_threshold: i64,
    pub max_chunk_chars: usize,
    pub workspace_base_dir: PathBuf,
    pub parallel_workers: bool,
}

impl From<&CodegenConfig> for OrchestratorConfig {
    fn from(config: &CodegenConfig) -> Self {
        Self {
            max_planning_attempts: config.max_planning_attempts,
            success_score_threshold: config.success_score_threshold,
            max_chunk_chars: config.max_chunk_chars,
            workspace_base_dir: config.workspace_base_dir.clone(),
            parallel_workers: config.parallel_workers,
        }
    }
}

/// Drives one code generation run over injected collaborators.
pub struct Orchestrator<S, P, W> {
    source: S,
    planner: P,
    worker: W,
    config: OrchestratorConfig,
}

impl<S: SourceProvider, P: Planner, W: Worker> Orchestrator<S, P, W> {
    pub fn new(source: S, planner: P, worker: W, config: OrchestratorConfig) -> Self {
        Self {
            source,
            planner,
            worker,
            config,
        }
    }

    /// Run the loop for `source_ref` and `prompt`.
    ///
    /// Fails with `CodegenError::InvalidReference` before creating anything if
    /// the reference is rejected, and propagates planner or worker errors
    /// after the workspace is released.
    #[instrument(skip_all, fields(source_ref = %source_ref))]
    pub fn run(&self, source_ref: &str, prompt: &str) -> Result<CodeGenResult> {
        let fingerprint = fingerprint(source_ref, prompt);
        info!(%fingerprint, "starting code generation");

        let workspace = Workspace::prepare(
            &self.source,
            &self.config.workspace_base_dir,
            &fingerprint,
            source_ref,
        )?;
        let file_map = workspace.file_map()?.render(FILE_MAP_MAX_LINES);
        let chunker = Chunker::new(self.config.max_chunk_chars);
        let max_attempts = self.config.max_planning_attempts;

        let mut attempts = 0u32;
        let mut code_diff = String::new();
        let mut previous_steps: Vec<String> = Vec::new();
        let mut history: Vec<HistoryItem> = Vec::new();

        loop {
            attempts += 1;
            let _span = info_span!("attempt", attempt = attempts, max_attempts).entered();
            info!("planning attempt {attempts} of {max_attempts}");

            let (review, plan) = self.planner.review_and_plan(&PlanningInput {
                prompt,
                file_map: &file_map,
                code_diff: &code_diff,
                steps: &previous_steps,
            })?;

            if let Some(reason) = stop_reason(
                review.as_ref(),
                plan.as_ref(),
                attempts,
                max_attempts,
                self.config.success_score_threshold,
            ) {
                info!(?reason, score = review.as_ref().map(|r| r.score), "loop stopped");
                history.insert(
                    0,
                    HistoryItem {
                        plan,
                        review,
                        code_diff: None,
                    },
                );
                break;
            }
            let Some(plan) = plan else {
                return Err(anyhow!("planner returned no plan for a continuing iteration"));
            };

            let files = workspace.fetch_files(&plan.file_paths)?;
            let chunks = chunker.chunk_files(&files);
            debug!(
                files = plan.file_paths.len(),
                chunks = chunks.len(),
                "generating diff"
            );

            let fragments = self.generate_fragments(&chunks, &plan.steps)?;
            code_diff = fragments.join("\n");
            previous_steps = plan.steps.clone();
            history.insert(
                0,
                HistoryItem {
                    plan: Some(plan),
                    review,
                    code_diff: Some(code_diff.clone()),
                },
            );
        }

        drop(workspace);
        let exceeded_max_attempts = attempts > max_attempts;
        info!(
            diff_bytes = code_diff.len(),
            history = history.len(),
            exceeded_max_attempts,
            "code generation finished"
        );
        Ok(CodeGenResult {
            code_diff,
            exceeded_max_attempts,
            history,
        })
    }

    /// One diff fragment per chunk, in chunk order.
    fn generate_fragments(&self, chunks: &[String], steps: &[String]) -> Result<Vec<String>> {
        if !self.config.parallel_workers || chunks.len() < 2 {
            return chunks
                .iter()
                .map(|chunk| self.worker.generate_diff(chunk, steps))
                .collect();
        }

        let worker = &self.worker;
        thread::scope(|scope| {
            let handles: Vec<_> = chunks
                .iter()
                .map(|chunk| scope.spawn(move || worker.generate_diff(chunk, steps)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .map_err(|_| anyhow!("worker thread panicked"))?
                })
                .collect()
        })
    }
}

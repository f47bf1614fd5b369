//! Caller layer: run the loop and persist the outcome.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::agents::{Planner, Worker};
use crate::core::types::{CodeGenResult, HistoryItem};
use crate::io::record_store::RecordStore;
use crate::io::source::SourceProvider;
use crate::orchestrator::Orchestrator;

/// Collection that receives one record per request.
pub const CODE_GEN_REQUESTS: &str = "code_gen_requests";

/// Persisted shape of a finished request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodegenRecord {
    pub repo_url: String,
    pub prompt: String,
    pub code_diff: String,
    /// Each history item serialized as its own JSON string.
    pub history: Vec<String>,
    pub exceeded_max_attempts: bool,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

impl CodegenRecord {
    pub fn from_result(repo_url: &str, prompt: &str, result: &CodeGenResult) -> Result<Self> {
        let history = result
            .history
            .iter()
            .map(|item: &HistoryItem| serde_json::to_string(item).context("serialize history item"))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            repo_url: repo_url.to_string(),
            prompt: prompt.to_string(),
            code_diff: result.code_diff.clone(),
            history,
            exceeded_max_attempts: result.exceeded_max_attempts,
            created_at: Utc::now().to_rfc3339(),
        })
    }
}

/// Runs requests and records them.
pub struct CodegenService<S, P, W, R> {
    orchestrator: Orchestrator<S, P, W>,
    store: R,
}

impl<S: SourceProvider, P: Planner, W: Worker, R: RecordStore> CodegenService<S, P, W, R> {
    pub fn new(orchestrator: Orchestrator<S, P, W>, store: R) -> Self {
        Self {
            orchestrator,
            store,
        }
    }

    /// Run the loop and store the result.
    ///
    /// Errors from the run propagate and nothing is stored. A failing store
    /// is logged and the result is still returned.
    pub fn request_codegen(&self, repo_url: &str, prompt: &str) -> Result<CodeGenResult> {
        let result = self.orchestrator.run(repo_url, prompt)?;

        match self.persist(repo_url, prompt, &result) {
            Ok(()) => info!(collection = CODE_GEN_REQUESTS, "stored code generation record"),
            Err(err) => warn!(
                collection = CODE_GEN_REQUESTS,
                error = %format!("{err:#}"),
                "failed to store code generation record"
            ),
        }
        Ok(result)
    }

    fn persist(&self, repo_url: &str, prompt: &str, result: &CodeGenResult) -> Result<()> {
        let record = CodegenRecord::from_result(repo_url, prompt, result)?;
        let value = serde_json::to_value(&record).context("serialize record")?;
        self.store.insert(CODE_GEN_REQUESTS, &value)
    }
}

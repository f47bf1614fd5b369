//! Scripted doubles for completion backends, agents and source providers.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};

use crate::agents::{Planner, PlanningInput, Worker};
use crate::core::types::{Plan, Review};
use crate::error::{ApiOrigin, CodegenError};
use crate::io::completion::{Completion, CompletionRequest, CompletionService};
use crate::io::source::SourceProvider;

/// Completion service that replays queued completions and records requests.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    responses: Mutex<VecDeque<Completion>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    /// One single-choice completion per payload, in order.
    pub fn new<I, S>(payloads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_completions(payloads.into_iter().map(Completion::single))
    }

    pub fn from_completions(completions: impl IntoIterator<Item = Completion>) -> Self {
        Self {
            responses: Mutex::new(completions.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// `count` completions with no choices.
    pub fn empty_choices(count: usize) -> Self {
        Self::from_completions((0..count).map(|_| Completion::default()))
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl CompletionService for ScriptedCompletion {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .ok_or_else(|| anyhow!("scripted completion exhausted"))
    }
}

/// One scripted planner reply.
#[derive(Debug, Clone)]
pub enum PlannerReply {
    Decision(Option<Review>, Option<Plan>),
    ApiError,
}

/// Planner that replays replies; the last reply repeats once the script runs out.
#[derive(Debug)]
pub struct ScriptedPlanner {
    replies: Mutex<VecDeque<PlannerReply>>,
    last: Mutex<Option<PlannerReply>>,
    calls: Mutex<Vec<RecordedPlanning>>,
}

/// What the planner was given on one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPlanning {
    pub prompt: String,
    pub file_map: String,
    pub code_diff: String,
    pub steps: Vec<String>,
}

impl ScriptedPlanner {
    pub fn new(replies: impl IntoIterator<Item = PlannerReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same review and plan.
    pub fn repeating(review: Option<Review>, plan: Option<Plan>) -> Self {
        Self::new([PlannerReply::Decision(review, plan)])
    }

    pub fn calls(&self) -> Vec<RecordedPlanning> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl Planner for ScriptedPlanner {
    fn review_and_plan(&self, input: &PlanningInput<'_>) -> Result<(Option<Review>, Option<Plan>)> {
        self.calls.lock().expect("calls lock").push(RecordedPlanning {
            prompt: input.prompt.to_string(),
            file_map: input.file_map.to_string(),
            code_diff: input.code_diff.to_string(),
            steps: input.steps.to_vec(),
        });

        let next = self.replies.lock().expect("replies lock").pop_front();
        let reply = {
            let mut last = self.last.lock().expect("last lock");
            if let Some(reply) = next {
                *last = Some(reply);
            }
            last.clone()
        };
        match reply {
            Some(PlannerReply::Decision(review, plan)) => Ok((review, plan)),
            Some(PlannerReply::ApiError) => Err(CodegenError::no_result(ApiOrigin::Planner).into()),
            None => Err(anyhow!("scripted planner has no replies")),
        }
    }
}

/// Worker that derives its diff from the chunk so order can be checked.
#[derive(Debug, Default)]
pub struct ScriptedWorker {
    fail: bool,
    chunks: Mutex<Vec<String>>,
}

impl ScriptedWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with the worker's API error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            chunks: Mutex::new(Vec::new()),
        }
    }

    /// Chunks received, in call order (not necessarily chunk order).
    pub fn chunks(&self) -> Vec<String> {
        self.chunks.lock().expect("chunks lock").clone()
    }

    /// The diff this worker returns for `chunk`.
    pub fn diff_for(chunk: &str) -> String {
        let first_line = chunk.lines().next().unwrap_or_default();
        format!("diff for {first_line}")
    }
}

impl Worker for ScriptedWorker {
    fn generate_diff(&self, chunk: &str, _steps: &[String]) -> Result<String> {
        self.chunks
            .lock()
            .expect("chunks lock")
            .push(chunk.to_string());
        if self.fail {
            return Err(CodegenError::no_result(ApiOrigin::Worker).into());
        }
        Ok(Self::diff_for(chunk))
    }
}

/// In-memory source tree written into the workspace on materialize.
///
/// Accepts references starting with `stub://` and counts release calls.
#[derive(Debug, Default)]
pub struct StubSource {
    files: Vec<(String, String)>,
    fail_materialize: bool,
    releases: AtomicUsize,
}

impl StubSource {
    pub fn new<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            files: files
                .into_iter()
                .map(|(path, contents)| (path.to_string(), contents.to_string()))
                .collect(),
            fail_materialize: false,
            releases: AtomicUsize::new(0),
        }
    }

    /// Create the workspace directory, then fail.
    pub fn failing_materialize(mut self) -> Self {
        self.fail_materialize = true;
        self
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl SourceProvider for StubSource {
    fn validate(&self, source_ref: &str) -> Result<()> {
        if source_ref.starts_with("stub://") {
            Ok(())
        } else {
            Err(CodegenError::invalid_reference(source_ref).into())
        }
    }

    fn materialize(&self, _source_ref: &str, dest: &Path) -> Result<()> {
        fs::create_dir_all(dest)?;
        if self.fail_materialize {
            return Err(anyhow!("stub materialize failed"));
        }
        for (path, contents) in &self.files {
            let full = dest.join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(full, contents)?;
        }
        Ok(())
    }

    fn release(&self, root: &Path) -> Result<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        if root.exists() {
            fs::remove_dir_all(root)?;
        }
        Ok(())
    }
}

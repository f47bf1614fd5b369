//! Completion service abstraction for structured agent output.
//!
//! The [`CompletionService`] trait decouples the planner and worker from the
//! model backend. A request names an output schema; the backend returns the
//! structured arguments it produced as raw JSON strings ("choices"). An empty
//! choice list means the backend produced no usable result. Tests use scripted
//! services that return predetermined choices.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::error::CodegenError;
use crate::io::process::run_command_with_timeout;

/// Named JSON Schema the backend must honor.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    /// Function name presented to the model.
    pub name: &'static str,
    pub description: &'static str,
    pub schema: Value,
}

impl OutputSchema {
    /// Parse an embedded schema document.
    pub fn from_json(name: &'static str, description: &'static str, raw: &str) -> Result<Self> {
        let schema = serde_json::from_str(raw).with_context(|| format!("parse {name} schema"))?;
        Ok(Self {
            name,
            description,
            schema,
        })
    }
}

/// Parameters for one completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Prompt text sent as the single user message.
    pub prompt: String,
    pub schema: OutputSchema,
    /// Maximum time to wait for the backend.
    pub timeout: Duration,
}

/// Structured arguments returned by the backend, one per choice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub choices: Vec<String>,
}

impl Completion {
    pub fn single(arguments: impl Into<String>) -> Self {
        Self {
            choices: vec![arguments.into()],
        }
    }

    pub fn first(&self) -> Option<&str> {
        self.choices.first().map(String::as_str)
    }
}

/// Abstraction over completion backends.
///
/// Implementations must be shareable across threads: worker calls for the
/// chunks of one iteration may run concurrently.
pub trait CompletionService: Sync {
    /// Run one completion. Timeouts surface as [`CodegenError::Api`]; other
    /// transport failures propagate as-is.
    fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}

impl<T: CompletionService + ?Sized> CompletionService for &T {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        (**self).complete(request)
    }
}

impl<T: CompletionService + ?Sized> CompletionService for Box<T> {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        (**self).complete(request)
    }
}

/// Backend that spawns `codex exec` with `--output-schema`.
#[derive(Debug, Clone)]
pub struct CodexCompletion {
    model: Option<String>,
    output_limit_bytes: usize,
    program: PathBuf,
}

impl CodexCompletion {
    pub fn new(model: Option<String>, output_limit_bytes: usize) -> Self {
        Self {
            model,
            output_limit_bytes,
            program: PathBuf::from("codex"),
        }
    }

    /// Override the executable (used to point at a stub in tests).
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

impl CompletionService for CodexCompletion {
    #[instrument(skip_all, fields(schema = request.schema.name, timeout_secs = request.timeout.as_secs()))]
    fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let scratch = tempfile::tempdir().context("create codex scratch dir")?;
        let schema_path = scratch.path().join(format!("{}.schema.json", request.schema.name));
        let output_path = scratch.path().join("output.json");

        let mut schema = serde_json::to_string_pretty(&request.schema.schema)
            .context("serialize output schema")?;
        schema.push('\n');
        fs::write(&schema_path, schema)
            .with_context(|| format!("write schema {}", schema_path.display()))?;

        info!(program = %self.program.display(), "starting codex exec");
        let mut cmd = Command::new(&self.program);
        cmd.arg("exec")
            .arg("--sandbox")
            .arg("read-only")
            // The scratch directory is not a git repository.
            .arg("--skip-git-repo-check");
        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }
        cmd.arg("--output-schema")
            .arg(&schema_path)
            .arg("--output-last-message")
            .arg(&output_path)
            .arg("-")
            .current_dir(scratch.path());

        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            self.output_limit_bytes,
        )
        .context("run codex exec")?;

        if output.timed_out {
            warn!(
                timeout_secs = request.timeout.as_secs(),
                "codex exec timed out"
            );
            return Err(CodegenError::backend(format!(
                "codex exec timed out after {:?}",
                request.timeout
            ))
            .into());
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "codex exec failed");
            // codex reports some failures on stdout only.
            let mut detail = output.stderr_text("codex").trim().to_string();
            if detail.is_empty() {
                detail = output.stdout_text("codex").trim().to_string();
            }
            return Err(anyhow!(
                "codex exec failed with status {:?}: {detail}",
                output.status.code()
            ));
        }

        if !output_path.exists() {
            debug!("codex exec wrote no output");
            return Ok(Completion::default());
        }
        let contents = fs::read_to_string(&output_path)
            .with_context(|| format!("read codex output {}", output_path.display()))?;
        if contents.trim().is_empty() {
            return Ok(Completion::default());
        }
        debug!(bytes = contents.len(), "codex exec completed successfully");
        Ok(Completion::single(contents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(timeout: Duration) -> CompletionRequest {
        CompletionRequest {
            prompt: "prompt".to_string(),
            schema: OutputSchema {
                name: "get_codegen_code_diff",
                description: "diff",
                schema: json!({"type": "object"}),
            },
            timeout,
        }
    }

    /// Writes a shell script standing in for `codex` that drains stdin first.
    fn stub_program(dir: &std::path::Path, body: &str) -> PathBuf {
        stub_script(dir, &format!("cat > /dev/null\n{body}"))
    }

    fn stub_script(dir: &std::path::Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("codex-stub");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write stub");
        let mut perms = fs::metadata(&path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("chmod");
        path
    }

    #[test]
    fn reads_output_last_message() {
        let temp = tempfile::tempdir().expect("tempdir");
        // The output path is the argument after --output-last-message.
        let program = stub_program(
            temp.path(),
            r#"while [ "$1" != "--output-last-message" ]; do shift; done
printf '{"code_diff":"x"}' > "$2""#,
        );
        let backend = CodexCompletion::new(None, 1000).with_program(program);

        let completion = backend
            .complete(&request(Duration::from_secs(10)))
            .expect("complete");

        assert_eq!(completion.first(), Some(r#"{"code_diff":"x"}"#));
    }

    #[test]
    fn missing_output_is_an_empty_completion() {
        let temp = tempfile::tempdir().expect("tempdir");
        let program = stub_program(temp.path(), "exit 0");
        let backend = CodexCompletion::new(None, 1000).with_program(program);

        let completion = backend
            .complete(&request(Duration::from_secs(10)))
            .expect("complete");

        assert!(completion.choices.is_empty());
    }

    #[test]
    fn timeout_is_an_api_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let program = stub_program(temp.path(), "exec sleep 5");
        let backend = CodexCompletion::new(None, 1000).with_program(program);

        let err = backend
            .complete(&request(Duration::from_millis(200)))
            .unwrap_err();

        let typed = err.downcast_ref::<CodegenError>().expect("typed");
        assert!(typed.is_api());
    }

    #[test]
    fn timeout_covers_large_prompt_the_backend_never_reads() {
        let temp = tempfile::tempdir().expect("tempdir");
        let program = stub_script(temp.path(), "exec sleep 3");
        let backend = CodexCompletion::new(None, 1000).with_program(program);
        let mut request = request(Duration::from_millis(200));
        request.prompt = "p".repeat(200_000);
        let started = std::time::Instant::now();

        let err = backend.complete(&request).unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        let typed = err.downcast_ref::<CodegenError>().expect("typed");
        assert!(typed.is_api());
    }

    #[test]
    fn failure_reports_stdout_when_stderr_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let program = stub_program(temp.path(), "echo 'model not found'\nexit 3");
        let backend = CodexCompletion::new(None, 1000).with_program(program);

        let err = backend
            .complete(&request(Duration::from_secs(10)))
            .unwrap_err();

        assert!(err.downcast_ref::<CodegenError>().is_none());
        assert!(format!("{err:#}").contains("model not found"), "{err:#}");
    }
}

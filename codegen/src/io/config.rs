//! Code generation configuration loaded from a TOML file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::chunker::DEFAULT_MAX_CHUNK_CHARS;
use crate::core::types::{MAX_REVIEW_SCORE, MIN_REVIEW_SCORE};

/// Loop, workspace and backend settings (TOML).
///
/// Missing fields default to the values the service ships with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CodegenConfig {
    /// Planning budget. The loop reports exhaustion once `attempts > max_planning_attempts`.
    pub max_planning_attempts: u32,

    /// Inclusive review score at which a diff is accepted (out of 10).
    pub success_score_threshold: i64,

    /// Upper bound for one worker content chunk, in characters.
    pub max_chunk_chars: usize,

    /// Prompt pack budget before sections are dropped or truncated.
    pub prompt_budget_bytes: usize,

    /// Wall-clock limit for a single completion call.
    pub completion_timeout_secs: u64,

    /// Wall-clock limit for materializing the source tree.
    pub clone_timeout_secs: u64,

    /// Parent directory of fingerprint-named scratch workspaces.
    pub workspace_base_dir: PathBuf,

    /// Run the worker for each chunk of an iteration concurrently.
    pub parallel_workers: bool,

    /// Truncate captured child process output beyond this many bytes.
    pub output_limit_bytes: usize,

    pub completion: CompletionConfig,
}

/// Which completion backend to use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompletionBackend {
    /// Chat-completions HTTP API with a forced function call.
    Openai,
    /// `codex exec --output-schema`.
    Codex,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompletionConfig {
    pub backend: CompletionBackend,
    pub model: String,
    /// Base URL of the chat-completions API (without `/v1/...`).
    pub base_url: String,
    /// Environment variable that holds the API key.
    pub api_key_env: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            backend: CompletionBackend::Openai,
            model: "gpt-4".to_string(),
            base_url: "https://api.openai.com".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            max_planning_attempts: 3,
            success_score_threshold: 7,
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            prompt_budget_bytes: 120_000,
            completion_timeout_secs: 5 * 60,
            clone_timeout_secs: 10 * 60,
            workspace_base_dir: PathBuf::from("/tmp/repo"),
            parallel_workers: true,
            output_limit_bytes: 100_000,
            completion: CompletionConfig::default(),
        }
    }
}

impl CodegenConfig {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_REVIEW_SCORE..=MAX_REVIEW_SCORE).contains(&self.success_score_threshold) {
            return Err(anyhow!(
                "success_score_threshold must be within {MIN_REVIEW_SCORE}..={MAX_REVIEW_SCORE}"
            ));
        }
        if self.max_chunk_chars == 0 {
            return Err(anyhow!("max_chunk_chars must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.completion_timeout_secs == 0 {
            return Err(anyhow!("completion_timeout_secs must be > 0"));
        }
        if self.clone_timeout_secs == 0 {
            return Err(anyhow!("clone_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.workspace_base_dir.as_os_str().is_empty() {
            return Err(anyhow!("workspace_base_dir must be set"));
        }
        if self.completion.model.trim().is_empty() {
            return Err(anyhow!("completion.model must be set"));
        }
        Ok(())
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CodegenConfig::default()`.
pub fn load_config(path: &Path) -> Result<CodegenConfig> {
    if !path.exists() {
        let cfg = CodegenConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CodegenConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, CodegenConfig::default());
        assert_eq!(cfg.max_planning_attempts, 3);
        assert_eq!(cfg.success_score_threshold, 7);
    }

    #[test]
    fn serialized_config_loads_back() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("codegen.toml");
        let cfg = CodegenConfig {
            max_planning_attempts: 2,
            completion: CompletionConfig {
                backend: CompletionBackend::Codex,
                ..CompletionConfig::default()
            },
            ..CodegenConfig::default()
        };
        fs::write(&path, toml::to_string_pretty(&cfg).expect("toml")).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("codegen.toml");
        fs::write(&path, "max_planning_attempts = 5\n\n[completion]\nmodel = \"gpt-4o\"\n")
            .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_planning_attempts, 5);
        assert_eq!(cfg.completion.model, "gpt-4o");
        assert_eq!(cfg.completion.backend, CompletionBackend::Openai);
        assert_eq!(cfg.max_chunk_chars, DEFAULT_MAX_CHUNK_CHARS);
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let cfg = CodegenConfig {
            success_score_threshold: 11,
            ..CodegenConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}

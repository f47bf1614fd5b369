//! Source providers that materialize a repository into a workspace.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::error::CodegenError;
use crate::io::process::run_command_with_timeout;

static GITHUB_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://github\.com/[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$")
        .expect("github url regex")
});

/// Materializes a source reference into a directory and cleans it up again.
pub trait SourceProvider {
    /// Reject references this provider cannot materialize.
    ///
    /// Fails with [`CodegenError::InvalidReference`] and must not touch the
    /// filesystem or network.
    fn validate(&self, source_ref: &str) -> Result<()>;

    /// Populate `dest` (which does not exist yet) with the source tree.
    fn materialize(&self, source_ref: &str, dest: &Path) -> Result<()>;

    /// Remove a materialized tree. Called exactly once per workspace.
    fn release(&self, root: &Path) -> Result<()> {
        if root.exists() {
            fs::remove_dir_all(root)
                .with_context(|| format!("remove workspace {}", root.display()))?;
        }
        Ok(())
    }
}

impl<T: SourceProvider + ?Sized> SourceProvider for &T {
    fn validate(&self, source_ref: &str) -> Result<()> {
        (**self).validate(source_ref)
    }

    fn materialize(&self, source_ref: &str, dest: &Path) -> Result<()> {
        (**self).materialize(source_ref, dest)
    }

    fn release(&self, root: &Path) -> Result<()> {
        (**self).release(root)
    }
}

/// Accepts `https://github.com/<owner>/<repo>` and shallow-clones it.
#[derive(Debug, Clone)]
pub struct GitSourceProvider {
    timeout: Duration,
    output_limit_bytes: usize,
}

impl GitSourceProvider {
    pub fn new(timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            timeout,
            output_limit_bytes,
        }
    }
}

/// True when `source_ref` is a GitHub repository URL (optionally ending in `.git`).
pub fn is_github_url(source_ref: &str) -> bool {
    GITHUB_URL_RE.is_match(source_ref)
}

impl SourceProvider for GitSourceProvider {
    fn validate(&self, source_ref: &str) -> Result<()> {
        if is_github_url(source_ref) {
            return Ok(());
        }
        warn!(source_ref, "rejected source reference");
        Err(CodegenError::invalid_reference(source_ref).into())
    }

    #[instrument(skip_all, fields(source_ref = %source_ref, dest = %dest.display()))]
    fn materialize(&self, source_ref: &str, dest: &Path) -> Result<()> {
        self.validate(source_ref)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create workspace parent {}", parent.display()))?;
        }

        info!("cloning repository");
        let mut cmd = Command::new("git");
        cmd.arg("clone")
            .arg("--depth")
            .arg("1")
            .arg("--quiet")
            .arg("--")
            .arg(source_ref)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0");

        let output = run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)
            .context("run git clone")?;
        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "git clone timed out");
            return Err(CodegenError::backend(format!(
                "git clone timed out after {:?}",
                self.timeout
            ))
            .into());
        }
        if !output.status.success() {
            return Err(anyhow!(
                "git clone failed with status {:?}: {}",
                output.status.code(),
                output.stderr_text("git").trim()
            ));
        }
        debug!("clone finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_github_repository_urls() {
        assert!(is_github_url("https://github.com/owner/repo"));
        assert!(is_github_url("https://github.com/my-org/my.repo_1"));
        assert!(is_github_url("https://github.com/owner/repo.git"));
    }

    #[test]
    fn rejects_other_references() {
        for reference in [
            "http://github.com/owner/repo",
            "https://gitlab.com/owner/repo",
            "https://github.com/owner",
            "https://github.com/owner/repo/tree/main",
            "https://github.com/owner/repo; rm -rf /",
            "git@github.com:owner/repo.git",
            "",
        ] {
            assert!(!is_github_url(reference), "{reference} should be rejected");
        }
    }

    #[test]
    fn validate_returns_invalid_reference() {
        let provider = GitSourceProvider::new(Duration::from_secs(1), 1000);
        let err = provider.validate("not a url").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CodegenError>(),
            Some(CodegenError::InvalidReference { .. })
        ));
    }

    #[test]
    fn materialize_rejects_before_touching_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dest = temp.path().join("nested").join("ws");
        let provider = GitSourceProvider::new(Duration::from_secs(1), 1000);

        assert!(provider.materialize("ftp://example.com/x", &dest).is_err());
        assert!(!temp.path().join("nested").exists());
    }

    #[test]
    fn default_release_removes_tree_and_tolerates_missing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("ws");
        fs::create_dir_all(root.join("src")).expect("mkdir");
        fs::write(root.join("src/main.rs"), "fn main() {}").expect("write");
        let provider = GitSourceProvider::new(Duration::from_secs(1), 1000);

        provider.release(&root).expect("release");
        assert!(!root.exists());
        provider.release(&root).expect("release again");
    }

    #[test]
    #[ignore = "requires network access"]
    fn clones_public_repository() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dest = temp.path().join("repo");
        let provider = GitSourceProvider::new(Duration::from_secs(120), 100_000);

        provider
            .materialize("https://github.com/rust-lang/rustlings", &dest)
            .expect("clone");
        assert!(dest.join(".git").exists());
    }
}

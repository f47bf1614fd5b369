//! Scratch workspace owned by a single run.
//!
//! A [`Workspace`] is created under `<base>/<fingerprint>` and released through
//! its provider when dropped, so every exit path of a run (success, early stop
//! or error) tears it down exactly once.
//!
//! Two runs with the same source reference and prompt share a fingerprint and
//! therefore a path. Nothing guards against them racing; the second `prepare`
//! removes the first run's tree.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::core::chunker::FileSection;
use crate::core::file_map::FileMap;
use crate::io::source::SourceProvider;

const GIT_DIR: &str = ".git";

/// Materialized source tree, released on drop.
pub struct Workspace<'a, S: SourceProvider + ?Sized> {
    root: PathBuf,
    provider: &'a S,
}

impl<'a, S: SourceProvider + ?Sized> Workspace<'a, S> {
    /// Validate `source_ref`, clear any stale directory and materialize into
    /// `<base_dir>/<fingerprint>`.
    ///
    /// An invalid reference fails before anything is created. Once the
    /// directory is claimed, a failing materialization still releases it.
    pub fn prepare(
        provider: &'a S,
        base_dir: &Path,
        fingerprint: &str,
        source_ref: &str,
    ) -> Result<Self> {
        provider.validate(source_ref)?;

        fs::create_dir_all(base_dir)
            .with_context(|| format!("create workspace base {}", base_dir.display()))?;
        let root = base_dir.join(fingerprint);
        if root.exists() {
            debug!(root = %root.display(), "removing stale workspace");
            fs::remove_dir_all(&root)
                .with_context(|| format!("remove stale workspace {}", root.display()))?;
        }

        let workspace = Self { root, provider };
        provider.materialize(source_ref, &workspace.root)?;
        info!(root = %workspace.root.display(), "workspace ready");
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build the nested file map of the workspace, skipping `.git`.
    pub fn file_map(&self) -> Result<FileMap> {
        let mut map = FileMap::default();
        let mut stack = vec![String::new()];

        while let Some(rel_dir) = stack.pop() {
            let dir = if rel_dir.is_empty() {
                self.root.clone()
            } else {
                self.root.join(&rel_dir)
            };
            let entries =
                fs::read_dir(&dir).with_context(|| format!("read directory {}", dir.display()))?;
            for entry in entries {
                let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if name == GIT_DIR {
                    continue;
                }
                let rel = if rel_dir.is_empty() {
                    name
                } else {
                    format!("{rel_dir}/{name}")
                };
                let file_type = entry
                    .file_type()
                    .with_context(|| format!("stat {}", entry.path().display()))?;
                if file_type.is_dir() {
                    map.insert_dir(&rel);
                    stack.push(rel);
                } else {
                    map.insert_file(&rel);
                }
            }
        }

        debug!(files = map.file_count(), "built file map");
        Ok(map)
    }

    /// Read a repository-relative file, `None` if it does not exist.
    ///
    /// Paths that are absolute or climb out with `..` count as missing.
    pub fn read_file(&self, rel_path: &str) -> Result<Option<String>> {
        let Some(path) = self.resolve(rel_path) else {
            warn!(path = rel_path, "path escapes workspace");
            return Ok(None);
        };
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Read the named files as sections, in order.
    ///
    /// A missing file yields an empty body, marking it as a file to create.
    /// Every non-empty body ends with a newline.
    pub fn fetch_files(&self, paths: &[String]) -> Result<Vec<FileSection>> {
        let mut files = Vec::with_capacity(paths.len());
        for rel_path in paths {
            let body = match self.read_file(rel_path)? {
                Some(mut contents) => {
                    if !contents.is_empty() && !contents.ends_with('\n') {
                        contents.push('\n');
                    }
                    contents
                }
                None => {
                    info!(
                        path = %rel_path,
                        "file not found; presumed new file to be added by the diff"
                    );
                    String::new()
                }
            };
            files.push(FileSection::new(rel_path.as_str(), body));
        }
        Ok(files)
    }

    fn resolve(&self, rel_path: &str) -> Option<PathBuf> {
        let rel = Path::new(rel_path);
        let mut path = self.root.clone();
        for component in rel.components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        Some(path)
    }
}

impl<S: SourceProvider + ?Sized> Drop for Workspace<'_, S> {
    fn drop(&mut self) {
        match self.provider.release(&self.root) {
            Ok(()) => debug!(root = %self.root.display(), "workspace released"),
            Err(err) => warn!(root = %self.root.display(), error = %err, "failed to release workspace"),
        }
    }
}

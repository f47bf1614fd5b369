//! Append-only record persistence.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::debug;

/// Destination for finished run records.
pub trait RecordStore {
    fn insert(&self, collection: &str, record: &Value) -> Result<()>;
}

impl<T: RecordStore + ?Sized> RecordStore for &T {
    fn insert(&self, collection: &str, record: &Value) -> Result<()> {
        (**self).insert(collection, record)
    }
}

/// Stores each collection as `<dir>/<collection>.jsonl`, one record per line.
#[derive(Debug, Clone)]
pub struct JsonlRecordStore {
    dir: PathBuf,
}

impl JsonlRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn collection_path(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{collection}.jsonl"))
    }
}

impl RecordStore for JsonlRecordStore {
    fn insert(&self, collection: &str, record: &Value) -> Result<()> {
        validate_collection(collection)?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create record dir {}", self.dir.display()))?;

        let path = self.collection_path(collection);
        let mut line = serde_json::to_string(record).context("serialize record")?;
        line.push('\n');
        append(&path, &line)?;
        debug!(collection, path = %path.display(), "record inserted");
        Ok(())
    }
}

fn validate_collection(collection: &str) -> Result<()> {
    let valid = !collection.is_empty()
        && collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(anyhow!("invalid collection name {collection:?}"));
    }
    Ok(())
}

fn append(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn appends_one_line_per_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = JsonlRecordStore::new(temp.path().join("records"));

        store
            .insert("code_gen_requests", &json!({"n": 1}))
            .expect("insert");
        store
            .insert("code_gen_requests", &json!({"n": 2}))
            .expect("insert");

        let contents = fs::read_to_string(store.collection_path("code_gen_requests"))
            .expect("read");
        let lines: Vec<Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(lines, vec![json!({"n": 1}), json!({"n": 2})]);
    }

    #[test]
    fn rejects_path_like_collection_names() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = JsonlRecordStore::new(temp.path());

        assert!(store.insert("../escape", &json!({})).is_err());
        assert!(store.insert("", &json!({})).is_err());
    }
}

//! Nested map of a materialized source tree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One entry in a [`FileMap`]: a nested directory or a file path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileMapEntry {
    Dir(FileMap),
    /// Repository-relative path of the file.
    File(String),
}

/// Directory listing keyed by entry name, sorted for stable rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileMap {
    pub entries: BTreeMap<String, FileMapEntry>,
}

impl FileMap {
    /// Insert a file at its repository-relative `path`, creating parent maps.
    pub fn insert_file(&mut self, path: &str) {
        let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let Some(name) = parts.pop() else {
            return;
        };
        let mut dir = self;
        for part in parts {
            let entry = dir
                .entries
                .entry(part.to_string())
                .or_insert_with(|| FileMapEntry::Dir(FileMap::default()));
            if let FileMapEntry::File(_) = entry {
                *entry = FileMapEntry::Dir(FileMap::default());
            }
            let FileMapEntry::Dir(next) = entry else {
                return;
            };
            dir = next;
        }
        dir.entries
            .insert(name.to_string(), FileMapEntry::File(path.to_string()));
    }

    /// Insert an (initially empty) directory at `path`.
    pub fn insert_dir(&mut self, path: &str) {
        let mut dir = self;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            let entry = dir
                .entries
                .entry(part.to_string())
                .or_insert_with(|| FileMapEntry::Dir(FileMap::default()));
            let FileMapEntry::Dir(next) = entry else {
                return;
            };
            dir = next;
        }
    }

    /// Count files (not directories) in the whole map.
    pub fn file_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(map) = stack.pop() {
            for entry in map.entries.values() {
                match entry {
                    FileMapEntry::Dir(child) => stack.push(child),
                    FileMapEntry::File(_) => count += 1,
                }
            }
        }
        count
    }

    /// Render an indented listing, directories suffixed with `/`.
    ///
    /// Stops after `max_lines` lines and appends an elision marker.
    pub fn render(&self, max_lines: usize) -> String {
        let mut lines = Vec::new();
        let mut elided = false;
        let mut stack: Vec<(usize, std::collections::btree_map::Iter<'_, String, FileMapEntry>)> =
            vec![(0, self.entries.iter())];

        while let Some((depth, iter)) = stack.last_mut() {
            let depth = *depth;
            let Some((name, entry)) = iter.next() else {
                stack.pop();
                continue;
            };
            if lines.len() >= max_lines {
                elided = true;
                break;
            }
            let indent = "  ".repeat(depth);
            match entry {
                FileMapEntry::Dir(child) => {
                    lines.push(format!("{indent}{name}/"));
                    stack.push((depth + 1, child.entries.iter()));
                }
                FileMapEntry::File(_) => lines.push(format!("{indent}{name}")),
            }
        }

        if elided {
            lines.push(format!("... ({} files total)", self.file_count()));
        }
        lines.join("\n")
    }
}

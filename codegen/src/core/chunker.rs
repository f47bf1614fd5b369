//! Split fetched file content into bounded chunks without splitting files.
//!
//! Content is a sequence of file sections, each rendered as a
//! `--- File: <path> ---` header line followed by the file body. Sections are
//! kept whole. A section larger than the bound becomes its own chunk, and a
//! header with no content (a file that does not exist yet) always stands alone
//! so the worker sees it as a file to create.
//!
//! The loop chunks the [`FileSection`]s it fetched, so section boundaries come
//! from the fetcher and a body line that looks like a header is just content.
//! [`Chunker::chunk`] recovers sections from plain text by matching header
//! lines, which is only exact when no body contains one.

use std::sync::LazyLock;

use regex::Regex;

/// Default upper bound for one chunk, in characters.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 8000;

static FILE_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^--- File: (.+) ---$").expect("file header regex"));

/// Render the header line that opens a file section.
pub fn file_header(path: &str) -> String {
    format!("--- File: {path} ---\n")
}

/// One fetched file: its repository-relative path and body.
///
/// The body is empty for a file that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSection {
    pub path: String,
    pub body: String,
}

impl FileSection {
    pub fn new(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            body: body.into(),
        }
    }

    /// Header line followed by the body.
    pub fn render(&self) -> String {
        format!("{}{}", file_header(&self.path), self.body)
    }
}

/// Concatenate rendered sections in order.
pub fn render_sections(files: &[FileSection]) -> String {
    files.iter().map(FileSection::render).collect()
}

/// One file section (or leading text before the first header).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<'a> {
    /// Path from the header, `None` for leading text without a header.
    pub path: Option<&'a str>,
    /// Full section text including the header line.
    pub text: &'a str,
    /// True when the header is followed by no file content.
    pub empty_file: bool,
}

impl Section<'_> {
    fn len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Split `content` into sections in original order.
pub fn split_sections(content: &str) -> Vec<Section<'_>> {
    let mut sections = Vec::new();
    let headers: Vec<_> = FILE_HEADER_RE.captures_iter(content).collect();

    let first_start = headers
        .first()
        .and_then(|caps| caps.get(0))
        .map_or(content.len(), |m| m.start());
    if first_start > 0 {
        sections.push(Section {
            path: None,
            text: &content[..first_start],
            empty_file: false,
        });
    }

    for (idx, caps) in headers.iter().enumerate() {
        let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = headers
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map_or(content.len(), |m| m.start());
        let text = &content[whole.start()..end];
        let body = &content[whole.end()..end];
        sections.push(Section {
            path: Some(path.as_str()),
            text,
            empty_file: body.trim().is_empty(),
        });
    }

    sections
}

/// Bounded chunk builder.
#[derive(Debug, Clone)]
pub struct Chunker {
    max_chars: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHUNK_CHARS)
    }
}

impl Chunker {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// Chunk header-delimited `content`, preserving section order.
    ///
    /// Concatenating the returned chunks reproduces `content` exactly: each
    /// section already ends with the newline that separates it from the next
    /// header, so no extra separator is injected.
    pub fn chunk(&self, content: &str) -> Vec<String> {
        self.pack(split_sections(content))
    }

    /// Chunk fetched files. Each file lands in exactly one chunk whatever its
    /// body contains, and the chunks concatenate to [`render_sections`].
    pub fn chunk_files(&self, files: &[FileSection]) -> Vec<String> {
        let rendered: Vec<String> = files.iter().map(FileSection::render).collect();
        self.pack(files.iter().zip(&rendered).map(|(file, text)| Section {
            path: Some(file.path.as_str()),
            text: text.as_str(),
            empty_file: file.body.trim().is_empty(),
        }))
    }

    fn pack<'a>(&self, sections: impl IntoIterator<Item = Section<'a>>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;

        for section in sections {
            let section_len = section.len();

            if section.empty_file {
                flush(&mut chunks, &mut current, &mut current_len);
                chunks.push(section.text.to_string());
                continue;
            }

            if current_len + section_len > self.max_chars {
                flush(&mut chunks, &mut current, &mut current_len);
            }

            if section_len > self.max_chars {
                chunks.push(section.text.to_string());
            } else {
                current.push_str(section.text);
                current_len += section_len;
            }
        }

        flush(&mut chunks, &mut current, &mut current_len);
        chunks
    }
}

fn flush(chunks: &mut Vec<String>, current: &mut String, current_len: &mut usize) {
    if !current.is_empty() {
        chunks.push(std::mem::take(current));
        *current_len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(path: &str, body: &str) -> String {
        format!("{}{}", file_header(path), body)
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(Chunker::default().chunk("").is_empty());
    }

    #[test]
    fn small_files_share_one_chunk() {
        let content = format!("{}{}", section("a.rs", "fn a() {}\n"), section("b.rs", "fn b() {}\n"));
        let chunks = Chunker::new(1000).chunk(&content);
        assert_eq!(chunks, vec![content]);
    }

    #[test]
    fn flushes_before_overflowing_the_bound() {
        let a = section("a.rs", &format!("{}\n", "a".repeat(30)));
        let b = section("b.rs", &format!("{}\n", "b".repeat(30)));
        let c = section("c.rs", "c\n");
        let content = format!("{a}{b}{c}");

        let chunks = Chunker::new(80).chunk(&content);

        assert_eq!(chunks, vec![a, format!("{b}{c}")]);
    }

    #[test]
    fn oversized_file_is_its_own_chunk_and_never_split() {
        let small = section("small.rs", "x\n");
        let big = section("big.rs", &format!("{}\n", "y".repeat(500)));
        let tail = section("tail.rs", "z\n");
        let content = format!("{small}{big}{tail}");

        let chunks = Chunker::new(100).chunk(&content);

        assert_eq!(chunks, vec![small, big, tail]);
    }

    #[test]
    fn empty_file_section_stands_alone() {
        let a = section("a.rs", "a\n");
        let new_file = file_header("new.rs");
        let b = section("b.rs", "b\n");
        let content = format!("{a}{new_file}{b}");

        let chunks = Chunker::new(1000).chunk(&content);

        assert_eq!(chunks, vec![a, new_file, b]);
    }

    #[test]
    fn concatenated_chunks_reproduce_input() {
        let mut content = String::from("preamble\n");
        for idx in 0..20 {
            let body = "line\n".repeat(idx * 7);
            content.push_str(&section(&format!("src/file_{idx}.rs"), &body));
        }

        let chunks = Chunker::new(120).chunk(&content);

        assert_eq!(chunks.concat(), content);
        for chunk in &chunks {
            let headers = split_sections(chunk)
                .iter()
                .filter(|s| s.path.is_some())
                .count();
            if chunk.chars().count() > 120 {
                assert_eq!(headers, 1, "oversized chunk must hold a single file");
            }
        }
    }

    #[test]
    fn split_sections_reads_paths_and_leading_text() {
        let content = format!("intro\n{}", section("dir/x.rs", "body\n"));
        let sections = split_sections(&content);

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].path, None);
        assert_eq!(sections[0].text, "intro\n");
        assert_eq!(sections[1].path, Some("dir/x.rs"));
        assert!(!sections[1].empty_file);
    }

    #[test]
    fn header_lookalike_in_body_keeps_file_whole() {
        let doc = FileSection::new(
            "doc.md",
            format!("line1\n--- File: fake ---\n{}\n", "y".repeat(50)),
        );
        let b = FileSection::new("b.rs", "b\n");
        let files = vec![doc.clone(), b.clone()];

        let chunks = Chunker::new(60).chunk_files(&files);

        assert_eq!(chunks, vec![doc.render(), b.render()]);
        assert_eq!(chunks.concat(), render_sections(&files));
    }

    #[test]
    fn chunk_files_isolates_missing_files() {
        let files = vec![
            FileSection::new("a.rs", "a\n"),
            FileSection::new("new.rs", ""),
            FileSection::new("b.rs", "b\n"),
        ];

        let chunks = Chunker::new(1000).chunk_files(&files);

        assert_eq!(
            chunks,
            vec![
                section("a.rs", "a\n"),
                file_header("new.rs"),
                section("b.rs", "b\n"),
            ]
        );
    }

    #[test]
    fn bound_counts_characters_not_bytes() {
        let body = format!("{}\n", "é".repeat(20));
        let a = section("a.rs", &body);
        let limit = a.chars().count();
        let content = format!("{a}{a}");

        let chunks = Chunker::new(limit).chunk(&content);

        assert_eq!(chunks.len(), 2);
    }
}

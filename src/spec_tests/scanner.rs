//! Line scanner turning an annotated Markdown document into typed blocks
//!
//! Examples in the WDL specification are written as HTML `<details>` blocks:
//!
//! ~~~text
//! <details>
//! <summary>
//! Example: hello_task.wdl
//!
//! ```wdl
//! version 1.1
//! ...
//! ```
//! </summary>
//! <p>
//! Example input:
//!
//! ```json
//! {"hello.name": "world"}
//! ```
//! </p>
//! </details>
//! ~~~
//!
//! The scanner only recognizes structure. Whether the blocks form a valid
//! example is decided by the assembler.

use crate::error::{Location, SpecTestError, SpecTestResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use std::fmt;
use std::iter::Enumerate;
use std::str::Lines;

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(/?)(details|summary|p)\b[^>]*>").expect("valid tag regex"));
static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z ]*?)\s*:\s*(\S.*?)\s*$").expect("valid name regex")
});
static HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z ]*?)\s*:\s*$").expect("valid header regex"));

/// The recognized annotation sections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Input,
    Output,
    Config,
}

impl Section {
    /// Map a header label to a section, case-insensitively
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "example input" => Some(Section::Input),
            "example output" => Some(Section::Output),
            "test config" => Some(Section::Config),
            _ => None,
        }
    }

    pub fn fence_kind(self) -> FenceKind {
        match self {
            Section::Input => FenceKind::InputJson,
            Section::Output => FenceKind::OutputJson,
            Section::Config => FenceKind::ConfigJson,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Input => write!(f, "Example input"),
            Section::Output => write!(f, "Example output"),
            Section::Config => write!(f, "Test config"),
        }
    }
}

/// What a fenced code block holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenceKind {
    /// ```` ```wdl ```` source
    Source,
    InputJson,
    OutputJson,
    ConfigJson,
    /// JSON under a header that is not a recognized section
    Json,
}

/// A typed block of an annotated document. Lines are one-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// `<details>` opened an example
    ExampleStart { line: usize },
    /// A `label: value` line inside the summary
    Name {
        label: String,
        value: String,
        line: usize,
    },
    /// `</summary>` closed the summary; what follows is the annotation region
    AnnotationStart { line: usize },
    /// A `label:` line introducing a fenced section
    SectionHeader { label: String, line: usize },
    CodeFence {
        kind: FenceKind,
        text: String,
        line: usize,
    },
    /// `</details>` closed the example
    ExampleEnd { line: usize },
}

impl Block {
    pub fn line(&self) -> usize {
        match self {
            Block::ExampleStart { line }
            | Block::Name { line, .. }
            | Block::AnnotationStart { line }
            | Block::SectionHeader { line, .. }
            | Block::CodeFence { line, .. }
            | Block::ExampleEnd { line } => *line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Prose,
    Summary,
    Annotation,
}

#[derive(Debug, Clone)]
struct PendingHeader {
    label: String,
    line: usize,
    section: Option<Section>,
}

/// Lazy block iterator over one document.
///
/// Yields at most one error, after which the sequence ends. Cloning the
/// scanner (or calling [`scan`] again) restarts from the same position.
#[derive(Debug, Clone)]
pub struct BlockScanner<'a> {
    document: &'a str,
    lines: Enumerate<Lines<'a>>,
    queue: VecDeque<Block>,
    region: Region,
    example_line: usize,
    pending_header: Option<PendingHeader>,
    done: bool,
}

/// Start scanning `content`, reporting errors against `document`
pub fn scan<'a>(document: &'a str, content: &'a str) -> BlockScanner<'a> {
    BlockScanner {
        document,
        lines: content.lines().enumerate(),
        queue: VecDeque::new(),
        region: Region::Prose,
        example_line: 0,
        pending_header: None,
        done: false,
    }
}

impl<'a> BlockScanner<'a> {
    fn location(&self, line: usize) -> Location {
        Location::new(self.document, Some(line))
    }

    fn in_example(&self) -> bool {
        self.region != Region::Prose
    }

    fn process_line(&mut self, line_no: usize, line: &'a str) -> SpecTestResult<()> {
        let trimmed = line.trim();

        if let Some(info) = trimmed.strip_prefix("```") {
            return self.process_fence(line_no, info.trim());
        }

        if let Some(pending) = &self.pending_header {
            if trimmed.is_empty() {
                return Ok(());
            }
            return Err(SpecTestError::malformed(
                self.location(pending.line),
                format!(
                    "section header '{}' is not followed by a json code block",
                    pending.label
                ),
            ));
        }

        self.process_markup(line_no, line)
    }

    /// Split `line` into tags and the text between them
    fn process_markup(&mut self, line_no: usize, line: &str) -> SpecTestResult<()> {
        let mut last = 0;
        for caps in TAG_RE.captures_iter(line) {
            let (start, end) = match caps.get(0) {
                Some(m) => (m.start(), m.end()),
                None => continue,
            };
            self.process_text(line_no, &line[last..start]);
            last = end;
            let closing = caps.get(1).map_or(false, |m| !m.as_str().is_empty());
            let tag = caps
                .get(2)
                .map(|m| m.as_str().to_ascii_lowercase())
                .unwrap_or_default();
            self.process_tag(line_no, &tag, closing)?;
        }
        self.process_text(line_no, &line[last..]);
        Ok(())
    }

    fn process_tag(&mut self, line_no: usize, tag: &str, closing: bool) -> SpecTestResult<()> {
        match (tag, closing) {
            ("details", false) => {
                if self.in_example() {
                    return Err(SpecTestError::malformed(
                        self.location(line_no),
                        format!(
                            "<details> opened while the example from line {} is still open",
                            self.example_line
                        ),
                    ));
                }
                self.region = Region::Summary;
                self.example_line = line_no;
                self.queue.push_back(Block::ExampleStart { line: line_no });
            }
            ("details", true) => {
                if !self.in_example() {
                    return Err(SpecTestError::malformed(
                        self.location(line_no),
                        "</details> without a matching <details>",
                    ));
                }
                self.region = Region::Prose;
                self.queue.push_back(Block::ExampleEnd { line: line_no });
            }
            ("summary", true) if self.region == Region::Summary => {
                self.region = Region::Annotation;
                self.queue.push_back(Block::AnnotationStart { line: line_no });
            }
            _ => {}
        }
        Ok(())
    }

    fn process_text(&mut self, line_no: usize, text: &str) {
        let text = text.trim();
        if text.is_empty() || !self.in_example() {
            return;
        }

        if let Some(caps) = HEADER_RE.captures(text) {
            let label = caps[1].to_string();
            self.pending_header = Some(PendingHeader {
                section: Section::from_label(&label),
                label: label.clone(),
                line: line_no,
            });
            self.queue.push_back(Block::SectionHeader {
                label,
                line: line_no,
            });
            return;
        }

        if self.region == Region::Summary {
            if let Some(caps) = NAME_RE.captures(text) {
                self.queue.push_back(Block::Name {
                    label: caps[1].to_string(),
                    value: caps[2].to_string(),
                    line: line_no,
                });
            }
        }
    }

    fn process_fence(&mut self, line_no: usize, info: &str) -> SpecTestResult<()> {
        let mut body = Vec::new();
        let mut closing = None;
        for (index, line) in self.lines.by_ref() {
            if let Some(rest) = line.trim_start().strip_prefix("```") {
                // tags may follow the closing backticks, as in ```</summary>
                closing = Some((index + 1, rest.trim_start_matches('`')));
                break;
            }
            body.push(line);
        }
        let (close_no, rest) = closing.ok_or_else(|| {
            SpecTestError::malformed(self.location(line_no), "code block is never closed")
        })?;

        // code samples in prose are not ours to judge
        if self.in_example() {
            self.push_fence(line_no, info, &body)?;
        }
        self.process_markup(close_no, rest)
    }

    fn push_fence(&mut self, line_no: usize, info: &str, body: &[&str]) -> SpecTestResult<()> {
        let tag = info
            .split(|c: char| c.is_whitespace() || c == ',' || c == '{')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        let pending = self.pending_header.take();

        let kind = match tag.as_str() {
            "" => {
                return Err(SpecTestError::malformed(
                    self.location(line_no),
                    "code block inside an example lacks an info-string tag (wdl or json)",
                ))
            }
            "wdl" => {
                if let Some(pending) = pending {
                    return Err(SpecTestError::malformed(
                        self.location(pending.line),
                        format!(
                            "section header '{}' is followed by a wdl code block instead of json",
                            pending.label
                        ),
                    ));
                }
                FenceKind::Source
            }
            "json" => pending
                .and_then(|p| p.section)
                .map(Section::fence_kind)
                .unwrap_or(FenceKind::Json),
            other => {
                return Err(SpecTestError::malformed(
                    self.location(line_no),
                    format!("unsupported code block tag '{}' inside an example", other),
                ))
            }
        };

        let text = match kind {
            FenceKind::Source => body.join("\n").trim().to_string(),
            _ => body.join("\n"),
        };
        self.queue.push_back(Block::CodeFence {
            kind,
            text,
            line: line_no,
        });
        Ok(())
    }

    fn finish(&mut self) -> SpecTestResult<()> {
        if let Some(pending) = &self.pending_header {
            return Err(SpecTestError::malformed(
                self.location(pending.line),
                format!(
                    "section header '{}' is not followed by a json code block",
                    pending.label
                ),
            ));
        }
        if self.in_example() {
            return Err(SpecTestError::malformed(
                self.location(self.example_line),
                "<details> is never closed",
            ));
        }
        Ok(())
    }
}

impl<'a> Iterator for BlockScanner<'a> {
    type Item = SpecTestResult<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(block) = self.queue.pop_front() {
                return Some(Ok(block));
            }
            if self.done {
                return None;
            }
            let step = match self.lines.next() {
                Some((index, line)) => self.process_line(index + 1, line),
                None => {
                    self.done = true;
                    self.finish()
                }
            };
            if let Err(e) = step {
                self.done = true;
                self.queue.clear();
                return Some(Err(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"# Hello

Some prose with `code`.

<details>
<summary>
Example: hello_task.wdl

```wdl
version 1.1

task hello {
  command <<< echo hi >>>
}
```
</summary>
<p>
Example input:

```json
{"hello.name": "world"}
```

Test config:

```json
{"type": "task"}
```
</p>
</details>
"#;

    fn blocks(content: &str) -> SpecTestResult<Vec<Block>> {
        scan("SPEC.md", content).collect()
    }

    #[test]
    fn test_scan_example() {
        let blocks = blocks(DOC).unwrap();
        assert_eq!(blocks[0], Block::ExampleStart { line: 5 });
        assert_eq!(
            blocks[1],
            Block::Name {
                label: "Example".to_string(),
                value: "hello_task.wdl".to_string(),
                line: 7
            }
        );
        match &blocks[2] {
            Block::CodeFence { kind, text, .. } => {
                assert_eq!(*kind, FenceKind::Source);
                assert!(text.starts_with("version 1.1"));
                assert!(text.ends_with('}'));
            }
            other => panic!("Expected wdl fence, got {:?}", other),
        }
        assert_eq!(blocks[3], Block::AnnotationStart { line: 16 });
        assert!(matches!(
            &blocks[4],
            Block::SectionHeader { label, .. } if label == "Example input"
        ));
        assert!(matches!(
            &blocks[5],
            Block::CodeFence { kind: FenceKind::InputJson, .. }
        ));
        assert!(matches!(
            &blocks[7],
            Block::CodeFence { kind: FenceKind::ConfigJson, .. }
        ));
        assert_eq!(blocks.last(), Some(&Block::ExampleEnd { line: 30 }));
    }

    #[test]
    fn test_scan_is_restartable() {
        let scanner = scan("SPEC.md", DOC);
        let first: Vec<_> = scanner.clone().collect::<SpecTestResult<_>>().unwrap();
        let second: Vec<_> = scanner.collect::<SpecTestResult<_>>().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_prose_fences_are_skipped() {
        let content = "```\n<details>\n```\n\n```wdl\nversion 1.0\n```\n";
        assert!(blocks(content).unwrap().is_empty());
    }

    #[test]
    fn test_fence_without_tag() {
        let content = "<details>\n<summary>\nExample: a.wdl\n```\nversion 1.0\n```\n</summary>\n\
            </details>\n";
        let err = blocks(content).unwrap_err();
        assert!(matches!(err, SpecTestError::MalformedBlock { .. }));
        assert_eq!(err.location().line, Some(4));
    }

    #[test]
    fn test_header_not_followed_by_fence() {
        let content = "<details>\n<summary>\nExample: a.wdl\n```wdl\nversion 1.0\n```\n\
            </summary>\n<p>\nExample input:\nsome prose\n</p>\n</details>\n";
        let err = blocks(content).unwrap_err();
        match err {
            SpecTestError::MalformedBlock { location, message } => {
                assert_eq!(location.line, Some(9));
                assert!(message.contains("Example input"));
            }
            other => panic!("Expected malformed block, got {:?}", other),
        }
    }

    #[test]
    fn test_end_without_start() {
        let err = blocks("text\n</details>\n").unwrap_err();
        assert!(matches!(err, SpecTestError::MalformedBlock { .. }));
    }

    #[test]
    fn test_unclosed_example() {
        let err = blocks("<details>\n<summary>\nExample: a.wdl\n").unwrap_err();
        assert_eq!(err.location().line, Some(1));
    }

    #[test]
    fn test_error_ends_sequence() {
        let mut scanner = scan("SPEC.md", "</details>\n<details>\n</details>\n");
        assert!(matches!(scanner.next(), Some(Err(_))));
        assert!(scanner.next().is_none());
    }

    #[test]
    fn test_summary_closed_on_fence_line() {
        let content = "<details>\n<summary>\nExample: compact.wdl\n\n```wdl\nversion 1.1\n\
            workflow compact {}\n```</summary>\n<p>\nExample input:\n\n```json\n\
            {\"compact.x\": 1}\n```</p>\n</details>\n";
        let blocks = blocks(content).unwrap();
        assert_eq!(blocks[3], Block::AnnotationStart { line: 8 });
        assert!(matches!(
            &blocks[5],
            Block::CodeFence { kind: FenceKind::InputJson, text, .. } if text.contains("compact.x")
        ));
        assert_eq!(blocks.last(), Some(&Block::ExampleEnd { line: 15 }));
    }

    #[test]
    fn test_inline_tags() {
        let content = "<details><summary>Example: inline.wdl\n```wdl\nversion 1.0\n```\n\
            </summary></details>\n";
        let blocks = blocks(content).unwrap();
        assert_eq!(blocks.len(), 5);
        assert!(matches!(&blocks[1], Block::Name { value, .. } if value == "inline.wdl"));
    }
}

//! Concurrent extraction of independent documents and suite directories
//!
//! Suites share no state, so each input runs on its own blocking task.
//! A failing input yields an error in its own slot and the rest carry on.

use super::{SpecExtractor, TestSuite};
use crate::error::{Location, SpecTestError, SpecTestResult};
use std::io;
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// One input of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// An annotated Markdown document on disk
    Document(PathBuf),
    /// A hand-authored suite directory
    Directory(PathBuf),
    /// Document text already in memory
    Text { document: String, content: String },
}

impl Source {
    /// A directory if `path` is one, otherwise a document
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.is_dir() {
            Source::Directory(path.to_path_buf())
        } else {
            Source::Document(path.to_path_buf())
        }
    }

    /// Identifier used in results and errors
    pub fn name(&self) -> String {
        match self {
            Source::Document(path) | Source::Directory(path) => path.display().to_string(),
            Source::Text { document, .. } => document.clone(),
        }
    }

    fn extract(&self, extractor: &SpecExtractor) -> SpecTestResult<TestSuite> {
        match self {
            Source::Document(path) => extractor.extract_file(path),
            Source::Directory(path) => extractor.extract_directory(path),
            Source::Text { document, content } => extractor.extract_str(document, content),
        }
    }
}

/// Outcome for one input, in input order
#[derive(Debug)]
pub struct BatchResult {
    pub source: String,
    pub result: SpecTestResult<TestSuite>,
}

impl BatchResult {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Extract every source concurrently. Results come back in input order.
pub async fn extract_all(extractor: &SpecExtractor, sources: Vec<Source>) -> Vec<BatchResult> {
    let mut set = JoinSet::new();
    let names: Vec<String> = sources.iter().map(Source::name).collect();

    for (index, source) in sources.into_iter().enumerate() {
        let extractor = extractor.clone();
        set.spawn_blocking(move || (index, source.extract(&extractor)));
    }

    let mut slots: Vec<Option<SpecTestResult<TestSuite>>> = names.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, result)) => {
                if let Err(err) = &result {
                    warn!(source = %names[index], kind = err.kind(), "extraction failed: {}", err);
                } else {
                    debug!(source = %names[index], "extraction finished");
                }
                slots[index] = Some(result);
            }
            // the index is lost with the task, so the slot stays empty
            Err(err) => warn!("extraction task did not complete: {}", err),
        }
    }

    names
        .into_iter()
        .zip(slots)
        .map(|(source, slot)| {
            let result = slot.unwrap_or_else(|| {
                Err(SpecTestError::Io {
                    location: Location::document(source.clone()),
                    message: format!("Extraction of {} did not complete", source),
                    source: io::Error::new(io::ErrorKind::Other, "extraction task aborted"),
                })
            });
            BatchResult { source, result }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const GOOD: &str = "<details>\n<summary>\nExample: hello\n\n```wdl\nversion 1.1\n\
        workflow hello {}\n```\n</summary>\n</details>\n";
    const BROKEN: &str = "<details>\n<summary>\nExample: broken\n</summary>\n</details>\n";

    fn text(document: &str, content: &str) -> Source {
        Source::Text {
            document: document.to_string(),
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_others() {
        let results = extract_all(
            &SpecExtractor::new(),
            vec![text("a.md", GOOD), text("b.md", BROKEN), text("c.md", GOOD)],
        )
        .await;

        let names: Vec<_> = results.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(names, vec!["a.md", "b.md", "c.md"]);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1].result,
            Err(SpecTestError::MissingCode { .. })
        ));
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn test_mixed_sources() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("SPEC.md");
        fs::write(&doc, GOOD).unwrap();
        let suite_dir = dir.path().join("suite");
        fs::create_dir(&suite_dir).unwrap();
        fs::write(suite_dir.join("t_task.wdl"), "version 1.1\ntask t {}").unwrap();

        let sources = vec![Source::from_path(&doc), Source::from_path(&suite_dir)];
        assert!(matches!(sources[1], Source::Directory(_)));

        let results = extract_all(&SpecExtractor::new(), sources).await;
        let hello = results[0].result.as_ref().unwrap();
        assert!(hello.case("hello").is_some());
        let suite = results[1].result.as_ref().unwrap();
        assert!(suite.case("t").is_some());
    }
}

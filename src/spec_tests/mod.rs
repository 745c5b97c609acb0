//! Conformance test extraction
//!
//! A document is turned into a [`TestSuite`] in five steps: [`scanner`]
//! cuts it into blocks, [`assembler`] groups blocks into examples,
//! [`naming`] infers defaults from each example name, [`config`] merges
//! those with explicit settings, and [`suite`] validates the result. The
//! [`propagate`] pass then folds dependencies through the reference graph.

use std::fs;
use std::path::Path;

pub mod assembler;
pub mod batch;
pub mod config;
pub mod directory;
pub mod graph;
pub mod naming;
pub mod propagate;
pub mod scanner;
pub mod suite;
pub mod test_case;
pub mod verdict;

pub use assembler::{Example, ExampleAssembler};
pub use batch::{extract_all, BatchResult, Source};
pub use config::{ExtractConfig, ExtractConfigBuilder, GlobalDefaults};
pub use graph::ReferenceGraph;
pub use propagate::propagate;
pub use suite::{SuiteBuilder, TestSuite};
pub use test_case::{JsonMap, Priority, ReturnCode, TestCase, TestType};
pub use verdict::{evaluate, Observation, Outcome, Verdict};

use crate::error::{IoContext, SpecTestResult};
use config::{merge, UnitSource};
use naming::{resolve_name, with_extension};

/// Main entry point for extracting conformance suites
#[derive(Debug, Clone, Default)]
pub struct SpecExtractor {
    config: ExtractConfig,
}

impl SpecExtractor {
    /// Create an extractor with default settings
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ExtractConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Scan and assemble the examples of a document without resolving them
    pub fn examples(&self, document: &str, content: &str) -> SpecTestResult<Vec<Example>> {
        ExampleAssembler::new(document)
            .with_strict(self.config.strict)
            .assemble(scanner::scan(document, content))
    }

    /// Extract, validate and propagate the suite of one document.
    ///
    /// `document` only identifies the source in errors and in the suite.
    pub fn extract_str(&self, document: &str, content: &str) -> SpecTestResult<TestSuite> {
        let examples = self.examples(document, content)?;

        let mut builder = SuiteBuilder::new(document)
            .with_expected_version(self.config.expected_version.clone())
            .with_data_dir(self.config.data_dir.clone());

        for example in examples {
            let inferred = resolve_name(&example.name);
            let unit = UnitSource {
                path: with_extension(&example.name),
                location: crate::error::Location::new(document, Some(example.line)),
                name: example.name,
                code: example.code,
                input: example.input_block,
                output: example.output_block,
            };
            let case = merge(
                unit,
                inferred,
                example.config_block.as_ref(),
                &self.config.defaults,
            )?;
            builder.push(case);
        }

        let mut suite = builder.build()?;
        propagate(&mut suite)?;
        Ok(suite)
    }

    /// Read and extract a document from disk
    pub fn extract_file<P: AsRef<Path>>(&self, path: P) -> SpecTestResult<TestSuite> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).io_context("Failed to read", path)?;
        self.extract_str(&path.display().to_string(), &content)
    }

    /// Load, validate and propagate a hand-authored suite directory
    pub fn extract_directory<P: AsRef<Path>>(&self, dir: P) -> SpecTestResult<TestSuite> {
        let mut suite = directory::load_suite_dir(dir.as_ref(), &self.config)?;
        propagate(&mut suite)?;
        Ok(suite)
    }
}

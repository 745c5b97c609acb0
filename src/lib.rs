//! # flowy-conformance
//!
//! Extraction of WDL conformance test cases from annotated specification
//! documents and hand-authored suite directories.
//!
//! Each document or directory becomes a validated [`TestSuite`] whose cases
//! carry their effective dependencies and priority, ready to hand to an
//! execution harness.

pub mod error;
pub mod spec_tests;

pub use error::{Location, SpecTestError, SpecTestResult};
pub use spec_tests::{
    evaluate, extract_all, ExtractConfig, ExtractConfigBuilder, Observation, Outcome, Priority,
    ReturnCode, Source, SpecExtractor, TestCase, TestSuite, TestType, Verdict,
};

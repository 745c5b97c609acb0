//! Error types and source location tracking for conformance test extraction.
//!
//! Every error is scoped to one document or suite directory and carries enough
//! context for a contributor to find the offending construct: the document
//! identifier, the line where known, and the example name or test-case id.

use std::fmt;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Where an error was found.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    /// Document path or suite directory the construct came from
    pub document: String,
    /// One-based line number, when the construct has one
    pub line: Option<usize>,
}

impl Location {
    pub fn new<S: Into<String>>(document: S, line: Option<usize>) -> Self {
        Self {
            document: document.into(),
            line,
        }
    }

    /// Location of a whole document (no line)
    pub fn document<S: Into<String>>(document: S) -> Self {
        Self::new(document, None)
    }

    /// Same document, different line
    pub fn at_line(&self, line: usize) -> Self {
        Self::new(self.document.clone(), Some(line))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.document, line),
            None => write!(f, "{}", self.document),
        }
    }
}

/// Main error type for extraction, validation and propagation.
#[derive(Error, Debug)]
pub enum SpecTestError {
    /// The block structure of a document is broken
    #[error("{location}: malformed block: {message}")]
    MalformedBlock { location: Location, message: String },

    /// Two examples in the same document declare the same name
    #[error("{location}: duplicate example name '{name}' (first declared on line {first_line})")]
    DuplicateName {
        location: Location,
        name: String,
        first_line: usize,
    },

    /// An example has no WDL code fence
    #[error("{location}: example '{name}' has no wdl code block")]
    MissingCode { location: Location, name: String },

    /// An annotation header that is not one of the recognized sections (strict mode)
    #[error("{location}: example '{name}' has unknown section '{label}'")]
    UnknownSection {
        location: Location,
        name: String,
        label: String,
    },

    /// A config value has the wrong shape
    #[error("{location}: invalid config for '{name}': {message}")]
    InvalidConfig {
        location: Location,
        name: String,
        message: String,
    },

    /// A unit's code carries no `version` statement
    #[error("{location}: '{name}' does not contain a version statement")]
    MissingVersion { location: Location, name: String },

    /// Two test cases in one suite share an id
    #[error("{location}: duplicate test id '{id}'")]
    DuplicateId { location: Location, id: String },

    /// Test cases in one suite declare different WDL versions
    #[error("{location}: '{id}' declares version {found} but the suite uses version {expected}")]
    VersionMismatch {
        location: Location,
        id: String,
        expected: String,
        found: String,
    },

    /// An import names a unit that is not part of the suite
    #[error("{location}: '{id}' imports '{uri}' which is not part of this suite")]
    UnresolvedImport {
        location: Location,
        id: String,
        uri: String,
    },

    /// The reference graph contains a cycle
    #[error("{location}: cyclic imports between {}", .cycle.join(" -> "))]
    CyclicImport { location: Location, cycle: Vec<String> },

    /// Failure reading a suite directory, sidecar or document
    #[error("{location}: {message}")]
    Io {
        location: Location,
        message: String,
        #[source]
        source: io::Error,
    },
}

pub type SpecTestResult<T> = Result<T, SpecTestError>;

impl SpecTestError {
    /// Create a malformed block error.
    pub fn malformed<S: Into<String>>(location: Location, message: S) -> Self {
        SpecTestError::MalformedBlock {
            location,
            message: message.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config<N: Into<String>, S: Into<String>>(
        location: Location,
        name: N,
        message: S,
    ) -> Self {
        SpecTestError::InvalidConfig {
            location,
            name: name.into(),
            message: message.into(),
        }
    }

    /// The location of the offending construct.
    pub fn location(&self) -> &Location {
        match self {
            SpecTestError::MalformedBlock { location, .. }
            | SpecTestError::DuplicateName { location, .. }
            | SpecTestError::MissingCode { location, .. }
            | SpecTestError::UnknownSection { location, .. }
            | SpecTestError::InvalidConfig { location, .. }
            | SpecTestError::MissingVersion { location, .. }
            | SpecTestError::DuplicateId { location, .. }
            | SpecTestError::VersionMismatch { location, .. }
            | SpecTestError::UnresolvedImport { location, .. }
            | SpecTestError::CyclicImport { location, .. }
            | SpecTestError::Io { location, .. } => location,
        }
    }

    /// Short kind name, stable across messages
    pub fn kind(&self) -> &'static str {
        match self {
            SpecTestError::MalformedBlock { .. } => "MalformedBlockError",
            SpecTestError::DuplicateName { .. } => "DuplicateNameError",
            SpecTestError::MissingCode { .. } => "MissingCodeError",
            SpecTestError::UnknownSection { .. } => "UnknownSectionError",
            SpecTestError::InvalidConfig { .. } => "InvalidConfigError",
            SpecTestError::MissingVersion { .. } => "MissingVersionError",
            SpecTestError::DuplicateId { .. } => "DuplicateIdError",
            SpecTestError::VersionMismatch { .. } => "VersionMismatchError",
            SpecTestError::UnresolvedImport { .. } => "UnresolvedImportError",
            SpecTestError::CyclicImport { .. } => "CyclicImportError",
            SpecTestError::Io { .. } => "IoError",
        }
    }
}

/// Attach a path to `io::Error`s.
pub trait IoContext<T> {
    fn io_context(self, message: &str, path: &Path) -> SpecTestResult<T>;
}

impl<T> IoContext<T> for Result<T, io::Error> {
    fn io_context(self, message: &str, path: &Path) -> SpecTestResult<T> {
        self.map_err(|source| SpecTestError::Io {
            location: Location::document(path.display().to_string()),
            message: format!("{} {}: {}", message, path.display(), source),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display() {
        let loc = Location::new("SPEC.md", Some(12));
        assert_eq!(loc.to_string(), "SPEC.md:12");
        assert_eq!(Location::document("tests/").to_string(), "tests/");
        assert_eq!(loc.at_line(40).line, Some(40));
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = SpecTestError::DuplicateName {
            location: Location::new("SPEC.md", Some(30)),
            name: "hello".to_string(),
            first_line: 10,
        };
        let message = err.to_string();
        assert!(message.contains("SPEC.md:30"));
        assert!(message.contains("hello"));
        assert!(message.contains("line 10"));
        assert_eq!(err.kind(), "DuplicateNameError");
    }

    #[test]
    fn test_cycle_message() {
        let err = SpecTestError::CyclicImport {
            location: Location::document("SPEC.md"),
            cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "SPEC.md: cyclic imports between a -> b -> a");
        assert_eq!(err.location().document, "SPEC.md");
    }

    #[test]
    fn test_io_context() {
        let result: Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let err = result
            .io_context("Failed to read", Path::new("/tmp/x.wdl"))
            .unwrap_err();
        match err {
            SpecTestError::Io { message, .. } => {
                assert!(message.contains("/tmp/x.wdl"));
            }
            other => panic!("Expected io error, got {:?}", other),
        }
    }
}

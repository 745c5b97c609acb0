//! Extraction settings and the config merger
//!
//! A test case's fields come from three places, in decreasing precedence:
//! the explicit config object (a `Test config` section or a sidecar entry),
//! the defaults implied by the unit's name (type, fail and target only), and
//! the global defaults held in [`GlobalDefaults`].

use super::naming::InferredNaming;
use super::test_case::{JsonMap, Priority, ReturnCode, TestCase, TestType};
use crate::error::{IoContext, Location, SpecTestError, SpecTestResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*version\s+([A-Za-z0-9_.\-]+)").expect("valid version regex")
});

const KNOWN_KEYS: &[&str] = &[
    "id",
    "path",
    "type",
    "target",
    "priority",
    "fail",
    "exclude_output",
    "return_code",
    "returnCodes",
    "dependencies",
    "tags",
    "input",
    "output",
];

/// Values used when neither the config nor the name says otherwise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalDefaults {
    pub priority: Priority,
    pub return_code: ReturnCode,
    pub exclude_output: BTreeSet<String>,
    pub dependencies: BTreeSet<String>,
    pub tags: BTreeSet<String>,
}

impl Default for GlobalDefaults {
    fn default() -> Self {
        Self {
            priority: Priority::Required,
            return_code: ReturnCode::Any,
            exclude_output: BTreeSet::new(),
            dependencies: BTreeSet::new(),
            tags: BTreeSet::new(),
        }
    }
}

/// Settings for one extraction run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Unknown sections are fatal unless this is false
    pub strict: bool,
    /// When set, every unit must declare exactly this WDL version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<String>,
    /// Root for file-valued parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Name of the per-directory config array
    pub sidecar_name: String,
    pub defaults: GlobalDefaults,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            strict: true,
            expected_version: None,
            data_dir: None,
            sidecar_name: "test_config.json".to_string(),
            defaults: GlobalDefaults::default(),
        }
    }
}

impl ExtractConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read settings from a TOML file. A missing file gives the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> SpecTestResult<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => toml::from_str::<ExtractConfig>(&contents).map_err(|e| {
                SpecTestError::invalid_config(
                    Location::document(path.display().to_string()),
                    "settings",
                    format!("failed to parse as TOML: {}", e),
                )
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(ExtractConfig::default()),
            Err(err) => Err::<ExtractConfig, _>(err).io_context("Failed to read", path),
        }
    }

    /// Serialize settings as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }
}

/// Fluent construction of [`ExtractConfig`]
pub struct ExtractConfigBuilder {
    config: ExtractConfig,
}

impl ExtractConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ExtractConfig::default(),
        }
    }

    pub fn lenient(mut self) -> Self {
        self.config.strict = false;
        self
    }

    pub fn expected_version<S: Into<String>>(mut self, version: S) -> Self {
        self.config.expected_version = Some(version.into());
        self
    }

    pub fn data_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.data_dir = Some(dir.into());
        self
    }

    pub fn sidecar_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.sidecar_name = name.into();
        self
    }

    pub fn default_priority(mut self, priority: Priority) -> Self {
        self.config.defaults.priority = priority;
        self
    }

    pub fn default_tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.config.defaults.tags.insert(tag.into());
        self
    }

    pub fn build(self) -> ExtractConfig {
        self.config
    }
}

impl Default for ExtractConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything about a unit that is not policy: where it came from and its payload
#[derive(Debug, Clone)]
pub struct UnitSource {
    /// Declared example name or file name
    pub name: String,
    /// Path relative to the suite root
    pub path: String,
    pub code: String,
    pub input: Option<JsonMap>,
    pub output: Option<JsonMap>,
    pub location: Location,
}

/// The value of the first `version` statement in `code`
pub fn language_version(code: &str) -> Option<String> {
    VERSION_RE
        .captures(code)
        .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()))
}

/// Merge explicit config over inferred naming over global defaults.
pub fn merge(
    unit: UnitSource,
    inferred: InferredNaming,
    explicit: Option<&JsonMap>,
    defaults: &GlobalDefaults,
) -> SpecTestResult<TestCase> {
    let empty = JsonMap::new();
    let explicit = explicit.unwrap_or(&empty);
    let fields = ConfigFields {
        map: explicit,
        unit: &unit,
    };

    for key in explicit.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            warn!(
                location = %unit.location,
                name = %unit.name,
                "ignoring unknown config key '{}'",
                key
            );
        }
    }

    let test_type = match fields.string("type")? {
        Some(raw) => raw
            .parse::<TestType>()
            .map_err(|message| fields.invalid(message))?,
        None => inferred.test_type,
    };
    let priority = match fields.string("priority")? {
        Some(raw) => raw
            .parse::<Priority>()
            .map_err(|message| fields.invalid(message))?,
        None => defaults.priority,
    };
    let fail = match explicit.get("fail") {
        Some(Value::Bool(fail)) => *fail,
        Some(other) => {
            return Err(fields.invalid(format!("fail must be a boolean; found {}", other)))
        }
        None => inferred.fail,
    };
    let return_code = match explicit.get("return_code").or_else(|| explicit.get("returnCodes")) {
        Some(raw) => ReturnCode::from_json(raw).map_err(|message| fields.invalid(message))?,
        None => defaults.return_code.clone(),
    };
    let target = fields.string("target")?.unwrap_or(inferred.target);
    let id = fields.string("id")?.unwrap_or_else(|| target.clone());
    let path = fields.string("path")?.unwrap_or_else(|| unit.path.clone());
    let exclude_outputs = fields
        .string_set("exclude_output")?
        .unwrap_or_else(|| defaults.exclude_output.clone());
    let dependencies = fields
        .string_set("dependencies")?
        .unwrap_or_else(|| defaults.dependencies.clone());
    let tags = fields
        .string_set("tags")?
        .unwrap_or_else(|| defaults.tags.clone());
    let input = match unit.input.clone() {
        Some(input) => input,
        None => fields.object("input")?.unwrap_or_default(),
    };
    let output = match unit.output.clone() {
        Some(output) => output,
        None => fields.object("output")?.unwrap_or_default(),
    };

    let language_version =
        language_version(&unit.code).ok_or_else(|| SpecTestError::MissingVersion {
            location: unit.location.clone(),
            name: unit.name.clone(),
        })?;

    Ok(TestCase {
        id,
        path,
        target,
        test_type,
        priority,
        fail,
        effective_return_code: return_code.clone(),
        return_code,
        exclude_outputs,
        effective_dependencies: dependencies.clone(),
        dependencies,
        tags,
        input,
        output,
        language_version,
        code: unit.code,
        line: unit.location.line,
        effective_priority: priority,
    })
}

struct ConfigFields<'a> {
    map: &'a JsonMap,
    unit: &'a UnitSource,
}

impl<'a> ConfigFields<'a> {
    fn invalid<S: Into<String>>(&self, message: S) -> SpecTestError {
        SpecTestError::invalid_config(self.unit.location.clone(), self.unit.name.clone(), message)
    }

    fn string(&self, key: &str) -> SpecTestResult<Option<String>> {
        match self.map.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(self.invalid(format!("{} must be a string; found {}", key, other))),
        }
    }

    /// A string or an array of strings
    fn string_set(&self, key: &str) -> SpecTestResult<Option<BTreeSet<String>>> {
        match self.map.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(std::iter::once(s.clone()).collect())),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(self.invalid(format!(
                        "{} entries must be strings; found {}",
                        key, other
                    ))),
                })
                .collect::<SpecTestResult<BTreeSet<_>>>()
                .map(Some),
            Some(other) => Err(self.invalid(format!(
                "{} must be a string or an array of strings; found {}",
                key, other
            ))),
        }
    }

    fn object(&self, key: &str) -> SpecTestResult<Option<JsonMap>> {
        match self.map.get(key) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            )),
            Some(other) => Err(self.invalid(format!("{} must be an object; found {}", key, other))),
        }
    }
}

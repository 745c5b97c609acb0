use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Ordered JSON object, keyed by fully-qualified parameter name for inputs and outputs
pub type JsonMap = IndexMap<String, serde_json::Value>;

/// What kind of unit a test case targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Task,
    Workflow,
    /// Never run; only imported by other cases
    Resource,
}

/// How a failing test is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Failure is a hard error
    Required,
    /// Failure is a warning
    Optional,
    /// Not run
    Ignore,
}

/// Accepted return code(s) of a test target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ReturnCode {
    /// `*`, any code
    #[default]
    Any,
    Single(i64),
    OneOf(BTreeSet<i64>),
}

impl ReturnCode {
    /// Whether `code` satisfies this constraint
    pub fn matches(&self, code: i64) -> bool {
        match self {
            ReturnCode::Any => true,
            ReturnCode::Single(expected) => *expected == code,
            ReturnCode::OneOf(codes) => codes.contains(&code),
        }
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnCode::Any => write!(f, "*"),
            ReturnCode::Single(code) => write!(f, "{}", code),
            ReturnCode::OneOf(codes) => {
                let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
                write!(f, "[{}]", codes.join(", "))
            }
        }
    }
}

impl Serialize for ReturnCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ReturnCode::Any => serializer.serialize_str("*"),
            ReturnCode::Single(code) => serializer.serialize_i64(*code),
            ReturnCode::OneOf(codes) => codes.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ReturnCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        ReturnCode::from_json(&value).map_err(serde::de::Error::custom)
    }
}

impl ReturnCode {
    /// Read `*`, an integer, or an array of integers. Integers may be given as
    /// numeric strings.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, String> {
        use serde_json::Value;

        fn code(value: &Value) -> Result<i64, String> {
            match value {
                Value::Number(n) => n
                    .as_i64()
                    .ok_or_else(|| format!("return code {} is not an integer", n)),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| format!("return code '{}' is not an integer", s)),
                other => Err(format!("return code {} is not an integer", other)),
            }
        }

        match value {
            Value::String(s) if s.trim() == "*" => Ok(ReturnCode::Any),
            Value::Array(items) => {
                let codes = items.iter().map(code).collect::<Result<BTreeSet<_>, _>>()?;
                if codes.is_empty() {
                    return Err("return code list is empty".to_string());
                }
                Ok(ReturnCode::OneOf(codes))
            }
            Value::Number(_) | Value::String(_) => code(value).map(ReturnCode::Single),
            other => Err(format!(
                "return code must be '*', an integer or an array of integers; found {}",
                other
            )),
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestType::Task => write!(f, "task"),
            TestType::Workflow => write!(f, "workflow"),
            TestType::Resource => write!(f, "resource"),
        }
    }
}

impl FromStr for TestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task" => Ok(TestType::Task),
            "workflow" => Ok(TestType::Workflow),
            "resource" => Ok(TestType::Resource),
            other => Err(format!(
                "type must be one of task, workflow, resource; found '{}'",
                other
            )),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Required => write!(f, "required"),
            Priority::Optional => write!(f, "optional"),
            Priority::Ignore => write!(f, "ignore"),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "required" => Ok(Priority::Required),
            "optional" => Ok(Priority::Optional),
            "ignore" => Ok(Priority::Ignore),
            other => Err(format!(
                "priority must be one of required, optional, ignore; found '{}'",
                other
            )),
        }
    }
}

/// A fully resolved test case.
///
/// The `effective_*` fields start out equal to the declared ones and are
/// overwritten by dependency propagation once the suite is built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestCase {
    pub id: String,
    /// File name of the WDL unit, relative to the suite root
    pub path: String,
    /// Task or workflow name to invoke
    pub target: String,
    #[serde(rename = "type")]
    pub test_type: TestType,
    pub priority: Priority,
    /// The test passes only if execution fails
    pub fail: bool,
    #[serde(rename = "returnCodes")]
    pub return_code: ReturnCode,
    #[serde(rename = "exclude_output")]
    pub exclude_outputs: BTreeSet<String>,
    pub dependencies: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub input: JsonMap,
    pub output: JsonMap,
    /// Value of the unit's `version` statement
    pub language_version: String,
    #[serde(skip)]
    pub code: String,
    /// Line the case was declared on, if it came from a document
    #[serde(skip)]
    pub line: Option<usize>,
    pub effective_dependencies: BTreeSet<String>,
    pub effective_priority: Priority,
    pub effective_return_code: ReturnCode,
}

impl TestCase {
    /// Whether an execution harness should run this case
    pub fn is_runnable(&self) -> bool {
        self.test_type != TestType::Resource && self.effective_priority != Priority::Ignore
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_code_matches() {
        assert!(ReturnCode::Any.matches(42));
        assert!(ReturnCode::Single(1).matches(1));
        assert!(!ReturnCode::Single(1).matches(0));
        let codes = ReturnCode::OneOf([0, 3].into_iter().collect());
        assert!(codes.matches(3));
        assert!(!codes.matches(1));
        assert_eq!(codes.to_string(), "[0, 3]");
    }

    #[test]
    fn test_return_code_serializes_like_config() {
        assert_eq!(serde_json::to_string(&ReturnCode::Any).unwrap(), "\"*\"");
        assert_eq!(serde_json::to_string(&ReturnCode::Single(2)).unwrap(), "2");
        let codes = ReturnCode::OneOf([1, 0].into_iter().collect());
        assert_eq!(serde_json::to_string(&codes).unwrap(), "[0,1]");
    }

    #[test]
    fn test_return_code_from_json() {
        use serde_json::json;
        assert_eq!(ReturnCode::from_json(&json!("*")), Ok(ReturnCode::Any));
        assert_eq!(ReturnCode::from_json(&json!(1)), Ok(ReturnCode::Single(1)));
        assert_eq!(ReturnCode::from_json(&json!("3")), Ok(ReturnCode::Single(3)));
        assert_eq!(
            ReturnCode::from_json(&json!([0, "1"])),
            Ok(ReturnCode::OneOf([0, 1].into_iter().collect()))
        );
        assert!(ReturnCode::from_json(&json!(1.5)).is_err());
        assert!(ReturnCode::from_json(&json!("any")).is_err());
        assert!(ReturnCode::from_json(&json!([])).is_err());
        assert!(ReturnCode::from_json(&json!({"code": 1})).is_err());
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("task".parse::<TestType>(), Ok(TestType::Task));
        assert_eq!("ignore".parse::<Priority>(), Ok(Priority::Ignore));
        assert!("Task".parse::<TestType>().is_err());
        assert!("sometimes".parse::<Priority>().is_err());
    }
}

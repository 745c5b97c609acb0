//! Classifying an observed run of a test case
//!
//! Nothing here executes WDL. An execution harness runs the target and
//! reports what it saw as an [`Observation`]; [`evaluate`] turns that into a
//! [`Verdict`] according to the case's policy.

use super::test_case::{JsonMap, Priority, TestCase};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};

/// Result classes of one test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Pass,
    /// Failure of an optional case
    Warn,
    Fail,
    /// Not run
    Ignore,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => write!(f, "PASS"),
            Outcome::Warn => write!(f, "WARN"),
            Outcome::Fail => write!(f, "FAIL"),
            Outcome::Ignore => write!(f, "IGNORE"),
        }
    }
}

/// What the harness saw when it ran a case
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    /// The engine accepted and completed the run
    pub succeeded: bool,
    /// Return code of the target's command, if the harness reports one
    pub return_code: Option<i64>,
    /// Produced outputs, keyed by fully-qualified name
    pub outputs: JsonMap,
    /// Directory the run wrote its files to. File outputs under it are
    /// compared by their path relative to it.
    pub output_dir: Option<PathBuf>,
}

impl Observation {
    pub fn success(outputs: JsonMap) -> Self {
        Self {
            succeeded: true,
            return_code: None,
            outputs,
            output_dir: None,
        }
    }

    pub fn failure(return_code: Option<i64>) -> Self {
        Self {
            succeeded: false,
            return_code,
            outputs: JsonMap::new(),
            output_dir: None,
        }
    }

    pub fn with_return_code(mut self, code: i64) -> Self {
        self.return_code = Some(code);
        self
    }

    pub fn with_output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output_dir = Some(dir.into());
        self
    }
}

/// The outcome for one case, with the reasons behind a failure
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub id: String,
    pub outcome: Outcome,
    pub messages: Vec<String>,
}

impl Verdict {
    fn new(case: &TestCase, outcome: Outcome, messages: Vec<String>) -> Self {
        Self {
            id: case.id.clone(),
            outcome,
            messages,
        }
    }
}

/// `value` relative to `root` when it is a path under it
fn relative_to(value: &Value, root: Option<&Path>) -> Value {
    match (value, root) {
        (Value::String(path), Some(root)) => match Path::new(path).strip_prefix(root) {
            Ok(relative) => Value::String(relative.to_string_lossy().to_string()),
            Err(_) => value.clone(),
        },
        _ => value.clone(),
    }
}

fn check_outputs(case: &TestCase, observed: &Observation) -> Vec<String> {
    let mut problems = Vec::new();
    for (name, value) in &observed.outputs {
        if case.exclude_outputs.contains(name) {
            continue;
        }
        let value = &relative_to(value, observed.output_dir.as_deref());
        match case.output.get(name) {
            None => problems.push(format!("unexpected output {} = {}", name, value)),
            Some(expected) if expected != value => {
                problems.push(format!("{}: {} != {}", name, value, expected))
            }
            Some(_) => {}
        }
    }
    for name in case.output.keys() {
        if !case.exclude_outputs.contains(name) && !observed.outputs.contains_key(name) {
            problems.push(format!("missing output {}", name));
        }
    }
    problems
}

/// Classify an observed run of `case`.
pub fn evaluate(case: &TestCase, observed: &Observation) -> Verdict {
    if case.effective_priority == Priority::Ignore {
        return Verdict::new(case, Outcome::Ignore, Vec::new());
    }

    let problems = if case.fail {
        if observed.succeeded {
            vec!["expected to fail but succeeded".to_string()]
        } else {
            Vec::new()
        }
    } else if !observed.succeeded {
        let mut problems = vec!["failed unexpectedly".to_string()];
        if let Some(code) = observed.return_code {
            if !case.effective_return_code.matches(code) {
                problems.push(format!(
                    "return code {} does not match {}",
                    code, case.effective_return_code
                ));
            }
        }
        problems
    } else {
        let mut problems = Vec::new();
        if let Some(code) = observed.return_code {
            if !case.effective_return_code.matches(code) {
                problems.push(format!(
                    "return code {} does not match {}",
                    code, case.effective_return_code
                ));
            }
        }
        problems.extend(check_outputs(case, observed));
        problems
    };

    let outcome = match (problems.is_empty(), case.effective_priority) {
        (true, _) => Outcome::Pass,
        (false, Priority::Optional) => Outcome::Warn,
        (false, _) => Outcome::Fail,
    };
    Verdict::new(case, outcome, problems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec_tests::suite::tests::case;
    use crate::spec_tests::test_case::ReturnCode;
    use serde_json::json;

    fn outputs(value: serde_json::Value) -> JsonMap {
        serde_json::from_value(value).unwrap()
    }

    fn hello(config: serde_json::Value) -> TestCase {
        let mut config = config;
        config["output"] = json!({"hello.out": "hi", "hello.log": "x.log"});
        case("hello", "version 1.1\nworkflow hello {}", config)
    }

    #[test]
    fn test_matching_outputs_pass() {
        let case = hello(json!({"exclude_output": "hello.log"}));
        let observed =
            Observation::success(outputs(json!({"hello.out": "hi", "hello.log": "y.log"})));
        let verdict = evaluate(&case, &observed);
        assert_eq!(verdict.outcome, Outcome::Pass, "{:?}", verdict.messages);
    }

    #[test]
    fn test_mismatched_output_fails() {
        let case = hello(json!({}));
        let observed =
            Observation::success(outputs(json!({"hello.out": "bye", "hello.log": "x.log"})));
        let verdict = evaluate(&case, &observed);
        assert_eq!(verdict.outcome, Outcome::Fail);
        assert_eq!(verdict.messages, vec!["hello.out: \"bye\" != \"hi\"".to_string()]);
    }

    #[test]
    fn test_file_outputs_relative_to_output_dir() {
        let case = hello(json!({}));
        let produced = outputs(json!({"hello.out": "hi", "hello.log": "/runs/7/out/x.log"}));

        let verdict = evaluate(&case, &Observation::success(produced.clone()));
        assert_eq!(verdict.outcome, Outcome::Fail);

        let observed = Observation::success(produced).with_output_dir("/runs/7/out");
        let verdict = evaluate(&case, &observed);
        assert_eq!(verdict.outcome, Outcome::Pass, "{:?}", verdict.messages);
    }

    #[test]
    fn test_missing_and_unexpected_outputs() {
        let case = hello(json!({}));
        let observed = Observation::success(outputs(json!({"hello.extra": 1})));
        let verdict = evaluate(&case, &observed);
        assert_eq!(verdict.outcome, Outcome::Fail);
        assert_eq!(verdict.messages.len(), 3);
    }

    #[test]
    fn test_expected_failure_inverts() {
        let mut case = hello(json!({}));
        case.fail = true;
        assert_eq!(
            evaluate(&case, &Observation::failure(Some(1))).outcome,
            Outcome::Pass
        );
        assert_eq!(
            evaluate(&case, &Observation::success(JsonMap::new())).outcome,
            Outcome::Fail
        );
    }

    #[test]
    fn test_return_code_checked() {
        let mut case = hello(json!({"exclude_output": ["hello.out", "hello.log"]}));
        case.effective_return_code = ReturnCode::Single(1);
        let observed = Observation::success(JsonMap::new()).with_return_code(0);
        let verdict = evaluate(&case, &observed);
        assert_eq!(verdict.outcome, Outcome::Fail);

        let observed = Observation::success(JsonMap::new()).with_return_code(1);
        assert_eq!(evaluate(&case, &observed).outcome, Outcome::Pass);
    }

    #[test]
    fn test_optional_failure_warns_and_ignore_skips() {
        let mut case = hello(json!({}));
        case.effective_priority = Priority::Optional;
        assert_eq!(
            evaluate(&case, &Observation::failure(None)).outcome,
            Outcome::Warn
        );
        case.effective_priority = Priority::Ignore;
        assert_eq!(
            evaluate(&case, &Observation::failure(None)).outcome,
            Outcome::Ignore
        );
    }
}

//! Naming-convention defaults for test units
//!
//! File and example names encode a unit's role: `foo_task.wdl` is a task,
//! `foo_fail.wdl` is expected to fail, `foo_fail_task.wdl` is both and
//! `foo_resource.wdl` is only ever imported.

use super::test_case::TestType;

const WDL_EXTENSION: &str = ".wdl";

/// Defaults a name implies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferredNaming {
    pub test_type: TestType,
    pub fail: bool,
    pub target: String,
}

/// Strip a trailing `.wdl` extension, if any
pub fn strip_extension(name: &str) -> &str {
    name.strip_suffix(WDL_EXTENSION).unwrap_or(name)
}

/// `name` with a `.wdl` extension
pub fn with_extension(name: &str) -> String {
    if name.ends_with(WDL_EXTENSION) {
        name.to_string()
    } else {
        format!("{}{}", name, WDL_EXTENSION)
    }
}

/// Resolve the type, failure expectation and target implied by `name`.
///
/// Suffixes are checked in priority order: `_resource`, `_fail_task`,
/// `_task`, `_fail`. A name that is nothing but a suffix keeps itself as
/// the target.
pub fn resolve_name(name: &str) -> InferredNaming {
    let stem = strip_extension(name);
    let rules: [(&str, TestType, bool); 4] = [
        ("_resource", TestType::Resource, false),
        ("_fail_task", TestType::Task, true),
        ("_task", TestType::Task, false),
        ("_fail", TestType::Workflow, true),
    ];

    for (suffix, test_type, fail) in rules {
        if let Some(target) = stem.strip_suffix(suffix) {
            if target.is_empty() {
                continue;
            }
            return InferredNaming {
                test_type,
                fail,
                target: target.to_string(),
            };
        }
    }

    InferredNaming {
        test_type: TestType::Workflow,
        fail: false,
        target: stem.to_string(),
    }
}

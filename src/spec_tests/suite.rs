//! Suite model and its validation

use super::graph::ReferenceGraph;
use super::test_case::TestCase;
use crate::error::{Location, SpecTestError, SpecTestResult};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// All test cases from one document or directory
#[derive(Debug, Clone, Serialize)]
pub struct TestSuite {
    source_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    language_version: Option<String>,
    cases: Vec<TestCase>,
    #[serde(rename = "reference_graph", serialize_with = "serialize_graph")]
    graph: ReferenceGraph,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_dir: Option<PathBuf>,
}

fn serialize_graph<S: Serializer>(
    graph: &ReferenceGraph,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    graph.edges().serialize(serializer)
}

impl TestSuite {
    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    /// Version shared by every case; `None` for an empty suite
    pub fn language_version(&self) -> Option<&str> {
        self.language_version.as_deref()
    }

    /// Cases in source order
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn case(&self, id: &str) -> Option<&TestCase> {
        self.cases.iter().find(|case| case.id == id)
    }

    pub fn graph(&self) -> &ReferenceGraph {
        &self.graph
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Cases an execution harness should run, in source order
    pub fn runnable(&self) -> impl Iterator<Item = &TestCase> {
        self.cases.iter().filter(|case| case.is_runnable())
    }

    pub(crate) fn parts_mut(&mut self) -> (&ReferenceGraph, &mut [TestCase]) {
        (&self.graph, &mut self.cases)
    }

    /// The cases as a `test_config.json` array.
    ///
    /// `priority` carries the effective priority, so a runner that only
    /// reads `priority` still sees the dependency downgrade. The declared
    /// value is not part of the hand-off.
    pub fn to_config_json(&self) -> serde_json::Result<String> {
        let entries = self
            .cases
            .iter()
            .map(|case| -> serde_json::Result<serde_json::Value> {
                let mut entry = serde_json::to_value(case)?;
                if let Some(fields) = entry.as_object_mut() {
                    fields.insert(
                        "priority".to_string(),
                        serde_json::to_value(case.effective_priority)?,
                    );
                }
                Ok(entry)
            })
            .collect::<serde_json::Result<Vec<_>>>()?;
        serde_json::to_string_pretty(&entries)
    }
}

/// Collects the cases of one suite and validates them into a [`TestSuite`]
#[derive(Debug, Clone)]
pub struct SuiteBuilder {
    source_path: String,
    expected_version: Option<String>,
    data_dir: Option<PathBuf>,
    cases: Vec<TestCase>,
}

impl SuiteBuilder {
    pub fn new<S: Into<String>>(source_path: S) -> Self {
        Self {
            source_path: source_path.into(),
            expected_version: None,
            data_dir: None,
            cases: Vec::new(),
        }
    }

    /// Require every case to declare `version`
    pub fn with_expected_version(mut self, version: Option<String>) -> Self {
        self.expected_version = version;
        self
    }

    pub fn with_data_dir(mut self, data_dir: Option<PathBuf>) -> Self {
        self.data_dir = data_dir;
        self
    }

    pub fn push(&mut self, case: TestCase) {
        self.cases.push(case);
    }

    fn location(&self, case: &TestCase) -> Location {
        Location::new(self.source_path.clone(), case.line)
    }

    fn check_unique_ids(&self) -> SpecTestResult<()> {
        let mut seen: HashMap<&str, &TestCase> = HashMap::new();
        for case in &self.cases {
            if seen.insert(case.id.as_str(), case).is_some() {
                return Err(SpecTestError::DuplicateId {
                    location: self.location(case),
                    id: case.id.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_versions(&self) -> SpecTestResult<Option<String>> {
        let expected = self
            .expected_version
            .clone()
            .or_else(|| self.cases.first().map(|case| case.language_version.clone()));
        if let Some(expected) = &expected {
            for case in &self.cases {
                if &case.language_version != expected {
                    return Err(SpecTestError::VersionMismatch {
                        location: self.location(case),
                        id: case.id.clone(),
                        expected: expected.clone(),
                        found: case.language_version.clone(),
                    });
                }
            }
        }
        Ok(expected)
    }

    /// Validate and build the suite.
    ///
    /// Checks run in order: unique ids, one language version, imports that
    /// resolve inside the suite, and an acyclic reference graph.
    pub fn build(self) -> SpecTestResult<TestSuite> {
        self.check_unique_ids()?;
        let language_version = self.check_versions()?;
        let graph = ReferenceGraph::build(&self.source_path, &self.cases)?;
        if let Some(cycle) = graph.find_cycle() {
            let line = self
                .cases
                .iter()
                .find(|case| Some(&case.id) == cycle.first())
                .and_then(|case| case.line);
            return Err(SpecTestError::CyclicImport {
                location: Location::new(self.source_path.clone(), line),
                cycle,
            });
        }

        info!(
            source = %self.source_path,
            cases = self.cases.len(),
            edges = graph.edge_count(),
            "built test suite"
        );

        Ok(TestSuite {
            source_path: self.source_path,
            language_version,
            cases: self.cases,
            graph,
            data_dir: self.data_dir,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::spec_tests::config::{merge, GlobalDefaults, UnitSource};
    use crate::spec_tests::naming::{resolve_name, with_extension};
    use crate::spec_tests::test_case::JsonMap;

    /// A case named `name` with the given code and config
    pub(crate) fn case(name: &str, code: &str, config: serde_json::Value) -> TestCase {
        let explicit: JsonMap = serde_json::from_value(config).unwrap();
        merge(
            UnitSource {
                name: name.to_string(),
                path: with_extension(name),
                code: code.to_string(),
                input: None,
                output: None,
                location: Location::new("SPEC.md", Some(1)),
            },
            resolve_name(name),
            Some(&explicit),
            &GlobalDefaults::default(),
        )
        .unwrap()
    }

    fn build(cases: Vec<TestCase>) -> SpecTestResult<TestSuite> {
        let mut builder = SuiteBuilder::new("SPEC.md");
        for c in cases {
            builder.push(c);
        }
        builder.build()
    }

    #[test]
    fn test_duplicate_id() {
        let err = build(vec![
            case("foo", "version 1.1\nworkflow foo {}", serde_json::json!({})),
            case(
                "foo_task",
                "version 1.1\ntask foo {}",
                serde_json::json!({}),
            ),
        ])
        .unwrap_err();
        assert!(matches!(err, SpecTestError::DuplicateId { id, .. } if id == "foo"));

        let err = build(vec![
            case("a", "version 1.1", serde_json::json!({"id": "foo"})),
            case("b", "version 1.1", serde_json::json!({"id": "foo"})),
        ])
        .unwrap_err();
        assert!(matches!(err, SpecTestError::DuplicateId { .. }));
    }

    #[test]
    fn test_version_mismatch() {
        let err = build(vec![
            case("a", "version 1.1", serde_json::json!({})),
            case("b", "version 1.0", serde_json::json!({})),
        ])
        .unwrap_err();
        match err {
            SpecTestError::VersionMismatch {
                id,
                expected,
                found,
                ..
            } => {
                assert_eq!(id, "b");
                assert_eq!(expected, "1.1");
                assert_eq!(found, "1.0");
            }
            other => panic!("Expected version mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_expected_version() {
        let mut builder =
            SuiteBuilder::new("SPEC.md").with_expected_version(Some("1.2".to_string()));
        builder.push(case("a", "version 1.1", serde_json::json!({})));
        assert!(matches!(
            builder.build().unwrap_err(),
            SpecTestError::VersionMismatch { .. }
        ));
    }

    #[test]
    fn test_unresolved_import() {
        let err = build(vec![case(
            "main",
            "version 1.1\nimport \"missing.wdl\"\nworkflow main {}",
            serde_json::json!({}),
        )])
        .unwrap_err();
        assert!(matches!(
            err,
            SpecTestError::UnresolvedImport { id, uri, .. } if id == "main" && uri == "missing.wdl"
        ));
    }

    #[test]
    fn test_cyclic_import() {
        let err = build(vec![
            case(
                "a",
                "version 1.1\nimport \"b.wdl\"\nworkflow a {}",
                serde_json::json!({}),
            ),
            case(
                "b",
                "version 1.1\nimport \"a.wdl\"\nworkflow b {}",
                serde_json::json!({}),
            ),
        ])
        .unwrap_err();
        match err {
            SpecTestError::CyclicImport { cycle, .. } => {
                assert_eq!(cycle, vec!["a", "b", "a"]);
            }
            other => panic!("Expected cyclic import, got {:?}", other),
        }
    }

    fn cycle_of(err: SpecTestError) -> Vec<String> {
        match err {
            SpecTestError::CyclicImport { cycle, .. } => cycle,
            other => panic!("Expected cyclic import, got {:?}", other),
        }
    }

    #[test]
    fn test_self_import_is_cyclic() {
        let err = build(vec![case(
            "a",
            "version 1.1\nimport \"a.wdl\"\nworkflow a {}",
            serde_json::json!({}),
        )])
        .unwrap_err();
        assert_eq!(err.kind(), "CyclicImportError");
        assert_eq!(cycle_of(err), vec!["a", "a"]);
    }

    #[test]
    fn test_cycle_through_task_and_resource() {
        let err = build(vec![
            case(
                "w",
                "version 1.1\nimport \"t_task.wdl\"\nworkflow w {\n  call t_task.t\n}",
                serde_json::json!({}),
            ),
            case(
                "t_task",
                "version 1.1\nimport \"w.wdl\"\ntask t {}",
                serde_json::json!({}),
            ),
        ])
        .unwrap_err();
        assert_eq!(cycle_of(err), vec!["w", "t", "w"]);

        let err = build(vec![
            case(
                "lib_resource",
                "version 1.1\nimport \"main.wdl\"\nstruct S {}",
                serde_json::json!({}),
            ),
            case(
                "main",
                "version 1.1\nimport \"lib_resource.wdl\" as lib\nworkflow main {}",
                serde_json::json!({}),
            ),
        ])
        .unwrap_err();
        assert_eq!(cycle_of(err), vec!["lib", "main", "lib"]);
    }

    #[test]
    fn test_shared_file_importing_itself() {
        let err = build(vec![
            case(
                "multi_main",
                "version 1.1\nimport \"multi.wdl\"\nworkflow main {}",
                serde_json::json!({"id": "multi_main", "path": "multi.wdl", "target": "main"}),
            ),
            case(
                "multi_helper",
                "version 1.1\ntask helper {}",
                serde_json::json!({
                    "id": "multi_helper",
                    "path": "multi.wdl",
                    "target": "helper",
                    "type": "task"
                }),
            ),
        ])
        .unwrap_err();
        assert_eq!(cycle_of(err), vec!["multi_main", "multi_main"]);
    }

    #[test]
    fn test_qualified_call_picks_target() {
        let suite = build(vec![
            case(
                "main",
                "version 1.1\nimport \"lib_resource.wdl\" as lib\n\
                workflow main {\n  call lib.greet\n}",
                serde_json::json!({}),
            ),
            case(
                "lib_resource",
                "version 1.1\ntask greet {}",
                serde_json::json!({}),
            ),
        ])
        .unwrap();
        assert_eq!(suite.graph().edges(), vec![("main", "lib")]);
        assert_eq!(suite.language_version(), Some("1.1"));
        let runnable: Vec<_> = suite.runnable().map(|c| c.id.as_str()).collect();
        assert_eq!(runnable, vec!["main"]);
    }

    #[test]
    fn test_config_json_hand_off_keys() {
        let mut suite = build(vec![case(
            "gpu_task",
            "version 1.1\ntask gpu {}",
            serde_json::json!({"dependencies": "gpu", "return_code": [0, 1]}),
        )])
        .unwrap();
        crate::spec_tests::propagate::propagate(&mut suite).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&suite.to_config_json().unwrap()).unwrap();
        let entry = json[0].as_object().unwrap();
        assert_eq!(entry["returnCodes"], serde_json::json!([0, 1]));
        assert!(!entry.contains_key("return_code"));
        assert_eq!(entry["priority"], "optional");
        assert_eq!(entry["exclude_output"], serde_json::json!([]));
        assert_eq!(entry["path"], "gpu_task.wdl");
    }

    #[test]
    fn test_empty_suite() {
        let suite = build(vec![]).unwrap();
        assert!(suite.is_empty());
        assert_eq!(suite.language_version(), None);
        assert_eq!(suite.to_config_json().unwrap(), "[]");
    }
}

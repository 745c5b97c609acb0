//! Folds dependencies through the reference graph and settles effective policy
//!
//! Precondition: the suite's graph is acyclic, which [`SuiteBuilder::build`]
//! guarantees. A cycle found here anyway is reported as `CyclicImport` rather
//! than looped on.
//!
//! [`SuiteBuilder::build`]: super::suite::SuiteBuilder::build

use super::suite::TestSuite;
use super::test_case::{Priority, TestCase, TestType};
use crate::error::{Location, SpecTestError, SpecTestResult};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

struct Closure<'a> {
    graph: &'a DiGraph<String, ()>,
    own: HashMap<NodeIndex, BTreeSet<String>>,
    memo: HashMap<NodeIndex, BTreeSet<String>>,
    state: HashMap<NodeIndex, Visit>,
    path: Vec<NodeIndex>,
}

impl<'a> Closure<'a> {
    /// Own dependencies of `node` and of everything reachable from it
    fn of(&mut self, node: NodeIndex) -> Result<BTreeSet<String>, Vec<String>> {
        match self.state.get(&node) {
            Some(Visit::Done) => {
                return Ok(self.memo.get(&node).cloned().unwrap_or_default());
            }
            Some(Visit::InProgress) => {
                let start = self.path.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<String> = self.path[start..]
                    .iter()
                    .map(|n| self.graph[*n].clone())
                    .collect();
                cycle.push(self.graph[node].clone());
                return Err(cycle);
            }
            None => {}
        }

        self.state.insert(node, Visit::InProgress);
        self.path.push(node);
        let mut deps = self.own.get(&node).cloned().unwrap_or_default();
        let callees: Vec<NodeIndex> = self.graph.neighbors(node).collect();
        for callee in callees {
            deps.extend(self.of(callee)?);
        }
        self.path.pop();
        self.state.insert(node, Visit::Done);
        self.memo.insert(node, deps.clone());
        Ok(deps)
    }
}

fn effective_priority(case: &TestCase) -> Priority {
    if case.priority == Priority::Required && !case.effective_dependencies.is_empty() {
        Priority::Optional
    } else {
        case.priority
    }
}

/// Compute `effective_dependencies`, `effective_priority` and
/// `effective_return_code` for every case of `suite`.
///
/// Workflows collect the dependencies of everything they reach; tasks and
/// resources keep their own. A required case with any effective dependency
/// becomes optional, leaving the decision whether the dependency is met to
/// the execution environment. Return codes are never folded into callers.
/// Running it again yields the same result.
pub fn propagate(suite: &mut TestSuite) -> SpecTestResult<()> {
    let source = suite.source_path().to_string();
    let (graph, cases) = suite.parts_mut();

    let mut closure = Closure {
        graph: graph.inner(),
        own: HashMap::new(),
        memo: HashMap::new(),
        state: HashMap::new(),
        path: Vec::new(),
    };
    for case in cases.iter() {
        if let Some(index) = graph.index(&case.id) {
            closure.own.insert(index, case.dependencies.clone());
        }
    }

    for case in cases.iter_mut() {
        case.effective_dependencies = match (case.test_type, graph.index(&case.id)) {
            (TestType::Workflow, Some(index)) => {
                closure.of(index).map_err(|cycle| SpecTestError::CyclicImport {
                    location: Location::new(source.clone(), case.line),
                    cycle,
                })?
            }
            _ => case.dependencies.clone(),
        };
        case.effective_priority = effective_priority(case);
        case.effective_return_code = case.return_code.clone();
    }
    Ok(())
}

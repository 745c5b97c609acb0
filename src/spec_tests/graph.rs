//! Reference graph between the test cases of one suite
//!
//! Edges are found by a syntactic pass over each unit's source, recognizing
//! only `import "uri" [as alias]` and `call [alias.]name`. Nothing is parsed
//! beyond that, so references built at runtime are not seen.

use super::naming::with_extension;
use super::test_case::TestCase;
use crate::error::{Location, SpecTestError, SpecTestResult};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use regex::Regex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use tracing::debug;

static COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#[^\n]*").expect("valid comment regex"));
static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^\s*import\s+(?:"([^"]+)"|'([^']+)')(?:\s+as\s+([A-Za-z_]\w*))?"#)
        .expect("valid import regex")
});
static CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*call\s+([A-Za-z_]\w*(?:\.[A-Za-z_]\w*)*)").expect("valid call regex")
});

/// An `import` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    pub uri: String,
    /// Explicit `as` alias, or the file stem
    pub alias: String,
}

/// A `call` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRef {
    /// `alias` in `call alias.name`
    pub namespace: Option<String>,
    pub name: String,
}

/// Import and call statements found in one unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeReferences {
    pub imports: Vec<ImportRef>,
    pub calls: Vec<CallRef>,
}

/// File name component of an import uri, with `.wdl` ensured
fn import_file_name(uri: &str) -> String {
    let base = uri.rsplit(['/', '\\']).next().unwrap_or(uri);
    with_extension(base)
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

/// Find import and call statements in `code`
pub fn scan_references(code: &str) -> CodeReferences {
    let code = COMMENT_RE.replace_all(code, "");
    let mut refs = CodeReferences::default();

    for caps in IMPORT_RE.captures_iter(&code) {
        let uri = match caps.get(1).or_else(|| caps.get(2)) {
            Some(m) => m.as_str().to_string(),
            None => continue,
        };
        let alias = match caps.get(3) {
            Some(alias) => alias.as_str().to_string(),
            None => {
                let file = import_file_name(&uri);
                file.trim_end_matches(".wdl").to_string()
            }
        };
        refs.imports.push(ImportRef { uri, alias });
    }

    for caps in CALL_RE.captures_iter(&code) {
        let qualified = &caps[1];
        let mut parts: Vec<&str> = qualified.split('.').collect();
        let name = parts.pop().unwrap_or(qualified).to_string();
        let namespace = parts.first().map(|s| s.to_string());
        refs.calls.push(CallRef { namespace, name });
    }

    refs
}

/// Directed `caller -> callee` graph over test-case ids
#[derive(Debug, Clone, Default)]
pub struct ReferenceGraph {
    graph: DiGraph<String, ()>,
    nodes: IndexMap<String, NodeIndex>,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, returning the existing one if `id` is already present
    pub fn add_node(&mut self, id: &str) -> NodeIndex {
        if let Some(index) = self.nodes.get(id) {
            return *index;
        }
        let index = self.graph.add_node(id.to_string());
        self.nodes.insert(id.to_string(), index);
        index
    }

    /// Add `caller -> callee`, creating nodes as needed; repeated edges are kept once
    pub fn add_edge(&mut self, caller: &str, callee: &str) {
        let from = self.add_node(caller);
        let to = self.add_node(callee);
        self.graph.update_edge(from, to, ());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Direct callees of `id`, sorted
    pub fn callees(&self, id: &str) -> Vec<&str> {
        let mut callees: Vec<&str> = match self.nodes.get(id) {
            Some(index) => self
                .graph
                .neighbors(*index)
                .map(|n| self.graph[n].as_str())
                .collect(),
            None => Vec::new(),
        };
        callees.sort_unstable();
        callees
    }

    /// All edges as `(caller, callee)`, sorted
    pub fn edges(&self) -> Vec<(&str, &str)> {
        let mut edges: Vec<(&str, &str)> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (self.graph[a].as_str(), self.graph[b].as_str()))
            .collect();
        edges.sort_unstable();
        edges
    }

    pub(crate) fn index(&self, id: &str) -> Option<NodeIndex> {
        self.nodes.get(id).copied()
    }

    pub(crate) fn inner(&self) -> &DiGraph<String, ()> {
        &self.graph
    }

    /// One cycle in the graph, as ids with the first repeated at the end.
    ///
    /// Cycles are reported starting from the earliest-added node of the
    /// first strongly connected component that contains one.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut components: Vec<Vec<NodeIndex>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || scc.iter().any(|n| self.graph.contains_edge(*n, *n))
            })
            .collect();
        for scc in components.iter_mut() {
            scc.sort_unstable();
        }
        components.sort_unstable();

        let scc = components.into_iter().next()?;
        let members: HashSet<NodeIndex> = scc.iter().copied().collect();
        let start = scc[0];
        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);

        while let Some(node) = queue.pop_front() {
            let mut successors: Vec<NodeIndex> = self.graph.neighbors(node).collect();
            successors.sort_unstable();
            for next in successors {
                if !members.contains(&next) {
                    continue;
                }
                if next == start {
                    let mut path = vec![node];
                    let mut current = node;
                    while current != start {
                        current = *parent.get(&current)?;
                        path.push(current);
                    }
                    path.reverse();
                    path.push(start);
                    return Some(path.into_iter().map(|n| self.graph[n].clone()).collect());
                }
                if !parent.contains_key(&next) {
                    parent.insert(next, node);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Build the graph for `cases`, whose ids must already be unique.
    ///
    /// Fails with `UnresolvedImport` when an import names a file no case
    /// lives in.
    pub fn build(document: &str, cases: &[TestCase]) -> SpecTestResult<Self> {
        let mut graph = ReferenceGraph::new();
        let mut by_file: HashMap<String, Vec<&TestCase>> = HashMap::new();
        for case in cases {
            graph.add_node(&case.id);
            by_file.entry(file_name(&case.path)).or_default().push(case);
        }

        for case in cases {
            let refs = scan_references(&case.code);
            let mut imported: IndexMap<&str, (Vec<&TestCase>, bool)> = IndexMap::new();

            for import in &refs.imports {
                let file = import_file_name(&import.uri);
                // importing one's own file links back to it and shows up as a cycle
                let callees: Vec<&TestCase> = by_file.get(&file).cloned().unwrap_or_default();
                if callees.is_empty() {
                    return Err(SpecTestError::UnresolvedImport {
                        location: Location::new(document, case.line),
                        id: case.id.clone(),
                        uri: import.uri.clone(),
                    });
                }
                imported.insert(import.alias.as_str(), (callees, false));
            }

            for call in &refs.calls {
                match &call.namespace {
                    Some(namespace) => {
                        if let Some((callees, used)) = imported.get_mut(namespace.as_str()) {
                            *used = true;
                            let named: Vec<&TestCase> = callees
                                .iter()
                                .copied()
                                .filter(|c| c.target == call.name)
                                .collect();
                            let chosen = if named.is_empty() { callees.clone() } else { named };
                            for callee in chosen {
                                graph.link(document, case, callee);
                            }
                        }
                    }
                    None => {
                        let siblings = by_file.get(&file_name(&case.path));
                        for sibling in siblings.into_iter().flatten() {
                            if sibling.id != case.id && sibling.target == call.name {
                                graph.link(document, case, sibling);
                            }
                        }
                    }
                }
            }

            for (callees, used) in imported.values() {
                if !used {
                    for callee in callees {
                        graph.link(document, case, callee);
                    }
                }
            }
        }

        Ok(graph)
    }

    fn link(&mut self, document: &str, caller: &TestCase, callee: &TestCase) {
        debug!(document, caller = %caller.id, callee = %callee.id, "reference edge");
        self.add_edge(&caller.id, &callee.id);
    }
}

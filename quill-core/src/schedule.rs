//! Cycle classification and compilation order
//!
//! Strongly connected components are found with Tarjan's algorithm over
//! importer → dependency edges. Tarjan emits a component only after every
//! component reachable from it, which is exactly "dependencies first".
//!
//! A component with more than one member (or a self import) is a cycle:
//! - legal when any member is native or remote, compiled as a group
//! - illegal when every member is guest code, reported and skipped

use crate::error::CompileError;
use crate::graph::{ModuleGraph, NodeId};
use crate::location::SourceLocation;
use crate::target;
use petgraph::algo::{astar, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Reversed};
use std::collections::{BTreeSet, HashSet};

/// Importer → dependency edges; node indices equal `NodeId`s
type ImportGraph = DiGraph<NodeId, ()>;

/// One step of the compilation order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleUnit {
    Module(NodeId),
    /// Members of a legal cycle, compiled independently
    Group(Vec<NodeId>),
}

impl ScheduleUnit {
    pub fn members(&self) -> &[NodeId] {
        match self {
            ScheduleUnit::Module(id) => std::slice::from_ref(id),
            ScheduleUnit::Group(ids) => ids,
        }
    }
}

/// A cycle made only of guest modules
#[derive(Debug, Clone, PartialEq)]
pub struct IllegalCycle {
    pub members: Vec<NodeId>,
    /// Closed walk through the cycle, first node repeated at the end
    pub path: Vec<NodeId>,
    /// Rendered path, e.g. `/app/a.ql → /app/b.ql → /app/a.ql`
    pub display: String,
    /// Import site of the first hop
    pub location: Option<SourceLocation>,
}

/// Compilation order of one graph
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    pub units: Vec<ScheduleUnit>,
    pub illegal_cycles: Vec<IllegalCycle>,
    /// Failed nodes, illegal-cycle members and everything depending on them
    pub blocked: BTreeSet<NodeId>,
    /// Every component in emission order
    pub sccs: Vec<Vec<NodeId>>,
}

impl Schedule {
    pub fn build(graph: &ModuleGraph) -> Self {
        let imports = import_graph(graph);
        let sccs = components(&imports);
        let mut units = Vec::new();
        let mut illegal_cycles = Vec::new();

        for component in &sccs {
            if !is_cycle(graph, component) {
                units.push(ScheduleUnit::Module(component[0]));
                continue;
            }
            if component.iter().any(|id| graph.node(*id).kind.is_native()) {
                tracing::debug!(
                    target: target::SCHEDULE,
                    members = component.len(),
                    "legal cycle scheduled as a group"
                );
                units.push(ScheduleUnit::Group(component.clone()));
            } else {
                let cycle = describe_cycle(graph, &imports, component);
                tracing::warn!(target: target::SCHEDULE, path = %cycle.display, "illegal cycle");
                illegal_cycles.push(cycle);
            }
        }

        let blocked = blocked_nodes(graph, &imports, &illegal_cycles);
        tracing::debug!(
            target: target::SCHEDULE,
            units = units.len(),
            illegal = illegal_cycles.len(),
            blocked = blocked.len(),
            "schedule built"
        );
        Self {
            units,
            illegal_cycles,
            blocked,
            sccs,
        }
    }

    /// Flat order, group members in id order
    pub fn order(&self) -> Vec<NodeId> {
        self.units.iter().flat_map(|u| u.members().iter().copied()).collect()
    }

    pub fn is_blocked(&self, id: NodeId) -> bool {
        self.blocked.contains(&id)
    }

    /// One `IllegalCycleError` per illegal cycle
    pub fn errors(&self) -> Vec<CompileError> {
        self.illegal_cycles
            .iter()
            .map(|cycle| CompileError::IllegalCycle {
                path: cycle.display.clone(),
                location: cycle.location.clone(),
            })
            .collect()
    }
}

fn is_cycle(graph: &ModuleGraph, component: &[NodeId]) -> bool {
    match component {
        [single] => graph.dependencies(*single).contains(single),
        _ => true,
    }
}

fn import_graph(graph: &ModuleGraph) -> ImportGraph {
    let mut imports = ImportGraph::with_capacity(graph.len(), 0);
    for id in graph.ids() {
        imports.add_node(id);
    }
    for id in graph.ids() {
        for dependency in graph.dependencies(id) {
            imports.add_edge(NodeIndex::new(id.0), NodeIndex::new(dependency.0), ());
        }
    }
    imports
}

/// Tarjan emits a component after every component it reaches, so
/// dependencies come first; members are sorted by id.
fn components(imports: &ImportGraph) -> Vec<Vec<NodeId>> {
    tarjan_scc(imports)
        .into_iter()
        .map(|component| {
            let mut members: Vec<NodeId> = component.into_iter().map(|ix| imports[ix]).collect();
            members.sort();
            members
        })
        .collect()
}

/// Strongly connected components of the import graph, dependencies first
pub fn strongly_connected_components(graph: &ModuleGraph) -> Vec<Vec<NodeId>> {
    components(&import_graph(graph))
}

/// Shortest closed walk from the lowest member back to itself
///
/// Any path between two members of a component stays inside it, so the
/// shortest path from the start to a member importing the start closes the
/// cycle.
fn describe_cycle(graph: &ModuleGraph, imports: &ImportGraph, component: &[NodeId]) -> IllegalCycle {
    let start = component[0];
    let start_ix = NodeIndex::new(start.0);
    let closers: HashSet<NodeIndex> = component
        .iter()
        .map(|id| NodeIndex::new(id.0))
        .filter(|ix| imports.contains_edge(*ix, start_ix))
        .collect();

    let walk = astar(imports, start_ix, |ix| closers.contains(&ix), |_| 1usize, |_| 0)
        .map(|(_, walk)| walk)
        .unwrap_or_else(|| vec![start_ix]);
    let mut path: Vec<NodeId> = walk.into_iter().map(|ix| imports[ix]).collect();
    path.push(start);

    let location = path.get(1).and_then(|next| {
        graph
            .node(start)
            .edges
            .iter()
            .find(|edge| edge.target == *next)
            .map(|edge| edge.request.location.clone())
    });
    let display = path
        .iter()
        .map(|id| graph.node(*id).identity.key())
        .collect::<Vec<_>>()
        .join(" → ");

    IllegalCycle {
        members: component.to_vec(),
        path,
        display,
        location,
    }
}

fn blocked_nodes(graph: &ModuleGraph, imports: &ImportGraph, illegal: &[IllegalCycle]) -> BTreeSet<NodeId> {
    let seeds: BTreeSet<NodeId> = graph
        .nodes()
        .filter(|node| node.is_failed())
        .map(|node| node.id)
        .chain(illegal.iter().flat_map(|cycle| cycle.members.iter().copied()))
        .collect();

    // Walk importer edges backwards from every seed
    let dependents = Reversed(imports);
    let mut blocked = BTreeSet::new();
    for seed in seeds {
        if blocked.contains(&seed) {
            continue;
        }
        let mut bfs = Bfs::new(dependents, NodeIndex::new(seed.0));
        while let Some(ix) = bfs.next(dependents) {
            blocked.insert(imports[ix]);
        }
    }
    blocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ImportEdge, ModuleState};
    use crate::module::{ImportRequest, ModuleIdentity, SourceKind};

    fn graph_of(nodes: &[(&str, SourceKind)], edges: &[(usize, usize)]) -> ModuleGraph {
        let mut graph = ModuleGraph::new();
        for (path, kind) in nodes {
            graph.insert(ModuleIdentity::local(path), *kind);
        }
        for (from, to) in edges {
            let loc = SourceLocation::new(nodes[*from].0, 1, 1);
            let spec = nodes[*to].0.to_string();
            graph.node_mut(NodeId(*from)).edges.push(ImportEdge {
                target: NodeId(*to),
                request: ImportRequest::side_effect(&spec, loc),
            });
        }
        graph
    }

    #[test]
    fn test_acyclic_order_puts_dependencies_first() {
        use SourceKind::*;
        // main → a → c, main → b → c
        let graph = graph_of(
            &[("/main.ql", Guest), ("/a.ql", Guest), ("/b.js", NativeJs), ("/c.ql", Guest)],
            &[(0, 1), (0, 2), (1, 3), (2, 3)],
        );
        let schedule = Schedule::build(&graph);
        let order = schedule.order();
        let position = |id: usize| order.iter().position(|n| n.0 == id).unwrap();
        for (from, to) in [(0, 1), (0, 2), (1, 3), (2, 3)] {
            assert!(position(to) < position(from), "{} before {}", to, from);
        }
        assert!(schedule.illegal_cycles.is_empty());
        assert!(schedule.blocked.is_empty());
    }

    #[test]
    fn test_guest_cycle_is_illegal() {
        use SourceKind::*;
        let graph = graph_of(
            &[("/main.ql", Guest), ("/a.ql", Guest), ("/b.ql", Guest), ("/other.ql", Guest)],
            &[(0, 1), (1, 2), (2, 1), (0, 3)],
        );
        let schedule = Schedule::build(&graph);
        assert_eq!(schedule.illegal_cycles.len(), 1);
        let cycle = &schedule.illegal_cycles[0];
        assert_eq!(cycle.display, "/a.ql → /b.ql → /a.ql");
        assert_eq!(cycle.path, vec![NodeId(1), NodeId(2), NodeId(1)]);
        assert_eq!(cycle.location.as_ref().map(|l| l.file_path.as_str()), Some("/a.ql"));

        // main depends on the cycle, other does not
        assert!(schedule.is_blocked(NodeId(0)));
        assert!(!schedule.is_blocked(NodeId(3)));
        assert!(schedule.order().contains(&NodeId(3)));
        assert!(!schedule.order().contains(&NodeId(1)));

        let errors = schedule.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("/a.ql → /b.ql"));
    }

    #[test]
    fn test_cycle_with_native_member_is_grouped() {
        use SourceKind::*;
        let graph = graph_of(
            &[("/main.ql", Guest), ("/a.ql", Guest), ("/b.js", NativeJs)],
            &[(0, 1), (1, 2), (2, 1)],
        );
        let schedule = Schedule::build(&graph);
        assert!(schedule.illegal_cycles.is_empty());
        assert_eq!(
            schedule.units,
            vec![
                ScheduleUnit::Group(vec![NodeId(1), NodeId(2)]),
                ScheduleUnit::Module(NodeId(0)),
            ]
        );
    }

    #[test]
    fn test_three_node_cycle_path() {
        use SourceKind::*;
        let graph = graph_of(
            &[("/a.ql", Guest), ("/b.ql", Guest), ("/c.ql", Guest)],
            &[(0, 1), (1, 2), (2, 0)],
        );
        let schedule = Schedule::build(&graph);
        assert_eq!(
            schedule.illegal_cycles[0].display,
            "/a.ql → /b.ql → /c.ql → /a.ql"
        );
    }

    #[test]
    fn test_self_import_is_a_cycle() {
        let graph = graph_of(&[("/a.ql", SourceKind::Guest)], &[(0, 0)]);
        let schedule = Schedule::build(&graph);
        assert_eq!(schedule.illegal_cycles[0].display, "/a.ql → /a.ql");
    }

    #[test]
    fn test_failed_node_blocks_dependents() {
        use SourceKind::*;
        let mut graph = graph_of(
            &[("/main.ql", Guest), ("/bad.ql", Guest), ("/ok.ql", Guest)],
            &[(0, 1), (0, 2)],
        );
        graph.node_mut(NodeId(1)).state = ModuleState::Failed;
        let schedule = Schedule::build(&graph);
        let blocked: Vec<_> = schedule.blocked.iter().copied().collect();
        assert_eq!(blocked, vec![NodeId(0), NodeId(1)]);
    }

    #[test]
    fn test_long_chain_comes_out_leaf_first() {
        let paths: Vec<String> = (0..2_000).map(|i| format!("/m{}.ql", i)).collect();
        let nodes: Vec<(&str, SourceKind)> =
            paths.iter().map(|p| (p.as_str(), SourceKind::Guest)).collect();
        let edges: Vec<(usize, usize)> = (0..paths.len() - 1).map(|i| (i, i + 1)).collect();
        let graph = graph_of(&nodes, &edges);
        let sccs = strongly_connected_components(&graph);
        assert_eq!(sccs.len(), paths.len());
        assert_eq!(sccs[0], vec![NodeId(paths.len() - 1)]);
        assert_eq!(sccs[paths.len() - 1], vec![NodeId(0)]);
    }
}

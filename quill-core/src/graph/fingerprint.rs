//! Dependency fingerprints
//!
//! A node's dependency fingerprint covers, for each dependency in edge
//! order, its identity key, its export-signature fingerprint and its own
//! dependency fingerprint. Folding the dependency's dependency fingerprint
//! in makes a leaf's export change reach every ancestor.
//!
//! Members of a cycle share one fingerprint built from all members'
//! signatures plus the cycle's external dependencies, so the recursion is
//! well founded.

use super::{ModuleGraph, NodeId};
use crate::fingerprint::Fingerprinter;
use std::collections::HashSet;

/// Fill `dependency_fingerprint` on every node
///
/// `sccs` must list components dependencies first, as
/// [`crate::schedule::strongly_connected_components`] returns them.
pub fn assign_dependency_fingerprints(graph: &mut ModuleGraph, sccs: &[Vec<NodeId>]) {
    for component in sccs {
        let members: HashSet<NodeId> = component.iter().copied().collect();
        let cyclic = component.len() > 1
            || component
                .first()
                .is_some_and(|id| graph.dependencies(*id).contains(id));

        let mut fp = Fingerprinter::new(if cyclic { "dependency-group" } else { "dependency" });
        if cyclic {
            for id in component {
                let node = graph.node(*id);
                fp.field(&node.identity.key())
                    .field(&node.surface.signature_fingerprint());
            }
        }

        let mut seen = HashSet::new();
        for id in component {
            for dep in graph.dependencies(*id) {
                if members.contains(&dep) || !seen.insert(dep) {
                    continue;
                }
                let node = graph.node(dep);
                fp.field(&node.identity.key())
                    .field(&node.surface.signature_fingerprint())
                    .field(node.dependency_fingerprint.as_deref().unwrap_or(""));
            }
        }

        let fingerprint = fp.finish();
        for id in component {
            graph.node_mut(*id).dependency_fingerprint = Some(fingerprint.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ImportEdge;
    use crate::location::SourceLocation;
    use crate::module::{ImportRequest, ModuleIdentity, SourceKind};
    use crate::schedule::strongly_connected_components;

    /// root → left → leaf, root → right
    fn diamond() -> ModuleGraph {
        let mut graph = ModuleGraph::new();
        for path in ["/root.ql", "/left.ql", "/right.ql", "/leaf.ql"] {
            graph.insert(ModuleIdentity::local(path), SourceKind::Guest);
        }
        for (from, to) in [(0, 1), (0, 2), (1, 3)] {
            graph.node_mut(NodeId(from)).edges.push(ImportEdge {
                target: NodeId(to),
                request: ImportRequest::side_effect("./x.ql", SourceLocation::unknown()),
            });
        }
        graph
    }

    fn fingerprints(graph: &mut ModuleGraph) -> Vec<String> {
        let sccs = strongly_connected_components(graph);
        assign_dependency_fingerprints(graph, &sccs);
        graph
            .nodes()
            .map(|n| n.dependency_fingerprint.clone().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_leaf_export_change_cascades_to_ancestors_only() {
        let mut graph = diamond();
        let before = fingerprints(&mut graph);

        graph.node_mut(NodeId(3)).surface.add_name("added");
        let after = fingerprints(&mut graph);

        assert_ne!(before[1], after[1], "direct importer");
        assert_ne!(before[0], after[0], "transitive importer");
        assert_eq!(before[2], after[2], "sibling");
        assert_eq!(before[3], after[3], "leaf has no dependencies");
    }

    #[test]
    fn test_stable_across_runs() {
        let mut a = diamond();
        let mut b = diamond();
        assert_eq!(fingerprints(&mut a), fingerprints(&mut b));
    }

    #[test]
    fn test_cycle_members_share_fingerprint() {
        let mut graph = ModuleGraph::new();
        graph.insert(ModuleIdentity::local("/a.ql"), SourceKind::Guest);
        graph.insert(ModuleIdentity::local("/b.js"), SourceKind::NativeJs);
        for (from, to) in [(0, 1), (1, 0)] {
            graph.node_mut(NodeId(from)).edges.push(ImportEdge {
                target: NodeId(to),
                request: ImportRequest::side_effect("./x", SourceLocation::unknown()),
            });
        }
        let fps = fingerprints(&mut graph);
        assert_eq!(fps[0], fps[1]);
        assert!(!fps[0].is_empty());
    }
}

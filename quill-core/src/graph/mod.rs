//! Module dependency graph
//!
//! A node table indexed by canonical identity. Edges are stored on the
//! importing node and point at target ids, so traversal is index based.

pub mod builder;
pub mod fingerprint;

pub use builder::{GraphBuild, GraphBuilder};
pub use fingerprint::assign_dependency_fingerprints;

use crate::fingerprint::sha256_hex;
use crate::module::{ExportSurface, ImportRequest, ModuleIdentity, SourceKind};
use crate::reader::Sexp;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a node: `unresolved → parsing → resolved → compiled`, any → `failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    Unresolved,
    Parsing,
    Resolved,
    Compiled,
    Failed,
}

impl ModuleState {
    pub fn can_advance_to(self, next: ModuleState) -> bool {
        use ModuleState::*;
        matches!(
            (self, next),
            (Unresolved, Parsing)
                | (Parsing, Resolved)
                | (Resolved, Compiled)
                | (Unresolved | Parsing | Resolved, Failed)
        )
    }
}

/// Importer → target edge
#[derive(Debug, Clone, PartialEq)]
pub struct ImportEdge {
    pub target: NodeId,
    pub request: ImportRequest,
}

/// One vertex of the graph
#[derive(Debug, Clone)]
pub struct ModuleNode {
    pub id: NodeId,
    pub identity: ModuleIdentity,
    pub kind: SourceKind,
    pub state: ModuleState,
    pub surface: ExportSurface,
    pub edges: Vec<ImportEdge>,
    pub content_fingerprint: Option<String>,
    pub dependency_fingerprint: Option<String>,
    source: Option<Arc<str>>,
    /// Desugared forms, kept when the guest module was parsed this run
    pub(crate) forms: Option<Vec<Sexp>>,
}

impl ModuleNode {
    fn new(id: NodeId, identity: ModuleIdentity, kind: SourceKind) -> Self {
        Self {
            id,
            identity,
            kind,
            state: ModuleState::Unresolved,
            surface: ExportSurface::default(),
            edges: Vec::new(),
            content_fingerprint: None,
            dependency_fingerprint: None,
            source: None,
            forms: None,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Attach loaded text and its content fingerprint
    pub fn set_source(&mut self, text: Arc<str>) {
        self.content_fingerprint = Some(sha256_hex(text.as_bytes()));
        self.source = Some(text);
    }

    pub fn is_guest(&self) -> bool {
        self.kind == SourceKind::Guest
    }

    pub fn is_failed(&self) -> bool {
        self.state == ModuleState::Failed
    }
}

/// The dependency graph of one run
#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    nodes: Vec<ModuleNode>,
    index: HashMap<ModuleIdentity, NodeId>,
    entries: Vec<NodeId>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node for `identity` unless one exists
    ///
    /// Returns the node id and whether it was created by this call.
    pub fn insert(&mut self, identity: ModuleIdentity, kind: SourceKind) -> (NodeId, bool) {
        if let Some(id) = self.index.get(&identity) {
            return (*id, false);
        }
        let id = NodeId(self.nodes.len());
        self.index.insert(identity.clone(), id);
        self.nodes.push(ModuleNode::new(id, identity, kind));
        (id, true)
    }

    pub fn add_entry(&mut self, id: NodeId) {
        if !self.entries.contains(&id) {
            self.entries.push(id);
        }
    }

    pub fn entries(&self) -> &[NodeId] {
        &self.entries
    }

    pub fn node(&self, id: NodeId) -> &ModuleNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut ModuleNode {
        &mut self.nodes[id.0]
    }

    pub fn lookup(&self, identity: &ModuleIdentity) -> Option<NodeId> {
        self.index.get(identity).copied()
    }

    pub fn get(&self, identity: &ModuleIdentity) -> Option<&ModuleNode> {
        self.lookup(identity).map(|id| self.node(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ModuleNode> {
        self.nodes.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Distinct targets of a node's edges, in edge order
    pub fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        self.node(id)
            .edges
            .iter()
            .map(|edge| edge.target)
            .filter(|target| seen.insert(*target))
            .collect()
    }

    /// Nodes with an edge into `id`, in id order
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| node.edges.iter().any(|edge| edge.target == id))
            .map(|node| node.id)
            .collect()
    }

    /// Move a node to `state` if the transition is allowed
    pub fn advance(&mut self, id: NodeId, state: ModuleState) -> bool {
        let node = self.node_mut(id);
        if node.state.can_advance_to(state) {
            node.state = state;
            true
        } else {
            false
        }
    }

    /// Every name importable from `id`, following `export * from` chains
    ///
    /// `None` when a star re-export leads into a module whose surface is
    /// unknown (failed to load).
    pub fn exported_names(&self, id: NodeId) -> Option<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        let mut visited = HashSet::new();
        self.collect_exports(id, &mut names, &mut visited)?;
        Some(names)
    }

    fn collect_exports(
        &self,
        id: NodeId,
        names: &mut BTreeSet<String>,
        visited: &mut HashSet<NodeId>,
    ) -> Option<()> {
        if !visited.insert(id) {
            return Some(());
        }
        let node = self.node(id);
        if node.source.is_none() {
            return None;
        }
        names.extend(node.surface.names.iter().cloned());
        if node.surface.has_default && visited.len() == 1 {
            names.insert("default".to_string());
        }
        let stars: Vec<_> = node
            .surface
            .star_reexports
            .iter()
            .map(|spec| {
                node.edges
                    .iter()
                    .find(|e| e.request.is_star_reexport() && &e.request.specifier == spec)
            })
            .collect();
        for star in stars {
            // An unresolved star re-export hides an unknown set of names
            let edge = star?;
            self.collect_exports(edge.target, names, visited)?;
        }
        Some(())
    }
}

//! Dependency graph construction
//!
//! Discovery runs in waves. Every node found by the previous wave is
//! loaded, scanned and has its imports resolved in parallel; the results
//! are then merged into the graph on one thread, in node order, so node
//! numbering is deterministic and concurrent discovery of one identity
//! collapses to a single node.

use super::{ImportEdge, ModuleGraph, ModuleState, NodeId};
use crate::cache::ArtifactStore;
use crate::codegen::mangle::mangle_export;
use crate::error::{CompileError, CompileResult, ResolutionFailure};
use crate::fingerprint::sha256_hex;
use crate::location::{SourceLocation, SourceRegistry};
use crate::module::{
    extract_guest, scan_native, EdgeKind, ModuleIdentity, ModuleLoader, Resolved, SourceKind,
    SurfaceRecord,
};
use crate::reader::{desugar_forms, GuestFrontend, Sexp};
use crate::stats::RunStats;
use crate::target;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of [`GraphBuilder::build`]
#[derive(Debug)]
pub struct GraphBuild {
    pub graph: ModuleGraph,
    /// Resolution, parse and export-surface failures, in discovery order
    pub errors: Vec<CompileError>,
}

/// What one parallel discovery step produces for a node
struct Discovery {
    text: Arc<str>,
    record: SurfaceRecord,
    forms: Option<Vec<Sexp>>,
    targets: Vec<Result<Resolved, ResolutionFailure>>,
}

enum DiscoveryFailure {
    Load(ResolutionFailure),
    Compile(CompileError),
}

impl From<CompileError> for DiscoveryFailure {
    fn from(error: CompileError) -> Self {
        DiscoveryFailure::Compile(error)
    }
}

/// The first import site that led to a node
struct Origin {
    referrer: String,
    specifier: String,
    location: SourceLocation,
}

pub struct GraphBuilder<'a> {
    loader: &'a ModuleLoader,
    frontend: &'a dyn GuestFrontend,
    sources: &'a SourceRegistry,
    stats: &'a RunStats,
    surfaces: Option<&'a ArtifactStore>,
    desugar: bool,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        loader: &'a ModuleLoader,
        frontend: &'a dyn GuestFrontend,
        sources: &'a SourceRegistry,
        stats: &'a RunStats,
    ) -> Self {
        Self {
            loader,
            frontend,
            sources,
            stats,
            surfaces: None,
            desugar: true,
        }
    }

    /// Reuse surface records cached by content fingerprint
    pub fn with_surface_cache(mut self, store: &'a ArtifactStore) -> Self {
        self.surfaces = Some(store);
        self
    }

    pub fn with_desugar(mut self, desugar: bool) -> Self {
        self.desugar = desugar;
        self
    }

    /// Build the graph reachable from `entries`
    ///
    /// Entry specifiers resolve against the project root.
    pub fn build(&self, entries: &[&str]) -> GraphBuild {
        let mut graph = ModuleGraph::new();
        let mut errors = Vec::new();
        let mut origins: HashMap<NodeId, Origin> = HashMap::new();
        let mut frontier = Vec::new();

        for entry in entries {
            match self.loader.resolve(entry, None) {
                Ok(resolved) => {
                    let (id, created) = graph.insert(resolved.identity, resolved.kind);
                    graph.add_entry(id);
                    if created {
                        frontier.push(id);
                    }
                }
                Err(reason) => errors.push(CompileError::Resolution {
                    specifier: entry.to_string(),
                    referrer: self.loader.project_root().display().to_string(),
                    reason,
                    location: None,
                }),
            }
        }

        let mut wave = 0;
        while !frontier.is_empty() {
            wave += 1;
            tracing::debug!(target: target::GRAPH, wave, modules = frontier.len(), "discovery wave");

            let jobs: Vec<(NodeId, ModuleIdentity, SourceKind)> = frontier
                .iter()
                .map(|id| {
                    graph.advance(*id, ModuleState::Parsing);
                    let node = graph.node(*id);
                    (*id, node.identity.clone(), node.kind)
                })
                .collect();

            let results: Vec<(NodeId, Result<Discovery, DiscoveryFailure>)> = jobs
                .par_iter()
                .map(|(id, identity, kind)| (*id, self.discover(identity, *kind)))
                .collect();

            frontier = Vec::new();
            for (id, result) in results {
                match result {
                    Ok(discovery) => {
                        self.merge(&mut graph, id, discovery, &mut origins, &mut frontier, &mut errors)
                    }
                    Err(failure) => {
                        graph.advance(id, ModuleState::Failed);
                        errors.push(self.failure_error(&graph, id, failure, &origins));
                    }
                }
            }
        }

        validate_exports(&mut graph, &mut errors);
        tracing::info!(
            target: target::GRAPH,
            modules = graph.len(),
            errors = errors.len(),
            "graph built"
        );
        GraphBuild { graph, errors }
    }

    /// Load one module, extract its surface and resolve its imports
    fn discover(
        &self,
        identity: &ModuleIdentity,
        kind: SourceKind,
    ) -> Result<Discovery, DiscoveryFailure> {
        let text: Arc<str> = Arc::from(self.loader.load(identity).map_err(DiscoveryFailure::Load)?);
        let file = identity.key();
        self.sources.register(file.clone(), text.clone());

        let (record, forms) = match kind {
            SourceKind::Guest => self.guest_surface(&file, &text)?,
            SourceKind::NativeJs | SourceKind::NativeTs | SourceKind::Remote => {
                (scan_native(&file, &text), None)
            }
        };

        let targets = record
            .imports
            .iter()
            .map(|request| self.loader.resolve(&request.specifier, Some(identity)))
            .collect();
        tracing::trace!(
            target: target::GRAPH,
            module = %identity,
            imports = record.imports.len(),
            exports = record.exports.names.len(),
            "discovered"
        );
        Ok(Discovery {
            text,
            record,
            forms,
            targets,
        })
    }

    fn guest_surface(
        &self,
        file: &str,
        text: &str,
    ) -> CompileResult<(SurfaceRecord, Option<Vec<Sexp>>)> {
        let content_fingerprint = sha256_hex(text.as_bytes());
        if let Some(mut record) = self
            .surfaces
            .and_then(|store| store.lookup_surface(&content_fingerprint))
        {
            self.stats.record_surface_hit();
            // Same text may live at another path
            for request in &mut record.imports {
                request.location.file_path = file.to_string();
            }
            return Ok((record, None));
        }

        let forms = self.parse(file, text)?;
        let record = extract_guest(&forms)?;
        if let Some(store) = self.surfaces {
            if let Err(error) = store.store_surface(&content_fingerprint, &record) {
                tracing::warn!(target: target::GRAPH, %error, "could not cache surface record");
            }
        }
        Ok((record, Some(forms)))
    }

    /// Run the front end (and the desugar pass) over guest text
    pub(crate) fn parse(&self, file: &str, text: &str) -> CompileResult<Vec<Sexp>> {
        self.stats.record_parse();
        let forms = self.frontend.parse(file, text)?;
        if self.desugar {
            desugar_forms(forms)
        } else {
            Ok(forms)
        }
    }

    fn merge(
        &self,
        graph: &mut ModuleGraph,
        id: NodeId,
        discovery: Discovery,
        origins: &mut HashMap<NodeId, Origin>,
        frontier: &mut Vec<NodeId>,
        errors: &mut Vec<CompileError>,
    ) {
        let referrer = graph.node(id).identity.key();
        let mut edges = Vec::with_capacity(discovery.record.imports.len());
        let mut failed = false;

        for (request, target) in discovery.record.imports.into_iter().zip(discovery.targets) {
            match target {
                Ok(resolved) => {
                    let (target, created) = graph.insert(resolved.identity, resolved.kind);
                    if created {
                        frontier.push(target);
                        origins.insert(
                            target,
                            Origin {
                                referrer: referrer.clone(),
                                specifier: request.specifier.clone(),
                                location: request.location.clone(),
                            },
                        );
                    }
                    edges.push(ImportEdge { target, request });
                }
                Err(reason) => {
                    failed = true;
                    tracing::debug!(
                        target: target::GRAPH,
                        specifier = %request.specifier,
                        referrer = %referrer,
                        %reason,
                        "unresolved import"
                    );
                    errors.push(CompileError::Resolution {
                        specifier: request.specifier,
                        referrer: referrer.clone(),
                        reason,
                        location: Some(request.location),
                    });
                }
            }
        }

        let node = graph.node_mut(id);
        node.set_source(discovery.text);
        node.surface = discovery.record.exports;
        node.forms = discovery.forms;
        node.edges = edges;
        graph.advance(
            id,
            if failed {
                ModuleState::Failed
            } else {
                ModuleState::Resolved
            },
        );
    }

    fn failure_error(
        &self,
        graph: &ModuleGraph,
        id: NodeId,
        failure: DiscoveryFailure,
        origins: &HashMap<NodeId, Origin>,
    ) -> CompileError {
        match failure {
            DiscoveryFailure::Compile(error) => error,
            DiscoveryFailure::Load(reason) => {
                let key = graph.node(id).identity.key();
                match origins.get(&id) {
                    Some(origin) => CompileError::Resolution {
                        specifier: origin.specifier.clone(),
                        referrer: origin.referrer.clone(),
                        reason,
                        location: Some(origin.location.clone()),
                    },
                    None => CompileError::Resolution {
                        specifier: key.clone(),
                        referrer: key,
                        reason,
                        location: None,
                    },
                }
            }
        }
    }
}

/// Check every named import against the target's export surface
///
/// `default` is never rejected: a target without a default export is
/// imported through the namespace wrapper instead. Native importers see a
/// guest module through its artifact, so they are checked against the
/// mangled names.
fn validate_exports(graph: &mut ModuleGraph, errors: &mut Vec<CompileError>) {
    let mut failed = Vec::new();
    for id in graph.ids() {
        let node = graph.node(id);
        if node.is_failed() {
            continue;
        }
        for edge in &node.edges {
            if !matches!(edge.request.kind, EdgeKind::Named | EdgeKind::Default) {
                continue;
            }
            let target = graph.node(edge.target);
            if target.is_failed() {
                continue;
            }
            let Some(mut available) = graph.exported_names(edge.target) else {
                continue;
            };
            if node.kind.is_native() && target.is_guest() {
                available = available.iter().map(|name| mangle_export(name)).collect();
            }
            for name in edge.request.requested() {
                if name == "default" || available.contains(name) {
                    continue;
                }
                errors.push(CompileError::ExportSurface {
                    target: target.identity.key(),
                    name: name.to_string(),
                    available: available.iter().cloned().collect(),
                    location: Some(edge.request.location.clone()),
                });
                failed.push(id);
            }
        }
    }
    for id in failed {
        graph.advance(id, ModuleState::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{RegistryKind, StaticRegistry};
    use crate::reader::SexpReader;
    use quill_vfs::MemoryFileSystem;

    fn files(entries: &[(&str, &str)]) -> Arc<MemoryFileSystem> {
        Arc::new(MemoryFileSystem::with_files(
            entries.iter().map(|(p, t)| (p.to_string(), t.as_bytes().to_vec())),
        ))
    }

    fn build(vfs: Arc<MemoryFileSystem>, entries: &[&str]) -> GraphBuild {
        let loader = ModuleLoader::new(vfs, "/app", "/app/.quill-cache/remote");
        let sources = SourceRegistry::new();
        let stats = RunStats::new();
        GraphBuilder::new(&loader, &SexpReader, &sources, &stats).build(entries)
    }

    #[test]
    fn test_builds_reachable_nodes_once() {
        let vfs = files(&[
            ("/app/main.ql", r#"(import [a] from "./lib/a.ql") (import [b] from "./lib/b")"#),
            ("/app/lib/a.ql", r#"(import "./b.js") (export (def a 1))"#),
            ("/app/lib/b.js", "export const b = 2;"),
            ("/app/unused.ql", "(def x 1)"),
        ]);
        let result = build(vfs, &["./main.ql"]);
        assert!(result.errors.is_empty(), "{:?}", result.errors);

        let graph = &result.graph;
        assert_eq!(graph.len(), 3);
        let b = graph.lookup(&ModuleIdentity::local("/app/lib/b.js")).unwrap();
        assert_eq!(graph.dependents(b).len(), 2);
        assert!(graph.nodes().all(|n| n.state == ModuleState::Resolved));
        assert!(graph.nodes().all(|n| n.content_fingerprint.is_some()));
    }

    #[test]
    fn test_missing_import_is_located() {
        let vfs = files(&[("/app/main.ql", "\n  (import \"./nope.ql\")")]);
        let result = build(vfs, &["./main.ql"]);
        assert_eq!(result.errors.len(), 1);
        let location = result.errors[0].location().unwrap();
        assert_eq!((location.line, location.column), (2, 3));
        assert!(result.graph.node(NodeId(0)).is_failed());
    }

    #[test]
    fn test_missing_export_fails_importer() {
        let vfs = files(&[
            ("/app/main.ql", r#"(import [nope] from "./lib.js")"#),
            ("/app/lib.js", "export const yes = 1;"),
        ]);
        let result = build(vfs, &["./main.ql"]);
        assert!(matches!(
            &result.errors[..],
            [CompileError::ExportSurface { name, .. }] if name == "nope"
        ));
        assert!(result.graph.node(NodeId(0)).is_failed());
        assert!(!result.graph.node(NodeId(1)).is_failed());
    }

    #[test]
    fn test_native_importer_sees_mangled_guest_names() {
        let vfs = files(&[
            ("/app/main.js", "import { addOne } from './util.ql';"),
            ("/app/util.ql", "(export (defn add-one [x] (+ x 1)))"),
        ]);
        let result = build(vfs, &["./main.js"]);
        assert!(matches!(
            &result.errors[..],
            [CompileError::ExportSurface { name, available, .. }]
                if name == "addOne" && available == &vec!["add_one".to_string()]
        ));

        let vfs = files(&[
            ("/app/main.js", "import { add_one } from './util.ql';"),
            ("/app/util.ql", "(export (defn add-one [x] (+ x 1)))"),
        ]);
        assert!(build(vfs, &["./main.js"]).errors.is_empty());
    }

    #[test]
    fn test_default_import_without_default_export_is_allowed() {
        let vfs = files(&[
            ("/app/main.ql", r#"(import [default as lib] from "./lib.js")"#),
            ("/app/lib.js", "export const yes = 1;"),
        ]);
        assert!(build(vfs, &["./main.ql"]).errors.is_empty());
    }

    #[test]
    fn test_parse_error_fails_only_that_module() {
        let vfs = files(&[
            ("/app/main.ql", r#"(import "./bad.ql") (import "./good.ql")"#),
            ("/app/bad.ql", "(def x"),
            ("/app/good.ql", "(def y 1)"),
        ]);
        let result = build(vfs, &["./main.ql"]);
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(result.errors[0], CompileError::Parse { .. }));
        let good = result.graph.get(&ModuleIdentity::local("/app/good.ql")).unwrap();
        assert_eq!(good.state, ModuleState::Resolved);
    }

    #[test]
    fn test_unknown_registry_package() {
        let vfs = files(&[("/app/main.ql", r#"(import "npm:no-such-package")"#)]);
        let loader = ModuleLoader::new(vfs, "/app", "/app/.quill-cache/remote")
            .with_registry(Arc::new(StaticRegistry::new().with_package(
                RegistryKind::Npm,
                "real",
                "1.0.0",
                "export {}",
            )));
        let sources = SourceRegistry::new();
        let stats = RunStats::new();
        let result = GraphBuilder::new(&loader, &SexpReader, &sources, &stats).build(&["./main.ql"]);
        assert!(matches!(
            &result.errors[..],
            [CompileError::Resolution { reason: ResolutionFailure::UnknownPackage { .. }, .. }]
        ));
    }

    #[test]
    fn test_surface_cache_skips_parse() {
        let vfs = files(&[("/app/main.ql", r#"(import "./a.ql")"#), ("/app/a.ql", "(def a 1)")]);
        let store = ArtifactStore::open(
            vfs.clone(),
            &quill_config::CacheConfig {
                root: "/app/.quill-cache".into(),
                run_id: Some("t".to_string()),
                enabled: true,
            },
        )
        .unwrap();
        let loader = ModuleLoader::new(vfs, "/app", store.remote_dir());
        let sources = SourceRegistry::new();

        let first = RunStats::new();
        GraphBuilder::new(&loader, &SexpReader, &sources, &first)
            .with_surface_cache(&store)
            .build(&["./main.ql"]);
        assert_eq!(first.snapshot(0, 0).parses, 2);

        let second = RunStats::new();
        let result = GraphBuilder::new(&loader, &SexpReader, &sources, &second)
            .with_surface_cache(&store)
            .build(&["./main.ql"]);
        assert_eq!(second.snapshot(0, 0).parses, 0);
        assert_eq!(second.snapshot(0, 0).surface_hits, 2);
        assert_eq!(result.graph.len(), 2);
    }
}

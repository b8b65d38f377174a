//! One compilation run
//!
//! Loader → graph builder → scheduler → (cache | codegen) per node, with
//! every failure collected as a located diagnostic. Subgraphs that fail do
//! not stop unrelated subgraphs from being emitted.

use crate::cache::{layout, ArtifactStore};
use crate::codegen::{emit_guest, rewrite_native, GuestUnit};
use crate::diagnostic::{Diagnostic, DiagnosticReport, Provenance};
use crate::error::{CompileError, CompileResult};
use crate::graph::{assign_dependency_fingerprints, GraphBuilder, ModuleGraph, ModuleState, NodeId};
use crate::interop::{InteropPlan, TargetShape};
use crate::location::SourceRegistry;
use crate::module::{
    ModuleIdentity, ModuleLoader, OfflineRegistry, OfflineTransport, RegistryClient, SourceKind,
    Transport,
};
use crate::reader::{GuestFrontend, SexpReader};
use crate::schedule::{Schedule, ScheduleUnit};
use crate::stats::{RunStats, StatsSnapshot};
use crate::target;
use quill_config::{CompilerConfig, ConfigError};
use quill_vfs::VirtualFileSystem;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One artifact present in the run directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedArtifact {
    pub identity: ModuleIdentity,
    pub kind: SourceKind,
    pub path: PathBuf,
    pub code: String,
    pub from_cache: bool,
}

/// Outcome of [`Compiler::compile`]
#[derive(Debug)]
pub struct CompileRun {
    pub graph: ModuleGraph,
    pub schedule: Schedule,
    /// In compilation order
    pub artifacts: Vec<EmittedArtifact>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: StatsSnapshot,
    pub run_dir: PathBuf,
}

impl CompileRun {
    pub fn is_success(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn reports(&self) -> Vec<DiagnosticReport> {
        self.diagnostics.iter().map(Diagnostic::to_report).collect()
    }

    pub fn artifact(&self, identity: &ModuleIdentity) -> Option<&EmittedArtifact> {
        self.artifacts.iter().find(|a| &a.identity == identity)
    }
}

/// The compiler driver
pub struct Compiler {
    config: CompilerConfig,
    vfs: Arc<dyn VirtualFileSystem>,
    registry: Arc<dyn RegistryClient>,
    transport: Arc<dyn Transport>,
    frontend: Arc<dyn GuestFrontend>,
}

impl Compiler {
    /// Compiler with the built-in reader, no registry and no network
    pub fn new(config: CompilerConfig, vfs: Arc<dyn VirtualFileSystem>) -> Self {
        Self {
            config,
            vfs,
            registry: Arc::new(OfflineRegistry),
            transport: Arc::new(OfflineTransport),
            frontend: Arc::new(SexpReader),
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn RegistryClient>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_frontend(mut self, frontend: Arc<dyn GuestFrontend>) -> Self {
        self.frontend = frontend;
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Artifact store described by the configuration
    pub fn open_store(&self) -> Result<ArtifactStore, ConfigError> {
        ArtifactStore::open(self.vfs.clone(), &self.config.cache)
    }

    fn loader(&self, store: &ArtifactStore) -> ModuleLoader {
        ModuleLoader::new(self.vfs.clone(), &self.config.project_root, store.remote_dir())
            .with_registry(self.registry.clone())
            .with_transport(self.transport.clone())
    }

    /// Compile everything reachable from `entries`
    ///
    /// Entry specifiers resolve against the project root.
    pub fn compile(&self, store: &ArtifactStore, entries: &[&str]) -> CompileRun {
        let stats = RunStats::new();
        let sources = SourceRegistry::new();
        let loader = self.loader(store);
        let builder = GraphBuilder::new(&loader, self.frontend.as_ref(), &sources, &stats)
            .with_surface_cache(store)
            .with_desugar(self.config.desugar);

        tracing::info!(target: target::GRAPH, entries = entries.len(), run_id = store.run_id(), "compilation started");
        let build = builder.build(entries);
        let mut graph = build.graph;
        let mut errors = build.errors;

        let schedule = Schedule::build(&graph);
        assign_dependency_fingerprints(&mut graph, &schedule.sccs);
        errors.extend(schedule.errors());

        let mut groups: HashMap<NodeId, usize> = HashMap::new();
        for (index, unit) in schedule.units.iter().enumerate() {
            if let ScheduleUnit::Group(members) = unit {
                groups.extend(members.iter().map(|id| (*id, index)));
            }
        }

        let session = Session {
            config: &self.config,
            project_root: loader.project_root(),
            store,
            stats: &stats,
            builder: &builder,
            groups,
        };
        let mut artifacts = Vec::new();
        for id in schedule.order() {
            if schedule.is_blocked(id) || session.has_failed_dependency(&graph, id) {
                // Skipped nodes count as failed so their own importers are skipped too
                graph.advance(id, ModuleState::Failed);
                continue;
            }
            match session.compile_node(&graph, id) {
                Ok(artifact) => {
                    graph.advance(id, ModuleState::Compiled);
                    artifacts.extend(artifact);
                }
                Err(error) => {
                    graph.advance(id, ModuleState::Failed);
                    errors.push(error);
                }
            }
        }

        let provenance = Provenance::new(&sources);
        let diagnostics: Vec<Diagnostic> = errors
            .iter()
            .map(|error| provenance.backfill(error.to_diagnostic(), None, &provenance_file(error), None))
            .collect();

        let stats = stats.snapshot(graph.len(), loader.fetch_count());
        tracing::info!(
            target: target::CODEGEN,
            modules = stats.modules,
            artifacts = artifacts.len(),
            cache_hits = stats.cache_hits,
            parses = stats.parses,
            diagnostics = diagnostics.len(),
            "compilation finished"
        );
        CompileRun {
            graph,
            schedule,
            artifacts,
            diagnostics,
            stats,
            run_dir: store.run_dir(),
        }
    }
}

/// File a diagnostic without a location is attributed to
fn provenance_file(error: &CompileError) -> String {
    match error {
        CompileError::Resolution { referrer, .. } => referrer.clone(),
        CompileError::IllegalCycle { path, .. } => path.split(" → ").next().unwrap_or_default().to_string(),
        CompileError::Io { path, .. } | CompileError::CacheCorruption { path, .. } => path.clone(),
        CompileError::ExportSurface { target, .. } => target.clone(),
        CompileError::Parse { location, .. } => location.file_path.clone(),
        CompileError::Codegen { location, .. } => location
            .as_ref()
            .map(|l| l.file_path.clone())
            .unwrap_or_default(),
    }
}

/// Per-run state shared by node compilation
struct Session<'a> {
    config: &'a CompilerConfig,
    project_root: &'a Path,
    store: &'a ArtifactStore,
    stats: &'a RunStats,
    builder: &'a GraphBuilder<'a>,
    /// Legal cycle group index of each group member
    groups: HashMap<NodeId, usize>,
}

impl<'a> Session<'a> {
    fn has_failed_dependency(&self, graph: &ModuleGraph, id: NodeId) -> bool {
        graph
            .dependencies(id)
            .into_iter()
            .any(|dep| graph.node(dep).is_failed())
    }

    fn same_group(&self, a: NodeId, b: NodeId) -> bool {
        matches!((self.groups.get(&a), self.groups.get(&b)), (Some(x), Some(y)) if x == y)
    }

    /// Specifier the importer's artifact uses to reach `target`
    fn emitted_specifier(&self, graph: &ModuleGraph, importer: &Path, target: NodeId) -> String {
        let identity = &graph.node(target).identity;
        match layout::artifact_relative(identity, self.project_root) {
            Some(path) => layout::relative_specifier(importer, &path),
            None => identity.key(),
        }
    }

    /// Cached or freshly emitted artifact; `None` for remote modules
    fn compile_node(&self, graph: &ModuleGraph, id: NodeId) -> CompileResult<Option<EmittedArtifact>> {
        let node = graph.node(id);
        let Some(relative) = layout::artifact_relative(&node.identity, self.project_root) else {
            return Ok(None);
        };
        let content_fingerprint = node.content_fingerprint.clone().unwrap_or_default();
        let dependency_fingerprint = node.dependency_fingerprint.clone().unwrap_or_default();

        if let Some(hit) = self
            .store
            .lookup(&node.identity, &content_fingerprint, &dependency_fingerprint)
        {
            self.stats.record_cache_hit();
            let code = hit.code.clone();
            let entry = self.store.adopt(&node.identity, hit, &relative)?;
            return Ok(Some(EmittedArtifact {
                identity: node.identity.clone(),
                kind: node.kind,
                path: entry.artifact_path,
                code,
                from_cache: true,
            }));
        }
        self.stats.record_cache_miss();

        let (code, has_source_map) = match node.kind {
            SourceKind::Guest => self.emit_guest_node(graph, id, &relative)?,
            _ => (self.emit_native_node(graph, id, &relative), false),
        };
        let entry = self.store.store(
            &node.identity,
            &content_fingerprint,
            &dependency_fingerprint,
            &relative,
            &code,
            has_source_map,
        )?;
        tracing::debug!(target: target::CODEGEN, module = %node.identity, "compiled");
        Ok(Some(EmittedArtifact {
            identity: node.identity.clone(),
            kind: node.kind,
            path: entry.artifact_path,
            code,
            from_cache: false,
        }))
    }

    fn emit_guest_node(
        &self,
        graph: &ModuleGraph,
        id: NodeId,
        relative: &Path,
    ) -> CompileResult<(String, bool)> {
        let node = graph.node(id);
        let file = node.identity.key();
        let source = node.source().unwrap_or_default();
        // Surface-cache hits skipped the parse during discovery
        let parsed;
        let forms = match &node.forms {
            Some(forms) => forms.as_slice(),
            None => {
                parsed = self.builder.parse(&file, source)?;
                parsed.as_slice()
            }
        };

        let mut plan = InteropPlan::new();
        for edge in &node.edges {
            let target = graph.node(edge.target);
            let shape = TargetShape {
                specifier: self.emitted_specifier(graph, relative, edge.target),
                has_default: target.surface.has_default,
                is_guest: target.is_guest(),
                same_group: self.same_group(id, edge.target) && target.kind.is_native(),
            };
            plan.add_edge(&edge.request, &shape);
        }

        let artifact_file = relative
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let code = emit_guest(&GuestUnit {
            file: &file,
            source,
            artifact_file: &artifact_file,
            forms,
            plan: &plan,
            source_map: self.config.emit_source_maps,
        })?;
        Ok((code, self.config.emit_source_maps))
    }

    fn emit_native_node(&self, graph: &ModuleGraph, id: NodeId, relative: &Path) -> String {
        let node = graph.node(id);
        let rewrites: Vec<((usize, usize), String)> = node
            .edges
            .iter()
            .filter_map(|edge| {
                let span = edge.request.span?;
                let specifier = self.emitted_specifier(graph, relative, edge.target);
                (specifier != edge.request.specifier).then_some((span, specifier))
            })
            .collect();
        rewrite_native(node.source().unwrap_or_default(), &rewrites)
    }
}

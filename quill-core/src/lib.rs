//! Quill Core - module pipeline of the Quill compiler
//!
//! Resolves guest, native and remote modules into one dependency graph,
//! classifies import cycles, emits JavaScript with interop wrappers and
//! caches artifacts so unchanged subgraphs are never recompiled.
//!
//! All file access goes through [`quill_vfs::VirtualFileSystem`];
//! configuration is passed explicitly, there is no global state.

pub mod cache;
pub mod codegen;
pub mod diagnostic;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod interop;
pub mod location;
pub mod module;
pub mod pipeline;
pub mod reader;
pub mod schedule;
pub mod stats;

/// Log targets, one per pipeline phase
pub(crate) mod target {
    use quill_config::Phase;

    pub const LOADER: &str = Phase::Loader.target();
    pub const GRAPH: &str = Phase::Graph.target();
    pub const SCHEDULE: &str = Phase::Schedule.target();
    pub const CACHE: &str = Phase::Cache.target();
    pub const CODEGEN: &str = Phase::Codegen.target();
}

// Re-export common types
pub use cache::{ArtifactStore, CacheEntry};
pub use diagnostic::{Diagnostic, DiagnosticKind, DiagnosticReport};
pub use error::{CompileError, CompileResult, ResolutionFailure};
pub use graph::{ModuleGraph, ModuleNode, ModuleState, NodeId};
pub use location::{SourceLocation, SourceRegistry};
pub use module::{ModuleIdentity, ModuleLoader, SourceKind};
pub use pipeline::{CompileRun, Compiler, EmittedArtifact};
pub use schedule::{Schedule, ScheduleUnit};
pub use stats::{RunStats, StatsSnapshot};

// Re-export config types from quill-config
pub use quill_config::{CacheConfig, CompilerConfig, Phase};

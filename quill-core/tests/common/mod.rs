//! Test helpers
//!
//! Projects live under `/app` in a memory file system; the cache root is
//! `/app/.quill-cache`.

#![allow(dead_code)]

use quill_core::{CompileRun, Compiler, CompilerConfig, ModuleIdentity};
use quill_vfs::{MemoryFileSystem, VirtualFileSystem};
use std::path::Path;
use std::sync::Arc;

pub const ROOT: &str = "/app";

pub struct Project {
    pub vfs: Arc<MemoryFileSystem>,
    pub config: CompilerConfig,
}

impl Project {
    /// Project with files given relative to the root
    pub fn new(files: &[(&str, &str)]) -> Self {
        let vfs = MemoryFileSystem::with_files(
            files
                .iter()
                .map(|(path, text)| (absolute(path), text.as_bytes().to_vec())),
        );
        Self {
            vfs: Arc::new(vfs),
            config: CompilerConfig::for_project(ROOT),
        }
    }

    pub fn write(&self, path: &str, text: &str) {
        self.vfs
            .write_file(Path::new(&absolute(path)), text.as_bytes())
            .expect("write failed");
    }

    pub fn read(&self, path: &str) -> String {
        self.vfs
            .read_to_string(Path::new(&absolute(path)))
            .expect("read failed")
    }

    pub fn compiler(&self) -> Compiler {
        Compiler::new(self.config.clone(), self.vfs.clone())
    }

    /// Compile with a fresh compiler under a fixed run id
    pub fn compile(&self, run_id: &str, entries: &[&str]) -> CompileRun {
        self.compile_with(&self.compiler(), run_id, entries)
    }

    pub fn compile_with(&self, compiler: &Compiler, run_id: &str, entries: &[&str]) -> CompileRun {
        let mut config = compiler.config().cache.clone();
        config.run_id = Some(run_id.to_string());
        let store = quill_core::ArtifactStore::open(self.vfs.clone(), &config).expect("bad cache config");
        compiler.compile(&store, entries)
    }

    /// Emitted artifact text, by path relative to the run directory
    pub fn artifact(&self, run_id: &str, relative: &str) -> String {
        self.read(&format!(".quill-cache/{}/{}", run_id, relative))
    }
}

pub fn absolute(path: &str) -> String {
    format!("{}/{}", ROOT, path.trim_start_matches("./"))
}

pub fn local(path: &str) -> ModuleIdentity {
    ModuleIdentity::local(absolute(path))
}

/// Module keys in compilation order
pub fn order(run: &CompileRun) -> Vec<String> {
    run.schedule
        .order()
        .into_iter()
        .map(|id| run.graph.node(id).identity.key())
        .collect()
}

pub fn position(order: &[String], path: &str) -> usize {
    let key = absolute(path);
    order
        .iter()
        .position(|k| *k == key)
        .unwrap_or_else(|| panic!("{} not scheduled", key))
}

/// Artifact of `path`, asserting it was emitted
pub fn emitted<'a>(run: &'a CompileRun, path: &str) -> &'a quill_core::EmittedArtifact {
    run.artifact(&local(path))
        .unwrap_or_else(|| panic!("{} was not emitted", path))
}

pub fn assert_success(run: &CompileRun) {
    assert!(
        run.is_success(),
        "unexpected diagnostics: {:#?}",
        run.reports()
    );
}

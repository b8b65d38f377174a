//! CLI configuration
//!
//! `quill.json` at the project root supplies defaults; command-line flags
//! override it.

use crate::error::{CliError, CliResult};
use quill_config::{CompilerConfig, LogConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const PROJECT_FILE: &str = "quill.json";

/// `quill.json`
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectFile {
    /// Entry modules, relative to the project root
    pub entries: Vec<String>,
    /// Cache directory, relative to the project root
    pub cache_dir: Option<PathBuf>,
    pub emit_source_maps: Option<bool>,
    pub desugar: Option<bool>,
    /// Offline registry mirror, relative to the project root
    pub registry_mirror: Option<PathBuf>,
    pub log: LogConfig,
}

impl ProjectFile {
    /// Read `path`; a missing file is an empty project file
    pub fn load(path: &Path) -> CliResult<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    pub fn parse(path: &Path, text: &str) -> CliResult<Self> {
        serde_json::from_str(text).map_err(|source| CliError::ProjectFile {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Flags that override the project file
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub cache_dir: Option<PathBuf>,
    pub run_id: Option<String>,
    pub no_cache: bool,
    pub no_source_maps: bool,
    pub no_desugar: bool,
    pub log_level: Option<String>,
}

/// Compiler configuration for `project_root` (absolute)
pub fn compiler_config(project_root: &Path, file: &ProjectFile, overrides: &Overrides) -> CliResult<CompilerConfig> {
    let mut config = CompilerConfig::for_project(project_root);
    if let Some(dir) = overrides.cache_dir.as_ref().or(file.cache_dir.as_ref()) {
        config.cache.root = project_root.join(dir);
    }
    config.cache.run_id = overrides.run_id.clone();
    config.cache.enabled = !overrides.no_cache;
    config.emit_source_maps = !overrides.no_source_maps && file.emit_source_maps.unwrap_or(true);
    config.desugar = !overrides.no_desugar && file.desugar.unwrap_or(true);
    config.cache.validate()?;
    Ok(config)
}

/// Log configuration with the `--log-level` override applied to the global level
pub fn log_config(file: &ProjectFile, overrides: &Overrides) -> LogConfig {
    let mut log = file.log.clone();
    if let Some(level) = &overrides.log_level {
        log.level = Some(level.clone());
    }
    log
}

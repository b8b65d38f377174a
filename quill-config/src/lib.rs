//! Quill Config - Pure configuration data structures
//!
//! This crate contains only data structures, no logic or global state.
//! It serves as the shared configuration vocabulary across all Quill crates.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Error raised when a configuration value is out of range
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid run id '{0}': only [A-Za-z0-9_.-] are allowed")]
    InvalidRunId(String),

    #[error("unknown log level '{0}'")]
    UnknownLogLevel(String),
}

/// Configuration for one compilation run
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompilerConfig {
    /// Directory that local module paths are mirrored relative to
    pub project_root: PathBuf,
    /// Artifact cache settings
    pub cache: CacheConfig,
    /// Whether to append an inline source map to guest artifacts
    pub emit_source_maps: bool,
    /// Whether the built-in desugar pass runs before emission
    pub desugar: bool,
}

/// Configuration for the incremental artifact cache
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Cache root directory
    pub root: PathBuf,
    /// Run identifier; `None` means "derive one per run"
    pub run_id: Option<String>,
    /// When false every lookup is a miss (artifacts are still written)
    pub enabled: bool,
}

/// Execution phase enum for phase-specific configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Loader,
    Graph,
    Schedule,
    Cache,
    Codegen,
}

/// Log level vocabulary shared by the CLI and project files
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Per-phase log configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    /// Global level name ("trace" .. "error"); `None` means info
    pub level: Option<String>,
    pub loader: Option<String>,
    pub graph: Option<String>,
    pub schedule: Option<String>,
    pub cache: Option<String>,
    pub codegen: Option<String>,
}

impl Phase {
    /// All phases, in pipeline order
    pub const ALL: [Phase; 5] = [
        Phase::Loader,
        Phase::Graph,
        Phase::Schedule,
        Phase::Cache,
        Phase::Codegen,
    ];

    /// Get the string name of the phase
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Loader => "loader",
            Phase::Graph => "graph",
            Phase::Schedule => "schedule",
            Phase::Cache => "cache",
            Phase::Codegen => "codegen",
        }
    }

    /// Get the log target name for this phase
    pub const fn target(&self) -> &'static str {
        match self {
            Phase::Loader => "quill::loader",
            Phase::Graph => "quill::graph",
            Phase::Schedule => "quill::schedule",
            Phase::Cache => "quill::cache",
            Phase::Codegen => "quill::codegen",
        }
    }
}

impl LogLevel {
    /// Parse a level name, case-insensitively
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ConfigError::UnknownLogLevel(name.to_string())),
        }
    }
}

impl LogConfig {
    /// Global level, defaulting to info
    pub fn global(&self) -> Result<LogLevel, ConfigError> {
        match &self.level {
            Some(name) => LogLevel::parse(name),
            None => Ok(LogLevel::Info),
        }
    }

    /// Level for a specific phase, falling back to the global level
    pub fn level_for(&self, phase: Phase) -> Result<LogLevel, ConfigError> {
        let specific = match phase {
            Phase::Loader => &self.loader,
            Phase::Graph => &self.graph,
            Phase::Schedule => &self.schedule,
            Phase::Cache => &self.cache,
            Phase::Codegen => &self.codegen,
        };
        match specific {
            Some(name) => LogLevel::parse(name),
            None => self.global(),
        }
    }
}

impl CompilerConfig {
    /// Config rooted at `project_root`, caching under `<project_root>/.quill-cache`
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        let project_root = project_root.as_ref().to_path_buf();
        Self {
            cache: CacheConfig {
                root: project_root.join(".quill-cache"),
                ..CacheConfig::default()
            },
            project_root,
            ..Self::default()
        }
    }
}

impl CacheConfig {
    /// Validate the configured run id, if any
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(id) = &self.run_id {
            let valid = !id.is_empty()
                && id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
                && id != "."
                && id != "..";
            if !valid {
                return Err(ConfigError::InvalidRunId(id.clone()));
            }
        }
        Ok(())
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("/"),
            cache: CacheConfig::default(),
            emit_source_maps: true,
            desugar: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/.quill-cache"),
            run_id: None,
            enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_compiler_config() {
        let cfg = CompilerConfig::default();
        assert!(cfg.emit_source_maps);
        assert!(cfg.desugar);
        assert!(cfg.cache.enabled);
        assert!(cfg.cache.run_id.is_none());
    }

    #[test]
    fn test_for_project() {
        let cfg = CompilerConfig::for_project("/work/app");
        assert_eq!(cfg.project_root, PathBuf::from("/work/app"));
        assert_eq!(cfg.cache.root, PathBuf::from("/work/app/.quill-cache"));
    }

    #[test]
    fn test_phase_as_str() {
        assert_eq!(Phase::Loader.as_str(), "loader");
        assert_eq!(Phase::Codegen.target(), "quill::codegen");
        assert_eq!(Phase::ALL.len(), 5);
    }

    #[test]
    fn test_run_id_validation() {
        let mut cache = CacheConfig::default();
        assert!(cache.validate().is_ok());

        cache.run_id = Some("run-2024.01_a".to_string());
        assert!(cache.validate().is_ok());

        cache.run_id = Some("../escape".to_string());
        assert_eq!(
            cache.validate(),
            Err(ConfigError::InvalidRunId("../escape".to_string()))
        );

        cache.run_id = Some(String::new());
        assert!(cache.validate().is_err());
    }

    #[test]
    fn test_log_levels() {
        let log = LogConfig {
            level: Some("warn".to_string()),
            cache: Some("TRACE".to_string()),
            ..LogConfig::default()
        };
        assert_eq!(log.global(), Ok(LogLevel::Warn));
        assert_eq!(log.level_for(Phase::Cache), Ok(LogLevel::Trace));
        assert_eq!(log.level_for(Phase::Graph), Ok(LogLevel::Warn));
        assert!(LogLevel::parse("loud").is_err());
    }

    #[test]
    fn test_deserialize_partial_project_file() {
        let cfg: CompilerConfig = serde_json::from_str(
            r#"{ "projectRoot": "/p", "emitSourceMaps": false, "cache": { "runId": "ci" } }"#,
        )
        .unwrap();
        assert_eq!(cfg.project_root, PathBuf::from("/p"));
        assert!(!cfg.emit_source_maps);
        assert_eq!(cfg.cache.run_id.as_deref(), Some("ci"));
        assert!(cfg.cache.enabled);
        assert!(cfg.desugar);
    }
}

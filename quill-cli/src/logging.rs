//! CLI logging setup
//!
//! Per-phase level control on top of `tracing-subscriber`. Log lines go to
//! stderr so that JSON reports on stdout stay machine readable.

use quill_config::{ConfigError, LogConfig, LogLevel, Phase};
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};

use crate::error::CliError;

/// Target used by the CLI itself
pub const CLI_TARGET: &str = "quill::cli";

/// Log output format
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Multi-line, colored (development)
    Pretty,
    /// One line per event
    Compact,
    /// JSON lines (tool integration)
    Json,
}

fn level(level: LogLevel) -> Level {
    match level {
        LogLevel::Trace => Level::TRACE,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    }
}

/// Filter with one target per pipeline phase
pub fn targets(log_config: &LogConfig) -> Result<Targets, ConfigError> {
    let global = level(log_config.global()?);
    let mut targets = Targets::new()
        .with_default(global)
        .with_target(CLI_TARGET, global);
    for phase in Phase::ALL {
        targets = targets.with_target(phase.target(), level(log_config.level_for(phase)?));
    }
    Ok(targets)
}

/// Install the global subscriber; `file` additionally receives plain lines
pub fn init(log_config: &LogConfig, format: LogFormat, file: Option<&Path>) -> Result<(), CliError> {
    let targets = targets(log_config)?;
    let stderr_layer = format_layer(format, io::stderr).with_filter(targets.clone());

    match file {
        Some(path) => {
            let handle = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| CliError::LogFile {
                    path: path.to_path_buf(),
                    source,
                })?;
            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(handle))
                .with_filter(targets);
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer)
                .init();
        }
        None => {
            tracing_subscriber::registry().with(stderr_layer).init();
        }
    }
    Ok(())
}

fn format_layer<W, F>(format: LogFormat, make_writer: F) -> Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>
where
    W: io::Write + 'static,
    F: Fn() -> W + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_timer(fmt::time::time())
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .without_time()
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_timer(fmt::time::time())
            .with_writer(make_writer)
            .boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_phase_levels_fall_back_to_global() {
        let config = LogConfig {
            level: Some("warn".to_string()),
            cache: Some("trace".to_string()),
            ..LogConfig::default()
        };
        let targets = targets(&config).unwrap();
        assert!(targets.would_enable("quill::cache", &Level::TRACE));
        assert!(!targets.would_enable("quill::graph", &Level::INFO));
        assert!(targets.would_enable("quill::graph", &Level::WARN));
        assert_eq!(targets.default_level(), Some(LevelFilter::WARN));
    }

    #[test]
    fn test_unknown_level_is_rejected() {
        let config = LogConfig {
            codegen: Some("loud".to_string()),
            ..LogConfig::default()
        };
        assert!(matches!(targets(&config), Err(ConfigError::UnknownLogLevel(name)) if name == "loud"));
    }
}

//! Quill CLI - command line interface
//!
//! `quill build` compiles entry modules into `<cache>/<run-id>/` and prints
//! the diagnostic reports of the run as JSON on stdout.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

mod config;
mod error;
mod logging;
mod platform;
mod registry;

use crate::config::{Overrides, ProjectFile, PROJECT_FILE};
use crate::error::{CliError, CliResult};
use crate::logging::{LogFormat, CLI_TARGET};
use quill_core::module::RegistryClient;
use quill_core::{ArtifactStore, Compiler, CompilerConfig, ModuleIdentity, ModuleLoader};
use quill_vfs::{NativeFileSystem, VirtualFileSystem};

/// Exit code for usage and configuration errors
const EXIT_USAGE: i32 = 2;

#[derive(Parser)]
#[command(
    name = "quill",
    about = "Quill - compile Lisp modules and their JavaScript neighbours to ES modules",
    version
)]
struct Cli {
    /// Project root (default: current directory)
    #[arg(long, global = true, value_name = "DIR")]
    project: Option<PathBuf>,

    /// Global log level: trace, debug, info, warn, error
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[arg(long, global = true, value_enum, default_value = "compact")]
    log_format: LogFormat,

    /// Also append log lines to this file
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Cache root (default: <project>/.quill-cache)
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile entry modules and everything they import
    Build {
        /// Entry modules, relative to the project root (default: "entries" in quill.json)
        entries: Vec<String>,

        /// Run identifier; artifacts land in <cache>/<run-id>/
        #[arg(long)]
        run_id: Option<String>,

        /// Ignore cached artifacts (artifacts are still written)
        #[arg(long)]
        no_cache: bool,

        #[arg(long)]
        no_source_maps: bool,

        /// Skip the built-in macro expansion pass
        #[arg(long)]
        no_desugar: bool,

        /// Offline registry mirror (JSON)
        #[arg(long, value_name = "FILE")]
        registry_mirror: Option<PathBuf>,
    },
    /// Inspect or prune the artifact cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Check whether `npm:pkg@1.2.3` / `jsr:@scope/pkg@1.2.3` could be published
    PublishCheck {
        specifier: String,

        /// Offline registry mirror (JSON)
        #[arg(long, value_name = "FILE")]
        registry_mirror: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove the whole cache directory
    Clear,
    /// Forget cached artifacts of one module
    Invalidate {
        /// Module path, relative to the project root
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(EXIT_USAGE);
        }
    }
}

fn run(cli: Cli) -> CliResult<i32> {
    let project_root = project_root(cli.project.as_deref())?;
    let project_file = ProjectFile::load(&project_root.join(PROJECT_FILE))?;

    let mut overrides = Overrides {
        cache_dir: cli.cache_dir.clone(),
        log_level: cli.log_level.clone(),
        ..Overrides::default()
    };
    if let Command::Build {
        run_id,
        no_cache,
        no_source_maps,
        no_desugar,
        ..
    } = &cli.command
    {
        overrides.run_id = run_id.clone();
        overrides.no_cache = *no_cache;
        overrides.no_source_maps = *no_source_maps;
        overrides.no_desugar = *no_desugar;
    }

    logging::init(
        &config::log_config(&project_file, &overrides),
        cli.log_format,
        cli.log_file.as_deref(),
    )?;
    let config = config::compiler_config(&project_root, &project_file, &overrides)?;
    tracing::debug!(target: CLI_TARGET, root = %project_root.display(), "project loaded");

    let vfs: Arc<dyn VirtualFileSystem> = Arc::new(NativeFileSystem::new());
    match cli.command {
        Command::Build {
            entries,
            registry_mirror,
            ..
        } => {
            let entries = if entries.is_empty() {
                project_file.entries.clone()
            } else {
                entries
            };
            if entries.is_empty() {
                return Err(CliError::NoEntries);
            }
            let mirror = registry_mirror.or_else(|| project_file.registry_mirror.clone());
            build(config, vfs, &entries, mirror.as_deref())
        }
        Command::Cache { action } => {
            let store = ArtifactStore::open(vfs, &config.cache)?;
            match action {
                CacheAction::Clear => {
                    store.clear()?;
                    eprintln!("removed {}", store.root().display());
                }
                CacheAction::Invalidate { path } => {
                    let identity = ModuleIdentity::local(project_root.join(path));
                    store.invalidate(&identity)?;
                    eprintln!("invalidated {}", identity);
                }
            }
            Ok(0)
        }
        Command::PublishCheck {
            specifier,
            registry_mirror,
        } => {
            let mirror = registry_mirror.or_else(|| project_file.registry_mirror.clone());
            publish_check(&config, vfs, &specifier, mirror.as_deref())
        }
    }
}

fn project_root(project: Option<&Path>) -> CliResult<PathBuf> {
    let dir = project.unwrap_or(Path::new("."));
    std::path::absolute(dir).map_err(|source| CliError::Read {
        path: dir.to_path_buf(),
        source,
    })
}

fn registry_client(config: &CompilerConfig, mirror: Option<&Path>) -> CliResult<Option<Arc<dyn RegistryClient>>> {
    match mirror {
        Some(path) => {
            let registry: Arc<dyn RegistryClient> = Arc::new(registry::load(&config.project_root.join(path))?);
            Ok(Some(registry))
        }
        None => Ok(None),
    }
}

fn build(
    config: CompilerConfig,
    vfs: Arc<dyn VirtualFileSystem>,
    entries: &[String],
    mirror: Option<&Path>,
) -> CliResult<i32> {
    let registry = registry_client(&config, mirror)?;
    let mut compiler = Compiler::new(config, vfs);
    if let Some(registry) = registry {
        compiler = compiler.with_registry(registry);
    }
    let store = compiler.open_store()?;

    let entries: Vec<&str> = entries.iter().map(String::as_str).collect();
    let run = compiler.compile(&store, &entries);
    let cached = run.artifacts.iter().filter(|a| a.from_cache).count();
    tracing::info!(
        target: CLI_TARGET,
        modules = run.stats.modules,
        emitted = run.artifacts.len(),
        cached,
        parses = run.stats.parses,
        fetches = run.stats.fetches,
        errors = run.diagnostics.len(),
        run_dir = %run.run_dir.display(),
        "build finished"
    );

    if let Err(e) = platform::print_reports(&run) {
        tracing::error!(target: CLI_TARGET, error = %e, "cannot write reports");
    }
    Ok(run.exit_code())
}

fn publish_check(
    config: &CompilerConfig,
    vfs: Arc<dyn VirtualFileSystem>,
    specifier: &str,
    mirror: Option<&Path>,
) -> CliResult<i32> {
    let store = ArtifactStore::open(vfs.clone(), &config.cache)?;
    let mut loader = ModuleLoader::new(vfs, &config.project_root, store.remote_dir());
    if let Some(registry) = registry_client(config, mirror)? {
        loader = loader.with_registry(registry);
    }
    if loader.check_publish(specifier)? {
        println!("{}: publish allowed", specifier);
        Ok(0)
    } else {
        println!("{}: version already published", specifier);
        Ok(1)
    }
}

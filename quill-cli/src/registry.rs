//! Offline registry mirror
//!
//! ```json
//! {
//!   "npm": { "left-pad": { "1.3.0": "export default function leftPad() {}" } },
//!   "jsr": { "@std/path": { "1.0.0": { "": "export * from './mod.ts';", "posix": "…" } } }
//! }
//! ```
//!
//! The highest version of a package (compared numerically, part by part) is
//! its "latest".

use crate::error::{CliError, CliResult};
use quill_core::module::{RegistryKind, StaticRegistry};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Release {
    Main(String),
    /// Subpath ("" for the entry point) → module text
    Modules(BTreeMap<String, String>),
}

/// Package → releases, lowest version first
type Packages = BTreeMap<String, Vec<(String, Release)>>;

/// `1.10.0` sorts after `1.9.0`; pre-release suffixes are ignored
fn version_key(version: &str) -> Vec<u64> {
    version
        .split(['.', '-', '+'])
        .map_while(|part| part.parse().ok())
        .collect()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MirrorFile {
    npm: BTreeMap<String, serde_json::Map<String, serde_json::Value>>,
    jsr: BTreeMap<String, serde_json::Map<String, serde_json::Value>>,
}

fn releases(
    path: &Path,
    packages: BTreeMap<String, serde_json::Map<String, serde_json::Value>>,
) -> CliResult<Packages> {
    packages
        .into_iter()
        .map(|(package, versions)| {
            let mut releases = versions
                .into_iter()
                .map(|(version, value)| {
                    serde_json::from_value(value)
                        .map(|release| (version.clone(), release))
                        .map_err(|e| CliError::RegistryMirror {
                            path: path.to_path_buf(),
                            message: format!("{}@{}: {}", package, version, e),
                        })
                })
                .collect::<CliResult<Vec<_>>>()?;
            releases.sort_by_key(|(version, _)| version_key(version));
            Ok((package, releases))
        })
        .collect()
}

/// Registry populated from mirror JSON text
pub fn parse(path: &Path, text: &str) -> CliResult<StaticRegistry> {
    let file: MirrorFile = serde_json::from_str(text).map_err(|e| CliError::RegistryMirror {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut registry = StaticRegistry::new();
    for (kind, packages) in [(RegistryKind::Npm, file.npm), (RegistryKind::Jsr, file.jsr)] {
        for (package, versions) in releases(path, packages)? {
            for (version, release) in versions {
                match release {
                    Release::Main(source) => registry.publish(kind, &package, &version, None, &source),
                    Release::Modules(modules) => {
                        for (subpath, source) in modules {
                            let subpath = (!subpath.is_empty()).then_some(subpath.as_str());
                            registry.publish(kind, &package, &version, subpath, &source);
                        }
                    }
                }
            }
        }
    }
    Ok(registry)
}

pub fn load(path: &Path) -> CliResult<StaticRegistry> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(path, &text)
}

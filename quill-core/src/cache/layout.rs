//! On-disk layout of the artifact cache
//!
//! ```text
//! <root>/<run-id>/<mirrored source path>.js
//! <root>/entries/<sha(identity)>/<sha(contentFp ‖ depFp)>.json
//! <root>/surfaces/<contentFp>.json
//! <root>/remote/…
//! ```

use crate::fingerprint::{sha256_hex, Fingerprinter};
use crate::module::{ModuleIdentity, SourceKind};
use std::path::{Component, Path, PathBuf};

pub const ENTRIES_DIR: &str = "entries";
pub const SURFACES_DIR: &str = "surfaces";
pub const REMOTE_DIR: &str = "remote";

/// Prefix for local modules that live outside the project root
pub const EXTERNAL_DIR: &str = "_external";

/// Directory holding every entry of one identity
pub fn entry_dir(root: &Path, identity: &ModuleIdentity) -> PathBuf {
    root.join(ENTRIES_DIR).join(sha256_hex(identity.key()))
}

pub fn entry_path(
    root: &Path,
    identity: &ModuleIdentity,
    content_fingerprint: &str,
    dependency_fingerprint: &str,
) -> PathBuf {
    let mut key = Fingerprinter::new("entry");
    key.field(content_fingerprint).field(dependency_fingerprint);
    entry_dir(root, identity).join(format!("{}.json", key.finish()))
}

pub fn surface_path(root: &Path, content_fingerprint: &str) -> PathBuf {
    root.join(SURFACES_DIR)
        .join(format!("{}.json", content_fingerprint))
}

/// Artifact path of a local module, relative to the run directory
///
/// Guest modules get a `.js` extension, native modules keep theirs.
/// Remote modules have no artifact.
pub fn artifact_relative(identity: &ModuleIdentity, project_root: &Path) -> Option<PathBuf> {
    let path = identity.as_local_path()?;
    let mut relative = match path.strip_prefix(project_root) {
        Ok(inside) => inside.to_path_buf(),
        Err(_) => {
            let mut external = PathBuf::from(EXTERNAL_DIR);
            external.extend(path.components().filter_map(|c| match c {
                Component::Normal(part) => Some(part),
                _ => None,
            }));
            external
        }
    };
    if identity.source_kind() == Some(SourceKind::Guest) {
        relative.set_extension("js");
    }
    Some(relative)
}

/// Specifier that reaches `to` from a module emitted at `from`
///
/// Both paths are relative to the same run directory.
pub fn relative_specifier(from: &Path, to: &Path) -> String {
    let from_dir: Vec<_> = from
        .parent()
        .map(|p| p.components().collect())
        .unwrap_or_default();
    let to_parts: Vec<_> = to.components().collect();

    let common = from_dir
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut segments: Vec<String> = vec!["..".to_string(); from_dir.len() - common];
    segments.extend(
        to_parts[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    let joined = segments.join("/");
    if joined.starts_with("..") {
        joined
    } else {
        format!("./{}", joined)
    }
}

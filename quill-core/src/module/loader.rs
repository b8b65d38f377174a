//! Specifier resolution and module loading
//!
//! # Resolution rules
//! - `./x.ql`, `../x.js`, `/abs/x.ts` → local file, kind by extension
//! - `./x` → first existing of `x.ql x.js x.ts x.mjs x.mts x/index.ql x/index.js x/index.ts`
//! - `npm:pkg[@v]`, `jsr:@scope/pkg[@v]` → pinned to a concrete version via the registry
//! - `https://…` → fetched through the transport
//!
//! Remote text is mirrored under the cache's `remote/` directory, so a
//! remote module is fetched at most once per mirror.

use super::identity::{
    join_segments, join_url, normalize_path, ModuleIdentity, RegistryKind, RegistrySpecifier,
    SourceKind, Specifier, GUEST_EXTENSION,
};
use super::registry::{publish_allowed, OfflineRegistry, RegistryClient};
use super::transport::{OfflineTransport, Transport};
use crate::error::ResolutionFailure;
use crate::target;
use quill_vfs::VirtualFileSystem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Extensions tried, in order, for an extension-less local specifier
pub const PROBE_EXTENSIONS: [&str; 5] = [GUEST_EXTENSION, "js", "ts", "mjs", "mts"];

/// Index files tried, in order, when the specifier names a directory
pub const INDEX_FILES: [&str; 3] = ["index.ql", "index.js", "index.ts"];

/// Outcome of resolving one specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub identity: ModuleIdentity,
    pub kind: SourceKind,
}

/// Resolves specifiers to identities and loads module text
pub struct ModuleLoader {
    vfs: Arc<dyn VirtualFileSystem>,
    project_root: PathBuf,
    mirror_root: PathBuf,
    registry: Arc<dyn RegistryClient>,
    transport: Arc<dyn Transport>,
    fetches: AtomicUsize,
}

impl ModuleLoader {
    /// Loader with no registry and no network access
    ///
    /// # Arguments
    /// * `vfs` - file system holding the project and the remote mirror
    /// * `project_root` - base for entry specifiers
    /// * `mirror_root` - directory receiving fetched remote modules
    pub fn new(
        vfs: Arc<dyn VirtualFileSystem>,
        project_root: impl AsRef<Path>,
        mirror_root: impl AsRef<Path>,
    ) -> Self {
        Self {
            vfs,
            project_root: normalize_path(project_root.as_ref()),
            mirror_root: mirror_root.as_ref().to_path_buf(),
            registry: Arc::new(OfflineRegistry),
            transport: Arc::new(OfflineTransport),
            fetches: AtomicUsize::new(0),
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

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Number of remote fetches performed so far (mirror hits excluded)
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Resolve `raw` as written in `referrer` (`None` for entry points)
    pub fn resolve(
        &self,
        raw: &str,
        referrer: Option<&ModuleIdentity>,
    ) -> Result<Resolved, ResolutionFailure> {
        let resolved = match Specifier::parse(raw)? {
            Specifier::Path(path) => self.resolve_path(&path, referrer)?,
            Specifier::Registry(spec) => self.resolve_registry(&spec)?,
            Specifier::Url(url) => Resolved {
                identity: ModuleIdentity::Url(url),
                kind: SourceKind::Remote,
            },
        };
        tracing::trace!(
            target: target::LOADER,
            specifier = raw,
            identity = %resolved.identity,
            kind = %resolved.kind,
            "resolved"
        );
        Ok(resolved)
    }

    fn resolve_path(
        &self,
        raw: &str,
        referrer: Option<&ModuleIdentity>,
    ) -> Result<Resolved, ResolutionFailure> {
        match referrer {
            Some(ModuleIdentity::Url(base)) => Ok(Resolved {
                identity: ModuleIdentity::Url(join_url(base, raw)?),
                kind: SourceKind::Remote,
            }),
            Some(ModuleIdentity::Registry(spec)) => Ok(Resolved {
                identity: ModuleIdentity::Registry(join_registry_subpath(spec, raw)),
                kind: SourceKind::Remote,
            }),
            Some(ModuleIdentity::Local(importer)) => {
                let base = importer.parent().unwrap_or(&self.project_root);
                self.probe_local(&normalize_path(&base.join(raw)))
            }
            None => self.probe_local(&normalize_path(&self.project_root.join(raw))),
        }
    }

    /// Candidate files for a local specifier, in probing order
    pub fn local_candidates(path: &Path) -> Vec<PathBuf> {
        if SourceKind::from_path(path).is_some() {
            return vec![path.to_path_buf()];
        }
        let mut candidates: Vec<PathBuf> = PROBE_EXTENSIONS
            .iter()
            .map(|ext| {
                let mut file = path.as_os_str().to_owned();
                file.push(".");
                file.push(ext);
                PathBuf::from(file)
            })
            .collect();
        candidates.extend(INDEX_FILES.iter().map(|index| path.join(index)));
        candidates
    }

    fn probe_local(&self, path: &Path) -> Result<Resolved, ResolutionFailure> {
        let candidates = Self::local_candidates(path);
        for candidate in &candidates {
            if self.vfs.is_file(candidate) {
                if let Some(kind) = SourceKind::from_path(candidate) {
                    return Ok(Resolved {
                        identity: ModuleIdentity::Local(candidate.clone()),
                        kind,
                    });
                }
            }
        }
        Err(ResolutionFailure::NotFound { tried: candidates })
    }

    /// Pin a registry specifier to one concrete version
    fn resolve_registry(&self, spec: &RegistrySpecifier) -> Result<Resolved, ResolutionFailure> {
        let package = spec.package();
        let unknown = || ResolutionFailure::UnknownPackage {
            registry: spec.registry.as_str().to_string(),
            package: package.clone(),
        };

        if spec.registry == RegistryKind::Jsr {
            let exists = self
                .registry
                .package_exists(spec.registry, &package)
                .map_err(ResolutionFailure::RegistryUnreachable)?;
            if !exists {
                return Err(unknown());
            }
        }

        let latest = self
            .registry
            .latest_version(spec.registry, &package)
            .map_err(ResolutionFailure::RegistryUnreachable)?
            .ok_or_else(unknown)?;

        // Ranges are not matched against releases: anything but an exact
        // version pins to latest
        let pinned = if spec.has_exact_version() {
            spec.clone()
        } else {
            if let Some(range) = &spec.version {
                tracing::debug!(target: target::LOADER, package = %package, range = %range, latest = %latest, "range pinned to latest");
            }
            spec.with_version(&latest)
        };
        Ok(Resolved {
            identity: ModuleIdentity::Registry(pinned),
            kind: SourceKind::Remote,
        })
    }

    /// Whether `raw` (a registry specifier with an exact version) could be published
    pub fn check_publish(&self, raw: &str) -> Result<bool, ResolutionFailure> {
        let Specifier::Registry(spec) = Specifier::parse(raw)? else {
            return Err(ResolutionFailure::MalformedSpecifier(format!(
                "'{}': publish checks need a registry specifier",
                raw
            )));
        };
        let version = spec.version.clone().ok_or_else(|| {
            ResolutionFailure::MalformedSpecifier(format!("'{}': publish checks need a version", raw))
        })?;
        publish_allowed(self.registry.as_ref(), spec.registry, &spec.package(), &version)
            .map_err(ResolutionFailure::RegistryUnreachable)
    }

    /// Read the text of a resolved module
    pub fn load(&self, identity: &ModuleIdentity) -> Result<String, ResolutionFailure> {
        match identity {
            ModuleIdentity::Local(path) => self
                .vfs
                .read_to_string(path)
                .map_err(|e| ResolutionFailure::Read(e.to_string())),
            ModuleIdentity::Registry(_) | ModuleIdentity::Url(_) => self.load_remote(identity),
        }
    }

    fn load_remote(&self, identity: &ModuleIdentity) -> Result<String, ResolutionFailure> {
        let mirror = self.mirror_path(identity);
        if self.vfs.is_file(&mirror) {
            if let Ok(text) = self.vfs.read_to_string(&mirror) {
                tracing::debug!(target: target::LOADER, identity = %identity, "remote mirror hit");
                return Ok(text);
            }
        }

        let text = match identity {
            ModuleIdentity::Registry(spec) => self.registry.fetch_module(spec),
            ModuleIdentity::Url(url) => self.transport.fetch(url),
            ModuleIdentity::Local(path) => Err(format!("{} is not a remote module", path.display())),
        }
        .map_err(ResolutionFailure::FetchFailed)?;
        self.fetches.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(target: target::LOADER, identity = %identity, bytes = text.len(), "fetched");

        if let Err(e) = self.vfs.write_file(&mirror, text.as_bytes()) {
            tracing::warn!(
                target: target::LOADER,
                path = %mirror.display(),
                error = %e,
                "could not mirror remote module"
            );
        }
        Ok(text)
    }

    /// Local mirror location of a remote module
    pub fn mirror_path(&self, identity: &ModuleIdentity) -> PathBuf {
        let relative = match identity {
            ModuleIdentity::Registry(spec) => {
                let mut rel = PathBuf::from(spec.registry.as_str());
                rel.push(format!(
                    "{}@{}",
                    spec.package(),
                    spec.version.as_deref().unwrap_or("latest")
                ));
                rel.push(spec.subpath.as_deref().unwrap_or("index.js"));
                rel
            }
            ModuleIdentity::Url(url) => {
                let (scheme, rest) = url.split_once("://").unwrap_or(("remote", url));
                let mut rest = rest.replace(&['?', '&', '=', ':'][..], "_");
                if rest.ends_with('/') {
                    rest.push_str("index.js");
                }
                let mut rel = PathBuf::from(scheme);
                rel.push(rest);
                rel
            }
            ModuleIdentity::Local(path) => return path.clone(),
        };
        normalize_path(&self.mirror_root.join(relative))
    }
}

fn join_registry_subpath(spec: &RegistrySpecifier, relative: &str) -> RegistrySpecifier {
    let current = spec.subpath.as_deref().unwrap_or("");
    let dir = current.rfind('/').map_or("", |i| &current[..i]);
    let joined = join_segments(dir, relative);
    RegistrySpecifier {
        subpath: if joined.is_empty() { None } else { Some(joined) },
        ..spec.clone()
    }
}

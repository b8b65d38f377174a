//! Incremental artifact cache
//!
//! Lookups are keyed by (identity, content fingerprint, dependency
//! fingerprint). A mismatch in either fingerprint lands on a different entry
//! file, so a stale artifact is simply never found.
//!
//! Every write goes to a temporary file first and is then renamed into
//! place; entries carry the SHA-256 digest of their artifact and a digest
//! mismatch on read counts as corruption. Corruption is logged and treated
//! as a miss.

pub mod layout;

use crate::error::{CompileError, CompileResult};
use crate::fingerprint::sha256_hex;
use crate::module::{ModuleIdentity, SurfaceRecord};
use crate::target;
use once_cell::sync::OnceCell;
use quill_config::{CacheConfig, ConfigError};
use quill_vfs::VirtualFileSystem;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Persisted record of one compiled artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub identity: String,
    pub content_fingerprint: String,
    pub dependency_fingerprint: String,
    /// Artifact path, absolute within the store's file system
    pub artifact_path: PathBuf,
    pub artifact_digest: String,
    pub has_source_map: bool,
    /// Seconds since the Unix epoch
    pub created_at: u64,
}

/// A cache hit: the entry plus the verified artifact text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    pub entry: CacheEntry,
    pub code: String,
}

/// Artifact store over a virtual file system
///
/// Passed explicitly into every run; the cache directories are created on
/// first use.
pub struct ArtifactStore {
    vfs: Arc<dyn VirtualFileSystem>,
    root: PathBuf,
    run_id: String,
    enabled: bool,
    initialized: OnceCell<()>,
    temp_counter: AtomicUsize,
}

impl ArtifactStore {
    /// Open a store as configured
    ///
    /// Without a configured run id one is derived from the current time.
    pub fn open(vfs: Arc<dyn VirtualFileSystem>, config: &CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let run_id = config.run_id.clone().unwrap_or_else(derive_run_id);
        Ok(Self {
            vfs,
            root: config.root.clone(),
            run_id,
            enabled: config.enabled,
            initialized: OnceCell::new(),
            temp_counter: AtomicUsize::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn run_dir(&self) -> PathBuf {
        self.root.join(&self.run_id)
    }

    /// Mirror directory for fetched remote modules
    pub fn remote_dir(&self) -> PathBuf {
        self.root.join(layout::REMOTE_DIR)
    }

    fn ensure_initialized(&self) -> CompileResult<()> {
        self.initialized
            .get_or_try_init(|| {
                for dir in [
                    self.run_dir(),
                    self.root.join(layout::ENTRIES_DIR),
                    self.root.join(layout::SURFACES_DIR),
                ] {
                    self.vfs
                        .create_dir_all(&dir)
                        .map_err(|e| CompileError::io(dir.display().to_string(), e))?;
                }
                tracing::debug!(
                    target: target::CACHE,
                    root = %self.root.display(),
                    run_id = %self.run_id,
                    "cache initialized"
                );
                Ok(())
            })
            .map(|_| ())
    }

    /// Write-to-temp then rename
    fn write_atomic(&self, path: &Path, content: &[u8]) -> CompileResult<()> {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let mut temp = path.as_os_str().to_owned();
        temp.push(format!(".tmp-{}-{}", std::process::id(), n));
        let temp = PathBuf::from(temp);
        self.vfs
            .write_file(&temp, content)
            .map_err(|e| CompileError::io(temp.display().to_string(), e))?;
        self.vfs
            .rename(&temp, path)
            .map_err(|e| CompileError::io(path.display().to_string(), e))
    }

    /// Previously built artifact for exactly these fingerprints
    pub fn lookup(
        &self,
        identity: &ModuleIdentity,
        content_fingerprint: &str,
        dependency_fingerprint: &str,
    ) -> Option<CachedArtifact> {
        if !self.enabled {
            return None;
        }
        let path = layout::entry_path(&self.root, identity, content_fingerprint, dependency_fingerprint);
        if !self.vfs.is_file(&path) {
            tracing::trace!(target: target::CACHE, identity = %identity, "miss");
            return None;
        }
        match self.read_entry(&path, identity, content_fingerprint, dependency_fingerprint) {
            Ok(hit) => {
                tracing::trace!(target: target::CACHE, identity = %identity, "hit");
                Some(hit)
            }
            Err(error) => {
                tracing::warn!(target: target::CACHE, %error, "ignoring cache entry");
                None
            }
        }
    }

    fn read_entry(
        &self,
        path: &Path,
        identity: &ModuleIdentity,
        content_fingerprint: &str,
        dependency_fingerprint: &str,
    ) -> CompileResult<CachedArtifact> {
        let corrupt = |reason: String| CompileError::CacheCorruption {
            path: path.display().to_string(),
            reason,
        };
        let text = self
            .vfs
            .read_to_string(path)
            .map_err(|e| corrupt(e.to_string()))?;
        let entry: CacheEntry =
            serde_json::from_str(&text).map_err(|e| corrupt(format!("undecodable entry: {}", e)))?;
        if entry.identity != identity.key()
            || entry.content_fingerprint != content_fingerprint
            || entry.dependency_fingerprint != dependency_fingerprint
        {
            return Err(corrupt("entry keys do not match its location".to_string()));
        }
        let code = self
            .vfs
            .read_to_string(&entry.artifact_path)
            .map_err(|e| corrupt(format!("artifact unreadable: {}", e)))?;
        if sha256_hex(&code) != entry.artifact_digest {
            return Err(corrupt("artifact digest mismatch".to_string()));
        }
        Ok(CachedArtifact { entry, code })
    }

    /// Persist an artifact for the current run and record its entry
    ///
    /// # Arguments
    /// * `relative` - artifact path inside the run directory
    pub fn store(
        &self,
        identity: &ModuleIdentity,
        content_fingerprint: &str,
        dependency_fingerprint: &str,
        relative: &Path,
        code: &str,
        has_source_map: bool,
    ) -> CompileResult<CacheEntry> {
        self.ensure_initialized()?;
        let artifact_path = self.run_dir().join(relative);
        self.write_atomic(&artifact_path, code.as_bytes())?;

        let entry = CacheEntry {
            identity: identity.key(),
            content_fingerprint: content_fingerprint.to_string(),
            dependency_fingerprint: dependency_fingerprint.to_string(),
            artifact_path,
            artifact_digest: sha256_hex(code),
            has_source_map,
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        };
        self.write_entry(identity, &entry)?;
        tracing::debug!(
            target: target::CACHE,
            identity = %identity,
            path = %entry.artifact_path.display(),
            "stored"
        );
        Ok(entry)
    }

    fn write_entry(&self, identity: &ModuleIdentity, entry: &CacheEntry) -> CompileResult<()> {
        let path = layout::entry_path(
            &self.root,
            identity,
            &entry.content_fingerprint,
            &entry.dependency_fingerprint,
        );
        let json = serde_json::to_vec_pretty(entry).map_err(|e| CompileError::CacheCorruption {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.write_atomic(&path, &json)
    }

    /// Make a hit available inside the current run directory
    ///
    /// A hit produced by another run is copied over and its entry repointed.
    pub fn adopt(
        &self,
        identity: &ModuleIdentity,
        hit: CachedArtifact,
        relative: &Path,
    ) -> CompileResult<CacheEntry> {
        let target_path = self.run_dir().join(relative);
        if hit.entry.artifact_path == target_path {
            return Ok(hit.entry);
        }
        self.ensure_initialized()?;
        self.write_atomic(&target_path, hit.code.as_bytes())?;
        let entry = CacheEntry {
            artifact_path: target_path,
            ..hit.entry
        };
        self.write_entry(identity, &entry)?;
        tracing::debug!(target: target::CACHE, identity = %identity, "copied into current run");
        Ok(entry)
    }

    /// Forget every cached artifact of one module
    pub fn invalidate(&self, identity: &ModuleIdentity) -> CompileResult<()> {
        let dir = layout::entry_dir(&self.root, identity);
        self.vfs
            .remove_dir_all(&dir)
            .map_err(|e| CompileError::io(dir.display().to_string(), e))?;
        tracing::info!(target: target::CACHE, identity = %identity, "invalidated");
        Ok(())
    }

    /// Remove the whole cache root
    pub fn clear(&self) -> CompileResult<()> {
        self.vfs
            .remove_dir_all(&self.root)
            .map_err(|e| CompileError::io(self.root.display().to_string(), e))?;
        tracing::info!(target: target::CACHE, root = %self.root.display(), "cleared");
        Ok(())
    }

    /// Surface record of a module whose content hashes to `content_fingerprint`
    pub fn lookup_surface(&self, content_fingerprint: &str) -> Option<SurfaceRecord> {
        if !self.enabled {
            return None;
        }
        let path = layout::surface_path(&self.root, content_fingerprint);
        if !self.vfs.is_file(&path) {
            return None;
        }
        let decoded = self
            .vfs
            .read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()));
        match decoded {
            Ok(record) => Some(record),
            Err(reason) => {
                let error = CompileError::CacheCorruption {
                    path: path.display().to_string(),
                    reason,
                };
                tracing::warn!(target: target::CACHE, %error, "ignoring surface record");
                None
            }
        }
    }

    pub fn store_surface(&self, content_fingerprint: &str, record: &SurfaceRecord) -> CompileResult<()> {
        self.ensure_initialized()?;
        let path = layout::surface_path(&self.root, content_fingerprint);
        let json = serde_json::to_vec(record).map_err(|e| CompileError::CacheCorruption {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.write_atomic(&path, &json)
    }
}

fn derive_run_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("run-{}", millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ImportRequest;
    use crate::location::SourceLocation;
    use quill_vfs::MemoryFileSystem;

    fn store(vfs: Arc<MemoryFileSystem>, run_id: &str) -> ArtifactStore {
        let config = CacheConfig {
            root: PathBuf::from("/cache"),
            run_id: Some(run_id.to_string()),
            enabled: true,
        };
        ArtifactStore::open(vfs, &config).unwrap()
    }

    fn id() -> ModuleIdentity {
        ModuleIdentity::local("/app/a.ql")
    }

    #[test]
    fn test_store_then_lookup() {
        let vfs = Arc::new(MemoryFileSystem::new());
        let store = store(vfs.clone(), "r1");
        store
            .store(&id(), "c", "d", Path::new("a.js"), "export const a = 1;", false)
            .unwrap();
        assert!(vfs.is_file(Path::new("/cache/r1/a.js")));

        let hit = store.lookup(&id(), "c", "d").unwrap();
        assert_eq!(hit.code, "export const a = 1;");
        assert!(store.lookup(&id(), "c", "other").is_none());
        assert!(store.lookup(&id(), "other", "d").is_none());
    }

    #[test]
    fn test_digest_mismatch_is_a_miss() {
        let vfs = Arc::new(MemoryFileSystem::new());
        let store = store(vfs.clone(), "r1");
        store.store(&id(), "c", "d", Path::new("a.js"), "one", false).unwrap();
        vfs.write_file(Path::new("/cache/r1/a.js"), b"tampered").unwrap();
        assert!(store.lookup(&id(), "c", "d").is_none());
    }

    #[test]
    fn test_undecodable_entry_is_a_miss() {
        let vfs = Arc::new(MemoryFileSystem::new());
        let store = store(vfs.clone(), "r1");
        store.store(&id(), "c", "d", Path::new("a.js"), "one", false).unwrap();
        let entry = layout::entry_path(Path::new("/cache"), &id(), "c", "d");
        vfs.write_file(&entry, b"{ not json").unwrap();
        assert!(store.lookup(&id(), "c", "d").is_none());
    }

    #[test]
    fn test_hit_from_previous_run_is_adopted() {
        let vfs = Arc::new(MemoryFileSystem::new());
        store(vfs.clone(), "r1")
            .store(&id(), "c", "d", Path::new("a.js"), "code", true)
            .unwrap();

        let second = store(vfs.clone(), "r2");
        let hit = second.lookup(&id(), "c", "d").unwrap();
        assert_eq!(hit.entry.artifact_path, PathBuf::from("/cache/r1/a.js"));
        let entry = second.adopt(&id(), hit, Path::new("a.js")).unwrap();
        assert_eq!(entry.artifact_path, PathBuf::from("/cache/r2/a.js"));
        assert_eq!(vfs.read_to_string(Path::new("/cache/r2/a.js")).unwrap(), "code");
        assert!(entry.has_source_map);

        let again = second.lookup(&id(), "c", "d").unwrap();
        assert_eq!(again.entry.artifact_path, PathBuf::from("/cache/r2/a.js"));
    }

    #[test]
    fn test_invalidate_and_clear() {
        let vfs = Arc::new(MemoryFileSystem::new());
        let store = store(vfs.clone(), "r1");
        let other = ModuleIdentity::local("/app/b.ql");
        store.store(&id(), "c", "d", Path::new("a.js"), "a", false).unwrap();
        store.store(&other, "c", "d", Path::new("b.js"), "b", false).unwrap();

        store.invalidate(&id()).unwrap();
        assert!(store.lookup(&id(), "c", "d").is_none());
        assert!(store.lookup(&other, "c", "d").is_some());

        store.clear().unwrap();
        assert!(store.lookup(&other, "c", "d").is_none());
        assert!(!vfs.exists(Path::new("/cache/r1/b.js")));
    }

    #[test]
    fn test_disabled_cache_never_hits() {
        let vfs = Arc::new(MemoryFileSystem::new());
        let config = CacheConfig {
            root: PathBuf::from("/cache"),
            run_id: Some("r".to_string()),
            enabled: false,
        };
        let store = ArtifactStore::open(vfs.clone(), &config).unwrap();
        store.store(&id(), "c", "d", Path::new("a.js"), "a", false).unwrap();
        assert!(vfs.is_file(Path::new("/cache/r/a.js")));
        assert!(store.lookup(&id(), "c", "d").is_none());
    }

    #[test]
    fn test_surface_records() {
        let vfs = Arc::new(MemoryFileSystem::new());
        let store = store(vfs, "r1");
        let mut record = SurfaceRecord::default();
        record.exports.add_name("x");
        record
            .imports
            .push(ImportRequest::side_effect("./y.ql", SourceLocation::new("/app/a.ql", 1, 1)));

        assert!(store.lookup_surface("fp").is_none());
        store.store_surface("fp", &record).unwrap();
        assert_eq!(store.lookup_surface("fp"), Some(record));
    }

    #[test]
    fn test_invalid_run_id_is_rejected() {
        let config = CacheConfig {
            run_id: Some("../up".to_string()),
            ..CacheConfig::default()
        };
        assert!(ArtifactStore::open(Arc::new(MemoryFileSystem::new()), &config).is_err());
    }
}

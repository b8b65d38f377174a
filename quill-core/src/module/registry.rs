//! Package registry collaborator

use super::identity::{RegistryKind, RegistrySpecifier};
use std::collections::{BTreeMap, HashMap};

/// Read-only view of the npm and jsr package registries
///
/// Errors are transport failures ("registry unreachable"); a package that
/// does not exist is `Ok(None)` / `Ok(false)`.
pub trait RegistryClient: Send + Sync {
    /// Latest published version, or `None` when the package does not exist
    fn latest_version(&self, registry: RegistryKind, package: &str) -> Result<Option<String>, String>;

    fn package_exists(&self, registry: RegistryKind, package: &str) -> Result<bool, String>;

    /// Whether a specific version has been published
    fn version_exists(&self, registry: RegistryKind, package: &str, version: &str) -> Result<bool, String>;

    /// Module text for a pinned specifier (version always set)
    fn fetch_module(&self, spec: &RegistrySpecifier) -> Result<String, String>;
}

/// Whether publishing `package@version` would be accepted
///
/// npm is always reported as allowed; jsr is refused when that exact
/// version already exists. The two registries are deliberately not
/// treated alike.
pub fn publish_allowed(
    client: &dyn RegistryClient,
    registry: RegistryKind,
    package: &str,
    version: &str,
) -> Result<bool, String> {
    match registry {
        RegistryKind::Npm => Ok(true),
        RegistryKind::Jsr => Ok(!client.version_exists(registry, package, version)?),
    }
}

/// Registry with no packages and no network
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineRegistry;

impl RegistryClient for OfflineRegistry {
    fn latest_version(&self, _: RegistryKind, _: &str) -> Result<Option<String>, String> {
        Err("no registry configured (offline)".to_string())
    }

    fn package_exists(&self, _: RegistryKind, _: &str) -> Result<bool, String> {
        Err("no registry configured (offline)".to_string())
    }

    fn version_exists(&self, _: RegistryKind, _: &str, _: &str) -> Result<bool, String> {
        Err("no registry configured (offline)".to_string())
    }

    fn fetch_module(&self, spec: &RegistrySpecifier) -> Result<String, String> {
        Err(format!("cannot fetch {} (offline)", spec))
    }
}

#[derive(Debug, Clone, Default)]
struct Package {
    /// Versions in publish order; the last one is latest
    versions: Vec<String>,
    /// (version, subpath or "") -> module text
    modules: HashMap<(String, String), String>,
}

/// In-memory registry for tests and offline mirrors
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    packages: BTreeMap<(RegistryKind, String), Package>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `package@version` with its main module text
    pub fn with_package(mut self, registry: RegistryKind, package: &str, version: &str, source: &str) -> Self {
        self.publish(registry, package, version, None, source);
        self
    }

    /// Publish one module (`subpath` `None` for the package entry point)
    pub fn publish(
        &mut self,
        registry: RegistryKind,
        package: &str,
        version: &str,
        subpath: Option<&str>,
        source: &str,
    ) {
        let entry = self
            .packages
            .entry((registry, package.to_string()))
            .or_default();
        if !entry.versions.iter().any(|v| v == version) {
            entry.versions.push(version.to_string());
        }
        entry.modules.insert(
            (version.to_string(), subpath.unwrap_or_default().to_string()),
            source.to_string(),
        );
    }

    fn package(&self, registry: RegistryKind, package: &str) -> Option<&Package> {
        self.packages.get(&(registry, package.to_string()))
    }
}

impl RegistryClient for StaticRegistry {
    fn latest_version(&self, registry: RegistryKind, package: &str) -> Result<Option<String>, String> {
        Ok(self
            .package(registry, package)
            .and_then(|p| p.versions.last().cloned()))
    }

    fn package_exists(&self, registry: RegistryKind, package: &str) -> Result<bool, String> {
        Ok(self.package(registry, package).is_some())
    }

    fn version_exists(&self, registry: RegistryKind, package: &str, version: &str) -> Result<bool, String> {
        Ok(self
            .package(registry, package)
            .is_some_and(|p| p.versions.iter().any(|v| v == version)))
    }

    fn fetch_module(&self, spec: &RegistrySpecifier) -> Result<String, String> {
        let version = spec.version.clone().unwrap_or_default();
        let subpath = spec.subpath.clone().unwrap_or_default();
        self.package(spec.registry, &spec.package())
            .and_then(|p| p.modules.get(&(version, subpath)))
            .cloned()
            .ok_or_else(|| format!("{} is not published", spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StaticRegistry {
        StaticRegistry::new()
            .with_package(RegistryKind::Npm, "left-pad", "1.0.0", "export default 1;")
            .with_package(RegistryKind::Npm, "left-pad", "1.3.0", "export default 3;")
            .with_package(RegistryKind::Jsr, "@std/path", "0.1.0", "export const sep = '/';")
    }

    #[test]
    fn test_latest_version() {
        let r = registry();
        assert_eq!(
            r.latest_version(RegistryKind::Npm, "left-pad").unwrap().as_deref(),
            Some("1.3.0")
        );
        assert_eq!(r.latest_version(RegistryKind::Npm, "nope").unwrap(), None);
        // Registries are separate namespaces
        assert!(!r.package_exists(RegistryKind::Npm, "@std/path").unwrap());
    }

    #[test]
    fn test_publish_permission_asymmetry() {
        let r = registry();
        // npm: always allowed, even for an existing version
        assert!(publish_allowed(&r, RegistryKind::Npm, "left-pad", "1.0.0").unwrap());
        // jsr: refused when the version exists
        assert!(!publish_allowed(&r, RegistryKind::Jsr, "@std/path", "0.1.0").unwrap());
        assert!(publish_allowed(&r, RegistryKind::Jsr, "@std/path", "0.2.0").unwrap());
    }

    #[test]
    fn test_fetch_module() {
        let r = registry();
        let spec = RegistrySpecifier {
            registry: RegistryKind::Npm,
            scope: None,
            name: "left-pad".to_string(),
            version: Some("1.0.0".to_string()),
            subpath: None,
        };
        assert_eq!(r.fetch_module(&spec).unwrap(), "export default 1;");
        assert!(r.fetch_module(&spec.with_version("9.9.9")).is_err());
    }

    #[test]
    fn test_offline_registry_is_unreachable() {
        let r = OfflineRegistry;
        assert!(r.latest_version(RegistryKind::Npm, "x").is_err());
        assert!(publish_allowed(&r, RegistryKind::Npm, "x", "1.0.0").unwrap());
        assert!(publish_allowed(&r, RegistryKind::Jsr, "@a/x", "1.0.0").is_err());
    }
}

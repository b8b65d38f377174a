//! Canonical module identities and import specifiers

use crate::error::ResolutionFailure;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Guest module extension
pub const GUEST_EXTENSION: &str = "ql";

/// How a module's source is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Guest,
    NativeJs,
    NativeTs,
    Remote,
}

impl SourceKind {
    /// Kind of a local file, by extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            GUEST_EXTENSION => Some(SourceKind::Guest),
            "js" | "mjs" | "cjs" => Some(SourceKind::NativeJs),
            "ts" | "mts" | "tsx" => Some(SourceKind::NativeTs),
            _ => None,
        }
    }

    /// Anything the host loader links on its own
    pub fn is_native(&self) -> bool {
        !matches!(self, SourceKind::Guest)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Guest => "guest",
            SourceKind::NativeJs => "native-js",
            SourceKind::NativeTs => "native-ts",
            SourceKind::Remote => "remote",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    Npm,
    Jsr,
}

impl RegistryKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            RegistryKind::Npm => "npm:",
            RegistryKind::Jsr => "jsr:",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryKind::Npm => "npm",
            RegistryKind::Jsr => "jsr",
        }
    }
}

/// `npm:[@scope/]name[@version][/subpath]` or `jsr:@scope/name[@version][/subpath]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrySpecifier {
    pub registry: RegistryKind,
    pub scope: Option<String>,
    pub name: String,
    /// Exact version or range as written; pinned to a concrete version once resolved
    pub version: Option<String>,
    pub subpath: Option<String>,
}

impl RegistrySpecifier {
    /// `@scope/name` or `name`
    pub fn package(&self) -> String {
        match &self.scope {
            Some(scope) => format!("@{}/{}", scope, self.name),
            None => self.name.clone(),
        }
    }

    /// True when the requested version names exactly one release
    pub fn has_exact_version(&self) -> bool {
        match &self.version {
            Some(v) => {
                v != "latest"
                    && !v.is_empty()
                    && v.chars().next().is_some_and(|c| c.is_ascii_digit())
                    && !v.chars().any(|c| matches!(c, '^' | '~' | '>' | '<' | '=' | '*' | 'x' | ' ' | '|'))
            }
            None => false,
        }
    }

    pub fn with_version(&self, version: &str) -> Self {
        Self {
            version: Some(version.to_string()),
            ..self.clone()
        }
    }

    fn parse(registry: RegistryKind, rest: &str, raw: &str) -> Result<Self, ResolutionFailure> {
        let malformed = |why: &str| ResolutionFailure::MalformedSpecifier(format!("'{}': {}", raw, why));

        let (scope, rest) = match rest.strip_prefix('@') {
            Some(scoped) => {
                let (scope, rest) = scoped
                    .split_once('/')
                    .ok_or_else(|| malformed("scoped package needs '@scope/name'"))?;
                if !valid_segment(scope) {
                    return Err(malformed("invalid scope"));
                }
                (Some(scope.to_string()), rest)
            }
            None => (None, rest),
        };
        if registry == RegistryKind::Jsr && scope.is_none() {
            return Err(malformed("jsr packages are always scoped (jsr:@scope/name)"));
        }

        let name_end = rest.find(&['@', '/'][..]).unwrap_or(rest.len());
        let name = &rest[..name_end];
        if !valid_segment(name) {
            return Err(malformed("invalid package name"));
        }
        let mut rest = &rest[name_end..];

        let mut version = None;
        if let Some(after) = rest.strip_prefix('@') {
            let end = after.find('/').unwrap_or(after.len());
            if end == 0 {
                return Err(malformed("empty version"));
            }
            version = Some(after[..end].to_string());
            rest = &after[end..];
        }

        let subpath = match rest.strip_prefix('/') {
            Some("") => return Err(malformed("empty subpath")),
            Some(path) => Some(path.to_string()),
            None => None,
        };

        Ok(Self {
            registry,
            scope,
            name: name.to_string(),
            version,
            subpath,
        })
    }
}

fn valid_segment(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'))
}

impl fmt::Display for RegistrySpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.registry.prefix(), self.package())?;
        if let Some(version) = &self.version {
            write!(f, "@{}", version)?;
        }
        if let Some(subpath) = &self.subpath {
            write!(f, "/{}", subpath)?;
        }
        Ok(())
    }
}

/// An import specifier as written in source, before resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Specifier {
    /// `./x`, `../x`, `/abs/x`
    Path(String),
    Registry(RegistrySpecifier),
    Url(String),
}

impl Specifier {
    pub fn parse(raw: &str) -> Result<Self, ResolutionFailure> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ResolutionFailure::MalformedSpecifier("empty specifier".to_string()));
        }
        if trimmed != raw {
            return Err(ResolutionFailure::MalformedSpecifier(format!(
                "'{}': surrounding whitespace",
                raw
            )));
        }
        if is_path_like(raw) {
            return Ok(Specifier::Path(raw.to_string()));
        }
        if let Some(rest) = raw.strip_prefix("npm:") {
            return RegistrySpecifier::parse(RegistryKind::Npm, rest, raw).map(Specifier::Registry);
        }
        if let Some(rest) = raw.strip_prefix("jsr:") {
            return RegistrySpecifier::parse(RegistryKind::Jsr, rest, raw).map(Specifier::Registry);
        }
        if has_scheme(raw, "https://") || has_scheme(raw, "http://") {
            return normalize_url(raw).map(Specifier::Url);
        }
        Err(ResolutionFailure::MalformedSpecifier(format!(
            "'{}': bare specifiers are not supported (did you mean 'npm:{}'?)",
            raw, raw
        )))
    }
}

fn has_scheme(raw: &str, scheme: &str) -> bool {
    raw.get(..scheme.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
}

fn is_path_like(raw: &str) -> bool {
    raw == "." || raw == ".." || raw.starts_with("./") || raw.starts_with("../") || raw.starts_with('/')
}

/// Canonical identity of one module
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModuleIdentity {
    /// Absolute, lexically normalized local path
    Local(PathBuf),
    /// Registry package pinned to a concrete version
    Registry(RegistrySpecifier),
    /// Normalized http(s) URL
    Url(String),
}

impl ModuleIdentity {
    pub fn local(path: impl AsRef<Path>) -> Self {
        ModuleIdentity::Local(normalize_path(path.as_ref()))
    }

    /// Stable string key; equal keys mean equal identities
    pub fn key(&self) -> String {
        self.to_string()
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        match self {
            ModuleIdentity::Local(path) => SourceKind::from_path(path),
            ModuleIdentity::Registry(_) | ModuleIdentity::Url(_) => Some(SourceKind::Remote),
        }
    }

    pub fn is_remote(&self) -> bool {
        !matches!(self, ModuleIdentity::Local(_))
    }

    pub fn as_local_path(&self) -> Option<&Path> {
        match self {
            ModuleIdentity::Local(path) => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleIdentity::Local(path) => write!(f, "{}", path.display()),
            ModuleIdentity::Registry(spec) => write!(f, "{}", spec),
            ModuleIdentity::Url(url) => f.write_str(url),
        }
    }
}

/// Remove `.` and `..` components without touching the file system
///
/// `..` at the root stays at the root.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let at_root = matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                );
                if !at_root {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Join `relative` onto a `/`-separated base directory, resolving `.` and `..`
pub(crate) fn join_segments(base_dir: &str, relative: &str) -> String {
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for part in relative.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Lowercase the scheme and host, drop the fragment, resolve dot segments
pub(crate) fn normalize_url(raw: &str) -> Result<String, ResolutionFailure> {
    let malformed = |why: &str| ResolutionFailure::MalformedSpecifier(format!("'{}': {}", raw, why));
    let (scheme, rest) = raw.split_once("://").ok_or_else(|| malformed("missing scheme"))?;
    let rest = rest.split('#').next().unwrap_or_default();
    let (authority, path_and_query) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    if authority.is_empty() || authority.chars().any(char::is_whitespace) {
        return Err(malformed("missing or invalid host"));
    }
    let (path, query) = match path_and_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_and_query, None),
    };
    let mut normalized = format!(
        "{}://{}/{}",
        scheme.to_ascii_lowercase(),
        authority.to_ascii_lowercase(),
        join_segments("", path)
    );
    if path.ends_with('/') && path.len() > 1 {
        normalized.push('/');
    }
    if let Some(query) = query {
        normalized.push('?');
        normalized.push_str(query);
    }
    Ok(normalized)
}

/// Resolve a relative specifier against the URL of the importing module
pub(crate) fn join_url(base: &str, relative: &str) -> Result<String, ResolutionFailure> {
    let (scheme, rest) = base
        .split_once("://")
        .ok_or_else(|| ResolutionFailure::MalformedSpecifier(base.to_string()))?;
    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    let path = path.split('?').next().unwrap_or_default();
    let joined = if relative.starts_with('/') {
        relative.to_string()
    } else {
        let dir = &path[..path.rfind('/').map_or(0, |i| i + 1)];
        format!("{}{}", dir, relative)
    };
    normalize_url(&format!("{}://{}{}", scheme, authority, joined))
}

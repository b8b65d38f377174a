//! Compiler error types

use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::location::SourceLocation;
use quill_vfs::VfsError;
use std::path::PathBuf;
use thiserror::Error;

/// Why a specifier could not be turned into a loadable module
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionFailure {
    #[error("no such module (tried {})", display_paths(.tried))]
    NotFound { tried: Vec<PathBuf> },

    #[error("package '{package}' does not exist in the {registry} registry")]
    UnknownPackage { registry: String, package: String },

    #[error("registry unreachable: {0}")]
    RegistryUnreachable(String),

    #[error("malformed specifier: {0}")]
    MalformedSpecifier(String),

    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("read failed: {0}")]
    Read(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Every failure the pipeline can report
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("cannot resolve '{specifier}' from {referrer}: {reason}")]
    Resolution {
        specifier: String,
        referrer: String,
        reason: ResolutionFailure,
        location: Option<SourceLocation>,
    },

    #[error("illegal circular import between guest modules: {path}")]
    IllegalCycle {
        path: String,
        location: Option<SourceLocation>,
    },

    #[error("module '{target}' does not export '{name}'")]
    ExportSurface {
        target: String,
        name: String,
        available: Vec<String>,
        location: Option<SourceLocation>,
    },

    #[error("corrupt cache entry at {path}: {reason}")]
    CacheCorruption { path: String, reason: String },

    #[error("{message}")]
    Parse {
        message: String,
        location: SourceLocation,
        suggestion: Option<String>,
    },

    #[error("{message}")]
    Codegen {
        message: String,
        location: Option<SourceLocation>,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: VfsError,
    },
}

pub type CompileResult<T> = Result<T, CompileError>;

impl CompileError {
    pub fn parse(
        message: impl Into<String>,
        location: SourceLocation,
        suggestion: Option<&str>,
    ) -> Self {
        CompileError::Parse {
            message: message.into(),
            location,
            suggestion: suggestion.map(str::to_string),
        }
    }

    pub fn codegen(message: impl Into<String>, location: Option<SourceLocation>) -> Self {
        CompileError::Codegen {
            message: message.into(),
            location,
        }
    }

    pub fn io(path: impl Into<String>, source: VfsError) -> Self {
        CompileError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> DiagnosticKind {
        match self {
            CompileError::Resolution { .. } => DiagnosticKind::Resolution,
            CompileError::IllegalCycle { .. } => DiagnosticKind::IllegalCycle,
            CompileError::ExportSurface { .. } => DiagnosticKind::ExportSurface,
            CompileError::CacheCorruption { .. } => DiagnosticKind::CacheCorruption,
            CompileError::Parse { .. } => DiagnosticKind::Parse,
            CompileError::Codegen { .. } => DiagnosticKind::Codegen,
            CompileError::Io { .. } => DiagnosticKind::Io,
        }
    }

    /// Location carried by the error, if any
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            CompileError::Resolution { location, .. }
            | CompileError::IllegalCycle { location, .. }
            | CompileError::ExportSurface { location, .. }
            | CompileError::Codegen { location, .. } => location.as_ref(),
            CompileError::Parse { location, .. } => Some(location),
            CompileError::CacheCorruption { .. } | CompileError::Io { .. } => None,
        }
    }

    pub fn suggestion(&self) -> Option<String> {
        match self {
            CompileError::Resolution { reason, .. } => match reason {
                ResolutionFailure::NotFound { tried } if !tried.is_empty() => {
                    Some(format!("checked: {}", display_paths(tried)))
                }
                ResolutionFailure::UnknownPackage { package, .. } => {
                    Some(format!("check the spelling of '{}'", package))
                }
                ResolutionFailure::MalformedSpecifier(_) => Some(
                    "use a relative path, npm:<package>, jsr:@scope/<package> or an https:// URL"
                        .to_string(),
                ),
                _ => None,
            },
            CompileError::IllegalCycle { .. } => Some(
                "move the shared definitions into a separate module, or make one member a native module"
                    .to_string(),
            ),
            CompileError::ExportSurface { available, .. } if !available.is_empty() => {
                Some(format!("available exports: {}", available.join(", ")))
            }
            CompileError::Parse { suggestion, .. } => suggestion.clone(),
            _ => None,
        }
    }

    /// Convert to a diagnostic; unlocated errors get the unknown location
    pub fn to_diagnostic(&self) -> Diagnostic {
        let location = self.location().cloned().unwrap_or_default();
        let mut diagnostic = Diagnostic::new(self.kind(), self.to_string(), location);
        diagnostic.suggestion = self.suggestion();
        diagnostic
    }
}

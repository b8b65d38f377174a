//! Structured diagnostics and location backfill

use crate::location::{SourceLocation, SourceRegistry};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error taxonomy surfaced to consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    #[serde(rename = "ResolutionError")]
    Resolution,
    #[serde(rename = "IllegalCycleError")]
    IllegalCycle,
    #[serde(rename = "ExportSurfaceError")]
    ExportSurface,
    #[serde(rename = "CacheCorruptionError")]
    CacheCorruption,
    #[serde(rename = "ParseError")]
    Parse,
    #[serde(rename = "CodegenError")]
    Codegen,
    #[serde(rename = "IoError")]
    Io,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::Resolution => "ResolutionError",
            DiagnosticKind::IllegalCycle => "IllegalCycleError",
            DiagnosticKind::ExportSurface => "ExportSurfaceError",
            DiagnosticKind::CacheCorruption => "CacheCorruptionError",
            DiagnosticKind::Parse => "ParseError",
            DiagnosticKind::Codegen => "CodegenError",
            DiagnosticKind::Io => "IoError",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A located compiler message
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub location: SourceLocation,
    pub suggestion: Option<String>,
}

/// Flat, serializable form of a diagnostic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub kind: DiagnosticKind,
    pub message: String,
    pub file_path: String,
    pub line: usize,
    pub column: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            kind,
            message: message.into(),
            location,
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn is_located(&self) -> bool {
        !self.location.is_unknown()
    }

    pub fn to_report(&self) -> DiagnosticReport {
        DiagnosticReport {
            kind: self.kind,
            message: self.message.clone(),
            file_path: self.location.file_path.clone(),
            line: self.location.line,
            column: self.location.column,
            suggestion: self.suggestion.clone(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.location, self.kind, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// Fills in missing diagnostic locations
///
/// Order: the nearest enclosing node's location, then the registered source
/// text for the failing file (by byte offset when one is known, otherwise the
/// start of the file). Diagnostics that are already located are untouched.
pub struct Provenance<'a> {
    registry: &'a SourceRegistry,
}

impl<'a> Provenance<'a> {
    pub fn new(registry: &'a SourceRegistry) -> Self {
        Self { registry }
    }

    pub fn backfill(
        &self,
        mut diagnostic: Diagnostic,
        enclosing: Option<&SourceLocation>,
        file_path: &str,
        offset: Option<usize>,
    ) -> Diagnostic {
        if diagnostic.is_located() {
            return diagnostic;
        }
        if let Some(loc) = enclosing.filter(|loc| !loc.is_unknown()) {
            diagnostic.location = loc.clone();
            return diagnostic;
        }
        if self.registry.contains(file_path) {
            diagnostic.location = offset
                .and_then(|offset| self.registry.locate_offset(file_path, offset))
                .unwrap_or_else(|| SourceLocation::file_start(file_path));
        }
        diagnostic
    }
}

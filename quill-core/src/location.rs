//! Source locations and the per-run source text registry

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// File path used when no provenance can be discovered
pub const UNKNOWN_FILE: &str = "<unknown>";

/// A position in guest (or native) source text
///
/// Line and column are 1-based; column counts Unicode scalar values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub file_path: String,
    pub line: usize,
    pub column: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
}

impl SourceLocation {
    pub fn new(file_path: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file_path: file_path.into(),
            line,
            column,
            length: None,
        }
    }

    /// Location of the first character of a file
    pub fn file_start(file_path: impl Into<String>) -> Self {
        Self::new(file_path, 1, 1)
    }

    /// `{<unknown>, 1, 1}`
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_FILE, 1, 1)
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    pub fn is_unknown(&self) -> bool {
        self.file_path == UNKNOWN_FILE
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self::unknown()
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file_path, self.line, self.column)
    }
}

/// Source text of every file loaded during a run, keyed by file path
///
/// Lower-level failures that only know a byte offset (or nothing at all)
/// are mapped back to line/column through this registry.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    files: Arc<RwLock<HashMap<String, Arc<str>>>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, file_path: impl Into<String>, text: Arc<str>) {
        if let Ok(mut files) = self.files.write() {
            files.insert(file_path.into(), text);
        }
    }

    pub fn text(&self, file_path: &str) -> Option<Arc<str>> {
        self.files.read().ok()?.get(file_path).cloned()
    }

    pub fn contains(&self, file_path: &str) -> bool {
        self.text(file_path).is_some()
    }

    /// Map a byte offset to a line/column location
    ///
    /// Offsets past the end clamp to the end of the text; offsets inside a
    /// multi-byte character resolve to that character.
    pub fn locate_offset(&self, file_path: &str, offset: usize) -> Option<SourceLocation> {
        let text = self.text(file_path)?;
        let mut line = 1;
        let mut column = 1;
        for (index, c) in text.char_indices() {
            if index + c.len_utf8() > offset {
                break;
            }
            if c == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        Some(SourceLocation::new(file_path, line, column))
    }

    /// Location of the first occurrence of `snippet` in the file
    pub fn locate_snippet(&self, file_path: &str, snippet: &str) -> Option<SourceLocation> {
        if snippet.is_empty() {
            return None;
        }
        let text = self.text(file_path)?;
        let offset = text.find(snippet)?;
        self.locate_offset(file_path, offset)
            .map(|loc| loc.with_length(snippet.chars().count()))
    }
}

//! Source map v3 generation
//!
//! Only statement-level segments are produced: each emitted top-level
//! statement maps its first column to the guest form it came from.

use crate::location::SourceLocation;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

const VLQ_ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Append the base64 VLQ encoding of `value`
pub fn encode_vlq(value: i64, out: &mut String) {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };
    loop {
        let mut digit = (vlq & 0b1_1111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b10_0000;
        }
        out.push(VLQ_ALPHABET[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}

/// The JSON document of a source map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    pub file: String,
    pub sources: Vec<String>,
    pub sources_content: Vec<String>,
    pub names: Vec<String>,
    pub mappings: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    generated_column: usize,
    source_line: usize,
    source_column: usize,
    name: Option<usize>,
}

/// Collects segments for one generated file with a single source
#[derive(Debug, Clone)]
pub struct SourceMapBuilder {
    file: String,
    source: String,
    content: String,
    lines: Vec<Vec<Segment>>,
    names: Vec<String>,
}

impl SourceMapBuilder {
    pub fn new(file: impl Into<String>, source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            source: source.into(),
            content: content.into(),
            lines: Vec::new(),
            names: Vec::new(),
        }
    }

    /// Map generated `(line, column)` (0-based) to a 1-based source location
    pub fn add(&mut self, generated_line: usize, generated_column: usize, origin: &SourceLocation, name: Option<&str>) {
        if origin.is_unknown() {
            return;
        }
        if self.lines.len() <= generated_line {
            self.lines.resize_with(generated_line + 1, Vec::new);
        }
        let name = name.map(|n| match self.names.iter().position(|x| x == n) {
            Some(i) => i,
            None => {
                self.names.push(n.to_string());
                self.names.len() - 1
            }
        });
        self.lines[generated_line].push(Segment {
            generated_column,
            source_line: origin.line.saturating_sub(1),
            source_column: origin.column.saturating_sub(1),
            name,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(Vec::is_empty)
    }

    fn mappings(&self) -> String {
        let mut out = String::new();
        let (mut prev_line, mut prev_column, mut prev_name) = (0i64, 0i64, 0i64);
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            let mut prev_generated = 0i64;
            let mut segments = line.clone();
            segments.sort_by_key(|s| s.generated_column);
            for (j, segment) in segments.iter().enumerate() {
                if j > 0 {
                    out.push(',');
                }
                encode_vlq(segment.generated_column as i64 - prev_generated, &mut out);
                // single source, index delta is always 0
                encode_vlq(0, &mut out);
                encode_vlq(segment.source_line as i64 - prev_line, &mut out);
                encode_vlq(segment.source_column as i64 - prev_column, &mut out);
                if let Some(name) = segment.name {
                    encode_vlq(name as i64 - prev_name, &mut out);
                    prev_name = name as i64;
                }
                prev_generated = segment.generated_column as i64;
                prev_line = segment.source_line as i64;
                prev_column = segment.source_column as i64;
            }
        }
        out
    }

    pub fn build(&self) -> SourceMap {
        SourceMap {
            version: 3,
            file: self.file.clone(),
            sources: vec![self.source.clone()],
            sources_content: vec![self.content.clone()],
            names: self.names.clone(),
            mappings: self.mappings(),
        }
    }

    /// `//# sourceMappingURL=data:application/json;base64,…`
    pub fn inline_comment(&self) -> String {
        let json = serde_json::to_string(&self.build()).unwrap_or_default();
        format!(
            "//# sourceMappingURL=data:application/json;base64,{}",
            STANDARD.encode(json)
        )
    }
}

/// Decode the map carried by an inline `sourceMappingURL` comment
pub fn decode_inline(code: &str) -> Option<SourceMap> {
    let (_, payload) = code.rsplit_once("//# sourceMappingURL=data:application/json;base64,")?;
    let bytes = STANDARD.decode(payload.trim()).ok()?;
    serde_json::from_slice(&bytes).ok()
}

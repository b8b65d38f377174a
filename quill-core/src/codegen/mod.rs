//! JavaScript generation
//!
//! Guest modules are translated form by form; native modules are passed
//! through with their import specifiers rewritten to the emitted files.

pub mod emitter;
pub mod mangle;
pub mod sourcemap;

pub use emitter::{Emitter, Statement};
pub use mangle::mangle;
pub use sourcemap::{SourceMap, SourceMapBuilder};

use crate::error::CompileResult;
use crate::interop::InteropPlan;
use crate::reader::Sexp;
use crate::target;

/// Everything needed to emit one guest module
pub struct GuestUnit<'a> {
    /// Source file, as registered for diagnostics
    pub file: &'a str,
    pub source: &'a str,
    /// File name recorded in the source map
    pub artifact_file: &'a str,
    pub forms: &'a [Sexp],
    pub plan: &'a InteropPlan,
    pub source_map: bool,
}

struct Output {
    code: String,
    line: usize,
}

impl Output {
    fn push(&mut self, text: &str) {
        self.code.push_str(text);
        self.code.push('\n');
        self.line += text.matches('\n').count() + 1;
    }
}

/// Emit an ES module for a guest unit
///
/// Layout: imports and interop prelude, translated forms, re-exports,
/// then the inline source map.
pub fn emit_guest(unit: &GuestUnit<'_>) -> CompileResult<String> {
    let mut out = Output {
        code: String::new(),
        line: 0,
    };
    let mut map = SourceMapBuilder::new(unit.artifact_file, unit.file, unit.source);

    for line in unit.plan.header() {
        out.push(&line);
    }

    let mut emitter = Emitter::new(&unit.plan.deferred);
    for form in unit.forms {
        if let Some(statement) = emitter.top_level(form)? {
            map.add(out.line, 0, &form.location(), statement.name.as_deref());
            out.push(&statement.code);
        }
    }

    for export in &unit.plan.exports {
        out.push(export);
    }
    if unit.source_map && !map.is_empty() {
        out.push(&map.inline_comment());
    }
    tracing::trace!(
        target: target::CODEGEN,
        file = unit.file,
        bytes = out.code.len(),
        "guest module emitted"
    );
    Ok(out.code)
}

/// Replace quoted specifiers at byte spans (quotes included)
///
/// Spans shared by several import requests are rewritten once.
pub fn rewrite_native(text: &str, rewrites: &[((usize, usize), String)]) -> String {
    let mut ordered: Vec<&((usize, usize), String)> = rewrites.iter().collect();
    ordered.sort_by_key(|(span, _)| *span);
    ordered.dedup_by_key(|(span, _)| *span);

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for ((start, end), specifier) in ordered {
        if *start < cursor || *end > text.len() || start > end {
            continue;
        }
        out.push_str(&text[cursor..*start]);
        out.push_str(&serde_json::to_string(specifier).unwrap_or_else(|_| format!("\"{}\"", specifier)));
        cursor = *end;
    }
    out.push_str(&text[cursor..]);
    out
}

//! Report output
//!
//! Diagnostics leave the CLI only as structured reports: one pretty JSON
//! array on stdout. Log lines go to stderr.

use quill_core::{CompileRun, DiagnosticReport};
use std::io::{self, Write};

/// Report list as pretty JSON
pub fn write_reports<W: Write>(out: &mut W, reports: &[DiagnosticReport]) -> io::Result<()> {
    let json = serde_json::to_string_pretty(reports).map_err(io::Error::other)?;
    writeln!(out, "{}", json)
}

pub fn print_reports(run: &CompileRun) -> io::Result<()> {
    write_reports(&mut io::stdout().lock(), &run.reports())
}

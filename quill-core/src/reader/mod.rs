//! Guest language front end
//!
//! The pipeline only needs "source text in, located forms out"; the
//! [`GuestFrontend`] trait is that seam and [`SexpReader`] the built-in
//! implementation.

pub mod desugar;
pub mod parser;
pub mod sexp;

pub use desugar::{desugar, desugar_forms};
pub use sexp::{Sexp, SexpKind};

use crate::error::CompileResult;

/// Produces an AST from guest source text
pub trait GuestFrontend: Send + Sync {
    fn parse(&self, file_path: &str, text: &str) -> CompileResult<Vec<Sexp>>;
}

/// Default front end: the located s-expression reader
#[derive(Debug, Clone, Copy, Default)]
pub struct SexpReader;

impl GuestFrontend for SexpReader {
    fn parse(&self, file_path: &str, text: &str) -> CompileResult<Vec<Sexp>> {
        parser::read_forms(file_path, text)
    }
}

//! Platform-specific output

pub mod cli;

pub use cli::print_reports;

//! Command line interface module
//!
//! Argument parsing and the runner that drives a migration plan end to end.

pub mod args;
pub mod runner;

pub use args::Args;
pub use runner::Runner;

//! CLI layer
//!
//! Command-line interface using clap: a single-purpose `xfg --config
//! <path>` invocation, no subcommands.

pub mod args;
pub mod output;

pub use args::Cli;
pub use output::Output;

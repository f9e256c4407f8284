//! Command-line interface definition.
//!
//! - `fob-dev build` - run the bundler once and write the outputs
//! - `fob-dev dev` - rebuild on change and serve with live reload

mod commands;

use clap::Parser;

pub use commands::{BuildArgs, Command, DevArgs, ProjectArgs};

/// fob-dev - incremental builds and a live-reloading dev server
#[derive(Parser, Debug)]
#[command(
    name = "fob-dev",
    version,
    about = "Incremental builds and a live-reloading dev server",
    long_about = "fob-dev drives an external bundler (esbuild by default).\n\
                  It watches exactly the files the last build depended on, rebuilds\n\
                  once per burst of edits, and holds dev server requests until the\n\
                  rebuild has been written."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

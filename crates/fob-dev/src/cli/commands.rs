use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the bundler once and write the outputs
    ///
    /// Exits with a non-zero status when the build reports errors.
    Build(BuildArgs),

    /// Watch, rebuild and serve with live reload
    ///
    /// Requests are held while a rebuild is in flight, so the browser never
    /// sees a half-written bundle.
    Dev(DevArgs),
}

/// Options shared by every command that sets up a build.
#[derive(Args, Debug, Clone, Default)]
pub struct ProjectArgs {
    /// Entry points handed to the bundler
    ///
    /// Overrides `entryPoints` from fob.dev.json.
    #[arg(value_name = "ENTRY")]
    pub entry: Vec<String>,

    /// HTML entry files; script and stylesheet references are rewritten
    /// to the built outputs
    #[arg(long, value_name = "FILE")]
    pub html: Vec<String>,

    /// Output directory
    #[arg(short = 'd', long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Project root (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Path to a config file (defaults to fob.dev.json in the project root)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Bundler executable
    #[arg(long, value_name = "COMMAND")]
    pub bundler: Option<String>,
}

/// Arguments for the build command
#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Report the build without writing outputs
    #[arg(long)]
    pub no_write: bool,
}

/// Arguments for the dev command
#[derive(Args, Debug, Clone, Default)]
pub struct DevArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Port for the dev server; the next free port within 10 is used if
    /// it is taken
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Open the browser once the server is up
    #[arg(long)]
    pub open: bool,

    /// Build once and serve without watching
    #[arg(long)]
    pub no_watch: bool,

    /// Serve the first HTML entry for unknown paths
    #[arg(long)]
    pub spa: bool,

    /// Directory of static files served after the output directory
    #[arg(long, value_name = "DIR")]
    pub serve_dir: Option<PathBuf>,
}

//! Command-line front end for `fob-incremental`.
//!
//! - [`cli`] - argument definitions
//! - [`config`] - `fob.dev.json`, environment and CLI configuration
//! - [`project`] - turns a configuration into a build session
//! - [`server`] - the dev server and its request gate
//! - [`hooks`] - terminal reporting of build attempts
//! - [`ui`] and [`logger`] - terminal output
//!
//! ```rust,no_run
//! use fob_dev::{error::Result, logger};
//!
//! fn main() -> Result<()> {
//!     logger::init_logger(false, false, false);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod hooks;
pub mod logger;
pub mod project;
pub mod server;
pub mod ui;

pub use error::{CliError, ConfigError, Result, ResultExt};

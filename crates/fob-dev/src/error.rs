//! Error types for the CLI.
//!
//! - `CliError` is what commands return.
//! - `ConfigError` covers loading and validating `fob.dev.json`.
//! - [`ResultExt::with_path`] maps a missing file to `FileNotFound`.
//!
//! Build errors reported by the bundler are not errors here: they are part
//! of a generation and printed by the build hooks.
//!
//! ```rust,no_run
//! use fob_dev::error::{Result, ResultExt};
//! use std::path::Path;
//!
//! fn read_template(path: &Path) -> Result<String> {
//!     std::fs::read_to_string(path).with_path(path)
//! }
//! ```

use fob_incremental::{BundlerError, SessionError};
use miette::Report;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The last build finished with errors
    #[error("Build failed with {count} error(s)")]
    BuildFailed { count: usize },

    /// The bundler never produced a generation
    #[error("Build did not run; see the bundler output above")]
    BundlerFailed,

    #[error("Bundler error: {0}")]
    Bundler(#[from] BundlerError),

    #[error("Build session error: {0}")]
    Session(#[from] SessionError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {0}")]
    Server(String),
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}\n\nHint: Create a fob.dev.json file or pass --config <path>", .0.display())]
    NotFound(PathBuf),

    /// Figment could not merge or deserialize the sources
    #[error("Could not load configuration: {0}\n\nHint: Check fob.dev.json syntax and FOB_DEV_* variables")]
    Load(String),

    #[error("Missing required field: {field}\n\nHint: {hint}")]
    MissingField {
        /// Name of the missing field
        field: String,
        /// Helpful hint for providing the field
        hint: String,
    },

    #[error("Invalid value for '{field}': {value}\n\nHint: {hint}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The invalid value
        value: String,
        /// Helpful hint for correct values
        hint: String,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(err.to_string())
    }
}

/// Result type alias using `CliError` as the default error type.
pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Extension trait for adding context to `Result` types.
pub trait ResultExt<T> {
    /// Turns a not-found I/O error into [`CliError::FileNotFound`].
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T>;
}

impl<T, E: Into<CliError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T> {
        self.map_err(|e| match e.into() {
            CliError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                CliError::FileNotFound(path.as_ref().to_path_buf())
            }
            other => other,
        })
    }
}

/// Convert a CLI error into a miette report for the final exit.
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Config(e) => miette::miette!("{}", e),
        CliError::Bundler(BundlerError::Spawn { command, source }) => miette::miette!(
            "Could not start bundler '{}': {}\n\nHint: Install it or set bundler.command in fob.dev.json",
            command,
            source
        ),
        other => miette::miette!("{}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_not_found() {
        let err = ConfigError::NotFound(PathBuf::from("fob.dev.json"));
        let msg = err.to_string();
        assert!(msg.contains("Config file not found"));
        assert!(msg.contains("fob.dev.json"));
        assert!(msg.contains("Hint:"));
    }

    #[test]
    fn test_cli_error_from_config_error() {
        let cli_err: CliError = ConfigError::NotFound(PathBuf::from("x.json")).into();
        assert!(matches!(cli_err, CliError::Config(_)));
    }

    #[test]
    fn test_result_ext_with_path() {
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
        let err = result.with_path("/test/index.html").unwrap_err();
        assert!(matches!(err, CliError::FileNotFound(_)));
    }

    #[test]
    fn test_config_error_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "pollIntervalMs".to_string(),
            value: "0".to_string(),
            hint: "Use a positive interval".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Invalid value for 'pollIntervalMs': 0"));
        assert!(msg.contains("Hint: Use a positive interval"));
    }

    #[test]
    fn test_spawn_failure_report_mentions_command() {
        let err = CliError::Bundler(BundlerError::Spawn {
            command: "esbuild".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });
        let report = cli_error_to_miette(err);
        assert!(report.to_string().contains("esbuild"));
    }
}

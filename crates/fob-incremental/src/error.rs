//! Error types for the incremental engine.
//!
//! Build errors reported by the bundler are *not* errors here: they are part of
//! a [`BundleResult`](crate::BundleResult) and end up on the generation. The
//! types below cover failures of the machinery around a build.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a bundler invocation itself.
#[derive(Debug, Error)]
pub enum BundlerError {
    /// The bundler process could not be started.
    #[error("failed to spawn bundler `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The bundler finished but its metafile could not be read.
    #[error("invalid metafile at {}: {source}", path.display())]
    Metafile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// I/O failure while staging or collecting output.
    #[error("bundler I/O error: {0}")]
    Io(#[from] io::Error),

    /// The build task ended without producing a result (panic or cancellation).
    #[error("build task aborted: {0}")]
    Aborted(String),

    /// Any other failure reported by a bundler implementation.
    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by a [`SessionHandle`](crate::SessionHandle).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("build session has been disposed")]
    Disposed,
}

/// Watcher setup failures. These are logged and never stop a session.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to create {kind} watcher: {source}")]
    Create {
        kind: &'static str,
        #[source]
        source: notify::Error,
    },

    #[error("failed to watch {}: {source}", path.display())]
    Register {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// HTML template failures.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read HTML template {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failures while applying a generation's side effects.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

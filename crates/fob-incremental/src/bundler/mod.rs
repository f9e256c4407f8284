//! The bundler collaborator.
//!
//! The engine never looks inside a build. A [`Bundler`] is an opaque build
//! function that returns diagnostics, a dependency manifest ([`Metafile`]) and
//! the output buffers of one generation. Anything that can produce those can
//! drive a session; [`CommandBundler`] shells out to an esbuild-compatible CLI.

mod command;
mod metafile;

pub use command::{CommandBundler, CommandBundlerConfig, DEFAULT_BUNDLER};
pub use metafile::{
    InputImport, Metafile, MetafileInput, MetafileOutput, OutputInput, resolve_path,
    split_input_key,
};

use crate::error::BundlerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A diagnostic reported by the bundler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Message {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{location}: {}", self.text),
            None => f.write_str(&self.text),
        }
    }
}

/// One output buffer: absolute destination path plus contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

impl OutputFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// Everything one bundler call produced.
#[derive(Debug, Clone, Default)]
pub struct BundleResult {
    pub errors: Vec<Message>,
    pub warnings: Vec<Message>,
    pub metafile: Metafile,
    pub output_files: Vec<OutputFile>,
}

impl BundleResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Opaque build function driven by a session.
///
/// Build errors belong in [`BundleResult::errors`]; an `Err` means the
/// invocation itself failed and no generation is produced.
#[async_trait]
pub trait Bundler: Send + Sync + 'static {
    /// Runs one build.
    async fn build(&self) -> Result<BundleResult, BundlerError>;

    /// Releases resources held between builds.
    async fn dispose(&self) -> Result<(), BundlerError> {
        Ok(())
    }

    /// Paths that must be watched even when no build has succeeded yet,
    /// typically the entry points.
    fn watch_seeds(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_display() {
        assert_eq!(Message::new("boom").to_string(), "boom");
        assert_eq!(
            Message::new("Could not resolve \"x\"")
                .with_location("src/app.ts:1:7")
                .to_string(),
            "src/app.ts:1:7: Could not resolve \"x\""
        );
    }
}

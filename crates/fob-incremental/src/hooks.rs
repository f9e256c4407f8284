//! Observation points into a session.

use crate::error::BundlerError;
use crate::session::{BuildGeneration, BuildSettings};
use crate::watch::FileChange;
use async_trait::async_trait;

/// How a build attempt ended.
#[derive(Debug, Clone, Copy)]
pub enum BuildAttempt<'a> {
    /// A generation was produced. It may still carry build errors.
    Completed(&'a BuildGeneration),
    /// The bundler invocation failed; no generation was produced.
    Failed {
        number: u64,
        error: &'a BundlerError,
    },
}

impl BuildAttempt<'_> {
    pub fn number(&self) -> u64 {
        match self {
            BuildAttempt::Completed(generation) => generation.number,
            BuildAttempt::Failed { number, .. } => *number,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, BuildAttempt::Completed(generation) if !generation.has_errors())
    }
}

/// Callbacks invoked by a session. Every method has a no-op default.
///
/// `on_build_start` and `on_build_end` run on the build task;
/// `on_watch_event` runs on the session task and must not block.
#[async_trait]
pub trait BuildHooks: Send + Sync + 'static {
    /// Called before the bundler runs. `count` is the 1-based attempt number.
    fn on_build_start(&self, _count: u64) {}

    /// Called after outputs are written and before clients are notified.
    async fn on_build_end(
        &self,
        _attempt: &BuildAttempt<'_>,
        _settings: &BuildSettings,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called for every filesystem change that feeds a rebuild trigger.
    fn on_watch_event(&self, _change: &FileChange) {}
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl BuildHooks for NoopHooks {}

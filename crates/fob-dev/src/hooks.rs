//! Terminal reporting of build attempts and file changes.

use crate::ui::{self, Spinner};
use async_trait::async_trait;
use fob_incremental::{BuildAttempt, BuildHooks, BuildSettings, BundlerError, FileChange};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

/// Prints one line per build and per observed change.
///
/// An attached spinner runs until the first build ends.
pub struct TerminalHooks {
    root: PathBuf,
    spinner: Mutex<Option<Spinner>>,
}

impl TerminalHooks {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            spinner: Mutex::new(None),
        }
    }

    pub fn with_spinner(self, spinner: Spinner) -> Self {
        *self.spinner.lock() = Some(spinner);
        self
    }

    fn display<'a>(&self, path: &'a Path) -> std::path::Display<'a> {
        path.strip_prefix(&self.root).unwrap_or(path).display()
    }
}

/// Headline for a finished attempt, and whether it succeeded.
pub fn summarize(attempt: &BuildAttempt<'_>) -> (String, bool) {
    match attempt {
        BuildAttempt::Completed(generation) if !generation.has_errors() => (
            format!(
                "Build #{} completed in {}",
                generation.number,
                ui::format_duration(generation.duration)
            ),
            true,
        ),
        BuildAttempt::Completed(generation) => (
            format!(
                "Build #{} failed with {} error(s)",
                generation.number,
                generation.errors.len()
            ),
            false,
        ),
        BuildAttempt::Failed { number, error } => {
            (format!("Build #{} could not run: {}", number, error), false)
        }
    }
}

#[async_trait]
impl BuildHooks for TerminalHooks {
    fn on_build_start(&self, count: u64) {
        if count > 1 {
            tracing::debug!(count, "rebuilding");
        }
    }

    async fn on_build_end(
        &self,
        attempt: &BuildAttempt<'_>,
        _settings: &BuildSettings,
    ) -> anyhow::Result<()> {
        let (headline, ok) = summarize(attempt);
        match (self.spinner.lock().take(), ok) {
            (Some(spinner), true) => spinner.finish(&headline),
            (Some(spinner), false) => spinner.fail(&headline),
            (None, true) => ui::success(&headline),
            (None, false) => ui::error(&headline),
        }

        match attempt {
            BuildAttempt::Completed(generation) => {
                for error in &generation.errors {
                    ui::error(&error.to_string());
                }
                for warning in &generation.warnings {
                    ui::warning(&warning.to_string());
                }
            }
            BuildAttempt::Failed {
                error: BundlerError::Spawn { command, .. },
                ..
            } => {
                ui::warning(&format!(
                    "Is '{}' installed? Set bundler.command in fob.dev.json to use another bundler",
                    command
                ));
            }
            BuildAttempt::Failed { .. } => {}
        }
        Ok(())
    }

    fn on_watch_event(&self, change: &FileChange) {
        let verb = match change {
            FileChange::Modified(_) => "changed",
            FileChange::Created(_) => "created",
            FileChange::Removed(_) => "removed",
        };
        ui::info(&format!("{} {}", self.display(change.path()), verb));
    }
}

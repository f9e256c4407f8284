//! Rebuild lifecycle.
//!
//! A session owns one bundler and runs it at most once at a time. It lives
//! in a single task that alternates between two phases:
//!
//! - **Building**: the bundler runs on a spawned attempt task; trigger
//!   requests arriving meanwhile join that attempt instead of starting
//!   another one.
//! - **Idle**: watchers are armed for the current dependency set; the next
//!   filesystem trigger or explicit request starts a build.
//!
//! Callers talk to the task through a cloneable [`SessionHandle`].

mod actor;
mod attempt;

use crate::bundler::{BundleResult, Bundler, Message, Metafile, OutputFile};
use crate::error::SessionError;
use crate::hooks::{BuildHooks, NoopHooks};
use crate::html::TemplateWriter;
use crate::relay::LiveReloadRelay;
use crate::watch::WatchOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use actor::{Command, Session};

/// Commands queued before the session task picks them up.
const COMMAND_BUFFER: usize = 64;

/// The immutable result of one completed bundler invocation.
#[derive(Debug, Clone)]
pub struct BuildGeneration {
    /// 1-based, increasing per session.
    pub number: u64,
    pub errors: Vec<Message>,
    pub warnings: Vec<Message>,
    pub metafile: Metafile,
    pub output_files: Vec<OutputFile>,
    pub duration: Duration,
}

impl BuildGeneration {
    pub fn new(number: u64, result: BundleResult, duration: Duration) -> Self {
        Self {
            number,
            errors: result.errors,
            warnings: result.warnings,
            metafile: result.metafile,
            output_files: result.output_files,
            duration,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Filesystem layout of a session.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    /// Root against which relative metafile paths are resolved.
    pub cwd: PathBuf,
    /// Where outputs and HTML documents are written.
    pub out_dir: PathBuf,
    /// Write outputs to disk. When off, generations are only held in memory.
    pub write: bool,
}

pub struct IncrementalOptions {
    pub(crate) bundler: Arc<dyn Bundler>,
    pub(crate) settings: BuildSettings,
    pub(crate) hooks: Arc<dyn BuildHooks>,
    pub(crate) templates: Option<Arc<dyn TemplateWriter>>,
    pub(crate) relay: Arc<LiveReloadRelay>,
    pub(crate) watch: Option<WatchOptions>,
}

impl IncrementalOptions {
    pub fn new(
        bundler: Arc<dyn Bundler>,
        cwd: impl Into<PathBuf>,
        out_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            bundler,
            settings: BuildSettings {
                cwd: cwd.into(),
                out_dir: out_dir.into(),
                write: true,
            },
            hooks: Arc::new(NoopHooks),
            templates: None,
            relay: LiveReloadRelay::new(),
            watch: Some(WatchOptions::default()),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn BuildHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_templates(mut self, templates: Arc<dyn TemplateWriter>) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn with_relay(mut self, relay: Arc<LiveReloadRelay>) -> Self {
        self.relay = relay;
        self
    }

    pub fn with_watch(mut self, watch: WatchOptions) -> Self {
        self.watch = Some(watch);
        self
    }

    /// Rebuild only on explicit [`SessionHandle::trigger`] calls.
    pub fn without_watch(mut self) -> Self {
        self.watch = None;
        self
    }

    pub fn with_write(mut self, write: bool) -> Self {
        self.settings.write = write;
        self
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub fn relay(&self) -> &Arc<LiveReloadRelay> {
        &self.relay
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Building,
    Idle,
    Disposed,
}

/// Snapshot published by the session task.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub phase: Phase,
    pub current: Option<Arc<BuildGeneration>>,
    /// Number of generations installed so far.
    pub completed: u64,
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionState>,
    relay: Arc<LiveReloadRelay>,
}

impl SessionHandle {
    /// Requests a build, or joins the one in flight.
    ///
    /// Resolves with the installed generation, or `None` when the bundler
    /// invocation failed.
    pub async fn trigger(&self) -> Result<Option<Arc<BuildGeneration>>, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Trigger(reply))
            .await
            .map_err(|_| SessionError::Disposed)?;
        response.await.map_err(|_| SessionError::Disposed)
    }

    /// Waits until no build is in flight and returns the current generation.
    pub async fn wait(&self) -> Option<Arc<BuildGeneration>> {
        let mut state = self.state.clone();
        if let Ok(settled) = state.wait_for(|state| state.phase != Phase::Building).await {
            return settled.current.clone();
        }
        // The session task is gone; its last published state still stands.
        state.borrow().current.clone()
    }

    pub fn phase(&self) -> Phase {
        self.state.borrow().phase
    }

    pub fn current(&self) -> Option<Arc<BuildGeneration>> {
        self.state.borrow().current.clone()
    }

    pub fn completed(&self) -> u64 {
        self.state.borrow().completed
    }

    /// The relay notified after every generation.
    pub fn relay(&self) -> &Arc<LiveReloadRelay> {
        &self.relay
    }

    /// Subscribes to state changes.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Waits for an in-flight build, then releases watchers, the bundler and
    /// live-reload clients. Calling it again is a no-op.
    pub async fn dispose(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Dispose(reply)).await.is_ok() {
            let _ = done.await;
        }
    }
}

/// A running session together with its first generation.
pub struct IncrementalBuild {
    /// Result of the first build; `None` if the bundler invocation failed.
    pub initial: Option<Arc<BuildGeneration>>,
    handle: SessionHandle,
    task: JoinHandle<()>,
}

impl IncrementalBuild {
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn relay(&self) -> &Arc<LiveReloadRelay> {
        self.handle.relay()
    }

    /// Disposes the session and waits for its task to finish.
    pub async fn dispose(self) {
        self.handle.dispose().await;
        if let Err(err) = self.task.await {
            tracing::error!("build session task failed: {err}");
        }
    }
}

/// Starts a session, runs the first build and returns once it has settled.
pub async fn incremental_build(options: IncrementalOptions) -> IncrementalBuild {
    let (commands, inbox) = mpsc::channel(COMMAND_BUFFER);
    let (publisher, state) = watch::channel(SessionState {
        phase: Phase::Building,
        current: None,
        completed: 0,
    });

    let relay = Arc::clone(&options.relay);
    let task = tokio::spawn(Session::new(options, inbox, publisher).run());
    let handle = SessionHandle {
        commands,
        state,
        relay,
    };
    let initial = handle.wait().await;

    IncrementalBuild {
        initial,
        handle,
        task,
    }
}

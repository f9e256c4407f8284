//! The session task.

use super::attempt::{AttemptOutcome, BuildContext};
use super::{BuildGeneration, IncrementalOptions, Phase, SessionState};
use crate::relay::ReloadEvent;
use crate::watch::{BuildSnapshot, WatchCoordinator, WatchSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

type Waiter = oneshot::Sender<Option<Arc<BuildGeneration>>>;

pub(crate) enum Command {
    Trigger(Waiter),
    Dispose(oneshot::Sender<()>),
}

/// Why the session is shutting down.
enum Shutdown {
    Requested(oneshot::Sender<()>),
    /// Every handle was dropped.
    Abandoned,
}

/// What ends an idle phase.
enum Wake {
    Build(Vec<Waiter>),
    Shutdown(Shutdown),
}

pub(crate) struct Session {
    context: Arc<BuildContext>,
    coordinator: Option<WatchCoordinator>,
    markers: Vec<String>,
    commands: mpsc::Receiver<Command>,
    state: watch::Sender<SessionState>,
    current: Option<Arc<BuildGeneration>>,
    attempts: u64,
    completed: u64,
    /// Set to arm once the running generation settles, with the input
    /// snapshot taken when it started.
    next_watch: Option<(WatchSet, BuildSnapshot)>,
}

impl Session {
    pub(crate) fn new(
        options: IncrementalOptions,
        commands: mpsc::Receiver<Command>,
        state: watch::Sender<SessionState>,
    ) -> Self {
        let markers = options
            .watch
            .as_ref()
            .map(|watch| watch.package_markers.clone())
            .unwrap_or_default();
        let coordinator = options.watch.clone().map(WatchCoordinator::new);

        Self {
            context: Arc::new(BuildContext::new(options)),
            coordinator,
            markers,
            commands,
            state,
            current: None,
            attempts: 0,
            completed: 0,
            next_watch: None,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut waiters = Vec::new();
        loop {
            let (result, shutdown) = self.build(&mut waiters).await;
            self.publish(Phase::Idle);
            for waiter in waiters.drain(..) {
                let _ = waiter.send(result.clone());
            }

            if let Some(shutdown) = shutdown {
                return self.shutdown(shutdown).await;
            }

            match self.idle().await {
                Wake::Build(next) => waiters = next,
                Wake::Shutdown(shutdown) => return self.shutdown(shutdown).await,
            }
        }
    }

    /// Runs one attempt. Trigger requests received meanwhile join it; a
    /// dispose request is held until it settles.
    async fn build(
        &mut self,
        waiters: &mut Vec<Waiter>,
    ) -> (Option<Arc<BuildGeneration>>, Option<Shutdown>) {
        if let Some(coordinator) = self.coordinator.as_mut() {
            coordinator.disarm();
        }

        self.attempts += 1;
        let number = self.attempts;
        self.publish(Phase::Building);

        let snapshot = match &self.coordinator {
            Some(_) => {
                let known = self.armed_set().union(&self.derive_watch_set(None));
                BuildSnapshot::capture(known.inputs().clone()).await
            }
            None => BuildSnapshot::new(std::time::SystemTime::now()),
        };

        let context = Arc::clone(&self.context);
        let mut task = tokio::spawn(async move { context.run(number).await });

        let mut shutdown = None;
        let joined = loop {
            tokio::select! {
                joined = &mut task => break joined,
                command = self.commands.recv(), if shutdown.is_none() => match command {
                    Some(Command::Trigger(waiter)) => waiters.push(waiter),
                    Some(Command::Dispose(reply)) => shutdown = Some(Shutdown::Requested(reply)),
                    None => shutdown = Some(Shutdown::Abandoned),
                },
            }
        };

        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(generation = number, "build task failed: {err}");
                self.context.relay.broadcast(&ReloadEvent::BuildFailed {
                    generation: number,
                    errors: vec![format!("build task failed: {err}")],
                });
                AttemptOutcome::Failed
            }
        };

        let result = match outcome {
            AttemptOutcome::Completed(generation) => {
                self.completed += 1;
                let derived = self.derive_watch_set(Some(&generation));
                let next = if generation.has_errors() {
                    self.armed_set().union(&derived)
                } else {
                    derived
                };
                self.next_watch = Some((next, snapshot));
                self.current = Some(Arc::clone(&generation));
                Some(generation)
            }
            AttemptOutcome::Failed => {
                let next = self.armed_set().union(&self.derive_watch_set(None));
                self.next_watch = Some((next, snapshot));
                None
            }
        };

        (result, shutdown)
    }

    /// Arms the watchers and waits for a trigger or a command.
    async fn idle(&mut self) -> Wake {
        if let (Some(coordinator), Some((set, snapshot))) =
            (self.coordinator.as_mut(), self.next_watch.take())
        {
            coordinator.arm(set, snapshot);
        }

        let hooks = Arc::clone(&self.context.hooks);
        let coordinator = &mut self.coordinator;
        let commands = &mut self.commands;

        let trigger = async move {
            match coordinator {
                Some(coordinator) => coordinator.next_trigger(hooks.as_ref()).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Trigger(waiter)) => Wake::Build(vec![waiter]),
                Some(Command::Dispose(reply)) => Wake::Shutdown(Shutdown::Requested(reply)),
                None => Wake::Shutdown(Shutdown::Abandoned),
            },
            trigger = trigger => {
                if let Some(first) = trigger.changes.first() {
                    tracing::info!(
                        changes = trigger.changes.len(),
                        path = %first.path().display(),
                        "change detected, rebuilding"
                    );
                }
                Wake::Build(Vec::new())
            }
        }
    }

    async fn shutdown(mut self, shutdown: Shutdown) {
        if let Some(mut coordinator) = self.coordinator.take() {
            coordinator.disarm();
        }

        let bundler = Arc::clone(&self.context.bundler);
        match tokio::spawn(async move { bundler.dispose().await }).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!("failed to dispose bundler: {err}"),
            Err(err) => tracing::warn!("bundler dispose task failed: {err}"),
        }

        let dropped = self.context.relay.close();
        tracing::debug!(clients = dropped, "live-reload clients released");

        self.publish(Phase::Disposed);
        if let Shutdown::Requested(reply) = shutdown {
            let _ = reply.send(());
        }
    }

    fn armed_set(&self) -> WatchSet {
        self.coordinator
            .as_ref()
            .map(|coordinator| coordinator.armed().clone())
            .unwrap_or_default()
    }

    /// Manifest inputs plus watch seeds and template sources.
    fn derive_watch_set(&self, generation: Option<&BuildGeneration>) -> WatchSet {
        let mut set = match generation {
            Some(generation) => WatchSet::from_metafile(
                &generation.metafile,
                &self.context.settings.cwd,
                &self.markers,
            ),
            None => WatchSet::new(),
        };
        set.extend(self.context.bundler.watch_seeds(), &self.markers);
        if let Some(templates) = &self.context.templates {
            set.extend(templates.sources(), &self.markers);
        }
        set
    }

    fn publish(&self, phase: Phase) {
        self.state.send_replace(SessionState {
            phase,
            current: self.current.clone(),
            completed: self.completed,
        });
    }
}

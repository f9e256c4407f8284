//! Arms and disarms filesystem watchers around builds.
//!
//! Leaves are observed through the platform watcher on their parent
//! directories, filtered to the leaf set, so rename-based saves still show up.
//! Packages are polled recursively. Watchers only exist between builds: they
//! are dropped when a rebuild starts and recreated once it settles.

use super::target::{DEFAULT_PACKAGE_MARKERS, WatchDiff, WatchSet};
use crate::error::WatchError;
use crate::hooks::BuildHooks;
use notify::{Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Default debounce window and arming delay.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);
/// Default poll interval for package directories.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Shortest debounce window a configuration may ask for.
pub const MIN_DEBOUNCE: Duration = Duration::from_millis(10);

/// File change event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    /// File was modified
    Modified(PathBuf),
    /// File was created
    Created(PathBuf),
    /// File was removed
    Removed(PathBuf),
}

impl FileChange {
    /// Get the path affected by this change.
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Modified(p) | FileChange::Created(p) | FileChange::Removed(p) => p,
        }
    }

    fn from_event(kind: &EventKind, path: &Path) -> Option<Self> {
        let path = path.to_path_buf();
        match kind {
            EventKind::Create(_) => Some(FileChange::Created(path)),
            EventKind::Modify(_) => Some(FileChange::Modified(path)),
            EventKind::Remove(_) => Some(FileChange::Removed(path)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub debounce: Duration,
    pub poll_interval: Duration,
    pub package_markers: Vec<String>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            package_markers: DEFAULT_PACKAGE_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl WatchOptions {
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_package_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.package_markers = markers.into_iter().map(Into::into).collect();
        self
    }
}

/// Coalesced filesystem changes that warrant a rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildTrigger {
    pub changes: Vec<FileChange>,
}

/// Input modification times recorded when a build starts.
///
/// The missed-edit scan compares against these rather than the wall clock,
/// so the edit that triggered a build is never reported again once it
/// settles.
#[derive(Debug, Clone)]
pub struct BuildSnapshot {
    started: SystemTime,
    mtimes: HashMap<PathBuf, Option<SystemTime>>,
}

impl BuildSnapshot {
    /// A snapshot that knows no inputs; everything is judged by `started`.
    pub fn new(started: SystemTime) -> Self {
        Self {
            started,
            mtimes: HashMap::default(),
        }
    }

    /// Stats `inputs` off the runtime threads.
    pub async fn capture(inputs: BTreeSet<PathBuf>) -> Self {
        let started = SystemTime::now();
        let stat = move || {
            inputs
                .into_iter()
                .map(|path| {
                    let mtime = modified(&path);
                    (path, mtime)
                })
                .collect::<HashMap<_, _>>()
        };
        match tokio::task::spawn_blocking(stat).await {
            Ok(mtimes) => Self { started, mtimes },
            Err(err) => {
                tracing::warn!("input snapshot failed: {err}");
                Self::new(started)
            }
        }
    }

    /// Whether `path`, now modified at `mtime`, changed since the build
    /// started. Inputs first seen by this build fall back to the start time.
    fn is_missed(&self, path: &Path, mtime: SystemTime, now: SystemTime) -> bool {
        match self.mtimes.get(path) {
            Some(Some(recorded)) => mtime != *recorded,
            Some(None) => true,
            None => mtime >= self.started && mtime <= now,
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

/// State of an armed set that has not been checked for missed edits yet.
struct PendingScan {
    snapshot: BuildSnapshot,
    quiet_until: Instant,
}

pub struct WatchCoordinator {
    options: WatchOptions,
    armed: WatchSet,
    leaves: Option<RecommendedWatcher>,
    packages: Option<PollWatcher>,
    events: Option<mpsc::UnboundedReceiver<FileChange>>,
    pending: Option<PendingScan>,
}

impl WatchCoordinator {
    pub fn new(options: WatchOptions) -> Self {
        Self {
            options,
            armed: WatchSet::new(),
            leaves: None,
            packages: None,
            events: None,
            pending: None,
        }
    }

    pub fn options(&self) -> &WatchOptions {
        &self.options
    }

    /// The set installed by the last [`arm`](Self::arm).
    pub fn armed(&self) -> &WatchSet {
        &self.armed
    }

    pub fn is_armed(&self) -> bool {
        self.events.is_some()
    }

    /// Installs `next` as the watched set and starts fresh watchers for it.
    ///
    /// `snapshot` was taken when the build that produced `next` started;
    /// inputs modified since then are reported as soon as the arming delay
    /// has passed.
    pub fn arm(&mut self, next: WatchSet, snapshot: BuildSnapshot) -> WatchDiff {
        self.disarm();

        let diff = self.armed.diff(&next);
        if !diff.is_empty() {
            tracing::debug!(
                added_leaves = diff.added_leaves.len(),
                removed_leaves = diff.removed_leaves.len(),
                added_packages = diff.added_packages.len(),
                removed_packages = diff.removed_packages.len(),
                "watch set changed"
            );
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.leaves = match watch_leaves(next.leaves(), tx.clone()) {
            Ok(watcher) => watcher,
            Err(err) => {
                tracing::warn!("{err}");
                None
            }
        };
        self.packages = match watch_packages(next.packages(), tx, self.options.poll_interval) {
            Ok(watcher) => watcher,
            Err(err) => {
                tracing::warn!("{err}");
                None
            }
        };

        tracing::debug!(
            leaves = next.leaves().len(),
            packages = next.packages().len(),
            "watchers armed"
        );

        self.armed = next;
        self.events = Some(rx);
        self.pending = Some(PendingScan {
            snapshot,
            quiet_until: Instant::now() + self.options.debounce,
        });
        diff
    }

    /// Stops every watcher. The armed set is kept for the next diff.
    pub fn disarm(&mut self) {
        if self.events.is_none() {
            return;
        }
        self.leaves = None;
        self.packages = None;
        self.events = None;
        self.pending = None;
        tracing::debug!("watchers stopped");
    }

    /// Waits for the next rebuild trigger. Never resolves while disarmed.
    ///
    /// Cancel-safe with respect to the arming delay and the missed-edit
    /// scan; events of a debounce window in progress are dropped if the
    /// future is cancelled.
    pub async fn next_trigger(&mut self, hooks: &dyn BuildHooks) -> RebuildTrigger {
        let debounce = self.options.debounce;
        let Some(events) = self.events.as_mut() else {
            return std::future::pending().await;
        };

        if let Some(quiet_until) = self.pending.as_ref().map(|pending| pending.quiet_until) {
            // Events right after arming stem from the build itself.
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(quiet_until) => break,
                    event = events.recv() => if event.is_none() { break },
                }
            }

            let inputs = self.armed.inputs().clone();
            let snapshot = self
                .pending
                .take()
                .map(|pending| pending.snapshot)
                .unwrap_or_else(|| BuildSnapshot::new(SystemTime::now()));

            let missed = missed_edits(inputs, snapshot).await;
            if !missed.is_empty() {
                tracing::debug!(count = missed.len(), "edits made during the last build");
                for change in &missed {
                    hooks.on_watch_event(change);
                }
                return RebuildTrigger { changes: missed };
            }
        }

        let Some(first) = events.recv().await else {
            return std::future::pending().await;
        };
        hooks.on_watch_event(&first);
        let mut changes = vec![first];

        let deadline = Instant::now() + debounce;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                event = events.recv() => match event {
                    Some(change) => {
                        hooks.on_watch_event(&change);
                        if !changes.contains(&change) {
                            changes.push(change);
                        }
                    }
                    None => break,
                },
            }
        }

        RebuildTrigger { changes }
    }
}

fn watch_leaves(
    leaves: &BTreeSet<PathBuf>,
    tx: mpsc::UnboundedSender<FileChange>,
) -> Result<Option<RecommendedWatcher>, WatchError> {
    if leaves.is_empty() {
        return Ok(None);
    }

    let filter: HashSet<PathBuf> = leaves.iter().cloned().collect();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for path in event.paths.iter().filter(|path| filter.contains(*path)) {
                if let Some(change) = FileChange::from_event(&event.kind, path) {
                    let _ = tx.send(change);
                }
            }
        }
        Err(err) => tracing::warn!("file watcher error: {err}"),
    })
    .map_err(|source| WatchError::Create {
        kind: "file",
        source,
    })?;

    let dirs: BTreeSet<&Path> = leaves.iter().filter_map(|leaf| leaf.parent()).collect();
    for dir in dirs {
        if let Err(source) = watcher.watch(dir, RecursiveMode::NonRecursive) {
            let err = WatchError::Register {
                path: dir.to_path_buf(),
                source,
            };
            tracing::warn!("{err}");
        }
    }

    Ok(Some(watcher))
}

fn watch_packages(
    packages: &BTreeSet<PathBuf>,
    tx: mpsc::UnboundedSender<FileChange>,
    interval: Duration,
) -> Result<Option<PollWatcher>, WatchError> {
    if packages.is_empty() {
        return Ok(None);
    }

    let config = notify::Config::default().with_poll_interval(interval);
    let mut watcher = PollWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for path in &event.paths {
                    if let Some(change) = FileChange::from_event(&event.kind, path) {
                        let _ = tx.send(change);
                    }
                }
            }
            Err(err) => tracing::warn!("package watcher error: {err}"),
        },
        config,
    )
    .map_err(|source| WatchError::Create {
        kind: "package",
        source,
    })?;

    for dir in packages {
        if let Err(source) = watcher.watch(dir, RecursiveMode::Recursive) {
            let err = WatchError::Register {
                path: dir.clone(),
                source,
            };
            tracing::warn!("{err}");
        }
    }

    Ok(Some(watcher))
}

/// Inputs modified since `snapshot` was taken. Missing files are left to
/// the watchers.
async fn missed_edits(inputs: BTreeSet<PathBuf>, snapshot: BuildSnapshot) -> Vec<FileChange> {
    let scan = move || {
        let now = SystemTime::now();
        inputs
            .into_iter()
            .filter(|path| modified(path).is_some_and(|mtime| snapshot.is_missed(path, mtime, now)))
            .map(FileChange::Modified)
            .collect::<Vec<_>>()
    };

    match tokio::task::spawn_blocking(scan).await {
        Ok(changes) => changes,
        Err(err) => {
            tracing::warn!("missed-edit scan failed: {err}");
            Vec::new()
        }
    }
}

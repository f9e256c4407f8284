//! Filesystem observation.
//!
//! [`WatchSet`] describes what a generation depends on; [`WatchCoordinator`]
//! turns it into running watchers and coalesces their events into a
//! [`RebuildTrigger`].

mod coordinator;
mod target;

pub use coordinator::{
    BuildSnapshot, DEFAULT_DEBOUNCE, DEFAULT_POLL_INTERVAL, FileChange, MIN_DEBOUNCE,
    RebuildTrigger, WatchCoordinator, WatchOptions,
};
pub use target::{DEFAULT_PACKAGE_MARKERS, WatchDiff, WatchSet, WatchTarget, classify};

//! # fob-incremental
//!
//! Incremental build-and-watch engine layered over an external bundler.
//!
//! The engine turns a one-shot bundler into a long-lived session:
//!
//! - a [`WatchCoordinator`] observes exactly the files the current
//!   generation depends on, collapsing dependency packages into polled
//!   directories, and coalesces bursts of edits into one trigger;
//! - the session task runs the bundler at most once at a time, writes
//!   changed outputs, and only then releases waiters;
//! - a [`LiveReloadRelay`] tells connected browsers what changed;
//! - a [`TransformCache`] keeps derived artifacts (such as parsed HTML
//!   templates) until one of the files they were computed from changes.
//!
//! ```rust,no_run
//! use fob_incremental::{CommandBundler, CommandBundlerConfig, IncrementalOptions, incremental_build};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let bundler = CommandBundler::new(
//!     CommandBundlerConfig::new(".", "dist").with_entry_points(["src/app.ts"]),
//! );
//! let session = incremental_build(IncrementalOptions::new(Arc::new(bundler), ".", "dist")).await;
//! println!("first build: {:?}", session.initial.as_ref().map(|g| g.number));
//! session.handle().wait().await;
//! session.dispose().await;
//! # }
//! ```

pub mod bundler;
pub mod cache;
pub mod error;
pub mod hooks;
pub mod html;
pub mod relay;
pub mod session;
pub mod watch;

pub use bundler::{
    BundleResult, Bundler, CommandBundler, CommandBundlerConfig, Message, Metafile, OutputFile,
};
pub use cache::{CacheStats, Transform, TransformCache, Transformed};
pub use error::{BundlerError, OutputError, SessionError, TemplateError, WatchError};
pub use hooks::{BuildAttempt, BuildHooks, NoopHooks};
pub use html::{HtmlDocument, HtmlTemplateWriter, RELOAD_SCRIPT_PATH, TemplateWriter};
pub use relay::{LiveReloadRelay, ReloadEvent, Subscription};
pub use session::{
    BuildGeneration, BuildSettings, IncrementalBuild, IncrementalOptions, Phase, SessionHandle,
    SessionState, incremental_build,
};
pub use watch::{
    BuildSnapshot, FileChange, MIN_DEBOUNCE, RebuildTrigger, WatchCoordinator, WatchDiff,
    WatchOptions, WatchSet, WatchTarget,
};

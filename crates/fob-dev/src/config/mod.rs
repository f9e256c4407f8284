//! Configuration with multi-source loading.
//!
//! Priority: CLI > `FOB_DEV_*` environment > `fob.dev.json` > defaults.

mod loading;
mod validation;

use fob_incremental::WatchOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use loading::{ConfigOverrides, CONFIG_FILE_NAME, ENV_PREFIX};

/// Settings for `fob.dev.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DevConfig {
    /// Entry points handed to the bundler (e.g., ["src/app.ts"])
    pub entry_points: Vec<String>,

    /// HTML entry files, rewritten and written to the output directory
    #[serde(default)]
    pub html: Vec<String>,

    pub out_dir: PathBuf,

    /// Static files served after the output directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serve_dir: Option<PathBuf>,

    /// Serve the first HTML entry for paths that match no file
    #[serde(default)]
    pub spa: bool,

    pub port: u16,
    pub host: String,

    #[serde(default)]
    pub bundler: BundlerSettings,

    /// Debounce window and arming delay for file events
    pub debounce_ms: u64,

    /// Poll interval for dependency packages
    pub poll_interval_ms: u64,

    /// Path segments whose next segment names a dependency package
    pub package_markers: Vec<String>,

    /// Write outputs to disk
    pub write: bool,

    /// Project root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

/// External bundler process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BundlerSettings {
    pub command: String,
    /// Extra arguments appended after the generated ones
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for BundlerSettings {
    fn default() -> Self {
        Self {
            command: fob_incremental::bundler::DEFAULT_BUNDLER.to_string(),
            args: Vec::new(),
        }
    }
}

impl DevConfig {
    pub fn default_config() -> Self {
        let watch = WatchOptions::default();
        Self {
            entry_points: Vec::new(),
            html: Vec::new(),
            out_dir: PathBuf::from("dist"),
            serve_dir: None,
            spa: false,
            port: 3000,
            host: "127.0.0.1".to_string(),
            bundler: BundlerSettings::default(),
            debounce_ms: watch.debounce.as_millis() as u64,
            poll_interval_ms: watch.poll_interval.as_millis() as u64,
            package_markers: watch.package_markers,
            write: true,
            cwd: None,
        }
    }

    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions::default()
            .with_debounce(Duration::from_millis(self.debounce_ms))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_package_markers(self.package_markers.iter().cloned())
    }
}

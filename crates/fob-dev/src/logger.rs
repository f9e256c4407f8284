//! Logging setup for the CLI.
//!
//! Library crates emit `tracing` events; this installs the subscriber that
//! prints them.
//!
//! ```rust,no_run
//! use fob_dev::logger::init_logger;
//!
//! init_logger(false, false, false);
//! tracing::info!("starting");
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERBOSE_FILTER: &str = "fob_dev=debug,fob_incremental=debug";
const QUIET_FILTER: &str = "fob_dev=error,fob_incremental=error";
const DEFAULT_FILTER: &str = "fob_dev=info,fob_incremental=info";

/// Initialize the tracing subscriber.
///
/// Call once, before anything logs.
///
/// # Verbosity Levels
///
/// 1. `--verbose`: DEBUG for the fob crates
/// 2. `--quiet`: ERROR only
/// 3. `RUST_LOG`: custom filter
/// 4. Default: INFO for the fob crates
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    init_logger_with_filter(filter_for(verbose, quiet), no_color);
}

/// Initialize the subscriber with an explicit filter.
pub fn init_logger_with_filter(filter: EnvFilter, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    // A second initialization (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

//! Spinner shown while the first build runs.

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::time::Duration;

/// Simple spinner for tasks without known duration.
///
/// Hidden when stderr is not a terminal or in CI, so logs stay clean.
///
/// ```no_run
/// use fob_dev::ui::Spinner;
///
/// let spinner = Spinner::new("Building...");
/// spinner.finish("Built in 120ms");
/// ```
pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    pub fn new(message: &str) -> Self {
        let pb = if super::is_ci() || !console::user_attended_stderr() {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("valid template")
                .tick_strings(&["◐", "◓", "◑", "◒"]),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        Self { pb }
    }

    pub fn set_message(&self, message: &str) {
        self.pb.set_message(message.to_string());
    }

    /// Clears the spinner and prints a success line.
    pub fn finish(&self, message: &str) {
        self.pb.finish_and_clear();
        eprintln!("{} {}", "✓".green().bold(), message);
    }

    /// Clears the spinner and prints an error line.
    pub fn fail(&self, message: &str) {
        self.pb.finish_and_clear();
        eprintln!("{} {}", "✗".red().bold(), message.red());
    }
}

//! Build command implementation.

use crate::cli::BuildArgs;
use crate::config::{ConfigOverrides, DevConfig};
use crate::error::{CliError, Result};
use crate::hooks::TerminalHooks;
use crate::project::Project;
use crate::ui;
use fob_incremental::{incremental_build, BuildGeneration};
use std::sync::Arc;

/// Execute the build command.
///
/// Runs the bundler once through a session without watchers, so outputs,
/// HTML documents and diagnostics follow exactly the dev-server path.
///
/// # Errors
///
/// - invalid configuration
/// - the bundler could not run
/// - the build reported errors
pub async fn execute(args: BuildArgs) -> Result<()> {
    let overrides = ConfigOverrides::from_build(&args);
    let config = DevConfig::load(&overrides, args.project.config.as_deref())?;
    config.validate()?;

    let project = Project::from_config(config, false)?;
    let hooks =
        TerminalHooks::new(project.root.clone()).with_spinner(ui::Spinner::new("Building..."));
    let options = project
        .session_options(Arc::new(project.bundler()), Arc::new(hooks))
        .without_watch();

    let session = incremental_build(options).await;
    let outcome = match session.initial.as_deref() {
        None => Err(CliError::BundlerFailed),
        Some(generation) if generation.has_errors() => Err(CliError::BuildFailed {
            count: generation.errors.len(),
        }),
        Some(generation) => {
            print_summary(&project, generation);
            Ok(())
        }
    };
    session.dispose().await;
    outcome
}

fn print_summary(project: &Project, generation: &BuildGeneration) {
    let mut entries: Vec<(String, u64)> = generation
        .output_files
        .iter()
        .map(|file| {
            let name = file
                .path
                .strip_prefix(&project.out_dir)
                .unwrap_or(&file.path)
                .display()
                .to_string();
            (name, file.contents.len() as u64)
        })
        .collect();
    entries.sort();
    ui::print_build_summary(&entries, generation.duration);

    if !project.config().write {
        ui::info("Outputs were not written (--no-write)");
    }
}

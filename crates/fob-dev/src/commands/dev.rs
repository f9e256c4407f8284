//! Development server command implementation.
//!
//! Orchestrates the dev server lifecycle:
//! - configuration and port binding
//! - the first build, then watching and rebuilding in the session
//! - the HTTP server with its build gate and live reload
//! - graceful shutdown on Ctrl+C

use crate::cli::DevArgs;
use crate::config::{ConfigOverrides, DevConfig};
use crate::error::{CliError, Result};
use crate::hooks::TerminalHooks;
use crate::project::Project;
use crate::server::{self, DevServer};
use crate::ui;
use fob_incremental::incremental_build;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::signal;

/// Execute the dev command.
///
/// # Process Flow
///
/// 1. Load and validate configuration, bind the listener
/// 2. Start the session; it runs the first build and arms watchers
/// 3. Serve requests behind the build gate
/// 4. Wait for Ctrl+C (or a server failure), then dispose the session
pub async fn execute(args: DevArgs) -> Result<()> {
    ui::info("Starting development server...");

    let overrides = ConfigOverrides::from_dev(&args);
    let config = DevConfig::load(&overrides, args.project.config.as_deref())?;
    config.validate_for_dev()?;
    let host: IpAddr = config
        .host
        .parse()
        .map_err(|_| CliError::InvalidArgument(format!("invalid host '{}'", config.host)))?;

    let project = Project::from_config(config, true)?;
    ui::info(&format!("Entry points: {}", project.config().entry_points.join(", ")));
    ui::info(&format!("Working directory: {}", project.root.display()));

    // Bind first so a port problem surfaces before the build.
    let listener = server::bind(host, project.config().port).await?;
    let url = server::server_url(listener.local_addr()?);

    let hooks =
        TerminalHooks::new(project.root.clone()).with_spinner(ui::Spinner::new("Building..."));
    let mut options = project.session_options(Arc::new(project.bundler()), Arc::new(hooks));
    if args.no_watch {
        options = options.without_watch();
    }
    let session = incremental_build(options).await;
    if session.initial.is_none() {
        ui::warning("The first build did not run; fix the problem and save a file to retry");
    }

    let server = DevServer::new(session.handle().clone(), &project);
    let mut server_task = tokio::spawn(server.serve(listener));

    ui::success(&format!("Development server running at {}", url));
    if args.open {
        open_browser(&url);
    }
    if !args.no_watch {
        ui::info("Watching for changes");
    }
    ui::info("Press Ctrl+C to stop");

    let outcome = tokio::select! {
        result = signal::ctrl_c() => {
            ui::info("Shutting down development server...");
            result.map_err(CliError::from)
        }
        joined = &mut server_task => match joined {
            Ok(result) => result,
            Err(err) => Err(CliError::Server(err.to_string())),
        },
    };

    // Waits for a build in flight and closes live-reload streams.
    session.dispose().await;
    server_task.abort();

    ui::success("Development server stopped");
    outcome
}

/// Open the server URL in the default browser.
///
/// - macOS: `open`
/// - Windows: `start`
/// - Linux: `xdg-open`
fn open_browser(url: &str) {
    use std::process::Command;

    let result = if cfg!(target_os = "macos") {
        Command::new("open").arg(url).spawn()
    } else if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", "start", url]).spawn()
    } else {
        Command::new("xdg-open").arg(url).spawn()
    };

    match result {
        Ok(_) => ui::info(&format!("Opened browser at {}", url)),
        Err(e) => ui::warning(&format!("Failed to open browser: {}", e)),
    }
}

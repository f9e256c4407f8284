//! Development server with live reload via Server-Sent Events.
//!
//! Static requests pass through a gate: they wait until no build is in
//! flight, so a response never mixes files from two generations. Files are
//! looked up in the output directory, then the optional static directory,
//! then (in SPA mode) the primary HTML document.

use crate::error::{CliError, ConfigError, Result};
use crate::project::Project;
use axum::{
    body::{Bytes, HttpBody},
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::get,
    BoxError, Router,
};
use fob_incremental::{ReloadEvent, SessionHandle, RELOAD_SCRIPT_PATH};
use rust_embed::RustEmbed;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::{Stream, StreamExt};
use tower::{Service, ServiceExt};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

/// SSE endpoint the reload client connects to.
pub const LIVERELOAD_PATH: &str = "/__fob_livereload__";

/// Ports tried after the requested one.
const PORT_ATTEMPTS: u16 = 10;

#[derive(RustEmbed)]
#[folder = "assets/"]
struct ClientAssets;

#[derive(Clone)]
struct GateState {
    handle: SessionHandle,
    out_dir: PathBuf,
    serve_dir: Option<PathBuf>,
    spa_index: Option<PathBuf>,
}

pub struct DevServer {
    state: GateState,
}

impl DevServer {
    pub fn new(handle: SessionHandle, project: &Project) -> Self {
        Self {
            state: GateState {
                handle,
                out_dir: project.out_dir.clone(),
                serve_dir: project.serve_dir.clone(),
                spa_index: project.spa_index(),
            },
        }
    }

    /// Routes: live-reload stream, client script, and the gated static
    /// fallback. CORS is open to every origin.
    pub fn router(&self) -> Router {
        Router::new()
            .route(LIVERELOAD_PATH, get(handle_sse))
            .route(RELOAD_SCRIPT_PATH, get(handle_reload_script))
            .fallback(handle_request)
            .layer(CatchPanicLayer::new())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(self.state.clone())
    }

    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        axum::serve(listener, self.router())
            .await
            .map_err(|e| CliError::Server(format!("Server error: {}", e)))
    }
}

/// Binds `host:port`, falling back to the next free port within
/// [`PORT_ATTEMPTS`].
pub async fn bind(host: IpAddr, port: u16) -> Result<TcpListener> {
    if port != 0 && port < 1024 {
        crate::ui::warning(&format!(
            "Port {} is in privileged range, may require root access",
            port
        ));
    }

    for offset in 0..=PORT_ATTEMPTS {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        match TcpListener::bind(SocketAddr::new(host, candidate)).await {
            Ok(listener) => {
                if offset > 0 {
                    crate::ui::warning(&format!(
                        "Port {} is busy, using port {} instead",
                        port, candidate
                    ));
                }
                return Ok(listener);
            }
            Err(err) => tracing::debug!(port = candidate, "bind failed: {err}"),
        }
    }

    Err(ConfigError::InvalidValue {
        field: "port".to_string(),
        value: port.to_string(),
        hint: format!(
            "Ports {}-{} are all in use. Try a different port range.",
            port,
            port.saturating_add(PORT_ATTEMPTS)
        ),
    }
    .into())
}

pub fn server_url(addr: SocketAddr) -> String {
    format!("http://{}", addr)
}

async fn handle_sse(
    State(state): State<GateState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.handle.relay().subscribe();
    tracing::debug!(client = subscription.id(), "live-reload client connected");

    // A client that loads while the current generation is broken still
    // gets the overlay.
    let replay = state
        .handle
        .current()
        .filter(|generation| generation.has_errors())
        .and_then(|generation| {
            serde_json::to_string(&ReloadEvent::BuildFailed {
                generation: generation.number,
                errors: generation.errors.iter().map(ToString::to_string).collect(),
            })
            .ok()
        });

    let stream = tokio_stream::iter(replay)
        .chain(subscription)
        .map(|data| Ok(Event::default().data(data)));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

async fn handle_reload_script() -> Response {
    match ClientAssets::get("reload-client.js") {
        Some(file) => (
            [
                (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            file.data,
        )
            .into_response(),
        None => internal_error(),
    }
}

async fn handle_request(State(state): State<GateState>, request: Request) -> Response {
    // Held until the build in flight, if any, has written its outputs.
    state.handle.wait().await;

    if has_parent_segment(request.uri().path()) {
        return not_found();
    }

    let outputs = ServeDir::new(&state.out_dir);
    match (&state.serve_dir, &state.spa_index) {
        (Some(dir), Some(index)) => {
            let fallback = ServeDir::new(dir).fallback(ServeFile::new(index));
            respond(outputs.fallback(fallback), request).await
        }
        (Some(dir), None) => respond(outputs.fallback(ServeDir::new(dir)), request).await,
        (None, Some(index)) => respond(outputs.fallback(ServeFile::new(index)), request).await,
        (None, None) => respond(outputs, request).await,
    }
}

async fn respond<S, B>(service: S, request: Request) -> Response
where
    S: Service<Request, Response = axum::http::Response<B>, Error = Infallible>,
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let mut response = match service.oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    };

    if response.status().is_server_error() {
        tracing::error!(status = %response.status(), "static file request failed");
        return internal_error();
    }
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

fn has_parent_segment(path: &str) -> bool {
    path.split('/').any(|segment| segment == "..")
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

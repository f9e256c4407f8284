//! Integration tests for the development server.
//!
//! Requests go through the router in-process; the bundler is a stand-in
//! that copies `src/app.ts` into `dist/app.js`. A source containing
//! `SYNTAX ERROR` is a build error; one containing `CRASH` makes the
//! bundler itself fail.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use fob_dev::config::DevConfig;
use fob_dev::project::Project;
use fob_dev::server::{DevServer, LIVERELOAD_PATH};
use fob_incremental::bundler::MetafileOutput;
use fob_incremental::{
    incremental_build, BundleResult, Bundler, BundlerError, IncrementalBuild, Message, NoopHooks,
    OutputFile, Phase, RELOAD_SCRIPT_PATH,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout, Duration};
use tokio_stream::StreamExt;
use tower::ServiceExt;

struct CopyBundler {
    root: PathBuf,
    out_dir: PathBuf,
    gate: Option<Arc<Semaphore>>,
}

#[async_trait]
impl Bundler for CopyBundler {
    async fn build(&self) -> Result<BundleResult, BundlerError> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|err| BundlerError::Other(err.to_string()))?
                .forget();
        }

        let source = fs::read_to_string(self.root.join("src/app.ts"))?;
        if source.contains("CRASH") {
            return Err(BundlerError::Other("bundler process exited unexpectedly".to_string()));
        }
        let mut result = BundleResult::default();
        if source.contains("SYNTAX ERROR") {
            result
                .errors
                .push(Message::new("Unexpected token").with_location("src/app.ts"));
            return Ok(result);
        }

        let out = self.out_dir.join("app.js");
        result.metafile.outputs.insert(
            out.to_string_lossy().into_owned(),
            MetafileOutput {
                entry_point: Some("src/app.ts".to_string()),
                ..Default::default()
            },
        );
        result.output_files.push(OutputFile::new(out, source));
        Ok(result)
    }

    async fn dispose(&self) -> Result<(), BundlerError> {
        Ok(())
    }

    fn watch_seeds(&self) -> Vec<PathBuf> {
        vec![self.root.join("src/app.ts")]
    }
}

fn write(root: &Path, path: &str, contents: &str) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

struct Fixture {
    _temp: TempDir,
    root: PathBuf,
    session: IncrementalBuild,
    router: Router,
}

async fn start(
    config: impl FnOnce(DevConfig) -> DevConfig,
    gate: Option<Arc<Semaphore>>,
) -> Fixture {
    start_with(config, gate, false).await
}

async fn start_with(
    config: impl FnOnce(DevConfig) -> DevConfig,
    gate: Option<Arc<Semaphore>>,
    watch: bool,
) -> Fixture {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "src/app.ts", "console.log('v1')");
    write(
        temp.path(),
        "index.html",
        r#"<html><body><script type="module" src="/src/app.ts"></script></body></html>"#,
    );
    write(temp.path(), "public/robots.txt", "User-agent: *");

    let config = config(DevConfig {
        entry_points: vec!["src/app.ts".to_string()],
        cwd: Some(temp.path().to_path_buf()),
        ..DevConfig::default_config()
    });
    let project = Project::from_config(config, true).unwrap();
    let bundler = CopyBundler {
        root: project.root.clone(),
        out_dir: project.out_dir.clone(),
        gate,
    };
    let mut options = project.session_options(Arc::new(bundler), Arc::new(NoopHooks));
    if !watch {
        options = options.without_watch();
    }
    let session = incremental_build(options).await;
    let router = DevServer::new(session.handle().clone(), &project).router();

    Fixture {
        root: project.root.clone(),
        _temp: temp,
        session,
        router,
    }
}

async fn get(router: &Router, uri: &str) -> Response {
    router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_serves_outputs_and_rewritten_html() {
    let fixture = start(
        |config| DevConfig {
            html: vec!["index.html".to_string()],
            ..config
        },
        None,
    )
    .await;

    let response = get(&fixture.router, "/app.js").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache"
    );
    assert_eq!(body_text(response).await, "console.log('v1')");

    let html = body_text(get(&fixture.router, "/index.html").await).await;
    assert!(html.contains(r#"src="/app.js""#));
    assert!(html.contains(RELOAD_SCRIPT_PATH));

    fixture.session.dispose().await;
}

#[tokio::test]
async fn test_static_directory_is_second_lookup() {
    let fixture = start(
        |config| DevConfig {
            serve_dir: Some(PathBuf::from("public")),
            ..config
        },
        None,
    )
    .await;

    let response = get(&fixture.router, "/robots.txt").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "User-agent: *");

    let missing = get(&fixture.router, "/missing.txt").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    fixture.session.dispose().await;
}

#[tokio::test]
async fn test_spa_fallback_serves_primary_document() {
    let fixture = start(
        |config| DevConfig {
            html: vec!["index.html".to_string()],
            spa: true,
            ..config
        },
        None,
    )
    .await;

    let response = get(&fixture.router, "/dashboard/settings").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("/app.js"));

    fixture.session.dispose().await;
}

#[tokio::test]
async fn test_parent_segments_are_rejected() {
    let fixture = start(|config| config, None).await;

    let response = get(&fixture.router, "/../src/app.ts").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    fixture.session.dispose().await;
}

#[tokio::test]
async fn test_reload_script_is_served() {
    let fixture = start(|config| config, None).await;

    let response = get(&fixture.router, RELOAD_SCRIPT_PATH).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("application/javascript"));
    assert!(body_text(response).await.contains(LIVERELOAD_PATH));

    fixture.session.dispose().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_requests_wait_for_build_in_flight() {
    let gate = Arc::new(Semaphore::new(1));
    let fixture = start(|config| config, Some(Arc::clone(&gate))).await;
    let handle = fixture.session.handle().clone();

    write(&fixture.root, "src/app.ts", "console.log('v2')");
    let trigger = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.trigger().await })
    };
    let mut state = handle.state();
    timeout(
        Duration::from_secs(5),
        state.wait_for(|state| state.phase == Phase::Building),
    )
    .await
    .unwrap()
    .unwrap();

    let request = {
        let router = fixture.router.clone();
        tokio::spawn(async move { body_text(get(&router, "/app.js").await).await })
    };
    sleep(Duration::from_millis(200)).await;
    assert!(!request.is_finished(), "request must be held during the build");

    gate.add_permits(1);
    trigger.await.unwrap().unwrap();
    let body = timeout(Duration::from_secs(5), request).await.unwrap().unwrap();
    assert_eq!(body, "console.log('v2')");

    fixture.session.dispose().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sse_client_receives_build_events() {
    let fixture = start(|config| config, None).await;
    let handle = fixture.session.handle().clone();

    let response = get(&fixture.router, LIVERELOAD_PATH).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    let mut stream = response.into_body().into_data_stream();

    write(&fixture.root, "src/app.ts", "console.log('v2')");
    handle.trigger().await.unwrap().unwrap();

    let chunk = timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8(chunk.to_vec()).unwrap();
    assert!(text.starts_with("data: "));
    assert!(text.contains(r#""type":"BuildCompleted""#));
    assert!(text.contains("/app.js"));

    fixture.session.dispose().await;
}

#[tokio::test]
async fn test_sse_replays_current_build_failure() {
    let fixture = start(|config| config, None).await;
    let handle = fixture.session.handle().clone();

    write(&fixture.root, "src/app.ts", "SYNTAX ERROR");
    let broken = handle.trigger().await.unwrap().unwrap();
    assert!(broken.has_errors());

    let response = get(&fixture.router, LIVERELOAD_PATH).await;
    let mut stream = response.into_body().into_data_stream();
    let chunk = timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8(chunk.to_vec()).unwrap();
    assert!(text.contains(r#""type":"BuildFailed""#));
    assert!(text.contains("Unexpected token"));

    // The previous output keeps being served.
    let body = body_text(get(&fixture.router, "/app.js").await).await;
    assert_eq!(body, "console.log('v1')");

    fixture.session.dispose().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bundler_crash_keeps_serving_previous_output() {
    let gate = Arc::new(Semaphore::new(1));
    let fixture = start_with(|config| config, Some(Arc::clone(&gate)), true).await;
    let handle = fixture.session.handle().clone();
    let mut events = handle.relay().subscribe();
    // Past the arming delay.
    sleep(Duration::from_millis(400)).await;

    write(&fixture.root, "src/app.ts", "CRASH");
    let mut state = handle.state();
    timeout(
        Duration::from_secs(10),
        state.wait_for(|state| state.phase == Phase::Building),
    )
    .await
    .unwrap()
    .unwrap();

    // Held while the failing build runs, then answered from the last output.
    let during = {
        let router = fixture.router.clone();
        tokio::spawn(async move { body_text(get(&router, "/app.js").await).await })
    };
    sleep(Duration::from_millis(200)).await;
    assert!(!during.is_finished());
    gate.add_permits(1);

    let event = timeout(Duration::from_secs(10), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(event.contains(r#""type":"BuildFailed""#));
    assert!(event.contains("exited unexpectedly"));
    let body = timeout(Duration::from_secs(5), during).await.unwrap().unwrap();
    assert_eq!(body, "console.log('v1')");
    assert_eq!(handle.completed(), 1);

    let after = body_text(get(&fixture.router, "/app.js").await).await;
    assert_eq!(after, "console.log('v1')");

    // The next valid edit produces a new generation.
    sleep(Duration::from_millis(400)).await;
    gate.add_permits(1);
    write(&fixture.root, "src/app.ts", "console.log('v3')");
    timeout(
        Duration::from_secs(10),
        state.wait_for(|state| state.completed == 2 && state.phase == Phase::Idle),
    )
    .await
    .unwrap()
    .unwrap();

    let body = body_text(get(&fixture.router, "/app.js").await).await;
    assert_eq!(body, "console.log('v3')");

    fixture.session.dispose().await;
}

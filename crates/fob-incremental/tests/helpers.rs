//! Shared fixtures for session and watcher tests.

#![allow(dead_code)]

use async_trait::async_trait;
use fob_incremental::bundler::{MetafileInput, MetafileOutput};
use fob_incremental::{
    BundleResult, Bundler, BundlerError, Message, OutputFile, Phase, SessionHandle,
};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

/// Concatenates its inputs into `dist/app.js` (or `dist/app.css` when the
/// first input is a stylesheet). An input containing `SYNTAX ERROR` yields a
/// build error.
pub struct FakeBundler {
    cwd: PathBuf,
    out_dir: PathBuf,
    inputs: Mutex<Vec<String>>,
    calls: AtomicUsize,
    disposed: AtomicBool,
    fail_next: AtomicBool,
    panic_next: AtomicBool,
    gate: Option<Arc<Semaphore>>,
}

impl FakeBundler {
    pub fn new(cwd: &Path, inputs: &[&str]) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            out_dir: cwd.join("dist"),
            inputs: Mutex::new(inputs.iter().map(|i| i.to_string()).collect()),
            calls: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
            fail_next: AtomicBool::new(false),
            panic_next: AtomicBool::new(false),
            gate: None,
        }
    }

    /// Every build waits for a permit from the returned semaphore.
    /// `permits` builds may run before the test has to add more.
    pub fn gated(mut self, permits: usize) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(permits));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn set_inputs(&self, inputs: &[&str]) {
        *self.inputs.lock() = inputs.iter().map(|i| i.to_string()).collect();
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Polls until `n` builds have started.
    pub async fn wait_for_calls(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while self.calls() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("bundler was not called in time");
    }
}

#[async_trait]
impl Bundler for FakeBundler {
    async fn build(&self) -> Result<BundleResult, BundlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|err| BundlerError::Other(err.to_string()))?
                .forget();
        }
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("bundler blew up");
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(BundlerError::Other("bundler crashed".to_string()));
        }

        let inputs = self.inputs.lock().clone();
        let mut result = BundleResult::default();
        let mut bundle = String::new();
        for input in &inputs {
            let source = fs::read_to_string(self.cwd.join(input)).unwrap_or_default();
            if source.contains("SYNTAX ERROR") {
                result
                    .errors
                    .push(Message::new("Unexpected token").with_location(input.clone()));
            }
            bundle.push_str(&source);
            bundle.push('\n');
            result
                .metafile
                .inputs
                .insert(input.clone(), MetafileInput::default());
        }

        let name = match inputs.first() {
            Some(first) if first.ends_with(".css") => "app.css",
            _ => "app.js",
        };
        let out = self.out_dir.join(name);
        result.metafile.outputs.insert(
            out.to_string_lossy().into_owned(),
            MetafileOutput {
                entry_point: inputs.first().cloned(),
                ..Default::default()
            },
        );
        result.output_files.push(OutputFile::new(out, bundle));
        Ok(result)
    }

    async fn dispose(&self) -> Result<(), BundlerError> {
        self.disposed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn watch_seeds(&self) -> Vec<PathBuf> {
        self.inputs
            .lock()
            .first()
            .map(|first| vec![self.cwd.join(first)])
            .unwrap_or_default()
    }
}

/// Creates a project directory containing `files`.
pub fn project(files: &[(&str, &str)]) -> TempDir {
    let temp = TempDir::new().unwrap();
    for (path, contents) in files {
        write(temp.path(), path, contents);
    }
    temp
}

pub fn write(root: &Path, path: &str, contents: &str) {
    let path = root.join(path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// Waits until at least `n` generations are installed and no build runs.
pub async fn wait_for_completed(handle: &SessionHandle, n: u64) {
    let mut state = handle.state();
    tokio::time::timeout(
        Duration::from_secs(10),
        state.wait_for(|state| state.completed >= n && state.phase != Phase::Building),
    )
    .await
    .expect("generation did not complete in time")
    .expect("session ended");
}

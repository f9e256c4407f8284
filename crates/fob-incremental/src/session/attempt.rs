//! One build attempt and its side effects.

use super::{BuildGeneration, BuildSettings, IncrementalOptions};
use crate::bundler::Bundler;
use crate::error::OutputError;
use crate::hooks::{BuildAttempt, BuildHooks};
use crate::html::TemplateWriter;
use crate::relay::{LiveReloadRelay, ReloadEvent};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

pub(crate) enum AttemptOutcome {
    /// A generation was installed, possibly carrying build errors.
    Completed(Arc<BuildGeneration>),
    /// The bundler invocation itself failed.
    Failed,
}

/// Everything an attempt task needs; shared between attempts.
pub(crate) struct BuildContext {
    pub(crate) bundler: Arc<dyn Bundler>,
    pub(crate) settings: BuildSettings,
    pub(crate) hooks: Arc<dyn BuildHooks>,
    pub(crate) templates: Option<Arc<dyn TemplateWriter>>,
    pub(crate) relay: Arc<LiveReloadRelay>,
    /// BLAKE3 hash of the last contents written per path, limited to the
    /// files of the latest installed generation.
    written: Mutex<HashMap<PathBuf, blake3::Hash>>,
}

impl BuildContext {
    pub(crate) fn new(options: IncrementalOptions) -> Self {
        Self {
            bundler: options.bundler,
            settings: options.settings,
            hooks: options.hooks,
            templates: options.templates,
            relay: options.relay,
            written: Mutex::new(HashMap::default()),
        }
    }

    /// Runs the bundler and applies the generation's side effects in order:
    /// HTML documents, disk writes, build-end hook, client notification.
    pub(crate) async fn run(&self, number: u64) -> AttemptOutcome {
        self.hooks.on_build_start(number);
        let started = Instant::now();

        let result = match self.bundler.build().await {
            Ok(result) => result,
            Err(error) => {
                tracing::error!(generation = number, "bundler failed: {error}");
                self.build_end(&BuildAttempt::Failed {
                    number,
                    error: &error,
                })
                .await;
                self.relay.broadcast(&ReloadEvent::BuildFailed {
                    generation: number,
                    errors: vec![error.to_string()],
                });
                return AttemptOutcome::Failed;
            }
        };

        let generation = Arc::new(BuildGeneration::new(number, result, started.elapsed()));
        for warning in &generation.warnings {
            tracing::warn!(generation = number, "{warning}");
        }

        let event = if generation.has_errors() {
            for error in &generation.errors {
                tracing::error!(generation = number, "{error}");
            }
            ReloadEvent::BuildFailed {
                generation: number,
                errors: generation.errors.iter().map(ToString::to_string).collect(),
            }
        } else {
            match self.apply(&generation).await {
                Ok(changed) => {
                    tracing::info!(
                        generation = number,
                        duration_ms = generation.duration.as_millis() as u64,
                        outputs = generation.output_files.len(),
                        changed = changed.len(),
                        "build completed"
                    );
                    ReloadEvent::BuildCompleted {
                        generation: number,
                        duration_ms: generation.duration.as_millis() as u64,
                        changed,
                        warnings: generation.warnings.len(),
                    }
                }
                Err(error) => {
                    tracing::error!(generation = number, "{error}");
                    ReloadEvent::BuildFailed {
                        generation: number,
                        errors: vec![error.to_string()],
                    }
                }
            }
        };

        self.build_end(&BuildAttempt::Completed(&generation)).await;
        let delivered = self.relay.broadcast(&event);
        tracing::debug!(generation = number, clients = delivered, "reload event sent");

        AttemptOutcome::Completed(generation)
    }

    async fn build_end(&self, attempt: &BuildAttempt<'_>) {
        if let Err(err) = self.hooks.on_build_end(attempt, &self.settings).await {
            tracing::warn!(generation = attempt.number(), "build-end hook failed: {err:#}");
        }
    }

    /// Renders HTML documents and writes whatever changed or went missing.
    /// Returns the URL paths of changed files.
    async fn apply(&self, generation: &BuildGeneration) -> Result<Vec<String>, OutputError> {
        let documents = match &self.templates {
            Some(templates) => templates.render(generation)?,
            None => Vec::new(),
        };

        let files = generation
            .output_files
            .iter()
            .map(|file| (file.path.as_path(), file.contents.as_slice()))
            .chain(
                documents
                    .iter()
                    .map(|doc| (doc.output_path.as_path(), doc.contents.as_bytes())),
            );

        let mut changed = Vec::new();
        let mut current = HashSet::default();
        for (path, contents) in files {
            current.insert(path.to_path_buf());
            if self.write_if_changed(path, contents).await? {
                changed.push(url_path(&self.settings.out_dir, path));
            }
        }
        self.written.lock().retain(|path, _| current.contains(path));
        Ok(changed)
    }

    async fn write_if_changed(&self, path: &Path, contents: &[u8]) -> Result<bool, OutputError> {
        let hash = blake3::hash(contents);
        let unchanged = self.written.lock().get(path) == Some(&hash);
        // An output removed behind our back is written again.
        let present = !self.settings.write || tokio::fs::try_exists(path).await.unwrap_or(false);
        if unchanged && present {
            return Ok(false);
        }

        if self.settings.write {
            let write_err = |source| OutputError::Write {
                path: path.to_path_buf(),
                source,
            };
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
            }
            tokio::fs::write(path, contents).await.map_err(write_err)?;
        }

        self.written.lock().insert(path.to_path_buf(), hash);
        Ok(true)
    }
}

/// URL path under which `path` is served from `out_dir`.
fn url_path(out_dir: &Path, path: &Path) -> String {
    match path.strip_prefix(out_dir) {
        Ok(relative) => {
            let segments: Vec<_> = relative
                .components()
                .filter_map(|component| match component {
                    Component::Normal(name) => Some(name.to_string_lossy()),
                    _ => None,
                })
                .collect();
            format!("/{}", segments.join("/"))
        }
        Err(_) => path.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_path() {
        let out = Path::new("/app/dist");
        assert_eq!(url_path(out, Path::new("/app/dist/app.js")), "/app.js");
        assert_eq!(
            url_path(out, Path::new("/app/dist/chunks/a.css")),
            "/chunks/a.css"
        );
        assert_eq!(url_path(out, Path::new("/elsewhere/x.js")), "/elsewhere/x.js");
    }
}

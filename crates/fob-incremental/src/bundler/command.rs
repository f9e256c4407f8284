//! Process-backed bundler.
//!
//! Runs an esbuild-compatible CLI into a private staging directory, then reads
//! the metafile and output files back. Outputs are re-rooted to the real
//! output directory; writing them is left to the session so unchanged files
//! are never touched.

use super::{BundleResult, Bundler, Message, Metafile, OutputFile};
use crate::error::BundlerError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;
use walkdir::WalkDir;

/// Bundler executable used when none is configured.
pub const DEFAULT_BUNDLER: &str = "esbuild";

#[derive(Debug, Clone)]
pub struct CommandBundlerConfig {
    /// Executable to run.
    pub program: String,
    /// Extra arguments appended after the generated ones.
    pub args: Vec<String>,
    /// Entry points, relative to `cwd` or absolute.
    pub entry_points: Vec<PathBuf>,
    /// Working directory of the bundler process.
    pub cwd: PathBuf,
    /// Directory the outputs are destined for.
    pub out_dir: PathBuf,
}

impl CommandBundlerConfig {
    pub fn new(cwd: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: DEFAULT_BUNDLER.to_string(),
            args: Vec::new(),
            entry_points: Vec::new(),
            cwd: cwd.into(),
            out_dir: out_dir.into(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_entry_points<I, P>(mut self, entry_points: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.entry_points = entry_points.into_iter().map(Into::into).collect();
        self
    }
}

pub struct CommandBundler {
    config: CommandBundlerConfig,
    staging: Mutex<Option<TempDir>>,
}

impl CommandBundler {
    pub fn new(config: CommandBundlerConfig) -> Self {
        Self {
            config,
            staging: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CommandBundlerConfig {
        &self.config
    }

    fn staging_dir(&self) -> io::Result<PathBuf> {
        let mut staging = self.staging.lock();
        if let Some(dir) = staging.as_ref() {
            return Ok(dir.path().to_path_buf());
        }
        let dir = tempfile::Builder::new().prefix("fob-dev-").tempdir()?;
        let path = dir.path().to_path_buf();
        *staging = Some(dir);
        Ok(path)
    }

    fn command_args(&self, out: &Path, metafile: &Path) -> Vec<String> {
        let mut args = vec!["--bundle".to_string()];
        args.extend(
            self.config
                .entry_points
                .iter()
                .map(|entry| entry.to_string_lossy().into_owned()),
        );
        args.push(format!("--outdir={}", out.display()));
        args.push(format!("--metafile={}", metafile.display()));
        args.extend(self.config.args.iter().cloned());
        args
    }
}

#[async_trait]
impl Bundler for CommandBundler {
    async fn build(&self) -> Result<BundleResult, BundlerError> {
        let staging = self.staging_dir()?;
        let out = staging.join("out");
        let metafile_path = staging.join("meta.json");

        // Leftovers from the previous generation must not leak into this one.
        if tokio::fs::try_exists(&out).await? {
            tokio::fs::remove_dir_all(&out).await?;
        }
        if tokio::fs::try_exists(&metafile_path).await? {
            tokio::fs::remove_file(&metafile_path).await?;
        }

        let args = self.command_args(&out, &metafile_path);
        tracing::debug!(program = %self.config.program, ?args, "running bundler");

        let output = Command::new(&self.config.program)
            .args(&args)
            .current_dir(&self.config.cwd)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| BundlerError::Spawn {
                command: self.config.program.clone(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let (mut errors, warnings) = parse_diagnostics(&stderr);

        if !output.status.success() {
            if errors.is_empty() {
                let detail = stderr.trim();
                errors.push(Message::new(if detail.is_empty() {
                    format!("{} exited with {}", self.config.program, output.status)
                } else {
                    detail.to_string()
                }));
            }
            return Ok(BundleResult {
                errors,
                warnings,
                ..Default::default()
            });
        }

        let bytes = tokio::fs::read(&metafile_path).await?;
        let mut metafile: Metafile =
            serde_json::from_slice(&bytes).map_err(|source| BundlerError::Metafile {
                path: metafile_path.clone(),
                source,
            })?;

        let cwd = canonical(&self.config.cwd);
        let out = canonical(&out);
        let out_dir = self.config.out_dir.clone();
        metafile.reroot_outputs(&cwd, &out, &out_dir);

        let output_files = tokio::task::spawn_blocking(move || collect_outputs(&out, &out_dir))
            .await
            .map_err(|err| BundlerError::Aborted(err.to_string()))??;

        Ok(BundleResult {
            errors,
            warnings,
            metafile,
            output_files,
        })
    }

    async fn dispose(&self) -> Result<(), BundlerError> {
        let staging = self.staging.lock().take();
        if let Some(dir) = staging {
            dir.close()?;
        }
        Ok(())
    }

    fn watch_seeds(&self) -> Vec<PathBuf> {
        self.config
            .entry_points
            .iter()
            .map(|entry| super::resolve_path(&self.config.cwd, &entry.to_string_lossy()))
            .collect()
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn collect_outputs(staged: &Path, out_dir: &Path) -> io::Result<Vec<OutputFile>> {
    let mut files = Vec::new();
    if !staged.exists() {
        return Ok(files);
    }
    for entry in WalkDir::new(staged).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(staged) else {
            continue;
        };
        let contents = std::fs::read(entry.path())?;
        files.push(OutputFile::new(out_dir.join(relative), contents));
    }
    Ok(files)
}

#[derive(Clone, Copy)]
enum Severity {
    Error,
    Warning,
}

/// Extracts `[ERROR]` / `[WARNING]` diagnostics from bundler stderr.
fn parse_diagnostics(stderr: &str) -> (Vec<Message>, Vec<Message>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut current: Option<(Severity, Message)> = None;

    let mut flush = |entry: Option<(Severity, Message)>| match entry {
        Some((Severity::Error, message)) => errors.push(message),
        Some((Severity::Warning, message)) => warnings.push(message),
        None => {}
    };

    for line in stderr.lines() {
        let trimmed = line.trim();
        let header = trimmed
            .split_once("[ERROR]")
            .map(|(_, text)| (Severity::Error, text))
            .or_else(|| {
                trimmed
                    .split_once("[WARNING]")
                    .map(|(_, text)| (Severity::Warning, text))
            });

        if let Some((severity, text)) = header {
            flush(current.take());
            current = Some((severity, Message::new(text.trim())));
        } else if let Some((_, message)) = current.as_mut() {
            if message.location.is_none() && is_location(trimmed) {
                message.location = Some(trimmed.trim_end_matches(':').to_string());
            }
        }
    }
    flush(current.take());

    (errors, warnings)
}

/// `path:line:column:` as printed under a diagnostic header.
fn is_location(line: &str) -> bool {
    let Some(rest) = line.strip_suffix(':') else {
        return false;
    };
    let mut parts = rest.rsplitn(3, ':');
    let column = parts.next().unwrap_or_default();
    let row = parts.next().unwrap_or_default();
    let file = parts.next().unwrap_or_default();
    !file.is_empty()
        && !column.is_empty()
        && column.chars().all(|c| c.is_ascii_digit())
        && !row.is_empty()
        && row.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ESBUILD_STDERR: &str = "\
✘ [ERROR] Could not resolve \"./missing\"

    src/app.ts:1:7:
      1 │ import \"./missing\";
        ╵        ~~~~~~~~~~~

▲ [WARNING] Duplicate key \"a\" in object literal [duplicate-object-key]

    src/util.ts:3:2:
      3 │   a: 2,
        ╵   ^

1 warning and 1 error
";

    #[test]
    fn test_parse_diagnostics() {
        let (errors, warnings) = parse_diagnostics(ESBUILD_STDERR);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].text, "Could not resolve \"./missing\"");
        assert_eq!(errors[0].location.as_deref(), Some("src/app.ts:1:7"));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].location.as_deref(), Some("src/util.ts:3:2"));
    }

    #[test]
    fn test_is_location() {
        assert!(is_location("src/app.ts:1:7:"));
        assert!(!is_location("src/app.ts:1:7"));
        assert!(!is_location("note: something:"));
    }

    #[test]
    fn test_command_args_order() {
        let bundler = CommandBundler::new(
            CommandBundlerConfig::new("/project", "/project/dist")
                .with_entry_points(["src/app.ts"])
                .with_args(["--sourcemap"]),
        );
        let args = bundler.command_args(Path::new("/stage/out"), Path::new("/stage/meta.json"));
        assert_eq!(
            args,
            vec![
                "--bundle",
                "src/app.ts",
                "--outdir=/stage/out",
                "--metafile=/stage/meta.json",
                "--sourcemap",
            ]
        );
    }

    #[test]
    fn test_watch_seeds_are_absolute() {
        let bundler = CommandBundler::new(
            CommandBundlerConfig::new("/project", "/project/dist")
                .with_entry_points(["./src/app.ts", "/abs/main.ts"]),
        );
        assert_eq!(
            bundler.watch_seeds(),
            vec![
                PathBuf::from("/project/src/app.ts"),
                PathBuf::from("/abs/main.ts")
            ]
        );
    }

    #[tokio::test]
    async fn test_spawn_failure_is_bundler_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let bundler = CommandBundler::new(
            CommandBundlerConfig::new(dir.path(), dir.path().join("dist"))
                .with_program("fob-dev-definitely-not-a-bundler"),
        );
        let err = bundler.build().await.unwrap_err();
        assert!(matches!(err, BundlerError::Spawn { .. }));
        bundler.dispose().await.unwrap();
    }
}

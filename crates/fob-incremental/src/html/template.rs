//! HTML template parsing and rendering.

use super::{HtmlDocument, TemplateWriter};
use crate::cache::{CacheStats, Transform, TransformCache, Transformed};
use crate::error::TemplateError;
use crate::session::BuildGeneration;
use path_clean::PathClean;
use regex::Regex;
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock};

/// URL path of the live-reload client script.
pub const RELOAD_SCRIPT_PATH: &str = "/__fob_reload__.js";

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<(?:script|link)\b[^>]*?\b(?:src|href)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("valid reference pattern")
});

/// A parsed HTML source: the text plus the byte ranges of every
/// `<script src>` / `<link href>` attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlTemplate {
    source: String,
    references: Vec<Range<usize>>,
}

impl HtmlTemplate {
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        let references = REFERENCE
            .captures_iter(&source)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|value| value.range())
            .collect();
        Self { source, references }
    }

    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.references
            .iter()
            .map(|range| &self.source[range.clone()])
    }

    /// Rewrites every reference `resolve` maps to a URL and injects the
    /// reload script, if any, before `</body>`.
    pub fn render<F>(&self, resolve: F, reload_script: Option<&str>) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut html = String::with_capacity(self.source.len() + 64);
        let mut cursor = 0;
        for range in &self.references {
            let value = &self.source[range.clone()];
            if let Some(url) = resolve(value) {
                html.push_str(&self.source[cursor..range.start]);
                html.push_str(&url);
                cursor = range.end;
            }
        }
        html.push_str(&self.source[cursor..]);

        match reload_script {
            Some(src) => inject_script(&html, src),
            None => html,
        }
    }
}

/// Adds a script tag before the closing `</body>`, or at the end.
fn inject_script(html: &str, src: &str) -> String {
    let tag = format!(r#"<script src="{src}"></script>"#);
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(pos) => {
            let mut result = String::with_capacity(html.len() + tag.len() + 4);
            result.push_str(&html[..pos]);
            result.push_str("  ");
            result.push_str(&tag);
            result.push('\n');
            result.push_str(&html[pos..]);
            result
        }
        None => format!("{html}\n{tag}\n"),
    }
}

fn is_external(reference: &str) -> bool {
    reference.is_empty()
        || reference.contains("://")
        || reference.starts_with("//")
        || reference.starts_with("data:")
        || reference.starts_with('#')
}

/// Reads and parses an HTML file.
#[derive(Debug, Default)]
pub struct TemplateParser;

impl Transform for TemplateParser {
    type Artifact = Arc<HtmlTemplate>;
    type Error = TemplateError;

    fn transform(&self, root: &Path) -> Result<Transformed<Self::Artifact>, Self::Error> {
        let source = std::fs::read_to_string(root).map_err(|source| TemplateError::Read {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Transformed::new(Arc::new(HtmlTemplate::parse(source))))
    }
}

/// Renders HTML entry files against each generation's outputs.
///
/// Each source is parsed once and re-parsed only after it changes on disk.
/// Documents are written to the output directory under the source's file
/// name.
pub struct HtmlTemplateWriter {
    cwd: PathBuf,
    out_dir: PathBuf,
    entries: Vec<PathBuf>,
    reload_script: Option<String>,
    cache: TransformCache<PathBuf, TemplateParser>,
}

impl HtmlTemplateWriter {
    pub fn new<I, P>(cwd: impl Into<PathBuf>, out_dir: impl Into<PathBuf>, entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let cwd = cwd.into();
        let entries = entries
            .into_iter()
            .map(|entry| cwd.join(entry.as_ref()).clean())
            .collect();
        Self {
            out_dir: out_dir.into(),
            cwd,
            entries,
            reload_script: None,
            cache: TransformCache::new(TemplateParser),
        }
    }

    /// Injects `<script src="{src}">` into every document.
    pub fn with_reload_script(mut self, src: impl Into<String>) -> Self {
        self.reload_script = Some(src.into());
        self
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn output_path(&self, source: &Path) -> PathBuf {
        let name = source
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("index.html"));
        self.out_dir.join(name)
    }

    /// Output of the first entry; what an SPA fallback serves.
    pub fn primary_output(&self) -> Option<PathBuf> {
        self.entries.first().map(|entry| self.output_path(entry))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn resolve(
        &self,
        base: &Path,
        reference: &str,
        entry_outputs: &BTreeMap<PathBuf, PathBuf>,
    ) -> Option<String> {
        if is_external(reference) {
            return None;
        }
        let path = reference.split(['?', '#']).next().unwrap_or(reference);
        let target = match path.strip_prefix('/') {
            Some(rooted) => self.cwd.join(rooted),
            None => base.join(path),
        }
        .clean();

        let output = entry_outputs.get(&target)?;
        let relative = output.strip_prefix(&self.out_dir).ok()?;
        let segments: Vec<_> = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(name) => Some(name.to_string_lossy()),
                _ => None,
            })
            .collect();
        Some(format!("/{}", segments.join("/")))
    }
}

impl TemplateWriter for HtmlTemplateWriter {
    fn sources(&self) -> Vec<PathBuf> {
        self.entries.clone()
    }

    fn render(&self, generation: &BuildGeneration) -> Result<Vec<HtmlDocument>, TemplateError> {
        let entry_outputs = generation.metafile.entry_outputs(&self.cwd);

        self.entries
            .iter()
            .map(|source| {
                let template = self.cache.get_or_compute(&self.cwd, source)?;
                let base = source.parent().unwrap_or(&self.cwd);
                let contents = template.render(
                    |reference| self.resolve(base, reference, &entry_outputs),
                    self.reload_script.as_deref(),
                );
                Ok(HtmlDocument {
                    source: source.clone(),
                    output_path: self.output_path(source),
                    contents,
                })
            })
            .collect()
    }
}

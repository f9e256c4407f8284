//! HTML entry documents.
//!
//! A [`TemplateWriter`] turns source HTML files into per-generation
//! documents whose script and stylesheet references point at the current
//! bundle outputs.

mod template;

pub use template::{HtmlTemplate, HtmlTemplateWriter, RELOAD_SCRIPT_PATH};

use crate::error::TemplateError;
use crate::session::BuildGeneration;
use std::path::PathBuf;

/// A rendered HTML document, owned by the generation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlDocument {
    pub source: PathBuf,
    pub output_path: PathBuf,
    pub contents: String,
}

pub trait TemplateWriter: Send + Sync + 'static {
    /// Source files to watch.
    fn sources(&self) -> Vec<PathBuf>;

    /// Renders every document for `generation`.
    fn render(&self, generation: &BuildGeneration) -> Result<Vec<HtmlDocument>, TemplateError>;
}

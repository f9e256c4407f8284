//! A loaded configuration resolved against the project root.

use crate::config::DevConfig;
use crate::error::{CliError, Result, ResultExt};
use fob_incremental::{
    BuildHooks, Bundler, CommandBundler, CommandBundlerConfig, HtmlTemplateWriter,
    IncrementalOptions, RELOAD_SCRIPT_PATH,
};
use path_clean::PathClean;
use std::path::PathBuf;
use std::sync::Arc;

/// Absolute paths and collaborators for one project.
pub struct Project {
    /// Canonical project root; relative metafile paths resolve against it.
    pub root: PathBuf,
    pub out_dir: PathBuf,
    pub serve_dir: Option<PathBuf>,
    templates: Option<Arc<HtmlTemplateWriter>>,
    config: DevConfig,
}

impl Project {
    /// Resolves `config` against its root. With `live_reload`, rendered HTML
    /// documents load the reload client.
    pub fn from_config(config: DevConfig, live_reload: bool) -> Result<Self> {
        let root = config.cwd.clone().unwrap_or_else(|| PathBuf::from("."));
        let root = std::fs::canonicalize(&root).with_path(&root)?;
        let out_dir = root.join(&config.out_dir).clean();

        let serve_dir = config.serve_dir.as_ref().map(|dir| root.join(dir).clean());
        if let Some(dir) = &serve_dir {
            if !dir.is_dir() {
                return Err(CliError::FileNotFound(dir.clone()));
            }
        }

        for html in &config.html {
            let path = root.join(html);
            if !path.is_file() {
                return Err(CliError::FileNotFound(path));
            }
        }

        let templates = (!config.html.is_empty()).then(|| {
            let writer = HtmlTemplateWriter::new(&root, &out_dir, &config.html);
            let writer = if live_reload {
                writer.with_reload_script(RELOAD_SCRIPT_PATH)
            } else {
                writer
            };
            Arc::new(writer)
        });

        Ok(Self {
            root,
            out_dir,
            serve_dir,
            templates,
            config,
        })
    }

    pub fn config(&self) -> &DevConfig {
        &self.config
    }

    pub fn templates(&self) -> Option<&Arc<HtmlTemplateWriter>> {
        self.templates.as_ref()
    }

    /// The bundler process described by the configuration.
    pub fn bundler(&self) -> CommandBundler {
        CommandBundler::new(
            CommandBundlerConfig::new(self.root.clone(), self.out_dir.clone())
                .with_program(self.config.bundler.command.clone())
                .with_args(self.config.bundler.args.iter().cloned())
                .with_entry_points(self.config.entry_points.iter().map(PathBuf::from)),
        )
    }

    /// The document an SPA fallback serves, when SPA mode is on.
    pub fn spa_index(&self) -> Option<PathBuf> {
        if !self.config.spa {
            return None;
        }
        self.templates.as_ref().and_then(|t| t.primary_output())
    }

    pub fn session_options(
        &self,
        bundler: Arc<dyn Bundler>,
        hooks: Arc<dyn BuildHooks>,
    ) -> IncrementalOptions {
        let options = IncrementalOptions::new(bundler, self.root.clone(), self.out_dir.clone())
            .with_hooks(hooks)
            .with_write(self.config.write)
            .with_watch(self.config.watch_options());
        match &self.templates {
            Some(templates) => options.with_templates(templates.clone()),
            None => options,
        }
    }
}

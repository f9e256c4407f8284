use crate::config::DevConfig;
use crate::error::{ConfigError, Result};
use fob_incremental::MIN_DEBOUNCE;
use path_clean::PathClean;
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;

impl DevConfig {
    /// Validate configuration for logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.entry_points.is_empty() {
            return Err(ConfigError::MissingField {
                field: "entryPoints".to_string(),
                hint: "Pass entry points on the command line or add \"entryPoints\" to fob.dev.json"
                    .to_string(),
            }
            .into());
        }

        if self.bundler.command.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "bundler.command".to_string(),
                value: format!("{:?}", self.bundler.command),
                hint: "Name an esbuild-compatible executable".to_string(),
            }
            .into());
        }

        let min_debounce = MIN_DEBOUNCE.as_millis() as u64;
        if self.debounce_ms < min_debounce {
            return Err(ConfigError::InvalidValue {
                field: "debounceMs".to_string(),
                value: self.debounce_ms.to_string(),
                hint: format!("Use at least {} milliseconds", min_debounce),
            }
            .into());
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pollIntervalMs".to_string(),
                value: "0".to_string(),
                hint: "Use a positive interval in milliseconds".to_string(),
            }
            .into());
        }

        if self.host.parse::<IpAddr>().is_err() {
            return Err(ConfigError::InvalidValue {
                field: "host".to_string(),
                value: self.host.clone(),
                hint: "Use an IP address such as 127.0.0.1 or 0.0.0.0".to_string(),
            }
            .into());
        }

        self.validate_html()?;

        if self.spa && self.html.is_empty() {
            return Err(ConfigError::MissingField {
                field: "html".to_string(),
                hint: "SPA mode serves the first HTML entry for unknown paths".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Additional checks for serving: outputs must be on disk.
    pub fn validate_for_dev(&self) -> Result<()> {
        self.validate()?;
        if !self.write {
            return Err(ConfigError::InvalidValue {
                field: "write".to_string(),
                value: "false".to_string(),
                hint: "The dev server serves outputs from disk".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn validate_html(&self) -> Result<()> {
        let mut names = HashSet::new();
        for html in &self.html {
            let source = Path::new(html);
            let Some(name) = source.file_name() else {
                return Err(ConfigError::InvalidValue {
                    field: "html".to_string(),
                    value: html.clone(),
                    hint: "HTML entries must name a file".to_string(),
                }
                .into());
            };
            if !names.insert(name.to_os_string()) {
                return Err(ConfigError::InvalidValue {
                    field: "html".to_string(),
                    value: html.clone(),
                    hint: "Two HTML entries would be written to the same output file".to_string(),
                }
                .into());
            }
            if self.out_dir.join(name).clean() == source.clean() {
                return Err(ConfigError::InvalidValue {
                    field: "html".to_string(),
                    value: html.clone(),
                    hint: "The rendered document would overwrite its source; move it out of outDir"
                        .to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

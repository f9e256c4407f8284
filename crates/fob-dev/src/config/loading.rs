use crate::cli::{BuildArgs, DevArgs, ProjectArgs};
use crate::config::DevConfig;
use crate::error::{ConfigError, Result};
use figment::{
    providers::{Env, Format as _, Json, Serialized},
    Figment,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Looked up in the project root when `--config` is not given.
pub const CONFIG_FILE_NAME: &str = "fob.dev.json";

/// `FOB_DEV_OUT_DIR=out` sets `outDir`; `FOB_DEV_BUNDLER__COMMAND` sets
/// `bundler.command`.
pub const ENV_PREFIX: &str = "FOB_DEV_";

/// Values given on the command line. Unset fields leave lower-priority
/// sources untouched.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_points: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serve_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spa: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundler: Option<BundlerOverride>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BundlerOverride {
    pub command: String,
}

impl ConfigOverrides {
    pub fn from_project(args: &ProjectArgs) -> Self {
        Self {
            entry_points: non_empty(&args.entry),
            html: non_empty(&args.html),
            out_dir: args.out_dir.clone(),
            bundler: args.bundler.clone().map(|command| BundlerOverride { command }),
            cwd: args.cwd.clone(),
            ..Self::default()
        }
    }

    pub fn from_build(args: &BuildArgs) -> Self {
        Self {
            write: args.no_write.then_some(false),
            ..Self::from_project(&args.project)
        }
    }

    pub fn from_dev(args: &DevArgs) -> Self {
        Self {
            serve_dir: args.serve_dir.clone(),
            spa: args.spa.then_some(true),
            port: args.port,
            host: args.host.clone(),
            ..Self::from_project(&args.project)
        }
    }
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    (!values.is_empty()).then(|| values.to_vec())
}

impl DevConfig {
    /// Load configuration from every source.
    ///
    /// Without `config_path`, `fob.dev.json` is read from the project root
    /// if it exists. An explicit path must exist.
    pub fn load(overrides: &ConfigOverrides, config_path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default_config()));

        let config_file = match config_path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::NotFound(path.to_path_buf()).into());
            }
            Some(path) => Some(path.to_path_buf()),
            None => {
                let root = overrides.cwd.clone().unwrap_or_else(|| PathBuf::from("."));
                let default_path = root.join(CONFIG_FILE_NAME);
                default_path.exists().then_some(default_path)
            }
        };
        if let Some(path) = config_file {
            tracing::debug!(path = %path.display(), "loading config file");
            figment = figment.merge(Json::file(path));
        }

        figment = figment.merge(
            Env::prefixed(ENV_PREFIX)
                .map(|key| env_key(key.as_str()).into())
                .lowercase(false),
        );
        figment = figment.merge(Serialized::defaults(overrides));

        figment
            .extract()
            .map_err(|e| ConfigError::from(e).into())
    }
}

/// `OUT_DIR` -> `outDir`, `BUNDLER__ARGS` -> `bundler.args`.
fn env_key(key: &str) -> String {
    key.split("__")
        .map(camel_case)
        .collect::<Vec<_>>()
        .join(".")
}

fn camel_case(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for (index, word) in segment.split('_').filter(|w| !w.is_empty()).enumerate() {
        let word = word.to_ascii_lowercase();
        if index == 0 {
            out.push_str(&word);
            continue;
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

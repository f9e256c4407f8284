//! Bundler metafile model.
//!
//! Field names follow the metafile format shared by esbuild-compatible
//! bundlers, so a metafile written by the bundler can be deserialized as-is.

use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Dependency manifest of one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metafile {
    #[serde(default)]
    pub inputs: BTreeMap<String, MetafileInput>,
    #[serde(default)]
    pub outputs: BTreeMap<String, MetafileOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetafileInput {
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub imports: Vec<InputImport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputImport {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub external: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetafileOutput {
    #[serde(default)]
    pub bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    #[serde(default)]
    pub inputs: BTreeMap<String, OutputInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputInput {
    #[serde(default)]
    pub bytes_in_output: u64,
}

/// Splits an input key into its resolution-scheme tag and path.
///
/// `ns:path` yields `(Some("ns"), "path")`. A single letter followed by a
/// colon is a Windows drive, not a tag.
pub fn split_input_key(key: &str) -> (Option<&str>, &str) {
    match key.split_once(':') {
        Some((tag, rest))
            if tag.len() > 1 && !tag.contains(['/', '\\']) && !tag.contains(char::is_whitespace) =>
        {
            (Some(tag), rest)
        }
        _ => (None, key),
    }
}

/// Resolves a metafile path against `cwd` and lexically cleans it.
pub fn resolve_path(cwd: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.clean()
    } else {
        cwd.join(path).clean()
    }
}

impl Metafile {
    /// Concrete filesystem paths of every input, resolved against `cwd`.
    ///
    /// Keys carrying a non-`file` scheme tag are kept only when the path
    /// exists on disk; everything else is a virtual module.
    pub fn input_paths(&self, cwd: &Path) -> Vec<PathBuf> {
        self.inputs
            .keys()
            .filter_map(|key| input_path(cwd, key))
            .collect()
    }

    /// Maps each entry point (absolute) to the output produced for it.
    pub fn entry_outputs(&self, cwd: &Path) -> BTreeMap<PathBuf, PathBuf> {
        self.outputs
            .iter()
            .filter_map(|(output, meta)| {
                let entry = meta.entry_point.as_deref()?;
                let (_, entry) = split_input_key(entry);
                Some((resolve_path(cwd, entry), resolve_path(cwd, output)))
            })
            .collect()
    }

    /// Moves output keys that live under `from` to the same relative location
    /// under `to`. Keys are stored as absolute paths afterwards.
    pub fn reroot_outputs(&mut self, cwd: &Path, from: &Path, to: &Path) {
        let outputs = std::mem::take(&mut self.outputs);
        self.outputs = outputs
            .into_iter()
            .map(|(key, output)| {
                let resolved = resolve_path(cwd, &key);
                let rerooted = match resolved.strip_prefix(from) {
                    Ok(relative) => to.join(relative),
                    Err(_) => resolved,
                };
                (rerooted.to_string_lossy().into_owned(), output)
            })
            .collect();
    }
}

fn input_path(cwd: &Path, key: &str) -> Option<PathBuf> {
    if key.starts_with('<') {
        return None;
    }
    let (tag, path) = split_input_key(key);
    let resolved = resolve_path(cwd, path);
    match tag {
        Some(tag) if tag != "file" && !resolved.exists() => None,
        _ => Some(resolved),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_input_key() {
        assert_eq!(split_input_key("src/app.ts"), (None, "src/app.ts"));
        assert_eq!(split_input_key("file:src/app.ts"), (Some("file"), "src/app.ts"));
        assert_eq!(split_input_key("virtual:env"), (Some("virtual"), "env"));
        assert_eq!(split_input_key("C:\\src\\app.ts"), (None, "C:\\src\\app.ts"));
        assert_eq!(split_input_key("src/a:b.ts"), (None, "src/a:b.ts"));
    }

    #[test]
    fn test_deserializes_bundler_metafile() {
        let json = r#"{
            "inputs": {
                "src/app.ts": { "bytes": 120, "imports": [{ "path": "src/util.ts", "kind": "import-statement" }] },
                "src/util.ts": { "bytes": 40, "imports": [] }
            },
            "outputs": {
                "dist/app.js": {
                    "bytes": 300,
                    "entryPoint": "src/app.ts",
                    "inputs": { "src/app.ts": { "bytesInOutput": 80 } },
                    "imports": [],
                    "exports": []
                }
            }
        }"#;
        let metafile: Metafile = serde_json::from_str(json).unwrap();
        assert_eq!(metafile.inputs.len(), 2);
        assert_eq!(metafile.inputs["src/app.ts"].imports[0].path, "src/util.ts");
        assert_eq!(
            metafile.outputs["dist/app.js"].entry_point.as_deref(),
            Some("src/app.ts")
        );
    }

    #[test]
    fn test_input_paths_skip_missing_virtual_modules() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("real.ts"), "").unwrap();

        let mut metafile = Metafile::default();
        for key in ["src/app.ts", "virtual:env", "ns:real.ts", "file:src/lib.ts", "<stdin>"] {
            metafile.inputs.insert(key.to_string(), MetafileInput::default());
        }

        let mut paths = metafile.input_paths(dir.path());
        paths.sort();
        let mut expected = vec![
            dir.path().join("src/app.ts"),
            dir.path().join("real.ts"),
            dir.path().join("src/lib.ts"),
        ];
        expected.sort();
        assert_eq!(paths, expected);
    }

    #[test]
    fn test_reroot_outputs() {
        let cwd = Path::new("/project");
        let mut metafile = Metafile::default();
        metafile.outputs.insert(
            "../tmp/stage/out/app.js".to_string(),
            MetafileOutput {
                entry_point: Some("src/app.ts".to_string()),
                ..Default::default()
            },
        );

        metafile.reroot_outputs(cwd, Path::new("/tmp/stage/out"), Path::new("/project/dist"));

        let entries = metafile.entry_outputs(cwd);
        assert_eq!(
            entries.get(Path::new("/project/src/app.ts")),
            Some(&PathBuf::from("/project/dist/app.js"))
        );
    }
}

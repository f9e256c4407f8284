//! Integration tests for the `fob-dev` binary.
//!
//! The bundler is a small shell script speaking the esbuild command line:
//! it copies the entry point into the output directory and writes a
//! metafile.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn fob_dev() -> Command {
    Command::cargo_bin("fob-dev").unwrap()
}

#[test]
fn test_help_lists_commands() {
    fob_dev()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("dev"));
}

#[test]
fn test_build_without_entry_points_fails() {
    let temp = TempDir::new().unwrap();
    fob_dev()
        .current_dir(temp.path())
        .args(["build", "--cwd"])
        .arg(temp.path())
        .env("NO_COLOR", "1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("entryPoints"));
}

#[test]
fn test_build_with_missing_bundler_fails() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("src")).unwrap();
    fs::write(temp.path().join("src/app.ts"), "console.log(1)").unwrap();

    fob_dev()
        .current_dir(temp.path())
        .args(["build", "src/app.ts", "--bundler", "fob-dev-no-such-bundler", "--cwd"])
        .arg(temp.path())
        .env("NO_COLOR", "1")
        .assert()
        .failure();
}

#[cfg(unix)]
mod with_script_bundler {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    const COPY_BUNDLER: &str = r#"#!/bin/sh
for arg in "$@"; do
  case "$arg" in
    --bundle) ;;
    --outdir=*) out="${arg#--outdir=}" ;;
    --metafile=*) meta="${arg#--metafile=}" ;;
    *) entry="$arg" ;;
  esac
done
if grep -q "SYNTAX ERROR" "$entry"; then
  echo "✘ [ERROR] Unexpected token" >&2
  exit 1
fi
mkdir -p "$out"
cat "$entry" > "$out/app.js"
abs="$(cd "$out" && pwd -P)/app.js"
printf '{"inputs":{"%s":{"bytes":1,"imports":[]}},"outputs":{"%s":{"bytes":1,"entryPoint":"%s","inputs":{}}}}' \
  "$entry" "$abs" "$entry" > "$meta"
"#;

    fn project(source: &str) -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/app.ts"), source).unwrap();
        fs::write(
            temp.path().join("index.html"),
            r#"<html><body><script type="module" src="./src/app.ts"></script></body></html>"#,
        )
        .unwrap();

        let script = temp.path().join("bundle.sh");
        fs::write(&script, COPY_BUNDLER).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        temp
    }

    fn build(root: &Path) -> Command {
        let mut cmd = fob_dev();
        cmd.current_dir(root)
            .env("NO_COLOR", "1")
            .args(["build", "src/app.ts", "--html", "index.html", "--bundler"])
            .arg(root.join("bundle.sh"))
            .arg("--cwd")
            .arg(root);
        cmd
    }

    #[test]
    fn test_build_writes_outputs_and_html() {
        let temp = project("console.log('hello')");

        build(temp.path())
            .assert()
            .success()
            .stderr(predicate::str::contains("app.js"));

        let bundle = fs::read_to_string(temp.path().join("dist/app.js")).unwrap();
        assert_eq!(bundle, "console.log('hello')");

        let html = fs::read_to_string(temp.path().join("dist/index.html")).unwrap();
        assert!(html.contains(r#"src="/app.js""#));
        assert!(!html.contains("__fob_reload__"));
    }

    #[test]
    fn test_build_errors_exit_non_zero() {
        let temp = project("SYNTAX ERROR");

        build(temp.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unexpected token"));
        assert!(!temp.path().join("dist/app.js").exists());
    }

    #[test]
    fn test_no_write_leaves_output_directory_alone() {
        let temp = project("console.log('hello')");

        build(temp.path()).arg("--no-write").assert().success();
        assert!(!temp.path().join("dist").exists());
    }

    #[test]
    fn test_config_file_supplies_entry_points() {
        let temp = project("console.log('from config')");
        fs::write(
            temp.path().join("fob.dev.json"),
            format!(
                r#"{{ "entryPoints": ["src/app.ts"], "outDir": "build", "bundler": {{ "command": "{}" }} }}"#,
                temp.path().join("bundle.sh").display()
            ),
        )
        .unwrap();

        fob_dev()
            .current_dir(temp.path())
            .env("NO_COLOR", "1")
            .args(["build", "--cwd"])
            .arg(temp.path())
            .assert()
            .success();
        assert!(temp.path().join("build/app.js").exists());
    }
}

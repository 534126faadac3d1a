//! Integration tests for the `devbundle` binary.

use std::path::Path;
use std::process::{Command, Output};

fn devbundle(cwd: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_devbundle"));
    cmd.arg("--cwd").arg(cwd);
    cmd.env_remove("DEVBUNDLE_ENTRIES");
    cmd.env_remove("DEVBUNDLE_CONFIG");
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

const CONFIG: &str = r#"{
    "bundleStats": true,
    "entries": {
        "index.js": { "scripts": ["index.js"], "styles": ["src/styles.scss"] },
        "admin.js": { "scripts": ["admin.js"], "styles": [] }
    }
}"#;

#[test]
fn test_version() {
    let dir = tempfile::tempdir().unwrap();
    let output = devbundle(dir.path()).arg("version").output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("devbundle "));
}

#[test]
fn test_config_option_lookup() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("devbundle.json"), CONFIG).unwrap();

    let output = devbundle(dir.path())
        .args(["config", "bundleStats"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "true");

    let output = devbundle(dir.path())
        .args(["--json", "config", "paths.output"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["value"], "dist");
}

#[test]
fn test_config_unknown_option_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = devbundle(dir.path())
        .args(["config", "hotReload"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("hotReload"), "stderr: {stderr}");
}

#[test]
fn test_entries_follow_worker_env() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("devbundle.json"), CONFIG).unwrap();

    let output = devbundle(dir.path())
        .arg("entries")
        .env("DEVBUNDLE_ENTRIES", "index.js")
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "index.js": ["index.js", "src/styles.scss"] })
    );

    let output = devbundle(dir.path()).arg("entries").output().unwrap();
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json.as_object().unwrap().len(), 2);
}

#[test]
fn test_css_inlines_imports() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("base.css"), ".base { color: red; }\n").unwrap();
    std::fs::write(
        dir.path().join("main.css"),
        "@import 'base.css';\n.main { margin: 0; }\n",
    )
    .unwrap();

    let output = devbundle(dir.path())
        .args(["--json", "css", "main.css"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    let code = json["code"].as_str().unwrap();
    assert!(code.contains(".base"));
    assert!(code.find(".base").unwrap() < code.find(".main").unwrap());
    assert!(!code.contains("@import"));

    let messages = json["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "dependency");
    assert!(messages[0]["file"].as_str().unwrap().ends_with("base.css"));
}

#[test]
fn test_css_writes_output_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.css"), ".main { margin: 0; }\n").unwrap();

    let output = devbundle(dir.path())
        .args(["css", "main.css", "-o", "dist/main.css", "--minify"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).is_empty());
    let written = std::fs::read_to_string(dir.path().join("dist/main.css")).unwrap();
    assert_eq!(written.trim(), ".main{margin:0}");
}

//! Command-line behaviour of the `webdoc2pdf` binary.
//!
//! None of these runs launch a browser: they cover help output, maintenance
//! modes and exit codes.

#![cfg(feature = "cli")]

use std::fs;
use std::path::Path;
use std::process::{Command, Output, Stdio};

const ENV_VARS: &[&str] = &[
    "RUST_LOG",
    "WEBDOC2PDF_HEADLESS",
    "WEBDOC2PDF_DEBUG",
    "WEBDOC2PDF_CONFIG",
    "WEBDOC2PDF_LOG_LEVEL",
    "WEBDOC2PDF_OUTPUT_DIR",
    "WEBDOC2PDF_CHROME",
    "WEBDOC2PDF_NO_PROGRESS",
];

fn run(args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_webdoc2pdf"));
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.args(args)
        .stdin(Stdio::null())
        .output()
        .expect("failed to run webdoc2pdf")
}

fn log_text(base: &Path) -> String {
    let mut text = String::new();
    for entry in fs::read_dir(base.join("logs")).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        if name.starts_with("webdoc2pdf") {
            text.push_str(&fs::read_to_string(&path).unwrap());
        }
    }
    text
}

#[test]
fn help_lists_examples_and_environment() {
    let out = run(&["--help"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("EXAMPLES:"), "help: {stdout}");
    assert!(stdout.contains(r##""selectors": ["#continueButton"]"##), "help: {stdout}");
    assert!(stdout.contains("PLAYWRIGHT_BROWSERS_PATH"), "help: {stdout}");
}

#[test]
fn cleanup_removes_old_sessions_and_flushes_log() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path();
    for name in ["20240101_000000_old", "20240102_000000_mid", "20240103_000000_new"] {
        fs::create_dir(base.join(name)).unwrap();
        fs::write(base.join(name).join("doc.pdf"), b"%PDF-1.5").unwrap();
    }

    let out = run(&[
        "--cleanup",
        "--keep-sessions",
        "2",
        "--output-dir",
        base.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    assert!(!base.join("20240101_000000_old").exists());
    assert!(base.join("20240102_000000_mid").exists());
    assert!(base.join("20240103_000000_new").exists());

    // The process has exited, so anything buffered by the log writer must
    // already be on disk.
    let log = log_text(base);
    assert!(log.contains("Removed old session"), "log: {log}");
    assert!(log.contains("20240101_000000_old"), "log: {log}");
}

#[test]
fn missing_url_without_terminal_exits_with_usage_code() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(&["--output-dir", dir.path().to_str().unwrap()]);

    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("No URL given"), "stderr: {stderr}");
}

#[test]
fn invalid_similarity_threshold_in_config_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.json");
    fs::write(&config, r#"{ "similarityThreshold": 300 }"#).unwrap();

    let out = run(&[
        "--check",
        "--config",
        config.to_str().unwrap(),
        "--output-dir",
        dir.path().to_str().unwrap(),
    ]);

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("similarity threshold"), "stderr: {stderr}");
}

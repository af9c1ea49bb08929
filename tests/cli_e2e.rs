use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use tracefilter::builder::{ChunkBuilder, RecordingBuilder};
use tracefilter::metadata::{FieldKind, TypeCatalog, TypeDescriptor};
use tracefilter::summary::summarize;
use tracefilter::value::{Reference, Value};

include!("common/recordings.rs");

fn tracefilter_bin() -> &'static str {
    env!("CARGO_BIN_EXE_tracefilter")
}

fn test_temp_dir(tag: &str) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("tracefilter-cli-e2e-{tag}-{}-{ts}", std::process::id()));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn run_tracefilter(args: &[&str]) -> Output {
    Command::new(tracefilter_bin())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run tracefilter")
}

fn write_demo(dir: &Path) -> PathBuf {
    let input = dir.join("rec.jfr");
    fs::write(&input, demo_recording()).expect("write recording");
    input
}

#[test]
fn cli_filter_include_events() {
    let dir = test_temp_dir("include");
    let input = write_demo(&dir);
    let output = dir.join("out.jfr");

    let out = run_tracefilter(&[
        "filter",
        "-i",
        input.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "--include-events",
        "demo.Sample",
    ]);
    assert!(out.status.success(), "filter failed: {}", String::from_utf8_lossy(&out.stderr));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("2 of 4 events"), "{stderr}");

    let summary = summarize(&output).expect("summarize output");
    assert_eq!(summary.chunks[0].events_of("demo.Sample"), 2);
    assert_eq!(summary.chunks[0].events_of("demo.Noise"), 0);
    assert!(!dir.join("out.jfr.tmp").exists());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn cli_filter_default_output_name() {
    let dir = test_temp_dir("default-out");
    let input = write_demo(&dir);

    let out = run_tracefilter(&["filter", "-i", input.to_str().unwrap(), "--exclude-events", "demo.*"]);
    assert!(out.status.success(), "filter failed: {}", String::from_utf8_lossy(&out.stderr));

    let output = dir.join("rec.filtered.jfr");
    let summary = summarize(&output).expect("summarize default output");
    assert_eq!(summary.event_count(), 0);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn cli_filter_same_file_rejected() {
    let dir = test_temp_dir("same");
    let input = write_demo(&dir);
    let before = fs::read(&input).unwrap();

    let path = input.to_str().unwrap();
    let out = run_tracefilter(&["filter", "-i", path, "-o", path]);
    assert!(!out.status.success());
    assert_eq!(fs::read(&input).unwrap(), before, "input must stay untouched");
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn cli_filter_corrupt_input_fails_without_output() {
    let dir = test_temp_dir("corrupt");
    let input = dir.join("bad.jfr");
    let output = dir.join("out.jfr");
    fs::write(&input, b"not a recording, just some bytes that are long enough for a header .....").unwrap();

    let out = run_tracefilter(&["filter", "-i", input.to_str().unwrap(), "-o", output.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.starts_with("Fehler:"), "{stderr}");
    assert!(!output.exists());
    assert!(!dir.join("out.jfr.tmp").exists());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn cli_filter_empty_pattern_rejected() {
    let dir = test_temp_dir("empty-pattern");
    let input = write_demo(&dir);
    let output = dir.join("out.jfr");

    let out = run_tracefilter(&[
        "filter",
        "-i",
        input.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "--include-events",
        "demo.Sample,,demo.Noise",
    ]);
    assert!(!out.status.success());
    assert!(!output.exists());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn cli_summary_text_and_json() {
    let dir = test_temp_dir("summary");
    let input = write_demo(&dir);

    let out = run_tracefilter(&["summary", "-i", input.to_str().unwrap()]);
    assert!(out.status.success(), "summary failed: {}", String::from_utf8_lossy(&out.stderr));
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("demo.Sample"), "{text}");
    assert!(text.contains("4 events, 2 checkpoints"), "{text}");

    let out = run_tracefilter(&["summary", "-i", input.to_str().unwrap(), "--json"]);
    assert!(out.status.success(), "summary --json failed: {}", String::from_utf8_lossy(&out.stderr));
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).expect("valid json");
    assert_eq!(json["eventCount"], 4);
    assert_eq!(json["chunks"][0]["events"]["demo.Noise"], 2);
    assert_eq!(json["chunks"][0]["checkpoints"][1]["pools"][0]["name"], "demo.StackTrace");
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn cli_verbose_logs_to_stderr() {
    let dir = test_temp_dir("verbose");
    let input = write_demo(&dir);
    let output = dir.join("out.jfr");

    let out = run_tracefilter(&[
        "-v",
        "filter",
        "-i",
        input.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "--include-events",
        "demo.Sample",
    ]);
    assert!(out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("DEBUG"), "{stderr}");
    let _ = fs::remove_dir_all(&dir);
}

use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{json, Value};

use confres::util::sha256_hex;
use confres_contracts::CONFRES_REPORT_SCHEMA_VERSION;

mod tree_util;
use tree_util::{document, subst};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_dir(prefix: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    base.join(format!("{prefix}_{pid}_{n}"))
}

fn write_doc(prefix: &str, root: Value) -> PathBuf {
    let dir = temp_dir(prefix);
    std::fs::create_dir_all(&dir).expect("create temp dir");
    let path = dir.join("tree.json");
    std::fs::write(&path, document(root)).expect("write tree document");
    path
}

fn run(args: &[&str], input: &PathBuf) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_confres"))
        .args(args)
        .arg("--input")
        .arg(input)
        .output()
        .expect("run confres")
}

fn report(out: &std::process::Output) -> Value {
    serde_json::from_slice(&out.stdout).unwrap_or_else(|err| {
        panic!(
            "parse report json: {err}\nstdout={}\nstderr={}",
            String::from_utf8_lossy(&out.stdout),
            String::from_utf8_lossy(&out.stderr)
        )
    })
}

#[test]
fn cli_resolve_prints_canonical_json() {
    let input = write_doc("confres_cli_resolve", json!({"b": subst("a"), "a": {"z": 1, "y": 2}}));
    let out = run(&["resolve"], &input);
    assert!(
        out.status.success(),
        "status={}\nstderr={}",
        out.status,
        String::from_utf8_lossy(&out.stderr)
    );
    assert_eq!(
        String::from_utf8_lossy(&out.stdout).trim_end(),
        r#"{"a":{"y":2,"z":1},"b":{"y":2,"z":1}}"#
    );
}

#[test]
fn cli_resolve_report_json_is_stable() {
    let input = write_doc("confres_cli_report", json!({"a": 1, "b": subst("a")}));
    let out = run(&["resolve", "--report-json"], &input);
    assert!(out.status.success(), "status={}", out.status);

    let v = report(&out);
    assert_eq!(
        v.get("schema_version").and_then(Value::as_str),
        Some(CONFRES_REPORT_SCHEMA_VERSION)
    );
    assert_eq!(v.get("command").and_then(Value::as_str), Some("resolve"));
    assert_eq!(v.get("ok").and_then(Value::as_bool), Some(true));
    assert_eq!(v.get("exit_code").and_then(Value::as_u64), Some(0));
    assert_eq!(v.get("diagnostics_count").and_then(Value::as_u64), Some(0));
    assert_eq!(v.get("result"), Some(&json!({"a": 1, "b": 1})));
    assert_eq!(
        v.get("result_sha256").and_then(Value::as_str),
        Some(sha256_hex(br#"{"a":1,"b":1}"#).as_str())
    );
}

#[test]
fn cli_resolve_restricted_prints_only_the_path() {
    let input = write_doc(
        "confres_cli_restrict",
        json!({"x": 1, "y": subst("x"), "z": subst("missing")}),
    );
    let out = run(&["resolve", "--restrict", "y"], &input);
    assert!(
        out.status.success(),
        "status={}\nstderr={}",
        out.status,
        String::from_utf8_lossy(&out.stderr)
    );
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim_end(), "1");

    let out = run(&["resolve", "--report-json"], &input);
    assert_eq!(out.status.code(), Some(1));
    let v = report(&out);
    assert_eq!(v.get("ok").and_then(Value::as_bool), Some(false));
    assert_eq!(
        v.pointer("/diagnostics/0/code").and_then(Value::as_str),
        Some("CONFRES-SUBST-0001")
    );
    assert_eq!(
        v.pointer("/diagnostics/0/origin/pointer").and_then(Value::as_str),
        Some("/root/z")
    );

    let out = run(&["resolve", "--allow-unresolved"], &input);
    assert!(out.status.success(), "status={}", out.status);
    let v: Value = serde_json::from_slice(&out.stdout).expect("parse result");
    assert_eq!(v["z"], json!({"$subst": "missing"}));
}

#[test]
fn cli_check_reports_cycles() {
    let input = write_doc("confres_cli_check", json!({"a": subst("b"), "b": subst("a")}));
    let out = run(&["check", "--report-json"], &input);
    assert_eq!(out.status.code(), Some(1));

    let v = report(&out);
    assert_eq!(v.get("command").and_then(Value::as_str), Some("check"));
    assert_eq!(
        v.pointer("/diagnostics/0/code").and_then(Value::as_str),
        Some("CONFRES-CYCLE-0001")
    );
    assert_eq!(v.pointer("/meta/substitutions").and_then(Value::as_u64), Some(2));
    assert_eq!(v.pointer("/meta/merge_stacks").and_then(Value::as_u64), Some(0));
}

#[test]
fn cli_usage_and_io_failures_exit_2() {
    let missing = temp_dir("confres_cli_missing").join("nope.json");
    let out = run(&["check", "--report-json"], &missing);
    assert_eq!(out.status.code(), Some(2));
    assert_eq!(
        report(&out).pointer("/diagnostics/0/code").and_then(Value::as_str),
        Some("CONFRES-IO-READ-0001")
    );

    let out = run(&["check"], &missing);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("read input"));

    let input = write_doc("confres_cli_bad_restrict", json!({"a": 1}));
    let out = run(&["resolve", "--restrict", "a..b", "--report-json"], &input);
    assert_eq!(out.status.code(), Some(2));
    assert_eq!(
        report(&out).pointer("/diagnostics/0/code").and_then(Value::as_str),
        Some("CONFRES-PATH-0001")
    );

    let dir = temp_dir("confres_cli_bad_schema");
    std::fs::create_dir_all(&dir).expect("create temp dir");
    let path = dir.join("tree.json");
    std::fs::write(&path, br#"{"schema_version":"confres.tree@9.9.9","root":{}}"#)
        .expect("write");
    let out = run(&["check", "--report-json"], &path);
    assert_eq!(out.status.code(), Some(2));
    assert_eq!(
        report(&out).pointer("/diagnostics/0/code").and_then(Value::as_str),
        Some("CONFRES-TREE-0001")
    );
}

//! The `monarch` command-line tool.

#![cfg(feature = "cli")]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

const GRAMMAR: &str = r#"{ "tokenizer": {
    "main": [
        ["\\d+", "number"],
        ["\"", "string", "@string"],
        ["[{}]", "@brackets"],
        [".", "text"]
    ],
    "string": [["\"", "string", "@pop"], [".", "string"]]
} }"#;

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_tokenizes_lines_with_language_from_file_name() {
    let dir = TempDir::new().unwrap();
    let grammar = write(dir.path(), "demo.json", GRAMMAR);
    let input = write(dir.path(), "input.txt", "12ab\n\"x\ny\"{}\n");

    let mut cmd = cargo_bin_cmd!("monarch");
    cmd.arg(&grammar).arg(&input);
    cmd.assert().success().stdout(
        predicate::str::contains("1:0\tnumber.demo\n")
            .and(predicate::str::contains("1:2\ttext.demo\n"))
            .and(predicate::str::contains("2:0\tstring.demo\n"))
            .and(predicate::str::contains("3:0\tstring.demo\n"))
            .and(predicate::str::contains("3:2\tdelimiter.curly.demo\tOpen\n"))
            .and(predicate::str::contains("3:3\tdelimiter.curly.demo\tClose\n")),
    );
}

#[test]
fn test_language_flag_overrides_file_name() {
    let dir = TempDir::new().unwrap();
    let grammar = write(dir.path(), "demo.json", GRAMMAR);
    let input = write(dir.path(), "input.txt", "7");

    let mut cmd = cargo_bin_cmd!("monarch");
    cmd.arg(&grammar).arg(&input).arg("--language").arg("toy");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1:0\tnumber.toy"));
}

#[test]
fn test_json_output() {
    let dir = TempDir::new().unwrap();
    let grammar = write(dir.path(), "demo.json", GRAMMAR);
    let input = write(dir.path(), "input.txt", "12ab");

    let mut cmd = cargo_bin_cmd!("monarch");
    cmd.arg(&grammar).arg(&input).arg("--json");
    cmd.assert().success().stdout(
        predicate::str::contains("\"classification\":\"number.demo\"")
            .and(predicate::str::contains("\"language\":\"demo\"")),
    );
}

#[test]
fn test_reports_compile_errors() {
    let dir = TempDir::new().unwrap();
    let grammar = write(
        dir.path(),
        "broken.json",
        r#"{ "tokenizer": { "main": [["x", { "token": "t", "next": "noSuchState" }]] } }"#,
    );
    let input = write(dir.path(), "input.txt", "x");

    let mut cmd = cargo_bin_cmd!("monarch");
    cmd.arg(&grammar).arg(&input);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("broken: the next state 'noSuchState' is not defined"));
}

#[test]
fn test_reports_missing_input() {
    let dir = TempDir::new().unwrap();
    let grammar = write(dir.path(), "demo.json", GRAMMAR);

    let mut cmd = cargo_bin_cmd!("monarch");
    cmd.arg(&grammar).arg(dir.path().join("missing.txt"));
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("cannot read"));
}

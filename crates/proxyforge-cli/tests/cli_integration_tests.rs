use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn binary_exists_and_prints_help() {
    let mut cmd = Command::cargo_bin("proxyforge").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("proxyforge"));
}

#[test]
fn version_flag_reports_the_crate_version() {
    let mut cmd = Command::cargo_bin("proxyforge").unwrap();
    cmd.arg("--version");
    cmd.assert().success();
}

#[test]
fn help_lists_merge_and_retest_subcommands() {
    let mut cmd = Command::cargo_bin("proxyforge").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("merge"))
        .stdout(predicate::str::contains("retest"))
        .stdout(predicate::str::contains("completions"));
}

#[test]
fn merge_help_lists_its_flags() {
    let mut cmd = Command::cargo_bin("proxyforge").unwrap();
    cmd.args(["merge", "--help"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--sources"))
        .stdout(predicate::str::contains("--output"))
        .stdout(predicate::str::contains("--lenient"));
}

#[test]
fn merge_missing_sources_file_exits_with_missing_input_code() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("proxyforge").unwrap();
    cmd.args([
        "merge",
        "--sources",
        "does-not-exist.txt",
        "--output",
    ])
    .arg(dir.path());
    cmd.assert().code(2);
}

#[test]
fn completions_for_bash_produce_nonempty_output() {
    let mut cmd = Command::cargo_bin("proxyforge").unwrap();
    cmd.args(["completions", "bash"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("proxyforge"));
}

//! End-to-end tests exercising the `ember` binary as a subprocess, in
//! the style of `faxc-drv`'s CLI tests: real process, real exit code,
//! real stdout/stderr.

use std::io::Write;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn ember_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ember"))
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[test]
fn running_a_script_prints_its_output_and_exits_zero() {
    ember_bin()
        .arg(fixture("arithmetic.ember"))
        .assert()
        .success()
        .stdout(predicate::str::contains("7").and(predicate::str::contains("15")));
}

#[test]
fn a_runtime_error_exits_70_and_reports_the_line() {
    ember_bin()
        .arg(fixture("runtime_error.ember"))
        .assert()
        .code(70)
        .stderr(predicate::str::contains("[line 1] in script"));
}

#[test]
fn a_compile_error_exits_65() {
    ember_bin().arg(fixture("compile_error.ember")).assert().code(65);
}

#[test]
fn a_missing_script_exits_74() {
    ember_bin().arg(fixture("does_not_exist.ember")).assert().code(74);
}

#[test]
fn more_than_one_script_path_exits_64_with_a_usage_message() {
    ember_bin()
        .arg(fixture("arithmetic.ember"))
        .arg(fixture("arithmetic.ember"))
        .assert()
        .code(64)
        .stderr(predicate::str::contains("Usage: ember [path]"));
}

#[test]
fn help_flag_succeeds_and_mentions_the_binary_name() {
    ember_bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ember"));
}

#[test]
fn repl_reads_one_line_and_echoes_print_output() {
    ember_bin()
        .write_stdin("print 1 + 1;\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("2"));
}

#[test]
fn repl_retains_globals_across_lines() {
    ember_bin()
        .write_stdin("var a = 10;\nprint a + 1;\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("11"));
}

#[test]
fn running_a_dynamically_written_script_succeeds() {
    let mut script = NamedTempFile::new().expect("failed to create temp script");
    script
        .write_all(b"print \"from a tempfile\";")
        .expect("failed to write temp script");

    ember_bin()
        .arg(script.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("from a tempfile"));
}

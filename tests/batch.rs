use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

#[test]
fn compiles_directories_and_reports_failures() {
    let out = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("parallelme").unwrap();
    cmd.arg("-f").arg(fixtures()).arg("-o").arg(out.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Broken.java"))
        .stderr(predicate::str::contains("1 of 4 file(s) failed to compile"));

    let app = out.path().join("org/example/app");
    assert!(app.join("VectorScale.java").is_file());
    assert!(app.join("Threshold.rs").is_file());
    assert!(!app.join("Broken.java").exists());
    let plain = fs::read_to_string(app.join("Plain.java")).unwrap();
    pretty_assertions::assert_eq!(plain, fs::read_to_string(fixtures().join("Plain.java")).unwrap());
}

#[test]
fn semicolon_separated_files_share_sequence_ids() {
    let out = tempfile::tempdir().unwrap();
    let files = format!(
        "{};{}",
        fixtures().join("VectorScale.java").display(),
        fixtures().join("Threshold.java").display()
    );
    let mut cmd = Command::cargo_bin("parallelme").unwrap();
    cmd.args(["-f", &files, "--list-operations", "-o"]).arg(out.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("2\tforeach\tparallel"))
        .stdout(predicate::str::contains("5\tforeach\tsequential"));
}

#[test]
fn rejects_output_that_is_an_input() {
    let dir = tempfile::tempdir().unwrap();
    fs::copy(fixtures().join("Plain.java"), dir.path().join("Plain.java")).unwrap();
    let mut cmd = Command::cargo_bin("parallelme").unwrap();
    cmd.arg("-f").arg(dir.path()).arg("-o").arg(dir.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn rejects_missing_inputs_and_arguments() {
    let out = tempfile::tempdir().unwrap();
    Command::cargo_bin("parallelme")
        .unwrap()
        .args(["-f", "does/not/exist.java", "-o"])
        .arg(out.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
    Command::cargo_bin("parallelme")
        .unwrap()
        .args(["-f", "A.java"])
        .assert()
        .failure();
}

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn lists_operations_when_flag_set() {
    let out = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("parallelme").unwrap();
    cmd.args([
        "-f",
        &format!("{}/tests/fixtures/Threshold.java", env!("CARGO_MANIFEST_DIR")),
        "--list-operations",
        "-o",
    ])
    .arg(out.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("2\tforeach\tsequential\tline 10"))
        .stdout(predicate::str::contains("3\tfilter\tparallel\tline 13"))
        .stdout(predicate::str::contains("4\treduce\tparallel\tline 14"));
}

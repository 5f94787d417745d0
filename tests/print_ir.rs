use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn prints_ir_when_flag_set() {
    let out = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("parallelme").unwrap();
    cmd.args([
        "-f",
        &format!("{}/tests/fixtures/Threshold.java", env!("CARGO_MANIFEST_DIR")),
        "--print-ir",
        "-o",
    ])
    .arg(out.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("#1 line 9: input bind values <- new Array(data, Int32.class)"))
        .stdout(predicate::str::contains("captures [threshold]"))
        .stdout(predicate::str::contains("warning (line 10): foreach over `values` will run sequentially"));
}

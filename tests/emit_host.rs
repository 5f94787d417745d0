use assert_cmd::Command;
use predicates::prelude::*;

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

#[test]
fn prints_host_when_flag_set() {
    let out = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("parallelme").unwrap();
    cmd.args(["-f", &fixture("VectorScale.java"), "--emit-host", "-o"])
        .arg(out.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Allocation values = Allocation.createSized("))
        .stdout(predicate::str::contains("PM_mScript.forEach_PM_kernelForeach2(values, values);"))
        .stdout(predicate::str::contains("Array<").not())
        .stdout(predicate::str::contains("import org.parallelme.userlibrary.Array;").not());
}

#[test]
fn native_host_uses_handles() {
    let out = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("parallelme").unwrap();
    cmd.args(["-f", &fixture("VectorScale.java"), "-t", "native", "--emit-host", "-o"])
        .arg(out.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("long values = PM_inputBindValues1(PM_runtime, data);"))
        .stdout(predicate::str::contains("int[] result = new int[PM_length(values)];"))
        .stdout(predicate::str::contains("Array<").not());
}

#[test]
fn prefix_flag_renames_generated_identifiers() {
    let out = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("parallelme").unwrap();
    cmd.args(["-f", &fixture("VectorScale.java"), "--prefix", "GEN_", "--emit-host", "-o"])
        .arg(out.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("GEN_mScript.forEach_GEN_kernelForeach2(values, values);"))
        .stdout(predicate::str::contains("PM_").not());
}

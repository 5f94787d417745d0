use assert_cmd::Command;
use predicates::prelude::*;

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

#[test]
fn prints_renderscript_when_flag_set() {
    let out = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("parallelme").unwrap();
    cmd.args(["-f", &fixture("VectorScale.java"), "--emit-kernels", "-o"])
        .arg(out.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("#pragma rs java_package_name(org.example.app)"))
        .stdout(predicate::str::contains("int __attribute__((kernel)) PM_kernelForeach2(int PM_in, uint32_t x) {"));
    assert!(out.path().join("org/example/app/VectorScale.rs").is_file());
}

#[test]
fn prints_opencl_and_jni_for_native_target() {
    let out = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("parallelme").unwrap();
    cmd.args(["-f", &fixture("Threshold.java"), "-t", "native", "--emit-kernels", "-o"])
        .arg(out.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Java_org_example_app_Threshold_PM_1foreach2"))
        .stdout(predicate::str::contains("atomic_inc(count);"))
        .stdout(predicate::str::contains("java/util/NoSuchElementException"));
    for file in ["jni/Threshold.cpp", "jni/Threshold_kernels.h", "jni/PMRuntime.hpp", "jni/Android.mk"] {
        assert!(out.path().join(file).is_file(), "missing {}", file);
    }
}

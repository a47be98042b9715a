use predicates::prelude::*;

#[test]
fn help_lists_the_server_flags() {
    let mut cmd = assert_cmd::Command::cargo_bin("questcard").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--addr"))
        .stdout(predicate::str::contains("--redis-url"))
        .stdout(predicate::str::contains("--selectors"));
}

#[test]
fn version_prints_the_package_version() {
    let mut cmd = assert_cmd::Command::cargo_bin("questcard").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("questcard"));
}

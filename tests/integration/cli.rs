use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn missing_config_argument_exits_with_one() {
    Command::cargo_bin("taskmaster")
        .unwrap()
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn unreadable_config_exits_with_one() {
    let dir = tempdir().unwrap();

    Command::cargo_bin("taskmaster")
        .unwrap()
        .current_dir(dir.path())
        .arg("does-not-exist.yaml")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid config syntax"));
}

#[test]
fn invalid_config_value_exits_with_one() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("taskmaster.yaml");
    fs::write(
        &path,
        "programs:\n  web:\n    cmd: \"echo hi\"\n    umask: \"999\"\n",
    )
    .unwrap();

    Command::cargo_bin("taskmaster")
        .unwrap()
        .current_dir(dir.path())
        .arg("taskmaster.yaml")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("umask"));
}

#[test]
fn quit_command_shuts_down_cleanly() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("taskmaster.yaml");
    fs::write(&path, "programs: {}\n").unwrap();

    Command::cargo_bin("taskmaster")
        .unwrap()
        .current_dir(dir.path())
        .arg("taskmaster.yaml")
        .write_stdin("status\nquit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("taskmaster control shell"))
        .stdout(predicate::str::contains("No programs are running"))
        .stdout(predicate::str::contains("Exiting taskmaster..."));
}

#[test]
fn status_distinguishes_not_started_from_undeclared() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("taskmaster.yaml");
    fs::write(
        &path,
        concat!(
            "programs:\n",
            "  lazy:\n",
            "    cmd: \"sleep 30\"\n",
            "    autostart: false\n",
            "    stoptime: 0\n",
        ),
    )
    .unwrap();

    Command::cargo_bin("taskmaster")
        .unwrap()
        .current_dir(dir.path())
        .arg("taskmaster.yaml")
        .write_stdin("status lazy\nstatus ghost\nquit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("lazy: not started"))
        .stdout(predicate::str::contains("Program ghost not found"));
}

#[test]
fn end_of_input_behaves_like_quit() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("taskmaster.yaml");
    fs::write(&path, "programs: {}\n").unwrap();

    Command::cargo_bin("taskmaster")
        .unwrap()
        .current_dir(dir.path())
        .arg("taskmaster.yaml")
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::contains("Exiting taskmaster..."));
}

#[test]
fn event_log_is_written_to_the_requested_file() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("taskmaster.yaml");
    fs::write(
        &config,
        "programs:\n  echo:\n    cmd: \"echo hi\"\n    autorestart: \"never\"\n",
    )
    .unwrap();
    let log = dir.path().join("audit.log");

    Command::cargo_bin("taskmaster")
        .unwrap()
        .current_dir(dir.path())
        .arg("taskmaster.yaml")
        .arg("--log-file")
        .arg(&log)
        .write_stdin("quit\n")
        .assert()
        .success();

    let content = fs::read_to_string(&log).unwrap();
    assert!(content.contains("Started program: echo"), "log was: {content}");
}

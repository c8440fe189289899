#[path = "common/mod.rs"]
mod common;

use std::time::{Duration, Instant};

use taskmaster::status::ProcessStatus;

#[test]
fn stop_honors_the_grace_period() {
    let (mut manager, events) = common::build_manager(
        concat!(
            "programs:\n",
            "  sleeper:\n",
            "    cmd: \"sleep 30\"\n",
            "    stopsignal: \"TERM\"\n",
            "    stoptime: 1\n",
            "    autostart: true\n",
        ),
    );

    manager.start_initial_processes().unwrap();
    assert_eq!(
        manager.get_status().program("sleeper").unwrap()[0].status,
        ProcessStatus::Running
    );

    let started = Instant::now();
    manager.stop_program("sleeper").unwrap();
    let elapsed = started.elapsed();

    // The stop protocol blocks for the full grace window, and the child is
    // gone well before the forced-kill path would have fired.
    assert!(elapsed >= Duration::from_secs(1), "stop returned in {elapsed:?}");
    assert!(elapsed < Duration::from_millis(2500), "stop took {elapsed:?}");

    assert!(manager.get_status().is_empty());
    assert_eq!(common::count_records(&events, "Stopped program: sleeper"), 1);
    assert_eq!(common::count_records(&events, "after grace period"), 0);
}

#[test]
fn zero_stoptime_kills_immediately() {
    // The child ignores TERM, so only the unconditional kill can end it. It
    // touches a marker once the trap is installed so the test does not race
    // the shell's startup.
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("trap.ready");

    let (mut manager, events) = common::build_manager(&format!(
        concat!(
            "programs:\n",
            "  stubborn:\n",
            "    cmd: \"trap '' TERM; touch {}; sleep 30\"\n",
            "    stopsignal: \"TERM\"\n",
            "    stoptime: 0\n",
        ),
        marker.display()
    ));

    manager.start_initial_processes().unwrap();
    assert!(common::wait_until(Duration::from_secs(5), || marker.exists()));

    let started = Instant::now();
    manager.stop_program("stubborn").unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_secs(2), "stop took {elapsed:?}");
    assert!(manager.get_status().is_empty());
    assert_eq!(common::count_records(&events, "after grace period"), 1);
    assert_eq!(common::count_records(&events, "Stopped program: stubborn"), 1);
}

#[test]
fn stop_removes_every_slot_of_the_program() {
    let (mut manager, _events) = common::build_manager(
        concat!(
            "programs:\n",
            "  pool:\n",
            "    cmd: \"sleep 30\"\n",
            "    numprocs: 2\n",
            "    stoptime: 0\n",
            "  other:\n",
            "    cmd: \"sleep 30\"\n",
            "    stoptime: 0\n",
        ),
    );

    manager.start_initial_processes().unwrap();
    assert_eq!(manager.get_status().programs.len(), 2);

    manager.stop_program("pool").unwrap();

    let snapshot = manager.get_status();
    assert!(snapshot.program("pool").is_none());
    assert!(snapshot.program("other").is_some());

    manager.stop_program("other").unwrap();
    assert!(manager.get_status().is_empty());
}

#[test]
fn stop_unknown_program_is_a_logged_no_op() {
    let (mut manager, events) = common::build_manager(
        "programs:\n  web:\n    cmd: \"sleep 30\"\n    stoptime: 0\n",
    );

    manager.stop_program("ghost").unwrap();
    assert_eq!(common::count_records(&events, "Program ghost is not running"), 1);
}

#[test]
fn restart_is_stop_then_start_with_a_new_pid() {
    let (mut manager, events) = common::build_manager(
        "programs:\n  web:\n    cmd: \"sleep 30\"\n    stoptime: 0\n",
    );

    manager.start_program("web").unwrap();
    let old_pid = manager.get_status().program("web").unwrap()[0].pid;

    manager.restart_program("web").unwrap();

    let snapshot = manager.get_status();
    let view = &snapshot.program("web").unwrap()[0];
    assert_ne!(view.pid, old_pid);
    assert_eq!(view.restarts, 0);
    assert_eq!(view.status, ProcessStatus::Running);

    assert_eq!(common::count_records(&events, "Stopped program: web"), 1);
    assert_eq!(common::count_records(&events, "Started program: web"), 2);

    manager.stop_program("web").unwrap();
}

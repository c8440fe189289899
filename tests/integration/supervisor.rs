#[path = "common/mod.rs"]
mod common;

use std::{fs, path::PathBuf, sync::Arc};

use taskmaster::{
    error::SupervisorError,
    events::EventLog,
    status::ProcessStatus,
    supervisor::Supervisor,
};
use tempfile::{TempDir, tempdir};

const GOOD: &str = concat!(
    "programs:\n",
    "  sleeper:\n",
    "    cmd: \"sleep 30\"\n",
    "    stoptime: 0\n",
    "    autostart: true\n",
);

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("taskmaster.yaml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn startup_fails_on_unloadable_config_without_launching() {
    let dir = tempdir().unwrap();
    let path = write_config(&dir, "programs: [broken");

    let events = Arc::new(EventLog::in_memory());
    let err = Supervisor::new(path, events).unwrap_err();
    assert!(matches!(err, SupervisorError::Config(_)), "got {err:?}");
}

#[test]
fn bad_reload_preserves_the_running_fleet() {
    let dir = tempdir().unwrap();
    let path = write_config(&dir, GOOD);

    let events = Arc::new(EventLog::in_memory());
    let supervisor = Supervisor::new(path.clone(), Arc::clone(&events)).unwrap();
    supervisor.start_program("sleeper").unwrap();

    let pid = supervisor.status().unwrap().program("sleeper").unwrap()[0].pid;

    // Replace the file with malformed content and reload.
    fs::write(&path, "programs: [broken").unwrap();
    supervisor.reload_config();

    assert!(events.contains("Failed to reload configuration"));

    let snapshot = supervisor.status().unwrap();
    let view = &snapshot.program("sleeper").unwrap()[0];
    assert_eq!(view.pid, pid);
    assert_eq!(view.status, ProcessStatus::Running);

    supervisor.shutdown().unwrap();
}

#[test]
fn reload_applies_the_diff_and_logs_it() {
    let dir = tempdir().unwrap();
    let path = write_config(&dir, GOOD);

    let events = Arc::new(EventLog::in_memory());
    let supervisor = Supervisor::new(path.clone(), Arc::clone(&events)).unwrap();
    supervisor.start_program("sleeper").unwrap();

    fs::write(
        &path,
        concat!(
            "programs:\n",
            "  sleeper:\n",
            "    cmd: \"sleep 30\"\n",
            "    stoptime: 0\n",
            "    autostart: true\n",
            "  extra:\n",
            "    cmd: \"sleep 30\"\n",
            "    stoptime: 0\n",
        ),
    )
    .unwrap();
    supervisor.reload_config();

    assert!(events.contains("added program: extra"));
    assert!(events.contains("Configuration reloaded successfully"));

    let snapshot = supervisor.status().unwrap();
    assert!(snapshot.program("sleeper").is_some());
    assert!(snapshot.program("extra").is_some());

    supervisor.shutdown().unwrap();
}

#[test]
fn reload_with_unchanged_file_leaves_the_table_untouched() {
    let dir = tempdir().unwrap();
    let path = write_config(&dir, GOOD);

    let events = Arc::new(EventLog::in_memory());
    let supervisor = Supervisor::new(path, Arc::clone(&events)).unwrap();
    supervisor.start_program("sleeper").unwrap();

    let pid = supervisor.status().unwrap().program("sleeper").unwrap()[0].pid;
    supervisor.reload_config();

    assert!(events.contains("Configuration reloaded successfully"));
    assert!(!events.contains("Stopped program: sleeper"));
    assert_eq!(
        supervisor.status().unwrap().program("sleeper").unwrap()[0].pid,
        pid
    );

    supervisor.shutdown().unwrap();
}

#[test]
fn shutdown_drains_the_table() {
    let dir = tempdir().unwrap();
    let path = write_config(
        &dir,
        concat!(
            "programs:\n",
            "  one:\n",
            "    cmd: \"sleep 30\"\n",
            "    stoptime: 0\n",
            "  two:\n",
            "    cmd: \"sleep 30\"\n",
            "    stoptime: 0\n",
            "    numprocs: 2\n",
        ),
    );

    let events = Arc::new(EventLog::in_memory());
    let supervisor = Supervisor::new(path, Arc::clone(&events)).unwrap();
    supervisor.start_all_programs().unwrap();
    assert_eq!(supervisor.status().unwrap().programs.len(), 2);

    supervisor.shutdown().unwrap();

    assert!(!supervisor.is_running());
    assert!(supervisor.status().unwrap().is_empty());
    assert!(events.contains("Stopped program: one"));
    assert!(events.contains("Stopped program: two"));
}

#[test]
fn control_surface_delegates_per_program_operations() {
    let dir = tempdir().unwrap();
    let path = write_config(
        &dir,
        concat!(
            "programs:\n",
            "  web:\n",
            "    cmd: \"sleep 30\"\n",
            "    stoptime: 0\n",
            "    autostart: false\n",
        ),
    );

    let events = Arc::new(EventLog::in_memory());
    let supervisor = Supervisor::new(path, Arc::clone(&events)).unwrap();

    assert!(supervisor.status().unwrap().is_empty());
    assert_eq!(supervisor.program_names().unwrap(), vec!["web".to_string()]);

    supervisor.start_program("web").unwrap();
    let first = supervisor.status().unwrap().program("web").unwrap()[0].pid;

    supervisor.restart_program("web").unwrap();
    let second = supervisor.status().unwrap().program("web").unwrap()[0].pid;
    assert_ne!(first, second);

    supervisor.stop_program("web").unwrap();
    assert!(supervisor.status().unwrap().is_empty());

    // Unknown names surface as typed errors for the shell to report.
    assert!(supervisor.start_program("ghost").is_err());
}

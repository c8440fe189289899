//! Top-level supervisor.
//!
//! Wires the config loader and the process manager, installs the signal
//! listener, drives the periodic health check, and exposes the control
//! surface the shell (or any other command source) delegates to.
//!
//! Signal handlers never touch the process table: the listener thread only
//! posts reload/shutdown requests through atomic flags, and the monitor
//! thread applies them under the same mutex every other mutation uses.
use std::{
    path::{Path, PathBuf},
    process,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use signal_hook::{
    consts::{SIGHUP, SIGINT},
    iterator::Signals,
};
use tracing::{debug, warn};

use crate::{
    config::load_config,
    error::{ProcessManagerError, SupervisorError},
    events::EventLog,
    manager::ProcessManager,
    status::StatusSnapshot,
};

/// Cadence of the background check-and-restart tick.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Orchestrates the supervision engine for one configuration file.
#[derive(Debug)]
pub struct Supervisor {
    config_path: PathBuf,
    manager: Arc<Mutex<ProcessManager>>,
    events: Arc<EventLog>,
    running: Arc<AtomicBool>,
    reload_requested: Arc<AtomicBool>,
    shutdown_requested: Arc<AtomicBool>,
}

impl Supervisor {
    /// Loads the configuration and builds the supervisor around it.
    ///
    /// A load failure is returned without launching anything; the binary
    /// turns it into a non-zero exit.
    pub fn new(config_path: PathBuf, events: Arc<EventLog>) -> Result<Self, SupervisorError> {
        let config = load_config(&config_path)?;
        let manager = ProcessManager::new(config, Arc::clone(&events));

        Ok(Self {
            config_path,
            manager: Arc::new(Mutex::new(manager)),
            events,
            running: Arc::new(AtomicBool::new(false)),
            reload_requested: Arc::new(AtomicBool::new(false)),
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    fn manager(&self) -> Result<MutexGuard<'_, ProcessManager>, ProcessManagerError> {
        self.manager.lock().map_err(ProcessManagerError::from)
    }

    /// Autostarts the fleet and spawns the signal listener and the
    /// health-check monitor.
    pub fn start(&self) -> Result<(), SupervisorError> {
        self.running.store(true, Ordering::SeqCst);

        if let Err(err) = self.manager()?.start_initial_processes() {
            // Already in the event log; startup continues best-effort.
            warn!("autostart was partial: {err}");
        }

        let mut signals = Signals::new([SIGHUP, SIGINT])?;
        let reload_flag = Arc::clone(&self.reload_requested);
        let shutdown_flag = Arc::clone(&self.shutdown_requested);
        thread::spawn(move || {
            for signal in signals.forever() {
                debug!(signal, "signal received");
                match signal {
                    SIGHUP => reload_flag.store(true, Ordering::SeqCst),
                    SIGINT => shutdown_flag.store(true, Ordering::SeqCst),
                    _ => {}
                }
            }
        });

        let manager = Arc::clone(&self.manager);
        let events = Arc::clone(&self.events);
        let running = Arc::clone(&self.running);
        let reload_requested = Arc::clone(&self.reload_requested);
        let shutdown_requested = Arc::clone(&self.shutdown_requested);
        let config_path = self.config_path.clone();
        thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                if shutdown_requested.swap(false, Ordering::SeqCst) {
                    events.info("Received interrupt, shutting down");
                    running.store(false, Ordering::SeqCst);
                    if let Ok(mut mgr) = manager.lock() {
                        let _ = mgr.stop_all_programs();
                    }
                    // The foreground shell may be blocked on stdin; the
                    // signal path exits once the table has drained.
                    process::exit(0);
                }

                if reload_requested.swap(false, Ordering::SeqCst) {
                    events.info("Received SIGHUP, reloading configuration");
                    Self::reload_into(&manager, &events, &config_path);
                }

                if let Ok(mut mgr) = manager.lock() {
                    mgr.check_and_restart();
                }

                thread::sleep(HEALTH_CHECK_INTERVAL);
            }
        });

        Ok(())
    }

    /// Whether the supervisor is still accepting work.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Posts a reload request; the monitor applies it on its next wake.
    pub fn request_reload(&self) {
        self.reload_requested.store(true, Ordering::SeqCst);
    }

    /// Posts a shutdown request; the monitor applies it on its next wake.
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    /// Re-parses the config file and reconciles the fleet.
    ///
    /// A parse failure is logged and the previous config and table are kept
    /// intact; a bad reload never tears down the fleet.
    pub fn reload_config(&self) {
        Self::reload_into(&self.manager, &self.events, &self.config_path);
    }

    fn reload_into(manager: &Mutex<ProcessManager>, events: &EventLog, path: &Path) {
        let new_config = match load_config(path) {
            Ok(config) => config,
            Err(err) => {
                events.error(format!("Failed to reload configuration: {err}"));
                return;
            }
        };

        let Ok(mut mgr) = manager.lock() else {
            events.error("Failed to reload configuration: manager lock poisoned");
            return;
        };

        // An empty diff logs no lines and update_config leaves the table
        // untouched; the success record is emitted either way.
        let diff = mgr.config().diff(&new_config);
        for line in diff.lines() {
            events.info(line);
        }

        if let Err(err) = mgr.update_config(new_config) {
            events.error(format!("Configuration reload was partial: {err}"));
        }
        events.info("Configuration reloaded successfully");
    }

    /// Graceful shutdown: stop the monitor on its next wake, drain every
    /// program through its stop protocol, leave the table empty.
    pub fn shutdown(&self) -> Result<(), SupervisorError> {
        self.running.store(false, Ordering::SeqCst);
        self.manager()?.stop_all_programs()?;
        Ok(())
    }

    /// Consistent snapshot of the table.
    pub fn status(&self) -> Result<StatusSnapshot, SupervisorError> {
        Ok(self.manager()?.get_status())
    }

    /// Names of every program declared in the current config.
    pub fn program_names(&self) -> Result<Vec<String>, SupervisorError> {
        Ok(self.manager()?.config().names())
    }

    /// Starts one program.
    pub fn start_program(&self, name: &str) -> Result<(), SupervisorError> {
        self.manager()?.start_program(name)?;
        Ok(())
    }

    /// Starts every program in the current config.
    pub fn start_all_programs(&self) -> Result<(), SupervisorError> {
        self.manager()?.start_all_programs()?;
        Ok(())
    }

    /// Stops one program.
    pub fn stop_program(&self, name: &str) -> Result<(), SupervisorError> {
        self.manager()?.stop_program(name)?;
        Ok(())
    }

    /// Stops every program currently present.
    pub fn stop_all_programs(&self) -> Result<(), SupervisorError> {
        self.manager()?.stop_all_programs()?;
        Ok(())
    }

    /// Restarts one program with a fresh retry budget.
    pub fn restart_program(&self, name: &str) -> Result<(), SupervisorError> {
        self.manager()?.restart_program(name)?;
        Ok(())
    }

    /// Restarts every program currently present.
    pub fn restart_all_programs(&self) -> Result<(), SupervisorError> {
        self.manager()?.restart_all_programs()?;
        Ok(())
    }

    /// The event log shared with the manager.
    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }
}

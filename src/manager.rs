//! # Process Manager
//!
//! Owns the process table and implements the supervision operations: start,
//! stop, restart, status, config reconciliation, and the periodic
//! check-and-restart tick. Every mutation and the status read run under one
//! exclusion region per manager instance; the [`crate::supervisor`] module
//! provides that serialization by holding the manager behind a mutex.
use std::{
    collections::BTreeMap,
    sync::Arc,
    thread,
    time::Duration,
};

use tracing::debug;

use crate::{
    config::{Config, ProgramSpec, RestartPolicy},
    error::ProcessManagerError,
    events::EventLog,
    process::ProcessEntry,
    status::{ProcessStatus, ProcessView, StatusSnapshot},
};

/// Supervises the declared programs and their live children.
#[derive(Debug)]
pub struct ProcessManager {
    config: Config,
    table: BTreeMap<String, Vec<ProcessEntry>>,
    events: Arc<EventLog>,
}

enum TickAction {
    Skip,
    Retire,
    Reincarnate {
        restarts: u32,
        spec: Arc<ProgramSpec>,
    },
    Exhausted {
        retries: u32,
    },
}

impl ProcessManager {
    /// Creates a manager around an immutable config snapshot.
    pub fn new(config: Config, events: Arc<EventLog>) -> Self {
        Self {
            config,
            table: BTreeMap::new(),
            events,
        }
    }

    /// The config snapshot currently in force.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether any program is still present in the table.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Names of programs currently present in the table.
    pub fn present_programs(&self) -> Vec<String> {
        self.table.keys().cloned().collect()
    }

    /// Starts every program declared with `autostart`.
    pub fn start_initial_processes(&mut self) -> Result<(), ProcessManagerError> {
        let autostart: Vec<String> = self
            .config
            .programs()
            .filter(|(_, spec)| spec.autostart)
            .map(|(name, _)| name.clone())
            .collect();

        let mut first_err = None;
        for name in autostart {
            if let Err(err) = self.start_program(&name) {
                first_err.get_or_insert(err);
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Starts a program's slots up to `numprocs`.
    ///
    /// Running slots are left alone; finished slots are relaunched fresh
    /// (user-initiated, so the retry budget resets); missing slots are
    /// filled. Partial failure leaves successful slots recorded and returns
    /// the first error.
    pub fn start_program(&mut self, name: &str) -> Result<(), ProcessManagerError> {
        let Some(spec) = self.config.program(name).cloned() else {
            self.events
                .warning(format!("Program {name} is not defined in the configuration"));
            return Err(ProcessManagerError::UnknownProgram(name.to_string()));
        };

        let mut first_err = None;

        let entries = self.table.entry(name.to_string()).or_default();
        for entry in entries.iter_mut() {
            if entry.poll() == ProcessStatus::Running {
                continue;
            }
            match ProcessEntry::launch(name, Arc::clone(&spec), 0) {
                Ok(new_entry) => {
                    self.events.info(format!(
                        "Started process {} for program {name}",
                        new_entry.pid()
                    ));
                    *entry = new_entry;
                }
                Err(err) => {
                    self.events.error(err.to_string());
                    first_err.get_or_insert(err);
                }
            }
        }

        let missing = (spec.numprocs as usize).saturating_sub(entries.len());
        for _ in 0..missing {
            match ProcessEntry::launch(name, Arc::clone(&spec), 0) {
                Ok(new_entry) => {
                    self.events.info(format!(
                        "Started process {} for program {name}",
                        new_entry.pid()
                    ));
                    entries.push(new_entry);
                }
                Err(err) => {
                    self.events.error(err.to_string());
                    first_err.get_or_insert(err);
                }
            }
        }

        if entries.is_empty() {
            // Nothing launched at all; do not leave an empty slot list behind.
            self.table.remove(name);
        }

        self.events.info(format!("Started program: {name}"));

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Stops a program: deliver each entry's captured stop signal, wait out
    /// the grace period, kill survivors, and drop the slot list.
    ///
    /// Blocks for at least the spec's `stoptime` when the program is present.
    pub fn stop_program(&mut self, name: &str) -> Result<(), ProcessManagerError> {
        let Some(mut entries) = self.table.remove(name) else {
            self.events.warning(format!("Program {name} is not running"));
            return Ok(());
        };

        for entry in entries.iter_mut() {
            if entry.poll() != ProcessStatus::Running {
                continue;
            }
            if let Err(err) = entry.deliver_stop_signal() {
                self.events.warning(err.to_string());
            }
        }

        let grace = entries
            .iter()
            .map(|entry| entry.spec().stoptime)
            .max()
            .unwrap_or(0);
        thread::sleep(Duration::from_secs(grace));

        for entry in entries.iter_mut() {
            if entry.poll() != ProcessStatus::Running {
                continue;
            }
            self.events.warning(format!(
                "Killed process {} of program {name} after grace period",
                entry.pid()
            ));
            if let Err(err) = entry.force_kill() {
                self.events
                    .error(format!("failed to kill pid {} of {name}: {err}", entry.pid()));
            }
        }

        self.events.info(format!("Stopped program: {name}"));
        Ok(())
    }

    /// Stops then starts a program; the fresh entries carry a reset retry
    /// budget.
    pub fn restart_program(&mut self, name: &str) -> Result<(), ProcessManagerError> {
        self.stop_program(name)?;
        self.start_program(name)
    }

    /// Restarts every program currently present in the table.
    pub fn restart_all_programs(&mut self) -> Result<(), ProcessManagerError> {
        let mut first_err = None;
        for name in self.present_programs() {
            if let Err(err) = self.restart_program(&name) {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Stops every program currently present in the table.
    pub fn stop_all_programs(&mut self) -> Result<(), ProcessManagerError> {
        let mut first_err = None;
        for name in self.present_programs() {
            if let Err(err) = self.stop_program(&name) {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Starts every program declared in the current config.
    pub fn start_all_programs(&mut self) -> Result<(), ProcessManagerError> {
        let mut first_err = None;
        for name in self.config.names() {
            if let Err(err) = self.start_program(&name) {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Produces a consistent snapshot of the table.
    pub fn get_status(&mut self) -> StatusSnapshot {
        let mut programs = BTreeMap::new();
        for (name, entries) in self.table.iter_mut() {
            let views = entries
                .iter_mut()
                .map(|entry| {
                    let status = entry.poll();
                    ProcessView {
                        pid: entry.pid(),
                        cmd: entry.cmd().to_string(),
                        status,
                        restarts: entry.restarts(),
                        uptime: entry.uptime_secs(),
                    }
                })
                .collect();
            programs.insert(name.clone(), views);
        }
        StatusSnapshot { programs }
    }

    /// Reconciles the running fleet against a new config snapshot and swaps
    /// it in.
    ///
    /// Removed programs are stopped; added programs start iff `autostart`;
    /// programs whose spec changed field-wise are fully restarted so the new
    /// spec takes effect; unchanged programs keep their slots (and pids)
    /// undisturbed.
    pub fn update_config(&mut self, new_config: Config) -> Result<(), ProcessManagerError> {
        let old_config = std::mem::replace(&mut self.config, new_config);
        let mut first_err = None;

        for name in old_config.names() {
            if !self.config.contains(&name) {
                if let Err(err) = self.stop_program(&name) {
                    first_err.get_or_insert(err);
                }
            }
        }

        let added: Vec<String> = self
            .config
            .programs()
            .filter(|(name, spec)| !old_config.contains(name) && spec.autostart)
            .map(|(name, _)| name.clone())
            .collect();
        for name in added {
            if let Err(err) = self.start_program(&name) {
                first_err.get_or_insert(err);
            }
        }

        let changed: Vec<String> = self
            .config
            .programs()
            .filter(|(name, spec)| {
                old_config
                    .program(name)
                    .is_some_and(|old_spec| old_spec != *spec)
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in changed {
            if let Err(err) = self.restart_program(&name) {
                first_err.get_or_insert(err);
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Periodic tick: observe exits and apply each entry's autorestart
    /// policy, reincarnating slots while their retry budget lasts.
    pub fn check_and_restart(&mut self) {
        for name in self.present_programs() {
            let slot_count = self.table.get(&name).map_or(0, Vec::len);
            for index in 0..slot_count {
                let action = self.evaluate_slot(&name, index);
                self.apply_tick_action(&name, index, action);
            }
        }
    }

    fn evaluate_slot(&mut self, name: &str, index: usize) -> TickAction {
        let Some(entry) = self.table.get_mut(name).and_then(|e| e.get_mut(index)) else {
            return TickAction::Skip;
        };

        if entry.retired() || entry.poll() == ProcessStatus::Running {
            return TickAction::Skip;
        }

        let spec = Arc::clone(entry.spec());
        let wants_restart = match spec.autorestart {
            RestartPolicy::Never => false,
            RestartPolicy::Always => true,
            // A signal death reports the negated signal number, so negative
            // `exitcodes` entries match it here.
            RestartPolicy::Unexpected => entry
                .exit_code()
                .is_none_or(|code| !spec.exitcodes.contains(&code)),
        };

        if !wants_restart {
            return TickAction::Retire;
        }

        let restarts = entry.restarts();
        if restarts < spec.startretries {
            TickAction::Reincarnate { restarts, spec }
        } else {
            TickAction::Exhausted {
                retries: spec.startretries,
            }
        }
    }

    fn apply_tick_action(&mut self, name: &str, index: usize, action: TickAction) {
        match action {
            TickAction::Skip => {}
            TickAction::Retire => {
                if let Some(entry) = self.table.get_mut(name).and_then(|e| e.get_mut(index)) {
                    debug!(program = name, index, "slot settled, leaving it finished");
                    entry.retire();
                }
            }
            TickAction::Exhausted { retries } => {
                self.events.warning(format!(
                    "Failed to restart {name} after {retries} attempts"
                ));
                if let Some(entry) = self.table.get_mut(name).and_then(|e| e.get_mut(index)) {
                    entry.retire();
                }
            }
            TickAction::Reincarnate { restarts, spec } => {
                match ProcessEntry::launch(name, spec, restarts + 1) {
                    Ok(new_entry) => {
                        self.events.info(format!(
                            "Started process {} for program {name}",
                            new_entry.pid()
                        ));
                        self.events.info(format!(
                            "Restarted process for {name} (PID: {})",
                            new_entry.pid()
                        ));
                        if let Some(slot) =
                            self.table.get_mut(name).and_then(|e| e.get_mut(index))
                        {
                            *slot = new_entry;
                        }
                    }
                    Err(err) => {
                        self.events
                            .error(format!("Failed to restart {name}: {err}"));
                        if let Some(entry) =
                            self.table.get_mut(name).and_then(|e| e.get_mut(index))
                        {
                            entry.retire();
                        }
                    }
                }
            }
        }
    }
}

//! Status views over the process table.
//!
//! [`StatusSnapshot`] is a point-in-time copy handed to external callers;
//! later table mutations never show through it.
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use strum_macros::AsRefStr;

/// Derived state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProcessStatus {
    /// The OS reports the child alive.
    Running,
    /// The child has exited.
    Finished,
}

/// View of one slot, frozen at snapshot time.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessView {
    /// Host pid at launch.
    pub pid: u32,
    /// Command line captured at launch.
    pub cmd: String,
    /// Derived status.
    pub status: ProcessStatus,
    /// Reincarnation count of the slot.
    pub restarts: u32,
    /// Seconds from launch until exit, or until the snapshot while running.
    pub uptime: u64,
}

/// Consistent snapshot of every program present in the table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    /// Slot views per program, slots in launch order.
    pub programs: BTreeMap<String, Vec<ProcessView>>,
}

impl StatusSnapshot {
    /// Views for one program, if it is present.
    pub fn program(&self, name: &str) -> Option<&Vec<ProcessView>> {
        self.programs.get(name)
    }

    /// True when no program is present in the table.
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

/// Renders one program's slot list as an indented block.
pub fn format_program(name: &str, views: &[ProcessView]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{name}:");
    for view in views {
        let _ = writeln!(out, "    PID {}:", view.pid);
        let _ = writeln!(out, "    Command: {}", view.cmd);
        let _ = writeln!(out, "    Status: {}", view.status.as_ref());
        let _ = writeln!(out, "    Restarts: {}", view.restarts);
        let _ = writeln!(out, "    Uptime: {} seconds", view.uptime);
    }
    out
}

/// Renders the whole snapshot, one block per program.
pub fn format_snapshot(snapshot: &StatusSnapshot) -> String {
    let mut out = String::new();
    for (name, views) in &snapshot.programs {
        out.push_str(&format_program(name, views));
    }
    out
}

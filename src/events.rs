//! Event log for the supervisor.
//!
//! Single-writer, append-only record of what the supervision engine did:
//! program starts, stops, restarts, retry exhaustion, reload outcomes. The
//! file is the operator-facing audit trail; the in-memory mirror is what
//! tests assert against.
use chrono::Local;
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::Mutex,
};
use strum_macros::AsRefStr;
use tracing::{error, info, warn};

/// Severity of one event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum EventLevel {
    /// Routine lifecycle event.
    Info,
    /// Degraded but handled condition.
    Warning,
    /// Operation failed.
    Error,
}

/// One timestamped record.
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// Severity.
    pub level: EventLevel,
    /// Rendered message.
    pub message: String,
}

#[derive(Debug)]
struct EventSink {
    file: Option<File>,
    records: Vec<EventRecord>,
}

/// Append-only leveled event log with a single writer.
#[derive(Debug)]
pub struct EventLog {
    sink: Mutex<EventSink>,
}

impl EventLog {
    /// Opens (or creates) the log file in append mode.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            sink: Mutex::new(EventSink {
                file: Some(file),
                records: Vec::new(),
            }),
        })
    }

    /// A log with no backing file. Used by tests.
    pub fn in_memory() -> Self {
        Self {
            sink: Mutex::new(EventSink {
                file: None,
                records: Vec::new(),
            }),
        }
    }

    /// Appends one record.
    pub fn log(&self, level: EventLevel, message: impl Into<String>) {
        let message = message.into();

        match level {
            EventLevel::Info => info!(target: "taskmaster::events", "{message}"),
            EventLevel::Warning => warn!(target: "taskmaster::events", "{message}"),
            EventLevel::Error => error!(target: "taskmaster::events", "{message}"),
        }

        let Ok(mut sink) = self.sink.lock() else {
            return;
        };

        if let Some(file) = sink.file.as_mut() {
            let stamp = Local::now().format("%Y-%m-%d %H:%M:%S,%3f");
            // A full log disk is not a reason to kill the fleet.
            let _ = writeln!(
                file,
                "{stamp} - taskmaster - {} - {message}",
                level.as_ref()
            );
        }

        sink.records.push(EventRecord { level, message });
    }

    /// Appends an info record.
    pub fn info(&self, message: impl Into<String>) {
        self.log(EventLevel::Info, message);
    }

    /// Appends a warning record.
    pub fn warning(&self, message: impl Into<String>) {
        self.log(EventLevel::Warning, message);
    }

    /// Appends an error record.
    pub fn error(&self, message: impl Into<String>) {
        self.log(EventLevel::Error, message);
    }

    /// Snapshot of every record emitted so far.
    pub fn records(&self) -> Vec<EventRecord> {
        self.sink
            .lock()
            .map(|sink| sink.records.clone())
            .unwrap_or_default()
    }

    /// Whether any record contains the fragment.
    pub fn contains(&self, fragment: &str) -> bool {
        self.sink
            .lock()
            .map(|sink| sink.records.iter().any(|r| r.message.contains(fragment)))
            .unwrap_or(false)
    }
}

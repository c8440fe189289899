//! One supervised child process.
//!
//! A [`ProcessEntry`] owns the live [`Child`] handle returned by the launch;
//! liveness is always derived from that handle, never from the pid, which is
//! retained only for display and signal delivery. The entry also captures the
//! [`ProgramSpec`] in force at launch time; stop and restart semantics follow
//! that snapshot even if the manager's config has since been reloaded.
use std::{
    fs::{File, OpenOptions},
    os::unix::process::{CommandExt, ExitStatusExt},
    path::Path,
    process::{Child, Command, ExitStatus, Stdio},
    sync::Arc,
    time::Instant,
};

use nix::{sys::signal, unistd::Pid};
use tracing::{debug, warn};

use crate::{config::ProgramSpec, error::ProcessManagerError, status::ProcessStatus};

/// A live (or recently exited) child of the supervisor.
#[derive(Debug)]
pub struct ProcessEntry {
    child: Child,
    pid: u32,
    program: String,
    cmd: String,
    spec: Arc<ProgramSpec>,
    restarts: u32,
    started_at: Instant,
    ended_at: Option<Instant>,
    exit_status: Option<ExitStatus>,
    retired: bool,
}

fn open_output(program: &str, path: &Path) -> Result<File, ProcessManagerError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ProcessManagerError::OutputFile {
            program: program.to_string(),
            path: path.display().to_string(),
            source: e,
        })
}

impl ProcessEntry {
    /// Launches one child under `spec` and records it.
    ///
    /// The child environment is the host environment overlaid with the
    /// spec's variables (spec wins). The file-creation mask is applied on
    /// the child side of the fork only; the parent mask is never touched.
    pub fn launch(
        program: &str,
        spec: Arc<ProgramSpec>,
        restarts: u32,
    ) -> Result<Self, ProcessManagerError> {
        let stdout = open_output(program, &spec.stdout)?;
        let stderr = open_output(program, &spec.stderr)?;

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&spec.cmd)
            .current_dir(&spec.workingdir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let mask = spec.umask as libc::mode_t;
        unsafe {
            command.pre_exec(move || {
                libc::umask(mask);
                Ok(())
            });
        }

        let child = command.spawn().map_err(|e| ProcessManagerError::Launch {
            program: program.to_string(),
            source: e,
        })?;

        let pid = child.id();
        debug!(program, pid, "launched child");

        Ok(Self {
            child,
            pid,
            program: program.to_string(),
            cmd: spec.cmd.clone(),
            spec,
            restarts,
            started_at: Instant::now(),
            ended_at: None,
            exit_status: None,
            retired: false,
        })
    }

    /// Observes the child's exit state and returns the derived status.
    ///
    /// The first observed exit pins `ended_at`; later polls return the same
    /// cached status.
    pub fn poll(&mut self) -> ProcessStatus {
        if self.exit_status.is_none() {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    debug!(program = %self.program, pid = self.pid, ?status, "child exited");
                    self.exit_status = Some(status);
                    self.ended_at = Some(Instant::now());
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(program = %self.program, pid = self.pid, "failed to poll child: {err}");
                }
            }
        }
        self.status()
    }

    /// Status derived from the last observation, without polling.
    pub fn status(&self) -> ProcessStatus {
        if self.exit_status.is_none() {
            ProcessStatus::Running
        } else {
            ProcessStatus::Finished
        }
    }

    /// Sends the entry's captured stop signal to the child.
    pub fn deliver_stop_signal(&self) -> Result<(), ProcessManagerError> {
        signal::kill(Pid::from_raw(self.pid as i32), self.spec.stopsignal).map_err(
            |errno| ProcessManagerError::Signal {
                program: self.program.clone(),
                pid: self.pid,
                source: errno,
            },
        )
    }

    /// Unconditionally kills and reaps the child.
    pub fn force_kill(&mut self) -> std::io::Result<()> {
        self.child.kill()?;
        let status = self.child.wait()?;
        if self.exit_status.is_none() {
            self.exit_status = Some(status);
            self.ended_at = Some(Instant::now());
        }
        Ok(())
    }

    /// Host pid, for display and signaling only.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Command line captured at launch.
    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    /// Spec snapshot captured at launch.
    pub fn spec(&self) -> &Arc<ProgramSpec> {
        &self.spec
    }

    /// How many times this slot has been reincarnated.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Whether the autorestart path has finished with this slot.
    pub fn retired(&self) -> bool {
        self.retired
    }

    /// Marks the slot as settled; the autorestart path skips it from now on.
    pub fn retire(&mut self) {
        self.retired = true;
    }

    /// Exit code of the child: the raw code for a normal exit, or the
    /// negated signal number for a signal death. Negative `exitcodes`
    /// entries can therefore mark a signal death as expected.
    pub fn exit_code(&self) -> Option<i32> {
        let status = self.exit_status?;
        status.code().or_else(|| status.signal().map(|sig| -sig))
    }

    /// Seconds between launch and exit (or now, while running).
    pub fn uptime_secs(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Instant::now);
        end.duration_since(self.started_at).as_secs()
    }
}

//! Interactive control shell.
//!
//! Reads commands from stdin and delegates each one to the supervisor. The
//! shell holds no supervision state of its own; it is a thin adapter over
//! the control surface in [`crate::supervisor`].
use std::{
    io::{self, BufRead, Write},
    sync::Arc,
};

use tracing::debug;

use crate::{
    status::{format_program, format_snapshot},
    supervisor::Supervisor,
};

const INTRO: &str =
    "Welcome to the taskmaster control shell. Type 'help' to list commands.";
const PROMPT: &str = "(taskmaster) ";

/// Command loop bound to one supervisor.
pub struct ControlShell {
    supervisor: Arc<Supervisor>,
}

impl ControlShell {
    /// Creates a shell delegating to `supervisor`.
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self { supervisor }
    }

    /// Runs the command loop until `quit`, `exit`, or end of input.
    pub fn run(&self) -> io::Result<()> {
        println!("{INTRO}");

        let stdin = io::stdin();
        let mut line = String::new();

        loop {
            print!("{PROMPT}");
            io::stdout().flush()?;

            line.clear();
            if stdin.lock().read_line(&mut line)? == 0 {
                // End of input behaves like quit.
                self.quit();
                return Ok(());
            }

            if !self.dispatch(line.trim()) {
                return Ok(());
            }
        }
    }

    /// Handles one command line; returns `false` when the loop should end.
    pub fn dispatch(&self, line: &str) -> bool {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            return true;
        };
        let arg = parts.next();
        debug!(command, ?arg, "shell command");

        match command {
            "status" => self.cmd_status(arg),
            "start" => self.cmd_start(arg),
            "stop" => self.cmd_stop(arg),
            "restart" => self.cmd_restart(arg),
            "reload" => self.cmd_reload(),
            "quit" | "exit" => {
                self.quit();
                return false;
            }
            "help" | "?" => self.cmd_help(),
            other => {
                println!("Unknown command: {other}. Type 'help' to list commands.");
            }
        }
        true
    }

    fn cmd_status(&self, arg: Option<&str>) {
        let snapshot = match self.supervisor.status() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                eprintln!("status failed: {err}");
                return;
            }
        };

        match arg {
            None => {
                if snapshot.is_empty() {
                    println!("No programs are running");
                } else {
                    print!("{}", format_snapshot(&snapshot));
                }
            }
            Some(name) => match snapshot.program(name) {
                Some(views) => print!("{}", format_program(name, views)),
                None => self.print_missing(name),
            },
        }
    }

    fn cmd_start(&self, arg: Option<&str>) {
        match arg {
            None => println!("Please specify a program name"),
            Some("all") => {
                if let Err(err) = self.supervisor.start_all_programs() {
                    println!("{err}");
                }
            }
            Some(name) => {
                if let Err(err) = self.supervisor.start_program(name) {
                    println!("{err}");
                }
                self.print_program_status(name);
            }
        }
    }

    fn cmd_stop(&self, arg: Option<&str>) {
        match arg {
            None => println!("Please specify a program name"),
            Some("all") => {
                if let Err(err) = self.supervisor.stop_all_programs() {
                    println!("{err}");
                }
            }
            Some(name) => {
                if let Err(err) = self.supervisor.stop_program(name) {
                    println!("{err}");
                }
                self.print_program_status(name);
            }
        }
    }

    fn cmd_restart(&self, arg: Option<&str>) {
        match arg {
            None => println!("Please specify a program name"),
            Some("all") => {
                if let Err(err) = self.supervisor.restart_all_programs() {
                    println!("{err}");
                }
            }
            Some(name) => {
                if let Err(err) = self.supervisor.restart_program(name) {
                    println!("{err}");
                }
                self.print_program_status(name);
            }
        }
    }

    fn cmd_reload(&self) {
        self.supervisor.reload_config();
        println!("Configuration reloaded. Current status:");
        self.cmd_status(None);
    }

    fn cmd_help(&self) {
        println!("Commands:");
        println!("  status [name]        show the status of all programs, or one");
        println!("  start <name|all>     start a program, or every declared program");
        println!("  stop <name|all>      stop a program, or every running program");
        println!("  restart <name|all>   restart a program, or every running program");
        println!("  reload               reload the configuration file");
        println!("  quit | exit          stop everything and leave");
    }

    fn quit(&self) {
        println!("Exiting taskmaster...");
        if let Err(err) = self.supervisor.shutdown() {
            eprintln!("shutdown failed: {err}");
        }
    }

    fn print_program_status(&self, name: &str) {
        let Ok(snapshot) = self.supervisor.status() else {
            return;
        };
        match snapshot.program(name) {
            Some(views) => {
                println!("Status of {name}:");
                print!("{}", format_program(name, views));
            }
            None => self.print_missing(name),
        }
    }

    /// A program absent from the table is either declared but not started,
    /// or not declared at all.
    fn print_missing(&self, name: &str) {
        if self.is_declared(name) {
            println!("{name}: not started");
        } else {
            println!("Program {name} not found");
        }
    }

    fn is_declared(&self, name: &str) -> bool {
        self.supervisor
            .program_names()
            .map(|names| names.iter().any(|n| n == name))
            .unwrap_or(false)
    }
}

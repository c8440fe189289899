use std::{process, sync::Arc};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use taskmaster::{
    cli::Cli,
    error::SupervisorError,
    events::EventLog,
    shell::ControlShell,
    supervisor::Supervisor,
};

fn main() {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // Missing or malformed arguments map to exit code 1.
            let _ = err.print();
            process::exit(1);
        }
    };

    init_logging(&args);

    if let Err(err) = run(args) {
        eprintln!("taskmaster: {err}");
        process::exit(1);
    }
}

fn run(args: Cli) -> Result<(), SupervisorError> {
    let events = Arc::new(EventLog::open(&args.log_file)?);
    let supervisor = Arc::new(Supervisor::new(args.config, events)?);

    supervisor.start()?;
    ControlShell::new(Arc::clone(&supervisor)).run()?;

    Ok(())
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        // Keep the interactive shell quiet unless asked otherwise.
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

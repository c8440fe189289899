//! Error handling for taskmaster.
use thiserror::Error;

/// Errors produced while loading and validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or is not well-formed YAML.
    #[error("invalid config syntax: {0}")]
    Syntax(String),

    /// The document shape or a field type does not match the schema.
    #[error("config schema mismatch: {0}")]
    Schema(String),

    /// A value failed semantic validation.
    #[error("invalid value for program '{program}': {reason}")]
    Validation {
        /// The program whose spec is invalid.
        program: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The config references an environment variable that is not set.
    #[error("missing environment variable '{0}' referenced in config")]
    MissingEnvVar(String),
}

/// Defines all possible errors that can occur in the process manager.
#[derive(Debug, Error)]
pub enum ProcessManagerError {
    /// Error spawning a child process.
    #[error("failed to launch program '{program}': {source}")]
    Launch {
        /// The program that failed to launch.
        program: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error opening a program's stdout or stderr file.
    #[error("failed to open output file '{path}' for program '{program}': {source}")]
    OutputFile {
        /// The program whose output file could not be opened.
        program: String,
        /// The path that could not be opened.
        path: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error delivering a signal to a child process.
    #[error("failed to signal pid {pid} of program '{program}': {source}")]
    Signal {
        /// The program whose child could not be signaled.
        program: String,
        /// The target pid.
        pid: u32,
        /// The underlying errno.
        #[source]
        source: nix::errno::Errno,
    },

    /// A request named a program absent from the current configuration.
    #[error("program '{0}' is not defined in the configuration")]
    UnknownProgram(String),

    /// Error for poisoned mutex.
    #[error("mutex is poisoned: {0}")]
    MutexPoisonError(String),
}

/// Implement the `From` trait to convert a `std::sync::PoisonError` into a `ProcessManagerError`.
impl<T> From<std::sync::PoisonError<T>> for ProcessManagerError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        ProcessManagerError::MutexPoisonError(err.to_string())
    }
}

/// Supervisor errors.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Process management error.
    #[error(transparent)]
    Process(#[from] ProcessManagerError),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

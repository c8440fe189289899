//! Configuration management for taskmaster.
//!
//! Loads the YAML configuration file, expands environment variable
//! references, validates every field, applies defaults, and produces an
//! immutable [`Config`] snapshot. Snapshots compare field-wise; that equality
//! is what drives reload decisions.
use regex::Regex;
use serde::Deserialize;
use std::{
    collections::{BTreeMap, HashMap},
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use strum_macros::{AsRefStr, EnumString};

use nix::sys::signal::Signal;

use crate::error::ConfigError;

/// Restart policy applied when a child exits on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RestartPolicy {
    /// Reincarnate the slot on every exit.
    Always,
    /// Never reincarnate; the slot stays finished.
    Never,
    /// Reincarnate only when the exit code is not in `exitcodes`.
    Unexpected,
}

/// Canonical, validated declaration of one program.
///
/// Equality is field-wise; two specs that compare equal are interchangeable
/// and a reload leaves the program's slots undisturbed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSpec {
    /// Shell command line, run through `sh -c`.
    pub cmd: String,
    /// Number of instances to keep.
    pub numprocs: u32,
    /// File-creation mask applied in the child, stored as parsed octal bits.
    pub umask: u32,
    /// Working directory for the children.
    pub workingdir: PathBuf,
    /// Launch at supervisor startup.
    pub autostart: bool,
    /// Restart policy for self-initiated exits.
    pub autorestart: RestartPolicy,
    /// Exit codes considered expected under the `unexpected` policy.
    pub exitcodes: Vec<i32>,
    /// Maximum reincarnations of a slot before giving up.
    pub startretries: u32,
    /// Seconds a child must stay up to count as successfully started.
    pub starttime: u64,
    /// Signal delivered by the stop protocol.
    pub stopsignal: Signal,
    /// Grace period in seconds between the stop signal and the forced kill.
    pub stoptime: u64,
    /// File receiving the children's stdout (append mode).
    pub stdout: PathBuf,
    /// File receiving the children's stderr (append mode).
    pub stderr: PathBuf,
    /// Extra environment variables; they win over the host environment.
    pub env: BTreeMap<String, String>,
}

impl ProgramSpec {
    /// The mask rendered back in its three-octal-digit config form.
    pub fn umask_text(&self) -> String {
        format!("{:03o}", self.umask)
    }
}

/// Immutable snapshot of the whole configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    programs: BTreeMap<String, Arc<ProgramSpec>>,
}

impl Config {
    /// Looks up a program spec by name.
    pub fn program(&self, name: &str) -> Option<&Arc<ProgramSpec>> {
        self.programs.get(name)
    }

    /// Whether the config declares the program.
    pub fn contains(&self, name: &str) -> bool {
        self.programs.contains_key(name)
    }

    /// Iterates program names and specs in name order.
    pub fn programs(&self) -> impl Iterator<Item = (&String, &Arc<ProgramSpec>)> {
        self.programs.iter()
    }

    /// Program names in name order.
    pub fn names(&self) -> Vec<String> {
        self.programs.keys().cloned().collect()
    }

    /// Computes the reconciliation diff from `self` to `new`.
    pub fn diff(&self, new: &Config) -> ConfigDiff {
        let mut diff = ConfigDiff::default();

        for name in self.programs.keys() {
            if !new.programs.contains_key(name) {
                diff.removed.push(name.clone());
            }
        }

        for (name, new_spec) in &new.programs {
            match self.programs.get(name) {
                None => diff.added.push(name.clone()),
                Some(old_spec) if old_spec != new_spec => {
                    diff.changed.push(ProgramChange {
                        name: name.clone(),
                        fields: field_changes(old_spec, new_spec),
                    });
                }
                Some(_) => {}
            }
        }

        diff
    }
}

/// One field of a changed program, with old and new rendered values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    /// Field name as written in the config file.
    pub field: &'static str,
    /// Previous value.
    pub old: String,
    /// New value.
    pub new: String,
}

/// A program present in both configs whose spec changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramChange {
    /// Program name.
    pub name: String,
    /// Per-field old -> new changes.
    pub fields: Vec<FieldChange>,
}

/// Human-readable reconciliation summary emitted on reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDiff {
    /// Programs only in the new config.
    pub added: Vec<String>,
    /// Programs only in the old config.
    pub removed: Vec<String>,
    /// Programs whose spec changed field-wise.
    pub changed: Vec<ProgramChange>,
}

impl ConfigDiff {
    /// True when the two configs compared equal program by program.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// One line per affected program, in removed/added/changed order.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for name in &self.removed {
            lines.push(format!("removed program: {name}"));
        }
        for name in &self.added {
            lines.push(format!("added program: {name}"));
        }
        for change in &self.changed {
            let fields: Vec<String> = change
                .fields
                .iter()
                .map(|f| format!("{}: {} -> {}", f.field, f.old, f.new))
                .collect();
            lines.push(format!(
                "changed program: {} ({})",
                change.name,
                fields.join(", ")
            ));
        }
        lines
    }
}

impl fmt::Display for ConfigDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lines().join("\n"))
    }
}

fn field_changes(old: &ProgramSpec, new: &ProgramSpec) -> Vec<FieldChange> {
    let mut fields = Vec::new();
    let mut push = |field: &'static str, old: String, new: String| {
        if old != new {
            fields.push(FieldChange { field, old, new });
        }
    };

    push("cmd", old.cmd.clone(), new.cmd.clone());
    push("numprocs", old.numprocs.to_string(), new.numprocs.to_string());
    push("umask", old.umask_text(), new.umask_text());
    push(
        "workingdir",
        old.workingdir.display().to_string(),
        new.workingdir.display().to_string(),
    );
    push("autostart", old.autostart.to_string(), new.autostart.to_string());
    push(
        "autorestart",
        old.autorestart.as_ref().to_string(),
        new.autorestart.as_ref().to_string(),
    );
    push("exitcodes", format!("{:?}", old.exitcodes), format!("{:?}", new.exitcodes));
    push(
        "startretries",
        old.startretries.to_string(),
        new.startretries.to_string(),
    );
    push("starttime", old.starttime.to_string(), new.starttime.to_string());
    push(
        "stopsignal",
        old.stopsignal.as_str().to_string(),
        new.stopsignal.as_str().to_string(),
    );
    push("stoptime", old.stoptime.to_string(), new.stoptime.to_string());
    push(
        "stdout",
        old.stdout.display().to_string(),
        new.stdout.display().to_string(),
    );
    push(
        "stderr",
        old.stderr.display().to_string(),
        new.stderr.display().to_string(),
    );
    push("env", format!("{:?}", old.env), format!("{:?}", new.env));

    fields
}

/// Raw document shape before validation and defaulting.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    programs: HashMap<String, RawProgram>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProgram {
    cmd: String,
    numprocs: Option<u32>,
    umask: Option<String>,
    workingdir: Option<String>,
    autostart: Option<bool>,
    autorestart: Option<String>,
    exitcodes: Option<Vec<i64>>,
    startretries: Option<u32>,
    starttime: Option<u64>,
    stopsignal: Option<String>,
    stoptime: Option<u64>,
    stdout: Option<String>,
    stderr: Option<String>,
    env: Option<BTreeMap<String, String>>,
}

/// Expands `$VAR` / `${VAR}` references from the host environment.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?")
        .expect("env reference pattern is valid");

    for caps in re.captures_iter(input) {
        let var_name = &caps[1];
        if env::var(var_name).is_err() {
            return Err(ConfigError::MissingEnvVar(var_name.to_string()));
        }
    }

    let result = re.replace_all(input, |caps: &regex::Captures| {
        env::var(&caps[1]).unwrap_or_default()
    });
    Ok(result.to_string())
}

fn parse_umask(name: &str, raw: &str) -> Result<u32, ConfigError> {
    if raw.len() != 3 || !raw.chars().all(|c| ('0'..='7').contains(&c)) {
        return Err(ConfigError::Validation {
            program: name.to_string(),
            reason: format!("umask must be exactly three octal digits, got '{raw}'"),
        });
    }
    u32::from_str_radix(raw, 8).map_err(|_| ConfigError::Validation {
        program: name.to_string(),
        reason: format!("umask must be exactly three octal digits, got '{raw}'"),
    })
}

fn parse_stop_signal(name: &str, raw: &str) -> Result<Signal, ConfigError> {
    let upper = raw.trim().to_ascii_uppercase();
    let full = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    };

    Signal::from_str(&full).map_err(|_| ConfigError::Validation {
        program: name.to_string(),
        reason: format!("unknown signal name '{raw}'"),
    })
}

fn validate_output_path(name: &str, field: &str, raw: &str) -> Result<PathBuf, ConfigError> {
    if raw == "/dev/null" {
        return Ok(PathBuf::from(raw));
    }

    let path = Path::new(raw);
    let parent = match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Path::new("."),
        Some(p) => p,
        None => {
            return Err(ConfigError::Validation {
                program: name.to_string(),
                reason: format!("{field} path '{raw}' has no parent directory"),
            });
        }
    };

    if !parent.is_dir() {
        return Err(ConfigError::Validation {
            program: name.to_string(),
            reason: format!(
                "{field} parent directory does not exist: {}",
                parent.display()
            ),
        });
    }

    Ok(path.to_path_buf())
}

/// Validates one raw program and fills in the defaults for omitted fields.
fn build_spec(name: &str, raw: RawProgram) -> Result<ProgramSpec, ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::Validation {
            program: name.to_string(),
            reason: "program name must not be empty".into(),
        });
    }

    if raw.cmd.trim().is_empty() {
        return Err(ConfigError::Validation {
            program: name.to_string(),
            reason: "cmd must not be empty".into(),
        });
    }

    let numprocs = raw.numprocs.unwrap_or(1);
    if numprocs < 1 {
        return Err(ConfigError::Validation {
            program: name.to_string(),
            reason: "numprocs must be at least 1".into(),
        });
    }

    let umask = match raw.umask.as_deref() {
        Some(text) => parse_umask(name, text)?,
        None => 0o022,
    };

    let workingdir = PathBuf::from(raw.workingdir.as_deref().unwrap_or("."));
    if !workingdir.is_dir() {
        return Err(ConfigError::Validation {
            program: name.to_string(),
            reason: format!("workingdir does not exist: {}", workingdir.display()),
        });
    }

    let autorestart = match raw.autorestart.as_deref() {
        Some(text) => {
            RestartPolicy::from_str(text).map_err(|_| ConfigError::Validation {
                program: name.to_string(),
                reason: format!(
                    "autorestart must be one of always/never/unexpected, got '{text}'"
                ),
            })?
        }
        None => RestartPolicy::Unexpected,
    };

    let exitcodes = match raw.exitcodes {
        Some(codes) => {
            let mut out = Vec::with_capacity(codes.len());
            for code in codes {
                if !(-128..=255).contains(&code) {
                    return Err(ConfigError::Validation {
                        program: name.to_string(),
                        reason: format!("exit code {code} outside [-128, 255]"),
                    });
                }
                out.push(code as i32);
            }
            out
        }
        None => vec![0],
    };

    let stopsignal = match raw.stopsignal.as_deref() {
        Some(text) => parse_stop_signal(name, text)?,
        None => Signal::SIGTERM,
    };

    let stdout = validate_output_path(name, "stdout", raw.stdout.as_deref().unwrap_or("/dev/null"))?;
    let stderr = validate_output_path(name, "stderr", raw.stderr.as_deref().unwrap_or("/dev/null"))?;

    Ok(ProgramSpec {
        cmd: raw.cmd,
        numprocs,
        umask,
        workingdir,
        autostart: raw.autostart.unwrap_or(true),
        autorestart,
        exitcodes,
        startretries: raw.startretries.unwrap_or(3),
        starttime: raw.starttime.unwrap_or(5),
        stopsignal,
        stoptime: raw.stoptime.unwrap_or(10),
        stdout,
        stderr,
        env: raw.env.unwrap_or_default(),
    })
}

/// Parses a configuration document from a string.
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let expanded = expand_env_vars(content)?;

    let value: serde_yaml::Value =
        serde_yaml::from_str(&expanded).map_err(|e| ConfigError::Syntax(e.to_string()))?;

    let raw: RawConfig =
        serde_yaml::from_value(value).map_err(|e| ConfigError::Schema(e.to_string()))?;

    let mut programs = BTreeMap::new();
    for (name, raw_program) in raw.programs {
        let spec = build_spec(&name, raw_program)?;
        programs.insert(name, Arc::new(spec));
    }

    Ok(Config { programs })
}

/// Loads and parses the configuration file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::Syntax(format!("{} ({})", e, path.display())))?;
    parse_config_str(&content)
}

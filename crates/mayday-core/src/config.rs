//! Dump configuration: which files and commands to collect, and how.
//!
//! The document format is the JSON used by existing mayday deployments:
//!
//! ```json
//! {
//!   "Files":    [{"Name": "/etc/os-release"}, {"Name": "/etc/localtime", "Link": "/usr/share/zoneinfo/UTC"}],
//!   "Commands": [{"Args": ["uname", "-a"], "Link": "uname"}]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::runner::RunnerConfig;

/// Environment variable that overrides the `--config-file` flag.
pub const CONFIG_ENV_VAR: &str = "MAYDAY_CONFIG_FILE";

/// Configuration path used when neither flag nor environment say otherwise.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/mayday.conf";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read configuration {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A host file to collect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    /// Path on the host; also the entry name inside the archive.
    #[serde(rename = "Name", alias = "name")]
    pub name: String,

    /// Store a symlink to this target instead of the file content.
    #[serde(
        rename = "Link",
        alias = "link",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub link: Option<String>,
}

impl FileSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            link: None,
        }
    }

    /// The link target, treating an empty string as unset.
    pub fn link(&self) -> Option<&str> {
        self.link.as_deref().filter(|l| !l.is_empty())
    }
}

/// A command whose output is collected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Argument vector; the first element is the program.
    #[serde(rename = "Args", alias = "args")]
    pub args: Vec<String>,

    /// Archive path for the output. Derived from `args` when unset.
    #[serde(
        rename = "Link",
        alias = "link",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub link: Option<String>,
}

impl CommandSpec {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            link: None,
        }
    }

    /// The configured archive path, treating an empty string as unset.
    pub fn link(&self) -> Option<&str> {
        self.link.as_deref().filter(|l| !l.is_empty())
    }
}

/// Operator-supplied collection list. Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "Files", alias = "files", default)]
    pub files: Vec<FileSpec>,

    #[serde(rename = "Commands", alias = "commands", default)]
    pub commands: Vec<CommandSpec>,
}

impl Config {
    /// Read and parse the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration document held in memory.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject entries that can never produce an archive entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(pos) = self.files.iter().position(|f| f.name.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("file #{pos} has an empty name")));
        }
        if let Some(pos) = self.commands.iter().position(|c| c.args.is_empty()) {
            return Err(ConfigError::Invalid(format!("command #{pos} has no arguments")));
        }
        Ok(())
    }
}

/// Pick the configuration path: a non-empty environment value wins over
/// the flag. Only the part of the environment value before the first `=`
/// is used.
pub fn resolve_config_path(env_value: Option<&str>, flag: &Path) -> PathBuf {
    env_value
        .and_then(|raw| raw.split('=').next())
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| flag.to_path_buf())
}

/// What to do when a unit cannot be collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Stop the dump.
    Abort,
    /// Log a warning and leave the unit out.
    Skip,
}

/// Per-category failure handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePolicy {
    /// Files that cannot be opened, stat'd or read.
    pub file_errors: OnError,

    /// Commands that cannot be spawned (journals and pod logs included).
    pub command_errors: OnError,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            file_errors: OnError::Abort,
            command_errors: OnError::Skip,
        }
    }
}

/// Options for a single dump run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpOptions {
    /// Include running pod logs. Pod logs may contain sensitive data.
    pub danger: bool,

    pub failure_policy: FailurePolicy,

    pub runner: RunnerConfig,

    /// Directory receiving `mayday<timestamp>.tar.gz`.
    pub output_dir: PathBuf,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            danger: false,
            failure_policy: FailurePolicy::default(),
            runner: RunnerConfig::default(),
            output_dir: std::env::temp_dir(),
        }
    }
}

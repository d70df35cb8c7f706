//! Records handed over by source discovery.
//!
//! Discovery itself lives outside this crate; these are the shapes it
//! produces and the orchestrator consumes.

use serde::{Deserialize, Serialize};

/// A systemd unit whose journal is collected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    /// Unit name, e.g. `docker.service`.
    pub unit: String,
}

impl Journal {
    pub fn new(unit: impl Into<String>) -> Self {
        Self { unit: unit.into() }
    }

    /// Path of this journal inside the archive.
    pub fn archive_name(&self) -> String {
        format!("journals/{}.log", self.unit)
    }

    /// Command that prints this unit's journal.
    pub fn argv(&self) -> Vec<String> {
        vec![
            "journalctl".to_string(),
            "--no-pager".to_string(),
            "-u".to_string(),
            self.unit.clone(),
        ]
    }
}

/// Lifecycle state of an rkt pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PodState {
    Embryo,
    Preparing,
    AbortedPrepare,
    Prepared,
    Running,
    Deleting,
    Exited,
    Garbage,
    Unknown,
}

/// A pod reported by the container runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    /// Pod UUID.
    pub id: String,

    /// Current state.
    pub state: PodState,

    /// Names of the apps running in the pod.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apps: Vec<String>,
}

impl Pod {
    pub fn new(id: impl Into<String>, state: PodState) -> Self {
        Self {
            id: id.into(),
            state,
            apps: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == PodState::Running
    }

    /// Path of the pod record inside the archive.
    pub fn archive_name(&self) -> String {
        format!("rkt/{}.json", self.id)
    }

    /// Path of the pod's journal inside the archive (danger mode only).
    pub fn log_archive_name(&self) -> String {
        format!("/rkt/{}.log", self.id)
    }

    /// Command that prints the pod's journal from its machine namespace.
    pub fn log_argv(&self) -> Vec<String> {
        vec![
            "journalctl".to_string(),
            "-M".to_string(),
            format!("rkt-{}", self.id),
        ]
    }
}

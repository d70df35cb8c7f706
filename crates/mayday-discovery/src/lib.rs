//! Host source discovery for mayday.
//!
//! Finds the systemd services whose journals are collected and the rkt pods
//! present on the host. Each source sits behind an async trait so the dump
//! pipeline can be driven by the real host tools or by in-memory fakes.

pub mod fakes;
pub mod rkt;
pub mod systemd;

use async_trait::async_trait;
use mayday_core::{ExitOutcome, Journal, Pod, RunnerError};
use thiserror::Error;

pub use rkt::{parse_pod_list, RktPods};
pub use systemd::{parse_unit_list, SystemdJournals};

/// Discovery failures.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The discovery tool could not be started.
    #[error("failed to run discovery command: {0}")]
    Runner(#[from] RunnerError),

    /// The discovery tool ran but did not succeed.
    #[error("{tool} failed: {status}")]
    Tool { tool: String, status: ExitOutcome },

    /// The discovery tool's output could not be understood.
    #[error("could not parse {tool} output: {reason}")]
    Parse { tool: String, reason: String },
}

pub type DiscoveryResult<T> = std::result::Result<T, DiscoveryError>;

/// Source of journals to collect.
#[async_trait]
pub trait JournalSource: Send + Sync {
    /// Every service unit known to the init system.
    async fn list_journals(&self) -> DiscoveryResult<Vec<Journal>>;
}

/// Source of container pods to collect.
#[async_trait]
pub trait PodSource: Send + Sync {
    /// Every pod the runtime knows about, in any state.
    async fn list_pods(&self) -> DiscoveryResult<Vec<Pod>>;
}

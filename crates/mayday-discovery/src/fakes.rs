//! In-memory fakes for discovery traits (testing only)

use async_trait::async_trait;
use mayday_core::{ExitOutcome, Journal, Pod};

use crate::{DiscoveryError, DiscoveryResult, JournalSource, PodSource};

/// Journal source returning a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticJournals {
    journals: Vec<Journal>,
}

impl StaticJournals {
    pub fn new<I, S>(units: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            journals: units.into_iter().map(Journal::new).collect(),
        }
    }
}

#[async_trait]
impl JournalSource for StaticJournals {
    async fn list_journals(&self) -> DiscoveryResult<Vec<Journal>> {
        Ok(self.journals.clone())
    }
}

/// Pod source returning a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticPods {
    pods: Vec<Pod>,
}

impl StaticPods {
    pub fn new(pods: Vec<Pod>) -> Self {
        Self { pods }
    }
}

#[async_trait]
impl PodSource for StaticPods {
    async fn list_pods(&self) -> DiscoveryResult<Vec<Pod>> {
        Ok(self.pods.clone())
    }
}

/// Pod source whose client always fails, as when rkt is missing or the
/// caller lacks permission.
#[derive(Debug, Clone, Default)]
pub struct FailingPods;

#[async_trait]
impl PodSource for FailingPods {
    async fn list_pods(&self) -> DiscoveryResult<Vec<Pod>> {
        Err(DiscoveryError::Tool {
            tool: "rkt".to_string(),
            status: ExitOutcome::Exited(254),
        })
    }
}

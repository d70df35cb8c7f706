//! Pod discovery through the rkt client.

use async_trait::async_trait;
use mayday_core::{CommandRunner, Pod, PodState};
use serde::Deserialize;
use tracing::debug;

use crate::{DiscoveryError, DiscoveryResult, PodSource};

const RKT: &str = "rkt";

/// One element of `rkt list --format=json`. Unlisted fields are ignored.
#[derive(Debug, Deserialize)]
struct RktPod {
    name: String,
    state: String,
    #[serde(default)]
    app_names: Vec<String>,
}

impl From<RktPod> for Pod {
    fn from(raw: RktPod) -> Self {
        Pod {
            id: raw.name,
            state: parse_state(&raw.state),
            apps: raw.app_names,
        }
    }
}

fn parse_state(state: &str) -> PodState {
    match state {
        "embryo" => PodState::Embryo,
        "preparing" => PodState::Preparing,
        "aborted prepare" => PodState::AbortedPrepare,
        "prepared" => PodState::Prepared,
        "running" => PodState::Running,
        "deleting" => PodState::Deleting,
        "exited" => PodState::Exited,
        "garbage" => PodState::Garbage,
        _ => PodState::Unknown,
    }
}

/// Lists pods with `rkt list --format=json`.
#[derive(Debug, Clone)]
pub struct RktPods {
    runner: CommandRunner,
}

impl RktPods {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl PodSource for RktPods {
    async fn list_pods(&self) -> DiscoveryResult<Vec<Pod>> {
        let argv = vec![RKT.to_string(), "list".to_string(), "--format=json".to_string()];
        let out = self.runner.run(&argv).await?;
        if !out.status.success() {
            return Err(DiscoveryError::Tool {
                tool: RKT.to_string(),
                status: out.status,
            });
        }

        let pods = parse_pod_list(&out.output)?;
        debug!(count = pods.len(), "Discovered rkt pods");
        Ok(pods)
    }
}

/// Parse `rkt list --format=json` output. Empty output means no pods.
pub fn parse_pod_list(output: &[u8]) -> DiscoveryResult<Vec<Pod>> {
    if output.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    // rkt prints `null` rather than `[]` when it has no pods.
    let raw: Option<Vec<RktPod>> =
        serde_json::from_slice(output).map_err(|e| DiscoveryError::Parse {
            tool: RKT.to_string(),
            reason: e.to_string(),
        })?;

    Ok(raw.unwrap_or_default().into_iter().map(Pod::from).collect())
}

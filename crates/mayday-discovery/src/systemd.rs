//! Journal discovery through `systemctl`.

use async_trait::async_trait;
use mayday_core::{CommandRunner, Journal};
use tracing::debug;

use crate::{DiscoveryError, DiscoveryResult, JournalSource};

const SYSTEMCTL: &str = "systemctl";

/// Lists service units with `systemctl` and maps each to its journal.
#[derive(Debug, Clone)]
pub struct SystemdJournals {
    runner: CommandRunner,
}

impl SystemdJournals {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    fn argv() -> Vec<String> {
        [
            SYSTEMCTL,
            "list-units",
            "--type=service",
            "--all",
            "--no-legend",
            "--no-pager",
            "--plain",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

#[async_trait]
impl JournalSource for SystemdJournals {
    async fn list_journals(&self) -> DiscoveryResult<Vec<Journal>> {
        let out = self.runner.run(&Self::argv()).await?;
        if !out.status.success() {
            return Err(DiscoveryError::Tool {
                tool: SYSTEMCTL.to_string(),
                status: out.status,
            });
        }

        let journals = parse_unit_list(&String::from_utf8_lossy(&out.output));
        debug!(count = journals.len(), "Discovered systemd journals");
        Ok(journals)
    }
}

/// Parse `systemctl list-units --plain --no-legend` output.
///
/// The first column of each line is the unit name; only `.service` units
/// are kept, in listing order.
pub fn parse_unit_list(output: &str) -> Vec<Journal> {
    output
        .lines()
        // Failed units are prefixed with a status glyph on some versions.
        .filter_map(|line| {
            line.split_whitespace()
                .find(|token| token.starts_with(|c: char| c.is_ascii_alphanumeric()))
        })
        .filter(|unit| unit.ends_with(".service") && unit.len() > ".service".len())
        .map(Journal::new)
        .collect()
}

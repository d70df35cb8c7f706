//! Collection orchestration: build the ordered unit list, then drive it
//! into the archive one unit at a time.

use std::collections::HashSet;
use std::io::Write;
use std::time::SystemTime;

use tracing::warn;

use crate::archive::{normalize_name, ArchiveWriter};
use crate::config::{Config, DumpOptions, FailurePolicy, OnError};
use crate::error::Result;
use crate::obs;
use crate::runner::CommandRunner;
use crate::source::{Journal, Pod};
use crate::unit::{unix_seconds, Archivable, CommandUnit, FileUnit, JournalUnit, PodUnit, UnitKind};

/// Dynamic sources found on the host before collection starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovered {
    pub journals: Vec<Journal>,
    pub pods: Vec<Pod>,
}

/// Units ready to be collected, in archive order.
#[derive(Debug, Default)]
pub struct UnitPlan {
    pub units: Vec<Archivable>,

    /// Units left out under [`OnError::Skip`] while planning.
    pub skipped: Vec<String>,
}

/// Build the full ordered unit list.
///
/// Order: danger-mode pod logs, configured files, configured commands,
/// journals, pod records. Configuration order is kept within each group.
/// Files are opened here, and every entry name is normalised and made
/// unique, so anything the failure policy rejects is rejected before the
/// output file exists.
pub fn build_units(
    config: &Config,
    discovered: Discovered,
    options: &DumpOptions,
) -> Result<UnitPlan> {
    let policy = options.failure_policy;
    let mut plan = UnitPlan::default();
    let mut candidates = Vec::with_capacity(
        config.files.len() + config.commands.len() + discovered.journals.len() + 2 * discovered.pods.len(),
    );

    if options.danger {
        let running: Vec<&Pod> = discovered.pods.iter().filter(|p| p.is_running()).collect();
        obs::emit_danger_enabled(running.len());
        candidates.extend(
            running
                .into_iter()
                .map(|pod| Archivable::Command(CommandUnit::pod_log(pod))),
        );
    }

    for spec in &config.files {
        match FileUnit::open(spec) {
            Ok(unit) => candidates.push(Archivable::File(unit)),
            Err(err) => match policy.file_errors {
                OnError::Abort => return Err(err),
                OnError::Skip => {
                    obs::emit_unit_skipped(&spec.name, UnitKind::File.as_str(), &err);
                    plan.skipped.push(spec.name.clone());
                }
            },
        }
    }

    candidates.extend(
        config
            .commands
            .iter()
            .map(|spec| Archivable::Command(CommandUnit::from_spec(spec))),
    );
    candidates.extend(
        discovered
            .journals
            .into_iter()
            .map(|journal| Archivable::Journal(JournalUnit::new(journal))),
    );
    candidates.extend(
        discovered
            .pods
            .into_iter()
            .map(|pod| Archivable::Pod(PodUnit::new(pod))),
    );

    let mut taken = HashSet::new();
    for mut unit in candidates {
        let kind = unit.kind();
        let name = match normalize_name(unit.archive_name()) {
            Ok(path) => path.to_string_lossy().into_owned(),
            Err(err) => match on_error(policy, kind) {
                OnError::Abort => return Err(err.into()),
                OnError::Skip => {
                    obs::emit_unit_skipped(unit.archive_name(), kind.as_str(), &err);
                    plan.skipped.push(unit.archive_name().to_string());
                    continue;
                }
            },
        };
        unit.set_archive_name(unique_name(name, &mut taken));
        plan.units.push(unit);
    }

    Ok(plan)
}

/// First of `name`, `name.1`, `name.2`, ... not yet in `taken`.
fn unique_name(name: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.clone()) {
        return name;
    }
    let mut suffix = 1;
    loop {
        let candidate = format!("{name}.{suffix}");
        if taken.insert(candidate.clone()) {
            warn!(name = %name, renamed = %candidate, "Duplicate archive entry name");
            return candidate;
        }
        suffix += 1;
    }
}

fn on_error(policy: FailurePolicy, kind: UnitKind) -> OnError {
    match kind {
        UnitKind::File => policy.file_errors,
        UnitKind::Command | UnitKind::Journal | UnitKind::Pod => policy.command_errors,
    }
}

/// Outcome of driving a unit list into an archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionReport {
    /// Entries written, symlinks included.
    pub entries: usize,

    /// Command-backed entries whose command did not exit 0.
    pub command_failures: usize,

    /// Units left out under [`OnError::Skip`].
    pub skipped: Vec<String>,
}

/// Sequential driver from units to archive entries.
pub struct Orchestrator<'a> {
    runner: &'a CommandRunner,
    policy: FailurePolicy,
}

impl<'a> Orchestrator<'a> {
    pub fn new(runner: &'a CommandRunner, policy: FailurePolicy) -> Self {
        Self { runner, policy }
    }

    /// Write every unit, in order, into `writer`.
    ///
    /// A unit that cannot be opened is skipped or aborts the run according
    /// to the failure policy. Archive errors always abort: once the stream
    /// is damaged no later entry can be trusted. The writer is left open for
    /// the caller to close.
    pub async fn run<W: Write>(
        &self,
        writer: &mut ArchiveWriter<W>,
        units: Vec<Archivable>,
    ) -> Result<CollectionReport> {
        let mut report = CollectionReport::default();

        for unit in units {
            let name = unit.archive_name().to_string();
            let kind = unit.kind();

            if let Some(target) = unit.link_target() {
                writer.append_symlink(&name, target, unix_seconds(SystemTime::now()))?;
                obs::emit_entry_linked(&name, target);
                report.entries += 1;
                continue;
            }

            let content = match unit.open(self.runner).await {
                Ok(content) => content,
                Err(err) => match on_error(self.policy, kind) {
                    OnError::Abort => return Err(err),
                    OnError::Skip => {
                        obs::emit_unit_skipped(&name, kind.as_str(), &err);
                        report.skipped.push(name);
                        continue;
                    }
                },
            };

            if let Some(status) = content.status.filter(|s| !s.success()) {
                obs::emit_command_nonzero_exit(&name, &status);
                report.command_failures += 1;
            }

            let bytes = writer.append_file(&name, &content.meta, content.reader)?;
            obs::emit_entry_written(&name, kind.as_str(), bytes);
            report.entries += 1;
        }

        Ok(report)
    }
}

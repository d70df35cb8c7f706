//! A complete dump run: output file, orchestration, finalisation.
//!
//! Run states: units are built, the archive is created, units are
//! collected one at a time, then the archive is closed. A fatal error while
//! collecting still closes the writer and removes the partial archive so
//! nothing half-written is left behind under a reportable name.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Local};
use tracing::{warn, Instrument};

use crate::archive::{ArchiveError, ArchiveWriter};
use crate::collect::{build_units, CollectionReport, Discovered, Orchestrator};
use crate::config::{Config, DumpOptions};
use crate::error::{CollectError, Result};
use crate::obs;
use crate::runner::CommandRunner;
use crate::unit::Archivable;

/// File name prefix of every dump.
pub const OUTPUT_PREFIX: &str = "mayday";

/// Extension of every dump.
pub const OUTPUT_EXTENSION: &str = "tar.gz";

/// `<dir>/mayday<YYYYmmddHHMMSS.nanos>.tar.gz`
pub fn output_path(dir: &Path, now: DateTime<Local>) -> PathBuf {
    let stamp = now.format("%Y%m%d%H%M%S.%9f");
    dir.join(format!("{OUTPUT_PREFIX}{stamp}.{OUTPUT_EXTENSION}"))
}

/// Summary of a finished dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpReport {
    /// Location of the archive.
    pub path: PathBuf,

    /// Entries in the archive.
    pub entries: usize,

    /// Commands archived despite a non-zero exit or timeout.
    pub command_failures: usize,

    /// Units left out by the failure policy.
    pub skipped: Vec<String>,

    pub duration_ms: u64,
}

/// Collect everything described by `config` and `discovered` into a new
/// archive under `options.output_dir`.
pub async fn run_dump(
    config: &Config,
    discovered: Discovered,
    options: &DumpOptions,
) -> Result<DumpReport> {
    let start = Instant::now();
    let plan = build_units(config, discovered, options)?;

    let path = output_path(&options.output_dir, Local::now());
    let file = File::create(&path).map_err(|source| CollectError::Output {
        path: path.clone(),
        source,
    })?;

    let span = obs::dump_span(&path);
    let mut report = write_archive(file, &path, plan.units, options)
        .instrument(span.clone())
        .await?;
    let mut skipped = plan.skipped;
    skipped.append(&mut report.skipped);
    report.skipped = skipped;

    let duration_ms = start.elapsed().as_millis() as u64;
    span.in_scope(|| {
        obs::emit_dump_finished(
            report.entries,
            report.command_failures,
            report.skipped.len(),
            duration_ms,
        )
    });

    Ok(DumpReport {
        path,
        entries: report.entries,
        command_failures: report.command_failures,
        skipped: report.skipped,
        duration_ms,
    })
}

/// Drive `units` into the archive at `path` and finalise it. On error the
/// partial archive is removed.
async fn write_archive(
    file: File,
    path: &Path,
    units: Vec<Archivable>,
    options: &DumpOptions,
) -> Result<CollectionReport> {
    obs::emit_dump_started(path, units.len(), options.danger);

    let runner = CommandRunner::new(options.runner.clone());
    let mut writer = ArchiveWriter::new(BufWriter::new(file));
    let collected = Orchestrator::new(&runner, options.failure_policy)
        .run(&mut writer, units)
        .await;

    let report = match collected {
        Ok(report) => report,
        Err(err) => {
            abort(&mut writer, path, &err);
            return Err(err);
        }
    };

    let finished = writer.close().and_then(|dest| {
        dest.into_inner()
            .map_err(|err| ArchiveError::Io(err.into_error()))
    });
    let file = match finished {
        Ok(file) => file,
        Err(err) => {
            let err = CollectError::from(err);
            discard(path);
            obs::emit_dump_aborted(&err);
            return Err(err);
        }
    };
    if let Err(err) = file.sync_all() {
        warn!(path = %path.display(), error = %err, "Failed to sync archive to disk");
    }

    Ok(report)
}

fn abort<W: std::io::Write>(writer: &mut ArchiveWriter<W>, path: &Path, err: &CollectError) {
    if let Err(close_err) = writer.close() {
        warn!(path = %path.display(), error = %close_err, "Failed to close partial archive");
    }
    discard(path);
    obs::emit_dump_aborted(err);
}

fn discard(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %err, "Failed to remove partial archive");
    }
}

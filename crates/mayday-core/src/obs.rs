//! Structured observability events for a dump run.
//!
//! Every event carries a stable `event` field so JSON logs can be filtered
//! without parsing messages:
//!
//! | event                  | level |
//! |------------------------|-------|
//! | `dump.started`         | info  |
//! | `danger.enabled`       | warn  |
//! | `entry.written`        | debug |
//! | `entry.linked`         | debug |
//! | `command.nonzero_exit` | warn  |
//! | `unit.skipped`         | warn  |
//! | `dump.finished`        | info  |
//! | `dump.aborted`         | error |

use std::path::Path;

use tracing::{debug, error, info, warn, Span};

use crate::runner::ExitOutcome;

/// Span covering one dump run. Attach it to the collection future with
/// [`tracing::Instrument`] so every event below is tagged with the output
/// path:
///
/// ```ignore
/// write_archive(..).instrument(dump_span(&output_path)).await
/// ```
pub fn dump_span(output: &Path) -> Span {
    tracing::info_span!("mayday.dump", output = %output.display())
}

pub fn emit_dump_started(output: &Path, units: usize, danger: bool) {
    info!(
        event = "dump.started",
        output = %output.display(),
        units = units,
        danger = danger,
    );
}

pub fn emit_danger_enabled(running_pods: usize) {
    warn!(
        event = "danger.enabled",
        running_pods = running_pods,
        "Danger mode activated. Dump will include rkt pod logs, which may contain sensitive information."
    );
}

pub fn emit_entry_written(name: &str, kind: &str, bytes: u64) {
    debug!(event = "entry.written", name = %name, kind = %kind, bytes = bytes);
}

pub fn emit_entry_linked(name: &str, target: &str) {
    debug!(event = "entry.linked", name = %name, target = %target);
}

/// The entry is still archived with whatever output was captured.
pub fn emit_command_nonzero_exit(name: &str, status: &ExitOutcome) {
    warn!(event = "command.nonzero_exit", name = %name, status = %status);
}

pub fn emit_unit_skipped(name: &str, kind: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "unit.skipped", name = %name, kind = %kind, reason = %reason);
}

pub fn emit_dump_finished(entries: usize, command_failures: usize, skipped: usize, duration_ms: u64) {
    info!(
        event = "dump.finished",
        entries = entries,
        command_failures = command_failures,
        skipped = skipped,
        duration_ms = duration_ms,
    );
}

pub fn emit_dump_aborted(error: &dyn std::fmt::Display) {
    error!(event = "dump.aborted", error = %error);
}

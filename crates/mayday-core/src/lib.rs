//! mayday core library
//!
//! Gathers heterogeneous host state (configured files, command output,
//! journals, rkt pods) and streams it into a single `.tar.gz` dump.
//!
//! ## Pipeline
//!
//! - [`config`]: what to collect and how (files, commands, options)
//! - [`unit`]: the closed set of archivable units
//! - [`runner`]: external command execution with captured output
//! - [`archive`]: streaming tar+gzip writer
//! - [`collect`]: ordered unit list and the sequential orchestrator
//! - [`dump`]: a whole run, from output file to finalised archive

pub mod archive;
pub mod collect;
pub mod config;
pub mod dump;
pub mod error;
pub mod obs;
pub mod runner;
pub mod source;
pub mod telemetry;
pub mod unit;

pub use archive::{normalize_name, ArchiveError, ArchiveResult, ArchiveWriter, EntryMeta};
pub use collect::{build_units, CollectionReport, Discovered, Orchestrator, UnitPlan};
pub use config::{
    resolve_config_path, CommandSpec, Config, ConfigError, DumpOptions, FailurePolicy, FileSpec,
    OnError, CONFIG_ENV_VAR, DEFAULT_CONFIG_PATH,
};
pub use dump::{output_path, run_dump, DumpReport};
pub use error::{CollectError, Result};
pub use obs::dump_span;
pub use runner::{
    CommandOutput, CommandRunner, ExitOutcome, RunnerConfig, RunnerError, RunnerResult,
    DEFAULT_COMMAND_TIMEOUT,
};
pub use source::{Journal, Pod, PodState};
pub use telemetry::init_tracing;
pub use unit::{Archivable, CommandUnit, Content, FileUnit, JournalUnit, PodUnit, UnitKind};

/// mayday version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

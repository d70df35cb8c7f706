//! mayday - collect host diagnostics into a single tarball
//!
//! Gathers configured files and command output, systemd journals and rkt
//! pod records, and writes them to `mayday<timestamp>.tar.gz`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mayday_core::{
    resolve_config_path, run_dump, CommandRunner, Config, Discovered, DumpOptions, FailurePolicy,
    Journal, OnError, Pod, RunnerConfig, CONFIG_ENV_VAR, DEFAULT_COMMAND_TIMEOUT,
    DEFAULT_CONFIG_PATH,
};
use mayday_discovery::{JournalSource, PodSource, RktPods, SystemdJournals};
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "mayday")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Collect host diagnostics into a tar.gz dump", long_about = None)]
struct Cli {
    /// Configuration file; MAYDAY_CONFIG_FILE takes precedence
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config_file: PathBuf,

    /// Include logs of running rkt pods (may contain sensitive data)
    #[arg(long)]
    danger: bool,

    /// Directory for the dump (default: system temp dir)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Per-command timeout in seconds; 0 disables the limit
    #[arg(long, default_value_t = DEFAULT_COMMAND_TIMEOUT.as_secs())]
    command_timeout: u64,

    /// Capture only stdout of commands
    #[arg(long)]
    stdout_only: bool,

    /// Leave out configured files that cannot be read instead of failing
    #[arg(long)]
    skip_missing_files: bool,

    /// Do not collect systemd journals
    #[arg(long)]
    no_journals: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            timeout: (self.command_timeout > 0).then(|| Duration::from_secs(self.command_timeout)),
            capture_stderr: !self.stdout_only,
        }
    }

    fn dump_options(&self) -> DumpOptions {
        let defaults = DumpOptions::default();
        DumpOptions {
            danger: self.danger,
            failure_policy: FailurePolicy {
                file_errors: if self.skip_missing_files {
                    OnError::Skip
                } else {
                    OnError::Abort
                },
                ..FailurePolicy::default()
            },
            runner: self.runner_config(),
            output_dir: self.output_dir.clone().unwrap_or(defaults.output_dir),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    mayday_core::init_tracing(cli.json, level);

    let env_value = std::env::var(CONFIG_ENV_VAR).ok();
    let config_path = resolve_config_path(env_value.as_deref(), &cli.config_file);
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    info!(
        path = %config_path.display(),
        files = config.files.len(),
        commands = config.commands.len(),
        "Loaded configuration"
    );

    // Discovery output is parsed, so keep stderr out of it.
    let discovery_runner = CommandRunner::new(RunnerConfig {
        capture_stderr: false,
        ..cli.runner_config()
    });

    let journals = if cli.no_journals {
        Vec::new()
    } else {
        discover_journals(&SystemdJournals::new(discovery_runner.clone())).await?
    };
    let pods = discover_pods(&RktPods::new(discovery_runner)).await;

    let options = cli.dump_options();
    let report = run_dump(&config, Discovered { journals, pods }, &options)
        .await
        .context("Dump failed")?;

    println!("Output saved in {}", report.path.display());
    println!("All done!");
    Ok(())
}

async fn discover_journals(source: &dyn JournalSource) -> Result<Vec<Journal>> {
    source
        .list_journals()
        .await
        .context("Failed to list systemd units")
}

/// Pods are optional: a host without rkt still gets a dump.
async fn discover_pods(source: &dyn PodSource) -> Vec<Pod> {
    match source.list_pods().await {
        Ok(pods) => pods,
        Err(err) => {
            warn!(
                error = %err,
                "Could not connect to rkt. Verify mayday has permissions to launch the rkt client."
            );
            Vec::new()
        }
    }
}

//! abac-matrix CLI.
//!
//! ```bash
//! # Compile a policy file into abac_res.txt
//! abac-matrix compile policy.abac
//!
//! # Same, but refuse to run with unrecognized conditions
//! abac-matrix compile policy.abac --on-unknown-condition fail-fast -o matrix.txt
//!
//! # Build a snapshot of what was actually accessed (abac_log.txt)
//! abac-matrix log data.log
//!
//! # Lay the observed accesses over the compiled matrix and keep the counts
//! abac-matrix log data.log --auth abac_res.txt --counts counts.json
//! ```

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use abac_matrix::access_log::{self, OperationCount};
use abac_matrix::config::DEFAULT_LOG_OUTPUT;
use abac_matrix::snapshot;
use abac_matrix::{
    Config, CrossEquality, MalformedPolicy, Snapshot, SnapshotFormat, UnknownConditionPolicy, compile_file,
};
use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Compile ABAC-lab policies into a user/resource authorization matrix.
#[derive(Parser)]
#[command(name = "abac-matrix")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log debug details (per-rule candidate counts).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a policy file, evaluate every rule and write the snapshot.
    Compile {
        /// Policy file with userAttrib/resourceAttrib/rule declarations.
        rules: PathBuf,

        /// TOML config file; flags below override its values.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// What to do with a condition clause using an unknown operator.
        #[arg(long, value_enum)]
        on_unknown_condition: Option<UnknownConditionPolicy>,

        /// What to do with a structurally broken declaration.
        #[arg(long, value_enum)]
        on_malformed: Option<MalformedPolicy>,

        /// Resource attribute used by the `u=r` cross condition.
        #[arg(long, value_enum)]
        cross_equality: Option<CrossEquality>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Extract <timestamp,user,resource,operation> records from access logs.
    Log {
        /// One or more log files, read in order.
        #[arg(required = true)]
        logs: Vec<PathBuf>,

        /// Compiled snapshot (literal or JSON); its operations are merged
        /// into every observed pair.
        #[arg(short, long)]
        auth: Option<PathBuf>,

        /// Write per-operation occurrence counts as JSON.
        #[arg(long)]
        counts: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct OutputArgs {
    /// Snapshot path (default: abac_res.txt, or abac_log.txt for `log`).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Snapshot encoding.
    #[arg(long, value_enum)]
    format: Option<SnapshotFormat>,

    /// Print the snapshot instead of writing a file.
    #[arg(long)]
    stdout: bool,
}

impl OutputArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(format) = self.format {
            config.format = format;
        }
    }

    fn emit(&self, snapshot: &Snapshot, config: &Config) -> Result<()> {
        if self.stdout {
            println!("{}", snapshot.render(config.format)?);
            return Ok(());
        }
        snapshot
            .write(&config.output, config.format)
            .with_context(|| format!("Failed to write snapshot to {}", config.output.display()))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();

    match cli.command {
        Commands::Compile {
            rules,
            config,
            on_unknown_condition,
            on_malformed,
            cross_equality,
            output,
        } => {
            let mut cfg = match &config {
                Some(path) => Config::load(path)?,
                None => Config::default(),
            };
            if let Some(policy) = on_unknown_condition {
                cfg.on_unknown_condition = policy;
            }
            if let Some(policy) = on_malformed {
                cfg.on_malformed = policy;
            }
            if let Some(mode) = cross_equality {
                cfg.cross_equality = mode;
            }
            output.apply(&mut cfg);

            let compiled = compile_file(&rules, &cfg)?;
            output.emit(&compiled.snapshot, &cfg)?;
            info!(
                rules = compiled.rules,
                entries = compiled.snapshot.matrix.len(),
                dropped_clauses = compiled.dropped_clauses,
                skipped_lines = compiled.skipped_lines,
                "compiled {}",
                rules.display()
            );
            Ok(())
        }
        Commands::Log {
            logs,
            auth,
            counts,
            output,
        } => {
            let mut cfg = Config {
                output: PathBuf::from(DEFAULT_LOG_OUTPUT),
                ..Config::default()
            };
            output.apply(&mut cfg);
            if !output.stdout && auth.as_deref() == Some(cfg.output.as_path()) {
                bail!("refusing to overwrite the authorization snapshot {}", cfg.output.display());
            }

            let authorized = match &auth {
                Some(path) => Some(
                    snapshot::read_file(path)
                        .with_context(|| format!("Failed to read authorization snapshot {}", path.display()))?
                        .matrix,
                ),
                None => None,
            };

            let mut entries = Vec::new();
            for path in &logs {
                entries.extend(access_log::extract_file(path)?);
            }
            let summary = access_log::summarize(&entries);
            let rows = summary.operation_counts(authorized.as_ref());
            for row in rows.iter().filter(|row| row.authorized == Some(false)) {
                warn!(
                    user = %row.user,
                    resource = %row.resource,
                    operation = %row.operation,
                    count = row.count,
                    "observed operation is not authorized"
                );
            }
            info!(
                entries = entries.len(),
                users = summary.users.len(),
                resources = summary.resources.len(),
                unauthorized = rows.iter().filter(|row| row.authorized == Some(false)).count(),
                "access logs summarized"
            );

            output.emit(&summary.to_snapshot(authorized.as_ref()), &cfg)?;
            if let Some(path) = &counts {
                write_counts(path, &rows)?;
            }
            Ok(())
        }
    }
}

fn write_counts(path: &Path, rows: &[OperationCount]) -> Result<()> {
    let text = serde_json::to_string_pretty(rows)?;
    std::fs::write(path, text).with_context(|| format!("Failed to write counts to {}", path.display()))
}

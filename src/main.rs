//! kbvault command-line surface.
//!
//! Exit codes: 0 success, 1 total failure, 2 partial restore failure,
//! 3 backup directory locked by another run.

use clap::{Parser, Subcommand};
use kbvault::backup::{BackupOrchestrator, BackupReport};
use kbvault::config::BrdrConfig;
use kbvault::metadata::BackupMetadata;
use kbvault::restore::{
    RestoreOrchestrator, RestoreReport, RestoreRequest, RestoreStatus, Source, StoreOutcome,
};
use kbvault::runbook::{rpo_hours, Scenario, RTO_HOURS};
use kbvault::BrdrError;
use tracing_subscriber::EnvFilter;

const EXIT_FAILURE: i32 = 1;
const EXIT_PARTIAL: i32 = 2;
const EXIT_LOCKED: i32 = 3;

#[derive(Parser)]
#[command(
    name = "kbvault",
    about = "Backup, restore, and disaster recovery for the knowledge-base chatbot stores"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Snapshot, verify, and record both stores; upload and prune if configured.
    Backup {
        /// Report what would happen without writing metadata, uploading, or pruning.
        #[arg(long)]
        dry_run: bool,
    },
    /// Overwrite both stores from the artifact with the given timestamp.
    Restore {
        /// Artifact timestamp key, as shown by list-backups.
        timestamp: String,
        /// Where to fetch the artifact from: local or remote.
        source: String,
        /// Confirm the destructive operation.
        #[arg(long)]
        yes: bool,
    },
    /// Enumerate valid backup artifacts, most recent first.
    ListBackups,
    /// Print the operator checklist for a disaster scenario.
    Runbook {
        /// One of: relational-loss, vector-corruption, full-loss.
        scenario: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let code = run(cli).await;
    std::process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    match cli.command {
        Command::Runbook { scenario } => {
            // Runbook needs no store configuration.
            let scenario: Scenario = match scenario.parse() {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("error: {e}");
                    return EXIT_FAILURE;
                }
            };
            print_runbook(scenario);
            return 0;
        }
        command => {
            let config = match BrdrConfig::from_env() {
                Ok(config) => config,
                Err(e) => return fatal("config", &e),
            };
            match command {
                Command::Backup { dry_run } => cmd_backup(config, dry_run).await,
                Command::Restore {
                    timestamp,
                    source,
                    yes,
                } => cmd_restore(config, timestamp, source, yes).await,
                Command::ListBackups => cmd_list(config).await,
                Command::Runbook { .. } => unreachable!("handled above"),
            }
        }
    }
}

async fn cmd_backup(config: BrdrConfig, dry_run: bool) -> i32 {
    let orchestrator = BackupOrchestrator::new(config);
    let result = if dry_run {
        orchestrator.dry_run().await
    } else {
        orchestrator.run().await
    };
    match result {
        Ok(report) => {
            print_backup_summary(&report);
            0
        }
        Err(e) => fatal("backup", &e),
    }
}

async fn cmd_restore(config: BrdrConfig, timestamp: String, source: String, yes: bool) -> i32 {
    let source: Source = match source.parse() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_FAILURE;
        }
    };

    let orchestrator = RestoreOrchestrator::new(config);
    let request = RestoreRequest {
        timestamp,
        source,
        confirmed: yes,
    };
    match orchestrator.run(request).await {
        Ok(report) => {
            print_restore_summary(&report);
            match report.status {
                RestoreStatus::Success => 0,
                RestoreStatus::PartialFailure => EXIT_PARTIAL,
                RestoreStatus::Failure => EXIT_FAILURE,
            }
        }
        Err(e) => fatal("restore", &e),
    }
}

async fn cmd_list(config: BrdrConfig) -> i32 {
    match BackupMetadata::list(&config.backup_dir).await {
        Ok(records) if records.is_empty() => {
            println!("no backup artifacts in {}", config.backup_dir.display());
            0
        }
        Ok(records) => {
            println!("{:<18} {:<12} {:>14}  archives", "TIMESTAMP", "ENVIRONMENT", "TOTAL BYTES");
            for record in records {
                println!(
                    "{:<18} {:<12} {:>14}  {}",
                    record.timestamp,
                    record.environment,
                    record.total_bytes(),
                    record
                        .archives
                        .iter()
                        .map(|a| a.kind.as_str())
                        .collect::<Vec<_>>()
                        .join("+")
                );
            }
            0
        }
        Err(e) => fatal("list-backups", &e),
    }
}

fn print_backup_summary(report: &BackupReport) {
    if report.dry_run {
        println!("backup dry run for {} (no changes made):", report.timestamp);
        for line in &report.plan {
            println!("  - {line}");
        }
        for archive in &report.archives {
            println!(
                "  - would keep {} ({} bytes, sha256 {})",
                archive.file_name, archive.size_bytes, archive.checksum
            );
        }
        return;
    }

    println!("backup {} complete", report.timestamp);
    for archive in &report.archives {
        println!(
            "  {}: {} ({} bytes)",
            archive.kind, archive.file_name, archive.size_bytes
        );
    }
    match report.uploaded {
        Some(true) => println!("  remote copy: uploaded"),
        Some(false) => println!("  remote copy: FAILED (local backup is still valid)"),
        None => println!("  remote copy: not configured"),
    }
    println!(
        "  retention: removed {}, retained {}",
        report.pruned.removed, report.pruned.retained
    );
}

fn print_restore_summary(report: &RestoreReport) {
    println!("restore of {}: {:?}", report.timestamp, report.status);
    for (kind, outcome) in &report.outcomes {
        match outcome {
            StoreOutcome::Restored => println!("  {kind}: restored and verified"),
            StoreOutcome::Failed { kind: err, detail } => {
                println!("  {kind}: FAILED ({err}) {detail}");
                println!("summary store={kind} phase=restoring kind={err}");
            }
        }
    }
    if let Some(ref safety) = report.safety_snapshot {
        println!("  pre-restore state saved as safety snapshot {safety} (never auto-pruned)");
    }
}

fn print_runbook(scenario: Scenario) {
    println!("disaster-recovery runbook: {}", scenario.as_str());
    println!(
        "targets: RTO <= {RTO_HOURS}h, RPO <= {}h (daily backups)",
        rpo_hours(24)
    );
    println!(
        "stores affected: {}",
        scenario
            .affected_stores()
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    for (index, step) in scenario.checklist().iter().enumerate() {
        println!("  {}. [{}] {}", index + 1, step.name, step.action);
    }
}

/// Print the structured failure summary and pick the exit code.
fn fatal(phase: &str, error: &BrdrError) -> i32 {
    eprintln!("error: {error}");
    match error.store() {
        Some(store) => eprintln!("summary store={store} phase={phase} kind={}", error.kind()),
        None => eprintln!("summary phase={phase} kind={}", error.kind()),
    }
    if matches!(error, BrdrError::Locked { .. }) {
        EXIT_LOCKED
    } else {
        EXIT_FAILURE
    }
}

//! rollcall-import - PDF voter list import driver
//!
//! Submits a voter list PDF (or resumes a running job), follows the job to
//! completion, optionally prunes staged rows, and commits the result.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_common::config::{CliOverrides, ImportConfig, TomlConfig};
use rollcall_common::events::ImportEvent;
use rollcall_import::{Importer, SessionOutcome, StagingBuffer, SubmitPayload};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for rollcall-import
#[derive(Parser, Debug)]
#[command(name = "rollcall-import")]
#[command(about = "Import voter lists from PDF through the rollcall job service")]
#[command(version)]
struct Args {
    /// TOML config file (default: <config dir>/rollcall/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Job service base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Bearer token for the job service
    #[arg(long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a PDF and follow the import job
    Import {
        /// PDF file to upload
        #[arg(short, long)]
        file: PathBuf,

        #[command(flatten)]
        review: ReviewArgs,
    },
    /// Reattach to an import job that is already running
    Resume {
        /// Job id returned by an earlier upload
        #[arg(short, long)]
        job: String,

        #[command(flatten)]
        review: ReviewArgs,
    },
}

#[derive(clap::Args, Debug)]
struct ReviewArgs {
    /// Voting center the records belong to
    #[arg(long)]
    center: String,

    /// Remove the staged row at this position before committing (repeatable)
    #[arg(long = "drop")]
    drop_rows: Vec<usize>,

    /// Write staged records as JSON for review
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Commit staged records without further review
    #[arg(long)]
    commit: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = TomlConfig::load_or_default(args.config.as_deref())?;
    let cli = CliOverrides {
        api_base_url: args.api_url.clone(),
        auth_token: args.token.clone(),
    };
    let config = ImportConfig::resolve(&cli, &toml_config)?;

    let default_filter = config
        .log_level
        .clone()
        .unwrap_or_else(|| "rollcall_import=info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting rollcall-import {}", env!("CARGO_PKG_VERSION"));
    info!("Job service: {}", config.api_base_url);

    let importer = Arc::new(
        Importer::from_config(config).context("Failed to create job service client")?,
    );
    spawn_progress_printer(&importer);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; stopping local polling (server job keeps running)");
                cancel.cancel();
            }
        });
    }

    let (outcome, review) = match args.command {
        Command::Import { file, review } => {
            let payload = SubmitPayload::from_path(&file, review.center.clone())
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            (importer.start_import(&payload, &cancel).await?, review)
        }
        Command::Resume { job, review } => (importer.resume_import(&job, &cancel).await?, review),
    };

    match outcome {
        SessionOutcome::Staged { job_id, mut buffer } => {
            info!(job_id = %job_id, records = buffer.size(), "Records staged for review");
            review_and_commit(&importer, &review, &mut buffer).await
        }
        SessionOutcome::AutoSaved { job_id, total_saved } => {
            info!(job_id = %job_id, "Server saved {} records directly", total_saved);
            Ok(())
        }
        other => {
            let message = other
                .user_message()
                .unwrap_or_else(|| "Import did not complete".to_string());
            if let Some(job_id) = other.job_id() {
                eprintln!("Job id: {} (resume with `rollcall-import resume --job {}`)", job_id, job_id);
            }
            bail!(message)
        }
    }
}

async fn review_and_commit(
    importer: &Importer,
    review: &ReviewArgs,
    buffer: &mut StagingBuffer,
) -> Result<()> {
    let dropped = buffer
        .remove_positions(&review.drop_rows)
        .context("Cannot drop staged rows")?;
    for (index, removed) in &dropped {
        info!(index, name = removed.display_name(), "Dropped staged row");
    }

    if let Some(path) = &review.output {
        let json = serde_json::to_string_pretty(&buffer.to_records())?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Staged records written to {}", path.display());
    }

    for (position, entry) in buffer.iter().enumerate() {
        let record = entry.record();
        println!(
            "{:>4}  {:<30}  father: {:<24}  voter no: {}",
            position,
            record.display_name(),
            record.father_name.as_deref().unwrap_or("-"),
            record.voter_no.as_deref().unwrap_or("-"),
        );
    }

    if !review.commit {
        println!("{} records staged; rerun with --commit to save them", buffer.size());
        return Ok(());
    }

    let outcome = importer
        .commit(&review.center, buffer)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    println!(
        "Saved {} of {} records ({} skipped by server)",
        outcome.inserted,
        outcome.submitted,
        outcome.dropped()
    );
    Ok(())
}

fn spawn_progress_printer(importer: &Importer) {
    let mut rx = importer.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ImportEvent::ProgressUpdated { progress, .. }) => {
                    info!("Progress: {}", progress.describe())
                }
                Ok(ImportEvent::PollFailed {
                    consecutive_errors,
                    message,
                    ..
                }) => warn!("Status check failed ({} in a row): {}", consecutive_errors, message),
                Ok(ImportEvent::StateChanged { to, job_id, .. }) => {
                    info!(job_id = ?job_id, "Session {}", to)
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Progress printer lagged, {} events skipped", skipped)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

//! cohort-worker: runs the shortlisting engine against the live services.
//!
//! Subcommands:
//! - `shortlist`: one shortlisting pass over every eligible cohort
//! - `rejection-emails`: one sweep of deferred rejection emails
//! - `set-status`: interactive status change for a single membership
//! - `schedule`: long-running loop firing both passes on their cron schedules

use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use cohort_core::config::load_dotenv;
use cohort_core::{Config, MemberStatus};
use cohort_engine::schedule::jobs_from_settings;
use cohort_engine::Engine;

// ── CLI ─────────────────────────────────────────────────────────────

/// Cohort shortlisting worker.
#[derive(Parser, Debug)]
#[command(name = "cohort-worker", version, about)]
struct Cli {
    /// Config profile; keys are looked up as `{PROFILE}_{KEY}` first.
    #[arg(long, env = "COHORT_PROFILE")]
    profile: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate submitted members of every cohort whose shortlist date has arrived.
    Shortlist,

    /// Send pending rejection emails for cohorts whose notification date has arrived.
    RejectionEmails,

    /// Set one membership's status and fan the change out.
    SetStatus {
        #[arg(long)]
        membership_id: Uuid,

        #[arg(long)]
        status: MemberStatus,

        #[arg(long, default_value = "")]
        reason: String,
    },

    /// Run both passes on their cron schedules until interrupted.
    Schedule {
        /// Seconds between schedule checks.
        #[arg(long, env = "SCHEDULE_TICK_SECS", default_value_t = 60)]
        tick_secs: u64,
    },
}

// ── Output ──────────────────────────────────────────────────────────

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_job(engine: &Engine, name: &str) -> anyhow::Result<()> {
    match name {
        "shortlist" => {
            let report = engine.evaluate_shortlisting().await?;
            info!(
                run_id = %report.run_id,
                shortlisted = report.totals.shortlisted,
                rejected = report.totals.rejected,
                failed = report.totals.failed,
                "scheduled shortlisting finished"
            );
        }
        "rejection_emails" => {
            let report = engine.send_rejection_emails().await?;
            info!(
                run_id = %report.run_id,
                sent = report.totals.sent,
                failed = report.totals.failed,
                "scheduled rejection-email sweep finished"
            );
        }
        other => warn!(job = %other, "unknown scheduled job"),
    }
    Ok(())
}

async fn run_schedule(engine: &Engine, tick: Duration) -> anyhow::Result<()> {
    let mut jobs = jobs_from_settings(engine.settings())?;
    let started_at = Utc::now();
    let mut interval = tokio::time::interval(tick);
    info!(
        shortlist_cron = %engine.settings().shortlist_cron,
        rejection_email_cron = %engine.settings().rejection_email_cron,
        tick_secs = tick.as_secs(),
        "scheduler started"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Utc::now();
                for job in jobs.iter_mut() {
                    if !job.is_due(now, started_at) {
                        continue;
                    }
                    job.mark_run(now);
                    info!(job = job.name, "running scheduled job");
                    if let Err(e) = run_job(engine, job.name).await {
                        error!(job = job.name, error = %e, "scheduled job failed");
                    }
                }
            }
            _ = &mut shutdown => {
                info!("scheduler shutting down");
                break;
            }
        }
    }
    Ok(())
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.profile {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    config.log_summary();

    let engine = Engine::connect(&config).await.context("starting engine")?;

    match cli.command {
        Command::Shortlist => print_json(&engine.evaluate_shortlisting().await?)?,
        Command::RejectionEmails => print_json(&engine.send_rejection_emails().await?)?,
        Command::SetStatus {
            membership_id,
            status,
            reason,
        } => print_json(&engine.update_member(membership_id, status, &reason).await?)?,
        Command::Schedule { tick_secs } => {
            run_schedule(&engine, Duration::from_secs(tick_secs.max(1))).await?
        }
    }

    info!("cohort-worker exited cleanly");
    Ok(())
}

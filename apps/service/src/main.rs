use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use logger::init_tracing;
use nimbus_prober::metrics::{ActivityLimit, BucketWidth, SnapshotScope, TimeRange};
use nimbus_prober::monitoring::{ServiceId, UserId};
use nimbus_prober::{Config, Nimbus};

#[derive(Parser)]
#[command(name = "nimbus-prober", version, about = "Probe services and inspect their status history")]
struct Cli {
    /// Configuration file path (defaults to $NIMBUS_CONFIG, then ~/.config/nimbus/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe one service and record the outcome
    Check {
        #[arg(long)]
        service: ServiceId,
    },

    /// Probe every service of a user, one after another (Ctrl-C stops between probes)
    CheckAll {
        #[arg(long)]
        user: UserId,
    },

    /// Delete status log entries older than the retention window
    Prune {
        /// Retention window in days (defaults to the configured value)
        #[arg(long)]
        days: Option<i64>,
    },

    /// Print metrics in exposition format, or as JSON
    Metrics {
        #[arg(long)]
        user: Option<UserId>,

        #[arg(long)]
        json: bool,
    },

    /// Print uptime statistics and the bucketed series for a service
    Report {
        #[arg(long)]
        service: ServiceId,

        /// One of 1h, 6h, 24h, 7d, 30d
        #[arg(long)]
        range: Option<String>,

        /// Bucket width in minutes
        #[arg(long)]
        bucket: Option<i64>,
    },

    /// Print the most recent status log entries of a service
    Activity {
        #[arg(long)]
        service: ServiceId,

        #[arg(long)]
        limit: Option<i64>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::from_config(Some(path))?,
        None => Config::from_env()?,
    };

    if let Command::Config = cli.command {
        print!("{config}");
        return Ok(());
    }

    let nimbus = Nimbus::open(config, CancellationToken::new()).await?;

    match cli.command {
        Command::Check { service } => {
            let outcome = nimbus.checker.check_by_id(service, &nimbus.probe_deadline()).await?;
            print_json(&outcome)?;
        }
        Command::CheckAll { user } => {
            let batch_cancel = CancellationToken::new();
            let on_ctrl_c = batch_cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, finishing the probe in flight");
                    on_ctrl_c.cancel();
                }
            });

            let summary = nimbus
                .checker
                .check_all(user, nimbus.config.probe.timeout(), &batch_cancel)
                .await?;
            print_json(&summary)?;
        }
        Command::Prune { days } => {
            let days = days.unwrap_or(nimbus.config.retention.days);
            let deleted = nimbus.retention().sweep(days).await?;
            info!("Pruned {} entries", deleted);
            print_json(&serde_json::json!({ "deleted": deleted }))?;
        }
        Command::Metrics { user, json } => {
            let scope = user.map_or(SnapshotScope::All, SnapshotScope::User);
            if json {
                print_json(&nimbus.aggregator.snapshot(scope).await?)?;
            } else {
                print!("{}", nimbus.aggregator.render_exposition(scope).await?);
            }
        }
        Command::Report { service, range, bucket } => {
            let range = TimeRange::parse_or_default(range.as_deref())?;
            let bucket = BucketWidth::parse_or_default(bucket)?;
            print_json(&nimbus.aggregator.service_report(service, range, bucket).await?)?;
        }
        Command::Activity { service, limit } => {
            let entries = nimbus.aggregator.recent_activity(service, ActivityLimit::clamped(limit)).await?;
            print_json(&entries)?;
        }
        Command::Config => {}
    }

    nimbus.shutdown();
    Ok(())
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//! alerts-worker — periodic alert rule evaluation.
//!
//! Connects to PostgreSQL, wires the store and the notification dispatcher
//! into an [`AlertEngine`] and runs one evaluation cycle per tick until
//! Ctrl-C. With `--once` it runs a single cycle and exits; the exit code is
//! non-zero when that cycle failed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use heatwatch_core::config::{load_dotenv, NotifyConfig};
use heatwatch_core::Config;
use heatwatch_notify::{Dispatcher, Notifier, WebhookNotifier};
use heatwatch_rules::{AlertEngine, Collaborators, CycleOutcome};
use heatwatch_storage::{init_pg_pool, PgStore};

// ── CLI ─────────────────────────────────────────────────────────────

/// Alert rule evaluation worker.
#[derive(Parser, Debug)]
#[command(name = "alerts-worker", version, about)]
struct Cli {
    /// Run a single evaluation cycle and exit.
    #[arg(long)]
    once: bool,

    /// Seconds between cycles. Overrides ENGINE_INTERVAL_SECS.
    #[arg(long, env = "ALERTS_INTERVAL")]
    interval: Option<u64>,
}

fn build_dispatcher(config: &NotifyConfig) -> anyhow::Result<Dispatcher> {
    let mut channels: Vec<Box<dyn Notifier>> = Vec::new();
    if let Some(url) = &config.webhook_url {
        let webhook = WebhookNotifier::from_config(url, config.webhook_method.as_deref(), None)
            .context("invalid webhook configuration")?;
        channels.push(Box::new(webhook));
    } else {
        warn!("NOTIFY_WEBHOOK_URL not set, new alerts will not be delivered");
    }

    Dispatcher::with_defaults(channels)
        .with_templates(
            config.subject_template.clone(),
            config.body_template.clone(),
        )
        .context("invalid notification template")
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_summary();

    let pool = init_pg_pool(&config.postgres)
        .await
        .context("failed to connect to PostgreSQL")?;
    let store = Arc::new(PgStore::new(pool));
    let dispatcher = Arc::new(build_dispatcher(&config.notify)?);

    let mut engine_config = config.engine.clone();
    if let Some(secs) = cli.interval {
        engine_config.interval_secs = secs.max(1);
    }
    let interval_secs = engine_config.interval_secs;

    let engine = AlertEngine::new(Collaborators::from_backend(store, dispatcher))
        .with_config(engine_config);

    if cli.once {
        return match engine.run_once(Utc::now()).await {
            CycleOutcome::Completed(_) | CycleOutcome::Skipped => Ok(()),
            CycleOutcome::Failed(e) => Err(e).context("evaluation cycle failed"),
        };
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(interval_secs, "alerts-worker starting");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Failures are logged inside the engine; the next tick retries.
                engine.run_once(Utc::now()).await;
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    info!("alerts-worker exited cleanly");
    Ok(())
}

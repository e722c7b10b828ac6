use anyhow::{Context, Result, bail};
use chrono::{DateTime, TimeDelta, Utc};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use snipe_core::app::{AppBuilder, Settings};
use snipe_core::domain::{NewConfiguration, NewTask, TaskStatus};
use snipe_core::impls::{HttpRedeemClient, InMemoryStore, LiveUpdateHub, SubscriptionEvent};
use snipe_core::logging::init_logging;

/// Schedule one purchase attempt and stream its progress as JSON lines.
#[derive(Debug, Parser)]
#[command(name = "snipe", version, about, long_about = None)]
struct CliArgs {
    /// Settings file (TOML). Defaults plus SNIPE_* overrides when omitted.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// What to redeem (sent as the request's target field).
    #[arg(long)]
    target: String,

    /// Target instant, RFC 3339 (e.g. 2026-03-01T10:00:00Z).
    #[arg(long, value_name = "TIME", conflicts_with = "in_secs")]
    at: Option<DateTime<Utc>>,

    /// Target instant as seconds from now.
    #[arg(long, value_name = "SECS")]
    in_secs: Option<u64>,

    /// Request header, repeatable.
    #[arg(long = "header", value_name = "KEY=VALUE", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    #[arg(long)]
    compensation_ms: Option<u64>,

    #[arg(long)]
    max_retries: Option<u32>,

    #[arg(long)]
    retry_interval_ms: Option<u64>,

    /// Log filter (error, warn, info, debug, trace or a directive).
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::from_env()?,
    };
    init_logging(args.log_level.as_deref().or(settings.log_level.as_deref()))?;

    let target_time = match (args.at, args.in_secs) {
        (Some(at), _) => at,
        (None, Some(secs)) => {
            Utc::now() + TimeDelta::seconds(i64::try_from(secs).context("--in-secs too large")?)
        }
        (None, None) => bail!("one of --at or --in-secs is required"),
    };

    let hub = Arc::new(LiveUpdateHub::new(settings.live_update.channel_capacity));
    let client = HttpRedeemClient::new(&settings.http)?;
    tracing::info!(url = client.url(), "redeem endpoint");

    let app = AppBuilder::new()
        .store(Arc::new(InMemoryStore::new()))
        .redeem_client(Arc::new(client))
        .live_updates(hub.clone())
        .settings(settings)
        .build()?;
    let service = &app.service;

    let config = args
        .headers
        .into_iter()
        .fold(NewConfiguration::new("cli"), |c, (k, v)| c.with_header(k, v));
    let config = service.create_configuration(config).await?;

    let mut new = NewTask::new(config.id, args.target, target_time);
    new.network_compensation_ms = args.compensation_ms;
    new.max_retries = args.max_retries;
    new.retry_interval_ms = args.retry_interval_ms;
    let task = service.create_task(new).await?;

    let mut subscription = hub.attach(task.id);
    let receipt = service.start_task(task.id).await?;
    tracing::info!(task_id = %receipt.task_id, fire_at = %receipt.fire_at, "scheduled");

    let mut cancelled = false;
    loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Some(SubscriptionEvent::Message(message)) => {
                    println!("{}", serde_json::to_string(&message)?);
                }
                Some(SubscriptionEvent::Lagged(missed)) => {
                    tracing::warn!(missed, "output fell behind");
                }
                None => break,
            },
            signal = tokio::signal::ctrl_c(), if !cancelled => {
                signal.context("listening for ctrl-c")?;
                cancelled = true;
                match service.cancel_task(task.id).await {
                    Ok(status) => tracing::info!(%status, "cancel requested"),
                    Err(err) => tracing::warn!(error = %err, "cancel rejected"),
                }
            }
        }
    }

    app.executor.shutdown().await;
    let task = service.task(task.id).await?;
    println!("{}", serde_json::to_string(&task)?);

    if task.status != TaskStatus::Completed {
        bail!("task ended as {}", task.status);
    }
    Ok(())
}

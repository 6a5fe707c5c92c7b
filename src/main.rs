use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use points_engine::observability::setup_logging;
use points_engine::{EngineConfig, FallbackSlotHistory, HttpPointsApi, PointsEngine};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEFAULT_CONFIG_PATH: &str = "points-engine.toml";

fn load_config() -> Result<EngineConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = if Path::new(&path).exists() {
        EngineConfig::from_file(&path).with_context(|| format!("loading {}", path))?
    } else {
        EngineConfig::default()
    };
    let config = config.with_env_overrides()?;
    config.validate()?;
    Ok(config)
}

async fn poll_slots(
    engine: Arc<PointsEngine>,
    rpc: Arc<FallbackSlotHistory>,
    every: Duration,
    token: CancellationToken,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => match rpc.current_slot().await {
                Ok(slot) => {
                    if let Some(report) = engine.on_slot(slot).await {
                        info!(
                            slot,
                            leaderboard = report.leaderboard_updated,
                            account = report.account_updated,
                            failures = report.failures.len(),
                            "synced"
                        );
                    }
                }
                Err(e) => warn!(error = %e, "could not read current slot"),
            },
        }
    }
}

async fn report_balance(engine: Arc<PointsEngine>, token: CancellationToken) {
    let mut points = engine.store().subscribe_computed_points();
    let mut last_logged = tokio::time::Instant::now();

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            changed = points.changed() => {
                if changed.is_err() {
                    break;
                }
                if last_logged.elapsed() < Duration::from_secs(10) {
                    continue;
                }
                last_logged = tokio::time::Instant::now();
                let current = *points.borrow_and_update();
                if let (Some(balance), Some(breakdown)) = (current, engine.store().breakdown()) {
                    info!(
                        points = %balance,
                        interest = %breakdown.interest,
                        clicks = %breakdown.clicks,
                        margin = %breakdown.margin,
                        bonus = %breakdown.bonus,
                        "balance"
                    );
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    let _log_guard = setup_logging(&config.logging)?;

    info!(api = %config.api.base_url, rpc = %config.rpc.primary_url, "starting points engine");

    let api = Arc::new(HttpPointsApi::new(&config)?);
    let rpc = Arc::new(FallbackSlotHistory::from_config(&config)?);
    let engine = Arc::new(PointsEngine::new(api, rpc.clone(), &config));
    let token = CancellationToken::new();

    engine.on_wallet(config.engine.wallet.clone()).await;

    let mut tasks = vec![
        tokio::spawn(poll_slots(
            engine.clone(),
            rpc,
            config.slot_poll_interval(),
            token.clone(),
        )),
        tokio::spawn(report_balance(engine.clone(), token.clone())),
    ];

    if let Some(every) = config.resync_interval() {
        let engine = engine.clone();
        let token = token.clone();
        tasks.push(tokio::spawn(async move {
            engine.run_resync_loop(every, token).await;
        }));
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    token.cancel();

    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "task ended abnormally");
        }
    }

    if let Some(ranked) = engine.store().snapshot().leaderboard {
        for entry in ranked.iter().take(10) {
            info!(
                rank = entry.sorted_rank,
                wallet = %entry.account.wallet,
                points = %entry.account.quantity,
                movement = ?entry.movement(),
                "leaderboard"
            );
        }
    }

    Ok(())
}

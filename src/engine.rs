use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use solana_sdk::clock::Slot;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::api::PointsApi;
use crate::click::ClickOutcome;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::slot_clock::{should_recompute, SlotClock, SlotHistory};
use crate::store::{PointsStore, SyncReport};
use crate::syncer::AccountSyncer;

/// Entry point for the two external inputs (wallet and slot) and for user clicks.
pub struct PointsEngine {
    store: Arc<PointsStore>,
    syncer: AccountSyncer,
    api: Arc<dyn PointsApi>,
    slot_clock: SlotClock,
    recompute_slot_delta: u64,
    last_estimate_slot: Mutex<Option<Slot>>,
}

impl PointsEngine {
    pub fn new(api: Arc<dyn PointsApi>, history: Arc<dyn SlotHistory>, config: &EngineConfig) -> Self {
        Self {
            store: PointsStore::new(config.tick_bounds()),
            syncer: AccountSyncer::new(api.clone()),
            api,
            slot_clock: SlotClock::new(history, config),
            recompute_slot_delta: config.slot_clock.recompute_slot_delta,
            last_estimate_slot: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<PointsStore> {
        &self.store
    }

    /// Wallet connected, switched or disconnected. Resyncs when it changed.
    pub async fn on_wallet(&self, wallet: Option<String>) -> Option<SyncReport> {
        if !self.store.set_wallet(wallet) {
            return None;
        }
        self.sync().await
    }

    /// New chain slot. Re-estimates slot time on cold start or after a material
    /// move, and resyncs when the estimate changed. Until a first estimate
    /// exists every slot counts as a cold start.
    pub async fn on_slot(&self, slot: Slot) -> Option<SyncReport> {
        self.store.set_current_slot(slot);

        let last = *self.last_estimate_slot.lock();
        if !should_recompute(last, slot, self.recompute_slot_delta) {
            return None;
        }

        let estimate = match self.slot_clock.compute_average_slot_time(slot).await {
            Ok(estimate) => estimate,
            Err(e) => {
                warn!(slot, error = %e, "slot time estimate failed, will retry on next slot");
                return None;
            }
        };
        match estimate {
            Some(_) => *self.last_estimate_slot.lock() = Some(slot),
            None => {
                warn!(slot, "no usable slot time estimate, accrual stays paused");
                *self.last_estimate_slot.lock() = None;
            }
        }
        if !self.store.set_average_slot_time(estimate) {
            return None;
        }
        self.sync().await
    }

    /// Refreshes leaderboard, config and the connected account. `None` while the
    /// slot or slot-time estimate is still unknown.
    #[instrument(skip(self))]
    pub async fn sync(&self) -> Option<SyncReport> {
        let ticket = self.store.begin_sync()?;
        let outcome = self.syncer.sync(&ticket.request).await;
        let report = self.store.commit_sync(ticket, outcome);
        debug!(?report, "sync committed");
        Some(report)
    }

    /// Claims the once-per-interval click bonus for the connected wallet.
    #[instrument(skip(self))]
    pub async fn submit_click(&self) -> EngineResult<ClickOutcome> {
        let ticket = self.store.begin_click()?;
        let result = self.api.click(&ticket.wallet).await;
        let outcome = self.store.finish_click(ticket, result)?;
        match outcome {
            ClickOutcome::Credited { current, max } => info!(current, max, "click credited"),
            ClickOutcome::Maxed { current, max } => info!(current, max, "daily click cap reached"),
        }
        Ok(outcome)
    }

    /// Periodic full resync until cancelled.
    pub async fn run_resync_loop(&self, every: Duration, token: CancellationToken) {
        let mut interval = interval_at(Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("resync loop stopped");
                    break;
                }
                _ = interval.tick() => {
                    if let Some(report) = self.sync().await {
                        if !report.failures.is_empty() {
                            warn!(failures = report.failures.len(), "periodic resync incomplete");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::model::{ClickResponse, ClickStatus};
    use crate::testing::{raw_account, sample_config, FakePointsApi, FakeSlotHistory, WALLET_A, WALLET_B};
    use rust_decimal_macros::dec;
    use std::time::{SystemTime, UNIX_EPOCH};

    const CURRENT: Slot = 300_000_000;

    fn history() -> FakeSlotHistory {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
        // roughly 0.4s per slot
        FakeSlotHistory::default().with_block(CURRENT - 5_000_000, now - 2_000_000)
    }

    fn api() -> FakePointsApi {
        FakePointsApi::default()
            .with_leaderboard(vec![
                raw_account(WALLET_A, "100", "1", CURRENT),
                raw_account(WALLET_B, "300", "2", CURRENT),
            ])
            .with_config(sample_config())
            .with_account(raw_account(WALLET_A, "100", "1", CURRENT))
            .with_account(raw_account(WALLET_B, "300", "2", CURRENT))
    }

    fn engine(api: Arc<FakePointsApi>, history: FakeSlotHistory) -> Arc<PointsEngine> {
        Arc::new(PointsEngine::new(api, Arc::new(history), &EngineConfig::default()))
    }

    #[tokio::test]
    async fn test_no_sync_before_estimate() {
        let api = Arc::new(api());
        let engine = engine(api.clone(), history());

        assert!(engine.on_wallet(Some(WALLET_A.to_string())).await.is_none());
        assert_eq!(api.account_calls(), 0);
        assert!(engine.store().snapshot().account.is_none());
    }

    #[tokio::test]
    async fn test_slot_then_wallet_loads_account() {
        let api = Arc::new(api());
        let engine = engine(api.clone(), history());

        let report = engine.on_slot(CURRENT).await.unwrap();
        assert!(report.leaderboard_updated);
        assert!(!report.account_updated);

        let report = engine.on_wallet(Some(WALLET_A.to_string())).await.unwrap();
        assert!(report.account_updated);

        let store = engine.store();
        let estimate = store.average_slot_time().unwrap();
        assert!((estimate - 0.4).abs() < 0.01);
        assert_eq!(store.displayed_points(), Some(dec!(100)));
        assert!(store.tick_period().is_some());

        let ranked = store.snapshot().leaderboard.unwrap();
        assert_eq!(ranked[0].account.wallet, WALLET_B);
    }

    #[tokio::test]
    async fn test_estimate_not_recomputed_for_small_moves() {
        let api = Arc::new(api());
        let engine = engine(api.clone(), history());
        engine.on_wallet(Some(WALLET_A.to_string())).await;
        engine.on_slot(CURRENT).await.unwrap();
        assert_eq!(api.account_calls(), 1);

        assert!(engine.on_slot(CURRENT + 10).await.is_none());
        assert_eq!(api.account_calls(), 1);
        assert_eq!(engine.store().snapshot().current_slot, Some(CURRENT + 10));
    }

    #[tokio::test]
    async fn test_missing_estimate_keeps_ticking_off_until_history_appears() {
        let api = Arc::new(api());
        let history = Arc::new(FakeSlotHistory::default());
        let engine = Arc::new(PointsEngine::new(api.clone(), history.clone(), &EngineConfig::default()));
        engine.on_wallet(Some(WALLET_A.to_string())).await;

        assert!(engine.on_slot(CURRENT).await.is_none());
        assert!(engine.store().average_slot_time().is_none());
        assert!(engine.store().tick_period().is_none());
        assert_eq!(api.account_calls(), 0);

        // a few slots later the sampled block becomes available
        let next = CURRENT + 5;
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
        history.insert_block(next - 5_000_000, now - 2_000_000);

        let report = engine.on_slot(next).await.unwrap();
        assert!(report.account_updated);
        assert!(engine.store().average_slot_time().is_some());
        assert!(engine.store().tick_period().is_some());
        assert_eq!(api.account_calls(), 1);
    }

    #[tokio::test]
    async fn test_click_round_trip() {
        let api = Arc::new(api());
        api.push_click(Ok(ClickResponse {
            current: 1,
            max: 5,
            success: true,
        }));
        let engine = engine(api.clone(), history());
        engine.on_slot(CURRENT).await;
        engine.on_wallet(Some(WALLET_A.to_string())).await;

        let outcome = engine.submit_click().await.unwrap();
        assert_eq!(outcome, ClickOutcome::Credited { current: 1, max: 5 });

        let tick = engine.store().tick().unwrap();
        assert!(tick.credited_click);
        assert_eq!(tick.computed_points, dec!(102));
    }

    #[tokio::test]
    async fn test_maxed_click_does_not_hit_network() {
        let api = Arc::new(api());
        api.push_click(Ok(ClickResponse {
            current: 5,
            max: 5,
            success: false,
        }));
        let engine = engine(api.clone(), history());
        engine.on_slot(CURRENT).await;
        engine.on_wallet(Some(WALLET_A.to_string())).await;

        let outcome = engine.submit_click().await.unwrap();
        assert_eq!(outcome, ClickOutcome::Maxed { current: 5, max: 5 });
        assert_eq!(api.click_calls(), 1);

        let err = engine.submit_click().await.unwrap_err();
        assert!(matches!(err, EngineError::DailyCapReached { .. }));
        assert_eq!(api.click_calls(), 1);
        let click = engine.store().snapshot().click;
        assert_eq!(click.status, ClickStatus::Maxed);
        assert_eq!((click.current, click.max), (Some(5), Some(5)));
    }

    #[tokio::test]
    async fn test_click_without_wallet() {
        let api = Arc::new(api());
        let engine = engine(api.clone(), history());
        assert!(matches!(
            engine.submit_click().await,
            Err(EngineError::WalletNotConnected)
        ));
        assert_eq!(api.click_calls(), 0);
    }

    #[tokio::test]
    async fn test_sync_for_replaced_wallet_is_discarded() {
        let api = Arc::new(api());
        let engine = engine(api.clone(), history());
        engine.on_slot(CURRENT).await;
        engine.store().set_wallet(Some(WALLET_A.to_string()));

        let gate = api.gate_accounts();
        let in_flight = tokio::spawn({
            let engine = engine.clone();
            async move { engine.sync().await }
        });
        while api.account_calls() == 0 {
            tokio::task::yield_now().await;
        }

        engine.store().set_wallet(Some(WALLET_B.to_string()));
        gate.notify_one();

        let report = in_flight.await.unwrap().unwrap();
        assert!(report.superseded);
        assert!(!report.account_updated);
        assert!(engine.store().snapshot().account.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resync_loop_until_cancelled() {
        let api = Arc::new(api());
        let engine = engine(api.clone(), history());
        engine.on_slot(CURRENT).await;
        engine.on_wallet(Some(WALLET_A.to_string())).await;
        assert_eq!(api.account_calls(), 1);

        let token = CancellationToken::new();
        let handle = tokio::spawn({
            let engine = engine.clone();
            let token = token.clone();
            async move { engine.run_resync_loop(Duration::from_secs(60), token).await }
        });

        tokio::time::sleep(Duration::from_secs(125)).await;
        assert_eq!(api.account_calls(), 3);

        token.cancel();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(api.account_calls(), 3);
    }
}

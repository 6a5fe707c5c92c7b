//! Single owner of the engine's mutable state.
//!
//! Network results and timer ticks both funnel through [`PointsStore`], which
//! applies them under one lock and republishes the read-only views.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use solana_sdk::clock::Slot;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::accrual::{self, TickOutcome};
use crate::click::ClickOutcome;
use crate::error::{EngineError, EngineResult};
use crate::leaderboard::{self, RankedEntry};
use crate::model::{ClickResponse, ClickState, ClickStatus, DerivedPoints, PointsAccount, PointsBreakdown, PointsConfig};
use crate::syncer::{SyncOutcome, SyncRequest};

#[derive(Default)]
struct StoreState {
    wallet: Option<String>,
    wallet_generation: u64,
    current_slot: Option<Slot>,
    average_slot_time: Option<f64>,
    account: Option<PointsAccount>,
    derived: DerivedPoints,
    click: ClickState,
    leaderboard: Option<Arc<Vec<RankedEntry>>>,
    config: Option<Arc<PointsConfig>>,
    next_sync_seq: u64,
    leaderboard_seq: u64,
    config_seq: u64,
    account_seq: u64,
}

struct Channels {
    account: watch::Sender<Option<PointsAccount>>,
    click: watch::Sender<ClickState>,
    computed_points: watch::Sender<Option<Decimal>>,
    computed_clicks: watch::Sender<Option<Decimal>>,
    leaderboard: watch::Sender<Option<Arc<Vec<RankedEntry>>>>,
    config: watch::Sender<Option<Arc<PointsConfig>>>,
}

impl Channels {
    fn new() -> Self {
        Self {
            account: watch::channel(None).0,
            click: watch::channel(ClickState::default()).0,
            computed_points: watch::channel(None).0,
            computed_clicks: watch::channel(None).0,
            leaderboard: watch::channel(None).0,
            config: watch::channel(None).0,
        }
    }
}

struct Ticker {
    period: Duration,
    token: CancellationToken,
}

/// Issued by [`PointsStore::begin_sync`]; carries what the commit is checked against.
#[derive(Debug, Clone)]
pub struct SyncTicket {
    pub seq: u64,
    pub generation: u64,
    pub request: SyncRequest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub leaderboard_updated: bool,
    pub config_updated: bool,
    pub account_updated: bool,
    /// The wallet changed while the sync was in flight; its account was dropped.
    pub superseded: bool,
    pub failures: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ClickTicket {
    pub wallet: String,
    pub generation: u64,
}

/// Point-in-time copy of everything the presentation layer reads.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub wallet: Option<String>,
    pub current_slot: Option<Slot>,
    pub average_slot_time: Option<f64>,
    pub account: Option<PointsAccount>,
    pub click: ClickState,
    pub computed_points: Option<Decimal>,
    pub computed_clicks: Option<Decimal>,
    pub leaderboard: Option<Arc<Vec<RankedEntry>>>,
    pub config: Option<Arc<PointsConfig>>,
}

pub struct PointsStore {
    state: Mutex<StoreState>,
    channels: Channels,
    ticker: Mutex<Option<Ticker>>,
    tick_bounds: (Duration, Duration),
}

impl PointsStore {
    pub fn new(tick_bounds: (Duration, Duration)) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(StoreState::default()),
            channels: Channels::new(),
            ticker: Mutex::new(None),
            tick_bounds,
        })
    }

    fn publish(&self, state: &StoreState) {
        self.channels.account.send_if_modified(|current| {
            let changed = *current != state.account;
            if changed {
                *current = state.account.clone();
            }
            changed
        });
        self.channels.click.send_if_modified(|current| replace_if_changed(current, state.click));
        self.channels
            .computed_points
            .send_if_modified(|current| replace_if_changed(current, state.derived.computed_points));
        self.channels
            .computed_clicks
            .send_if_modified(|current| replace_if_changed(current, state.derived.computed_clicks));
        self.channels.leaderboard.send_if_modified(|current| {
            let changed = !same_arc(current, &state.leaderboard);
            if changed {
                *current = state.leaderboard.clone();
            }
            changed
        });
        self.channels.config.send_if_modified(|current| {
            let changed = !same_arc(current, &state.config);
            if changed {
                *current = state.config.clone();
            }
            changed
        });
    }

    // ---- inbound collaborators ----

    /// Returns true when the wallet actually changed. Any change drops all
    /// wallet-specific state and invalidates in-flight syncs and clicks.
    pub fn set_wallet(self: &Arc<Self>, wallet: Option<String>) -> bool {
        {
            let mut state = self.state.lock();
            if state.wallet == wallet {
                return false;
            }
            info!(from = ?state.wallet, to = ?wallet, "wallet changed");
            state.wallet = wallet;
            state.wallet_generation += 1;
            state.account = None;
            state.derived.clear();
            state.click.reset();
            self.publish(&state);
        }
        self.reschedule_ticker();
        true
    }

    pub fn set_current_slot(&self, slot: Slot) {
        self.state.lock().current_slot = Some(slot);
    }

    /// Returns true when the estimate changed. The tick timer follows it.
    pub fn set_average_slot_time(self: &Arc<Self>, seconds: Option<f64>) -> bool {
        let seconds = seconds.filter(|s| s.is_finite() && *s > 0.0);
        {
            let mut state = self.state.lock();
            if state.average_slot_time == seconds {
                return false;
            }
            debug!(from = ?state.average_slot_time, to = ?seconds, "slot time estimate changed");
            state.average_slot_time = seconds;
        }
        self.reschedule_ticker();
        true
    }

    // ---- sync ----

    /// `None` until both the current slot and a slot-time estimate are known.
    pub fn begin_sync(&self) -> Option<SyncTicket> {
        let mut state = self.state.lock();
        let (Some(current_slot), Some(average_slot_time)) = (state.current_slot, state.average_slot_time) else {
            debug!("sync deferred: slot or slot time unknown");
            return None;
        };
        state.next_sync_seq += 1;
        Some(SyncTicket {
            seq: state.next_sync_seq,
            generation: state.wallet_generation,
            request: SyncRequest {
                wallet: state.wallet.clone(),
                current_slot,
                average_slot_time,
            },
        })
    }

    /// Applies a sync result. Each endpoint commits independently; failures keep
    /// the previous value, and results older than an already committed sync are
    /// ignored.
    pub fn commit_sync(self: &Arc<Self>, ticket: SyncTicket, outcome: SyncOutcome) -> SyncReport {
        let mut report = SyncReport::default();
        let account_loaded;
        {
            let mut state = self.state.lock();

            match outcome.leaderboard {
                Ok(entries) if ticket.seq > state.leaderboard_seq => {
                    state.leaderboard = Some(Arc::new(leaderboard::rank(&entries)));
                    state.leaderboard_seq = ticket.seq;
                    report.leaderboard_updated = true;
                }
                Ok(_) => debug!(seq = ticket.seq, "newer leaderboard already committed"),
                Err(e) => {
                    warn!(error = %e, "leaderboard refresh failed, keeping previous");
                    report.failures.push(e.to_string());
                }
            }

            match outcome.config {
                Ok(config) if ticket.seq > state.config_seq => {
                    state.config = Some(Arc::new(config));
                    state.config_seq = ticket.seq;
                    report.config_updated = true;
                }
                Ok(_) => debug!(seq = ticket.seq, "newer config already committed"),
                Err(e) => {
                    warn!(error = %e, "config refresh failed, keeping previous");
                    report.failures.push(e.to_string());
                }
            }

            match outcome.account {
                _ if ticket.generation != state.wallet_generation => {
                    debug!(seq = ticket.seq, "discarding account from superseded wallet");
                    report.superseded = true;
                }
                None => {}
                Some(Ok(synced)) if ticket.seq > state.account_seq => {
                    state.account = Some(synced.account);
                    state.account_seq = ticket.seq;
                    // the snapshot wins: re-seed on next read, and a granted click
                    // is already part of the server's quantity
                    state.derived.computed_points = None;
                    state.derived.computed_clicks = Some(synced.click_seed);
                    if state.click.status == ClickStatus::Clicked {
                        state.click.consume();
                    }
                    report.account_updated = true;
                }
                Some(Ok(_)) => debug!(seq = ticket.seq, "newer account already committed"),
                Some(Err(e)) => {
                    warn!(error = %e, "account refresh failed, keeping previous");
                    report.failures.push(e.to_string());
                }
            }

            account_loaded = state.account.is_some();
            self.publish(&state);
        }

        if account_loaded {
            self.reschedule_ticker();
        }
        report
    }

    // ---- accrual ----

    /// One accrual step. No-op without a loaded account.
    pub fn tick(&self) -> Option<TickOutcome> {
        let mut state = self.state.lock();
        let StoreState {
            account,
            derived,
            click,
            ..
        } = &mut *state;
        let account = account.as_ref()?;
        let outcome = accrual::tick(account, derived, click);
        self.publish(&state);
        Some(outcome)
    }

    fn desired_period(&self) -> Option<Duration> {
        let state = self.state.lock();
        state.account.as_ref()?;
        let (min, max) = self.tick_bounds;
        state
            .average_slot_time
            .and_then(|seconds| crate::slot_clock::tick_period(seconds, min, max))
    }

    /// Starts, restarts or stops the tick task so it matches the current account
    /// and slot-time estimate.
    pub fn reschedule_ticker(self: &Arc<Self>) {
        let mut ticker = self.ticker.lock();
        let period = self.desired_period();

        match (period, ticker.as_ref()) {
            (Some(period), Some(running)) if running.period == period => {}
            (None, None) => {}
            (None, Some(_)) => {
                if let Some(running) = ticker.take() {
                    running.token.cancel();
                }
                debug!("tick timer suspended");
            }
            (Some(period), _) => {
                let Ok(handle) = tokio::runtime::Handle::try_current() else {
                    warn!("no tokio runtime available, tick timer not started");
                    return;
                };
                if let Some(running) = ticker.take() {
                    running.token.cancel();
                }
                let token = CancellationToken::new();
                handle.spawn(run_ticker(Arc::downgrade(self), period, token.clone()));
                debug!(?period, "tick timer scheduled");
                *ticker = Some(Ticker { period, token });
            }
        }
    }

    pub fn tick_period(&self) -> Option<Duration> {
        self.ticker.lock().as_ref().map(|t| t.period)
    }

    // ---- click ----

    /// Optimistic half of a click: validates and moves to `Requested`.
    pub fn begin_click(&self) -> EngineResult<ClickTicket> {
        let mut state = self.state.lock();
        let wallet = state.wallet.clone().ok_or(EngineError::WalletNotConnected)?;
        state.click.begin_request()?;
        self.publish(&state);
        Ok(ClickTicket {
            wallet,
            generation: state.wallet_generation,
        })
    }

    pub fn finish_click(
        &self,
        ticket: ClickTicket,
        result: EngineResult<ClickResponse>,
    ) -> EngineResult<ClickOutcome> {
        let mut state = self.state.lock();
        if ticket.generation != state.wallet_generation {
            debug!("discarding click response for superseded wallet");
            return Err(EngineError::Superseded);
        }

        match result {
            Ok(response) => {
                let outcome = state.click.resolve(response);
                self.publish(&state);
                Ok(outcome)
            }
            Err(e) => {
                warn!(error = %e, "click request failed");
                state.click.fail();
                self.publish(&state);
                Err(e)
            }
        }
    }

    // ---- read side ----

    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.lock();
        StoreSnapshot {
            wallet: state.wallet.clone(),
            current_slot: state.current_slot,
            average_slot_time: state.average_slot_time,
            account: state.account.clone(),
            click: state.click,
            computed_points: state.derived.computed_points,
            computed_clicks: state.derived.computed_clicks,
            leaderboard: state.leaderboard.clone(),
            config: state.config.clone(),
        }
    }

    /// The extrapolated balance, falling back to the snapshot before the first tick.
    pub fn displayed_points(&self) -> Option<Decimal> {
        let state = self.state.lock();
        state.account.as_ref().map(|a| state.derived.points_or(a))
    }

    pub fn breakdown(&self) -> Option<PointsBreakdown> {
        let state = self.state.lock();
        state
            .account
            .as_ref()
            .map(|a| PointsBreakdown::compute(a, &state.derived))
    }

    pub fn average_slot_time(&self) -> Option<f64> {
        self.state.lock().average_slot_time
    }

    pub fn subscribe_account(&self) -> watch::Receiver<Option<PointsAccount>> {
        self.channels.account.subscribe()
    }

    pub fn subscribe_click(&self) -> watch::Receiver<ClickState> {
        self.channels.click.subscribe()
    }

    pub fn subscribe_computed_points(&self) -> watch::Receiver<Option<Decimal>> {
        self.channels.computed_points.subscribe()
    }

    pub fn subscribe_computed_clicks(&self) -> watch::Receiver<Option<Decimal>> {
        self.channels.computed_clicks.subscribe()
    }

    pub fn subscribe_leaderboard(&self) -> watch::Receiver<Option<Arc<Vec<RankedEntry>>>> {
        self.channels.leaderboard.subscribe()
    }

    pub fn subscribe_config(&self) -> watch::Receiver<Option<Arc<PointsConfig>>> {
        self.channels.config.subscribe()
    }
}

impl Drop for PointsStore {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.get_mut().take() {
            ticker.token.cancel();
        }
    }
}

fn replace_if_changed<T: PartialEq + Copy>(current: &mut T, next: T) -> bool {
    if *current == next {
        return false;
    }
    *current = next;
    true
}

fn same_arc<T>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

async fn run_ticker(store: Weak<PointsStore>, period: Duration, token: CancellationToken) {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                let Some(store) = store.upgrade() else { break };
                store.tick();
            }
        }
    }
}

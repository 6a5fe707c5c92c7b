//! In-process stand-ins for the points service and the chain.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::clock::{Slot, UnixTimestamp};
use tokio::sync::Notify;

use crate::api::PointsApi;
use crate::error::{EngineError, EngineResult, Endpoint};
use crate::model::{
    AdjustmentKind, AdjustmentRecord, ClickResponse, PointsConfig, PointsConfigEntry,
    RawPointsAccount, Side, WireNumber,
};
use crate::slot_clock::SlotHistory;

pub const WALLET_A: &str = "4UpD2fh7xH3VP9QQaXtsS1YY3bxzWhtfpks7FatyKvdY";
pub const WALLET_B: &str = "So1endDq2YkqhipRh3WViPa8hVd5eU36gyyiRcu3FaM";

pub fn raw_account(wallet: &str, quantity: &str, points_per_slot: &str, slot: u64) -> RawPointsAccount {
    RawPointsAccount {
        id: Some(1),
        wallet: wallet.to_string(),
        quantity: Some(WireNumber::from(quantity)),
        timestamp: Some(WireNumber::from(1_700_000_000)),
        slot: Some(slot),
        stale: false,
        rank: Some(0),
        rank_delta: Some(0),
        points_per_slot: Some(WireNumber::from(points_per_slot)),
        adjustments: None,
    }
}

pub fn adjustment(quantity: i64, kind: AdjustmentKind) -> AdjustmentRecord {
    AdjustmentRecord {
        quantity: WireNumber::from(quantity),
        kind,
    }
}

pub fn sample_config() -> PointsConfig {
    PointsConfig(vec![PointsConfigEntry {
        reserve: "usdc".to_string(),
        market: "main".to_string(),
        side: Side::Supply,
        weight: 1.0,
    }])
}

#[derive(Default)]
struct FakeState {
    leaderboard: Option<Vec<RawPointsAccount>>,
    config: Option<PointsConfig>,
    accounts: BTreeMap<String, RawPointsAccount>,
    adjustments: BTreeMap<String, Vec<AdjustmentRecord>>,
    clicks: VecDeque<EngineResult<ClickResponse>>,
}

/// Scripted points service. Missing data answers with a network failure.
#[derive(Default)]
pub struct FakePointsApi {
    state: Mutex<FakeState>,
    click_calls: AtomicUsize,
    account_calls: AtomicUsize,
    account_gate: Mutex<Option<std::sync::Arc<Notify>>>,
}

impl FakePointsApi {
    pub fn with_leaderboard(self, entries: Vec<RawPointsAccount>) -> Self {
        self.state.lock().leaderboard = Some(entries);
        self
    }

    pub fn with_config(self, config: PointsConfig) -> Self {
        self.state.lock().config = Some(config);
        self
    }

    pub fn with_account(self, account: RawPointsAccount) -> Self {
        self.set_account(account);
        self
    }

    pub fn with_adjustments(self, wallet: &str, records: Vec<AdjustmentRecord>) -> Self {
        self.state.lock().adjustments.insert(wallet.to_string(), records);
        self
    }

    pub fn set_account(&self, account: RawPointsAccount) {
        self.state.lock().accounts.insert(account.wallet.clone(), account);
    }

    pub fn push_click(&self, result: EngineResult<ClickResponse>) {
        self.state.lock().clicks.push_back(result);
    }

    /// Account fetches wait on the returned handle until it is notified.
    pub fn gate_accounts(&self) -> std::sync::Arc<Notify> {
        let notify = std::sync::Arc::new(Notify::new());
        *self.account_gate.lock() = Some(notify.clone());
        notify
    }

    pub fn click_calls(&self) -> usize {
        self.click_calls.load(Ordering::SeqCst)
    }

    pub fn account_calls(&self) -> usize {
        self.account_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PointsApi for FakePointsApi {
    async fn leaderboard(&self) -> EngineResult<Vec<RawPointsAccount>> {
        self.state
            .lock()
            .leaderboard
            .clone()
            .ok_or_else(|| EngineError::network(Endpoint::Leaderboard, "HTTP error: 503"))
    }

    async fn config(&self) -> EngineResult<PointsConfig> {
        self.state
            .lock()
            .config
            .clone()
            .ok_or_else(|| EngineError::network(Endpoint::Config, "HTTP error: 503"))
    }

    async fn account(&self, wallet: &str) -> EngineResult<RawPointsAccount> {
        self.account_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.account_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.state
            .lock()
            .accounts
            .get(wallet)
            .cloned()
            .ok_or_else(|| EngineError::network(Endpoint::Account, "HTTP error: 404"))
    }

    async fn adjustments(&self, wallet: &str) -> EngineResult<Vec<AdjustmentRecord>> {
        self.state
            .lock()
            .adjustments
            .get(wallet)
            .cloned()
            .ok_or_else(|| EngineError::network(Endpoint::Adjustments, "HTTP error: 404"))
    }

    async fn click(&self, _wallet: &str) -> EngineResult<ClickResponse> {
        self.click_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .clicks
            .pop_front()
            .unwrap_or_else(|| Err(EngineError::network(Endpoint::Click, "connection reset")))
    }
}

/// Produced slots with optional block times.
#[derive(Default)]
pub struct FakeSlotHistory {
    blocks: Mutex<BTreeMap<Slot, Option<UnixTimestamp>>>,
    windows: Mutex<Vec<(Slot, Slot)>>,
}

impl FakeSlotHistory {
    pub fn with_block(self, slot: Slot, time: UnixTimestamp) -> Self {
        self.insert_block(slot, time);
        self
    }

    pub fn with_untimed_block(self, slot: Slot) -> Self {
        self.blocks.lock().insert(slot, None);
        self
    }

    /// Makes a block visible to later queries.
    pub fn insert_block(&self, slot: Slot, time: UnixTimestamp) {
        self.blocks.lock().insert(slot, Some(time));
    }

    pub fn requested_windows(&self) -> Vec<(Slot, Slot)> {
        self.windows.lock().clone()
    }
}

#[async_trait]
impl SlotHistory for FakeSlotHistory {
    async fn produced_slots(&self, start: Slot, end: Slot) -> EngineResult<Vec<Slot>> {
        self.windows.lock().push((start, end));
        Ok(self.blocks.lock().range(start..=end).map(|(slot, _)| *slot).collect())
    }

    async fn block_time(&self, slot: Slot) -> EngineResult<Option<UnixTimestamp>> {
        Ok(self.blocks.lock().get(&slot).copied().flatten())
    }
}

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::RpcError;
use solana_sdk::clock::{Slot, UnixTimestamp};
use solana_sdk::commitment_config::CommitmentConfig;
use std::str::FromStr;
use tracing::{debug, instrument, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

const BLOCK_NOT_AVAILABLE: i64 = -32004;
const SLOT_SKIPPED: i64 = -32007;
const LONG_TERM_STORAGE_SLOT_SKIPPED: i64 = -32009;

/// Read access to historical block production.
#[async_trait]
pub trait SlotHistory: Send + Sync {
    /// Slots in `[start, end]` that actually produced a block, ascending.
    async fn produced_slots(&self, start: Slot, end: Slot) -> EngineResult<Vec<Slot>>;
    /// `None` when the cluster has no timestamp for the slot.
    async fn block_time(&self, slot: Slot) -> EngineResult<Option<UnixTimestamp>>;
}

fn is_missing_block(err: &ClientError) -> bool {
    matches!(
        err.kind(),
        ClientErrorKind::RpcError(RpcError::RpcResponseError { code, .. })
            if matches!(*code, BLOCK_NOT_AVAILABLE | SLOT_SKIPPED | LONG_TERM_STORAGE_SLOT_SKIPPED)
    )
}

#[async_trait]
impl SlotHistory for RpcClient {
    async fn produced_slots(&self, start: Slot, end: Slot) -> EngineResult<Vec<Slot>> {
        Ok(self.get_blocks(start, Some(end)).await?)
    }

    async fn block_time(&self, slot: Slot) -> EngineResult<Option<UnixTimestamp>> {
        match self.get_block_time(slot).await {
            Ok(ts) => Ok(Some(ts)),
            Err(e) if is_missing_block(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// RPC endpoints tried in order until one answers.
pub struct FallbackSlotHistory {
    clients: Vec<Arc<RpcClient>>,
}

impl FallbackSlotHistory {
    pub fn new(clients: Vec<Arc<RpcClient>>) -> EngineResult<Self> {
        if clients.is_empty() {
            return Err(EngineError::Config("At least one RPC URL must be provided".to_string()));
        }
        Ok(Self { clients })
    }

    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        let commitment = CommitmentConfig::from_str(&config.rpc.commitment)
            .map_err(|e| EngineError::Config(format!("Invalid commitment: {}", e)))?;
        let clients = config
            .rpc_urls()
            .into_iter()
            .map(|url| {
                Arc::new(RpcClient::new_with_timeout_and_commitment(
                    url,
                    config.rpc_timeout(),
                    commitment,
                ))
            })
            .collect();
        Self::new(clients)
    }

    pub async fn current_slot(&self) -> EngineResult<Slot> {
        let mut last_error = None;
        for client in &self.clients {
            match client.get_slot().await {
                Ok(slot) => return Ok(slot),
                Err(e) => {
                    warn!(url = %client.url(), error = %e, "getSlot failed, trying next endpoint");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.map(EngineError::from).unwrap_or_else(|| {
            EngineError::Config("no RPC endpoints configured".to_string())
        }))
    }
}

#[async_trait]
impl SlotHistory for FallbackSlotHistory {
    async fn produced_slots(&self, start: Slot, end: Slot) -> EngineResult<Vec<Slot>> {
        let mut last_error = None;
        for client in &self.clients {
            match client.produced_slots(start, end).await {
                Ok(slots) => return Ok(slots),
                Err(e) => {
                    warn!(url = %client.url(), error = %e, "getBlocks failed, trying next endpoint");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| EngineError::Config("no RPC endpoints configured".to_string())))
    }

    async fn block_time(&self, slot: Slot) -> EngineResult<Option<UnixTimestamp>> {
        let mut last_error = None;
        for client in &self.clients {
            match client.block_time(slot).await {
                Ok(ts) => return Ok(ts),
                Err(e) => {
                    warn!(url = %client.url(), error = %e, "getBlockTime failed, trying next endpoint");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| EngineError::Config("no RPC endpoints configured".to_string())))
    }
}

/// Estimates wall-clock seconds per slot from a sample far enough back to be
/// stable against short-term skips.
pub struct SlotClock {
    history: Arc<dyn SlotHistory>,
    sample_offset: u64,
    sample_window: u64,
}

impl SlotClock {
    pub fn new(history: Arc<dyn SlotHistory>, config: &EngineConfig) -> Self {
        Self {
            history,
            sample_offset: config.slot_clock.sample_offset_slots,
            sample_window: config.slot_clock.sample_window_slots,
        }
    }

    pub async fn compute_average_slot_time(&self, current_slot: Slot) -> EngineResult<Option<f64>> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        self.compute_average_slot_time_at(current_slot, now).await
    }

    /// `Ok(None)` means "no usable estimate": ticking must not start.
    #[instrument(skip(self))]
    pub async fn compute_average_slot_time_at(
        &self,
        current_slot: Slot,
        now_unix: f64,
    ) -> EngineResult<Option<f64>> {
        let Some(end) = current_slot.checked_sub(self.sample_offset) else {
            return Ok(None);
        };
        let Some(start) = end.checked_sub(self.sample_window) else {
            return Ok(None);
        };

        let produced = self.history.produced_slots(start, end).await?;
        let Some(sampled) = produced.into_iter().filter(|s| (start..=end).contains(s)).min() else {
            debug!(start, end, "no produced slot in sample window");
            return Ok(None);
        };

        let Some(block_time) = self.history.block_time(sampled).await? else {
            debug!(sampled, "sampled slot has no block time");
            return Ok(None);
        };

        let elapsed = now_unix - block_time as f64;
        if !elapsed.is_finite() || elapsed <= 0.0 {
            warn!(sampled, block_time, now_unix, "block time is not in the past");
            return Ok(None);
        }

        let seconds = elapsed / (current_slot - sampled) as f64;
        debug!(sampled, seconds, "average slot time estimated");
        Ok(Some(seconds))
    }
}

/// Converts a raw estimate into a timer period clamped to `[min, max]`.
pub fn tick_period(average_slot_time: f64, min: Duration, max: Duration) -> Option<Duration> {
    if !average_slot_time.is_finite() || average_slot_time <= 0.0 {
        return None;
    }
    let period = Duration::try_from_secs_f64(average_slot_time).unwrap_or(max);
    Some(period.clamp(min, max))
}

/// Cold start, or the slot moved at least `delta` since the last estimate.
pub fn should_recompute(last_estimated_at: Option<Slot>, current_slot: Slot, delta: u64) -> bool {
    match last_estimated_at {
        None => true,
        Some(last) => current_slot.abs_diff(last) >= delta,
    }
}

use std::sync::Arc;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use solana_sdk::clock::Slot;
use tracing::{debug, instrument, warn};

use crate::api::PointsApi;
use crate::error::{EngineError, EngineResult, Endpoint};
use crate::model::{AdjustmentRecord, Adjustments, PointsAccount, PointsConfig, RawAdjustments, RawPointsAccount};

const SECONDS_PER_DAY: i64 = 86_400;

/// `points_per_slot * 86400 / average_slot_time`. Zero while the estimate is
/// unusable, `None` when the rate is too large to represent.
pub fn points_per_day(points_per_slot: Decimal, average_slot_time: f64) -> Option<Decimal> {
    let Some(slot_time) = Decimal::from_f64(average_slot_time).filter(|t| *t > Decimal::ZERO) else {
        return Some(Decimal::ZERO);
    };
    points_per_slot
        .checked_mul(Decimal::from(SECONDS_PER_DAY))?
        .checked_div(slot_time)
}

fn parse_embedded(raw: Option<RawAdjustments>, endpoint: Endpoint) -> EngineResult<Adjustments> {
    let Some(raw) = raw else {
        return Ok(Adjustments::default());
    };
    let field = |value: Option<crate::model::WireNumber>, name: &'static str| {
        value.map_or(Ok(Decimal::ZERO), |v| v.parse(endpoint, name))
    };
    Ok(Adjustments {
        click: field(raw.click, "adjustments.click")?,
        margin_trade: field(raw.margin_trade, "adjustments.margin_trade")?,
        claim: field(raw.claim, "adjustments.claim")?,
        manual: field(raw.manual, "adjustments.manual")?,
    })
}

/// Converts a wire record into a display-ready account. The 0-based server
/// rank becomes 1-based here, which is why the input type is consumed.
pub fn normalize_account(
    raw: RawPointsAccount,
    average_slot_time: f64,
    endpoint: Endpoint,
) -> EngineResult<PointsAccount> {
    let quantity = match &raw.quantity {
        Some(q) => q.parse(endpoint, "quantity")?,
        None => Decimal::ZERO,
    };
    let points_per_slot = match &raw.points_per_slot {
        Some(p) => p.parse(endpoint, "pointsPerSlot")?,
        None => Decimal::ZERO,
    };
    let snapshot_timestamp = match &raw.timestamp {
        Some(t) => t.parse(endpoint, "timestamp")?.trunc().to_i64(),
        None => None,
    };

    Ok(PointsAccount {
        id: raw.id,
        wallet: raw.wallet,
        quantity,
        points_per_slot,
        points_per_day: points_per_day(points_per_slot, average_slot_time).ok_or_else(|| {
            EngineError::malformed(endpoint, "pointsPerSlot", points_per_slot.to_string())
        })?,
        snapshot_slot: raw.slot.unwrap_or(0),
        snapshot_timestamp,
        stale: raw.stale,
        rank: raw.rank.unwrap_or(-1) + 1,
        rank_delta: raw.rank_delta.unwrap_or(0),
        adjustments: parse_embedded(raw.adjustments, endpoint)?,
    })
}

pub fn reduce_adjustments(records: &[AdjustmentRecord]) -> EngineResult<Adjustments> {
    let mut totals = Adjustments::default();
    for record in records {
        let quantity = record.quantity.parse(Endpoint::Adjustments, "quantity")?;
        if !totals.add(record.kind, quantity) {
            debug!(kind = ?record.kind, %quantity, "ignoring uncategorized adjustment");
        }
    }
    Ok(totals)
}

/// Projects the snapshot forward to `current_slot`. A snapshot newer than the
/// caller's slot is left as is. `None` on overflow.
pub fn project_quantity(account: &PointsAccount, current_slot: Slot) -> Option<Decimal> {
    let elapsed = current_slot.saturating_sub(account.snapshot_slot);
    account
        .points_per_slot
        .checked_mul(Decimal::from(elapsed))?
        .checked_add(account.quantity)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncRequest {
    pub wallet: Option<String>,
    pub current_slot: Slot,
    pub average_slot_time: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncedAccount {
    pub account: PointsAccount,
    /// Seed for the locally tracked click total.
    pub click_seed: Decimal,
}

/// Per-endpoint results of one sync. `account` is `None` when no wallet was connected.
#[derive(Debug)]
pub struct SyncOutcome {
    pub leaderboard: EngineResult<Vec<PointsAccount>>,
    pub config: EngineResult<PointsConfig>,
    pub account: Option<EngineResult<SyncedAccount>>,
}

pub struct AccountSyncer {
    api: Arc<dyn PointsApi>,
}

impl AccountSyncer {
    pub fn new(api: Arc<dyn PointsApi>) -> Self {
        Self { api }
    }

    #[instrument(skip(self, request), fields(wallet = ?request.wallet, slot = request.current_slot))]
    pub async fn sync(&self, request: &SyncRequest) -> SyncOutcome {
        let account = async {
            match &request.wallet {
                Some(wallet) => Some(
                    self.fetch_account(wallet, request.current_slot, request.average_slot_time)
                        .await,
                ),
                None => None,
            }
        };

        let (leaderboard, config, account) = tokio::join!(
            self.fetch_leaderboard(request.average_slot_time),
            self.api.config(),
            account,
        );

        SyncOutcome {
            leaderboard,
            config,
            account,
        }
    }

    async fn fetch_leaderboard(&self, average_slot_time: f64) -> EngineResult<Vec<PointsAccount>> {
        self.api
            .leaderboard()
            .await?
            .into_iter()
            .map(|raw| normalize_account(raw, average_slot_time, Endpoint::Leaderboard))
            .collect()
    }

    async fn fetch_account(
        &self,
        wallet: &str,
        current_slot: Slot,
        average_slot_time: f64,
    ) -> EngineResult<SyncedAccount> {
        let (raw, history) = tokio::join!(self.api.account(wallet), self.api.adjustments(wallet));
        let mut account = normalize_account(raw?, average_slot_time, Endpoint::Account)?;

        match history.and_then(|records| reduce_adjustments(&records)) {
            Ok(totals) => account.adjustments = totals,
            Err(e) => warn!(wallet, error = %e, "adjustment history unavailable, using embedded totals"),
        }

        account.quantity = project_quantity(&account, current_slot).ok_or_else(|| {
            EngineError::malformed(
                Endpoint::Account,
                "pointsPerSlot",
                account.points_per_slot.to_string(),
            )
        })?;
        let click_seed = account.adjustments.click;
        Ok(SyncedAccount {
            account,
            click_seed,
        })
    }
}

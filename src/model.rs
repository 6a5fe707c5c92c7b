use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult, Endpoint};

/// Numeric field as the points API sends it. Balances and rates arrive as
/// strings, adjustment quantities as JSON numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireNumber {
    Text(String),
    Number(serde_json::Number),
}

impl WireNumber {
    pub fn parse(&self, endpoint: Endpoint, field: &'static str) -> EngineResult<Decimal> {
        let text = match self {
            WireNumber::Text(s) => s.trim().to_string(),
            WireNumber::Number(n) => n.to_string(),
        };
        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map_err(|_| EngineError::malformed(endpoint, field, text))
    }
}

impl From<&str> for WireNumber {
    fn from(value: &str) -> Self {
        WireNumber::Text(value.to_string())
    }
}

impl From<i64> for WireNumber {
    fn from(value: i64) -> Self {
        WireNumber::Number(value.into())
    }
}

/// Adjustment totals as embedded in a points record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAdjustments {
    #[serde(default)]
    pub margin_trade: Option<WireNumber>,
    #[serde(default)]
    pub manual: Option<WireNumber>,
    #[serde(default)]
    pub click: Option<WireNumber>,
    #[serde(default)]
    pub claim: Option<WireNumber>,
}

/// Points record exactly as returned by `/points` and `/points/leaderboard`.
/// Only [`crate::syncer::normalize_account`] turns it into a [`PointsAccount`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPointsAccount {
    #[serde(default)]
    pub id: Option<u64>,
    pub wallet: String,
    #[serde(default)]
    pub quantity: Option<WireNumber>,
    #[serde(default)]
    pub timestamp: Option<WireNumber>,
    #[serde(default)]
    pub slot: Option<u64>,
    #[serde(default)]
    pub stale: bool,
    /// 0-based on the wire.
    #[serde(default)]
    pub rank: Option<i64>,
    #[serde(default)]
    pub rank_delta: Option<i64>,
    #[serde(default)]
    pub points_per_slot: Option<WireNumber>,
    #[serde(default)]
    pub adjustments: Option<RawAdjustments>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    Click,
    MarginTrade,
    Claim,
    Manual,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentRecord {
    pub quantity: WireNumber,
    #[serde(rename = "type")]
    pub kind: AdjustmentKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustments {
    pub click: Decimal,
    pub margin_trade: Decimal,
    pub claim: Decimal,
    pub manual: Decimal,
}

impl Adjustments {
    pub fn get(&self, kind: AdjustmentKind) -> Decimal {
        match kind {
            AdjustmentKind::Click => self.click,
            AdjustmentKind::MarginTrade => self.margin_trade,
            AdjustmentKind::Claim => self.claim,
            AdjustmentKind::Manual => self.manual,
            AdjustmentKind::Other => Decimal::ZERO,
        }
    }

    /// Returns false for kinds outside the four tracked categories.
    pub fn add(&mut self, kind: AdjustmentKind, quantity: Decimal) -> bool {
        let slot = match kind {
            AdjustmentKind::Click => &mut self.click,
            AdjustmentKind::MarginTrade => &mut self.margin_trade,
            AdjustmentKind::Claim => &mut self.claim,
            AdjustmentKind::Manual => &mut self.manual,
            AdjustmentKind::Other => return false,
        };
        *slot += quantity;
        true
    }
}

/// Normalized, authoritative-as-of-`snapshot_slot` account. Replaced wholesale
/// on every successful sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsAccount {
    pub id: Option<u64>,
    pub wallet: String,
    pub quantity: Decimal,
    pub points_per_slot: Decimal,
    /// Display value derived from the slot-time estimate at sync time.
    pub points_per_day: Decimal,
    pub snapshot_slot: u64,
    pub snapshot_timestamp: Option<i64>,
    pub stale: bool,
    /// 1-based.
    pub rank: i64,
    pub rank_delta: i64,
    pub adjustments: Adjustments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Borrow,
    Supply,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsConfigEntry {
    pub reserve: String,
    pub market: String,
    pub side: Side,
    pub weight: f64,
}

/// Reserve multipliers. Loaded once per sync and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointsConfig(pub Vec<PointsConfigEntry>);

impl PointsConfig {
    pub fn entries(&self) -> &[PointsConfigEntry] {
        &self.0
    }

    pub fn weight_for(&self, reserve: &str, side: Side) -> Option<f64> {
        self.0
            .iter()
            .find(|e| e.reserve == reserve && e.side == side)
            .map(|e| e.weight)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickStatus {
    #[default]
    Unclicked,
    Requested,
    Clicked,
    Maxed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickState {
    pub status: ClickStatus,
    pub current: Option<u64>,
    pub max: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickResponse {
    pub current: u64,
    pub max: u64,
    pub success: bool,
}

/// Locally extrapolated values. `None` means "seed from the account on next read".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DerivedPoints {
    pub computed_points: Option<Decimal>,
    pub computed_clicks: Option<Decimal>,
}

impl DerivedPoints {
    pub fn points_or(&self, account: &PointsAccount) -> Decimal {
        self.computed_points.unwrap_or(account.quantity)
    }

    pub fn clicks_or(&self, account: &PointsAccount) -> Decimal {
        self.computed_clicks.unwrap_or(account.adjustments.click)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Itemized view of the displayed balance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PointsBreakdown {
    /// Accrued from deposits and borrows; never negative.
    pub interest: Decimal,
    pub margin: Decimal,
    pub clicks: Decimal,
    pub bonus: Decimal,
}

impl PointsBreakdown {
    pub fn compute(account: &PointsAccount, derived: &DerivedPoints) -> Self {
        let clicks = derived.computed_clicks.unwrap_or(Decimal::ZERO);
        let adjustments = &account.adjustments;
        let interest = derived.points_or(account) + adjustments.claim
            - clicks
            - adjustments.margin_trade
            - adjustments.manual;

        Self {
            interest: interest.max(Decimal::ZERO),
            margin: adjustments.margin_trade,
            clicks,
            bonus: adjustments.manual,
        }
    }
}

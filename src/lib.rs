//! Client-side points accrual and reconciliation.
//!
//! Fetches authoritative point snapshots from the points service, extrapolates
//! the balance locally once per chain slot, runs the optimistic click claim and
//! re-ranks the leaderboard.

pub mod accrual;
pub mod api;
pub mod click;
pub mod config;
pub mod engine;
pub mod error;
pub mod leaderboard;
pub mod model;
pub mod observability;
pub mod slot_clock;
pub mod store;
pub mod syncer;

#[cfg(test)]
mod testing;

pub use api::{HttpPointsApi, PointsApi};
pub use click::ClickOutcome;
pub use config::{ConfigBuilder, EngineConfig};
pub use engine::PointsEngine;
pub use error::{EngineError, EngineResult, Endpoint};
pub use leaderboard::{RankMovement, RankedEntry};
pub use model::{
    ClickState, ClickStatus, PointsAccount, PointsBreakdown, PointsConfig, PointsConfigEntry, Side,
};
pub use slot_clock::{FallbackSlotHistory, SlotClock, SlotHistory};
pub use store::{PointsStore, StoreSnapshot, SyncReport};

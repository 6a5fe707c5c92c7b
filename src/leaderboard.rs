use std::cmp::Ordering;

use serde::Serialize;

use crate::model::PointsAccount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RankMovement {
    Up(u64),
    Down(u64),
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    pub account: PointsAccount,
    /// 1-based position in this ranking.
    pub sorted_rank: i64,
    /// Positive means the entry dropped, negative that it rose.
    pub rank_delta: i64,
}

impl RankedEntry {
    pub fn movement(&self) -> RankMovement {
        match self.rank_delta.cmp(&0) {
            Ordering::Less => RankMovement::Up(self.rank_delta.unsigned_abs()),
            Ordering::Greater => RankMovement::Down(self.rank_delta.unsigned_abs()),
            Ordering::Equal => RankMovement::Unchanged,
        }
    }
}

/// Highest quantity first; equal quantities order by wallet so the result does
/// not depend on the order the server listed them in.
fn by_quantity_desc(a: &PointsAccount, b: &PointsAccount) -> Ordering {
    b.quantity
        .cmp(&a.quantity)
        .then_with(|| a.wallet.cmp(&b.wallet))
}

/// Re-ranks a normalized leaderboard snapshot. `rank_delta` folds the drift
/// since the server computed `rank` into the drift it already recorded.
pub fn rank(entries: &[PointsAccount]) -> Vec<RankedEntry> {
    let mut sorted: Vec<&PointsAccount> = entries.iter().collect();
    sorted.sort_by(|a, b| by_quantity_desc(a, b));

    sorted
        .into_iter()
        .zip(1i64..)
        .map(|(account, sorted_rank)| RankedEntry {
            rank_delta: (sorted_rank - account.rank) + account.rank_delta,
            sorted_rank,
            account: account.clone(),
        })
        .collect()
}

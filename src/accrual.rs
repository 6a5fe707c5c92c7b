use rust_decimal::Decimal;

use crate::model::{ClickState, ClickStatus, DerivedPoints, PointsAccount};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub computed_points: Decimal,
    pub computed_clicks: Option<Decimal>,
    pub credited_click: bool,
    /// Status consumed back to `Unclicked` by this tick, if any.
    pub consumed: Option<ClickStatus>,
}

/// One slot's worth of accrual against a fixed snapshot.
///
/// `computed_points` advances by `points_per_slot`, plus one if a granted click
/// is pending. The pending click is credited here and nowhere else.
pub fn tick(account: &PointsAccount, derived: &mut DerivedPoints, click: &mut ClickState) -> TickOutcome {
    let credited_click = click.status == ClickStatus::Clicked;
    let bonus = if credited_click { Decimal::ONE } else { Decimal::ZERO };

    let computed_points = derived.points_or(account) + account.points_per_slot + bonus;
    derived.computed_points = Some(computed_points);

    if credited_click {
        derived.computed_clicks = Some(derived.clicks_or(account) + Decimal::ONE);
    }

    let consumed = click.consume();

    TickOutcome {
        computed_points,
        computed_clicks: derived.computed_clicks,
        credited_click,
        consumed,
    }
}

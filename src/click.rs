//! Optimistic claim flow.
//!
//! `Unclicked | Clicked -> Requested -> { Clicked, Maxed }`, with a transport
//! failure reverting `Requested -> Unclicked`. `Clicked` and `Maxed` live for one
//! accrual tick, which consumes them back to `Unclicked`.

use crate::error::{EngineError, EngineResult};
use crate::model::{ClickResponse, ClickState, ClickStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The server granted the click; the next tick credits one point.
    Credited { current: u64, max: u64 },
    /// Daily cap reached. Nothing is credited.
    Maxed { current: u64, max: u64 },
}

impl ClickState {
    /// Client-side precondition: never hit the endpoint when already capped.
    pub fn ensure_can_request(&self) -> EngineResult<()> {
        match self.status {
            ClickStatus::Unclicked | ClickStatus::Clicked => Ok(()),
            ClickStatus::Requested => Err(EngineError::ClickInFlight),
            ClickStatus::Maxed => Err(EngineError::DailyCapReached {
                current: self.current,
                max: self.max,
            }),
        }
    }

    pub fn begin_request(&mut self) -> EngineResult<()> {
        self.ensure_can_request()?;
        self.status = ClickStatus::Requested;
        Ok(())
    }

    pub fn resolve(&mut self, response: ClickResponse) -> ClickOutcome {
        self.current = Some(response.current);
        self.max = Some(response.max);
        if response.success {
            self.status = ClickStatus::Clicked;
            ClickOutcome::Credited {
                current: response.current,
                max: response.max,
            }
        } else {
            self.status = ClickStatus::Maxed;
            ClickOutcome::Maxed {
                current: response.current,
                max: response.max,
            }
        }
    }

    /// Transport failure: back to `Unclicked`, keeping the last known counters.
    pub fn fail(&mut self) {
        if self.status == ClickStatus::Requested {
            self.status = ClickStatus::Unclicked;
        }
    }

    /// Tick-side consumption of a one-tick state. Returns the consumed status.
    /// An in-flight request is also dropped back to `Unclicked`.
    pub fn consume(&mut self) -> Option<ClickStatus> {
        if self.status == ClickStatus::Unclicked {
            return None;
        }
        let previous = self.status;
        self.status = ClickStatus::Unclicked;
        Some(previous)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

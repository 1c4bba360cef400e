//! Status derivation for events.
//!
//! Precedence, first to last, with later rules overriding earlier ones:
//! reschedule, sold out, finished. A cancelled event never leaves
//! `Cancelled`. When none of the three conditions hold, an event whose
//! status did not move is re-affirmed as `Rescheduled` or `Active`; this is
//! what brings a `SoldOut` or `Finished` event back once tickets are
//! returned or the date moves forward again.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Event, EventStatus};

/// Result of one derivation: the status on entry and the status to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusTransition {
    pub from: EventStatus,
    pub to: EventStatus,
}

impl StatusTransition {
    /// Only changed transitions need to be written back.
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

pub fn derive(event: &Event, now: DateTime<Utc>) -> StatusTransition {
    let entry = event.status;
    if entry == EventStatus::Cancelled {
        return StatusTransition { from: entry, to: entry };
    }

    let rescheduled = event.is_rescheduled();
    let mut candidate = entry;
    let mut matched = false;

    if rescheduled {
        candidate = EventStatus::Rescheduled;
        matched = true;
    }
    if event.available_tickets == 0 {
        candidate = EventStatus::SoldOut;
        matched = true;
    }
    if event.is_past(now) {
        candidate = EventStatus::Finished;
        matched = true;
    }

    if !matched {
        candidate = EventStatus::Active;
    }

    StatusTransition {
        from: entry,
        to: candidate,
    }
}

/// Applies [`derive`] in place and reports whether the status moved.
pub fn refresh(event: &mut Event, now: DateTime<Utc>) -> bool {
    let transition = derive(event, now);
    event.status = transition.to;
    transition.changed()
}

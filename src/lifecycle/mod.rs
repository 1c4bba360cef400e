//! Event lifecycle and ticket-inventory engine.
//!
//! The pure parts ([`status`], [`ledger`], the drafting half of [`notify`])
//! operate on value structs and return the next state together with a
//! [`Changeset`](crate::store::Changeset). [`service`] loads state from the
//! [`Store`](crate::store::Store), runs the pure step and commits the result.

pub mod clock;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod service;
pub mod status;


use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use clock::{Clock, SystemClock};
pub use error::{FieldErrors, LifecycleError};
pub use ledger::{LedgerOutcome, TicketLedger};
pub use notify::{NotificationDispatcher, ScheduleChange};
pub use service::{EventChanges, EventDetail, EventLifecycleService, EventQuery, NewEvent};
pub use status::{derive, StatusTransition};

/// The authenticated caller, as supplied by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub is_organizer: bool,
}

impl Identity {
    pub fn organizer(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_organizer: true,
        }
    }

    pub fn attendee(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_organizer: false,
        }
    }

    pub(crate) fn require_organizer(&self, action: &str) -> Result<(), LifecycleError> {
        if self.is_organizer {
            Ok(())
        } else {
            Err(LifecycleError::Forbidden(format!(
                "Solo los organizadores pueden {action}"
            )))
        }
    }
}

//! Reschedule and venue-change notifications.
//!
//! One notification is created per kind of change and linked to every
//! ticket holder through its recipient rows.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Event, Notification, NotificationPriority, Venue};
use crate::store::{Store, Write};

pub const DATE_MARKER: &str = "Nueva fecha";
pub const VENUE_MARKER: &str = "Nuevo lugar";

const DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleChange {
    Date { scheduled_at: DateTime<Utc> },
    Venue { name: String },
}

impl ScheduleChange {
    fn describe(&self) -> String {
        match self {
            Self::Date { scheduled_at } => {
                format!("{DATE_MARKER}: {} (UTC)", scheduled_at.format(DATE_FORMAT))
            }
            Self::Venue { name } => format!("{VENUE_MARKER}: {name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationDispatcher;

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Compares the requested date and venue with the event as stored.
    ///
    /// Must run before the changes are applied to `current`.
    pub fn detect(
        &self,
        current: &Event,
        new_scheduled_at: Option<DateTime<Utc>>,
        new_venue: Option<&Venue>,
    ) -> Vec<ScheduleChange> {
        let mut changes = Vec::new();
        if let Some(scheduled_at) = new_scheduled_at {
            if scheduled_at != current.scheduled_at {
                changes.push(ScheduleChange::Date { scheduled_at });
            }
        }
        if let Some(venue) = new_venue {
            if current.venue_id != Some(venue.id) {
                changes.push(ScheduleChange::Venue {
                    name: venue.name.clone(),
                });
            }
        }
        changes
    }

    pub fn draft(&self, event: &Event, change: &ScheduleChange, now: DateTime<Utc>) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            event_id: Some(event.id),
            title: format!("Evento actualizado: {}", event.title),
            message: format!(
                "El evento \"{}\" ha sido actualizado. {}.",
                event.title,
                change.describe()
            ),
            priority: NotificationPriority::High,
            created_at: now,
        }
    }

    /// Builds the notification writes for `changes`, addressed to every
    /// current ticket holder of `event`.
    ///
    /// Lookup failures are logged and yield no writes; they never fail the
    /// edit that triggered them.
    pub async fn fan_out(
        &self,
        store: &dyn Store,
        event: &Event,
        changes: &[ScheduleChange],
        now: DateTime<Utc>,
    ) -> Vec<Write> {
        if changes.is_empty() {
            return Vec::new();
        }

        let holders = match store.ticket_holders(event.id).await {
            Ok(holders) => holders,
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Could not load ticket holders, skipping notifications");
                return Vec::new();
            }
        };
        if holders.is_empty() {
            debug!(event_id = %event.id, "No ticket holders to notify");
            return Vec::new();
        }

        changes
            .iter()
            .map(|change| Write::InsertNotification {
                notification: self.draft(event, change, now),
                recipients: holders.clone(),
            })
            .collect()
    }
}

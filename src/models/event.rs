use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Active,
    SoldOut,
    Rescheduled,
    Finished,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::SoldOut => "sold_out",
            Self::Rescheduled => "rescheduled",
            Self::Finished => "finished",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether new tickets may be issued while the event is in this status.
    pub fn accepts_sales(&self) -> bool {
        matches!(self, Self::Active | Self::Rescheduled)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub venue_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub scheduled_at: DateTime<Utc>,
    pub previous_date: Option<DateTime<Utc>>,
    /// Venue capacity captured when the venue was assigned.
    pub capacity: i32,
    pub available_tickets: i32,
    pub status: EventStatus,
    /// Bumped on every committed write; used as the compare-and-swap guard.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// True when the event was moved away from its previous date.
    pub fn is_rescheduled(&self) -> bool {
        self.previous_date
            .is_some_and(|previous| previous != self.scheduled_at)
    }

    pub fn tickets_sold(&self) -> i32 {
        self.capacity.saturating_sub(self.available_tickets).max(0)
    }

    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event_at(scheduled_at: DateTime<Utc>, previous_date: Option<DateTime<Utc>>) -> Event {
        let now = Utc::now();
        Event {
            id: Uuid::new_v4(),
            organizer_id: Uuid::new_v4(),
            venue_id: None,
            title: "Festival".to_string(),
            description: "Desc".to_string(),
            scheduled_at,
            previous_date,
            capacity: 100,
            available_tickets: 60,
            status: EventStatus::Active,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_is_rescheduled_requires_different_previous_date() {
        let date = Utc::now() + Duration::days(3);
        assert!(!event_at(date, None).is_rescheduled());
        assert!(!event_at(date, Some(date)).is_rescheduled());
        assert!(event_at(date, Some(date - Duration::days(1))).is_rescheduled());
    }

    #[test]
    fn test_tickets_sold_is_capacity_minus_available() {
        let event = event_at(Utc::now(), None);
        assert_eq!(event.tickets_sold(), 40);
    }

    #[test]
    fn test_only_active_and_rescheduled_accept_sales() {
        assert!(EventStatus::Active.accepts_sales());
        assert!(EventStatus::Rescheduled.accepts_sales());
        assert!(!EventStatus::SoldOut.accepts_sales());
        assert!(!EventStatus::Finished.accepts_sales());
        assert!(!EventStatus::Cancelled.accepts_sales());
    }
}

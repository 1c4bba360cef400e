//! Storage collaborator.
//!
//! Reads go straight to the backing store. Writes are described as a
//! [`Changeset`] and committed by [`Store::apply`] in a single transaction:
//! either every required write lands or none does. Best-effort writes run
//! after the required ones inside the same transaction and are discarded on
//! their own if they fail.

pub mod error;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{
    Event, Favorite, InboxEntry, Notification, Ticket, TicketType, User, Venue,
};

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// One row-level write.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    InsertUser(User),
    InsertVenue(Venue),
    InsertTicketType(TicketType),
    UpdateTicketType(TicketType),
    InsertEvent(Event),
    /// Replaces the event row if its stored version still equals `expected_version`.
    UpdateEvent {
        event: Event,
        expected_version: i64,
    },
    /// Removes the event together with its tickets, notifications and favorites.
    DeleteEvent(Uuid),
    InsertTicket(Ticket),
    UpdateTicket(Ticket),
    DeleteTicket(Uuid),
    InsertNotification {
        notification: Notification,
        recipients: Vec<Uuid>,
    },
    /// Replaces the notification and its recipient set. Recipients that
    /// stay keep their read state.
    UpdateNotification {
        notification: Notification,
        recipients: Vec<Uuid>,
    },
    DeleteNotification(Uuid),
    /// Marks one notification (or all of them when `None`) read for a user.
    MarkRead {
        user_id: Uuid,
        notification_id: Option<Uuid>,
        at: DateTime<Utc>,
    },
    InsertFavorite(Favorite),
    DeleteFavorite {
        user_id: Uuid,
        event_id: Uuid,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changeset {
    writes: Vec<Write>,
    best_effort: Vec<Write>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, write: Write) -> Self {
        self.writes.push(write);
        self
    }

    pub fn with_best_effort(mut self, writes: impl IntoIterator<Item = Write>) -> Self {
        self.best_effort.extend(writes);
        self
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn best_effort(&self) -> &[Write] {
        &self.best_effort
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.best_effort.is_empty()
    }
}

/// Listing filter for events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub venue_id: Option<Uuid>,
    /// Calendar day (UTC) the event is scheduled on.
    pub date: Option<NaiveDate>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn event(&self, id: Uuid) -> Result<Option<Event>, StoreError>;

    /// Events matching `filter`, ordered by `scheduled_at`.
    async fn events(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError>;

    /// Case-insensitive title lookup, ignoring `exclude`.
    async fn title_taken(&self, title: &str, exclude: Option<Uuid>) -> Result<bool, StoreError>;

    async fn venue(&self, id: Uuid) -> Result<Option<Venue>, StoreError>;

    async fn ticket_type(&self, id: Uuid) -> Result<Option<TicketType>, StoreError>;

    /// All ticket types, ordered by name.
    async fn ticket_types(&self) -> Result<Vec<TicketType>, StoreError>;

    async fn user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn users(&self) -> Result<Vec<User>, StoreError>;

    async fn ticket(&self, code: &str) -> Result<Option<Ticket>, StoreError>;

    /// Tickets for an event, newest purchase first.
    async fn tickets_for_event(&self, event_id: Uuid) -> Result<Vec<Ticket>, StoreError>;

    /// Tickets held by a user, newest purchase first.
    async fn tickets_for_user(&self, user_id: Uuid) -> Result<Vec<Ticket>, StoreError>;

    /// Distinct users holding at least one ticket for the event.
    async fn ticket_holders(&self, event_id: Uuid) -> Result<Vec<Uuid>, StoreError>;

    async fn notification(&self, id: Uuid) -> Result<Option<Notification>, StoreError>;

    /// Every notification, newest first.
    async fn notifications(&self) -> Result<Vec<Notification>, StoreError>;

    async fn notification_recipients(&self, id: Uuid) -> Result<Vec<Uuid>, StoreError>;

    /// The user's notifications with read state, newest first.
    async fn inbox(&self, user_id: Uuid) -> Result<Vec<InboxEntry>, StoreError>;

    async fn favorites(&self, user_id: Uuid) -> Result<Vec<Favorite>, StoreError>;

    async fn is_favorite(&self, user_id: Uuid, event_id: Uuid) -> Result<bool, StoreError>;

    async fn apply(&self, changeset: Changeset) -> Result<(), StoreError>;
}

//! In-process [`Store`] used by tests and database-less local runs.
//!
//! `apply` works on a copy of the state and swaps it in only when every
//! required write succeeded, which gives the same all-or-nothing behaviour
//! as a database transaction.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Changeset, EventFilter, Store, StoreError, Write};
use crate::models::{
    Event, Favorite, InboxEntry, Notification, Ticket, TicketType, User, UserNotification, Venue,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    venues: HashMap<Uuid, Venue>,
    ticket_types: HashMap<Uuid, TicketType>,
    events: HashMap<Uuid, Event>,
    tickets: HashMap<Uuid, Ticket>,
    notifications: HashMap<Uuid, Notification>,
    /// Keyed by (notification, user).
    receipts: BTreeMap<(Uuid, Uuid), UserNotification>,
    /// Keyed by (user, event).
    favorites: BTreeMap<(Uuid, Uuid), Favorite>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(entity: &'static str, id: Uuid) -> StoreError {
    StoreError::Missing {
        entity,
        id: id.to_string(),
    }
}

impl MemoryState {
    fn title_taken(&self, title: &str, exclude: Option<Uuid>) -> bool {
        let wanted = title.trim().to_lowercase();
        self.events
            .values()
            .any(|e| Some(e.id) != exclude && e.title.trim().to_lowercase() == wanted)
    }

    fn set_recipients(&mut self, notification_id: Uuid, recipients: &[Uuid]) {
        let keep: BTreeSet<Uuid> = recipients.iter().copied().collect();
        self.receipts
            .retain(|(n, u), _| *n != notification_id || keep.contains(u));
        for user_id in keep {
            self.receipts
                .entry((notification_id, user_id))
                .or_insert_with(|| UserNotification::unread(user_id, notification_id));
        }
    }

    fn remove_notification(&mut self, id: Uuid) {
        self.notifications.remove(&id);
        self.receipts.retain(|(n, _), _| *n != id);
    }

    fn execute(&mut self, write: &Write) -> Result<(), StoreError> {
        match write {
            Write::InsertUser(user) => {
                self.users.insert(user.id, user.clone());
            }
            Write::InsertVenue(venue) => {
                self.venues.insert(venue.id, venue.clone());
            }
            Write::InsertTicketType(ticket_type) => {
                if self
                    .ticket_types
                    .values()
                    .any(|t| t.name == ticket_type.name)
                {
                    return Err(StoreError::Duplicate("ticket_types.name".to_string()));
                }
                self.ticket_types.insert(ticket_type.id, ticket_type.clone());
            }
            Write::UpdateTicketType(ticket_type) => {
                let slot = self
                    .ticket_types
                    .get_mut(&ticket_type.id)
                    .ok_or_else(|| missing("ticket_type", ticket_type.id))?;
                *slot = ticket_type.clone();
            }
            Write::InsertEvent(event) => {
                if self.title_taken(&event.title, None) {
                    return Err(StoreError::Duplicate("events.title".to_string()));
                }
                self.events.insert(event.id, event.clone());
            }
            Write::UpdateEvent {
                event,
                expected_version,
            } => {
                let stored = self
                    .events
                    .get(&event.id)
                    .ok_or_else(|| missing("event", event.id))?;
                if stored.version != *expected_version {
                    return Err(StoreError::Conflict {
                        entity: "event",
                        id: event.id.to_string(),
                    });
                }
                if self.title_taken(&event.title, Some(event.id)) {
                    return Err(StoreError::Duplicate("events.title".to_string()));
                }
                self.events.insert(event.id, event.clone());
            }
            Write::DeleteEvent(id) => {
                self.events.remove(id).ok_or_else(|| missing("event", *id))?;
                self.tickets.retain(|_, t| t.event_id != *id);
                let orphaned: Vec<Uuid> = self
                    .notifications
                    .values()
                    .filter(|n| n.event_id == Some(*id))
                    .map(|n| n.id)
                    .collect();
                for notification_id in orphaned {
                    self.remove_notification(notification_id);
                }
                self.favorites.retain(|(_, event_id), _| event_id != id);
            }
            Write::InsertTicket(ticket) => {
                if self
                    .tickets
                    .values()
                    .any(|t| t.ticket_code == ticket.ticket_code)
                {
                    return Err(StoreError::Duplicate("tickets.ticket_code".to_string()));
                }
                self.tickets.insert(ticket.id, ticket.clone());
            }
            Write::UpdateTicket(ticket) => {
                let slot = self
                    .tickets
                    .get_mut(&ticket.id)
                    .ok_or_else(|| missing("ticket", ticket.id))?;
                *slot = ticket.clone();
            }
            Write::DeleteTicket(id) => {
                self.tickets.remove(id).ok_or_else(|| missing("ticket", *id))?;
            }
            Write::InsertNotification {
                notification,
                recipients,
            } => {
                if let Some(event_id) = notification.event_id {
                    if !self.events.contains_key(&event_id) {
                        return Err(missing("event", event_id));
                    }
                }
                self.notifications
                    .insert(notification.id, notification.clone());
                self.set_recipients(notification.id, recipients);
            }
            Write::UpdateNotification {
                notification,
                recipients,
            } => {
                let slot = self
                    .notifications
                    .get_mut(&notification.id)
                    .ok_or_else(|| missing("notification", notification.id))?;
                *slot = notification.clone();
                self.set_recipients(notification.id, recipients);
            }
            Write::DeleteNotification(id) => {
                if !self.notifications.contains_key(id) {
                    return Err(missing("notification", *id));
                }
                self.remove_notification(*id);
            }
            Write::MarkRead {
                user_id,
                notification_id,
                at,
            } => {
                for ((n, u), receipt) in self.receipts.iter_mut() {
                    let targeted = notification_id.map_or(true, |wanted| wanted == *n);
                    if u == user_id && targeted && !receipt.is_read {
                        receipt.is_read = true;
                        receipt.read_at = Some(*at);
                    }
                }
            }
            Write::InsertFavorite(favorite) => {
                let key = (favorite.user_id, favorite.event_id);
                if self.favorites.contains_key(&key) {
                    return Err(StoreError::Duplicate("favorites".to_string()));
                }
                self.favorites.insert(key, favorite.clone());
            }
            Write::DeleteFavorite { user_id, event_id } => {
                self.favorites.remove(&(*user_id, *event_id));
            }
        }
        Ok(())
    }
}

fn newest_first(tickets: &mut [Ticket]) {
    tickets.sort_by(|a, b| b.buy_date.cmp(&a.buy_date));
}

#[async_trait]
impl Store for MemoryStore {
    async fn event(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        Ok(self.state.read().await.events.get(&id).cloned())
    }

    async fn events(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        let state = self.state.read().await;
        let mut events: Vec<Event> = state
            .events
            .values()
            .filter(|e| filter.venue_id.map_or(true, |v| e.venue_id == Some(v)))
            .filter(|e| filter.date.map_or(true, |d| e.scheduled_at.date_naive() == d))
            .cloned()
            .collect();
        events.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at));
        Ok(events)
    }

    async fn title_taken(&self, title: &str, exclude: Option<Uuid>) -> Result<bool, StoreError> {
        Ok(self.state.read().await.title_taken(title, exclude))
    }

    async fn venue(&self, id: Uuid) -> Result<Option<Venue>, StoreError> {
        Ok(self.state.read().await.venues.get(&id).cloned())
    }

    async fn ticket_type(&self, id: Uuid) -> Result<Option<TicketType>, StoreError> {
        Ok(self.state.read().await.ticket_types.get(&id).cloned())
    }

    async fn ticket_types(&self) -> Result<Vec<TicketType>, StoreError> {
        let mut types: Vec<TicketType> = self
            .state
            .read()
            .await
            .ticket_types
            .values()
            .cloned()
            .collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(types)
    }

    async fn user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn users(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.state.read().await.users.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn ticket(&self, code: &str) -> Result<Option<Ticket>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .tickets
            .values()
            .find(|t| t.ticket_code == code)
            .cloned())
    }

    async fn tickets_for_event(&self, event_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        let state = self.state.read().await;
        let mut tickets: Vec<Ticket> = state
            .tickets
            .values()
            .filter(|t| t.event_id == event_id)
            .cloned()
            .collect();
        newest_first(&mut tickets);
        Ok(tickets)
    }

    async fn tickets_for_user(&self, user_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        let state = self.state.read().await;
        let mut tickets: Vec<Ticket> = state
            .tickets
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut tickets);
        Ok(tickets)
    }

    async fn ticket_holders(&self, event_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let state = self.state.read().await;
        let holders: BTreeSet<Uuid> = state
            .tickets
            .values()
            .filter(|t| t.event_id == event_id)
            .map(|t| t.user_id)
            .collect();
        Ok(holders.into_iter().collect())
    }

    async fn notification(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        Ok(self.state.read().await.notifications.get(&id).cloned())
    }

    async fn notifications(&self) -> Result<Vec<Notification>, StoreError> {
        let mut all: Vec<Notification> = self
            .state
            .read()
            .await
            .notifications
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn notification_recipients(&self, id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .receipts
            .keys()
            .filter(|(n, _)| *n == id)
            .map(|(_, u)| *u)
            .collect())
    }

    async fn inbox(&self, user_id: Uuid) -> Result<Vec<InboxEntry>, StoreError> {
        let state = self.state.read().await;
        let mut entries: Vec<InboxEntry> = state
            .receipts
            .values()
            .filter(|r| r.user_id == user_id)
            .filter_map(|r| {
                state
                    .notifications
                    .get(&r.notification_id)
                    .map(|n| InboxEntry::new(n, r))
            })
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn favorites(&self, user_id: Uuid) -> Result<Vec<Favorite>, StoreError> {
        let state = self.state.read().await;
        let mut favorites: Vec<Favorite> = state
            .favorites
            .values()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect();
        favorites.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(favorites)
    }

    async fn is_favorite(&self, user_id: Uuid, event_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .favorites
            .contains_key(&(user_id, event_id)))
    }

    async fn apply(&self, changeset: Changeset) -> Result<(), StoreError> {
        let mut guard = self.state.write().await;

        let mut staged = guard.clone();
        for write in changeset.writes() {
            staged.execute(write)?;
        }

        if !changeset.best_effort().is_empty() {
            let mut extended = staged.clone();
            let outcome = changeset
                .best_effort()
                .iter()
                .try_for_each(|write| extended.execute(write));
            match outcome {
                Ok(()) => staged = extended,
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding best-effort writes");
                }
            }
        }

        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventStatus;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn event(title: &str) -> Event {
        let now = Utc::now();
        Event {
            id: Uuid::new_v4(),
            organizer_id: Uuid::new_v4(),
            venue_id: None,
            title: title.to_string(),
            description: "d".to_string(),
            scheduled_at: now + Duration::days(2),
            previous_date: None,
            capacity: 10,
            available_tickets: 10,
            status: EventStatus::Active,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn ticket(event_id: Uuid, user_id: Uuid) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            ticket_code: Ticket::generate_code(),
            event_id,
            user_id,
            ticket_type_id: Uuid::new_v4(),
            quantity: 1,
            total_price: dec!(10),
            old_total_price: None,
            buy_date: Utc::now(),
            modified_date: None,
        }
    }

    #[tokio::test]
    async fn test_title_uniqueness_is_case_insensitive() {
        let store = MemoryStore::new();
        store
            .apply(Changeset::new().with(Write::InsertEvent(event("Jazz Night"))))
            .await
            .unwrap();

        assert!(store.title_taken("jazz night", None).await.unwrap());
        let err = store
            .apply(Changeset::new().with(Write::InsertEvent(event("JAZZ NIGHT"))))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_failed_changeset_leaves_state_untouched() {
        let store = MemoryStore::new();
        let e = event("Opera");
        store
            .apply(Changeset::new().with(Write::InsertEvent(e.clone())))
            .await
            .unwrap();

        let mut next = e.clone();
        next.available_tickets = 9;
        next.version = 1;
        let t = ticket(e.id, Uuid::new_v4());
        let err = store
            .apply(
                Changeset::new()
                    .with(Write::UpdateEvent {
                        event: next,
                        expected_version: 0,
                    })
                    .with(Write::InsertTicket(t.clone()))
                    .with(Write::DeleteTicket(Uuid::new_v4())),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Missing { .. }));
        assert_eq!(store.event(e.id).await.unwrap().unwrap().available_tickets, 10);
        assert!(store.ticket(&t.ticket_code).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_version_is_a_conflict() {
        let store = MemoryStore::new();
        let e = event("Teatro");
        store
            .apply(Changeset::new().with(Write::InsertEvent(e.clone())))
            .await
            .unwrap();

        let mut first = e.clone();
        first.version = 1;
        store
            .apply(Changeset::new().with(Write::UpdateEvent {
                event: first,
                expected_version: 0,
            }))
            .await
            .unwrap();

        let mut second = e.clone();
        second.version = 1;
        let err = store
            .apply(Changeset::new().with(Write::UpdateEvent {
                event: second,
                expected_version: 0,
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_failed_best_effort_keeps_required_writes() {
        let store = MemoryStore::new();
        let e = event("Ballet");
        let notification = Notification {
            id: Uuid::new_v4(),
            event_id: Some(Uuid::new_v4()),
            title: "t".to_string(),
            message: "m".to_string(),
            priority: Default::default(),
            created_at: Utc::now(),
        };
        store
            .apply(
                Changeset::new()
                    .with(Write::InsertEvent(e.clone()))
                    .with_best_effort([Write::InsertNotification {
                        notification,
                        recipients: vec![Uuid::new_v4()],
                    }]),
            )
            .await
            .unwrap();

        assert!(store.event(e.id).await.unwrap().is_some());
        assert!(store.notifications().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ticket_holders_are_distinct() {
        let store = MemoryStore::new();
        let e = event("Cine");
        let user = Uuid::new_v4();
        store
            .apply(
                Changeset::new()
                    .with(Write::InsertEvent(e.clone()))
                    .with(Write::InsertTicket(ticket(e.id, user)))
                    .with(Write::InsertTicket(ticket(e.id, user))),
            )
            .await
            .unwrap();
        assert_eq!(store.ticket_holders(e.id).await.unwrap(), vec![user]);
    }

    #[tokio::test]
    async fn test_delete_event_cascades() {
        let store = MemoryStore::new();
        let e = event("Circo");
        let user = Uuid::new_v4();
        let notification = Notification {
            id: Uuid::new_v4(),
            event_id: Some(e.id),
            title: "t".to_string(),
            message: "m".to_string(),
            priority: Default::default(),
            created_at: Utc::now(),
        };
        store
            .apply(
                Changeset::new()
                    .with(Write::InsertEvent(e.clone()))
                    .with(Write::InsertTicket(ticket(e.id, user)))
                    .with(Write::InsertNotification {
                        notification,
                        recipients: vec![user],
                    })
                    .with(Write::InsertFavorite(Favorite {
                        user_id: user,
                        event_id: e.id,
                        created_at: Utc::now(),
                    })),
            )
            .await
            .unwrap();

        store
            .apply(Changeset::new().with(Write::DeleteEvent(e.id)))
            .await
            .unwrap();

        assert!(store.tickets_for_user(user).await.unwrap().is_empty());
        assert!(store.inbox(user).await.unwrap().is_empty());
        assert!(!store.is_favorite(user, e.id).await.unwrap());
    }
}

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::error::{FieldErrors, LifecycleError};
use super::ledger::{commit_event, TicketLedger};
use super::notify::NotificationDispatcher;
use super::status;
use super::Identity;
use crate::models::{Event, EventStatus, Ticket, Venue};
use crate::store::{Changeset, EventFilter, Store, StoreError, Write};

pub const DEFAULT_MAX_WRITE_RETRIES: u32 = 3;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub venue_id: Option<Uuid>,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub venue_id: Option<Uuid>,
    pub organizer_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventQuery {
    pub venue: Option<Uuid>,
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub show_past: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventDetail {
    pub event: Event,
    /// All tickets for organizers, the viewer's own otherwise.
    pub tickets: Vec<Ticket>,
    pub is_favorite: bool,
}

/// Coordinates event edits and ticket operations against a [`Store`].
pub struct EventLifecycleService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    ledger: TicketLedger,
    dispatcher: NotificationDispatcher,
    max_write_retries: u32,
}

/// Unique-title violations caught by the store surface as a title error.
/// Stores the derived status when it differs from the stored one. Losing a
/// version race is fine: the winning writer derived the status as well.
pub(crate) async fn refresh_stored(
    store: &dyn Store,
    mut event: Event,
    now: DateTime<Utc>,
) -> Result<Event, LifecycleError> {
    let transition = status::derive(&event, now);
    if !transition.changed() {
        return Ok(event);
    }
    event.status = transition.to;
    let (event, write) = commit_event(event, now);
    match store.apply(Changeset::new().with(write)).await {
        Ok(()) => {
            debug!(event_id = %event.id, from = %transition.from, to = %transition.to, "Status refreshed");
            Ok(event)
        }
        Err(StoreError::Conflict { .. }) => Ok(event),
        Err(e) => Err(e.into()),
    }
}

fn title_conflict(err: StoreError) -> LifecycleError {
    match err {
        StoreError::Duplicate(ref constraint) if constraint.contains("title") => {
            LifecycleError::field("title", "Ya existe un evento con ese título")
        }
        other => other.into(),
    }
}

impl EventLifecycleService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            ledger: TicketLedger::default(),
            dispatcher: NotificationDispatcher::new(),
            max_write_retries: DEFAULT_MAX_WRITE_RETRIES,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ledger(mut self, ledger: TicketLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_max_write_retries(mut self, retries: u32) -> Self {
        self.max_write_retries = retries;
        self
    }

    /// Re-runs `attempt` while it fails on a stale event version.
    async fn retrying<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T, LifecycleError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LifecycleError>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(e) if e.is_write_conflict() && retries < self.max_write_retries => {
                    retries += 1;
                    debug!(operation, retries, "Write conflict, retrying");
                }
                outcome => return outcome,
            }
        }
    }

    async fn load_event(&self, id: Uuid) -> Result<Event, LifecycleError> {
        self.store
            .event(id)
            .await?
            .ok_or_else(|| LifecycleError::not_found("Evento"))
    }

    async fn load_ticket(&self, code: &str, caller: &Identity) -> Result<Ticket, LifecycleError> {
        let ticket = self
            .store
            .ticket(code)
            .await?
            .ok_or_else(|| LifecycleError::not_found("Ticket"))?;
        if ticket.user_id != caller.user_id && !caller.is_organizer {
            return Err(LifecycleError::Forbidden(
                "El ticket pertenece a otro usuario".to_string(),
            ));
        }
        Ok(ticket)
    }

    async fn load_venue(&self, id: Uuid) -> Result<Venue, LifecycleError> {
        self.store
            .venue(id)
            .await?
            .ok_or_else(|| LifecycleError::field("venue", "La ubicación seleccionada no existe"))
    }

    async fn validate_event(
        &self,
        title: &str,
        description: &str,
        scheduled_at: Option<DateTime<Utc>>,
        require_future: bool,
        exclude: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<FieldErrors, LifecycleError> {
        let mut errors = FieldErrors::new();

        if title.trim().is_empty() {
            errors.insert("title".into(), "Por favor ingrese un título".into());
        } else if self.store.title_taken(title, exclude).await? {
            errors.insert("title".into(), "Ya existe un evento con ese título".into());
        }

        if description.trim().is_empty() {
            errors.insert("description".into(), "Por favor ingrese una descripción".into());
        }

        match scheduled_at {
            None => {
                errors.insert(
                    "scheduled_at".into(),
                    "La fecha y hora del evento son requeridas".into(),
                );
            }
            Some(at) if require_future && at <= now => {
                errors.insert(
                    "scheduled_at".into(),
                    "La fecha del evento debe ser en el futuro".into(),
                );
            }
            Some(_) => {}
        }

        Ok(errors)
    }

    /// Persists a lazily re-derived status. Losing the race to another
    /// writer is fine: that writer derived the status as well.
    async fn refresh_status(&self, event: Event, now: DateTime<Utc>) -> Result<Event, LifecycleError> {
        refresh_stored(self.store.as_ref(), event, now).await
    }

    pub async fn create(&self, fields: NewEvent, organizer: &Identity) -> Result<Event, LifecycleError> {
        organizer.require_organizer("crear eventos")?;
        let now = self.clock.now();

        let venue = match fields.venue_id {
            Some(id) => Some(self.load_venue(id).await?),
            None => None,
        };
        let title = fields.title.trim().to_string();
        let description = fields.description.trim().to_string();
        let errors = self
            .validate_event(&title, &description, fields.scheduled_at, true, None, now)
            .await?;
        let scheduled_at = match fields.scheduled_at {
            Some(at) if errors.is_empty() => at,
            _ => return Err(LifecycleError::Validation(errors)),
        };

        let capacity = venue.as_ref().map_or(0, |v| v.capacity);
        let event = Event {
            id: Uuid::new_v4(),
            organizer_id: organizer.user_id,
            venue_id: venue.as_ref().map(|v| v.id),
            title,
            description,
            scheduled_at,
            previous_date: None,
            capacity,
            available_tickets: capacity,
            status: EventStatus::Active,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        self.store
            .apply(Changeset::new().with(Write::InsertEvent(event.clone())))
            .await
            .map_err(title_conflict)?;

        info!(event_id = %event.id, title = %event.title, capacity, "Event created");
        Ok(event)
    }

    pub async fn update(
        &self,
        event_id: Uuid,
        changes: EventChanges,
        actor: &Identity,
    ) -> Result<Event, LifecycleError> {
        actor.require_organizer("editar eventos")?;
        let changes = &changes;
        self.retrying("update_event", move || self.try_update(event_id, changes))
            .await
    }

    async fn try_update(&self, event_id: Uuid, changes: &EventChanges) -> Result<Event, LifecycleError> {
        let now = self.clock.now();
        let current = self.load_event(event_id).await?;

        let new_venue = match changes.venue_id {
            Some(id) if current.venue_id != Some(id) => Some(self.load_venue(id).await?),
            _ => None,
        };
        let title = changes
            .title
            .as_deref()
            .unwrap_or(&current.title)
            .trim()
            .to_string();
        let description = changes
            .description
            .as_deref()
            .unwrap_or(&current.description)
            .trim()
            .to_string();
        let new_date = changes
            .scheduled_at
            .filter(|at| *at != current.scheduled_at);

        let mut errors = self
            .validate_event(
                &title,
                &description,
                Some(new_date.unwrap_or(current.scheduled_at)),
                new_date.is_some(),
                Some(current.id),
                now,
            )
            .await?;
        let sold = current.tickets_sold();
        if let Some(venue) = &new_venue {
            if venue.capacity < sold {
                errors.insert(
                    "venue".into(),
                    format!(
                        "La capacidad de {} es menor a las {} entradas vendidas",
                        venue.name, sold
                    ),
                );
            }
        }
        if let Some(organizer_id) = changes
            .organizer_id
            .filter(|id| *id != current.organizer_id)
        {
            let eligible = self
                .store
                .user(organizer_id)
                .await?
                .is_some_and(|user| user.is_organizer);
            if !eligible {
                errors.insert(
                    "organizer".into(),
                    "El organizador seleccionado no es válido".into(),
                );
            }
        }
        if !errors.is_empty() {
            return Err(LifecycleError::Validation(errors));
        }

        let detected = self
            .dispatcher
            .detect(&current, changes.scheduled_at, new_venue.as_ref());

        let mut next = current.clone();
        next.title = title;
        next.description = description;
        if let Some(at) = new_date {
            next.previous_date = Some(current.scheduled_at);
            next.scheduled_at = at;
        }
        if let Some(venue) = &new_venue {
            next.venue_id = Some(venue.id);
            next.capacity = venue.capacity;
            next.available_tickets = venue.capacity - sold;
        }
        if let Some(organizer_id) = changes.organizer_id {
            next.organizer_id = organizer_id;
        }
        status::refresh(&mut next, now);
        let (next, write) = commit_event(next, now);

        let notifications = self
            .dispatcher
            .fan_out(self.store.as_ref(), &next, &detected, now)
            .await;
        let notified = notifications.len();

        self.store
            .apply(Changeset::new().with(write).with_best_effort(notifications))
            .await
            .map_err(title_conflict)?;

        info!(
            event_id = %next.id,
            status = %next.status,
            changes = detected.len(),
            notifications = notified,
            "Event updated"
        );
        Ok(next)
    }

    /// Forces `Cancelled`, bypassing derivation.
    pub async fn cancel(&self, event_id: Uuid, actor: &Identity) -> Result<Event, LifecycleError> {
        actor.require_organizer("cancelar eventos")?;
        self.retrying("cancel_event", move || async move {
            let current = self.load_event(event_id).await?;
            if current.status == EventStatus::Cancelled {
                return Ok(current);
            }
            let mut next = current;
            next.status = EventStatus::Cancelled;
            let (next, write) = commit_event(next, self.clock.now());
            self.store.apply(Changeset::new().with(write)).await?;
            info!(event_id = %next.id, "Event cancelled");
            Ok(next)
        })
        .await
    }

    /// Removes the event; the store cascades its tickets, notifications and favorites.
    pub async fn delete(&self, event_id: Uuid, actor: &Identity) -> Result<(), LifecycleError> {
        actor.require_organizer("eliminar eventos")?;
        match self
            .store
            .apply(Changeset::new().with(Write::DeleteEvent(event_id)))
            .await
        {
            Ok(()) => {
                info!(%event_id, "Event deleted");
                Ok(())
            }
            Err(StoreError::Missing { .. }) => Err(LifecycleError::not_found("Evento")),
            Err(e) => Err(e.into()),
        }
    }

    /// Loads an event, persisting its status if it moved since the last write.
    pub async fn event(&self, event_id: Uuid) -> Result<Event, LifecycleError> {
        let event = self.load_event(event_id).await?;
        self.refresh_status(event, self.clock.now()).await
    }

    /// Lists events matching the venue and date filters. Every match has its
    /// status refreshed before past events are dropped, so finished events
    /// are stored as such even when the caller hides them.
    pub async fn list_events(&self, query: &EventQuery) -> Result<Vec<Event>, LifecycleError> {
        let now = self.clock.now();
        let filter = EventFilter {
            venue_id: query.venue,
            date: query.date,
        };
        let events = self.store.events(&filter).await?;

        let mut listed = Vec::with_capacity(events.len());
        for event in events {
            let event = self.refresh_status(event, now).await?;
            if query.show_past || event.scheduled_at >= now {
                listed.push(event);
            }
        }
        Ok(listed)
    }

    pub async fn event_detail(&self, event_id: Uuid, viewer: &Identity) -> Result<EventDetail, LifecycleError> {
        let event = self.event(event_id).await?;
        let mut tickets = self.store.tickets_for_event(event_id).await?;
        if !viewer.is_organizer {
            tickets.retain(|t| t.user_id == viewer.user_id);
        }
        let is_favorite = self.store.is_favorite(viewer.user_id, event_id).await?;
        Ok(EventDetail {
            event,
            tickets,
            is_favorite,
        })
    }

    /// Sells tickets to `buyer`. The returned ticket carries the generated code.
    pub async fn issue_ticket(
        &self,
        event_id: Uuid,
        buyer: &Identity,
        ticket_type_id: Uuid,
        quantity: i32,
    ) -> Result<Ticket, LifecycleError> {
        self.retrying("issue_ticket", move || async move {
            let now = self.clock.now();
            let event = self.store.event(event_id).await?;
            let user = self.store.user(buyer.user_id).await?;
            let ticket_type = self.store.ticket_type(ticket_type_id).await?;

            let outcome = self.ledger.issue(
                event.as_ref(),
                user.as_ref(),
                ticket_type.as_ref(),
                quantity,
                now,
            )?;
            self.store.apply(outcome.changeset).await?;

            info!(
                event_id = %event_id,
                ticket_code = %outcome.ticket.ticket_code,
                quantity,
                available = outcome.event.available_tickets,
                status = %outcome.event.status,
                "Tickets issued"
            );
            Ok(outcome.ticket)
        })
        .await
    }

    /// Changes a ticket's type and quantity. `ticket_type_id: None` keeps the current type.
    pub async fn amend_ticket(
        &self,
        code: &str,
        caller: &Identity,
        ticket_type_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<Ticket, LifecycleError> {
        self.retrying("amend_ticket", move || async move {
            let now = self.clock.now();
            let ticket = self.load_ticket(code, caller).await?;
            let event = self.load_event(ticket.event_id).await?;
            let type_id = ticket_type_id.unwrap_or(ticket.ticket_type_id);
            let ticket_type = self
                .store
                .ticket_type(type_id)
                .await?
                .ok_or_else(|| LifecycleError::field("ticket_type", "El tipo de ticket es requerido"))?;

            let outcome =
                self.ledger
                    .amend(&event, &ticket, &ticket_type, quantity, caller.is_organizer, now)?;
            self.store.apply(outcome.changeset).await?;

            info!(
                ticket_code = %code,
                quantity,
                available = outcome.event.available_tickets,
                "Ticket amended"
            );
            Ok(outcome.ticket)
        })
        .await
    }

    pub async fn revoke_ticket(&self, code: &str, caller: &Identity) -> Result<(), LifecycleError> {
        self.retrying("revoke_ticket", move || async move {
            let now = self.clock.now();
            let ticket = self.load_ticket(code, caller).await?;
            let event = self.load_event(ticket.event_id).await?;

            let outcome = self.ledger.revoke(&event, &ticket, caller.is_organizer, now)?;
            if let Err(e) = self.store.apply(outcome.changeset).await {
                if !matches!(e, StoreError::Conflict { .. }) {
                    warn!(ticket_code = %code, error = %e, "Ticket revocation failed");
                }
                return Err(e.into());
            }

            info!(
                ticket_code = %code,
                restored = ticket.quantity,
                available = outcome.event.available_tickets,
                "Ticket revoked"
            );
            Ok(())
        })
        .await
    }

    pub async fn ticket(&self, code: &str, viewer: &Identity) -> Result<Ticket, LifecycleError> {
        self.load_ticket(code, viewer).await
    }

    pub async fn tickets_for(&self, viewer: &Identity) -> Result<Vec<Ticket>, LifecycleError> {
        Ok(self.store.tickets_for_user(viewer.user_id).await?)
    }
}

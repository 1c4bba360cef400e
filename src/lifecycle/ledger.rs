//! Ticket inventory ledger.
//!
//! Every operation takes the current event and ticket by reference and
//! returns the next event state, the affected ticket and the [`Changeset`]
//! that commits both. The event write carries a version guard, so a stale
//! read can never oversell: the store rejects it and the caller retries.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use super::error::{FieldErrors, LifecycleError};
use super::status;
use crate::models::{Event, EventStatus, Ticket, TicketType, User};
use crate::store::{Changeset, Write};

pub const DEFAULT_EDIT_WINDOW_MINUTES: i64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerOutcome {
    pub event: Event,
    pub ticket: Ticket,
    pub changeset: Changeset,
}

#[derive(Debug, Clone, Copy)]
pub struct TicketLedger {
    edit_window: Duration,
}

impl Default for TicketLedger {
    fn default() -> Self {
        Self::new(DEFAULT_EDIT_WINDOW_MINUTES)
    }
}

/// Next version of `event` stamped at `now`, plus the guarded write for it.
pub(crate) fn commit_event(mut event: Event, now: DateTime<Utc>) -> (Event, Write) {
    let expected_version = event.version;
    event.version += 1;
    event.updated_at = now;
    let write = Write::UpdateEvent {
        event: event.clone(),
        expected_version,
    };
    (event, write)
}

impl TicketLedger {
    pub fn new(edit_window_minutes: i64) -> Self {
        Self {
            edit_window: Duration::minutes(edit_window_minutes),
        }
    }

    pub fn edit_window_minutes(&self) -> i64 {
        self.edit_window.num_minutes()
    }

    pub fn within_edit_window(&self, ticket: &Ticket, now: DateTime<Utc>) -> bool {
        now <= ticket.buy_date + self.edit_window
    }

    fn window_expired(&self) -> LifecycleError {
        LifecycleError::EditWindowExpired {
            window_minutes: self.edit_window_minutes(),
        }
    }

    /// Sells `quantity` tickets of `ticket_type` for `event` to `user`.
    pub fn issue(
        &self,
        event: Option<&Event>,
        user: Option<&User>,
        ticket_type: Option<&TicketType>,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<LedgerOutcome, LifecycleError> {
        let mut errors = FieldErrors::new();
        if event.is_none() {
            errors.insert("event".into(), "El evento es requerido".into());
        }
        if user.is_none() {
            errors.insert("user".into(), "El usuario es requerido".into());
        }
        if ticket_type.is_none() {
            errors.insert("ticket_type".into(), "El tipo de ticket es requerido".into());
        }
        if quantity <= 0 {
            errors.insert(
                "quantity".into(),
                "La cantidad de tickets debe ser un número entero mayor a 0".into(),
            );
        }
        // Sales close on the stored status or on a date that has passed. A
        // derived sell-out is left to the inventory check.
        let current_status = event.map(|e| status::derive(e, now).to);
        let closed = event.is_some_and(|e| !e.status.accepts_sales())
            || current_status.is_some_and(|s| s.is_terminal());
        if closed {
            errors.insert(
                "status".into(),
                "No se pueden comprar entradas para este evento".into(),
            );
        }

        let (Some(event), Some(user), Some(ticket_type), Some(current_status)) =
            (event, user, ticket_type, current_status)
        else {
            return Err(LifecycleError::Validation(errors));
        };
        if !errors.is_empty() {
            return Err(LifecycleError::Validation(errors));
        }

        if quantity > event.available_tickets {
            return Err(LifecycleError::InsufficientInventory {
                requested: quantity,
                available: event.available_tickets,
            });
        }

        let mut next = event.clone();
        next.status = current_status;
        next.available_tickets -= quantity;
        if next.available_tickets == 0 {
            next.status = EventStatus::SoldOut;
        }
        let (next, event_write) = commit_event(next, now);

        let ticket = Ticket {
            id: Uuid::new_v4(),
            ticket_code: Ticket::generate_code(),
            event_id: event.id,
            user_id: user.id,
            ticket_type_id: ticket_type.id,
            quantity,
            total_price: ticket_type.total_for(quantity),
            old_total_price: None,
            buy_date: now,
            modified_date: None,
        };

        debug!(
            event_id = %event.id,
            quantity,
            available = next.available_tickets,
            "Issuing tickets"
        );

        let changeset = Changeset::new()
            .with(event_write)
            .with(Write::InsertTicket(ticket.clone()));
        Ok(LedgerOutcome {
            event: next,
            ticket,
            changeset,
        })
    }

    /// Changes the type and quantity of an existing ticket.
    ///
    /// The quantity delta is applied to the event counter exactly once.
    pub fn amend(
        &self,
        event: &Event,
        ticket: &Ticket,
        ticket_type: &TicketType,
        quantity: i32,
        caller_is_organizer: bool,
        now: DateTime<Utc>,
    ) -> Result<LedgerOutcome, LifecycleError> {
        if quantity <= 0 {
            return Err(LifecycleError::field(
                "quantity",
                "La cantidad de tickets debe ser mayor a 0",
            ));
        }
        let current_status = status::derive(event, now).to;
        if current_status.is_terminal() {
            return Err(LifecycleError::field(
                "status",
                "No se pueden modificar entradas de este evento",
            ));
        }
        if !caller_is_organizer && !self.within_edit_window(ticket, now) {
            return Err(self.window_expired());
        }

        let delta = quantity - ticket.quantity;
        if delta > event.available_tickets {
            return Err(LifecycleError::InsufficientInventory {
                requested: delta,
                available: event.available_tickets,
            });
        }

        let mut next = event.clone();
        next.status = current_status;
        next.available_tickets -= delta;
        if next.available_tickets == 0 {
            next.status = EventStatus::SoldOut;
        } else {
            status::refresh(&mut next, now);
        }
        let (next, event_write) = commit_event(next, now);

        let mut amended = ticket.clone();
        amended.old_total_price = Some(ticket.total_price);
        amended.ticket_type_id = ticket_type.id;
        amended.quantity = quantity;
        amended.total_price = ticket_type.total_for(quantity);
        amended.modified_date = Some(now);

        debug!(
            ticket_code = %ticket.ticket_code,
            delta,
            available = next.available_tickets,
            "Amending ticket"
        );

        let changeset = Changeset::new()
            .with(event_write)
            .with(Write::UpdateTicket(amended.clone()));
        Ok(LedgerOutcome {
            event: next,
            ticket: amended,
            changeset,
        })
    }

    /// Cancels a ticket and returns its seats to the event.
    pub fn revoke(
        &self,
        event: &Event,
        ticket: &Ticket,
        caller_is_organizer: bool,
        now: DateTime<Utc>,
    ) -> Result<LedgerOutcome, LifecycleError> {
        if !caller_is_organizer && !self.within_edit_window(ticket, now) {
            return Err(self.window_expired());
        }

        let mut next = event.clone();
        next.available_tickets += ticket.quantity;
        status::refresh(&mut next, now);
        let (next, event_write) = commit_event(next, now);

        debug!(
            ticket_code = %ticket.ticket_code,
            restored = ticket.quantity,
            available = next.available_tickets,
            "Revoking ticket"
        );

        let changeset = Changeset::new()
            .with(event_write)
            .with(Write::DeleteTicket(ticket.id));
        Ok(LedgerOutcome {
            event: next,
            ticket: ticket.clone(),
            changeset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-05-10T18:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn event(available: i32) -> Event {
        Event {
            id: Uuid::new_v4(),
            organizer_id: Uuid::new_v4(),
            venue_id: Some(Uuid::new_v4()),
            title: "Recital".to_string(),
            description: "Banda".to_string(),
            scheduled_at: now() + Duration::days(10),
            previous_date: None,
            capacity: 10,
            available_tickets: available,
            status: EventStatus::Active,
            version: 3,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "ana".to_string(),
            email: "ana@example.com".to_string(),
            is_organizer: false,
            created_at: now(),
        }
    }

    fn general() -> TicketType {
        TicketType {
            id: Uuid::new_v4(),
            name: "General".to_string(),
            price: dec!(100.00),
        }
    }

    fn vip() -> TicketType {
        TicketType {
            id: Uuid::new_v4(),
            name: "VIP".to_string(),
            price: dec!(250.00),
        }
    }

    #[test]
    fn test_issue_decrements_and_prices_ticket() {
        let ledger = TicketLedger::default();
        let e = event(10);
        let out = ledger
            .issue(Some(&e), Some(&user()), Some(&general()), 3, now())
            .unwrap();

        assert_eq!(out.event.available_tickets, 7);
        assert_eq!(out.event.status, EventStatus::Active);
        assert_eq!(out.event.version, 4);
        assert_eq!(out.ticket.total_price, dec!(300.00));
        assert_eq!(out.changeset.writes().len(), 2);
        assert!(matches!(
            out.changeset.writes()[0],
            Write::UpdateEvent { expected_version: 3, .. }
        ));
    }

    #[test]
    fn test_issue_last_tickets_sells_out() {
        let ledger = TicketLedger::default();
        let out = ledger
            .issue(Some(&event(4)), Some(&user()), Some(&general()), 4, now())
            .unwrap();
        assert_eq!(out.event.available_tickets, 0);
        assert_eq!(out.event.status, EventStatus::SoldOut);
    }

    #[test]
    fn test_issue_more_than_available_fails() {
        let ledger = TicketLedger::default();
        let err = ledger
            .issue(Some(&event(2)), Some(&user()), Some(&general()), 3, now())
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InsufficientInventory {
                requested: 3,
                available: 2
            }
        ));
    }

    #[test]
    fn test_issue_reports_every_missing_field() {
        let ledger = TicketLedger::default();
        let err = ledger.issue(None, None, None, 0, now()).unwrap_err();
        let LifecycleError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        for key in ["event", "user", "ticket_type", "quantity"] {
            assert!(fields.contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn test_issue_rejected_for_closed_events() {
        let ledger = TicketLedger::default();
        for closed in [EventStatus::SoldOut, EventStatus::Cancelled] {
            let mut e = event(5);
            e.status = closed;
            if closed == EventStatus::SoldOut {
                e.available_tickets = 0;
            }
            let err = ledger
                .issue(Some(&e), Some(&user()), Some(&general()), 1, now())
                .unwrap_err();
            let LifecycleError::Validation(fields) = err else {
                panic!("expected validation error for {closed}");
            };
            assert!(fields.contains_key("status"));
        }
    }

    #[test]
    fn test_issue_on_empty_active_event_reports_inventory() {
        let ledger = TicketLedger::default();
        let mut e = event(0);
        e.venue_id = None;
        e.capacity = 0;
        let err = ledger
            .issue(Some(&e), Some(&user()), Some(&general()), 1, now())
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InsufficientInventory {
                requested: 1,
                available: 0
            }
        ));
    }

    #[test]
    fn test_issue_rejected_once_date_has_passed() {
        let ledger = TicketLedger::default();
        let mut e = event(5);
        e.scheduled_at = now() - Duration::minutes(1);
        let err = ledger
            .issue(Some(&e), Some(&user()), Some(&general()), 1, now())
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(ref f) if f.contains_key("status")));
    }

    #[test]
    fn test_amend_applies_delta_once_and_keeps_old_total() {
        let ledger = TicketLedger::default();
        let e = event(10);
        let issued = ledger
            .issue(Some(&e), Some(&user()), Some(&general()), 2, now())
            .unwrap();

        let out = ledger
            .amend(
                &issued.event,
                &issued.ticket,
                &vip(),
                5,
                false,
                now() + Duration::minutes(10),
            )
            .unwrap();

        assert_eq!(out.event.available_tickets, 5);
        assert_eq!(out.ticket.quantity, 5);
        assert_eq!(out.ticket.old_total_price, Some(dec!(200.00)));
        assert_eq!(out.ticket.total_price, dec!(1250.00));
        assert!(out.ticket.modified_date.is_some());
    }

    #[test]
    fn test_amend_reducing_quantity_reopens_sold_out_event() {
        let ledger = TicketLedger::default();
        let issued = ledger
            .issue(Some(&event(3)), Some(&user()), Some(&general()), 3, now())
            .unwrap();
        assert_eq!(issued.event.status, EventStatus::SoldOut);

        let out = ledger
            .amend(&issued.event, &issued.ticket, &general(), 1, false, now())
            .unwrap();
        assert_eq!(out.event.available_tickets, 2);
        assert_eq!(out.event.status, EventStatus::Active);
    }

    #[test]
    fn test_amend_to_exact_remaining_sells_out() {
        let ledger = TicketLedger::default();
        let issued = ledger
            .issue(Some(&event(5)), Some(&user()), Some(&general()), 2, now())
            .unwrap();
        let out = ledger
            .amend(&issued.event, &issued.ticket, &general(), 5, false, now())
            .unwrap();
        assert_eq!(out.event.available_tickets, 0);
        assert_eq!(out.event.status, EventStatus::SoldOut);
    }

    #[test]
    fn test_amend_beyond_inventory_fails() {
        let ledger = TicketLedger::default();
        let issued = ledger
            .issue(Some(&event(4)), Some(&user()), Some(&general()), 2, now())
            .unwrap();
        let err = ledger
            .amend(&issued.event, &issued.ticket, &general(), 5, false, now())
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InsufficientInventory { .. }));
    }

    #[test]
    fn test_amend_after_window_requires_organizer() {
        let ledger = TicketLedger::default();
        let issued = ledger
            .issue(Some(&event(10)), Some(&user()), Some(&general()), 2, now())
            .unwrap();
        let late = now() + Duration::minutes(31);

        let err = ledger
            .amend(&issued.event, &issued.ticket, &general(), 3, false, late)
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::EditWindowExpired { window_minutes: 30 }
        ));

        let out = ledger
            .amend(&issued.event, &issued.ticket, &general(), 3, true, late)
            .unwrap();
        assert_eq!(out.event.available_tickets, 7);
    }

    #[test]
    fn test_amend_rejects_non_positive_quantity() {
        let ledger = TicketLedger::default();
        let issued = ledger
            .issue(Some(&event(10)), Some(&user()), Some(&general()), 2, now())
            .unwrap();
        let err = ledger
            .amend(&issued.event, &issued.ticket, &general(), 0, false, now())
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(ref f) if f.contains_key("quantity")));
    }

    #[test]
    fn test_revoke_restores_inventory() {
        let ledger = TicketLedger::default();
        let issued = ledger
            .issue(Some(&event(2)), Some(&user()), Some(&general()), 2, now())
            .unwrap();
        let out = ledger
            .revoke(&issued.event, &issued.ticket, false, now() + Duration::minutes(5))
            .unwrap();

        assert_eq!(out.event.available_tickets, 2);
        assert_eq!(out.event.status, EventStatus::Active);
        assert!(matches!(out.changeset.writes()[1], Write::DeleteTicket(id) if id == issued.ticket.id));
    }

    #[test]
    fn test_revoke_window_applies_to_attendees_only() {
        let ledger = TicketLedger::default();
        let issued = ledger
            .issue(Some(&event(10)), Some(&user()), Some(&general()), 1, now())
            .unwrap();
        let late = now() + Duration::hours(2);

        assert!(matches!(
            ledger.revoke(&issued.event, &issued.ticket, false, late),
            Err(LifecycleError::EditWindowExpired { .. })
        ));
        assert!(ledger.revoke(&issued.event, &issued.ticket, true, late).is_ok());
    }
}

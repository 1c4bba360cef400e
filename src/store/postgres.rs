//! PostgreSQL-backed [`Store`].
//!
//! A changeset runs inside one transaction. Best-effort writes are nested in
//! a savepoint so that their failure rolls back only themselves.

use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Acquire, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{Changeset, EventFilter, Store, StoreError, Write};
use crate::models::{
    Event, Favorite, InboxEntry, Notification, Ticket, TicketType, User, Venue,
};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        tracing::info!("Successfully connected to database");
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!().run(&self.pool).await?;
        tracing::info!("Migrations run successfully");
        Ok(())
    }
}

/// Maps unique-constraint violations to [`StoreError::Duplicate`].
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let constraint = db.constraint().unwrap_or("unique constraint").to_string();
            return StoreError::Duplicate(constraint);
        }
    }
    StoreError::Postgres(err)
}

fn missing(entity: &'static str, id: Uuid) -> StoreError {
    StoreError::Missing {
        entity,
        id: id.to_string(),
    }
}

async fn replace_recipients(
    conn: &mut PgConnection,
    notification_id: Uuid,
    recipients: &[Uuid],
) -> Result<(), StoreError> {
    sqlx::query(
        "DELETE FROM user_notifications WHERE notification_id = $1 AND NOT (user_id = ANY($2))",
    )
    .bind(notification_id)
    .bind(recipients)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "INSERT INTO user_notifications (user_id, notification_id, is_read) \
         SELECT DISTINCT u, $1, FALSE FROM UNNEST($2::UUID[]) AS u \
         ON CONFLICT (user_id, notification_id) DO NOTHING",
    )
    .bind(notification_id)
    .bind(recipients)
    .execute(&mut *conn)
    .await
    .map_err(classify)?;
    Ok(())
}

async fn execute(conn: &mut PgConnection, write: &Write) -> Result<(), StoreError> {
    match write {
        Write::InsertUser(user) => {
            sqlx::query(
                "INSERT INTO users (id, username, email, is_organizer, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(user.is_organizer)
            .bind(user.created_at)
            .execute(&mut *conn)
            .await
            .map_err(classify)?;
        }
        Write::InsertVenue(venue) => {
            sqlx::query(
                "INSERT INTO venues (id, name, address, city, capacity, contact) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(venue.id)
            .bind(&venue.name)
            .bind(&venue.address)
            .bind(&venue.city)
            .bind(venue.capacity)
            .bind(&venue.contact)
            .execute(&mut *conn)
            .await
            .map_err(classify)?;
        }
        Write::InsertTicketType(ticket_type) => {
            sqlx::query("INSERT INTO ticket_types (id, name, price) VALUES ($1, $2, $3)")
                .bind(ticket_type.id)
                .bind(&ticket_type.name)
                .bind(ticket_type.price)
                .execute(&mut *conn)
                .await
                .map_err(classify)?;
        }
        Write::UpdateTicketType(ticket_type) => {
            let result = sqlx::query("UPDATE ticket_types SET name = $2, price = $3 WHERE id = $1")
                .bind(ticket_type.id)
                .bind(&ticket_type.name)
                .bind(ticket_type.price)
                .execute(&mut *conn)
                .await
                .map_err(classify)?;
            if result.rows_affected() == 0 {
                return Err(missing("ticket_type", ticket_type.id));
            }
        }
        Write::InsertEvent(event) => {
            sqlx::query(
                "INSERT INTO events (id, organizer_id, venue_id, title, description, scheduled_at, \
                 previous_date, capacity, available_tickets, status, version, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            )
            .bind(event.id)
            .bind(event.organizer_id)
            .bind(event.venue_id)
            .bind(&event.title)
            .bind(&event.description)
            .bind(event.scheduled_at)
            .bind(event.previous_date)
            .bind(event.capacity)
            .bind(event.available_tickets)
            .bind(event.status)
            .bind(event.version)
            .bind(event.created_at)
            .bind(event.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(classify)?;
        }
        Write::UpdateEvent {
            event,
            expected_version,
        } => {
            let result = sqlx::query(
                "UPDATE events SET organizer_id = $2, venue_id = $3, title = $4, description = $5, \
                 scheduled_at = $6, previous_date = $7, capacity = $8, available_tickets = $9, \
                 status = $10, version = $11, updated_at = $12 \
                 WHERE id = $1 AND version = $13",
            )
            .bind(event.id)
            .bind(event.organizer_id)
            .bind(event.venue_id)
            .bind(&event.title)
            .bind(&event.description)
            .bind(event.scheduled_at)
            .bind(event.previous_date)
            .bind(event.capacity)
            .bind(event.available_tickets)
            .bind(event.status)
            .bind(event.version)
            .bind(event.updated_at)
            .bind(*expected_version)
            .execute(&mut *conn)
            .await
            .map_err(classify)?;

            if result.rows_affected() == 0 {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM events WHERE id = $1)")
                        .bind(event.id)
                        .fetch_one(&mut *conn)
                        .await?;
                return Err(if exists {
                    StoreError::Conflict {
                        entity: "event",
                        id: event.id.to_string(),
                    }
                } else {
                    missing("event", event.id)
                });
            }
        }
        Write::DeleteEvent(id) => {
            // Tickets, notifications, receipts and favorites cascade via foreign keys.
            let result = sqlx::query("DELETE FROM events WHERE id = $1")
                .bind(id)
                .execute(&mut *conn)
                .await?;
            if result.rows_affected() == 0 {
                return Err(missing("event", *id));
            }
        }
        Write::InsertTicket(ticket) => {
            sqlx::query(
                "INSERT INTO tickets (id, ticket_code, event_id, user_id, ticket_type_id, quantity, \
                 total_price, old_total_price, buy_date, modified_date) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(ticket.id)
            .bind(&ticket.ticket_code)
            .bind(ticket.event_id)
            .bind(ticket.user_id)
            .bind(ticket.ticket_type_id)
            .bind(ticket.quantity)
            .bind(ticket.total_price)
            .bind(ticket.old_total_price)
            .bind(ticket.buy_date)
            .bind(ticket.modified_date)
            .execute(&mut *conn)
            .await
            .map_err(classify)?;
        }
        Write::UpdateTicket(ticket) => {
            let result = sqlx::query(
                "UPDATE tickets SET ticket_type_id = $2, quantity = $3, total_price = $4, \
                 old_total_price = $5, modified_date = $6 WHERE id = $1",
            )
            .bind(ticket.id)
            .bind(ticket.ticket_type_id)
            .bind(ticket.quantity)
            .bind(ticket.total_price)
            .bind(ticket.old_total_price)
            .bind(ticket.modified_date)
            .execute(&mut *conn)
            .await?;
            if result.rows_affected() == 0 {
                return Err(missing("ticket", ticket.id));
            }
        }
        Write::DeleteTicket(id) => {
            let result = sqlx::query("DELETE FROM tickets WHERE id = $1")
                .bind(id)
                .execute(&mut *conn)
                .await?;
            if result.rows_affected() == 0 {
                return Err(missing("ticket", *id));
            }
        }
        Write::InsertNotification {
            notification,
            recipients,
        } => {
            sqlx::query(
                "INSERT INTO notifications (id, event_id, title, message, priority, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(notification.id)
            .bind(notification.event_id)
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(notification.priority)
            .bind(notification.created_at)
            .execute(&mut *conn)
            .await
            .map_err(classify)?;
            replace_recipients(conn, notification.id, recipients).await?;
        }
        Write::UpdateNotification {
            notification,
            recipients,
        } => {
            let result = sqlx::query(
                "UPDATE notifications SET event_id = $2, title = $3, message = $4, priority = $5 \
                 WHERE id = $1",
            )
            .bind(notification.id)
            .bind(notification.event_id)
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(notification.priority)
            .execute(&mut *conn)
            .await?;
            if result.rows_affected() == 0 {
                return Err(missing("notification", notification.id));
            }
            replace_recipients(conn, notification.id, recipients).await?;
        }
        Write::DeleteNotification(id) => {
            let result = sqlx::query("DELETE FROM notifications WHERE id = $1")
                .bind(id)
                .execute(&mut *conn)
                .await?;
            if result.rows_affected() == 0 {
                return Err(missing("notification", *id));
            }
        }
        Write::MarkRead {
            user_id,
            notification_id,
            at,
        } => {
            sqlx::query(
                "UPDATE user_notifications SET is_read = TRUE, read_at = $3 \
                 WHERE user_id = $1 AND ($2::UUID IS NULL OR notification_id = $2) \
                 AND is_read = FALSE",
            )
            .bind(user_id)
            .bind(notification_id)
            .bind(at)
            .execute(&mut *conn)
            .await?;
        }
        Write::InsertFavorite(favorite) => {
            sqlx::query("INSERT INTO favorites (user_id, event_id, created_at) VALUES ($1, $2, $3)")
                .bind(favorite.user_id)
                .bind(favorite.event_id)
                .bind(favorite.created_at)
                .execute(&mut *conn)
                .await
                .map_err(classify)?;
        }
        Write::DeleteFavorite { user_id, event_id } => {
            sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND event_id = $2")
                .bind(user_id)
                .bind(event_id)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn event(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(event)
    }

    async fn events(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM events WHERE TRUE");
        if let Some(venue_id) = filter.venue_id {
            query.push(" AND venue_id = ").push_bind(venue_id);
        }
        if let Some(date) = filter.date {
            query
                .push(" AND (scheduled_at AT TIME ZONE 'UTC')::DATE = ")
                .push_bind(date);
        }
        query.push(" ORDER BY scheduled_at");

        let events = query
            .build_query_as::<Event>()
            .fetch_all(&self.pool)
            .await?;
        Ok(events)
    }

    async fn title_taken(&self, title: &str, exclude: Option<Uuid>) -> Result<bool, StoreError> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM events WHERE LOWER(title) = LOWER($1) \
             AND ($2::UUID IS NULL OR id <> $2))",
        )
        .bind(title.trim())
        .bind(exclude)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn venue(&self, id: Uuid) -> Result<Option<Venue>, StoreError> {
        let venue = sqlx::query_as::<_, Venue>("SELECT * FROM venues WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(venue)
    }

    async fn ticket_type(&self, id: Uuid) -> Result<Option<TicketType>, StoreError> {
        let ticket_type = sqlx::query_as::<_, TicketType>("SELECT * FROM ticket_types WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket_type)
    }

    async fn ticket_types(&self) -> Result<Vec<TicketType>, StoreError> {
        let types = sqlx::query_as::<_, TicketType>("SELECT * FROM ticket_types ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(types)
    }

    async fn user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn users(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY username")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn ticket(&self, code: &str) -> Result<Option<Ticket>, StoreError> {
        let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE ticket_code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }

    async fn tickets_for_event(&self, event_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        let tickets = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE event_id = $1 ORDER BY buy_date DESC",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tickets)
    }

    async fn tickets_for_user(&self, user_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        let tickets = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE user_id = $1 ORDER BY buy_date DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tickets)
    }

    async fn ticket_holders(&self, event_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let holders: Vec<Uuid> = sqlx::query_scalar(
            "SELECT DISTINCT user_id FROM tickets WHERE event_id = $1 ORDER BY user_id",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(holders)
    }

    async fn notification(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        let notification =
            sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(notification)
    }

    async fn notifications(&self) -> Result<Vec<Notification>, StoreError> {
        let all = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(all)
    }

    async fn notification_recipients(&self, id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let recipients: Vec<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM user_notifications WHERE notification_id = $1 ORDER BY user_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recipients)
    }

    async fn inbox(&self, user_id: Uuid) -> Result<Vec<InboxEntry>, StoreError> {
        let entries = sqlx::query_as::<_, InboxEntry>(
            "SELECT n.id, n.event_id, n.title, n.message, n.priority, n.created_at, \
             un.is_read, un.read_at \
             FROM notifications n \
             JOIN user_notifications un ON un.notification_id = n.id \
             WHERE un.user_id = $1 \
             ORDER BY n.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn favorites(&self, user_id: Uuid) -> Result<Vec<Favorite>, StoreError> {
        let favorites = sqlx::query_as::<_, Favorite>(
            "SELECT * FROM favorites WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(favorites)
    }

    async fn is_favorite(&self, user_id: Uuid, event_id: Uuid) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM favorites WHERE user_id = $1 AND event_id = $2)",
        )
        .bind(user_id)
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn apply(&self, changeset: Changeset) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for write in changeset.writes() {
            execute(&mut tx, write).await?;
        }

        if !changeset.best_effort().is_empty() {
            let mut savepoint = tx.begin().await?;
            let mut outcome = Ok(());
            for write in changeset.best_effort() {
                outcome = execute(&mut savepoint, write).await;
                if outcome.is_err() {
                    break;
                }
            }
            match outcome {
                Ok(()) => savepoint.commit().await?,
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding best-effort writes");
                    savepoint.rollback().await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

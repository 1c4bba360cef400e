use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::create_cors_layer;
use crate::handlers::{events, health_check, notifications, tickets};
use crate::state::AppState;

pub fn create_routes(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/events", get(events::list_events).post(events::create_event))
        .route(
            "/events/:id",
            get(events::event_detail)
                .put(events::update_event)
                .delete(events::delete_event),
        )
        .route("/events/:id/cancel", post(events::cancel_event))
        .route("/events/:id/tickets", post(events::purchase_tickets))
        .route("/events/:id/favorite", post(events::toggle_favorite))
        .route("/favorites", get(events::list_favorites))
        .route("/tickets", get(tickets::my_tickets))
        .route(
            "/ticket-types",
            get(tickets::list_ticket_types).post(tickets::create_ticket_type),
        )
        .route("/ticket-types/:id", put(tickets::update_ticket_type))
        .route(
            "/tickets/:code",
            get(tickets::ticket_by_code)
                .put(tickets::amend_ticket)
                .delete(tickets::revoke_ticket),
        )
        .route(
            "/notifications",
            get(notifications::list_notifications).post(notifications::create_notification),
        )
        .route(
            "/notifications/:id",
            put(notifications::update_notification)
                .delete(notifications::delete_notification),
        )
        .route("/inbox", get(notifications::inbox))
        .route("/inbox/unread", get(notifications::unread_count))
        .route("/inbox/read", post(notifications::mark_all_read))
        .route("/inbox/:id/read", post(notifications::mark_read))
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer(allowed_origins))
        .with_state(state)
}

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::auth::CurrentUser;
use crate::lifecycle::{EventChanges, EventQuery, NewEvent};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub ticket_type_id: Uuid,
    pub quantity: i32,
}

pub async fn list_events(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<EventQuery>,
) -> Result<Response, AppError> {
    let events = state.events.list_events(&query).await?;
    Ok(success(events, "Events retrieved"))
}

pub async fn create_event(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<NewEvent>,
) -> Result<Response, AppError> {
    let event = state.events.create(body, &user).await?;
    Ok(created(event, "Event created"))
}

pub async fn event_detail(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let detail = state.events.event_detail(event_id, &user).await?;
    Ok(success(detail, "Event retrieved"))
}

pub async fn update_event(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(event_id): Path<Uuid>,
    Json(body): Json<EventChanges>,
) -> Result<Response, AppError> {
    let event = state.events.update(event_id, body, &user).await?;
    Ok(success(event, "Event updated"))
}

pub async fn cancel_event(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let event = state.events.cancel(event_id, &user).await?;
    Ok(success(event, "Event cancelled"))
}

pub async fn delete_event(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    state.events.delete(event_id, &user).await?;
    Ok(empty_success("Event deleted"))
}

pub async fn purchase_tickets(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(event_id): Path<Uuid>,
    Json(body): Json<PurchaseRequest>,
) -> Result<Response, AppError> {
    let ticket = state
        .events
        .issue_ticket(event_id, &user, body.ticket_type_id, body.quantity)
        .await?;
    Ok(created(ticket, "Tickets purchased"))
}

pub async fn toggle_favorite(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let is_favorite = state.favorites.toggle(event_id, &user).await?;
    Ok(success(
        serde_json::json!({ "event_id": event_id, "is_favorite": is_favorite }),
        "Favorite toggled",
    ))
}

pub async fn list_favorites(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, AppError> {
    let favorites = state.favorites.list(&user).await?;
    Ok(success(favorites, "Favorites retrieved"))
}

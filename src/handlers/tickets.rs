use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::auth::CurrentUser;
use crate::services::TicketTypeDraft;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};

#[derive(Debug, Deserialize)]
pub struct AmendRequest {
    /// Keeps the current type when omitted.
    pub ticket_type_id: Option<Uuid>,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct PriceRequest {
    pub price: Option<Decimal>,
}

pub async fn my_tickets(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, AppError> {
    let tickets = state.events.tickets_for(&user).await?;
    Ok(success(tickets, "Tickets retrieved"))
}

pub async fn ticket_by_code(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    let ticket = state.events.ticket(&code, &user).await?;
    Ok(success(ticket, "Ticket retrieved"))
}

pub async fn amend_ticket(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(code): Path<String>,
    Json(body): Json<AmendRequest>,
) -> Result<Response, AppError> {
    let ticket = state
        .events
        .amend_ticket(&code, &user, body.ticket_type_id, body.quantity)
        .await?;
    Ok(success(ticket, "Ticket updated"))
}

pub async fn revoke_ticket(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    state.events.revoke_ticket(&code, &user).await?;
    Ok(empty_success("Ticket cancelled"))
}

pub async fn list_ticket_types(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Response, AppError> {
    let types = state.ticket_types.list().await?;
    Ok(success(types, "Ticket types retrieved"))
}

pub async fn create_ticket_type(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<TicketTypeDraft>,
) -> Result<Response, AppError> {
    let ticket_type = state.ticket_types.create(body, &user).await?;
    Ok(created(ticket_type, "Ticket type created"))
}

pub async fn update_ticket_type(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<PriceRequest>,
) -> Result<Response, AppError> {
    let ticket_type = state.ticket_types.update_price(id, body.price, &user).await?;
    Ok(success(ticket_type, "Ticket type updated"))
}

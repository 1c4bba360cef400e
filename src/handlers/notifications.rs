use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use uuid::Uuid;

use super::auth::CurrentUser;
use crate::services::NotificationDraft;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};

pub async fn list_notifications(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, AppError> {
    let notifications = state.notifications.list_all(&user).await?;
    Ok(success(notifications, "Notifications retrieved"))
}

pub async fn create_notification(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<NotificationDraft>,
) -> Result<Response, AppError> {
    let notification = state.notifications.create(body, &user).await?;
    Ok(created(notification, "Notification sent"))
}

pub async fn update_notification(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<NotificationDraft>,
) -> Result<Response, AppError> {
    let notification = state.notifications.update(id, body, &user).await?;
    Ok(success(notification, "Notification updated"))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    state.notifications.delete(id, &user).await?;
    Ok(empty_success("Notification deleted"))
}

pub async fn inbox(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, AppError> {
    let entries = state.notifications.inbox(&user).await?;
    Ok(success(entries, "Inbox retrieved"))
}

pub async fn unread_count(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, AppError> {
    let unread = state.notifications.unread_count(&user).await?;
    Ok(success(serde_json::json!({ "unread": unread }), "Unread count"))
}

pub async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    state.notifications.mark_read(id, &user).await?;
    Ok(empty_success("Notification marked as read"))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, AppError> {
    state.notifications.mark_all_read(&user).await?;
    Ok(empty_success("All notifications marked as read"))
}

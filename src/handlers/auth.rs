use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::lifecycle::Identity;
use crate::state::AppState;
use crate::utils::error::AppError;

/// Header set by the identity provider in front of the API.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The caller, resolved from [`USER_ID_HEADER`] against the user table.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Identity);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .ok_or_else(|| AppError::AuthError(format!("Missing or invalid {USER_ID_HEADER} header")))?;

        let user = state
            .store
            .user(user_id)
            .await?
            .ok_or_else(|| AppError::AuthError("Unknown user".to_string()))?;

        Ok(CurrentUser(Identity {
            user_id: user.id,
            is_organizer: user.is_organizer,
        }))
    }
}

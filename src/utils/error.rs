use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, warn};

use crate::lifecycle::error::GENERAL_ERROR_KEY;
use crate::lifecycle::{FieldErrors, LifecycleError};
use crate::store::StoreError;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0:?}")]
    ValidationError(FieldErrors),

    #[error("{0}")]
    InsufficientInventory(String),

    #[error("{0}")]
    EditWindowExpired(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Storage error")]
    StorageError(#[from] StoreError),
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Validation(fields) => AppError::ValidationError(fields),
            e @ LifecycleError::InsufficientInventory { .. } => {
                AppError::InsufficientInventory(e.to_string())
            }
            e @ LifecycleError::EditWindowExpired { .. } => AppError::EditWindowExpired(e.to_string()),
            LifecycleError::Forbidden(msg) => AppError::Forbidden(msg),
            LifecycleError::NotFound(msg) => AppError::NotFound(msg),
            LifecycleError::Storage(e) => AppError::StorageError(e),
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::InsufficientInventory(_) => StatusCode::CONFLICT,
            AppError::EditWindowExpired(_) => StatusCode::CONFLICT,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::InsufficientInventory(_) => "INSUFFICIENT_INVENTORY",
            AppError::EditWindowExpired(_) => "EDIT_WINDOW_EXPIRED",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::StorageError(_) => "STORAGE_ERROR",
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::ValidationError(_) => "La solicitud contiene datos inválidos".to_string(),
            AppError::InsufficientInventory(msg)
            | AppError::EditWindowExpired(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg) => msg.clone(),
            AppError::StorageError(_) => "Error interno del servidor".to_string(),
        }
    }

    /// Field map for validation failures, `{"error": message}` otherwise.
    fn details(&self) -> Value {
        let fields = match self {
            AppError::ValidationError(fields) => fields.clone(),
            other => {
                let mut map = FieldErrors::new();
                map.insert(GENERAL_ERROR_KEY.to_string(), other.public_message());
                map
            }
        };
        serde_json::to_value(fields).unwrap_or(Value::Null)
    }

    fn log(&self) {
        match self {
            AppError::StorageError(e) => {
                error!(error = ?e, "Storage error");
            }
            other => {
                warn!(code = other.code(), message = %other, "Request rejected");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        // Storage internals never reach the client
        error_response(code, self.public_message(), Some(self.details()), status)
    }
}

use std::collections::BTreeMap;

use thiserror::Error;

use crate::store::StoreError;

/// Field name to user-facing message, rendered inline by the presentation layer.
pub type FieldErrors = BTreeMap<String, String>;

/// Key used for failures that are not tied to a single field.
pub const GENERAL_ERROR_KEY: &str = "error";

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("validation failed: {0:?}")]
    Validation(FieldErrors),

    #[error("No hay suficientes entradas disponibles")]
    InsufficientInventory { requested: i32, available: i32 },

    #[error("El ticket solo se puede modificar o eliminar en los {window_minutes} minutos posteriores a su compra")]
    EditWindowExpired { window_minutes: i64 },

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl LifecycleError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), message.into());
        Self::Validation(errors)
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} no encontrado"))
    }

    /// Storage failures are the only fatal variant.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    pub(crate) fn is_write_conflict(&self) -> bool {
        matches!(self, Self::Storage(StoreError::Conflict { .. }))
    }
}

use thiserror::Error;

/// Errors raised by a [`Store`](super::Store) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A compare-and-swap guard failed: another writer committed first.
    #[error("Concurrent modification of {entity} {id}")]
    Conflict { entity: &'static str, id: String },

    #[error("{entity} {id} does not exist")]
    Missing { entity: &'static str, id: String },

    #[error("Duplicate value for {0}")]
    Duplicate(String),
}

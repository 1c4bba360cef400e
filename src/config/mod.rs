use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::lifecycle::ledger::DEFAULT_EDIT_WINDOW_MINUTES;
use crate::lifecycle::service::DEFAULT_MAX_WRITE_RETRIES;

pub mod cors;

pub use cors::create_cors_layer;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Absent means the server runs on the in-memory store.
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    pub cors_allowed_origins: Vec<String>,
    pub ticket_edit_window_minutes: i64,
    pub max_write_retries: u32,
    pub environment: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Invalid values are
    /// reported and replaced by their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let origins = lookup("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string());

        Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            bind_addr: parse_or(&lookup, "BIND_ADDR", || {
                SocketAddr::from(([0, 0, 0, 0], 3001))
            }),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", || DEFAULT_MAX_CONNECTIONS),
            cors_allowed_origins: origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect(),
            ticket_edit_window_minutes: parse_or(&lookup, "TICKET_EDIT_WINDOW_MINUTES", || {
                DEFAULT_EDIT_WINDOW_MINUTES
            }),
            max_write_retries: parse_or(&lookup, "MAX_WRITE_RETRIES", || DEFAULT_MAX_WRITE_RETRIES),
            environment: lookup("RUST_ENV").unwrap_or_else(|| "development".to_string()),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: impl FnOnce() -> T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => default(),
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, value = %raw, error = %e, "Invalid config value, using default");
                default()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.bind_addr.to_string(), "0.0.0.0:3001");
        assert_eq!(cfg.db_max_connections, 5);
        assert_eq!(cfg.ticket_edit_window_minutes, 30);
        assert_eq!(cfg.max_write_retries, 3);
        assert_eq!(cfg.cors_allowed_origins.len(), 2);
        assert!(!cfg.is_production());
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let cfg = config(&[
            ("DATABASE_URL", "postgres://localhost/eventhub"),
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("TICKET_EDIT_WINDOW_MINUTES", "45"),
            ("MAX_WRITE_RETRIES", "many"),
            ("CORS_ALLOWED_ORIGINS", "https://eventhub.example, ,"),
            ("RUST_ENV", "Production"),
        ]);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/eventhub"));
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert_eq!(cfg.ticket_edit_window_minutes, 45);
        assert_eq!(cfg.max_write_retries, 3);
        assert_eq!(cfg.cors_allowed_origins, vec!["https://eventhub.example"]);
        assert!(cfg.is_production());
    }
}

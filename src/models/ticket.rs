use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TicketType {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
}

impl TicketType {
    pub fn total_for(&self, quantity: i32) -> Decimal {
        self.price * Decimal::from(quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_code: String,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub ticket_type_id: Uuid,
    pub quantity: i32,
    pub total_price: Decimal,
    /// Total before the most recent amendment.
    pub old_total_price: Option<Decimal>,
    pub buy_date: DateTime<Utc>,
    pub modified_date: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Generates a customer-facing ticket code.
    pub fn generate_code() -> String {
        format!("TKT-{}", Uuid::new_v4().simple()).to_uppercase()
    }
}

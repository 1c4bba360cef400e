use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::lifecycle::{FieldErrors, Identity, LifecycleError};
use crate::models::TicketType;
use crate::store::{Changeset, Store, StoreError, Write};

const PRICE_ERROR: &str = "El precio debe ser un número mayor a 0";

#[derive(Debug, Clone, Deserialize)]
pub struct TicketTypeDraft {
    pub name: String,
    pub price: Option<Decimal>,
}

fn valid_price(price: Option<Decimal>) -> Option<Decimal> {
    price.filter(|p| *p > Decimal::ZERO)
}

/// Price references that tickets are sold against.
pub struct TicketTypeService {
    store: Arc<dyn Store>,
}

impl TicketTypeService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<TicketType>, LifecycleError> {
        Ok(self.store.ticket_types().await?)
    }

    pub async fn create(&self, draft: TicketTypeDraft, actor: &Identity) -> Result<TicketType, LifecycleError> {
        actor.require_organizer("crear tipos de ticket")?;
        let name = draft.name.trim().to_string();

        let mut errors = FieldErrors::new();
        if name.is_empty() {
            errors.insert("name".into(), "El nombre es requerido".into());
        } else if self.store.ticket_types().await?.iter().any(|t| t.name == name) {
            errors.insert("name".into(), "Ya existe un tipo de ticket con ese nombre".into());
        }
        let price = valid_price(draft.price);
        if price.is_none() {
            errors.insert("price".into(), PRICE_ERROR.into());
        }
        let (Some(price), true) = (price, errors.is_empty()) else {
            return Err(LifecycleError::Validation(errors));
        };

        let ticket_type = TicketType {
            id: Uuid::new_v4(),
            name,
            price,
        };
        match self
            .store
            .apply(Changeset::new().with(Write::InsertTicketType(ticket_type.clone())))
            .await
        {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => {
                return Err(LifecycleError::field(
                    "name",
                    "Ya existe un tipo de ticket con ese nombre",
                ))
            }
            Err(e) => return Err(e.into()),
        }

        info!(ticket_type_id = %ticket_type.id, name = %ticket_type.name, "Ticket type created");
        Ok(ticket_type)
    }

    /// Changes the price. Tickets already sold keep the total they were bought at.
    pub async fn update_price(
        &self,
        id: Uuid,
        price: Option<Decimal>,
        actor: &Identity,
    ) -> Result<TicketType, LifecycleError> {
        actor.require_organizer("editar tipos de ticket")?;
        let current = self
            .store
            .ticket_type(id)
            .await?
            .ok_or_else(|| LifecycleError::not_found("Tipo de ticket"))?;
        let price = valid_price(price).ok_or_else(|| LifecycleError::field("price", PRICE_ERROR))?;

        let updated = TicketType { price, ..current };
        self.store
            .apply(Changeset::new().with(Write::UpdateTicketType(updated.clone())))
            .await?;

        info!(ticket_type_id = %id, price = %price, "Ticket type price updated");
        Ok(updated)
    }
}

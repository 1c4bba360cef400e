use std::sync::Arc;

use crate::config::Config;
use crate::lifecycle::{Clock, EventLifecycleService, TicketLedger};
use crate::services::{FavoriteService, NotificationService, TicketTypeService};
use crate::store::Store;

/// Shared handles passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub events: Arc<EventLifecycleService>,
    pub notifications: Arc<NotificationService>,
    pub favorites: Arc<FavoriteService>,
    pub ticket_types: Arc<TicketTypeService>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        let events = EventLifecycleService::new(store.clone())
            .with_clock(clock.clone())
            .with_ledger(TicketLedger::new(config.ticket_edit_window_minutes))
            .with_max_write_retries(config.max_write_retries);

        Self {
            events: Arc::new(events),
            notifications: Arc::new(NotificationService::new(store.clone(), clock.clone())),
            favorites: Arc::new(FavoriteService::new(store.clone(), clock)),
            ticket_types: Arc::new(TicketTypeService::new(store.clone())),
            store,
        }
    }
}

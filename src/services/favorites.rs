use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::lifecycle::service::refresh_stored;
use crate::lifecycle::{Clock, Identity, LifecycleError};
use crate::models::{Event, Favorite};
use crate::store::{Changeset, Store, Write};

#[derive(Debug, Clone, Serialize)]
pub struct FavoriteEvent {
    pub event: Event,
    pub favorited_at: chrono::DateTime<chrono::Utc>,
}

pub struct FavoriteService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl FavoriteService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Adds the event to the viewer's favorites, or removes it if already
    /// there. Returns whether the event is a favorite afterwards.
    pub async fn toggle(&self, event_id: Uuid, viewer: &Identity) -> Result<bool, LifecycleError> {
        if self.store.event(event_id).await?.is_none() {
            return Err(LifecycleError::not_found("Evento"));
        }

        let user_id = viewer.user_id;
        let (write, now_favorite) = if self.store.is_favorite(user_id, event_id).await? {
            (Write::DeleteFavorite { user_id, event_id }, false)
        } else {
            let favorite = Favorite {
                user_id,
                event_id,
                created_at: self.clock.now(),
            };
            (Write::InsertFavorite(favorite), true)
        };
        self.store.apply(Changeset::new().with(write)).await?;

        debug!(%user_id, %event_id, favorite = now_favorite, "Favorite toggled");
        Ok(now_favorite)
    }

    /// The viewer's favorite events, most recently added first, with their
    /// status brought up to date.
    pub async fn list(&self, viewer: &Identity) -> Result<Vec<FavoriteEvent>, LifecycleError> {
        let now = self.clock.now();
        let favorites = self.store.favorites(viewer.user_id).await?;
        let mut events = Vec::with_capacity(favorites.len());
        for favorite in favorites {
            if let Some(event) = self.store.event(favorite.event_id).await? {
                events.push(FavoriteEvent {
                    event: refresh_stored(self.store.as_ref(), event, now).await?,
                    favorited_at: favorite.created_at,
                });
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::clock::ManualClock;
    use crate::models::EventStatus;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};

    fn event(title: &str) -> Event {
        let created = Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap();
        Event {
            id: Uuid::new_v4(),
            organizer_id: Uuid::new_v4(),
            venue_id: None,
            title: title.to_string(),
            description: "d".to_string(),
            scheduled_at: created + Duration::days(9),
            previous_date: None,
            capacity: 0,
            available_tickets: 0,
            status: EventStatus::Active,
            version: 0,
            created_at: created,
            updated_at: created,
        }
    }

    #[tokio::test]
    async fn test_toggle_adds_then_removes() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 2, 2, 8, 0, 0).unwrap()));
        let first = event("Mercado de pulgas");
        let second = event("Cine al aire libre");
        store
            .apply(
                Changeset::new()
                    .with(Write::InsertEvent(first.clone()))
                    .with(Write::InsertEvent(second.clone())),
            )
            .await
            .unwrap();
        let service = FavoriteService::new(store.clone(), clock.clone());
        let viewer = Identity::attendee(Uuid::new_v4());

        assert!(service.toggle(first.id, &viewer).await.unwrap());
        clock.advance(Duration::minutes(1));
        assert!(service.toggle(second.id, &viewer).await.unwrap());

        let listed = service.list(&viewer).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].event.id, second.id);

        assert!(!service.toggle(first.id, &viewer).await.unwrap());
        let listed = service.list(&viewer).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!store.is_favorite(viewer.user_id, first.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_toggle_unknown_event() {
        let service = FavoriteService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(Utc::now())),
        );
        let err = service
            .toggle(Uuid::new_v4(), &Identity::attendee(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_listing_reports_finished_events() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 2, 2, 8, 0, 0).unwrap()));
        let concert = event("Recital de tango");
        store
            .apply(Changeset::new().with(Write::InsertEvent(concert.clone())))
            .await
            .unwrap();
        let service = FavoriteService::new(store.clone(), clock.clone());
        let viewer = Identity::attendee(Uuid::new_v4());
        service.toggle(concert.id, &viewer).await.unwrap();

        clock.advance(Duration::days(30));
        let listed = service.list(&viewer).await.unwrap();
        assert_eq!(listed[0].event.status, EventStatus::Finished);
        assert_eq!(
            store.event(concert.id).await.unwrap().unwrap().status,
            EventStatus::Finished
        );
    }
}

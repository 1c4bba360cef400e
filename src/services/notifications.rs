use std::sync::Arc;

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::lifecycle::{Clock, FieldErrors, Identity, LifecycleError};
use crate::models::{InboxEntry, Notification, NotificationPriority};
use crate::store::{Changeset, Store, StoreError, Write};

/// Who receives a manual notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Audience {
    All,
    User { user_id: Uuid },
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationDraft {
    pub title: String,
    pub message: String,
    pub event_id: Option<Uuid>,
    pub audience: Option<Audience>,
    #[serde(default)]
    pub priority: NotificationPriority,
}

/// Organizer-authored notifications and the per-user inbox.
pub struct NotificationService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn recipients(&self, audience: Option<Audience>) -> Result<Option<Vec<Uuid>>, LifecycleError> {
        Ok(match audience {
            None => None,
            Some(Audience::All) => Some(self.store.users().await?.into_iter().map(|u| u.id).collect()),
            Some(Audience::User { user_id }) => {
                self.store.user(user_id).await?.map(|u| vec![u.id])
            }
        })
    }

    async fn validate(&self, draft: &NotificationDraft) -> Result<(FieldErrors, Vec<Uuid>), LifecycleError> {
        let mut errors = FieldErrors::new();
        if draft.title.trim().is_empty() {
            errors.insert("title".into(), "El título no puede estar vacío".into());
        }
        if draft.message.trim().is_empty() {
            errors.insert("message".into(), "El mensaje no puede estar vacío".into());
        }

        let event = match draft.event_id {
            Some(id) => self.store.event(id).await?,
            None => None,
        };
        if event.is_none() {
            errors.insert("event".into(), "El evento no puede ser nulo".into());
        }

        let recipients = self.recipients(draft.audience).await?;
        if recipients.is_none() {
            errors.insert("users".into(), "Los usuarios no pueden ser nulos".into());
        }

        Ok((errors, recipients.unwrap_or_default()))
    }

    pub async fn create(&self, draft: NotificationDraft, actor: &Identity) -> Result<Notification, LifecycleError> {
        actor.require_organizer("enviar notificaciones")?;
        let (errors, recipients) = self.validate(&draft).await?;
        if !errors.is_empty() {
            return Err(LifecycleError::Validation(errors));
        }

        let notification = Notification {
            id: Uuid::new_v4(),
            event_id: draft.event_id,
            title: draft.title.trim().to_string(),
            message: draft.message.trim().to_string(),
            priority: draft.priority,
            created_at: self.clock.now(),
        };
        let recipient_count = recipients.len();
        self.store
            .apply(Changeset::new().with(Write::InsertNotification {
                notification: notification.clone(),
                recipients,
            }))
            .await?;

        info!(notification_id = %notification.id, recipients = recipient_count, "Notification sent");
        Ok(notification)
    }

    /// Replaces title, message, event, priority and audience. Recipients
    /// kept from the previous audience keep their read state.
    pub async fn update(
        &self,
        id: Uuid,
        draft: NotificationDraft,
        actor: &Identity,
    ) -> Result<Notification, LifecycleError> {
        actor.require_organizer("editar notificaciones")?;
        let current = self
            .store
            .notification(id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound("Notificación no encontrada".to_string()))?;
        let (errors, recipients) = self.validate(&draft).await?;
        if !errors.is_empty() {
            return Err(LifecycleError::Validation(errors));
        }

        let notification = Notification {
            title: draft.title.trim().to_string(),
            message: draft.message.trim().to_string(),
            event_id: draft.event_id,
            priority: draft.priority,
            ..current
        };
        self.store
            .apply(Changeset::new().with(Write::UpdateNotification {
                notification: notification.clone(),
                recipients,
            }))
            .await?;

        info!(notification_id = %id, "Notification updated");
        Ok(notification)
    }

    pub async fn delete(&self, id: Uuid, actor: &Identity) -> Result<(), LifecycleError> {
        actor.require_organizer("eliminar notificaciones")?;
        match self
            .store
            .apply(Changeset::new().with(Write::DeleteNotification(id)))
            .await
        {
            Ok(()) => {
                info!(notification_id = %id, "Notification deleted");
                Ok(())
            }
            Err(StoreError::Missing { .. }) => {
                Err(LifecycleError::NotFound("Notificación no encontrada".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Every notification, newest first. Organizers only.
    pub async fn list_all(&self, actor: &Identity) -> Result<Vec<Notification>, LifecycleError> {
        actor.require_organizer("ver todas las notificaciones")?;
        Ok(self.store.notifications().await?)
    }

    pub async fn inbox(&self, viewer: &Identity) -> Result<Vec<InboxEntry>, LifecycleError> {
        Ok(self.store.inbox(viewer.user_id).await?)
    }

    pub async fn unread_count(&self, viewer: &Identity) -> Result<usize, LifecycleError> {
        let inbox = self.store.inbox(viewer.user_id).await?;
        Ok(inbox.iter().filter(|entry| !entry.is_read).count())
    }

    pub async fn mark_read(&self, notification_id: Uuid, viewer: &Identity) -> Result<(), LifecycleError> {
        let inbox = self.store.inbox(viewer.user_id).await?;
        if !inbox.iter().any(|entry| entry.id == notification_id) {
            return Err(LifecycleError::NotFound("Notificación no encontrada".to_string()));
        }
        self.store
            .apply(Changeset::new().with(Write::MarkRead {
                user_id: viewer.user_id,
                notification_id: Some(notification_id),
                at: self.clock.now(),
            }))
            .await?;
        Ok(())
    }

    pub async fn mark_all_read(&self, viewer: &Identity) -> Result<(), LifecycleError> {
        self.store
            .apply(Changeset::new().with(Write::MarkRead {
                user_id: viewer.user_id,
                notification_id: None,
                at: self.clock.now(),
            }))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::clock::ManualClock;
    use crate::models::{Event, EventStatus, User};
    use crate::store::MemoryStore;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        service: NotificationService,
        organizer: Identity,
        ana: Identity,
        beto: Identity,
        event_id: Uuid,
    }

    fn user(name: &str, is_organizer: bool) -> User {
        User {
            id: Uuid::new_v4(),
            username: name.to_string(),
            email: format!("{name}@example.com"),
            is_organizer,
            created_at: now(),
        }
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(now()));
        let organizer = user("org", true);
        let ana = user("ana", false);
        let beto = user("beto", false);
        let event = Event {
            id: Uuid::new_v4(),
            organizer_id: organizer.id,
            venue_id: None,
            title: "Clase abierta".to_string(),
            description: "Yoga".to_string(),
            scheduled_at: now() + Duration::days(3),
            previous_date: None,
            capacity: 0,
            available_tickets: 0,
            status: EventStatus::Active,
            version: 0,
            created_at: now(),
            updated_at: now(),
        };
        let fixture = Fixture {
            service: NotificationService::new(store.clone(), clock),
            organizer: Identity::organizer(organizer.id),
            ana: Identity::attendee(ana.id),
            beto: Identity::attendee(beto.id),
            event_id: event.id,
            store,
        };
        fixture
            .store
            .apply(
                Changeset::new()
                    .with(Write::InsertUser(organizer))
                    .with(Write::InsertUser(ana))
                    .with(Write::InsertUser(beto))
                    .with(Write::InsertEvent(event)),
            )
            .await
            .unwrap();
        fixture
    }

    fn draft(event_id: Option<Uuid>, audience: Option<Audience>) -> NotificationDraft {
        NotificationDraft {
            title: " Cambio de sala ".to_string(),
            message: "Nos vemos en el aula 2".to_string(),
            event_id,
            audience,
            priority: NotificationPriority::Normal,
        }
    }

    #[tokio::test]
    async fn test_create_requires_fields() {
        let f = fixture().await;
        let mut empty = draft(None, None);
        empty.title.clear();
        empty.message = "   ".to_string();

        let err = f.service.create(empty, &f.organizer).await.unwrap_err();
        let LifecycleError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert_eq!(fields["title"], "El título no puede estar vacío");
        assert_eq!(fields["message"], "El mensaje no puede estar vacío");
        assert_eq!(fields["event"], "El evento no puede ser nulo");
        assert_eq!(fields["users"], "Los usuarios no pueden ser nulos");
    }

    #[tokio::test]
    async fn test_attendees_cannot_send() {
        let f = fixture().await;
        let err = f
            .service
            .create(draft(Some(f.event_id), Some(Audience::All)), &f.ana)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_single_recipient_and_read_state() {
        let f = fixture().await;
        let sent = f
            .service
            .create(
                draft(Some(f.event_id), Some(Audience::User { user_id: f.ana.user_id })),
                &f.organizer,
            )
            .await
            .unwrap();
        assert_eq!(sent.title, "Cambio de sala");

        assert_eq!(f.service.unread_count(&f.ana).await.unwrap(), 1);
        assert!(f.service.inbox(&f.beto).await.unwrap().is_empty());

        f.service.mark_read(sent.id, &f.ana).await.unwrap();
        let inbox = f.service.inbox(&f.ana).await.unwrap();
        assert!(inbox[0].is_read);
        assert_eq!(inbox[0].read_at, Some(now()));
        assert_eq!(f.service.unread_count(&f.ana).await.unwrap(), 0);

        let err = f.service.mark_read(sent.id, &f.beto).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_broadcast_then_mark_all_read() {
        let f = fixture().await;
        for _ in 0..2 {
            f.service
                .create(draft(Some(f.event_id), Some(Audience::All)), &f.organizer)
                .await
                .unwrap();
        }
        assert_eq!(f.service.unread_count(&f.beto).await.unwrap(), 2);
        assert_eq!(f.service.unread_count(&f.organizer).await.unwrap(), 2);

        f.service.mark_all_read(&f.beto).await.unwrap();
        assert_eq!(f.service.unread_count(&f.beto).await.unwrap(), 0);
        assert_eq!(f.service.unread_count(&f.ana).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_keeps_read_state_and_delete_clears_inbox() {
        let f = fixture().await;
        let sent = f
            .service
            .create(draft(Some(f.event_id), Some(Audience::All)), &f.organizer)
            .await
            .unwrap();
        f.service.mark_read(sent.id, &f.ana).await.unwrap();

        let mut revised = draft(Some(f.event_id), Some(Audience::User { user_id: f.ana.user_id }));
        revised.message = "Aula 3".to_string();
        revised.priority = NotificationPriority::High;
        let updated = f.service.update(sent.id, revised, &f.organizer).await.unwrap();
        assert_eq!(updated.message, "Aula 3");
        assert_eq!(updated.created_at, sent.created_at);

        let inbox = f.service.inbox(&f.ana).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert!(inbox[0].is_read);
        assert!(f.service.inbox(&f.beto).await.unwrap().is_empty());

        f.service.delete(sent.id, &f.organizer).await.unwrap();
        assert!(f.service.inbox(&f.ana).await.unwrap().is_empty());
        assert!(f.store.notifications().await.unwrap().is_empty());

        let err = f.service.delete(sent.id, &f.organizer).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));
    }
}

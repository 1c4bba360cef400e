//! Services around the event lifecycle: manual notifications, favorites and ticket types.

pub mod favorites;
pub mod notifications;
pub mod ticket_types;

pub use favorites::{FavoriteEvent, FavoriteService};
pub use notifications::{Audience, NotificationDraft, NotificationService};
pub use ticket_types::{TicketTypeDraft, TicketTypeService};

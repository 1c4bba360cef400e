pub mod event;
pub mod favorite;
pub mod notification;
pub mod ticket;
pub mod user;
pub mod venue;

pub use event::{Event, EventStatus};
pub use favorite::Favorite;
pub use notification::{InboxEntry, Notification, NotificationPriority, UserNotification};
pub use ticket::{Ticket, TicketType};
pub use user::User;
pub use venue::Venue;

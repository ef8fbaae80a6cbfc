pub mod conversation;
pub mod message;
pub mod notification;
pub mod user;

pub use conversation::{Conversation, ConversationSummary};
pub use message::Message;
pub use notification::{Notification, NotificationKind};
pub use user::User;

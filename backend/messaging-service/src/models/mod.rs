pub mod conversation;
pub mod message;
pub mod notification;
pub mod user;

pub use conversation::{
    Conversation, ConversationKind, ConversationSummary, DirectPair, GroupInfo, LastMessage,
};
pub use message::{Attachment, Message, MessageKind};
pub use notification::{ActionData, Notification, NotificationKind};
pub use user::{Role, User};

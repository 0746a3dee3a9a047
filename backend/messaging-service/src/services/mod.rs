pub mod attachment_service;
pub mod conversation_service;
pub mod keyed_lock;
pub mod message_service;
pub mod messaging_service;
pub mod notification_dispatcher;
pub mod notification_service;
pub mod visibility;

pub use attachment_service::{
    human_readable_size, is_previewable, AttachmentService, BlobStore, FileUpload, FsBlobStore,
    InMemoryBlobStore, MAX_ATTACHMENT_BYTES,
};
pub use conversation_service::{ConversationLock, ConversationService};
pub use message_service::MessageService;
pub use messaging_service::{Collaborators, MessagingService};
pub use notification_dispatcher::{
    message_preview, FanOutHandle, FanOutReport, NotificationDispatcher,
};
pub use notification_service::NotificationService;
pub use visibility::VisibilityFilter;

pub mod classifier;
pub mod event;
pub mod mailbox;

pub use classifier::{classify_attachments, Attachment, AttachmentKind, EventClassifier};
pub use event::{Action, ContentRef, EventDescriptor, ShareEvent, ShareKind};
pub use mailbox::{Mailbox, Ticket};

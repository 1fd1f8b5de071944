pub mod extension;
pub mod host;
pub mod record;
pub mod store;
pub mod token;

pub use extension::{ActivationSignal, ExtensionOutcome, ShareExtension, OPEN_MANUALLY_MESSAGE};
pub use host::HandoffReceiver;
pub use record::HandoffRecord;
pub use store::{FileSharedStore, HandoffSlot, MemorySharedStore, SharedStore};
pub use token::{activation_token, decode_token, encode_token};

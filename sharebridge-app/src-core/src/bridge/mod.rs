pub mod commands;
pub mod events;
pub mod models;

pub use commands::HostBridge;
pub use events::{BroadcastPushChannel, PushChannel, SHARE_RECEIVED_EVENT};
pub use models::{PendingShareResponse, ShareReceivedPayload};

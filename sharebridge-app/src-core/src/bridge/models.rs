use serde::{Deserialize, Serialize};

use crate::share::ShareEvent;

/// Response from the getPendingShare command.
///
/// Returned when the UI checks for content that arrived before it was
/// listening.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingShareResponse {
    /// The pending envelope, if any
    pub content: Option<ShareEvent>,
    /// Whether there was pending content
    pub has_pending: bool,
}

impl From<Option<ShareEvent>> for PendingShareResponse {
    fn from(content: Option<ShareEvent>) -> Self {
        Self {
            has_pending: content.is_some(),
            content,
        }
    }
}

/// Payload pushed with the "share-received" event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareReceivedPayload {
    pub event: ShareEvent,
    /// Timestamp when the share was delivered (milliseconds since epoch)
    pub timestamp: i64,
}

impl ShareReceivedPayload {
    pub fn now(event: ShareEvent) -> Self {
        Self {
            event,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

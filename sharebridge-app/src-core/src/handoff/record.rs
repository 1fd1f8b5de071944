use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShareBridgeError};
use crate::share::{ContentRef, ShareEvent, ShareKind};

/// Serialized envelope written by the extension process for the host.
///
/// Written once, read once, deleted on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffRecord {
    #[serde(rename = "type")]
    pub kind: ShareKind,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    /// Milliseconds since epoch when the extension created the record.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HandoffRecord {
    pub fn from_event(event: &ShareEvent) -> Self {
        let file_path = event
            .resolved_path
            .clone()
            .or_else(|| event.reference.as_ref().map(|r| r.to_string()));

        Self {
            kind: event.kind,
            content: event.content.clone(),
            file_path,
            file_name: event.display_name.clone(),
            timestamp: Utc::now().timestamp_millis(),
            error: event.error.clone(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ShareBridgeError::HandoffWriteFailed(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| ShareBridgeError::HandoffDecodeFailed(e.to_string()))
    }
}

impl From<HandoffRecord> for ShareEvent {
    fn from(record: HandoffRecord) -> Self {
        let reference = record
            .file_path
            .as_deref()
            .filter(|_| record.kind.carries_reference())
            .map(ContentRef::from);

        ShareEvent {
            kind: record.kind,
            content: record.content,
            reference,
            display_name: record.file_name,
            resolved_path: record.file_path,
            error: record.error,
        }
    }
}

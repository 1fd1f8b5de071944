use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShareBridgeError {
    /// Every resolver strategy failed for the reference.
    #[error("Content unreadable: {0}")]
    ContentUnreadable(String),

    /// The descriptor matched no classification rule.
    #[error("Invalid event shape: {0}")]
    InvalidEventShape(String),

    #[error("Handoff write failed: {0}")]
    HandoffWriteFailed(String),

    /// A handoff record was present but could not be parsed.
    /// The record is deleted regardless.
    #[error("Handoff decode failed: {0}")]
    HandoffDecodeFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel send error")]
    ChannelSend,

    #[error("Not initialized")]
    NotInitialized,
}

impl serde::Serialize for ShareBridgeError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShareBridgeError>;

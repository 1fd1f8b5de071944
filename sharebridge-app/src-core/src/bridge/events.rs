use tokio::sync::broadcast;
use tracing::debug;

use super::models::ShareReceivedPayload;
use crate::error::{Result, ShareBridgeError};

/// Event name the UI listens on.
pub const SHARE_RECEIVED_EVENT: &str = "share-received";

/// Advisory push path to an attached UI.
pub trait PushChannel: Send + Sync {
    fn push(&self, payload: &ShareReceivedPayload) -> Result<()>;
}

/// Push channel fanning out to in-process subscribers.
///
/// A push with no live subscriber fails, so the envelope stays pollable.
pub struct BroadcastPushChannel {
    tx: broadcast::Sender<ShareReceivedPayload>,
}

impl BroadcastPushChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShareReceivedPayload> {
        self.tx.subscribe()
    }
}

impl PushChannel for BroadcastPushChannel {
    fn push(&self, payload: &ShareReceivedPayload) -> Result<()> {
        let receivers = self
            .tx
            .send(payload.clone())
            .map_err(|_| ShareBridgeError::ChannelSend)?;
        debug!("Emitted {} to {} listeners", SHARE_RECEIVED_EVENT, receivers);
        Ok(())
    }
}

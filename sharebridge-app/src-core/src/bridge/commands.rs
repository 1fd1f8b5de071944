use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::events::PushChannel;
use super::models::{PendingShareResponse, ShareReceivedPayload};
use crate::share::{Mailbox, ShareEvent};

/// The surface visible to the UI: poll, discard and an advisory push.
///
/// The poll path is authoritative. A failed push never loses the envelope.
pub struct HostBridge {
    mailbox: Arc<Mailbox>,
    channel: RwLock<Option<Arc<dyn PushChannel>>>,
}

impl HostBridge {
    pub fn new(mailbox: Arc<Mailbox>) -> Self {
        Self {
            mailbox,
            channel: RwLock::new(None),
        }
    }

    /// Called when the UI starts listening for pushes.
    pub async fn attach(&self, channel: Arc<dyn PushChannel>) {
        *self.channel.write().await = Some(channel);
        info!("UI attached to host bridge");
    }

    pub async fn detach(&self) {
        *self.channel.write().await = None;
        info!("UI detached from host bridge");
    }

    pub async fn is_attached(&self) -> bool {
        self.channel.read().await.is_some()
    }

    /// Store an envelope and try to push it.
    ///
    /// The envelope is taken back out of the mailbox while the push is
    /// attempted, so a concurrent poll and a successful push cannot both
    /// see it. On failure it is restored for the next poll, unless a newer
    /// envelope or a clear happened meanwhile.
    pub async fn deliver(&self, event: ShareEvent) {
        let kind = event.kind;
        let ticket = self.mailbox.set(event).await;

        let Some(channel) = self.channel.read().await.clone() else {
            debug!("No UI attached, {} envelope waits for poll", kind);
            return;
        };

        let Some(event) = self.mailbox.take_ticket(ticket).await else {
            debug!("Envelope already consumed before push");
            return;
        };

        let payload = ShareReceivedPayload::now(event);
        match channel.push(&payload) {
            Ok(()) => info!("Pushed {} envelope to UI", kind),
            Err(e) => {
                warn!("Push failed for {} envelope: {}", kind, e);
                if self.mailbox.restore(ticket, payload.event).await {
                    debug!("Kept {} envelope for poll", kind);
                }
            }
        }
    }

    /// Take the pending envelope. Returns it once, then `None`.
    pub async fn get_shared_content(&self) -> Option<ShareEvent> {
        let event = self.mailbox.take().await;
        if let Some(event) = &event {
            debug!("UI took pending {} envelope", event.kind);
        }
        event
    }

    /// Same as `get_shared_content`, in the pending-share response shape.
    pub async fn get_pending_share(&self) -> PendingShareResponse {
        self.get_shared_content().await.into()
    }

    pub async fn has_pending_content(&self) -> bool {
        !self.mailbox.peek_is_empty().await
    }

    /// Discard the pending envelope without consuming it.
    pub async fn clear_shared_content(&self) {
        self.mailbox.clear().await;
    }
}

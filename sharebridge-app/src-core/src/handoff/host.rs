use tracing::{debug, info, warn};

use super::store::HandoffSlot;
use super::token::decode_token;
use crate::share::ShareEvent;

/// Host-process side of the handoff, run on launch and on every resume.
#[derive(Clone)]
pub struct HandoffReceiver {
    slot: HandoffSlot,
    scheme: String,
}

impl HandoffReceiver {
    pub fn new(slot: HandoffSlot, scheme: impl Into<String>) -> Self {
        Self {
            slot,
            scheme: scheme.into(),
        }
    }

    /// Claim the pending handoff, if any.
    ///
    /// The durable record always wins over the activation token. The token
    /// is only decoded when no record exists, which covers deep links that
    /// never went through the extension.
    pub fn receive(&self, activation: Option<&str>) -> Option<ShareEvent> {
        match self.slot.take() {
            Ok(Some(record)) => {
                info!("Received {} handoff record from extension", record.kind);
                return Some(record.into());
            }
            Ok(None) => debug!("No pending handoff record"),
            // Already deleted by the slot; treat as empty.
            Err(e) => warn!("Discarding handoff record: {}", e),
        }

        let event = decode_token(&self.scheme, activation?)?;
        info!("Decoded {} envelope from activation token", event.kind);
        Some(event)
    }
}

use tokio::sync::Mutex;
use tracing::debug;

use super::event::ShareEvent;

/// Identifies one `set` so a ticketed take cannot remove a newer envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug, Default)]
struct Slot {
    next_ticket: u64,
    pending: Option<(Ticket, ShareEvent)>,
}

/// Single-slot holder for the most recent unconsumed envelope.
///
/// `set` overwrites (last event wins) and `take` reads and clears under the
/// same lock, so a take never observes a half-written envelope.
#[derive(Debug, Default)]
pub struct Mailbox {
    slot: Mutex<Slot>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, event: ShareEvent) -> Ticket {
        let mut slot = self.slot.lock().await;
        slot.next_ticket += 1;
        let ticket = Ticket(slot.next_ticket);
        if let Some((_, previous)) = slot.pending.replace((ticket, event)) {
            debug!("Mailbox overwrote unconsumed {} envelope", previous.kind);
        }
        ticket
    }

    pub async fn take(&self) -> Option<ShareEvent> {
        let mut slot = self.slot.lock().await;
        slot.pending.take().map(|(_, event)| event)
    }

    pub async fn peek_is_empty(&self) -> bool {
        self.slot.lock().await.pending.is_none()
    }

    /// Discard the pending envelope. Outstanding tickets go stale, so an
    /// in-flight push cannot restore what was cleared.
    pub async fn clear(&self) {
        let mut slot = self.slot.lock().await;
        slot.next_ticket += 1;
        slot.pending = None;
    }

    /// Take the envelope stored under `ticket`, if it is still the current one.
    pub async fn take_ticket(&self, ticket: Ticket) -> Option<ShareEvent> {
        let mut slot = self.slot.lock().await;
        match slot.pending {
            Some((current, _)) if current == ticket => slot.pending.take().map(|(_, event)| event),
            _ => None,
        }
    }

    /// Put back an envelope that could not be pushed. Only the most recently
    /// issued ticket can be restored: any `set` or `clear` since then wins.
    pub async fn restore(&self, ticket: Ticket, event: ShareEvent) -> bool {
        let mut slot = self.slot.lock().await;
        if slot.next_ticket != ticket.0 || slot.pending.is_some() {
            debug!("Mailbox dropped stale {} envelope on restore", event.kind);
            return false;
        }
        slot.pending = Some((ticket, event));
        true
    }
}

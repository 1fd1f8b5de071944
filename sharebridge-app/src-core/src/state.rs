use std::sync::Arc;

use tokio::sync::RwLock;

use crate::bridge::HostBridge;
use crate::share::{EventClassifier, Mailbox};
use crate::storage::EngineSettings;

pub struct EngineState {
    pub settings: Arc<RwLock<EngineSettings>>,
    /// Most recent unconsumed envelope, shared with the bridge.
    pub mailbox: Arc<Mailbox>,
    pub bridge: Arc<HostBridge>,
    pub classifier: EventClassifier,
    /// Whether the host is currently in foreground.
    /// Pending handoffs are ingested on each transition back to foreground.
    pub is_foreground: Arc<RwLock<bool>>,
}

impl EngineState {
    pub fn new(settings: EngineSettings) -> Self {
        let mailbox = Arc::new(Mailbox::new());
        Self {
            classifier: EventClassifier::new(settings.web_url_dispatch),
            settings: Arc::new(RwLock::new(settings)),
            bridge: Arc::new(HostBridge::new(mailbox.clone())),
            mailbox,
            is_foreground: Arc::new(RwLock::new(true)), // Assume foreground at start
        }
    }

    /// Record a foreground change, returning whether this was a transition
    /// from background to foreground.
    pub async fn set_foreground(&self, foreground: bool) -> bool {
        let mut current = self.is_foreground.write().await;
        let resumed = foreground && !*current;
        *current = foreground;
        resumed
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

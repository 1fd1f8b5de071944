use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::record::HandoffRecord;
use super::store::HandoffSlot;
use super::token::activation_token;
use crate::content::{FallbackResolver, FileSystemReader};
use crate::error::Result;
use crate::share::{classify_attachments, Attachment, ShareEvent, ShareKind};

pub const OPEN_MANUALLY_MESSAGE: &str = "Content shared. Open the app to view it.";
pub const NOTHING_TO_SHARE_MESSAGE: &str = "No valid content to share.";

/// Launches the host process with an activation token.
pub trait ActivationSignal: Send + Sync {
    fn activate(&self, token: &str) -> Result<()>;
}

/// How the extension's share attempt ended. Every outcome completes the
/// extension; none of them is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionOutcome {
    /// Record written and host activated.
    Delivered(ShareKind),
    /// Record or activation failed; the user has to open the host.
    OpenManually { reason: String },
    NothingToShare,
}

impl ExtensionOutcome {
    /// Message to show before the extension closes, if any.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            ExtensionOutcome::Delivered(_) => None,
            ExtensionOutcome::OpenManually { .. } => Some(OPEN_MANUALLY_MESSAGE),
            ExtensionOutcome::NothingToShare => Some(NOTHING_TO_SHARE_MESSAGE),
        }
    }
}

/// Extension-process side of the handoff.
pub struct ShareExtension {
    slot: HandoffSlot,
    resolver: FallbackResolver,
    scheme: String,
    signal: Arc<dyn ActivationSignal>,
}

impl ShareExtension {
    pub fn new(
        slot: HandoffSlot,
        scheme: impl Into<String>,
        signal: Arc<dyn ActivationSignal>,
    ) -> Self {
        Self {
            slot,
            resolver: FallbackResolver::new(Arc::new(FileSystemReader::new()), Vec::new()),
            scheme: scheme.into(),
            signal,
        }
    }

    /// Use a different resolver for file attachments.
    pub fn with_resolver(mut self, resolver: FallbackResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn process(&self, attachments: &[Attachment]) -> ExtensionOutcome {
        match classify_attachments(attachments) {
            Some(event) => self.process_event(event),
            None => {
                info!("Extension received {} attachments, none usable", attachments.len());
                ExtensionOutcome::NothingToShare
            }
        }
    }

    pub fn process_event(&self, event: ShareEvent) -> ExtensionOutcome {
        // The host may not be able to open our references, so resolve here.
        let event = if event.needs_resolution() {
            self.resolver.resolve_event(event)
        } else {
            event
        };
        if let Some(err) = &event.error {
            warn!("Extension could not read shared {}: {}", event.kind, err);
        }

        let kind = event.kind;
        let record = HandoffRecord::from_event(&event);
        if let Err(e) = self.slot.write(&record) {
            error!("Failed to persist handoff record: {}", e);
            return ExtensionOutcome::OpenManually {
                reason: e.to_string(),
            };
        }

        let token = activation_token(&self.scheme, kind);
        if let Err(e) = self.signal.activate(&token) {
            // The record is written; the host picks it up on its next launch.
            warn!("Failed to activate host: {}", e);
            return ExtensionOutcome::OpenManually {
                reason: e.to_string(),
            };
        }

        debug!("Extension handed off {} envelope", kind);
        ExtensionOutcome::Delivered(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ByteStream, ContentReader, ReadError};
    use crate::error::ShareBridgeError;
    use crate::handoff::store::{FileSharedStore, MemorySharedStore};
    use crate::share::{AttachmentKind, ContentRef};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSignal {
        tokens: Mutex<Vec<String>>,
        fail: bool,
    }

    impl ActivationSignal for RecordingSignal {
        fn activate(&self, token: &str) -> Result<()> {
            if self.fail {
                return Err(ShareBridgeError::ChannelSend);
            }
            self.tokens.lock().unwrap().push(token.to_string());
            Ok(())
        }
    }

    fn setup(signal: Arc<RecordingSignal>) -> (ShareExtension, HandoffSlot) {
        let slot = HandoffSlot::new(Arc::new(MemorySharedStore::new()), "k");
        (ShareExtension::new(slot.clone(), "scheme", signal), slot)
    }

    #[test]
    fn test_url_attachment_handed_off() {
        let signal = Arc::new(RecordingSignal::default());
        let (extension, slot) = setup(signal.clone());

        let outcome = extension.process(&[
            Attachment::new(AttachmentKind::Text, "some words"),
            Attachment::new(AttachmentKind::Url, "https://a.example"),
        ]);

        assert_eq!(outcome, ExtensionOutcome::Delivered(ShareKind::Url));
        assert_eq!(outcome.user_message(), None);
        assert_eq!(signal.tokens.lock().unwrap().as_slice(), ["scheme://share?type=url"]);

        let record = slot.take().unwrap().unwrap();
        assert_eq!(record.content.as_deref(), Some("https://a.example"));
    }

    #[test]
    fn test_file_attachment_resolved_locally() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, "<html>hi</html>").unwrap();

        let signal = Arc::new(RecordingSignal::default());
        let (extension, slot) = setup(signal);
        let outcome = extension.process(&[Attachment::new(
            AttachmentKind::FileUrl,
            path.to_string_lossy(),
        )]);

        assert_eq!(outcome, ExtensionOutcome::Delivered(ShareKind::File));
        let record = slot.take().unwrap().unwrap();
        assert_eq!(record.kind, ShareKind::File);
        assert_eq!(record.content.as_deref(), Some("<html>hi</html>"));
        assert_eq!(record.file_name.as_deref(), Some("page.html"));
    }

    struct ProviderReader;

    impl ContentReader for ProviderReader {
        fn open_stream(
            &self,
            _reference: &ContentRef,
        ) -> std::result::Result<ByteStream, ReadError> {
            Ok(Box::new(std::io::Cursor::new(b"<p>from provider</p>".to_vec())))
        }

        fn query_display_name(
            &self,
            _reference: &ContentRef,
        ) -> std::result::Result<Option<String>, ReadError> {
            Ok(Some("notes.html".to_string()))
        }
    }

    #[test]
    fn test_custom_resolver_reads_references() {
        let signal = Arc::new(RecordingSignal::default());
        let (extension, slot) = setup(signal);
        let extension =
            extension.with_resolver(FallbackResolver::new(Arc::new(ProviderReader), Vec::new()));

        let outcome = extension.process_event(ShareEvent::file(ContentRef::new("content://p/1")));
        assert_eq!(outcome, ExtensionOutcome::Delivered(ShareKind::File));

        let record = slot.take().unwrap().unwrap();
        assert_eq!(record.content.as_deref(), Some("<p>from provider</p>"));
        assert_eq!(record.file_name.as_deref(), Some("notes.html"));
        assert!(record.error.is_none());
    }

    #[test]
    fn test_unreadable_file_still_handed_off_degraded() {
        let signal = Arc::new(RecordingSignal::default());
        let (extension, slot) = setup(signal);
        let outcome = extension.process(&[Attachment::new(
            AttachmentKind::FileUrl,
            "/definitely/not/here.html",
        )]);

        assert_eq!(outcome, ExtensionOutcome::Delivered(ShareKind::File));
        let record = slot.take().unwrap().unwrap();
        assert!(record.content.is_none());
        assert!(record.error.is_some());
    }

    #[test]
    fn test_nothing_to_share() {
        let signal = Arc::new(RecordingSignal::default());
        let (extension, slot) = setup(signal.clone());

        let outcome = extension.process(&[Attachment::new(AttachmentKind::Text, "   ")]);
        assert_eq!(outcome, ExtensionOutcome::NothingToShare);
        assert_eq!(outcome.user_message(), Some(NOTHING_TO_SHARE_MESSAGE));
        assert!(signal.tokens.lock().unwrap().is_empty());
        assert_eq!(slot.take().unwrap(), None);
    }

    #[test]
    fn test_write_failure_completes_with_fallback_message() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();

        let signal = Arc::new(RecordingSignal::default());
        let slot = HandoffSlot::new(Arc::new(FileSharedStore::new(&blocker)), "k");
        let extension = ShareExtension::new(slot, "scheme", signal.clone());

        let outcome = extension.process_event(ShareEvent::text("hello"));
        assert!(matches!(outcome, ExtensionOutcome::OpenManually { .. }));
        assert_eq!(outcome.user_message(), Some(OPEN_MANUALLY_MESSAGE));
        assert!(signal.tokens.lock().unwrap().is_empty());
    }

    #[test]
    fn test_activation_failure_keeps_record() {
        let signal = Arc::new(RecordingSignal {
            fail: true,
            ..Default::default()
        });
        let (extension, slot) = setup(signal);

        let outcome = extension.process_event(ShareEvent::text("hello"));
        assert!(matches!(outcome, ExtensionOutcome::OpenManually { .. }));
        assert_eq!(slot.take().unwrap().unwrap().content.as_deref(), Some("hello"));
    }
}

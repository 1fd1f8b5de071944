pub mod bridge;
pub mod content;
pub mod error;
pub mod handoff;
pub mod share;
pub mod state;
pub mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bridge::HostBridge;
use content::{ContentReader, FallbackResolver, FileSystemReader};
use error::{Result, ShareBridgeError};
use handoff::{
    ActivationSignal, FileSharedStore, HandoffReceiver, HandoffSlot, ShareExtension, SharedStore,
};
use share::{Action, Attachment, EventDescriptor, ShareEvent};
use state::EngineState;
use storage::{default_data_dir, init_data_dir, load_settings, EngineSettings};

/// Install the global subscriber. `RUST_LOG` overrides the configured filter.
/// Later calls are no-ops.
pub fn init_tracing(settings: &EngineSettings) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.log_filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Host process lifecycle transitions reported by the platform layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Cold start, optionally with the token the host was launched with.
    Launched { activation: Option<String> },
    /// Warm return to foreground.
    Resumed { activation: Option<String> },
    Backgrounded,
}

/// How an envelope entered the engine. Files opened with the app get
/// default naming that shared files do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Shared,
    Viewed,
}

enum Job {
    Deliver(ShareEvent, Origin),
    Flush(oneshot::Sender<()>),
}

/// Wires the classifier, resolver, handoff receiver and host bridge together.
///
/// Envelopes are resolved one at a time on a single worker, in arrival order.
pub struct ShareEngine {
    state: Arc<EngineState>,
    receiver: HandoffReceiver,
    jobs: mpsc::Sender<Job>,
}

impl ShareEngine {
    /// Start the engine on the current Tokio runtime.
    pub fn start(
        settings: EngineSettings,
        reader: Arc<dyn ContentReader>,
        store: Arc<dyn SharedStore>,
    ) -> Result<Self> {
        settings.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ShareBridgeError::NotInitialized)?;

        let resolver = Arc::new(
            FallbackResolver::new(reader, settings.persistent_grant_providers.clone())
                .with_image_content(settings.resolve_image_content),
        );
        let receiver = HandoffReceiver::new(
            HandoffSlot::new(store, settings.handoff_key.clone()),
            settings.activation_scheme.clone(),
        );
        let (jobs, jobs_rx) = mpsc::channel::<Job>(settings.queue_capacity);
        let state = Arc::new(EngineState::new(settings));

        runtime.spawn(resolution_worker(jobs_rx, resolver, state.bridge.clone()));
        info!("Share engine started");

        Ok(Self {
            state,
            receiver,
            jobs,
        })
    }

    pub fn bridge(&self) -> &HostBridge {
        &self.state.bridge
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Classify an inbound platform event and queue it for delivery.
    /// Events that are not share attempts are absorbed.
    pub async fn handle_platform_event(&self, descriptor: &EventDescriptor) -> Result<()> {
        let origin = match descriptor.action {
            Action::View => Origin::Viewed,
            Action::Send | Action::Other => Origin::Shared,
        };
        match self.state.classifier.try_classify(descriptor) {
            Ok(Some(event)) => self.submit(event, origin).await,
            Ok(None) => Ok(()),
            Err(ShareBridgeError::InvalidEventShape(reason)) => {
                debug!("Ignoring platform event: {}", reason);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn handle_lifecycle(&self, event: LifecycleEvent) -> Result<()> {
        match event {
            LifecycleEvent::Launched { activation } => {
                self.state.set_foreground(true).await;
                self.ingest_handoff(activation).await
            }
            LifecycleEvent::Resumed { activation } => {
                // A warm resume must read the handoff too, or shares made
                // while backgrounded wait until the next cold start.
                if self.state.set_foreground(true).await {
                    info!("App resumed to foreground");
                }
                self.ingest_handoff(activation).await
            }
            LifecycleEvent::Backgrounded => {
                self.state.set_foreground(false).await;
                debug!("App moved to background");
                Ok(())
            }
        }
    }

    /// Wait until every envelope queued so far has reached the mailbox.
    pub async fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.jobs
            .send(Job::Flush(done_tx))
            .await
            .map_err(|_| ShareBridgeError::ChannelSend)?;
        done_rx.await.map_err(|_| ShareBridgeError::ChannelSend)
    }

    async fn ingest_handoff(&self, activation: Option<String>) -> Result<()> {
        let receiver = self.receiver.clone();
        let received = tokio::task::spawn_blocking(move || receiver.receive(activation.as_deref()))
            .await
            .map_err(|e| ShareBridgeError::Storage(format!("Handoff read task failed: {}", e)))?;

        match received {
            Some(event) => self.submit(event, Origin::Shared).await,
            None => Ok(()),
        }
    }

    async fn submit(&self, event: ShareEvent, origin: Origin) -> Result<()> {
        debug!("Queueing {} envelope", event.kind);
        self.jobs
            .send(Job::Deliver(event, origin))
            .await
            .map_err(|_| ShareBridgeError::ChannelSend)
    }
}

async fn resolution_worker(
    mut jobs: mpsc::Receiver<Job>,
    resolver: Arc<FallbackResolver>,
    bridge: Arc<HostBridge>,
) {
    while let Some(job) = jobs.recv().await {
        match job {
            Job::Deliver(event, origin) => {
                let event = if event.reference.is_some() {
                    resolve_off_thread(&resolver, event, origin).await
                } else {
                    event
                };
                bridge.deliver(event).await;
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Resolution worker stopped");
}

/// Stream reads may block, so resolution runs on the blocking pool.
async fn resolve_off_thread(
    resolver: &Arc<FallbackResolver>,
    event: ShareEvent,
    origin: Origin,
) -> ShareEvent {
    let resolver = resolver.clone();
    let mut fallback = event.clone();
    let task = tokio::task::spawn_blocking(move || match origin {
        Origin::Viewed => resolver.resolve_viewed(event),
        Origin::Shared => resolver.resolve_event(event),
    });
    match task.await {
        Ok(event) => event,
        Err(e) => {
            error!("Resolution task failed: {}", e);
            let reference = fallback.reference.as_ref().map(|r| r.to_string()).unwrap_or_default();
            fallback.degrade(ShareBridgeError::ContentUnreadable(reference).to_string());
            fallback
        }
    }
}

/// One line of input to the stdio host.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HostInput {
    Activation { activation: String },
    Attachments { attachments: Vec<Attachment> },
    Descriptor(EventDescriptor),
}

/// Activation signal for the stdio host, which plays both processes.
struct ChannelSignal {
    tx: mpsc::UnboundedSender<String>,
}

impl ActivationSignal for ChannelSignal {
    fn activate(&self, token: &str) -> Result<()> {
        self.tx
            .send(token.to_string())
            .map_err(|_| ShareBridgeError::ChannelSend)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Defaults to the platform data directory.
    pub data_dir: Option<PathBuf>,
    /// Token the host was launched with.
    pub activation: Option<String>,
}

/// Run the stdio host: newline-delimited JSON in, consumed envelopes out.
pub fn run(options: RunOptions) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;
    runtime.block_on(run_stdio(options))
}

async fn run_stdio(options: RunOptions) -> anyhow::Result<()> {
    let data_dir = match options.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    let data_dir = init_data_dir(data_dir)?;

    let (settings, load_error) = match load_settings() {
        Ok(settings) => (settings, None),
        Err(e) => (EngineSettings::default(), Some(e)),
    };
    init_tracing(&settings);
    if let Some(e) = load_error {
        warn!("Failed to load settings, using defaults: {}", e);
    }
    info!("Starting ShareBridge, data dir {}", data_dir.display());

    let store: Arc<dyn SharedStore> =
        Arc::new(FileSharedStore::new(settings.shared_store_dir_in(&data_dir)));
    let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
    let extension = Arc::new(ShareExtension::new(
        HandoffSlot::new(store.clone(), settings.handoff_key.clone()),
        settings.activation_scheme.clone(),
        Arc::new(ChannelSignal { tx: signal_tx }),
    ));

    let engine = ShareEngine::start(settings, Arc::new(FileSystemReader::new()), store)?;
    engine
        .handle_lifecycle(LifecycleEvent::Launched {
            activation: options.activation,
        })
        .await?;
    emit_pending(&engine).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        handle_input(&engine, &extension, &mut signal_rx, line).await?;
        emit_pending(&engine).await?;
    }

    info!("Input closed, shutting down");
    Ok(())
}

/// Apply one line of host input. Attachments play the extension side and
/// then resume the engine with whatever token the extension signalled.
async fn handle_input(
    engine: &ShareEngine,
    extension: &Arc<ShareExtension>,
    signals: &mut mpsc::UnboundedReceiver<String>,
    line: &str,
) -> anyhow::Result<()> {
    match serde_json::from_str::<HostInput>(line) {
        Ok(HostInput::Descriptor(descriptor)) => engine.handle_platform_event(&descriptor).await?,
        Ok(HostInput::Activation { activation }) => {
            engine
                .handle_lifecycle(LifecycleEvent::Resumed {
                    activation: Some(activation),
                })
                .await?
        }
        Ok(HostInput::Attachments { attachments }) => {
            let ext = extension.clone();
            let outcome = tokio::task::spawn_blocking(move || ext.process(&attachments)).await?;
            if let Some(message) = outcome.user_message() {
                info!("{}", message);
            }
            while let Ok(token) = signals.try_recv() {
                engine
                    .handle_lifecycle(LifecycleEvent::Resumed {
                        activation: Some(token),
                    })
                    .await?;
            }
        }
        Err(e) => warn!("Skipping unrecognised input line: {}", e),
    }
    Ok(())
}

async fn emit_pending(engine: &ShareEngine) -> anyhow::Result<()> {
    engine.flush().await?;
    if let Some(event) = engine.bridge().get_shared_content().await {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BroadcastPushChannel;
    use crate::content::{ByteStream, ReadError, DEFAULT_FILE_NAME};
    use crate::handoff::{HandoffRecord, MemorySharedStore};
    use crate::share::{ContentRef, ShareKind};
    use crate::storage::WebUrlDispatch;
    use std::io::Cursor;

    /// Reader whose direct read fails and which exposes an HTML export.
    struct VirtualDocReader;

    impl ContentReader for VirtualDocReader {
        fn open_stream(
            &self,
            reference: &ContentRef,
        ) -> std::result::Result<ByteStream, ReadError> {
            Err(ReadError::NotFound(reference.to_string()))
        }

        fn is_virtual(&self, _reference: &ContentRef) -> std::result::Result<bool, ReadError> {
            Ok(true)
        }

        fn export_types(
            &self,
            _reference: &ContentRef,
            _filter: &str,
        ) -> std::result::Result<Vec<String>, ReadError> {
            Ok(vec!["text/html".to_string()])
        }

        fn open_export(
            &self,
            _reference: &ContentRef,
            _mime_type: &str,
        ) -> std::result::Result<ByteStream, ReadError> {
            Ok(Box::new(Cursor::new(b"<h1>doc</h1>".to_vec())))
        }
    }

    struct UnreadableReader;

    impl ContentReader for UnreadableReader {
        fn open_stream(
            &self,
            reference: &ContentRef,
        ) -> std::result::Result<ByteStream, ReadError> {
            Err(ReadError::PermissionDenied(reference.to_string()))
        }
    }

    fn engine_with(
        settings: EngineSettings,
        reader: Arc<dyn ContentReader>,
    ) -> (ShareEngine, Arc<MemorySharedStore>) {
        let store = Arc::new(MemorySharedStore::new());
        let engine = ShareEngine::start(settings, reader, store.clone()).unwrap();
        (engine, store)
    }

    fn engine() -> (ShareEngine, Arc<MemorySharedStore>) {
        engine_with(EngineSettings::default(), Arc::new(FileSystemReader::new()))
    }

    #[tokio::test]
    async fn test_plain_text_send_delivered() {
        let (engine, _) = engine();
        engine
            .handle_platform_event(&EventDescriptor::send(Some("text/plain")).with_text("hello"))
            .await
            .unwrap();
        engine.flush().await.unwrap();

        assert_eq!(engine.bridge().get_shared_content().await, Some(ShareEvent::text("hello")));
        assert_eq!(engine.bridge().get_shared_content().await, None);
    }

    #[tokio::test]
    async fn test_web_url_view_suppressed() {
        let (engine, _) = engine();
        engine
            .handle_platform_event(&EventDescriptor::view("https://example.com"))
            .await
            .unwrap();
        engine.flush().await.unwrap();
        assert!(!engine.bridge().has_pending_content().await);
    }

    #[tokio::test]
    async fn test_web_url_view_delivered_when_engine_dispatches() {
        let settings = EngineSettings {
            web_url_dispatch: WebUrlDispatch::Engine,
            ..Default::default()
        };
        let (engine, _) = engine_with(settings, Arc::new(FileSystemReader::new()));
        engine
            .handle_platform_event(&EventDescriptor::view("https://example.com"))
            .await
            .unwrap();
        engine.flush().await.unwrap();

        assert_eq!(
            engine.bridge().get_shared_content().await,
            Some(ShareEvent::url("https://example.com"))
        );
    }

    #[tokio::test]
    async fn test_unmatched_descriptor_absorbed() {
        let (engine, _) = engine();
        engine
            .handle_platform_event(&EventDescriptor::send(Some("text/plain")))
            .await
            .unwrap();
        engine.flush().await.unwrap();
        assert!(!engine.bridge().has_pending_content().await);
    }

    #[tokio::test]
    async fn test_virtual_document_view_resolved_via_export() {
        let (engine, _) = engine_with(EngineSettings::default(), Arc::new(VirtualDocReader));
        engine
            .handle_platform_event(&EventDescriptor::view("content://provider/doc/42"))
            .await
            .unwrap();
        engine.flush().await.unwrap();

        let event = engine.bridge().get_shared_content().await.unwrap();
        assert_eq!(event.kind, ShareKind::File);
        assert_eq!(event.content.as_deref(), Some("<h1>doc</h1>"));
        assert_eq!(event.display_name.as_deref(), Some("42"));
        assert_eq!(event.resolved_path.as_deref(), Some("content://provider/doc/42"));
    }

    #[tokio::test]
    async fn test_nameless_view_reference_gets_default_name() {
        let (engine, _) = engine_with(EngineSettings::default(), Arc::new(UnreadableReader));
        engine
            .handle_platform_event(&EventDescriptor::view("content:///"))
            .await
            .unwrap();
        engine.flush().await.unwrap();

        let event = engine.bridge().get_shared_content().await.unwrap();
        assert!(event.error.is_some());
        assert_eq!(event.display_name.as_deref(), Some(DEFAULT_FILE_NAME));
        assert_eq!(event.resolved_path.as_deref(), Some("content:///"));
    }

    #[tokio::test]
    async fn test_nameless_shared_reference_keeps_no_name() {
        let (engine, _) = engine_with(EngineSettings::default(), Arc::new(UnreadableReader));
        engine
            .handle_platform_event(
                &EventDescriptor::send(Some("text/html")).with_stream("content:///"),
            )
            .await
            .unwrap();
        engine.flush().await.unwrap();

        let event = engine.bridge().get_shared_content().await.unwrap();
        assert!(event.error.is_some());
        assert_eq!(event.display_name, None);
        assert_eq!(event.resolved_path, None);
    }

    #[tokio::test]
    async fn test_unreadable_stream_still_delivered() {
        let (engine, _) = engine();
        engine
            .handle_platform_event(
                &EventDescriptor::send(Some("text/html")).with_stream("content://gone/1"),
            )
            .await
            .unwrap();
        engine.flush().await.unwrap();

        let event = engine.bridge().get_shared_content().await.unwrap();
        assert_eq!(event.kind, ShareKind::File);
        assert!(event.content.is_none());
        assert!(event.error.is_some());
    }

    #[tokio::test]
    async fn test_resume_ingests_handoff_record() {
        let (engine, store) = engine();
        let slot = HandoffSlot::new(store, "sharebridge.pending_share");
        slot.write(&HandoffRecord::from_event(&ShareEvent::url("https://a.example")))
            .unwrap();

        engine.handle_lifecycle(LifecycleEvent::Backgrounded).await.unwrap();
        engine
            .handle_lifecycle(LifecycleEvent::Resumed {
                activation: Some("sharebridge://share?type=url".into()),
            })
            .await
            .unwrap();
        engine.flush().await.unwrap();

        assert_eq!(
            engine.bridge().get_shared_content().await,
            Some(ShareEvent::url("https://a.example"))
        );

        // Record was read once.
        engine
            .handle_lifecycle(LifecycleEvent::Resumed { activation: None })
            .await
            .unwrap();
        engine.flush().await.unwrap();
        assert_eq!(engine.bridge().get_shared_content().await, None);
    }

    #[tokio::test]
    async fn test_launch_with_deep_link_token() {
        let (engine, _) = engine();
        engine
            .handle_lifecycle(LifecycleEvent::Launched {
                activation: Some(
                    "sharebridge://share?type=url&content=https%3A%2F%2Fa.example%2Fx".into(),
                ),
            })
            .await
            .unwrap();
        engine.flush().await.unwrap();

        assert_eq!(
            engine.bridge().get_shared_content().await,
            Some(ShareEvent::url("https://a.example/x"))
        );
    }

    #[tokio::test]
    async fn test_push_to_attached_listener() {
        let (engine, _) = engine();
        let channel = Arc::new(BroadcastPushChannel::new(4));
        let mut rx = channel.subscribe();
        engine.bridge().attach(channel).await;

        engine
            .handle_platform_event(&EventDescriptor::send(None).with_text("pushed"))
            .await
            .unwrap();
        engine.flush().await.unwrap();

        assert_eq!(rx.recv().await.unwrap().event, ShareEvent::text("pushed"));
        assert_eq!(engine.bridge().get_shared_content().await, None);
    }

    #[tokio::test]
    async fn test_last_event_wins_before_poll() {
        let (engine, _) = engine();
        for text in ["e1", "e2"] {
            engine
                .handle_platform_event(&EventDescriptor::send(Some("text/plain")).with_text(text))
                .await
                .unwrap();
        }
        engine.flush().await.unwrap();
        assert_eq!(engine.bridge().get_shared_content().await, Some(ShareEvent::text("e2")));
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let result = ShareEngine::start(
            EngineSettings::default(),
            Arc::new(FileSystemReader::new()),
            Arc::new(MemorySharedStore::new()),
        );
        assert!(matches!(result, Err(ShareBridgeError::NotInitialized)));
    }

    fn stdio_host() -> (ShareEngine, Arc<ShareExtension>, mpsc::UnboundedReceiver<String>) {
        let settings = EngineSettings::default();
        let store = Arc::new(MemorySharedStore::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let extension = Arc::new(ShareExtension::new(
            HandoffSlot::new(store.clone(), settings.handoff_key.clone()),
            settings.activation_scheme.clone(),
            Arc::new(ChannelSignal { tx }),
        ));
        let reader = Arc::new(FileSystemReader::new());
        let engine = ShareEngine::start(settings, reader, store).unwrap();
        (engine, extension, rx)
    }

    #[tokio::test]
    async fn test_attachments_line_round_trips_through_handoff() {
        let (engine, extension, mut signals) = stdio_host();
        let line = concat!(
            r#"{"attachments":[{"kind":"text","value":"words"},"#,
            r#"{"kind":"url","value":"https://a.example"}]}"#,
        );

        handle_input(&engine, &extension, &mut signals, line).await.unwrap();
        engine.flush().await.unwrap();

        assert!(signals.try_recv().is_err());
        assert_eq!(
            engine.bridge().get_shared_content().await,
            Some(ShareEvent::url("https://a.example"))
        );

        // The record was consumed by the resume.
        engine
            .handle_lifecycle(LifecycleEvent::Resumed { activation: None })
            .await
            .unwrap();
        engine.flush().await.unwrap();
        assert_eq!(engine.bridge().get_shared_content().await, None);
    }

    #[tokio::test]
    async fn test_unusable_attachments_line_delivers_nothing() {
        let (engine, extension, mut signals) = stdio_host();
        let line = r#"{"attachments":[{"kind":"text","value":"  "}]}"#;

        handle_input(&engine, &extension, &mut signals, line).await.unwrap();
        engine.flush().await.unwrap();
        assert!(!engine.bridge().has_pending_content().await);
    }

    #[tokio::test]
    async fn test_descriptor_and_garbage_lines() {
        let (engine, extension, mut signals) = stdio_host();

        handle_input(&engine, &extension, &mut signals, "not json").await.unwrap();
        handle_input(
            &engine,
            &extension,
            &mut signals,
            r#"{"action":"send","mimeType":"text/plain","textExtra":"hi"}"#,
        )
        .await
        .unwrap();
        engine.flush().await.unwrap();

        assert_eq!(engine.bridge().get_shared_content().await, Some(ShareEvent::text("hi")));
    }

    #[test]
    fn test_host_input_shapes() {
        let input: HostInput =
            serde_json::from_str(r#"{"activation":"sharebridge://share?type=url"}"#).unwrap();
        assert!(matches!(input, HostInput::Activation { .. }));

        let input: HostInput =
            serde_json::from_str(r#"{"attachments":[{"kind":"url","value":"https://a.example"}]}"#)
                .unwrap();
        assert!(matches!(input, HostInput::Attachments { .. }));

        let input: HostInput =
            serde_json::from_str(r#"{"action":"send","mimeType":"text/plain","textExtra":"hi"}"#)
                .unwrap();
        assert!(matches!(input, HostInput::Descriptor(_)));
    }
}

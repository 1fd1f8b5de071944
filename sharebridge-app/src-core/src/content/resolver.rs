//! Fallback resolution of content references.
//!
//! A reference is resolved by walking an ordered chain of strategies, each
//! with the same signature. The first strategy that yields text wins and the
//! rest are never invoked. Strategies run sequentially on the calling thread:
//! later ones only make sense after earlier ones failed, and the permission
//! retry has side effects that must not race.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::encoding::decode_text;
use super::name::{resolve_display_name, resolve_local_path, DEFAULT_FILE_NAME};
use super::reader::{read_all, ContentReader, ReadError};
use crate::error::{Result, ShareBridgeError};
use crate::share::{ContentRef, ShareEvent, ShareKind};

/// Filter used when asking a provider which export types it offers.
const EXPORT_TYPE_FILTER: &str = "*/*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Open a stream (or descriptor) and read it fully.
    DirectRead,
    /// Export a virtual document to a text representation.
    VirtualExport,
    /// Acquire a persistent grant, then read directly once more.
    PermissionRetry,
    /// Read the provider's backing file straight from the filesystem.
    LocalPathCopy,
}

pub const DEFAULT_CHAIN: [Strategy; 4] = [
    Strategy::DirectRead,
    Strategy::VirtualExport,
    Strategy::PermissionRetry,
    Strategy::LocalPathCopy,
];

type ReadResult = std::result::Result<String, ReadError>;
type StrategyFn = fn(&FallbackResolver, &ContentRef) -> ReadResult;

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::DirectRead => "direct-read",
            Strategy::VirtualExport => "virtual-export",
            Strategy::PermissionRetry => "permission-retry",
            Strategy::LocalPathCopy => "local-path-copy",
        }
    }

    fn func(&self) -> StrategyFn {
        match self {
            Strategy::DirectRead => direct_read,
            Strategy::VirtualExport => virtual_export,
            Strategy::PermissionRetry => permission_retry,
            Strategy::LocalPathCopy => local_path_copy,
        }
    }
}

/// Text obtained for a reference and the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub text: String,
    pub strategy: Strategy,
}

pub struct FallbackResolver {
    reader: Arc<dyn ContentReader>,
    grant_providers: Vec<String>,
    chain: Vec<Strategy>,
    resolve_image_content: bool,
}

impl FallbackResolver {
    pub fn new(reader: Arc<dyn ContentReader>, grant_providers: Vec<String>) -> Self {
        Self {
            reader,
            grant_providers,
            chain: DEFAULT_CHAIN.to_vec(),
            resolve_image_content: false,
        }
    }

    pub fn with_chain(mut self, chain: Vec<Strategy>) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_image_content(mut self, enabled: bool) -> Self {
        self.resolve_image_content = enabled;
        self
    }

    pub fn reader(&self) -> &dyn ContentReader {
        self.reader.as_ref()
    }

    fn requires_grant(&self, reference: &ContentRef) -> bool {
        self.grant_providers
            .iter()
            .any(|provider| reference.as_str().contains(provider.as_str()))
    }

    /// Resolve a reference to text, or `ContentUnreadable` once every
    /// strategy has failed.
    pub fn resolve(&self, reference: &ContentRef) -> Result<Resolved> {
        let mut failures = Vec::with_capacity(self.chain.len());

        for strategy in &self.chain {
            match (strategy.func())(self, reference) {
                Ok(text) => {
                    info!(
                        "Resolved {} via {} ({} chars)",
                        reference,
                        strategy.name(),
                        text.len()
                    );
                    return Ok(Resolved {
                        text,
                        strategy: *strategy,
                    });
                }
                Err(e) => {
                    debug!("Strategy {} failed for {}: {}", strategy.name(), reference, e);
                    failures.push(format!("{}: {}", strategy.name(), e));
                }
            }
        }

        warn!("All strategies exhausted for {}", reference);
        Err(ShareBridgeError::ContentUnreadable(format!(
            "{} [{}]",
            reference,
            failures.join("; ")
        )))
    }

    /// Enrich an envelope that carries a reference: name, local path and,
    /// for files, content. Resolution failure degrades the envelope instead
    /// of dropping it.
    pub fn resolve_event(&self, mut event: ShareEvent) -> ShareEvent {
        let Some(reference) = event.reference.clone() else {
            return event;
        };

        if event.display_name.is_none() {
            event.display_name = resolve_display_name(self.reader(), &reference);
        }
        if event.resolved_path.is_none() {
            event.resolved_path = resolve_local_path(self.reader(), &reference);
        }

        let wants_content = match event.kind {
            ShareKind::File => true,
            ShareKind::Image => self.resolve_image_content,
            ShareKind::Url | ShareKind::Text => false,
        };
        if wants_content && event.needs_resolution() {
            match self.resolve(&reference) {
                Ok(resolved) => event.content = Some(resolved.text),
                Err(e) => event.degrade(e.to_string()),
            }
        }
        event
    }

    /// `resolve_event` for a file the user opened with the app. A content
    /// reference the provider cannot name or locate still gets a default
    /// file name, and the reference itself stands in for the path.
    pub fn resolve_viewed(&self, event: ShareEvent) -> ShareEvent {
        let mut event = self.resolve_event(event);
        if event.kind != ShareKind::File {
            return event;
        }
        let Some(reference) = event
            .reference
            .clone()
            .filter(ContentRef::is_content_reference)
        else {
            return event;
        };

        if event.display_name.is_none() {
            event.display_name = Some(DEFAULT_FILE_NAME.to_string());
        }
        if event.resolved_path.is_none() {
            event.resolved_path = Some(reference.to_string());
        }
        event
    }
}

fn direct_read(resolver: &FallbackResolver, reference: &ContentRef) -> ReadResult {
    let reader = resolver.reader();
    let stream = match reader.open_stream(reference) {
        Ok(stream) => stream,
        Err(e) => {
            debug!("Stream open failed for {}, trying descriptor: {}", reference, e);
            reader.open_descriptor(reference)?
        }
    };
    let bytes = read_all(stream)?;
    debug!("Read {} bytes from {}", bytes.len(), reference);
    Ok(decode_text(bytes))
}

/// Prefer HTML, then plain text, then the first text-like type offered.
pub fn pick_export_type(types: &[String]) -> Option<&str> {
    ["text/html", "text/plain"]
        .into_iter()
        .find(|wanted| types.iter().any(|t| t.eq_ignore_ascii_case(wanted)))
        .or_else(|| {
            types
                .iter()
                .map(String::as_str)
                .find(|t| t.to_ascii_lowercase().starts_with("text/"))
        })
}

fn virtual_export(resolver: &FallbackResolver, reference: &ContentRef) -> ReadResult {
    let reader = resolver.reader();
    if !reader.is_virtual(reference)? {
        return Err(ReadError::Unsupported("not a virtual document".into()));
    }

    let types = reader.export_types(reference, EXPORT_TYPE_FILTER)?;
    let target = pick_export_type(&types)
        .ok_or_else(|| ReadError::Unsupported(format!("no text export among {:?}", types)))?;

    debug!("Exporting virtual document {} as {}", reference, target);
    let bytes = read_all(reader.open_export(reference, target)?)?;
    Ok(decode_text(bytes))
}

fn permission_retry(resolver: &FallbackResolver, reference: &ContentRef) -> ReadResult {
    if !resolver.requires_grant(reference) {
        return Err(ReadError::Unsupported("provider does not use persistent grants".into()));
    }

    match resolver.reader().acquire_persistent_grant(reference) {
        Ok(()) => debug!("Obtained persistent grant for {}", reference),
        Err(e) => debug!("Persistent grant denied for {}: {}", reference, e),
    }
    direct_read(resolver, reference)
}

fn local_path_copy(resolver: &FallbackResolver, reference: &ContentRef) -> ReadResult {
    let path = resolver
        .reader()
        .query_local_path(reference)?
        .ok_or_else(|| ReadError::Unsupported("no local path".into()))?;

    let bytes = std::fs::read(&path).map_err(|e| ReadError::from_io(e, reference))?;
    debug!("Copied {} bytes from {}", bytes.len(), path.display());
    Ok(decode_text(bytes))
}

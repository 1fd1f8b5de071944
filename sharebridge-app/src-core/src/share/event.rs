use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheme used by platform content providers for stream-backed references.
pub const CONTENT_SCHEME: &str = "content";

/// The four kinds of shared content. Platform-specific hints map onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareKind {
    Url,
    Text,
    File,
    Image,
}

impl ShareKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareKind::Url => "url",
            ShareKind::Text => "text",
            ShareKind::File => "file",
            ShareKind::Image => "image",
        }
    }

    /// Parse a wire `type` value. Unknown values yield `None`.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "url" => Some(ShareKind::Url),
            "text" => Some(ShareKind::Text),
            "file" => Some(ShareKind::File),
            "image" => Some(ShareKind::Image),
            _ => None,
        }
    }

    /// Kinds whose payload lives behind a reference and may need resolving.
    pub fn carries_reference(&self) -> bool {
        matches!(self, ShareKind::File | ShareKind::Image)
    }
}

impl fmt::Display for ShareKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque, platform-defined content locator (`content://…`, `file://…`, a path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentRef(String);

impl ContentRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// URI scheme, if the reference has one. Bare paths have none.
    pub fn scheme(&self) -> Option<&str> {
        let (scheme, _) = self.0.split_once(':')?;
        let valid = !scheme.is_empty()
            && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        // Single letters are Windows drive prefixes, not schemes.
        if valid && scheme.len() > 1 {
            Some(scheme)
        } else {
            None
        }
    }

    pub fn is_content_reference(&self) -> bool {
        self.scheme()
            .is_some_and(|s| s.eq_ignore_ascii_case(CONTENT_SCHEME))
    }

    /// Provider authority of a hierarchical URI (`content://<authority>/…`).
    pub fn authority(&self) -> Option<&str> {
        let rest = self.0.split_once("://")?.1;
        let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let authority = &rest[..end];
        (!authority.is_empty()).then_some(authority)
    }

    /// Last non-empty path segment, percent-decoded when possible.
    pub fn last_path_segment(&self) -> Option<String> {
        let without_scheme = match self.0.split_once("://") {
            Some((_, rest)) => rest,
            None => self.0.as_str(),
        };
        let path_end = without_scheme
            .find(['?', '#'])
            .unwrap_or(without_scheme.len());
        let segment = without_scheme[..path_end]
            .split(['/', '\\'])
            .filter(|s| !s.is_empty())
            .last()?;

        let decoded = urlencoding::decode(segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string());
        Some(decoded)
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The canonical envelope delivered to the host.
///
/// Field names on the wire follow the host contract (`type`, `uri`,
/// `fileName`, `filePath`), not the Rust names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareEvent {
    #[serde(rename = "type")]
    pub kind: ShareKind,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(rename = "uri", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ContentRef>,
    #[serde(rename = "fileName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "filePath", default, skip_serializing_if = "Option::is_none")]
    pub resolved_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ShareEvent {
    fn bare(kind: ShareKind) -> Self {
        Self {
            kind,
            content: None,
            reference: None,
            display_name: None,
            resolved_path: None,
            error: None,
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::bare(ShareKind::Text)
        }
    }

    pub fn url(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::bare(ShareKind::Url)
        }
    }

    pub fn file(reference: ContentRef) -> Self {
        Self {
            reference: Some(reference),
            ..Self::bare(ShareKind::File)
        }
    }

    pub fn image(reference: ContentRef) -> Self {
        Self {
            reference: Some(reference),
            ..Self::bare(ShareKind::Image)
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_resolved_path(mut self, path: impl Into<String>) -> Self {
        self.resolved_path = Some(path.into());
        self
    }

    /// Mark resolution as failed. The envelope is kept and still delivered.
    pub fn degrade(&mut self, error: impl Into<String>) {
        self.content = None;
        self.error = Some(error.into());
    }

    /// Whether the envelope still needs its reference resolved.
    pub fn needs_resolution(&self) -> bool {
        self.kind.carries_reference()
            && self.reference.is_some()
            && self.content.is_none()
            && self.error.is_none()
    }
}

/// Inbound action of a platform event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Send,
    View,
    #[serde(other)]
    Other,
}

/// Platform-neutral description of an inbound share/view event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDescriptor {
    pub action: Action,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub text_extra: Option<String>,
    #[serde(default)]
    pub stream_reference: Option<ContentRef>,
    #[serde(default)]
    pub uri_data: Option<String>,
}

impl EventDescriptor {
    pub fn send(mime_type: Option<&str>) -> Self {
        Self {
            action: Action::Send,
            mime_type: mime_type.map(str::to_string),
            text_extra: None,
            stream_reference: None,
            uri_data: None,
        }
    }

    pub fn view(uri_data: impl Into<String>) -> Self {
        Self {
            action: Action::View,
            mime_type: None,
            text_extra: None,
            stream_reference: None,
            uri_data: Some(uri_data.into()),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_extra = Some(text.into());
        self
    }

    pub fn with_stream(mut self, reference: impl Into<ContentRef>) -> Self {
        self.stream_reference = Some(reference.into());
        self
    }
}

//! Event classification.
//!
//! Turns an inbound platform descriptor (or a share-extension attachment list)
//! into a typed [`ShareEvent`]. Rules are evaluated top-to-bottom and the
//! first match wins; predicates are written so that no two rules can match
//! the same descriptor.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::event::{Action, ContentRef, EventDescriptor, ShareEvent};
use crate::error::{Result, ShareBridgeError};
use crate::storage::WebUrlDispatch;

struct Rule {
    name: &'static str,
    matches: fn(&EventClassifier, &EventDescriptor) -> bool,
    /// `None` means the event is recognised but intentionally suppressed.
    build: fn(&EventDescriptor) -> Option<ShareEvent>,
}

const RULES: &[Rule] = &[
    Rule {
        name: "send-plain-text",
        matches: |_, d| {
            is_send(d)
                && mime_is_plain_text(d)
                && d.stream_reference.is_none()
                && d.text_extra.is_some()
        },
        build: |d| d.text_extra.clone().map(ShareEvent::text),
    },
    Rule {
        name: "send-text-stream",
        matches: |_, d| {
            is_send(d) && mime_is_text(d) && !mime_is_plain_text(d) && d.stream_reference.is_some()
        },
        build: |d| d.stream_reference.clone().map(ShareEvent::file),
    },
    Rule {
        name: "send-image-stream",
        matches: |_, d| is_send(d) && mime_is_image(d) && d.stream_reference.is_some(),
        build: |d| d.stream_reference.clone().map(ShareEvent::image),
    },
    Rule {
        name: "send-other-stream",
        matches: |_, d| {
            is_send(d)
                && d.stream_reference.is_some()
                && !(mime_is_text(d) && !mime_is_plain_text(d))
                && !mime_is_image(d)
        },
        build: |d| d.stream_reference.clone().map(ShareEvent::file),
    },
    Rule {
        name: "send-text-fallback",
        matches: |_, d| {
            is_send(d)
                && !mime_is_plain_text(d)
                && d.stream_reference.is_none()
                && d.text_extra.is_some()
        },
        build: |d| d.text_extra.clone().map(ShareEvent::text),
    },
    Rule {
        name: "view-content-reference",
        matches: |_, d| {
            is_view(d) && uri(d).is_some_and(|u| ContentRef::from(u).is_content_reference())
        },
        build: |d| uri(d).map(|u| ShareEvent::file(ContentRef::from(u))),
    },
    Rule {
        name: "view-web-url-suppressed",
        matches: |c, d| is_view(d) && c.suppresses_web_urls() && uri(d).is_some_and(is_web_url),
        build: |_| None,
    },
    Rule {
        name: "view-other-scheme",
        matches: |c, d| {
            is_view(d)
                && uri(d).is_some_and(|u| {
                    !ContentRef::from(u).is_content_reference()
                        && !(c.suppresses_web_urls() && is_web_url(u))
                })
        },
        build: |d| uri(d).map(ShareEvent::url),
    },
];

fn is_send(d: &EventDescriptor) -> bool {
    d.action == Action::Send
}

fn is_view(d: &EventDescriptor) -> bool {
    d.action == Action::View
}

fn mime(d: &EventDescriptor) -> Option<String> {
    d.mime_type.as_deref().map(|m| m.trim().to_ascii_lowercase())
}

fn mime_is_plain_text(d: &EventDescriptor) -> bool {
    mime(d).is_some_and(|m| m.starts_with("text/plain"))
}

fn mime_is_text(d: &EventDescriptor) -> bool {
    mime(d).is_some_and(|m| m.starts_with("text/"))
}

fn mime_is_image(d: &EventDescriptor) -> bool {
    mime(d).is_some_and(|m| m.starts_with("image/"))
}

fn uri(d: &EventDescriptor) -> Option<&str> {
    d.uri_data.as_deref().map(str::trim).filter(|u| !u.is_empty())
}

fn is_web_url(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[derive(Debug, Clone, Copy)]
pub struct EventClassifier {
    web_url_dispatch: WebUrlDispatch,
}

impl EventClassifier {
    pub fn new(web_url_dispatch: WebUrlDispatch) -> Self {
        Self { web_url_dispatch }
    }

    fn suppresses_web_urls(&self) -> bool {
        self.web_url_dispatch == WebUrlDispatch::External
    }

    /// Classify a descriptor, distinguishing "no rule matched" from
    /// "matched but suppressed" (`Ok(None)`).
    pub fn try_classify(&self, descriptor: &EventDescriptor) -> Result<Option<ShareEvent>> {
        let rule = RULES
            .iter()
            .find(|rule| (rule.matches)(self, descriptor))
            .ok_or_else(|| {
                ShareBridgeError::InvalidEventShape(format!(
                    "action={:?} mime={:?} stream={} text={} uri={}",
                    descriptor.action,
                    descriptor.mime_type,
                    descriptor.stream_reference.is_some(),
                    descriptor.text_extra.is_some(),
                    descriptor.uri_data.is_some(),
                ))
            })?;

        let event = (rule.build)(descriptor);
        match &event {
            Some(e) => debug!("Classified event as {} via rule {}", e.kind, rule.name),
            None => debug!("Event suppressed by rule {}", rule.name),
        }
        Ok(event)
    }

    /// Classify a descriptor; anything that is not a share attempt yields `None`.
    pub fn classify(&self, descriptor: &EventDescriptor) -> Option<ShareEvent> {
        match self.try_classify(descriptor) {
            Ok(event) => event,
            Err(e) => {
                debug!("Ignoring platform event: {}", e);
                None
            }
        }
    }
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self::new(WebUrlDispatch::default())
    }
}

/// Kinds of item a share extension can be handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttachmentKind {
    Url,
    Text,
    FileUrl,
    Html,
    Css,
    JavaScript,
}

impl AttachmentKind {
    /// Map a uniform type identifier onto an attachment kind.
    pub fn from_type_identifier(identifier: &str) -> Option<Self> {
        match identifier {
            "public.url" => Some(AttachmentKind::Url),
            "public.text" | "public.plain-text" | "public.utf8-plain-text" => {
                Some(AttachmentKind::Text)
            }
            "public.file-url" => Some(AttachmentKind::FileUrl),
            "public.html" => Some(AttachmentKind::Html),
            "public.css" => Some(AttachmentKind::Css),
            "public.javascript" => Some(AttachmentKind::JavaScript),
            _ => None,
        }
    }

    /// Lower is preferred when an extension receives several attachments.
    fn precedence(&self) -> u8 {
        match self {
            AttachmentKind::Url => 0,
            AttachmentKind::Text => 1,
            AttachmentKind::FileUrl => 2,
            AttachmentKind::Html => 3,
            AttachmentKind::Css => 4,
            AttachmentKind::JavaScript => 5,
        }
    }
}

/// One loaded item handed to a share extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub value: String,
}

impl Attachment {
    pub fn new(kind: AttachmentKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Pick the preferred attachment and turn it into an envelope.
///
/// Only one envelope is produced even when several attachments arrive.
pub fn classify_attachments(attachments: &[Attachment]) -> Option<ShareEvent> {
    let chosen = attachments
        .iter()
        .filter(|a| !a.value.trim().is_empty())
        .min_by_key(|a| a.kind.precedence())?;

    let event = match chosen.kind {
        AttachmentKind::Url => ShareEvent::url(chosen.value.clone()),
        AttachmentKind::FileUrl => ShareEvent::file(ContentRef::new(chosen.value.clone())),
        AttachmentKind::Text
        | AttachmentKind::Html
        | AttachmentKind::Css
        | AttachmentKind::JavaScript => ShareEvent::text(chosen.value.clone()),
    };
    debug!(
        "Extension picked {:?} attachment out of {}",
        chosen.kind,
        attachments.len()
    );
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::share::ShareKind;

    fn classifier() -> EventClassifier {
        EventClassifier::default()
    }

    fn sample_descriptors() -> Vec<EventDescriptor> {
        let mimes = [
            None,
            Some("text/plain"),
            Some("text/html"),
            Some("image/png"),
            Some("application/pdf"),
        ];
        let mut out = Vec::new();
        for mime in mimes {
            for stream in [false, true] {
                for text in [false, true] {
                    let mut d = EventDescriptor::send(mime);
                    if stream {
                        d = d.with_stream("content://p/1");
                    }
                    if text {
                        d = d.with_text("hi");
                    }
                    out.push(d);
                }
            }
        }
        let uris = [
            "content://p/doc/42",
            "https://example.com",
            "http://x",
            "file:///a.html",
            "myapp://x",
            "",
        ];
        for uri in uris {
            out.push(EventDescriptor::view(uri));
        }
        out
    }

    #[test]
    fn test_send_plain_text() {
        let d = EventDescriptor::send(Some("text/plain")).with_text("hello");
        let event = classifier().classify(&d).unwrap();
        assert_eq!(event, ShareEvent::text("hello"));
    }

    #[test]
    fn test_send_html_stream_prefers_stream_over_text() {
        let d = EventDescriptor::send(Some("text/html"))
            .with_text("ignored")
            .with_stream("content://p/page.html");
        let event = classifier().classify(&d).unwrap();
        assert_eq!(event.kind, ShareKind::File);
        assert_eq!(event.reference.unwrap().as_str(), "content://p/page.html");
        assert!(event.content.is_none());
    }

    #[test]
    fn test_send_image_stream() {
        let d = EventDescriptor::send(Some("image/jpeg")).with_stream("content://media/7");
        assert_eq!(classifier().classify(&d).unwrap().kind, ShareKind::Image);
    }

    #[test]
    fn test_send_unknown_mime_stream_is_file() {
        for mime in [None, Some("application/octet-stream"), Some("text/plain")] {
            let d = EventDescriptor::send(mime).with_stream("content://p/blob");
            assert_eq!(classifier().classify(&d).unwrap().kind, ShareKind::File, "{mime:?}");
        }
    }

    #[test]
    fn test_send_text_fallback_for_other_mime() {
        let d = EventDescriptor::send(Some("text/html")).with_text("<p>x</p>");
        assert_eq!(classifier().classify(&d).unwrap(), ShareEvent::text("<p>x</p>"));

        let d = EventDescriptor::send(None).with_text("plain");
        assert_eq!(classifier().classify(&d).unwrap(), ShareEvent::text("plain"));
    }

    #[test]
    fn test_send_without_payload_is_invalid() {
        let d = EventDescriptor::send(Some("text/plain"));
        assert!(matches!(
            classifier().try_classify(&d),
            Err(ShareBridgeError::InvalidEventShape(_))
        ));
        assert!(classifier().classify(&d).is_none());
    }

    #[test]
    fn test_view_https_is_suppressed() {
        let d = EventDescriptor::view("https://example.com");
        assert!(matches!(classifier().try_classify(&d), Ok(None)));
        assert!(classifier().classify(&EventDescriptor::view("HTTP://example.com")).is_none());
    }

    #[test]
    fn test_view_https_handled_when_engine_dispatches() {
        let c = EventClassifier::new(WebUrlDispatch::Engine);
        let event = c.classify(&EventDescriptor::view("https://example.com")).unwrap();
        assert_eq!(event, ShareEvent::url("https://example.com"));
    }

    #[test]
    fn test_view_content_reference_is_file() {
        let event = classifier()
            .classify(&EventDescriptor::view("content://provider/doc/42"))
            .unwrap();
        assert_eq!(event.kind, ShareKind::File);
        assert_eq!(event.reference.unwrap().as_str(), "content://provider/doc/42");
    }

    #[test]
    fn test_view_other_scheme_is_url() {
        let event = classifier()
            .classify(&EventDescriptor::view("file:///sdcard/a.html"))
            .unwrap();
        assert_eq!(event, ShareEvent::url("file:///sdcard/a.html"));
    }

    #[test]
    fn test_other_actions_are_ignored() {
        let mut d = EventDescriptor::view("content://p/1");
        d.action = Action::Other;
        assert!(classifier().classify(&d).is_none());
        assert!(classifier().classify(&EventDescriptor::view("  ")).is_none());
    }

    #[test]
    fn test_rules_never_double_match() {
        for dispatch in [WebUrlDispatch::External, WebUrlDispatch::Engine] {
            let c = EventClassifier::new(dispatch);
            for d in sample_descriptors() {
                let matched: Vec<_> = RULES
                    .iter()
                    .filter(|r| (r.matches)(&c, &d))
                    .map(|r| r.name)
                    .collect();
                assert!(matched.len() <= 1, "{d:?} matched {matched:?}");
            }
        }
    }

    #[test]
    fn test_attachment_precedence() {
        let attachments = vec![
            Attachment::new(AttachmentKind::Html, "<html></html>"),
            Attachment::new(AttachmentKind::Text, "notes"),
            Attachment::new(AttachmentKind::Url, "https://a.example/x"),
        ];
        assert_eq!(
            classify_attachments(&attachments).unwrap(),
            ShareEvent::url("https://a.example/x")
        );

        let attachments = vec![
            Attachment::new(AttachmentKind::Html, "<html></html>"),
            Attachment::new(AttachmentKind::FileUrl, "file:///tmp/a.html"),
        ];
        assert_eq!(classify_attachments(&attachments).unwrap().kind, ShareKind::File);
    }

    #[test]
    fn test_attachments_empty_or_blank() {
        assert!(classify_attachments(&[]).is_none());
        assert!(classify_attachments(&[Attachment::new(AttachmentKind::Text, "  ")]).is_none());
    }

    #[test]
    fn test_type_identifier_mapping() {
        assert_eq!(AttachmentKind::from_type_identifier("public.url"), Some(AttachmentKind::Url));
        assert_eq!(
            AttachmentKind::from_type_identifier("public.plain-text"),
            Some(AttachmentKind::Text)
        );
        assert_eq!(AttachmentKind::from_type_identifier("com.adobe.pdf"), None);
    }
}

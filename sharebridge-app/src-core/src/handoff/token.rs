//! Activation tokens.
//!
//! A token is a URL on the host's scheme, e.g.
//! `sharebridge://share?type=url&content=https%3A%2F%2Fa.example%2Fx`.
//! The extension only sends the kind; the payload travels in the handoff
//! record. Full tokens are still decoded so that direct deep links work.
//!
//! Decoding is forgiving: malformed query fields (no `=`, bad
//! percent-encoding, empty names) are dropped one by one, and unknown routes
//! or `type` values produce no envelope.

use std::collections::HashMap;

use tracing::debug;
use url::Url;

use crate::share::{ContentRef, ShareEvent, ShareKind};

const SHARE_ROUTE: &str = "share";

/// Minimal token sent by the extension to wake the host.
pub fn activation_token(scheme: &str, kind: ShareKind) -> String {
    format!("{}://{}?type={}", scheme, SHARE_ROUTE, kind)
}

/// Token carrying the whole envelope in its query.
pub fn encode_token(scheme: &str, event: &ShareEvent) -> String {
    let mut token = activation_token(scheme, event.kind);
    if let Some(content) = &event.content {
        token.push_str("&content=");
        token.push_str(&urlencoding::encode(content));
    }
    if let Some(name) = &event.display_name {
        token.push_str("&fileName=");
        token.push_str(&urlencoding::encode(name));
    }
    if let Some(path) = event
        .resolved_path
        .as_deref()
        .or(event.reference.as_ref().map(ContentRef::as_str))
    {
        token.push_str("&filePath=");
        token.push_str(&urlencoding::encode(path));
    }
    token
}

/// Split a raw query into percent-decoded fields. First occurrence wins.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let Some((name, value)) = pair.split_once('=') else {
            debug!("Dropping token field without value: {:?}", pair);
            continue;
        };
        let (Ok(name), Ok(value)) = (urlencoding::decode(name), urlencoding::decode(value)) else {
            debug!("Dropping token field with invalid encoding: {:?}", pair);
            continue;
        };
        if name.is_empty() {
            continue;
        }
        fields.entry(name.into_owned()).or_insert_with(|| value.into_owned());
    }
    fields
}

/// Decode a token on `scheme` into an envelope.
pub fn decode_token(scheme: &str, token: &str) -> Option<ShareEvent> {
    let url = match Url::parse(token.trim()) {
        Ok(url) => url,
        Err(e) => {
            debug!("Ignoring unparseable activation token: {}", e);
            return None;
        }
    };
    if !url.scheme().eq_ignore_ascii_case(scheme) {
        debug!("Ignoring activation token for scheme {}", url.scheme());
        return None;
    }

    let route = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let fields = parse_query(url.query().unwrap_or_default());
    let field = |name: &str| fields.get(name).filter(|v| !v.is_empty()).cloned();

    let event = match route.as_str() {
        SHARE_ROUTE => {
            let kind = ShareKind::from_wire(fields.get("type")?)?;
            let content = field("content");
            let event = match kind {
                ShareKind::Url => ShareEvent::url(content?),
                ShareKind::Text => ShareEvent::text(content?),
                ShareKind::File | ShareKind::Image => {
                    let path = field("filePath").or_else(|| field("path"));
                    if content.is_none() && path.is_none() {
                        return None;
                    }
                    ShareEvent {
                        kind,
                        content,
                        reference: path.as_deref().map(ContentRef::from),
                        display_name: None,
                        resolved_path: path,
                        error: None,
                    }
                }
            };
            with_optional_name(event, field("fileName"))
        }
        // Routes used by earlier extension builds.
        "open" => ShareEvent::url(field("url")?),
        "text" => ShareEvent::text(field("content")?),
        "file" => {
            let path = field("path")?;
            let reference = ContentRef::new(path.clone());
            let name = reference.last_path_segment();
            with_optional_name(ShareEvent::file(reference).with_resolved_path(path), name)
        }
        other => {
            debug!("Ignoring activation token route {:?}", other);
            return None;
        }
    };
    Some(event)
}

fn with_optional_name(event: ShareEvent, name: Option<String>) -> ShareEvent {
    match name {
        Some(name) => event.with_display_name(name),
        None => event,
    }
}

use tracing::debug;

use super::reader::ContentReader;
use crate::share::ContentRef;

/// Name given to file envelopes whose name cannot be determined at all.
pub const DEFAULT_FILE_NAME: &str = "shared_file.html";

/// Best-effort display name: provider metadata first, then the last path
/// segment of the reference. Failures are logged and never propagated.
pub fn resolve_display_name(reader: &dyn ContentReader, reference: &ContentRef) -> Option<String> {
    match reader.query_display_name(reference) {
        Ok(Some(name)) if !name.trim().is_empty() => return Some(name),
        Ok(_) => {}
        Err(e) => debug!("Display name query failed for {}: {}", reference, e),
    }
    reference.last_path_segment()
}

/// Best-effort local filesystem path, for diagnostics only.
pub fn resolve_local_path(reader: &dyn ContentReader, reference: &ContentRef) -> Option<String> {
    match reader.query_local_path(reference) {
        Ok(path) => path.map(|p| p.to_string_lossy().into_owned()),
        Err(e) => {
            debug!("Local path query failed for {}: {}", reference, e);
            None
        }
    }
}

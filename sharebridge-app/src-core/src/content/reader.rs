//! Content reading.
//!
//! The [`ContentReader`] trait is the seam to the platform: opening a stream
//! for a reference, querying provider metadata, negotiating exports of
//! virtual documents. Only `open_stream` is mandatory; every other capability
//! defaults to "unsupported" so simple readers stay small.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::share::ContentRef;

/// Initial buffer capacity for full-stream reads.
const READ_BUFFER_SIZE: usize = 16 * 1024;

pub type ByteStream = Box<dyn Read + Send>;

/// Why a reference could not be read.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReadError {
    /// Classify an I/O failure against the reference it concerned.
    pub fn from_io(err: std::io::Error, reference: &ContentRef) -> Self {
        match err.kind() {
            ErrorKind::NotFound => ReadError::NotFound(reference.to_string()),
            ErrorKind::PermissionDenied => ReadError::PermissionDenied(reference.to_string()),
            _ => ReadError::Io(err),
        }
    }
}

pub trait ContentReader: Send + Sync {
    /// Open a byte stream for the reference.
    fn open_stream(&self, reference: &ContentRef) -> Result<ByteStream, ReadError>;

    /// Open the reference through a raw file descriptor.
    fn open_descriptor(&self, _reference: &ContentRef) -> Result<ByteStream, ReadError> {
        Err(ReadError::Unsupported("descriptor access".into()))
    }

    /// Whether the reference denotes a document with no literal byte stream.
    fn is_virtual(&self, _reference: &ContentRef) -> Result<bool, ReadError> {
        Ok(false)
    }

    /// MIME types the provider can export the reference as.
    fn export_types(
        &self,
        _reference: &ContentRef,
        _filter: &str,
    ) -> Result<Vec<String>, ReadError> {
        Ok(Vec::new())
    }

    /// Open an exported representation of a virtual document.
    fn open_export(
        &self,
        _reference: &ContentRef,
        mime_type: &str,
    ) -> Result<ByteStream, ReadError> {
        Err(ReadError::Unsupported(format!("export as {}", mime_type)))
    }

    /// Ask the provider for a persistent read grant.
    fn acquire_persistent_grant(&self, _reference: &ContentRef) -> Result<(), ReadError> {
        Err(ReadError::Unsupported("persistent grants".into()))
    }

    /// Human-readable name from provider metadata.
    fn query_display_name(&self, _reference: &ContentRef) -> Result<Option<String>, ReadError> {
        Ok(None)
    }

    /// Real filesystem location backing the reference, if the provider exposes one.
    fn query_local_path(&self, _reference: &ContentRef) -> Result<Option<PathBuf>, ReadError> {
        Ok(None)
    }
}

/// Drain a stream into memory.
pub fn read_all(mut stream: ByteStream) -> Result<Vec<u8>, ReadError> {
    let mut bytes = Vec::with_capacity(READ_BUFFER_SIZE);
    stream.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Reader for `file://` URIs and plain paths.
///
/// Used by the extension process for its sandboxed file URLs and by hosts
/// without a content-provider layer.
#[derive(Debug, Clone, Default)]
pub struct FileSystemReader;

impl FileSystemReader {
    pub fn new() -> Self {
        Self
    }

    /// Map a reference onto a local path. Non-file schemes are unsupported.
    pub fn to_path(reference: &ContentRef) -> Result<PathBuf, ReadError> {
        match reference.scheme() {
            None => Ok(PathBuf::from(reference.as_str())),
            Some(scheme) if scheme.eq_ignore_ascii_case("file") => {
                let parsed = url::Url::parse(reference.as_str())
                    .map_err(|e| ReadError::Unsupported(format!("{}: {}", reference, e)))?;
                parsed
                    .to_file_path()
                    .map_err(|_| ReadError::Unsupported(format!("not a local file: {}", reference)))
            }
            Some(scheme) => Err(ReadError::Unsupported(format!("scheme {}", scheme))),
        }
    }

    fn open(path: &Path, reference: &ContentRef) -> Result<ByteStream, ReadError> {
        let file = File::open(path).map_err(|e| ReadError::from_io(e, reference))?;
        debug!("Opened local file for {}", reference);
        Ok(Box::new(file))
    }
}

impl ContentReader for FileSystemReader {
    fn open_stream(&self, reference: &ContentRef) -> Result<ByteStream, ReadError> {
        let path = Self::to_path(reference)?;
        Self::open(&path, reference)
    }

    fn query_display_name(&self, reference: &ContentRef) -> Result<Option<String>, ReadError> {
        let path = Self::to_path(reference)?;
        Ok(path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()))
    }

    fn query_local_path(&self, reference: &ContentRef) -> Result<Option<PathBuf>, ReadError> {
        let path = Self::to_path(reference)?;
        Ok(path.is_file().then_some(path))
    }
}

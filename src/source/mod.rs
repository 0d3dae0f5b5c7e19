//! Fetch sources for update payloads.
//!
//! A [`Source`] hands the engine one byte stream per call together with its
//! declared length. The engine never looks at where the bytes come from, so
//! HTTP, local files, object stores, or a verifying decorator around any of
//! them plug in the same way.

pub mod http;
pub mod template;

use crate::error::{Result, UpdateError};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

pub use http::HttpSource;
pub use template::{Platform, resolve_template};

/// A fetched update payload.
///
/// The stream is closed when the payload is dropped, which happens exactly
/// once on every exit path of an update cycle.
pub struct Payload {
    reader: Box<dyn Read + Send>,
    length: Option<u64>,
}

impl Payload {
    /// Wrap a stream and its declared length (`None` when unknown).
    pub fn new(reader: impl Read + Send + 'static, length: Option<u64>) -> Self {
        Self {
            reader: Box::new(reader),
            length,
        }
    }

    /// Payload backed by an in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let length = Some(bytes.len() as u64);
        Self::new(std::io::Cursor::new(bytes), length)
    }

    /// Declared length of the payload in bytes, if the source knows it.
    pub fn length(&self) -> Option<u64> {
        self.length
    }
}

impl Read for Payload {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Supplier of the update payload.
pub trait Source: Send + Sync {
    /// Fetch the new executable (or archive).
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Fetch`] if the payload cannot be obtained. No
    /// partial payload is ever returned alongside an error.
    fn get(&self) -> Result<Payload>;
}

impl<F> Source for F
where
    F: Fn() -> Result<Payload> + Send + Sync,
{
    fn get(&self) -> Result<Payload> {
        self()
    }
}

/// Source reading the payload from a local file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Create a source for the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path the payload is read from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Source for FileSource {
    fn get(&self) -> Result<Payload> {
        let file = std::fs::File::open(&self.path).map_err(|e| {
            UpdateError::Fetch(format!(
                "failed to get content from {}: {e}",
                self.path.display()
            ))
        })?;
        let length = file.metadata().ok().map(|m| m.len());
        Ok(Payload::new(file, length))
    }
}

//! Progress events for an update cycle.
//!
//! Provides callback-based progress reporting that decouples the update
//! engine from presentation (CLI `indicatif` bar vs GUI signals). The
//! [`ProgressReader`] decorator observes bytes as they are pulled from the
//! fetched stream; it never alters them.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::Read;
use std::path::PathBuf;

/// Progress events emitted during an update cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The payload download has started.
    DownloadStarted {
        /// Declared size in bytes, if known.
        total_bytes: Option<u64>,
    },

    /// Download progress update.
    DownloadProgress {
        /// Bytes read so far.
        bytes_downloaded: u64,
        /// Declared size in bytes, if known.
        total_bytes: Option<u64>,
    },

    /// The payload stream reached its end.
    DownloadComplete {
        /// Total bytes read.
        bytes_downloaded: u64,
    },

    /// An archive payload was extracted.
    Extracted {
        /// Root artifact chosen from the archive.
        root: PathBuf,
    },

    /// The new artifact is installed.
    Installed {
        /// Path of the installed executable or bundle.
        target: PathBuf,
    },
}

/// Callback type for receiving progress events.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Reader decorator that reports bytes read to a progress bar and callback.
pub struct ProgressReader<'a, R> {
    inner: R,
    bar: ProgressBar,
    callback: Option<&'a ProgressCallback>,
    total_bytes: Option<u64>,
    bytes_downloaded: u64,
    finished: bool,
}

impl<'a, R: Read> ProgressReader<'a, R> {
    /// Wrap `inner`. When `show_bar` is false the bar is hidden and only the
    /// callback (if any) observes progress.
    pub fn new(
        inner: R,
        total_bytes: Option<u64>,
        show_bar: bool,
        callback: Option<&'a ProgressCallback>,
    ) -> Self {
        let bar = if show_bar {
            let pb = ProgressBar::new(total_bytes.unwrap_or(0));
            if let Ok(style) = ProgressStyle::with_template(
                "  {msg} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}",
            ) {
                pb.set_style(style);
            }
            pb.set_message("downloading update");
            pb
        } else {
            ProgressBar::hidden()
        };

        if let Some(cb) = callback {
            cb(ProgressEvent::DownloadStarted { total_bytes });
        }

        Self {
            inner,
            bar,
            callback,
            total_bytes,
            bytes_downloaded: 0,
            finished: false,
        }
    }

    /// Bytes read through the decorator so far.
    pub fn bytes_downloaded(&self) -> u64 {
        self.bytes_downloaded
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.bar.finish_and_clear();
        if let Some(cb) = self.callback {
            cb(ProgressEvent::DownloadComplete {
                bytes_downloaded: self.bytes_downloaded,
            });
        }
    }
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            if !buf.is_empty() {
                self.finish();
            }
            return Ok(0);
        }

        self.bytes_downloaded += n as u64;
        self.bar.inc(n as u64);
        if let Some(cb) = self.callback {
            cb(ProgressEvent::DownloadProgress {
                bytes_downloaded: self.bytes_downloaded,
                total_bytes: self.total_bytes,
            });
        }
        Ok(n)
    }
}

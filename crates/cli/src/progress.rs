//! Upload progress reporting for write actions.

use crate::observability::format_bytes;
use packrat_index::UploadCallback;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running total of bytes uploaded by a write session.
#[derive(Clone, Default)]
pub struct UploadProgress {
    bytes: Arc<AtomicU64>,
    quiet: bool,
}

impl UploadProgress {
    pub fn new(quiet: bool) -> Self {
        Self {
            bytes: Arc::new(AtomicU64::new(0)),
            quiet,
        }
    }

    /// Callback to hand to a write session.
    pub fn callback(&self) -> UploadCallback {
        let bytes = self.bytes.clone();
        let quiet = self.quiet;
        Arc::new(move |n| {
            let total = bytes.fetch_add(n, Ordering::Relaxed) + n;
            if !quiet {
                eprint!("\rUploaded {}", format_bytes(total));
            }
        })
    }

    pub fn total(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// End the progress line, if one was started.
    pub fn finish(&self) {
        if !self.quiet && self.total() > 0 {
            eprintln!(); // newline after progress
        }
    }
}

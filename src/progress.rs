//! Progress-callback trait for extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the capture loop reveals and accepts pages. Logging goes through
//! `tracing` independently; callbacks exist for UIs (the CLI drives an
//! `indicatif` spinner from them).
//!
//! # Example
//!
//! ```rust
//! use webdoc2pdf::{ExtractionProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     pages: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_frame_accepted(&self, index: usize, _width: u32, _height: u32) {
//!         self.pages.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("captured page {}", index + 1);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { pages: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline as a session progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events arrive from a single task, in order.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once the browser has loaded the document.
    fn on_session_start(&self, url: &str, output_dir: &Path) {
        let _ = (url, output_dir);
    }

    /// Called at the start of every reveal cycle (1-indexed).
    fn on_reveal(&self, cycle: usize) {
        let _ = cycle;
    }

    /// Called when a capture is accepted as a new page (0-indexed).
    fn on_frame_accepted(&self, index: usize, width: u32, height: u32) {
        let _ = (index, width, height);
    }

    /// Called when a capture is discarded as already seen.
    fn on_frame_rejected(&self, no_progress: usize, limit: usize) {
        let _ = (no_progress, limit);
    }

    /// Called when the page did not settle in time.
    fn on_stability_timeout(&self, waited_ms: u64) {
        let _ = waited_ms;
    }

    /// Called once the capture loop ends, before PDF assembly.
    fn on_capture_complete(&self, frames: usize) {
        let _ = frames;
    }

    /// Called after the PDF has been written.
    fn on_pdf_written(&self, path: &Path, pages: usize) {
        let _ = (path, pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        accepted: AtomicUsize,
        rejected: AtomicUsize,
        completed_with: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_frame_accepted(&self, _index: usize, _width: u32, _height: u32) {
            self.accepted.fetch_add(1, Ordering::SeqCst);
        }

        fn on_frame_rejected(&self, _no_progress: usize, _limit: usize) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
        }

        fn on_capture_complete(&self, frames: usize) {
            self.completed_with.store(frames, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_session_start("https://example.com", Path::new("out"));
        cb.on_reveal(1);
        cb.on_frame_accepted(0, 10, 10);
        cb.on_frame_rejected(1, 2);
        cb.on_stability_timeout(500);
        cb.on_capture_complete(1);
        cb.on_pdf_written(Path::new("out/doc.pdf"), 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_frame_accepted(0, 100, 200);
        tracker.on_frame_accepted(1, 100, 200);
        tracker.on_frame_rejected(1, 2);
        tracker.on_capture_complete(2);

        assert_eq!(tracker.accepted.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.rejected.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.completed_with.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_reveal(3);
    }
}

//! Progress-callback trait for extraction status events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! the same sequence of status messages a terminal user sees: output
//! directory ready, each page saved, each file started/finished, batch done.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfvision::{ExtractionConfig, ExtractionProgressCallback};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter {
//!     saved: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for PageCounter {
//!     fn on_page_saved(&self, ordinal: u32, path: &Path) {
//!         self.saved.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {} saved as {}", ordinal, path.display());
//!     }
//! }
//!
//! let counter = Arc::new(PageCounter { saved: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .system_prompt("Summarise each page.")
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline as it works through files and pages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events arrive sequentially from one task, but
/// page events are emitted from the blocking render thread, hence
/// `Send + Sync`.
pub trait ExtractionProgressCallback: Send + Sync {
    /// The output directory is ready. `created` is false when it already existed.
    fn on_output_dir_ready(&self, dir: &Path, created: bool) {
        let _ = (dir, created);
    }

    /// Rendering is about to start.
    ///
    /// # Arguments
    /// * `total_pages`: pages that will be rendered
    /// * `range`:       the requested `(first, last)` bounds, if any
    fn on_render_start(&self, total_pages: u32, range: Option<(u32, u32)>) {
        let _ = (total_pages, range);
    }

    /// One page image was written.
    fn on_page_saved(&self, ordinal: u32, path: &Path) {
        let _ = (ordinal, path);
    }

    /// Batch mode: a file is about to be processed.
    ///
    /// # Arguments
    /// * `index`: 1-indexed position in the batch
    /// * `total`: number of PDFs in the batch
    fn on_file_start(&self, path: &Path, index: usize, total: usize) {
        let _ = (path, index, total);
    }

    /// A file finished; `reply_len` is the byte length of the model reply.
    fn on_file_complete(&self, path: &Path, index: usize, total: usize, reply_len: usize) {
        let _ = (path, index, total, reply_len);
    }

    /// A file failed.
    fn on_file_error(&self, path: &Path, index: usize, total: usize, error: &str) {
        let _ = (path, index, total, error);
    }

    /// Batch mode: every file has been attempted.
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        pages: AtomicUsize,
        files_ok: AtomicUsize,
        files_err: AtomicUsize,
        dirs: Mutex<Vec<(PathBuf, bool)>>,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_output_dir_ready(&self, dir: &Path, created: bool) {
            self.dirs.lock().unwrap().push((dir.to_path_buf(), created));
        }

        fn on_page_saved(&self, _ordinal: u32, _path: &Path) {
            self.pages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_complete(&self, _path: &Path, _index: usize, _total: usize, _len: usize) {
            self.files_ok.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_error(&self, _path: &Path, _index: usize, _total: usize, _error: &str) {
            self.files_err.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_output_dir_ready(Path::new("temp_images"), true);
        cb.on_render_start(3, Some((2, 4)));
        cb.on_page_saved(1, Path::new("temp_images/page_1.png"));
        cb.on_file_start(Path::new("a.pdf"), 1, 2);
        cb.on_file_complete(Path::new("a.pdf"), 1, 2, 42);
        cb.on_file_error(Path::new("b.pdf"), 2, 2, "boom");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_output_dir_ready(Path::new("out"), false);
        tracker.on_page_saved(1, Path::new("out/page_1.png"));
        tracker.on_page_saved(2, Path::new("out/page_2.png"));
        tracker.on_file_complete(Path::new("a.pdf"), 1, 2, 10);
        tracker.on_file_error(Path::new("b.pdf"), 2, 2, "API error");

        assert_eq!(tracker.pages.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.files_ok.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.files_err.load(Ordering::SeqCst), 1);
        assert_eq!(
            tracker.dirs.lock().unwrap().as_slice(),
            &[(PathBuf::from("out"), false)]
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_file_start(Path::new("a.pdf"), 1, 1);
        cb.on_batch_complete(1, 1);
    }
}

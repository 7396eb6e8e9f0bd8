//! Progress-callback trait for per-page and per-region pipeline events.
//!
//! Inject an [`Arc<dyn RunProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! real-time events as the pipeline segments pages and recognizes regions.
//!
//! Callbacks are the least-invasive integration point: callers can forward
//! events to a channel, a WebSocket, or a terminal progress bar without the
//! library knowing how the host application communicates. The trait is
//! `Send + Sync` because regions are recognized concurrently.

/// Called by the pipeline as it processes pages and regions.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Region events may fire concurrently from different
/// tasks; implementations must synchronise shared mutable state.
pub trait RunProgressCallback: Send + Sync {
    /// Called once after rasterisation, before any page is segmented.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called after a page has been segmented (detected + cropped).
    ///
    /// `regions` is the number of crops that page contributed.
    fn on_page_segmented(&self, page_index: usize, total_pages: usize, regions: usize) {
        let _ = (page_index, total_pages, regions);
    }

    /// Called when a page is skipped due to a per-page failure.
    fn on_page_skipped(&self, page_index: usize, total_pages: usize, detail: &str) {
        let _ = (page_index, total_pages, detail);
    }

    /// Called when one region finishes the recognition pipeline.
    ///
    /// `ok` is false when the region's outcome carries sentinel failures.
    fn on_region_done(&self, completed: usize, total_regions: usize, ok: bool) {
        let _ = (completed, total_regions, ok);
    }

    /// Called once when the run is complete.
    fn on_run_complete(&self, total_regions: usize, failed_regions: usize) {
        let _ = (total_regions, failed_regions);
    }
}

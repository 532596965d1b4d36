//! Progress-callback trait for per-stage generation events.
//!
//! Inject an [`Arc<dyn GenerationProgressCallback>`] via
//! [`crate::config::GeneratorConfigBuilder::progress_callback`] to receive
//! events as the four stages run. The CLI turns them into a progress bar;
//! the web front end turns them into the agent log shown on the results page.
//!
//! # Example
//!
//! ```rust
//! use bilancio_agent::{GenerationProgressCallback, GeneratorConfig, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl GenerationProgressCallback for CountingCallback {
//!     fn on_stage_complete(&self, stage: Stage, _output_len: usize, elapsed_ms: u64) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{stage} done in {elapsed_ms}ms");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = GeneratorConfig::builder()
//!     .progress_callback(counter as Arc<dyn GenerationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::llm::Stage;
use std::sync::Arc;

/// Called by the pipeline as it moves through the stages.
///
/// Stages run strictly in sequence, but the callback is shared with the
/// server's request tasks, so implementations must be `Send + Sync`.
/// All methods have default no-op implementations.
pub trait GenerationProgressCallback: Send + Sync {
    /// Called once after the inputs are loaded and rasterised.
    ///
    /// # Arguments
    /// * `documents`: number of input PDFs
    /// * `total_pages`: rendered pages across all documents
    fn on_generation_start(&self, documents: usize, total_pages: usize) {
        let _ = (documents, total_pages);
    }

    /// Called just before a stage sends its request.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage returns a reply.
    ///
    /// # Arguments
    /// * `output_len`: byte length of the raw reply
    /// * `elapsed_ms`: wall-clock time including retries
    fn on_stage_complete(&self, stage: Stage, output_len: usize, elapsed_ms: u64) {
        let _ = (stage, output_len, elapsed_ms);
    }

    /// Called when a stage falls back to a default or reports an imbalance.
    fn on_stage_warning(&self, stage: Stage, message: &str) {
        let _ = (stage, message);
    }

    /// Called once after the formatting stage.
    ///
    /// # Arguments
    /// * `text_len`: byte length of the cleaned balance-sheet text
    /// * `duration_ms`: total pipeline time
    fn on_generation_complete(&self, text_len: usize, duration_ms: u64) {
        let _ = (text_len, duration_ms);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl GenerationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::GeneratorConfig`].
pub type ProgressCallback = Arc<dyn GenerationProgressCallback>;

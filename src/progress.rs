//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn StageProgressCallback>`] via
//! [`crate::config::DigitizerConfigBuilder::progress_callback`] (or
//! [`crate::orchestrator::Pipeline::with_progress`]) to follow a document
//! through extraction, normalization, recognition, resolution and
//! structuring. The CLI drives its spinner from these events.
//!
//! # Example
//!
//! ```rust
//! use fra_digitizer::{DigitizerConfig, Stage, StageProgressCallback};
//! use std::sync::Arc;
//!
//! struct Log;
//!
//! impl StageProgressCallback for Log {
//!     fn on_stage_start(&self, stage: Stage) {
//!         eprintln!("→ {stage}");
//!     }
//! }
//!
//! let config = DigitizerConfig::builder()
//!     .progress_callback(Arc::new(Log) as Arc<dyn StageProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::orchestrator::{PipelineState, Stage};
use std::sync::Arc;

/// Called by the orchestrator on every state transition.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Stages run strictly one after another within a
/// run, but one callback may be shared by concurrent runs, hence
/// `Send + Sync`.
pub trait StageProgressCallback: Send + Sync {
    /// Every transition of the run's state machine, terminal states included.
    fn on_state_change(&self, state: &PipelineState) {
        let _ = state;
    }

    /// A stage is about to run.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// A stage produced output that passed its check.
    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// The run reached `Failed`.
    ///
    /// `message` is the full user-facing failure message.
    fn on_pipeline_failed(&self, stage: Stage, message: &str) {
        let _ = (stage, message);
    }

    /// The run reached `Succeeded`.
    fn on_pipeline_complete(&self, total_ms: u64) {
        let _ = total_ms;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl StageProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::DigitizerConfig`].
pub type ProgressCallback = Arc<dyn StageProgressCallback>;

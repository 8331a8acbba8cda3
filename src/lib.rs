//! # fra-digitizer
//!
//! Digitize scanned Forest Rights Act (FRA) claim documents into a
//! structured JSON record using multimodal LLMs.
//!
//! ## Why this crate?
//!
//! FRA claim forms arrive as photographs and scanned PDFs with mixed
//! scripts, handwriting and stamps. Classical OCR gets the characters but
//! not the meaning. This crate chains four model calls with a deterministic
//! keyword step in the middle, and checks every intermediate result before
//! moving on, so a failure is always attributed to the stage that caused it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document (path / URL / data URI)
//!  │
//!  ├─ 1. Extract     the model transcribes the attached document
//!  ├─ 2. Normalize   OCR errors, noise and spacing are cleaned up
//!  ├─ 3. Recognize   labelled entities (names, villages, coordinates, …)
//!  ├─ 4. Resolve     keyword table maps entity labels onto record fields
//!  └─ 5. Structure   the model emits the final five-field record
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fra_digitizer::{digitize, export_record, DigitizerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = DigitizerConfig::default();
//!     let output = digitize("claim_form.jpg", &config).await?;
//!     export_record(&output.record, "fra_data.json").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `fra2json` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! fra-digitizer = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod capability;
pub mod config;
pub mod digitize;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use capability::DocumentCapabilities;
pub use config::{DigitizerConfig, DigitizerConfigBuilder};
pub use digitize::{
    build_pipeline, digitize, digitize_sync, digitize_to_file, export_record, load_record,
    process_document, DEFAULT_EXPORT_FILE,
};
pub use error::{CapabilityError, DigitizeError, PipelineError};
pub use orchestrator::{Pipeline, PipelineState, Stage};
pub use output::{PipelineOutput, PipelineResult, StageTiming};
pub use pipeline::encode::EncodedDocument;
pub use pipeline::resolve::{resolve_fields, KeywordTable, TargetField};
pub use progress::{NoopProgressCallback, ProgressCallback, StageProgressCallback};
pub use schema::{Entity, FieldResolutionInput, RecordField, StructuredRecord};

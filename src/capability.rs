//! The four model-backed capabilities the pipeline depends on.
//!
//! The orchestrator only knows this trait. Production code plugs in
//! [`crate::pipeline::llm::LlmCapabilities`]; tests plug in scripted fakes so
//! the state machine can be exercised without any network access.
//!
//! A capability reports two kinds of failure, and the orchestrator treats
//! them differently:
//!
//! * `Ok(output)` with the expected field missing or empty, or
//!   `Err(CapabilityError::MissingOutput)` → the stage-specific error
//!   (`ExtractionError`, `NormalizationError`, …).
//! * `Err(CapabilityError::Provider | Timeout | Attachment)` → an unexpected
//!   error whose message is surfaced verbatim.

use crate::error::CapabilityError;
use crate::schema::{
    ExtractionInput, ExtractionOutput, FieldResolutionInput, NormalizationInput,
    NormalizationOutput, RecognitionOutput, StructuredRecord,
};
use async_trait::async_trait;

/// One method per model-backed pipeline stage.
///
/// Implementations must be `Send + Sync`: independent documents may be
/// processed concurrently through the same backend.
#[async_trait]
pub trait DocumentCapabilities: Send + Sync {
    /// Short identifier used in logs, e.g. `"openai/gpt-4.1-nano"`.
    fn name(&self) -> &str;

    /// Read the text out of an encoded scan.
    async fn extract(&self, input: ExtractionInput) -> Result<ExtractionOutput, CapabilityError>;

    /// Correct OCR errors, strip noise, standardise spacing and punctuation.
    async fn normalize(
        &self,
        input: NormalizationInput,
    ) -> Result<NormalizationOutput, CapabilityError>;

    /// Label holder names, village names, coordinates and claim statuses.
    async fn recognize(&self, text: String) -> Result<RecognitionOutput, CapabilityError>;

    /// Fill every record field, inferring or nulling what the entities miss.
    async fn structure(
        &self,
        input: FieldResolutionInput,
    ) -> Result<StructuredRecord, CapabilityError>;
}

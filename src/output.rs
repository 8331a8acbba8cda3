//! Result types returned by the pipeline.
//!
//! [`PipelineResult`] is the caller-facing tagged union: exactly one of a
//! record or a failure message, serialized as
//! `{"success": true, "data": {…}}` or `{"success": false, "error": "…"}`.
//! [`PipelineOutput`] is the richer success value kept by library callers
//! who also want the intermediate text and entities.

use crate::error::{PipelineError, FAILURE_PREFIX};
use crate::orchestrator::Stage;
use crate::schema::{Entity, FieldResolutionInput, StructuredRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Everything a successful run produced.
///
/// Never built for a failed run: failures carry no partial results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    /// The validated record.
    pub record: StructuredRecord,
    /// Raw text from the extraction stage.
    pub extracted_text: String,
    /// Cleaned text from the normalization stage.
    pub preprocessed_text: String,
    /// Entities in the order the model returned them.
    pub entities: Vec<Entity>,
    /// Fields resolved from the entities before structuring.
    pub resolved: FieldResolutionInput,
    /// Wall-clock time per stage, in execution order.
    pub timings: Vec<StageTiming>,
    /// Wall-clock time of the whole run.
    pub total_duration_ms: u64,
}

/// Time spent in one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    pub stage: Stage,
    pub duration_ms: u64,
}

/// Tagged outcome of processing one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "ResultEnvelope", try_from = "ResultEnvelope")]
pub enum PipelineResult {
    Success { data: StructuredRecord },
    Failure { message: String },
}

impl PipelineResult {
    /// A failure whose message is `"Failed to process document. <detail>"`.
    pub fn failure(detail: impl fmt::Display) -> Self {
        PipelineResult::Failure {
            message: format!("{FAILURE_PREFIX}{detail}"),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success { .. })
    }

    pub fn data(&self) -> Option<&StructuredRecord> {
        match self {
            PipelineResult::Success { data } => Some(data),
            PipelineResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            PipelineResult::Success { .. } => None,
            PipelineResult::Failure { message } => Some(message),
        }
    }

    pub fn into_result(self) -> Result<StructuredRecord, String> {
        match self {
            PipelineResult::Success { data } => Ok(data),
            PipelineResult::Failure { message } => Err(message),
        }
    }
}

impl From<Result<PipelineOutput, PipelineError>> for PipelineResult {
    fn from(r: Result<PipelineOutput, PipelineError>) -> Self {
        match r {
            Ok(out) => PipelineResult::Success { data: out.record },
            Err(e) => PipelineResult::failure(e),
        }
    }
}

impl From<Result<StructuredRecord, PipelineError>> for PipelineResult {
    fn from(r: Result<StructuredRecord, PipelineError>) -> Self {
        match r {
            Ok(data) => PipelineResult::Success { data },
            Err(e) => PipelineResult::failure(e),
        }
    }
}

/// Wire form of [`PipelineResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResultEnvelope {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<StructuredRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<PipelineResult> for ResultEnvelope {
    fn from(r: PipelineResult) -> Self {
        match r {
            PipelineResult::Success { data } => ResultEnvelope {
                success: true,
                data: Some(data),
                error: None,
            },
            PipelineResult::Failure { message } => ResultEnvelope {
                success: false,
                data: None,
                error: Some(message),
            },
        }
    }
}

impl TryFrom<ResultEnvelope> for PipelineResult {
    type Error = String;

    fn try_from(env: ResultEnvelope) -> Result<Self, Self::Error> {
        match env {
            ResultEnvelope {
                success: true,
                data: Some(data),
                error: None,
            } => Ok(PipelineResult::Success { data }),
            ResultEnvelope {
                success: false,
                data: None,
                error: Some(message),
            } => Ok(PipelineResult::Failure { message }),
            ResultEnvelope { success, .. } => Err(format!(
                "envelope with success={success} must carry exactly {}",
                if success { "`data`" } else { "`error`" }
            )),
        }
    }
}

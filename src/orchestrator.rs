//! Pipeline orchestrator: the state machine that runs one document.
//!
//! ```text
//! Idle ─▶ Extracting ─▶ Normalizing ─▶ Recognizing ─▶ Resolving ─▶ Structuring ─▶ Succeeded
//!   │          │             │              │             │             │
//!   └──────────┴─────────────┴──────────────┴─────────────┴─────────────┴──▶ Failed(stage, message)
//! ```
//!
//! Each stage's output is checked before the next stage starts. A failed
//! check or a capability error moves the run straight to `Failed`; nothing
//! after it executes and no partial record is returned. The orchestrator
//! itself never retries and never times out: both are properties of the
//! [`DocumentCapabilities`] backend.

use crate::capability::DocumentCapabilities;
use crate::error::{CapabilityError, PipelineError};
use crate::output::{PipelineOutput, PipelineResult, StageTiming};
use crate::pipeline::encode::EncodedDocument;
use crate::pipeline::postprocess::clean_text;
use crate::pipeline::resolve::{resolve_fields, KeywordTable};
use crate::progress::ProgressCallback;
use crate::schema::{ExtractionInput, NormalizationInput};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// The non-terminal states of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Idle,
    Extracting,
    Normalizing,
    Recognizing,
    Resolving,
    Structuring,
}

impl Stage {
    /// The stage that follows this one, or `None` after `Structuring`.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Idle => Some(Stage::Extracting),
            Stage::Extracting => Some(Stage::Normalizing),
            Stage::Normalizing => Some(Stage::Recognizing),
            Stage::Recognizing => Some(Stage::Resolving),
            Stage::Resolving => Some(Stage::Structuring),
            Stage::Structuring => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Extracting => "extracting",
            Stage::Normalizing => "normalizing",
            Stage::Recognizing => "recognizing",
            Stage::Resolving => "resolving",
            Stage::Structuring => "structuring",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full state of a run, including the two terminal states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Running(Stage),
    Succeeded,
    Failed { stage: Stage, message: String },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineState::Running(_))
    }
}

impl From<&PipelineError> for PipelineState {
    fn from(e: &PipelineError) -> Self {
        PipelineState::Failed {
            stage: e.stage(),
            message: e.user_message(),
        }
    }
}

/// Runs documents through the four capabilities plus field resolution.
///
/// Holds no per-run state, so one `Pipeline` can serve concurrent runs.
#[derive(Clone)]
pub struct Pipeline {
    capabilities: Arc<dyn DocumentCapabilities>,
    keywords: KeywordTable,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("capabilities", &self.capabilities.name())
            .field("keywords", &self.keywords)
            .field("progress", &self.progress.as_ref().map(|_| "<dyn StageProgressCallback>"))
            .finish()
    }
}

impl Pipeline {
    pub fn new(capabilities: Arc<dyn DocumentCapabilities>) -> Self {
        Self {
            capabilities,
            keywords: KeywordTable::default(),
            progress: None,
        }
    }

    /// Replace the default field-resolution keyword table.
    pub fn with_keywords(mut self, table: KeywordTable) -> Self {
        self.keywords = table;
        self
    }

    /// Report stage transitions to `cb`.
    pub fn with_progress(mut self, cb: ProgressCallback) -> Self {
        self.progress = Some(cb);
        self
    }

    /// Process a data URI and fold the outcome into a [`PipelineResult`].
    ///
    /// Never panics on bad input and never returns a raw error.
    pub async fn process(&self, data_uri: &str) -> PipelineResult {
        match EncodedDocument::parse(data_uri) {
            Ok(doc) => self.run(&doc).await.into(),
            Err(e) => {
                self.fail(&e);
                PipelineResult::failure(e)
            }
        }
    }

    /// Run every stage on an already validated document.
    pub async fn run(&self, doc: &EncodedDocument) -> Result<PipelineOutput, PipelineError> {
        let run_start = Instant::now();
        info!(
            "Processing document ({}, {} bytes) with {}",
            doc.mime_type(),
            doc.decoded_len(),
            self.capabilities.name()
        );

        match self.run_stages(doc).await {
            Ok(mut out) => {
                out.total_duration_ms = run_start.elapsed().as_millis() as u64;
                info!(
                    "Document processed: {}/5 fields filled in {}ms",
                    out.record.filled_count(),
                    out.total_duration_ms
                );
                if let Some(ref cb) = self.progress {
                    cb.on_state_change(&PipelineState::Succeeded);
                    cb.on_pipeline_complete(out.total_duration_ms);
                }
                Ok(out)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn run_stages(&self, doc: &EncodedDocument) -> Result<PipelineOutput, PipelineError> {
        let caps = &self.capabilities;
        let mut timings = Vec::with_capacity(5);

        // ── 1. Extraction ────────────────────────────────────────────────
        let clock = self.enter(Stage::Extracting);
        let extracted = caps
            .extract(ExtractionInput {
                document_data_uri: doc.as_str().to_string(),
            })
            .await
            .map_err(|e| stage_error(Stage::Extracting, e))?
            .extracted_text
            .and_then(non_empty)
            .ok_or(PipelineError::Extraction)?;
        timings.push(self.leave(Stage::Extracting, clock));
        debug!("Extracted {} chars", extracted.len());

        // ── 2. Normalization ─────────────────────────────────────────────
        let clock = self.enter(Stage::Normalizing);
        let preprocessed = caps
            .normalize(NormalizationInput {
                extracted_text: extracted.clone(),
            })
            .await
            .map_err(|e| stage_error(Stage::Normalizing, e))?
            .preprocessed_text
            .and_then(non_empty)
            .ok_or(PipelineError::Normalization)?;
        timings.push(self.leave(Stage::Normalizing, clock));
        debug!("Normalized to {} chars", preprocessed.len());

        // ── 3. Recognition ───────────────────────────────────────────────
        let clock = self.enter(Stage::Recognizing);
        let entities = caps
            .recognize(preprocessed.clone())
            .await
            .map_err(|e| stage_error(Stage::Recognizing, e))?
            .entities
            .ok_or(PipelineError::Recognition)?;
        timings.push(self.leave(Stage::Recognizing, clock));
        debug!("Recognized {} entities", entities.len());

        // ── 4. Resolution ────────────────────────────────────────────────
        let clock = self.enter(Stage::Resolving);
        let resolved = resolve_fields(&entities, &self.keywords);
        timings.push(self.leave(Stage::Resolving, clock));
        if resolved.is_empty() {
            debug!("No entity matched a record field; structuring from nothing");
        }

        // ── 5. Structuring ───────────────────────────────────────────────
        let clock = self.enter(Stage::Structuring);
        let record = caps
            .structure(resolved.clone())
            .await
            .map_err(|e| stage_error(Stage::Structuring, e))?;
        timings.push(self.leave(Stage::Structuring, clock));

        Ok(PipelineOutput {
            record,
            extracted_text: extracted,
            preprocessed_text: preprocessed,
            entities,
            resolved,
            timings,
            total_duration_ms: 0,
        })
    }

    fn enter(&self, stage: Stage) -> Instant {
        debug!("→ {}", stage);
        if let Some(ref cb) = self.progress {
            cb.on_state_change(&PipelineState::Running(stage));
            cb.on_stage_start(stage);
        }
        Instant::now()
    }

    fn leave(&self, stage: Stage, clock: Instant) -> StageTiming {
        let duration_ms = clock.elapsed().as_millis() as u64;
        if let Some(ref cb) = self.progress {
            cb.on_stage_complete(stage, duration_ms);
        }
        StageTiming { stage, duration_ms }
    }

    fn fail(&self, e: &PipelineError) {
        let state = PipelineState::from(e);
        error!("Document processing pipeline failed: {:?}", state);
        if let Some(ref cb) = self.progress {
            cb.on_state_change(&state);
            if let PipelineState::Failed { stage, message } = &state {
                cb.on_pipeline_failed(*stage, message);
            }
        }
    }
}

/// Reject text that holds nothing once tidied. Accepted text is forwarded
/// exactly as the model returned it.
fn non_empty(text: String) -> Option<String> {
    (!clean_text(&text).is_empty()).then_some(text)
}

/// Map a capability error onto the failing stage.
fn stage_error(stage: Stage, e: CapabilityError) -> PipelineError {
    match e {
        CapabilityError::MissingOutput { detail } => {
            debug!("{} produced no usable output: {}", stage, detail);
            match stage {
                Stage::Extracting => PipelineError::Extraction,
                Stage::Normalizing => PipelineError::Normalization,
                Stage::Recognizing => PipelineError::Recognition,
                _ => PipelineError::Structuring,
            }
        }
        other => PipelineError::Unexpected {
            stage,
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        Entity, ExtractionOutput, FieldResolutionInput, NormalizationOutput, RecognitionOutput,
        StructuredRecord,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DOC: &str = "data:image/png;base64,iVBORw0KGgo=";

    /// Answers every stage from fixed values and counts calls.
    struct Fixed {
        text: Option<&'static str>,
        entities: Option<Vec<Entity>>,
        fail_at: Option<Stage>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn ok() -> Self {
            Self {
                text: Some("Patta Holder: Ram Singh\nVillage: Rampur"),
                entities: Some(vec![
                    Entity::new("patta holder name", "Ram Singh"),
                    Entity::new("village", "Rampur"),
                ]),
                fail_at: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn check(&self, stage: Stage) -> Result<(), CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_at == Some(stage) {
                return Err(CapabilityError::Provider("network timeout".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl DocumentCapabilities for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn extract(&self, _: ExtractionInput) -> Result<ExtractionOutput, CapabilityError> {
            self.check(Stage::Extracting)?;
            Ok(ExtractionOutput {
                extracted_text: self.text.map(String::from),
            })
        }

        async fn normalize(
            &self,
            input: NormalizationInput,
        ) -> Result<NormalizationOutput, CapabilityError> {
            self.check(Stage::Normalizing)?;
            Ok(NormalizationOutput {
                preprocessed_text: Some(input.extracted_text),
            })
        }

        async fn recognize(&self, _: String) -> Result<RecognitionOutput, CapabilityError> {
            self.check(Stage::Recognizing)?;
            Ok(RecognitionOutput {
                entities: self.entities.clone(),
            })
        }

        async fn structure(
            &self,
            input: FieldResolutionInput,
        ) -> Result<StructuredRecord, CapabilityError> {
            self.check(Stage::Structuring)?;
            Ok(StructuredRecord {
                patta_holder_name: input.patta_holder_name,
                village_name: input.village_name,
                coordinates: input.coordinates,
                claim_status: input.claim_status,
                additional_notes: input.other_information,
            })
        }
    }

    fn pipeline(caps: Fixed) -> (Pipeline, Arc<Fixed>) {
        let caps = Arc::new(caps);
        (Pipeline::new(caps.clone()), caps)
    }

    #[test]
    fn stage_order() {
        let mut s = Stage::Idle;
        let mut seen = vec![s];
        while let Some(n) = s.next() {
            seen.push(n);
            s = n;
        }
        assert_eq!(
            seen,
            vec![
                Stage::Idle,
                Stage::Extracting,
                Stage::Normalizing,
                Stage::Recognizing,
                Stage::Resolving,
                Stage::Structuring
            ]
        );
        assert!(PipelineState::Succeeded.is_terminal());
        assert!(!PipelineState::Running(Stage::Idle).is_terminal());
    }

    #[tokio::test]
    async fn happy_path_fills_record() {
        let (p, caps) = pipeline(Fixed::ok());
        let doc = EncodedDocument::parse(DOC).unwrap();
        let out = p.run(&doc).await.unwrap();
        assert_eq!(out.record.patta_holder_name.as_deref(), Some("Ram Singh"));
        assert_eq!(out.record.village_name.as_deref(), Some("Rampur"));
        assert_eq!(out.record.coordinates, None);
        assert_eq!(out.timings.len(), 5);
        assert_eq!(out.timings[3].stage, Stage::Resolving);
        assert_eq!(caps.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn extracted_text_is_forwarded_unchanged() {
        let text = "ഗ്രാമം: അവന്\u{200D}\nग्राम: क्\u{200C}ष  \n";
        let (p, _) = pipeline(Fixed {
            text: Some(text),
            ..Fixed::ok()
        });
        let doc = EncodedDocument::parse(DOC).unwrap();
        let out = p.run(&doc).await.unwrap();
        assert_eq!(out.extracted_text, text);
        assert_eq!(out.preprocessed_text, text);
        assert!(out.preprocessed_text.contains("അവന്\u{200D}"));
        assert!(out.preprocessed_text.contains("क्\u{200C}ष"));
    }

    #[tokio::test]
    async fn blank_extraction_stops_before_normalizing() {
        let (p, caps) = pipeline(Fixed {
            text: Some(" \n\u{200B} "),
            ..Fixed::ok()
        });
        let r = p.process(DOC).await;
        assert!(r.error().unwrap().contains("OCR failed to extract text"));
        assert_eq!(caps.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn absent_entities_fail_recognition() {
        let (p, caps) = pipeline(Fixed {
            entities: None,
            ..Fixed::ok()
        });
        let doc = EncodedDocument::parse(DOC).unwrap();
        assert_eq!(p.run(&doc).await.unwrap_err(), PipelineError::Recognition);
        assert_eq!(caps.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn provider_error_is_wrapped_verbatim() {
        let (p, caps) = pipeline(Fixed {
            fail_at: Some(Stage::Normalizing),
            ..Fixed::ok()
        });
        let r = p.process(DOC).await;
        assert_eq!(r.error(), Some("Failed to process document. network timeout"));
        assert_eq!(caps.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn malformed_uri_never_reaches_capabilities() {
        let (p, caps) = pipeline(Fixed::ok());
        let r = p.process("not a data uri").await;
        assert!(r.error().unwrap().starts_with("Failed to process document. "));
        let r = p.process("").await;
        assert_eq!(
            r.error(),
            Some("Failed to process document. Document data URI is missing.")
        );
        assert_eq!(caps.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_output_maps_to_stage_error() {
        let e = || CapabilityError::missing("no json");
        assert_eq!(stage_error(Stage::Extracting, e()), PipelineError::Extraction);
        assert_eq!(stage_error(Stage::Normalizing, e()), PipelineError::Normalization);
        assert_eq!(stage_error(Stage::Recognizing, e()), PipelineError::Recognition);
        assert_eq!(stage_error(Stage::Structuring, e()), PipelineError::Structuring);
        assert_eq!(
            stage_error(Stage::Structuring, CapabilityError::Timeout { secs: 5 }),
            PipelineError::Unexpected {
                stage: Stage::Structuring,
                message: "LLM call timed out after 5s".into()
            }
        );
    }
}

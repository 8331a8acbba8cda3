//! Integration tests for the document pipeline.
//!
//! Every test drives [`Pipeline`] through a scripted capability backend, so
//! no network access or API key is needed. Live-model tests live in
//! `tests/e2e.rs`.

use async_trait::async_trait;
use fra_digitizer::schema::{
    ExtractionInput, ExtractionOutput, NormalizationInput, NormalizationOutput, RecognitionOutput,
};
use fra_digitizer::{
    export_record, load_record, CapabilityError, DocumentCapabilities, Entity,
    FieldResolutionInput, Pipeline, PipelineError, PipelineResult, PipelineState, Stage,
    StageProgressCallback, StructuredRecord,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};

const DOC: &str = "data:image/png;base64,iVBORw0KGgo=";

// ── Scripted backend ─────────────────────────────────────────────────────────

/// Answers each capability from a script and records what it was asked.
struct Scripted {
    extracted: Option<String>,
    preprocessed: Option<String>,
    entities: Option<Vec<Entity>>,
    fail_at: Option<(Stage, CapabilityError)>,
    calls: Mutex<Vec<&'static str>>,
    structure_input: Mutex<Option<FieldResolutionInput>>,
}

impl Scripted {
    fn new(entities: Vec<Entity>) -> Self {
        Self {
            extracted: Some("FORM-A  Claim for Forest Land\nVillage: Rampur".to_string()),
            preprocessed: Some("Form A. Claim for forest land. Village: Rampur.".to_string()),
            entities: Some(entities),
            fail_at: None,
            calls: Mutex::new(Vec::new()),
            structure_input: Mutex::new(None),
        }
    }

    fn failing(mut self, stage: Stage, err: CapabilityError) -> Self {
        self.fail_at = Some((stage, err));
        self
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn step(&self, stage: Stage, name: &'static str) -> Result<(), CapabilityError> {
        self.calls.lock().unwrap().push(name);
        match &self.fail_at {
            Some((s, e)) if *s == stage => Err(e.clone()),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentCapabilities for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn extract(&self, input: ExtractionInput) -> Result<ExtractionOutput, CapabilityError> {
        self.step(Stage::Extracting, "extract")?;
        assert!(input.document_data_uri.starts_with("data:"));
        Ok(ExtractionOutput {
            extracted_text: self.extracted.clone(),
        })
    }

    async fn normalize(
        &self,
        _: NormalizationInput,
    ) -> Result<NormalizationOutput, CapabilityError> {
        self.step(Stage::Normalizing, "normalize")?;
        Ok(NormalizationOutput {
            preprocessed_text: self.preprocessed.clone(),
        })
    }

    async fn recognize(&self, _: String) -> Result<RecognitionOutput, CapabilityError> {
        self.step(Stage::Recognizing, "recognize")?;
        Ok(RecognitionOutput {
            entities: self.entities.clone(),
        })
    }

    async fn structure(
        &self,
        input: FieldResolutionInput,
    ) -> Result<StructuredRecord, CapabilityError> {
        self.step(Stage::Structuring, "structure")?;
        *self.structure_input.lock().unwrap() = Some(input.clone());
        Ok(StructuredRecord {
            patta_holder_name: input.patta_holder_name,
            village_name: input.village_name,
            coordinates: input.coordinates,
            claim_status: input.claim_status,
            additional_notes: input.other_information,
        })
    }
}

fn run_with(caps: Scripted) -> (Pipeline, Arc<Scripted>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let caps = Arc::new(caps);
    (Pipeline::new(caps.clone()), caps)
}

fn full_entities() -> Vec<Entity> {
    vec![
        Entity::new("patta holder name", "Ram Singh"),
        Entity::new("village name", "Rampur"),
        Entity::new("gps coordinates", "21.15N, 79.08E"),
        Entity::new("claim status", "Pending"),
        Entity::new("other information", "Boundary verified by Gram Sabha"),
    ]
}

// ── Success path ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn all_stages_succeed_with_five_key_record() {
    let (pipeline, caps) = run_with(Scripted::new(full_entities()));

    let result = pipeline.process(DOC).await;
    assert!(result.is_success(), "unexpected failure: {:?}", result.error());
    assert_eq!(
        caps.calls(),
        vec!["extract", "normalize", "recognize", "structure"]
    );

    let json = serde_json::to_value(&result).unwrap();
    let data = json["data"].as_object().unwrap();
    let mut keys: Vec<&str> = data.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec![
            "additionalNotes",
            "claimStatus",
            "coordinates",
            "pattaHolderName",
            "villageName"
        ]
    );
    assert!(data.values().all(|v| v.is_string() || v.is_null()));
    assert_eq!(data["pattaHolderName"], "Ram Singh");
}

#[tokio::test]
async fn rampur_scenario_resolves_two_fields() {
    let (pipeline, caps) = run_with(Scripted::new(vec![
        Entity::new("village name", "Rampur"),
        Entity::new("patta holder name", "Ram Singh"),
    ]));

    let result = pipeline.process(DOC).await;
    assert!(result.is_success());

    let resolved = caps.structure_input.lock().unwrap().clone().unwrap();
    assert_eq!(resolved.village_name.as_deref(), Some("Rampur"));
    assert_eq!(resolved.patta_holder_name.as_deref(), Some("Ram Singh"));
    assert!(resolved.coordinates.is_none());
    assert!(resolved.claim_status.is_none());
    assert!(resolved.other_information.is_none());

    // Absent fields are omitted, not null.
    let wire = serde_json::to_value(&resolved).unwrap();
    assert_eq!(wire.as_object().unwrap().len(), 2);
}

#[tokio::test]
async fn empty_entity_list_still_structures_all_null_record() {
    let (pipeline, caps) = run_with(Scripted::new(Vec::new()));

    let record = pipeline.process(DOC).await.into_result().unwrap();
    assert_eq!(record, StructuredRecord::default());
    assert_eq!(record.filled_count(), 0);
    assert!(caps.structure_input.lock().unwrap().as_ref().unwrap().is_empty());
    assert_eq!(caps.calls().last(), Some(&"structure"));
}

#[tokio::test]
async fn run_returns_trace_with_timings() {
    let (pipeline, _) = run_with(Scripted::new(full_entities()));
    let doc = fra_digitizer::EncodedDocument::parse(DOC).unwrap();

    let out = pipeline.run(&doc).await.unwrap();
    assert_eq!(out.entities.len(), 5);
    assert!(out.extracted_text.contains("Rampur"));
    let stages: Vec<Stage> = out.timings.iter().map(|t| t.stage).collect();
    assert_eq!(
        stages,
        vec![
            Stage::Extracting,
            Stage::Normalizing,
            Stage::Recognizing,
            Stage::Resolving,
            Stage::Structuring
        ]
    );
}

// ── Failure paths ────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_extracted_text_stops_before_normalization() {
    let mut caps = Scripted::new(full_entities());
    caps.extracted = None;
    let (pipeline, caps) = run_with(caps);

    let result = pipeline.process(DOC).await;
    let message = result.error().unwrap();
    assert!(message.starts_with("Failed to process document. "));
    assert!(message.contains("OCR failed to extract text"));
    assert_eq!(caps.calls(), vec!["extract"]);
}

#[tokio::test]
async fn whitespace_extracted_text_counts_as_empty() {
    let mut caps = Scripted::new(full_entities());
    caps.extracted = Some(" \n\t ".to_string());
    let (pipeline, caps) = run_with(caps);

    assert!(pipeline
        .process(DOC)
        .await
        .error()
        .unwrap()
        .contains("OCR failed to extract text"));
    assert_eq!(caps.calls(), vec!["extract"]);
}

#[tokio::test]
async fn empty_preprocessed_text_is_normalization_error() {
    let mut caps = Scripted::new(full_entities());
    caps.preprocessed = Some(String::new());
    let (pipeline, caps) = run_with(caps);

    assert_eq!(
        pipeline.process(DOC).await.error(),
        Some("Failed to process document. Text preprocessing failed.")
    );
    assert_eq!(caps.calls(), vec!["extract", "normalize"]);
}

#[tokio::test]
async fn absent_entities_is_recognition_error() {
    let mut caps = Scripted::new(Vec::new());
    caps.entities = None;
    let (pipeline, caps) = run_with(caps);

    assert_eq!(
        pipeline.process(DOC).await.error(),
        Some("Failed to process document. Named Entity Recognition failed to identify entities.")
    );
    assert_eq!(caps.calls(), vec!["extract", "normalize", "recognize"]);
}

#[tokio::test]
async fn structuring_without_output_is_structuring_error() {
    let caps = Scripted::new(full_entities())
        .failing(Stage::Structuring, CapabilityError::missing("reply was not JSON"));
    let (pipeline, _) = run_with(caps);

    assert_eq!(
        pipeline.process(DOC).await.error(),
        Some("Failed to process document. Structuring failed to produce a record.")
    );
}

#[tokio::test]
async fn network_timeout_message_is_surfaced_verbatim() {
    let caps = Scripted::new(full_entities()).failing(
        Stage::Normalizing,
        CapabilityError::Provider("network timeout".to_string()),
    );
    let (pipeline, caps) = run_with(caps);

    let result = pipeline.process(DOC).await;
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        serde_json::json!({
            "success": false,
            "error": "Failed to process document. network timeout"
        })
    );
    assert_eq!(caps.calls(), vec!["extract", "normalize"]);
}

#[tokio::test]
async fn missing_document_never_calls_capabilities() {
    let (pipeline, caps) = run_with(Scripted::new(full_entities()));

    assert_eq!(
        pipeline.process("").await.error(),
        Some("Failed to process document. Document data URI is missing.")
    );
    assert!(pipeline.process("not a data uri").await.error().is_some());
    assert!(caps.calls().is_empty());
}

#[tokio::test]
async fn run_reports_stage_of_failure() {
    let caps = Scripted::new(full_entities()).failing(
        Stage::Recognizing,
        CapabilityError::Timeout { secs: 60 },
    );
    let (pipeline, _) = run_with(caps);
    let doc = fra_digitizer::EncodedDocument::parse(DOC).unwrap();

    let err = pipeline.run(&doc).await.unwrap_err();
    assert_eq!(err.stage(), Stage::Recognizing);
    assert!(matches!(err, PipelineError::Unexpected { .. }));
    assert_eq!(err.to_string(), "LLM call timed out after 60s");
}

// ── Progress events ──────────────────────────────────────────────────────────

#[derive(Default)]
struct StateLog(Mutex<Vec<PipelineState>>);

impl StageProgressCallback for StateLog {
    fn on_state_change(&self, state: &PipelineState) {
        self.0.lock().unwrap().push(state.clone());
    }
}

#[tokio::test]
async fn progress_reports_every_transition_then_failure() {
    let log = Arc::new(StateLog::default());
    let caps = Scripted::new(full_entities()).failing(
        Stage::Recognizing,
        CapabilityError::Provider("quota exceeded".to_string()),
    );
    let pipeline = Pipeline::new(Arc::new(caps)).with_progress(log.clone());

    pipeline.process(DOC).await;

    let states = log.0.lock().unwrap().clone();
    assert_eq!(
        states[..3],
        [
            PipelineState::Running(Stage::Extracting),
            PipelineState::Running(Stage::Normalizing),
            PipelineState::Running(Stage::Recognizing),
        ]
    );
    let last = states.last().unwrap();
    assert!(last.is_terminal());
    assert!(matches!(
        last,
        PipelineState::Failed {
            stage: Stage::Recognizing,
            ..
        }
    ));
}

// ── Concurrency ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_runs_are_independent() {
    let good = Pipeline::new(Arc::new(Scripted::new(full_entities())));
    let bad = Pipeline::new(Arc::new(Scripted::new(full_entities()).failing(
        Stage::Extracting,
        CapabilityError::Provider("connection reset".to_string()),
    )));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let p = if i % 2 == 0 { good.clone() } else { bad.clone() };
            tokio::spawn(async move { p.process(DOC).await })
        })
        .collect();

    for (i, h) in handles.into_iter().enumerate() {
        let result: PipelineResult = h.await.unwrap();
        assert_eq!(result.is_success(), i % 2 == 0, "run {i}");
    }
}

// ── Export ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn export_round_trip_preserves_keys_and_values() {
    let (pipeline, _) = run_with(Scripted::new(vec![
        Entity::new("village name", "Rampur"),
        Entity::new("patta holder name", "Ram Singh"),
    ]));
    let record = pipeline.process(DOC).await.into_result().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fra_data.json");
    export_record(&record, &path).await.unwrap();

    let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw.as_object().unwrap().len(), 5);
    assert_eq!(raw["villageName"], "Rampur");
    assert!(raw["claimStatus"].is_null());

    assert_eq!(load_record(&path).await.unwrap(), record);
}

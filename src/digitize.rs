//! Library entry points: digitize a document, export the record.
//!
//! [`digitize`] is the primary API. It resolves the input (path, URL or data
//! URI), builds an LLM-backed [`Pipeline`] from the config, and runs it.
//! [`process_document`] is the lower-level form that takes a data URI and
//! always answers with a [`PipelineResult`], never an error.

use crate::config::{DigitizerConfig, DEFAULT_MODEL};
use crate::error::DigitizeError;
use crate::orchestrator::Pipeline;
use crate::output::{PipelineOutput, PipelineResult};
use crate::pipeline::encode::EncodedDocument;
use crate::pipeline::input;
use crate::pipeline::llm::LlmCapabilities;
use crate::pipeline::render;
use crate::schema::StructuredRecord;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// File name used when a record is exported without an explicit path.
pub const DEFAULT_EXPORT_FILE: &str = "fra_data.json";

/// Digitize a document given as a local path, an HTTP(S) URL or a data URI.
///
/// # Errors
/// Front-end failures (missing file, unsupported type, no provider) are
/// returned as their own [`DigitizeError`] variants; a stage failure is
/// [`DigitizeError::Pipeline`].
///
/// # Example
/// ```rust,no_run
/// use fra_digitizer::{digitize, DigitizerConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = DigitizerConfig::default();
/// let output = digitize("claim_form.pdf", &config).await?;
/// println!("{}", serde_json::to_string_pretty(&output.record)?);
/// # Ok(())
/// # }
/// ```
pub async fn digitize(
    input_str: impl AsRef<str>,
    config: &DigitizerConfig,
) -> Result<PipelineOutput, DigitizeError> {
    let input_str = input_str.as_ref();
    info!("Starting digitization: {}", abbreviate(input_str));

    let loaded = input::resolve_input(input_str, config).await?;
    let doc = EncodedDocument::parse(loaded.data_uri)?;
    if doc.decoded_len() > config.max_document_bytes {
        return Err(DigitizeError::DocumentTooLarge {
            source_name: loaded.source_name,
            size: doc.decoded_len(),
            limit: config.max_document_bytes,
        });
    }
    render::check_attachable(&doc).await?;

    let pipeline = build_pipeline(config).await?;
    Ok(pipeline.run(&doc).await?)
}

/// Run the pipeline on a data URI and report the tagged outcome.
///
/// Every failure, including an unconfigured provider, becomes
/// `PipelineResult::Failure` with the `"Failed to process document. "`
/// prefix.
pub async fn process_document(data_uri: &str, config: &DigitizerConfig) -> PipelineResult {
    match build_pipeline(config).await {
        Ok(pipeline) => pipeline.process(data_uri).await,
        Err(e) => PipelineResult::failure(e),
    }
}

/// Digitize a document and export the record to `output_path`.
pub async fn digitize_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &DigitizerConfig,
) -> Result<PipelineOutput, DigitizeError> {
    let output = digitize(input_str, config).await?;
    export_record(&output.record, output_path).await?;
    Ok(output)
}

/// Synchronous wrapper around [`digitize`].
///
/// Creates a temporary tokio runtime internally.
pub fn digitize_sync(
    input_str: impl AsRef<str>,
    config: &DigitizerConfig,
) -> Result<PipelineOutput, DigitizeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DigitizeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(digitize(input_str, config))
}

/// Write `record` as pretty-printed JSON (two-space indent, no trailing
/// newline).
///
/// Uses atomic write (temp file + rename) so a crash never leaves a
/// half-written record behind.
pub async fn export_record(
    record: &StructuredRecord,
    output_path: impl AsRef<Path>,
) -> Result<(), DigitizeError> {
    let path = output_path.as_ref();
    let write_err = |e: std::io::Error| DigitizeError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let json = serde_json::to_string_pretty(record)
        .map_err(|e| DigitizeError::Internal(format!("record serialization: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    info!("Exported record to {}", path.display());
    Ok(())
}

/// Read a record previously written by [`export_record`].
pub async fn load_record(path: impl AsRef<Path>) -> Result<StructuredRecord, DigitizeError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DigitizeError::RecordReadFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    serde_json::from_str(&text).map_err(|e| DigitizeError::RecordReadFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Build the LLM-backed pipeline described by `config`.
pub async fn build_pipeline(config: &DigitizerConfig) -> Result<Pipeline, DigitizeError> {
    let provider = resolve_provider(config).await?;
    let label = format!(
        "{}/{}",
        config.provider_name.as_deref().unwrap_or("auto"),
        config.model.as_deref().unwrap_or("default")
    );
    debug!("Using LLM backend {}", label);

    let caps = LlmCapabilities::new(provider, label, config);
    let pipeline = Pipeline::new(Arc::new(caps));
    Ok(match config.progress_callback {
        Some(ref cb) => pipeline.with_progress(Arc::clone(cb)),
        None => pipeline,
    })
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, DigitizeError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DigitizeError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`), API key read from
///    the environment by [`ProviderFactory::create_llm_provider`].
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    honoured even when several API keys are present.
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** via [`ProviderFactory::from_env`].
async fn resolve_provider(config: &DigitizerConfig) -> Result<Arc<dyn LLMProvider>, DigitizeError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DigitizeError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

/// Data URIs can be megabytes long; keep log lines readable.
fn abbreviate(input: &str) -> String {
    const MAX: usize = 64;
    match input.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}… ({} chars)", &input[..idx], input.len()),
        None => input.to_string(),
    }
}

//! Error types for the fra-digitizer library.
//!
//! Three error types cover three layers:
//!
//! * [`DigitizeError`]: **fatal front-end errors.** The document could not
//!   even be handed to the pipeline (file missing, unsupported type, provider
//!   not configured, export failed). Returned from the `digitize*` helpers.
//!
//! * [`PipelineError`]: **stage failures.** The pipeline started but one of
//!   its stages failed its output check. Every variant is tagged with the
//!   [`Stage`] it came from and renders the most specific message available.
//!
//! * [`CapabilityError`]: what a capability backend reports back to the
//!   orchestrator. The orchestrator folds it into a [`PipelineError`]; it is
//!   never surfaced raw to callers.

use crate::orchestrator::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// Prefix carried by every failure message returned to callers.
pub const FAILURE_PREFIX: &str = "Failed to process document. ";

/// Fatal errors returned by the `digitize*` entry points.
#[derive(Debug, Error)]
pub enum DigitizeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is empty.
    #[error("No document provided")]
    EmptyInput,

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes are neither a PDF nor a recognised image format.
    #[error("Unsupported document '{source_name}': expected a PDF or an image (PNG, JPEG, TIFF, WebP, GIF, BMP)\nFirst bytes: {magic:?}")]
    UnsupportedDocument { source_name: String, magic: Vec<u8> },

    /// The document exceeds `max_document_bytes`.
    #[error("Document '{source_name}' is {size} bytes, above the {limit} byte limit")]
    DocumentTooLarge {
        source_name: String,
        size: usize,
        limit: usize,
    },

    // ── Attachment errors ─────────────────────────────────────────────────
    /// The document type cannot be attached to a model call, even after
    /// conversion.
    #[error("Cannot attach a '{mime_type}' document to the model\nSupported: PDF, PNG, JPEG, GIF, WebP, TIFF, BMP.")]
    UnsupportedAttachment { mime_type: String },

    /// pdfium could not load the PDF.
    #[error("Cannot open PDF: {detail}")]
    CorruptPdf { detail: String },

    /// The PDF is encrypted.
    #[error("PDF is password-protected; remove the password and try again")]
    PasswordRequired,

    /// A page could not be rendered or re-encoded.
    #[error("Failed to rasterise page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDF inputs are rendered to images with pdfium before they are sent to the model.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Or place libpdfium in the working directory, or install it system-wide.\n\
Image inputs (PNG, JPEG, TIFF, ...) do not need pdfium."
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// A pipeline stage failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the exported JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not read a previously exported record.
    #[error("Failed to read record '{path}': {detail}")]
    RecordReadFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failed pipeline run.
///
/// `Display` renders only the stage-specific message; the
/// [`FAILURE_PREFIX`] is added when the error is folded into a
/// [`crate::output::PipelineResult`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// No data URI was supplied.
    #[error("Document data URI is missing.")]
    InputMissing,

    /// The data URI does not have the `data:<mimetype>;base64,<payload>` shape.
    #[error("Document data URI is malformed: {reason}")]
    InvalidDocument { reason: String },

    /// Extraction returned no usable text.
    #[error("OCR failed to extract text from the document.")]
    Extraction,

    /// Normalization returned no usable text.
    #[error("Text preprocessing failed.")]
    Normalization,

    /// Recognition returned no `entities` field.
    #[error("Named Entity Recognition failed to identify entities.")]
    Recognition,

    /// Structuring returned no record.
    #[error("Structuring failed to produce a record.")]
    Structuring,

    /// A capability call failed outright (transport, provider, timeout).
    #[error("{message}")]
    Unexpected { stage: Stage, message: String },
}

impl PipelineError {
    /// The stage that was running when the pipeline failed.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::InputMissing | PipelineError::InvalidDocument { .. } => Stage::Idle,
            PipelineError::Extraction => Stage::Extracting,
            PipelineError::Normalization => Stage::Normalizing,
            PipelineError::Recognition => Stage::Recognizing,
            PipelineError::Structuring => Stage::Structuring,
            PipelineError::Unexpected { stage, .. } => *stage,
        }
    }

    /// Full user-facing message, including [`FAILURE_PREFIX`].
    pub fn user_message(&self) -> String {
        format!("{FAILURE_PREFIX}{self}")
    }
}

/// An error reported by a capability backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// The model answered, but without the expected output structure.
    #[error("capability returned no usable output: {detail}")]
    MissingOutput { detail: String },

    /// The provider call itself failed.
    #[error("{0}")]
    Provider(String),

    /// The document could not be turned into a model attachment.
    #[error("Could not prepare the document for the model: {0}")]
    Attachment(String),

    /// The call exceeded the backend's per-call timeout.
    #[error("LLM call timed out after {secs}s")]
    Timeout { secs: u64 },
}

impl CapabilityError {
    pub fn missing(detail: impl Into<String>) -> Self {
        CapabilityError::MissingOutput {
            detail: detail.into(),
        }
    }
}

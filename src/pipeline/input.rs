//! Input resolution: turn a user-supplied path, URL or data URI into a
//! data URI the pipeline can consume.
//!
//! Local files and downloads are size-checked before encoding, and their
//! MIME type is sniffed from the bytes rather than trusted from a file
//! extension or a `Content-Type` header. A literal `data:` URI is passed
//! through untouched; the orchestrator validates it as part of the run so a
//! malformed one surfaces as a pipeline failure.

use crate::config::DigitizerConfig;
use crate::error::DigitizeError;
use crate::pipeline::encode::encode_document;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// A document ready to hand to the pipeline.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// Where the document came from, for logs and error messages.
    pub source_name: String,
    /// The document as a `data:<mime>;base64,<payload>` string.
    pub data_uri: String,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Check if the input string is an inline data URI.
pub fn is_data_uri(input: &str) -> bool {
    input.starts_with("data:")
}

/// Resolve the input string to a data URI.
///
/// URLs are downloaded, local paths are read, data URIs pass through.
pub async fn resolve_input(
    input: &str,
    config: &DigitizerConfig,
) -> Result<LoadedDocument, DigitizeError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DigitizeError::EmptyInput);
    }

    if is_data_uri(input) {
        debug!("Input is an inline data URI ({} chars)", input.len());
        return Ok(LoadedDocument {
            source_name: "<data URI>".to_string(),
            data_uri: input.to_string(),
        });
    }

    let (bytes, source_name) = if is_url(input) {
        (download_url(input, config.download_timeout_secs).await?, input.to_string())
    } else {
        (read_local(input).await?, input.to_string())
    };

    load_bytes(&bytes, &source_name, config.max_document_bytes)
}

/// Size-check and encode raw document bytes.
pub fn load_bytes(
    bytes: &[u8],
    source_name: &str,
    max_document_bytes: usize,
) -> Result<LoadedDocument, DigitizeError> {
    if bytes.is_empty() {
        return Err(DigitizeError::EmptyInput);
    }
    if bytes.len() > max_document_bytes {
        return Err(DigitizeError::DocumentTooLarge {
            source_name: source_name.to_string(),
            size: bytes.len(),
            limit: max_document_bytes,
        });
    }

    let doc = encode_document(bytes, source_name)?;
    Ok(LoadedDocument {
        source_name: source_name.to_string(),
        data_uri: doc.into_string(),
    })
}

/// Read a local file, mapping I/O failures to user-facing errors.
async fn read_local(path_str: &str) -> Result<Vec<u8>, DigitizeError> {
    let path = PathBuf::from(path_str);

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Read local document: {} ({} bytes)", path.display(), bytes.len());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(DigitizeError::PermissionDenied { path })
        }
        Err(_) => Err(DigitizeError::FileNotFound { path }),
    }
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, DigitizeError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DigitizeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            DigitizeError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            DigitizeError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(DigitizeError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_send_err)?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}

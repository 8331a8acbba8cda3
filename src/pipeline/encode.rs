//! Document encoding: raw bytes → `data:<mimetype>;base64,<payload>`.
//!
//! Multimodal model APIs accept inline attachments as base64 data URIs, so
//! the whole pipeline takes a single [`EncodedDocument`] as its input. The
//! MIME type is sniffed from magic bytes rather than trusted from a file
//! extension: a mislabelled `.jpg` that is really a PDF would otherwise be
//! sent with the wrong type and the model would read garbage.

use crate::error::{DigitizeError, PipelineError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::{DynamicImage, ImageFormat};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::io::Cursor;
use tracing::debug;

/// `data:<type>/<subtype>[;param=value…];base64,<payload>`
static DATA_URI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^data:([A-Za-z0-9!#$&^_.+-]+/[A-Za-z0-9!#$&^_.+-]+)((?:;[A-Za-z0-9_.+-]+=[^;,]*)*);base64,([A-Za-z0-9+/]+={0,2})$")
        .expect("data URI regex is valid")
});

/// A document carried inline as a base64 data URI.
///
/// Can only be obtained through [`EncodedDocument::parse`] or
/// [`encode_document`], so the shape invariant always holds.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedDocument {
    uri: String,
    mime_end: usize,
    payload_start: usize,
}

impl EncodedDocument {
    /// Validate a data-URI string.
    pub fn parse(uri: impl Into<String>) -> Result<Self, PipelineError> {
        let uri = uri.into();
        if uri.trim().is_empty() {
            return Err(PipelineError::InputMissing);
        }

        let caps = DATA_URI_RE
            .captures(&uri)
            .ok_or_else(|| PipelineError::InvalidDocument {
                reason: "expected 'data:<mimetype>;base64,<payload>'".to_string(),
            })?;

        let mime_end = caps.get(1).map(|m| m.end()).unwrap_or(5);
        let payload_start = caps.get(3).map(|m| m.start()).unwrap_or(uri.len());

        // The regex only checks the alphabet; padding errors surface here.
        let doc = Self {
            uri,
            mime_end,
            payload_start,
        };
        if doc.payload().len() % 4 != 0 {
            return Err(PipelineError::InvalidDocument {
                reason: format!(
                    "base64 payload length {} is not a multiple of 4",
                    doc.payload().len()
                ),
            });
        }
        Ok(doc)
    }

    /// Wrap already-known bytes and MIME type.
    pub fn from_bytes(bytes: &[u8], mime_type: &str) -> Self {
        let prefix = format!("data:{mime_type};base64,");
        let payload_start = prefix.len();
        let mut uri = prefix;
        STANDARD.encode_string(bytes, &mut uri);
        Self {
            uri,
            mime_end: 5 + mime_type.len(),
            payload_start,
        }
    }

    /// The declared MIME type, e.g. `image/png`.
    pub fn mime_type(&self) -> &str {
        &self.uri[5..self.mime_end]
    }

    /// The base64 payload without the `data:…;base64,` header.
    pub fn payload(&self) -> &str {
        &self.uri[self.payload_start..]
    }

    /// The full data URI.
    pub fn as_str(&self) -> &str {
        &self.uri
    }

    pub fn into_string(self) -> String {
        self.uri
    }

    /// Decoded size in bytes, computed without decoding.
    pub fn decoded_len(&self) -> usize {
        let p = self.payload();
        let padding = p.bytes().rev().take_while(|b| *b == b'=').count();
        (p.len() / 4) * 3 - padding.min(2)
    }

    /// Decode the payload back to raw bytes.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.payload())
    }

    /// Attachment for a multimodal chat message.
    ///
    /// `detail: "high"` makes GPT-4-class models use the full tile budget;
    /// handwritten claim forms lose their fine print at low detail.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.payload().to_string(), self.mime_type()).with_detail("high")
    }
}

impl fmt::Debug for EncodedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedDocument")
            .field("mime_type", &self.mime_type())
            .field("payload_len", &self.payload().len())
            .finish()
    }
}

impl fmt::Display for EncodedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Encode a rendered page (or a converted scan) as a base64 PNG attachment.
///
/// PNG is lossless; JPEG artefacts around small handwriting hurt OCR more
/// than the larger payload costs.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} page → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Sniff the MIME type of a document from its leading bytes.
///
/// Returns `None` for anything that is neither a PDF nor an image format
/// the models accept.
pub fn sniff_mime_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"%PDF") {
        return Some("application/pdf");
    }
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Tiff => Some("image/tiff"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::Bmp => Some("image/bmp"),
        _ => None,
    }
}

/// Encode a document's bytes as a data URI, sniffing the MIME type.
///
/// `source_name` is only used in error messages.
pub fn encode_document(bytes: &[u8], source_name: &str) -> Result<EncodedDocument, DigitizeError> {
    let mime = sniff_mime_type(bytes).ok_or_else(|| DigitizeError::UnsupportedDocument {
        source_name: source_name.to_string(),
        magic: bytes.iter().take(8).copied().collect(),
    })?;

    let doc = EncodedDocument::from_bytes(bytes, mime);
    debug!(
        "Encoded {} ({}, {} bytes) → {} bytes base64",
        source_name,
        mime,
        bytes.len(),
        doc.payload().len()
    );
    Ok(doc)
}

//! Pipeline stages for FRA document digitization.
//!
//! Each submodule implements one step around the model calls. The
//! sequencing of those steps lives in [`crate::orchestrator`].
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ render ──▶ llm (extract → normalize → recognize) ──▶ resolve ──▶ llm (structure)
//! (path/URL) (data URI) (PNG pages)                                        (keywords)
//! ```
//!
//! 1. [`input`]       : read a local file, download a URL, or accept a data URI
//! 2. [`encode`]      : sniff the MIME type and wrap bytes as a base64 data URI
//! 3. [`render`]      : rasterise PDFs and re-encode TIFF/BMP into attachable images
//! 4. [`llm`]         : the four model-backed capabilities
//! 5. [`postprocess`] : recover JSON from model replies, tidy extracted text
//! 6. [`resolve`]     : keyword table mapping entity labels onto record fields

pub mod encode;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod render;
pub mod resolve;

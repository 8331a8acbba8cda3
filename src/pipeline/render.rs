//! Attachment preparation: turn an [`EncodedDocument`] into images a
//! multimodal model accepts.
//!
//! Vision APIs take PNG, JPEG, GIF and WebP inline. Anything else is
//! converted first:
//!
//! * **PDF**: every page (up to `max_pages`) is rasterised with pdfium and
//!   re-encoded as PNG.
//! * **TIFF / BMP**: decoded with `image` and re-encoded as PNG.
//!
//! Both run inside `spawn_blocking`: pdfium and the image decoders are
//! CPU-bound and would stall the Tokio worker threads.
//!
//! ## Pixel cap
//!
//! `max_rendered_pixels` caps the longest edge regardless of physical page
//! size. A 600 DPI A4 scan is about 5 000 × 7 000 px; vision models resample
//! anything past roughly 2 000 px anyway.

use crate::config::DigitizerConfig;
use crate::error::DigitizeError;
use crate::pipeline::encode::{encode_page, EncodedDocument};
use edgequake_llm::ImageData;
use image::imageops::FilterType;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

pub const PDF_MIME: &str = "application/pdf";

/// Image types re-encoded as PNG before they are attached.
const CONVERTED_MIMES: [&str; 2] = ["image/tiff", "image/bmp"];

/// Bounds on what a single document may expand into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderLimits {
    pub max_pages: usize,
    pub max_pixels: u32,
}

impl RenderLimits {
    pub fn from_config(config: &DigitizerConfig) -> Self {
        Self {
            max_pages: config.max_pages,
            max_pixels: config.max_rendered_pixels,
        }
    }
}

impl Default for RenderLimits {
    fn default() -> Self {
        Self::from_config(&DigitizerConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plan {
    /// Already a type the APIs accept.
    Direct,
    /// Decode and re-encode as PNG.
    Convert,
    /// Render the pages with pdfium.
    Rasterise,
}

fn plan(mime_type: &str) -> Result<Plan, DigitizeError> {
    if mime_type == PDF_MIME {
        Ok(Plan::Rasterise)
    } else if CONVERTED_MIMES.contains(&mime_type) {
        Ok(Plan::Convert)
    } else if ImageData::new(String::new(), mime_type).is_supported_mime() {
        Ok(Plan::Direct)
    } else {
        Err(DigitizeError::UnsupportedAttachment {
            mime_type: mime_type.to_string(),
        })
    }
}

/// Fail early when `doc` could never be attached.
///
/// Checks the MIME type and, for PDFs, that a pdfium library can be bound.
/// Nothing is rendered.
pub async fn check_attachable(doc: &EncodedDocument) -> Result<(), DigitizeError> {
    if plan(doc.mime_type())? != Plan::Rasterise {
        return Ok(());
    }
    tokio::task::spawn_blocking(|| bind_pdfium().map(|_| ()))
        .await
        .map_err(|e| DigitizeError::Internal(format!("Render task panicked: {}", e)))?
}

/// Produce the extraction attachments for `doc`: one image per page.
///
/// Every returned [`ImageData`] passes `is_supported_mime()`.
pub async fn prepare_attachments(
    doc: &EncodedDocument,
    limits: RenderLimits,
) -> Result<Vec<ImageData>, DigitizeError> {
    let plan = plan(doc.mime_type())?;
    let attachments = match plan {
        Plan::Direct => vec![doc.to_image_data()],
        Plan::Convert | Plan::Rasterise => {
            let bytes = doc
                .decode()
                .map_err(|e| DigitizeError::Internal(format!("attachment payload: {e}")))?;

            let pages = tokio::task::spawn_blocking(move || match plan {
                Plan::Rasterise => rasterise_pdf_blocking(&bytes, limits),
                _ => convert_image_blocking(&bytes, limits.max_pixels).map(|img| vec![img]),
            })
            .await
            .map_err(|e| DigitizeError::Internal(format!("Render task panicked: {}", e)))??;

            pages
                .iter()
                .enumerate()
                .map(|(i, img)| {
                    encode_page(img).map_err(|e| DigitizeError::RasterisationFailed {
                        page: i + 1,
                        detail: e.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    if let Some(bad) = attachments.iter().find(|a| !a.is_supported_mime()) {
        return Err(DigitizeError::UnsupportedAttachment {
            mime_type: bad.mime_type.clone(),
        });
    }

    info!(
        "Prepared {} attachment(s) from {} document",
        attachments.len(),
        doc.mime_type()
    );
    Ok(attachments)
}

/// Bind pdfium: `PDFIUM_LIB_PATH` first, then the working directory, then
/// the system library path.
fn bind_pdfium() -> Result<Pdfium, DigitizeError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path).map_err(|e| {
            DigitizeError::PdfiumBindingFailed(format!("PDFIUM_LIB_PATH={path}: {e:?}"))
        })?,
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| DigitizeError::PdfiumBindingFailed(format!("{e:?}")))?,
    };
    Ok(Pdfium::new(bindings))
}

fn rasterise_pdf_blocking(
    bytes: &[u8],
    limits: RenderLimits,
) -> Result<Vec<DynamicImage>, DigitizeError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
        let detail = format!("{:?}", e);
        if detail.contains("Password") || detail.contains("password") {
            DigitizeError::PasswordRequired
        } else {
            DigitizeError::CorruptPdf { detail }
        }
    })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(DigitizeError::CorruptPdf {
            detail: "document has no pages".to_string(),
        });
    }
    if total_pages > limits.max_pages {
        warn!(
            "PDF has {} pages; only the first {} are sent",
            total_pages, limits.max_pages
        );
    }
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new()
        .set_target_width(limits.max_pixels as i32)
        .set_maximum_height(limits.max_pixels as i32);

    let count = total_pages.min(limits.max_pages);
    let mut images = Vec::with_capacity(count);
    for idx in 0..count {
        let page = pages
            .get(idx as u16)
            .map_err(|e| DigitizeError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            DigitizeError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    Ok(images)
}

fn convert_image_blocking(bytes: &[u8], max_pixels: u32) -> Result<DynamicImage, DigitizeError> {
    let img = image::load_from_memory(bytes).map_err(|e| DigitizeError::RasterisationFailed {
        page: 1,
        detail: e.to_string(),
    })?;
    debug!("Decoded scan {}x{} px", img.width(), img.height());
    Ok(fit_within(img, max_pixels))
}

/// Shrink `img` so its longest edge is at most `max_pixels`, keeping the
/// aspect ratio. Smaller images are returned untouched.
fn fit_within(img: DynamicImage, max_pixels: u32) -> DynamicImage {
    if img.width().max(img.height()) <= max_pixels {
        return img;
    }
    img.resize(max_pixels, max_pixels, FilterType::Lanczos3)
}

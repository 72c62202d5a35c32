//! PDF capabilities: native text layer, embedded raster images, and
//! full-page rasterization for the terminal OCR fallback.
//!
//! PDFium is dynamically linked and bound fresh per call; handles never
//! cross threads, so decoded bitmaps are handed back to the caller for
//! any parallel OCR work.

use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use crate::error::ExtractionError;

/// One decodable raster image pulled out of a PDF page.
pub struct EmbeddedPdfImage {
    /// 1-based page number the image came from.
    pub page: u32,
    /// 1-based position of the image within its page.
    pub index: u32,
    pub image: DynamicImage,
}

/// Bind to a PDFium library, preferring local copies over the system one.
fn create_pdfium() -> Result<Pdfium, ExtractionError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "./vendor/pdfium/lib/",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| {
            ExtractionError::PdfiumUnavailable(format!(
                "failed to load PDFium library (install libpdfium or place it next to the binary): {e:?}"
            ))
        })?;

    Ok(Pdfium::new(bindings))
}

/// Number of pages, or an error when the bytes are not an openable PDF.
pub fn page_count(bytes: &[u8]) -> Result<usize, ExtractionError> {
    let pdfium = create_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| ExtractionError::DocumentOpen(format!("{e:?}")))?;
    Ok(document.pages().len() as usize)
}

/// Extract the native text layer, one newline-terminated block per page
/// that has one. Pages without a text layer contribute nothing.
pub fn native_text(bytes: &[u8], diagnostics: &mut Vec<String>) -> Result<String, ExtractionError> {
    let pdfium = create_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| ExtractionError::DocumentOpen(format!("{e:?}")))?;

    let mut text = String::new();
    for (page_index, page) in document.pages().iter().enumerate() {
        let page_num = page_index + 1;
        match page.text() {
            Ok(page_text) => {
                let all = page_text.all();
                let trimmed = all.trim();
                if !trimmed.is_empty() {
                    debug!(page = page_num, chars = trimmed.len(), "Native page text");
                    text.push_str(&all);
                    text.push('\n');
                }
            }
            Err(e) => {
                warn!(page = page_num, error = ?e, "Failed to read page text layer");
                diagnostics.push(format!("page {page_num}: text layer unreadable: {e:?}"));
            }
        }
    }

    Ok(text)
}

/// Enumerate the embedded raster images of every page. Only grayscale and
/// RGB bitmaps (channels minus alpha below 4) are kept; exotic color
/// spaces are skipped silently, failed decodes are skipped with a
/// diagnostic. A failed page never affects its siblings.
pub fn embedded_images(
    bytes: &[u8],
    diagnostics: &mut Vec<String>,
) -> Result<Vec<EmbeddedPdfImage>, ExtractionError> {
    let pdfium = create_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| ExtractionError::DocumentOpen(format!("{e:?}")))?;

    let mut images = Vec::new();
    for (page_index, page) in document.pages().iter().enumerate() {
        let page_num = (page_index + 1) as u32;
        let mut index_on_page = 0u32;

        for object in page.objects().iter() {
            let Some(image_object) = object.as_image_object() else {
                continue;
            };
            index_on_page += 1;

            match image_object.get_raw_image() {
                Ok(image) => {
                    if !is_supported_color(&image) {
                        debug!(
                            page = page_num,
                            image = index_on_page,
                            color = ?image.color(),
                            "Skipping image in unsupported color space"
                        );
                        continue;
                    }
                    images.push(EmbeddedPdfImage {
                        page: page_num,
                        index: index_on_page,
                        image,
                    });
                }
                Err(e) => {
                    warn!(
                        page = page_num,
                        image = index_on_page,
                        error = ?e,
                        "Failed to decode embedded image"
                    );
                    diagnostics.push(format!(
                        "image {index_on_page} on page {page_num} failed to decode: {e:?}"
                    ));
                }
            }
        }
    }

    Ok(images)
}

/// Grayscale or RGB, with or without alpha. CMYK and friends are out.
fn is_supported_color(image: &DynamicImage) -> bool {
    let color = image.color();
    let channels = color.channel_count();
    let alpha = if color.has_alpha() { 1 } else { 0 };
    channels - alpha < 4
}

/// Render every page to a bitmap at the given DPI. Returns `(page, image)`
/// pairs in page order; a page that fails to render is skipped with a
/// diagnostic.
pub fn rasterize_pages(
    bytes: &[u8],
    dpi: f32,
    diagnostics: &mut Vec<String>,
) -> Result<Vec<(u32, DynamicImage)>, ExtractionError> {
    let pdfium = create_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| ExtractionError::DocumentOpen(format!("{e:?}")))?;

    // PDF points are 72 per inch.
    let scale = dpi / 72.0;

    let mut pages = Vec::new();
    for (page_index, page) in document.pages().iter().enumerate() {
        let page_num = (page_index + 1) as u32;
        let pixel_width = (page.width().value * scale) as i32;
        let pixel_height = (page.height().value * scale) as i32;

        let render = page.render_with_config(
            &PdfRenderConfig::new()
                .set_target_width(pixel_width)
                .set_target_height(pixel_height)
                .render_form_data(true)
                .render_annotations(true),
        );

        match render {
            Ok(bitmap) => pages.push((page_num, bitmap.as_image())),
            Err(e) => {
                warn!(page = page_num, error = ?e, "Failed to rasterize page");
                diagnostics.push(format!("page {page_num} failed to rasterize: {e:?}"));
            }
        }
    }

    Ok(pages)
}

//! Pre-flight content validation. Runs before any extraction and never
//! panics on malformed input; an invalid document is reported with a
//! human-readable reason that the API surfaces verbatim. A corrupt
//! container and a well-formed-but-empty document get distinct reasons.

use std::time::Duration;

use image::GenericImageView;

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::extract::{DocumentFormat, docx, pdf, pptx};

/// Minimum width and height for a standalone image upload.
const MIN_IMAGE_DIMENSION: u32 = 50;

/// Validation outcome. `reason` is empty when `valid` is true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub valid: bool,
    pub reason: String,
}

impl Verdict {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: String::new(),
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
        }
    }
}

/// Validate raw bytes against their declared format. Pure with respect to
/// its inputs: the same bytes always produce the same verdict.
pub fn validate(bytes: &[u8], format: DocumentFormat, config: &ExtractionConfig) -> Verdict {
    if bytes.is_empty() {
        return Verdict::fail("File is empty");
    }

    match format {
        DocumentFormat::Pdf => validate_pdf(bytes),
        DocumentFormat::Docx => validate_docx(bytes),
        DocumentFormat::Doc => validate_doc(bytes, config),
        DocumentFormat::Pptx => validate_pptx(bytes),
        DocumentFormat::Image => validate_image(bytes),
    }
}

fn validate_pdf(bytes: &[u8]) -> Verdict {
    match pdf::page_count(bytes) {
        Ok(0) => Verdict::fail("PDF contains no pages"),
        Ok(_) => Verdict::ok(),
        Err(ExtractionError::PdfiumUnavailable(_)) => {
            Verdict::fail("PDF processing engine is unavailable on this host")
        }
        Err(_) => Verdict::fail("PDF could not be opened (corrupt or password protected)"),
    }
}

fn validate_docx(bytes: &[u8]) -> Verdict {
    match docx::native_text(bytes) {
        Ok(text) if text.is_empty() => Verdict::fail("DOCX contains no text content"),
        Ok(_) => Verdict::ok(),
        Err(_) => Verdict::fail("DOCX could not be opened (corrupt archive)"),
    }
}

fn validate_doc(bytes: &[u8], config: &ExtractionConfig) -> Verdict {
    if !docx::is_ole_container(bytes) {
        return Verdict::fail("DOC file is not a valid Word document");
    }
    let timeout = Duration::from_secs(config.ocr_timeout_secs);
    match docx::legacy_doc_text(bytes, timeout) {
        Ok(text) if text.trim().is_empty() => Verdict::fail("DOC contains no extractable text"),
        Ok(_) => Verdict::ok(),
        Err(_) => Verdict::fail("DOC could not be converted to text"),
    }
}

fn validate_pptx(bytes: &[u8]) -> Verdict {
    match pptx::slide_texts(bytes) {
        Ok(slides) => {
            if slides.iter().any(|s| s.has_text()) {
                Verdict::ok()
            } else {
                Verdict::fail("PPTX contains no text in any slide")
            }
        }
        Err(_) => Verdict::fail("PPTX could not be opened (corrupt archive or no slides)"),
    }
}

fn validate_image(bytes: &[u8]) -> Verdict {
    let image = match image::load_from_memory(bytes) {
        Ok(image) => image,
        Err(_) => {
            return Verdict::fail("Image could not be decoded (corrupt or unsupported encoding)");
        }
    };

    let (width, height) = image.dimensions();
    if width < MIN_IMAGE_DIMENSION || height < MIN_IMAGE_DIMENSION {
        return Verdict::fail(format!(
            "Image is too small for reliable text extraction \
             ({width}x{height}, minimum {MIN_IMAGE_DIMENSION}x{MIN_IMAGE_DIMENSION})"
        ));
    }

    let gray = image.to_luma8();
    let mut min = u8::MAX;
    let mut max = u8::MIN;
    for pixel in gray.pixels() {
        min = min.min(pixel.0[0]);
        max = max.max(pixel.0[0]);
    }
    if min == max {
        return Verdict::fail("Image is blank (single intensity value, no content to extract)");
    }

    Verdict::ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma};
    use std::io::Cursor;

    fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    fn config() -> ExtractionConfig {
        ExtractionConfig::default()
    }

    #[test]
    fn test_empty_bytes_rejected_for_every_format() {
        for format in [
            DocumentFormat::Pdf,
            DocumentFormat::Doc,
            DocumentFormat::Docx,
            DocumentFormat::Pptx,
            DocumentFormat::Image,
        ] {
            let verdict = validate(b"", format, &config());
            assert!(!verdict.valid);
            assert_eq!(verdict.reason, "File is empty");
        }
    }

    #[test]
    fn test_blank_image_rejected() {
        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 200, Luma([255])));
        let verdict = validate(&png_bytes(&blank), DocumentFormat::Image, &config());
        assert!(!verdict.valid);
        assert!(verdict.reason.contains("blank"));
    }

    #[test]
    fn test_small_image_rejected() {
        let small = DynamicImage::ImageLuma8(GrayImage::from_fn(30, 30, |x, _| {
            Luma([if x % 2 == 0 { 0 } else { 255 }])
        }));
        let verdict = validate(&png_bytes(&small), DocumentFormat::Image, &config());
        assert!(!verdict.valid);
        assert!(verdict.reason.contains("too small"));
    }

    #[test]
    fn test_textured_image_accepted() {
        let textured = DynamicImage::ImageLuma8(GrayImage::from_fn(100, 100, |x, y| {
            Luma([if (x + y) % 2 == 0 { 0 } else { 255 }])
        }));
        let verdict = validate(&png_bytes(&textured), DocumentFormat::Image, &config());
        assert!(verdict.valid);
        assert!(verdict.reason.is_empty());
    }

    #[test]
    fn test_garbage_image_rejected() {
        let verdict = validate(b"not an image", DocumentFormat::Image, &config());
        assert!(!verdict.valid);
        assert!(verdict.reason.contains("decoded"));
    }

    #[test]
    fn test_docx_with_text_accepted() {
        let bytes = docx::tests::docx_bytes("<w:p><w:r><w:t>Hello world</w:t></w:r></w:p>");
        let verdict = validate(&bytes, DocumentFormat::Docx, &config());
        assert!(verdict.valid);
    }

    #[test]
    fn test_docx_without_text_rejected() {
        let bytes = docx::tests::docx_bytes("<w:p/>");
        let verdict = validate(&bytes, DocumentFormat::Docx, &config());
        assert!(!verdict.valid);
        assert!(verdict.reason.contains("no text content"));
    }

    #[test]
    fn test_corrupt_docx_gets_distinct_reason() {
        let verdict = validate(b"not a zip archive", DocumentFormat::Docx, &config());
        assert!(!verdict.valid);
        assert!(verdict.reason.contains("corrupt"));
    }

    #[test]
    fn test_pptx_with_shape_text_accepted() {
        let bytes = pptx::tests::pptx_bytes(&[&["Slide title"]]);
        let verdict = validate(&bytes, DocumentFormat::Pptx, &config());
        assert!(verdict.valid);
    }

    #[test]
    fn test_pptx_without_shape_text_rejected() {
        let bytes = pptx::tests::pptx_bytes(&[&[], &[]]);
        let verdict = validate(&bytes, DocumentFormat::Pptx, &config());
        assert!(!verdict.valid);
        assert!(verdict.reason.contains("no text"));
    }

    #[test]
    fn test_doc_without_ole_magic_rejected() {
        let verdict = validate(b"plain text pretending to be doc", DocumentFormat::Doc, &config());
        assert!(!verdict.valid);
        assert!(verdict.reason.contains("not a valid Word document"));
    }

    #[test]
    fn test_validation_is_idempotent() {
        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(80, 80, Luma([7])));
        let bytes = png_bytes(&blank);
        let first = validate(&bytes, DocumentFormat::Image, &config());
        let second = validate(&bytes, DocumentFormat::Image, &config());
        assert_eq!(first, second);
    }
}

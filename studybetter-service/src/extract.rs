//! Text-extraction cascade.
//!
//! Dispatches by declared format and walks the fallback tiers: native
//! text layer first, embedded-image OCR second, full-page raster OCR
//! last (PDF only). Stage transitions are sequential because each
//! trigger depends on the accumulated text so far; the OCR work inside
//! a stage fans out across a rayon pool and re-joins in unit order.
//!
//! `extract` is deliberately infallible. A capability failing on one
//! unit or one document is logged, recorded as a diagnostic, and
//! treated as "contributed no text". Running out of text entirely is a
//! normal outcome, not an error; the API layer decides how to report it.

pub mod docx;
pub mod ocr;
pub mod pdf;
pub mod pptx;
pub mod preprocess;
pub mod validate;

use std::fmt;
use std::mem;
use std::time::Duration;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;
use validate::Verdict;

/// Declared upload format, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Doc,
    Docx,
    Pptx,
    Image,
}

impl DocumentFormat {
    /// Map a file extension (case-insensitive) to a format. `None` means
    /// the upload is unsupported.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "doc" => Some(Self::Doc),
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            "png" | "jpg" | "jpeg" | "tiff" | "bmp" => Some(Self::Image),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pdf => "pdf",
            Self::Doc => "doc",
            Self::Docx => "docx",
            Self::Pptx => "pptx",
            Self::Image => "image",
        };
        write!(f, "{name}")
    }
}

/// Borrowed handle to the upload being extracted. Never mutated and never
/// retained beyond the extraction call.
pub struct SourceDocument<'a> {
    pub bytes: &'a [u8],
    pub format: DocumentFormat,
}

/// Final accumulated text plus per-unit diagnostics. Diagnostics are
/// informational; an empty `text` with populated diagnostics is how a
/// document that defeated every tier looks.
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    pub text: String,
    pub diagnostics: Vec<String>,
}

/// The cascade engine. Cheap to clone; holds only policy parameters.
#[derive(Debug, Clone)]
pub struct Extractor {
    config: ExtractionConfig,
}

impl Extractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Pre-flight validation; see [`validate::validate`]. The API layer
    /// surfaces a failing verdict's reason verbatim and never calls
    /// [`Extractor::extract`] for that document.
    pub fn validate(&self, document: &SourceDocument<'_>) -> Verdict {
        validate::validate(document.bytes, document.format, &self.config)
    }

    /// Run the full cascade. Never fails; the outcome text may be empty.
    pub fn extract(&self, document: &SourceDocument<'_>) -> ExtractionOutcome {
        let mut outcome = ExtractionOutcome::default();

        match document.format {
            DocumentFormat::Pdf => self.extract_pdf(document.bytes, &mut outcome),
            DocumentFormat::Docx => self.extract_docx(document.bytes, &mut outcome),
            DocumentFormat::Doc => self.extract_doc(document.bytes, &mut outcome),
            DocumentFormat::Pptx => self.extract_pptx(document.bytes, &mut outcome),
            DocumentFormat::Image => self.extract_image(document.bytes, &mut outcome),
        }

        info!(
            format = %document.format,
            chars = outcome.text.trim().len(),
            diagnostics = outcome.diagnostics.len(),
            "Extraction finished"
        );
        outcome
    }

    fn needs_fallback(&self, text: &str) -> bool {
        text.trim().len() < self.config.min_native_text_len
    }

    fn note_engine_unavailable(&self, outcome: &mut ExtractionOutcome) {
        outcome
            .diagnostics
            .push("OCR engine unavailable; image-derived text skipped".to_string());
    }

    // ---------------- PDF ----------------

    fn extract_pdf(&self, bytes: &[u8], outcome: &mut ExtractionOutcome) {
        // Stage 1: native text layer.
        match pdf::native_text(bytes, &mut outcome.diagnostics) {
            Ok(text) => outcome.text = text,
            Err(e) => {
                warn!(error = %e, "PDF native text extraction failed");
                outcome.diagnostics.push(format!("native text: {e}"));
            }
        }

        // Stage 2: embedded-image OCR, always additive for PDF. Scanned
        // figures commonly supplement a partially text-native page.
        if ocr::engine().is_some() {
            let image_text = self.pdf_embedded_ocr(bytes, outcome);
            if !image_text.is_empty() {
                outcome.text.push_str("\n=== TEXT FROM IMAGES ===\n");
                outcome.text.push_str(&image_text);
            }
        }

        // Stage 3: full-page raster OCR, total replacement. Only when the
        // combined text so far is still insignificant.
        if self.needs_fallback(&outcome.text) {
            if ocr::engine().is_none() {
                self.note_engine_unavailable(outcome);
                return;
            }
            debug!("Combined PDF text insufficient; rasterizing pages");
            let fallback = self.pdf_full_page_ocr(bytes, outcome);
            outcome.text = resolve_fallback(mem::take(&mut outcome.text), fallback);
        }
    }

    fn pdf_embedded_ocr(&self, bytes: &[u8], outcome: &mut ExtractionOutcome) -> String {
        let images = match pdf::embedded_images(bytes, &mut outcome.diagnostics) {
            Ok(images) => images,
            Err(e) => {
                warn!(error = %e, "PDF embedded image enumeration failed");
                outcome.diagnostics.push(format!("embedded images: {e}"));
                return String::new();
            }
        };

        debug!(count = images.len(), "Embedded PDF images to OCR");
        let recognized: Vec<(u32, u32, String)> = images
            .par_iter()
            .map(|embedded| {
                let text = ocr::recognize_best(&embedded.image, &self.config);
                (embedded.page, embedded.index, text)
            })
            .collect();

        image_sections(&recognized)
    }

    fn pdf_full_page_ocr(&self, bytes: &[u8], outcome: &mut ExtractionOutcome) -> String {
        let pages =
            match pdf::rasterize_pages(bytes, self.config.raster_dpi, &mut outcome.diagnostics) {
                Ok(pages) => pages,
                Err(e) => {
                    warn!(error = %e, "PDF rasterization failed");
                    outcome.diagnostics.push(format!("page rasterization: {e}"));
                    return String::new();
                }
            };

        let recognized: Vec<(u32, String)> = pages
            .par_iter()
            .map(|(page, image)| (*page, ocr::recognize_best(image, &self.config)))
            .collect();

        page_ocr_sections(&recognized)
    }

    // ---------------- DOCX ----------------

    fn extract_docx(&self, bytes: &[u8], outcome: &mut ExtractionOutcome) {
        match docx::native_text(bytes) {
            Ok(text) => outcome.text = text.combined(),
            Err(e) => {
                warn!(error = %e, "DOCX native text extraction failed");
                outcome.diagnostics.push(format!("native text: {e}"));
            }
        }

        if !self.needs_fallback(&outcome.text) {
            return;
        }

        // Native text insignificant: the document's primary content is
        // probably inside its images. A non-empty OCR result replaces the
        // native remnant entirely.
        if ocr::engine().is_none() {
            self.note_engine_unavailable(outcome);
            return;
        }

        let ocr_text = self.media_ocr(bytes, "word/media/", "DOCX", outcome);
        outcome.text = resolve_fallback(mem::take(&mut outcome.text), ocr_text);
    }

    // ---------------- DOC ----------------

    fn extract_doc(&self, bytes: &[u8], outcome: &mut ExtractionOutcome) {
        let timeout = Duration::from_secs(self.config.ocr_timeout_secs);
        match docx::legacy_doc_text(bytes, timeout) {
            Ok(text) => outcome.text = text,
            Err(e) => {
                warn!(error = %e, "Legacy DOC conversion failed");
                outcome.diagnostics.push(format!("doc conversion: {e}"));
            }
        }

        if self.config.doc_embedded_ocr {
            // The legacy container exposes no addressable media entries.
            outcome
                .diagnostics
                .push("doc_embedded_ocr is enabled but DOC has no addressable media".to_string());
        }
    }

    // ---------------- PPTX ----------------

    fn extract_pptx(&self, bytes: &[u8], outcome: &mut ExtractionOutcome) {
        match pptx::slide_texts(bytes) {
            Ok(slides) => outcome.text = pptx::assemble(&slides),
            Err(e) => {
                warn!(error = %e, "PPTX native text extraction failed");
                outcome.diagnostics.push(format!("native text: {e}"));
            }
        }

        if !self.needs_fallback(&outcome.text) {
            return;
        }

        if ocr::engine().is_none() {
            self.note_engine_unavailable(outcome);
            return;
        }

        let ocr_text = self.media_ocr(bytes, "ppt/media/", "PPTX", outcome);
        outcome.text = resolve_fallback(mem::take(&mut outcome.text), ocr_text);
    }

    /// Shared embedded-image OCR pass for the OOXML archive formats.
    /// Entries that fail to decode are skipped with a diagnostic.
    fn media_ocr(
        &self,
        bytes: &[u8],
        prefix: &str,
        format_label: &str,
        outcome: &mut ExtractionOutcome,
    ) -> String {
        let entries = match docx::media_entries(bytes, prefix) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Media enumeration failed");
                outcome.diagnostics.push(format!("media entries: {e}"));
                return String::new();
            }
        };

        let mut decoded = Vec::with_capacity(entries.len());
        for (name, data) in entries {
            match image::load_from_memory(&data) {
                Ok(image) => decoded.push((name, image)),
                Err(e) => {
                    debug!(entry = %name, error = %e, "Media entry is not a decodable image");
                    outcome
                        .diagnostics
                        .push(format!("media entry {name} failed to decode: {e}"));
                }
            }
        }

        let recognized: Vec<(String, String)> = decoded
            .par_iter()
            .map(|(name, image)| (name.clone(), ocr::recognize_best(image, &self.config)))
            .collect();

        media_sections(format_label, &recognized)
    }

    // ---------------- standalone image ----------------

    fn extract_image(&self, bytes: &[u8], outcome: &mut ExtractionOutcome) {
        let image = match image::load_from_memory(bytes) {
            Ok(image) => image,
            Err(e) => {
                warn!(error = %e, "Image decode failed");
                outcome.diagnostics.push(format!("image decode: {e}"));
                return;
            }
        };

        if ocr::engine().is_none() {
            self.note_engine_unavailable(outcome);
            return;
        }

        outcome.text = ocr::recognize_best(&image, &self.config);
    }
}

/// A fallback tier that produced text supersedes everything accumulated
/// before it; one that produced nothing leaves the prior text untouched.
fn resolve_fallback(prior: String, fallback: String) -> String {
    if fallback.trim().is_empty() {
        prior
    } else {
        fallback
    }
}

/// Provenance-labeled sections for embedded-image OCR results, in unit
/// order. Images that yielded no text contribute nothing.
fn image_sections(results: &[(u32, u32, String)]) -> String {
    let mut out = String::new();
    for (page, index, text) in results {
        if !text.is_empty() {
            out.push_str(&format!("\n[Image {index} from Page {page}]:\n{text}\n"));
        }
    }
    out
}

/// Labeled sections for full-page raster OCR results, in page order.
fn page_ocr_sections(results: &[(u32, String)]) -> String {
    let mut out = String::new();
    for (page, text) in results {
        if !text.is_empty() {
            out.push_str(&format!("\n[Page {page} OCR]:\n{text}\n"));
        }
    }
    out
}

/// Labeled sections for OOXML media-entry OCR results, archive order.
fn media_sections(format_label: &str, results: &[(String, String)]) -> String {
    let mut out = String::new();
    for (name, text) in results {
        if !text.is_empty() {
            out.push_str(&format!("\n[Image from {format_label}: {name}]:\n{text}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma};
    use std::io::Cursor;

    fn extractor() -> Extractor {
        Extractor::new(ExtractionConfig::default())
    }

    fn docx_paragraphs(lines: &[&str]) -> Vec<u8> {
        let body: String = lines
            .iter()
            .map(|line| format!("<w:p><w:r><w:t>{line}</w:t></w:r></w:p>"))
            .collect();
        docx::tests::docx_bytes(&body)
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(DocumentFormat::from_extension("pdf"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("doc"), Some(DocumentFormat::Doc));
        assert_eq!(DocumentFormat::from_extension("docx"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_extension("pptx"), Some(DocumentFormat::Pptx));
        for ext in ["png", "jpg", "jpeg", "tiff", "bmp", "JPEG"] {
            assert_eq!(DocumentFormat::from_extension(ext), Some(DocumentFormat::Image));
        }
        assert_eq!(DocumentFormat::from_extension("exe"), None);
        assert_eq!(DocumentFormat::from_extension(""), None);
    }

    #[test]
    fn test_extract_never_panics_on_garbage() {
        // DOC is covered separately; a permissive converter on the host
        // could echo plain bytes back as text.
        let formats = [
            DocumentFormat::Pdf,
            DocumentFormat::Docx,
            DocumentFormat::Pptx,
            DocumentFormat::Image,
        ];
        for format in formats {
            let document = SourceDocument {
                bytes: b"\x00\x01\x02 not any known container \x03\x04",
                format,
            };
            let outcome = extractor().extract(&document);
            assert!(outcome.text.trim().is_empty(), "{format} yielded text from garbage");
            assert!(!outcome.diagnostics.is_empty(), "{format} produced no diagnostics");
        }
    }

    #[test]
    fn test_doc_extraction_never_panics() {
        let document = SourceDocument {
            bytes: b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1 truncated compound file",
            format: DocumentFormat::Doc,
        };
        // Outcome depends on which converters the host carries; the only
        // guarantee is that the call completes.
        let _ = extractor().extract(&document);
    }

    #[test]
    fn test_docx_long_native_text_skips_fallback() {
        let bytes = docx_paragraphs(&[
            "This paragraph alone is comfortably longer than fifty characters of content.",
        ]);
        let document = SourceDocument {
            bytes: &bytes,
            format: DocumentFormat::Docx,
        };
        let outcome = extractor().extract(&document);
        assert!(outcome.text.contains("comfortably longer"));
        // Above the threshold, the fallback tier never runs and no engine
        // diagnostic appears even on hosts without one.
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_docx_short_table_answer_survives() {
        // Short native text triggers the fallback tier, but with no media
        // entries there is nothing to replace it with.
        let body = "<w:tbl><w:tr><w:tc><w:p><w:r><w:t>Answer: 42</w:t></w:r></w:p></w:tc></w:tr></w:tbl>";
        let bytes = docx::tests::docx_bytes(body);
        let document = SourceDocument {
            bytes: &bytes,
            format: DocumentFormat::Docx,
        };
        let outcome = extractor().extract(&document);
        assert_eq!(outcome.text, "Answer: 42\n");
    }

    #[test]
    fn test_pptx_without_text_yields_empty_outcome() {
        let bytes = pptx::tests::pptx_bytes(&[&[], &[]]);
        let document = SourceDocument {
            bytes: &bytes,
            format: DocumentFormat::Pptx,
        };
        let outcome = extractor().extract(&document);
        assert!(outcome.text.trim().is_empty());
    }

    #[test]
    fn test_pptx_native_text_assembled_with_markers() {
        let bytes = pptx::tests::pptx_bytes(&[
            &["Photosynthesis overview, part one of the lecture series"],
            &["Light-dependent reactions happen in the thylakoid membrane"],
        ]);
        let document = SourceDocument {
            bytes: &bytes,
            format: DocumentFormat::Pptx,
        };
        let outcome = extractor().extract(&document);
        assert!(outcome.text.contains("=== SLIDE 1 ==="));
        assert!(outcome.text.contains("=== SLIDE 2 ==="));
        assert!(outcome.text.contains("thylakoid membrane"));
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_image_decode_failure_is_a_diagnostic() {
        let document = SourceDocument {
            bytes: b"\x89PNG but truncated",
            format: DocumentFormat::Image,
        };
        let outcome = extractor().extract(&document);
        assert!(outcome.text.is_empty());
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(outcome.diagnostics[0].contains("image decode"));
    }

    #[test]
    fn test_nonempty_fallback_replaces_prior_text_entirely() {
        let prior = "Short".to_string();
        let fallback = "\n[Image from DOCX: word/media/image1.png]:\nThe real content lives in this scanned figure\n"
            .to_string();
        let resolved = resolve_fallback(prior, fallback.clone());
        assert_eq!(resolved, fallback);
        assert!(!resolved.contains("Short"));
    }

    #[test]
    fn test_empty_fallback_keeps_prior_text() {
        let resolved = resolve_fallback("Answer: 42\n".to_string(), "  \n\t ".to_string());
        assert_eq!(resolved, "Answer: 42\n");
        assert_eq!(resolve_fallback(String::new(), String::new()), "");
    }

    #[test]
    fn test_embedded_image_sections_label_by_page_and_index() {
        // One scanned image per page; a silent third image leaves no trace.
        let results = vec![
            (1, 1, "Scanned content".to_string()),
            (2, 1, "Scanned content".to_string()),
            (2, 2, String::new()),
        ];
        let text = image_sections(&results);
        assert!(text.contains("\n[Image 1 from Page 1]:\nScanned content\n"));
        assert!(text.contains("\n[Image 1 from Page 2]:\nScanned content\n"));
        assert!(!text.contains("[Image 2 from Page 2]"));
    }

    #[test]
    fn test_page_ocr_sections_skip_silent_pages() {
        let results = vec![
            (1, "Alpha".to_string()),
            (2, String::new()),
            (3, "Gamma".to_string()),
        ];
        let text = page_ocr_sections(&results);
        assert!(text.contains("\n[Page 1 OCR]:\nAlpha\n"));
        assert!(!text.contains("[Page 2 OCR]"));
        assert!(text.contains("\n[Page 3 OCR]:\nGamma\n"));
    }

    #[test]
    fn test_media_sections_carry_archive_path() {
        let results = vec![
            ("word/media/image1.png".to_string(), "diagram caption".to_string()),
            ("word/media/image2.png".to_string(), String::new()),
        ];
        let text = media_sections("DOCX", &results);
        assert!(text.contains("\n[Image from DOCX: word/media/image1.png]:\ndiagram caption\n"));
        assert!(!text.contains("image2"));
    }

    #[test]
    fn test_rich_native_text_never_triggers_rasterization() {
        // Stage-3 gating is exactly the fallback threshold over the
        // stage 1+2 text, so a document whose native layer clears it can
        // never reach full-page OCR.
        let native = "Hello page one with plenty of additional narrative text.\n\
                      Hello page two with plenty of additional narrative text.\n";
        assert!(!extractor().needs_fallback(native));
    }

    #[test]
    fn test_fallback_threshold_uses_trimmed_length() {
        let extractor = extractor();
        assert!(extractor.needs_fallback(""));
        assert!(extractor.needs_fallback("   \n\t  "));
        assert!(extractor.needs_fallback("short"));
        let padded = format!("  {}  ", "x".repeat(50));
        assert!(!extractor.needs_fallback(&padded));
    }

    #[test]
    fn test_validate_delegates_per_format() {
        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(120, 120, Luma([0])));
        let mut buffer = Cursor::new(Vec::new());
        blank.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        let bytes = buffer.into_inner();

        let document = SourceDocument {
            bytes: &bytes,
            format: DocumentFormat::Image,
        };
        let verdict = extractor().validate(&document);
        assert!(!verdict.valid);
        assert!(verdict.reason.contains("blank"));
    }

    /// Minimal two-page PDF with a native text layer, one line per page.
    /// Object offsets are computed while writing so the xref is valid.
    fn two_page_pdf(line_one: &str, line_two: &str) -> Vec<u8> {
        fn content_stream(line: &str) -> String {
            let ops = format!("BT /F1 18 Tf 72 700 Td ({line}) Tj ET");
            format!("<< /Length {} >>\nstream\n{ops}\nendstream", ops.len())
        }

        let page = "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                    /Contents {content} 0 R /Resources << /Font << /F1 7 0 R >> >> >>";
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>".to_string(),
            page.replace("{content}", "5"),
            page.replace("{content}", "6"),
            content_stream(line_one),
            content_stream(line_two),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
        }

        let xref_offset = pdf.len();
        pdf.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
        pdf.extend_from_slice(b"0000000000 65535 f \n");
        for offset in offsets {
            pdf.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }
        pdf.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
                objects.len() + 1
            )
            .as_bytes(),
        );
        pdf
    }

    #[test]
    #[ignore = "requires libpdfium on the host"]
    fn test_pdf_with_rich_text_layer_skips_ocr_tiers() {
        let bytes = two_page_pdf(
            "Hello page one with plenty of additional narrative text.",
            "Hello page two with plenty of additional narrative text.",
        );
        let document = SourceDocument {
            bytes: &bytes,
            format: DocumentFormat::Pdf,
        };
        let outcome = extractor().extract(&document);

        assert!(outcome.text.contains("Hello page one"));
        assert!(outcome.text.contains("Hello page two"));
        // Neither OCR tier leaves a trace: no embedded images exist and the
        // native layer clears the fallback threshold.
        assert!(!outcome.text.contains("[Image"));
        assert!(!outcome.text.contains("[Page"));
        assert!(outcome.diagnostics.is_empty());
    }
}

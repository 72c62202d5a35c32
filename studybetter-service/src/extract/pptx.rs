//! PowerPoint presentations. A PPTX is a ZIP of XML parts; each slide
//! lives at `ppt/slides/slideN.xml` and its visible text sits in `a:t`
//! runs inside `p:sp` shape elements. Media for the embedded-image pass
//! is shared with the DOCX module (`ppt/media/` prefix).

use std::io::{Cursor, Read};

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::warn;

use crate::error::ExtractionError;

/// Text content of one slide.
#[derive(Debug)]
pub struct SlideText {
    /// 1-based slide number taken from the part name.
    pub number: u32,
    /// Per-shape text, shape order, empties dropped. Paragraphs within a
    /// shape are joined with newlines.
    pub shapes: Vec<String>,
}

impl SlideText {
    pub fn has_text(&self) -> bool {
        !self.shapes.is_empty()
    }
}

/// Parse every slide of the presentation, in slide-number order. A slide
/// whose XML fails to parse is skipped with a log line; the archive
/// failing to open at all is an error.
pub fn slide_texts(bytes: &[u8]) -> Result<Vec<SlideText>, ExtractionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    let mut slide_names: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| slide_number(name).map(|n| (n, name.to_string())))
        .collect();
    slide_names.sort_by_key(|(n, _)| *n);

    if slide_names.is_empty() {
        return Err(ExtractionError::DocumentOpen(
            "presentation has no slides".to_string(),
        ));
    }

    let mut slides = Vec::with_capacity(slide_names.len());
    for (number, name) in slide_names {
        let mut xml = String::new();
        archive.by_name(&name)?.read_to_string(&mut xml)?;

        match parse_slide_xml(&xml) {
            Ok(shapes) => slides.push(SlideText { number, shapes }),
            Err(e) => {
                warn!(slide = number, error = %e, "Failed to parse slide, skipping");
                slides.push(SlideText {
                    number,
                    shapes: Vec::new(),
                });
            }
        }
    }

    Ok(slides)
}

/// `ppt/slides/slide7.xml` -> `Some(7)`.
fn slide_number(name: &str) -> Option<u32> {
    name.strip_prefix("ppt/slides/slide")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

/// Assemble the native-text outcome: each slide that contributes text is
/// prefixed with its section marker; slides with no text contribute
/// nothing at all.
pub fn assemble(slides: &[SlideText]) -> String {
    let mut out = String::new();
    for slide in slides {
        if !slide.has_text() {
            continue;
        }
        out.push_str(&format!("\n=== SLIDE {} ===\n", slide.number));
        for shape in &slide.shapes {
            out.push_str(shape);
            out.push('\n');
        }
    }
    out
}

/// Collect per-shape text from one slide part. Shapes are `p:sp`
/// elements; within a shape, `a:p` paragraphs are joined with newlines
/// and `a:t` runs concatenate within a paragraph.
fn parse_slide_xml(xml: &str) -> Result<Vec<String>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut shapes = Vec::new();
    let mut current_shape = String::new();
    let mut current_paragraph = String::new();
    let mut in_shape = false;
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"p:sp" => {
                    in_shape = true;
                    current_shape.clear();
                }
                b"a:p" if in_shape => current_paragraph.clear(),
                b"a:t" if in_shape => in_text = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"p:sp" => {
                    in_shape = false;
                    let shape = current_shape.trim().to_string();
                    if !shape.is_empty() {
                        shapes.push(shape);
                    }
                }
                b"a:p" if in_shape => {
                    let paragraph = current_paragraph.trim().to_string();
                    if !paragraph.is_empty() {
                        if !current_shape.is_empty() {
                            current_shape.push('\n');
                        }
                        current_shape.push_str(&paragraph);
                    }
                }
                b"a:t" => in_text = false,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_shape && in_text {
                    let run = e
                        .unescape()
                        .map_err(|e| ExtractionError::Xml(e.to_string()))?;
                    current_paragraph.push_str(&run);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractionError::Xml(format!(
                    "error at position {}: {e:?}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
    }

    Ok(shapes)
}

//! Word documents: modern DOCX archives and the legacy binary DOC format.
//!
//! DOCX is a ZIP of XML parts; the native pass walks `word/document.xml`
//! in a single streaming sweep, collecting body paragraphs first and
//! table cells second. Legacy DOC has no addressable structure here, so
//! it goes through an external converter and yields one text blob.

use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

use crate::error::ExtractionError;
use crate::extract::ocr;

/// Magic bytes of an OLE2 compound file, the container for legacy DOC.
const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Native text pulled from a DOCX, kept separated so the validator can
/// reason about structure without re-parsing.
#[derive(Debug, Default)]
pub struct DocxText {
    /// Body-level paragraphs, in document order, empties dropped.
    pub paragraphs: Vec<String>,
    /// Table cell contents in row-major order, empties dropped.
    pub cells: Vec<String>,
}

impl DocxText {
    /// Paragraphs then cells, one line each.
    pub fn combined(&self) -> String {
        let mut out = String::new();
        for paragraph in &self.paragraphs {
            out.push_str(paragraph);
            out.push('\n');
        }
        for cell in &self.cells {
            out.push_str(cell);
            out.push('\n');
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty() && self.cells.is_empty()
    }
}

/// Parse the main document part of a DOCX.
pub fn native_text(bytes: &[u8]) -> Result<DocxText, ExtractionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractionError::DocumentOpen(format!("word/document.xml missing: {e}")))?
        .read_to_string(&mut xml)?;

    parse_document_xml(&xml)
}

/// One streaming pass over `word/document.xml`. Paragraphs inside a table
/// accumulate into their cell instead of the body list; nested-table depth
/// is tracked so inner rows stay inside their outer cell.
fn parse_document_xml(xml: &str) -> Result<DocxText, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut text = DocxText::default();
    let mut current_paragraph = String::new();
    let mut current_cell = String::new();
    let mut in_text = false;
    let mut table_depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:t" => in_text = true,
                b"w:p" => current_paragraph.clear(),
                b"w:tbl" => table_depth += 1,
                b"w:tc" if table_depth == 1 => current_cell.clear(),
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    let paragraph = current_paragraph.trim().to_string();
                    if !paragraph.is_empty() {
                        if table_depth == 0 {
                            text.paragraphs.push(paragraph);
                        } else {
                            if !current_cell.is_empty() {
                                current_cell.push('\n');
                            }
                            current_cell.push_str(&paragraph);
                        }
                    }
                }
                b"w:tbl" => table_depth = table_depth.saturating_sub(1),
                b"w:tc" if table_depth == 1 => {
                    let cell = current_cell.trim().to_string();
                    if !cell.is_empty() {
                        text.cells.push(cell);
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text {
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

    Ok(text)
}

/// List the media parts of an OOXML archive under `prefix` (for DOCX that
/// is `word/media/`), returning `(archive path, raw bytes)` pairs in
/// archive order. Decoding is left to the caller.
pub fn media_entries(
    bytes: &[u8],
    prefix: &str,
) -> Result<Vec<(String, Vec<u8>)>, ExtractionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    let names: Vec<String> = archive
        .file_names()
        .filter(|name| name.starts_with(prefix))
        .map(|name| name.to_string())
        .collect();

    let mut entries = Vec::with_capacity(names.len());
    for name in names {
        let mut data = Vec::new();
        archive.by_name(&name)?.read_to_end(&mut data)?;
        debug!(entry = %name, bytes = data.len(), "Media entry");
        entries.push((name, data));
    }

    Ok(entries)
}

/// True when the bytes look like an OLE2 compound file.
pub fn is_ole_container(bytes: &[u8]) -> bool {
    bytes.len() >= OLE_MAGIC.len() && bytes[..OLE_MAGIC.len()] == OLE_MAGIC
}

/// Convert a legacy DOC to a single text blob via an external tool,
/// `antiword` first and `catdoc` as the fallback.
pub fn legacy_doc_text(bytes: &[u8], timeout: Duration) -> Result<String, ExtractionError> {
    let mut tmp = tempfile::Builder::new().suffix(".doc").tempfile()?;
    tmp.write_all(bytes)?;
    tmp.flush()?;

    for tool in ["antiword", "catdoc"] {
        match run_converter(tool, tmp.path(), timeout) {
            Ok(text) if !text.trim().is_empty() => {
                debug!(tool, chars = text.len(), "Legacy DOC converted");
                return Ok(text);
            }
            Ok(_) => debug!(tool, "Converter produced no text"),
            Err(e) => debug!(tool, error = %e, "Converter unavailable or failed"),
        }
    }

    Err(ExtractionError::Tool(
        "no working DOC converter (tried antiword, catdoc)".to_string(),
    ))
}

fn run_converter(tool: &str, path: &Path, timeout: Duration) -> Result<String, ExtractionError> {
    let mut cmd = Command::new(tool);
    cmd.arg(path);

    let output = ocr::run_with_timeout(cmd, timeout)?;
    if !output.status.success() {
        return Err(ExtractionError::Tool(format!(
            "{tool} exited with {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

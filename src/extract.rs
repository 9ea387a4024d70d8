//! Native text extraction for course documents (PDF, slide decks).
//!
//! Extraction is pipeline-layer: the caller supplies raw bytes plus the format
//! tag recorded at upload, and gets back plain UTF-8 text. PDF output is
//! heuristic-checked by [`crate::classify`] before the pipeline trusts it;
//! slide-deck text comes from the deck's structured XML and is trusted as-is.

use std::io::Read;

use thiserror::Error;

use crate::models::DocumentFormat;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Native extraction error. The corpus assembler attaches the offending
/// filename when surfacing this to the training caller.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("slide deck extraction failed: {0}")]
    Deck(String),
}

/// Extracts the native text layer from document bytes, dispatched on the
/// format tag.
pub fn extract_text(bytes: &[u8], format: DocumentFormat) -> Result<String, ExtractError> {
    match format {
        DocumentFormat::Pdf => extract_pdf(bytes),
        DocumentFormat::SlideDeck => extract_slide_deck(bytes),
    }
}

/// Per-page native text, concatenated in page order.
fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Slide text in slide order, then shape order as the deck stores them.
/// Each text-bearing shape contributes its text followed by a newline.
fn extract_slide_deck(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Deck(e.to_string()))?;

    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut out = String::new();
    for name in slide_names {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        extract_shape_text(&xml, &mut out)?;
    }
    Ok(out)
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Deck(e.to_string()))?;
    let mut buf = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut buf)
        .map_err(|e| ExtractError::Deck(e.to_string()))?;
    if buf.len() as u64 >= max_bytes {
        return Err(ExtractError::Deck(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(buf)
}

/// Walk one slide's XML and append each shape's text plus a trailing newline.
///
/// A shape (`<p:sp>`) holds a text body (`<p:txBody>`) of paragraphs
/// (`<a:p>`) made of runs (`<a:t>`). Runs concatenate within a paragraph;
/// paragraphs join with newlines within a shape.
fn extract_shape_text(xml: &[u8], out: &mut String) -> Result<(), ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut in_shape = false;
    let mut has_text_body = false;
    let mut in_run = false;
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"sp" => {
                    in_shape = true;
                    has_text_body = false;
                    paragraphs.clear();
                    current.clear();
                }
                b"txBody" if in_shape => has_text_body = true,
                b"t" if in_shape => in_run = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_run => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_run = false,
                b"p" if in_shape && has_text_body => {
                    paragraphs.push(std::mem::take(&mut current));
                }
                b"sp" if in_shape => {
                    if has_text_body {
                        out.push_str(&paragraphs.join("\n"));
                        out.push('\n');
                    }
                    in_shape = false;
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Deck(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn deck_from_slides(slides: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            for (name, xml) in slides {
                zip.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(xml.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    fn slide_xml(shapes: &[&[&str]]) -> String {
        let mut body = String::new();
        for shape in shapes {
            body.push_str("<p:sp><p:txBody>");
            for para in *shape {
                body.push_str(&format!("<a:p><a:r><a:t>{}</a:t></a:r></a:p>", para));
            }
            body.push_str("</p:txBody></p:sp>");
        }
        format!(
            "<?xml version=\"1.0\"?><p:sld xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\" xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\"><p:cSld><p:spTree>{}</p:spTree></p:cSld></p:sld>",
            body
        )
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", DocumentFormat::Pdf).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_deck() {
        let err = extract_text(b"not a zip", DocumentFormat::SlideDeck).unwrap_err();
        assert!(matches!(err, ExtractError::Deck(_)));
    }

    #[test]
    fn deck_shapes_emit_text_with_trailing_newlines() {
        let deck = deck_from_slides(&[(
            "ppt/slides/slide1.xml",
            &slide_xml(&[&["Title"], &["Line one", "Line two"]]),
        )]);
        let text = extract_text(&deck, DocumentFormat::SlideDeck).unwrap();
        assert_eq!(text, "Title\nLine one\nLine two\n");
    }

    #[test]
    fn deck_slides_concatenate_in_numeric_order() {
        // slide10 sorts after slide2 numerically, not lexically
        let deck = deck_from_slides(&[
            ("ppt/slides/slide10.xml", &slide_xml(&[&["third"]])),
            ("ppt/slides/slide2.xml", &slide_xml(&[&["second"]])),
            ("ppt/slides/slide1.xml", &slide_xml(&[&["first"]])),
        ]);
        let text = extract_text(&deck, DocumentFormat::SlideDeck).unwrap();
        assert_eq!(text, "first\nsecond\nthird\n");
    }

    #[test]
    fn deck_without_slides_yields_empty_text() {
        let deck = deck_from_slides(&[("ppt/presentation.xml", "<p:presentation/>")]);
        let text = extract_text(&deck, DocumentFormat::SlideDeck).unwrap();
        assert!(text.is_empty());
    }
}

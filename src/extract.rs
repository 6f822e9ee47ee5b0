//! Text extraction for knowledge files.
//!
//! Plain text and Markdown are read as UTF-8; PDF goes through
//! `pdf-extract`; DOCX is unzipped and its `w:t` runs collected, with one
//! line break per `w:p` paragraph. Failures never panic: they come back as
//! [`RagError::Ingest`] and the caller skips the file.

use std::io::Read;
use std::path::Path;

use crate::error::{RagError, Result};
use crate::models::SourceText;

pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedContentType(String),
    #[error("file is not valid UTF-8")]
    NotUtf8,
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Content type from the file extension, `None` for unsupported files.
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "txt" | "text" => Some(MIME_TEXT),
        "md" | "markdown" => Some(MIME_MARKDOWN),
        "pdf" => Some(MIME_PDF),
        "docx" => Some(MIME_DOCX),
        _ => None,
    }
}

/// Extract UTF-8 text from raw file bytes.
pub fn extract_text(bytes: &[u8], content_type: &str) -> std::result::Result<String, ExtractError> {
    match content_type {
        MIME_TEXT | MIME_MARKDOWN => {
            let text = std::str::from_utf8(bytes).map_err(|_| ExtractError::NotUtf8)?;
            Ok(text.strip_prefix('\u{feff}').unwrap_or(text).to_string())
        }
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        other => Err(ExtractError::UnsupportedContentType(other.to_string())),
    }
}

/// Read and extract one file. `source_path` is the name it will be stored under.
pub fn read_source(path: &Path, source_path: &str) -> Result<SourceText> {
    let content_type = content_type_for(path).ok_or_else(|| {
        RagError::ingest(source_path, format!("unsupported file type: {}", path.display()))
    })?;
    let bytes = std::fs::read(path)
        .map_err(|e| RagError::ingest(source_path, format!("unreadable: {}", e)))?;
    let text =
        extract_text(&bytes, content_type).map_err(|e| RagError::ingest(source_path, e.to_string()))?;

    Ok(SourceText {
        source_path: source_path.to_string(),
        content_type: content_type.to_string(),
        text,
    })
}

fn extract_pdf(bytes: &[u8]) -> std::result::Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> std::result::Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    extract_paragraphs(&doc_xml)
}

fn extract_paragraphs(xml: &[u8]) -> std::result::Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => out.push('\t'),
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with(document_xml: &str) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("word/document.xml", options).unwrap();
            zip.write_all(document_xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(content_type_for(Path::new("a/b.TXT")), Some(MIME_TEXT));
        assert_eq!(content_type_for(Path::new("guide.md")), Some(MIME_MARKDOWN));
        assert_eq!(content_type_for(Path::new("x.pdf")), Some(MIME_PDF));
        assert_eq!(content_type_for(Path::new("x.docx")), Some(MIME_DOCX));
        assert_eq!(content_type_for(Path::new("x.exe")), None);
        assert_eq!(content_type_for(Path::new("README")), None);
    }

    #[test]
    fn test_plain_text_strips_bom() {
        let text = extract_text("\u{feff}KCC limit".as_bytes(), MIME_TEXT).unwrap();
        assert_eq!(text, "KCC limit");
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let err = extract_text(&[0xff, 0xfe, 0x00], MIME_TEXT).unwrap_err();
        assert!(matches!(err, ExtractError::NotUtf8));
    }

    #[test]
    fn test_invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn test_invalid_zip_returns_error_for_docx() {
        let err = extract_text(b"not a zip", MIME_DOCX).unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn test_docx_paragraphs_become_lines() {
        let xml = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>PM Kisan</w:t></w:r><w:r><w:t xml:space="preserve"> pays 6000</w:t></w:r></w:p>
    <w:p><w:r><w:t>per year &amp; more</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let text = extract_text(&docx_with(xml), MIME_DOCX).unwrap();
        assert_eq!(text, "PM Kisan pays 6000\nper year & more\n");
    }

    #[test]
    fn test_read_source_reports_ingest_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("missing.txt");
        let err = read_source(&path, "missing.txt").unwrap_err();
        assert!(matches!(err, RagError::Ingest { .. }));

        let bin = tmp.path().join("tool.exe");
        std::fs::write(&bin, b"MZ").unwrap();
        assert!(read_source(&bin, "tool.exe").is_err());
    }
}

//! Text extraction for uploaded CVs.
//!
//! CPU-bound and synchronous; callers run it inside `spawn_blocking`.

use std::io::{Cursor, Read};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::config::{DOCX_MIME, PDF_MIME};

const MSWORD_MIME: &str = "application/msword";
const DOCX_BODY_ENTRY: &str = "word/document.xml";

static TABS_AND_CR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\t\r]+").unwrap());
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());
static MULTI_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static PARAGRAPH_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"</w:p>|<w:br\s*/>|<w:cr\s*/>").unwrap());
static TAB_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<w:tab\s*/>").unwrap());
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unsupported file type: {0}")]
    Unsupported(String),

    #[error("Legacy DOC format not supported. Please convert to DOCX or PDF")]
    LegacyDoc,

    #[error("Failed to read PDF: {0}")]
    Pdf(String),

    #[error("Failed to read DOCX: {0}")]
    Docx(String),
}

/// Turns raw upload bytes plus their declared MIME type into cleaned text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<String, ExtractError>;
}

/// PDF via `pdf-extract`, DOCX via the `word/document.xml` part of the archive.
pub struct DocumentTextExtractor;

impl TextExtractor for DocumentTextExtractor {
    fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<String, ExtractError> {
        let mime = mime_type.trim().to_ascii_lowercase();
        let raw = match mime.as_str() {
            PDF_MIME => extract_pdf(bytes)?,
            DOCX_MIME => extract_docx(bytes)?,
            MSWORD_MIME => return Err(ExtractError::LegacyDoc),
            other => return Err(ExtractError::Unsupported(other.to_string())),
        };
        Ok(clean_text(&raw))
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Docx(e.to_string()))?;
    let mut entry = archive
        .by_name(DOCX_BODY_ENTRY)
        .map_err(|e| ExtractError::Docx(format!("{DOCX_BODY_ENTRY}: {e}")))?;

    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;

    Ok(docx_xml_to_text(&xml))
}

/// Paragraph and break tags become newlines, tab tags become tabs, every other
/// tag is dropped and the five predefined XML entities are decoded.
fn docx_xml_to_text(xml: &str) -> String {
    let text = PARAGRAPH_END.replace_all(xml, "\n");
    let text = TAB_TAG.replace_all(&text, "\t");
    let text = ANY_TAG.replace_all(&text, "");
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Tabs and carriage returns become spaces, runs of spaces collapse to one,
/// three or more newlines collapse to two, and the result is trimmed.
pub fn clean_text(raw: &str) -> String {
    let text = TABS_AND_CR.replace_all(raw, " ");
    let text = MULTI_SPACE.replace_all(&text, " ");
    let text = MULTI_NEWLINE.replace_all(&text, "\n\n");
    text.trim().to_string()
}

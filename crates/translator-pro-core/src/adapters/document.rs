use async_trait::async_trait;
use mupdf::{Document as MuDocument, TextPageOptions};
use regex::Regex;
use std::io::{Cursor, Read};
use std::sync::LazyLock;
use tracing::{debug, info};

use super::{DocumentExtractor, DocumentKind};
use crate::error::{Error, Result};

// Patterns are literals and known to compile
#[allow(clippy::unwrap_used)]
static PARAGRAPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<w:p(?:\s[^>]*)?(?:/>|>(.*?)</w:p>)").unwrap());

#[allow(clippy::unwrap_used)]
static RUN_CONTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|<w:tab/>|<w:br\b[^>]*/>|<w:cr/>").unwrap()
});

/// Extracts text from TXT, PDF and DOCX files
#[derive(Debug, Clone, Copy, Default)]
pub struct FileExtractor;

impl FileExtractor {
    pub const fn new() -> Self {
        Self
    }

    /// Synchronous extraction; mupdf and zip both block
    pub fn extract_sync(bytes: &[u8], kind: DocumentKind) -> Result<String> {
        let text = match kind {
            DocumentKind::Txt => decode_txt(bytes),
            DocumentKind::Pdf => extract_pdf(bytes)?,
            DocumentKind::Docx => extract_docx(bytes)?,
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Extraction(format!("no text found in {kind} document")));
        }

        info!("Extracted {} characters from {} document", text.chars().count(), kind);
        Ok(text.to_string())
    }
}

#[async_trait]
impl DocumentExtractor for FileExtractor {
    async fn extract_text(&self, bytes: &[u8], kind: DocumentKind) -> Result<String> {
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || Self::extract_sync(&bytes, kind))
            .await
            .map_err(|e| Error::Extraction(format!("extraction task failed: {e}")))?
    }
}

/// UTF-8, falling back to Latin-1 (which accepts any byte sequence)
fn decode_txt(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            debug!("Text file is not UTF-8, decoding as Latin-1");
            bytes.iter().map(|&b| char::from(b)).collect()
        }
    }
}

/// Page text in reading order, pages separated by a blank line
fn extract_pdf(bytes: &[u8]) -> Result<String> {
    let doc = MuDocument::from_bytes(bytes, "")
        .map_err(|e| Error::Extraction(format!("Failed to parse PDF: {e}")))?;

    let page_count = doc
        .page_count()
        .map_err(|e| Error::Extraction(format!("Failed to get page count: {e}")))?;

    let mut text = String::new();

    for page_num in 0..page_count {
        let page = doc.load_page(page_num).map_err(|e| {
            Error::Extraction(format!("Failed to load page {page_num}: {e}"))
        })?;

        let text_page = page.to_text_page(TextPageOptions::empty()).map_err(|e| {
            Error::Extraction(format!("Failed to get text of page {page_num}: {e}"))
        })?;

        for block in text_page.blocks() {
            for line in block.lines() {
                for text_char in line.chars() {
                    if let Some(c) = text_char.char() {
                        text.push(c);
                    }
                }
                text.push('\n');
            }
        }
        text.push('\n');
    }

    debug!("Read {} PDF pages", page_count);
    Ok(text)
}

/// One line per paragraph of `word/document.xml`
fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::Extraction(format!("Failed to open DOCX: {e}")))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| Error::Extraction(format!("DOCX has no document body: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| Error::Extraction(format!("Failed to read DOCX body: {e}")))?;

    let paragraphs: Vec<String> = PARAGRAPH
        .captures_iter(&xml)
        .map(|para| para.get(1).map_or_else(String::new, |body| paragraph_text(body.as_str())))
        .collect();

    Ok(paragraphs.join("\n"))
}

fn paragraph_text(body: &str) -> String {
    let mut text = String::new();
    for run in RUN_CONTENT.captures_iter(body) {
        match run.get(1) {
            Some(content) => text.push_str(&unescape_xml(content.as_str())),
            None if run[0].starts_with("<w:tab") => text.push('\t'),
            // <w:br .../> and <w:cr/>
            None => text.push('\n'),
        }
    }
    text
}

/// Decode predefined entities and numeric character references in one pass
fn unescape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        let decoded = tail
            .find(';')
            .and_then(|end| decode_entity(&tail[1..end]).map(|c| (c, end)));

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
                .map(|hex| u32::from_str_radix(hex, 16))
                .or_else(|| name.strip_prefix('#').map(str::parse::<u32>))?
                .ok()?;
            char::from_u32(code)
        }
    }
}

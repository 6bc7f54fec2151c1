//! Modality adapters: turn images, documents and audio into plain text.
//!
//! The translator only ever sees text. Each adapter is a trait so the
//! front-end can swap engines, and tests can feed canned text.

mod audio;
mod document;
mod ocr;

pub use audio::{SUPPORTED_AUDIO_FORMATS, WhisperCppTranscriber};
pub use document::FileExtractor;
pub use ocr::TesseractOcr;

use async_trait::async_trait;
use std::str::FromStr;

use crate::config::Lang;
use crate::error::{Error, Result};

/// Recognizes text in an image
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Fails with [`Error::Extraction`] when no text is recognized
    async fn extract_text(&self, image: &[u8], source: Lang) -> Result<String>;
}

/// Pulls plain text out of a document
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract_text(&self, bytes: &[u8], kind: DocumentKind) -> Result<String>;
}

/// Turns recorded speech into text
#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    /// `format` is the file extension of the recording (mp3, wav, ...)
    async fn transcribe(&self, audio: &[u8], format: &str, source: Lang) -> Result<String>;
}

/// Document types the extractor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Txt,
    Pdf,
    Docx,
}

impl DocumentKind {
    /// Kind from a file extension, with or without the leading dot
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.trim().trim_start_matches('.').to_lowercase().as_str() {
            "txt" => Ok(Self::Txt),
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            _ => Err(Error::UnsupportedDocumentKind(ext.to_string())),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

impl FromStr for DocumentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_extension(s)
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

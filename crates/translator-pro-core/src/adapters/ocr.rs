use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::OcrEngine;
use crate::config::{Lang, OcrConfig};
use crate::error::{Error, Result};

/// OCR through the `tesseract` command-line tool
pub struct TesseractOcr {
    command: String,
    psm: u8,
}

impl TesseractOcr {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            command: config.command.clone(),
            psm: config.psm,
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn extract_text(&self, image: &[u8], source: Lang) -> Result<String> {
        let input = tempfile::NamedTempFile::new()?;
        tokio::fs::write(input.path(), image).await?;

        debug!(
            "Running {} on {} bytes ({}, psm {})",
            self.command,
            image.len(),
            source.tesseract_code(),
            self.psm
        );

        let output = Command::new(&self.command)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(source.tesseract_code())
            .arg("--psm")
            .arg(self.psm.to_string())
            .output()
            .await
            .map_err(|e| Error::Extraction(format!("Failed to execute {}: {e}", self.command)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Extraction(format!("OCR failed: {}", stderr.trim())));
        }

        let text = clean_text(&String::from_utf8_lossy(&output.stdout));
        if text.is_empty() {
            return Err(Error::Extraction("no text recognized in image".to_string()));
        }

        info!("OCR recognized {} characters", text.chars().count());
        Ok(text)
    }
}

/// Trim every line and drop the empty ones OCR scatters between rows
fn clean_text(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

use super::SpeechTranscriber;
use crate::config::{Lang, SpeechConfig};
use crate::error::{Error, Result};

/// Recording formats accepted for transcription
pub const SUPPORTED_AUDIO_FORMATS: &[&str] = &["mp3", "wav", "ogg", "flac", "m4a"];

/// Transcription through whisper.cpp, with ffmpeg normalizing the input
pub struct WhisperCppTranscriber {
    whisper_command: String,
    model_path: PathBuf,
    ffmpeg_command: String,
}

impl WhisperCppTranscriber {
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            whisper_command: config.whisper_command.clone(),
            model_path: config.model_path.clone(),
            ffmpeg_command: config.ffmpeg_command.clone(),
        }
    }

    /// Convert to 16 kHz mono WAV, the only input whisper.cpp reads
    async fn convert_to_wav(&self, input: &Path, output: &Path) -> Result<()> {
        debug!("Converting {} to 16 kHz mono WAV", input.display());

        let result = Command::new(&self.ffmpeg_command)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-ac", "1", "-ar", "16000"])
            .arg(output)
            .output()
            .await
            .map_err(|e| {
                Error::Transcription(format!("Failed to execute {}: {e}", self.ffmpeg_command))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(Error::Transcription(format!(
                "audio conversion failed: {}",
                stderr.lines().last().unwrap_or_default()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl SpeechTranscriber for WhisperCppTranscriber {
    async fn transcribe(&self, audio: &[u8], format: &str, source: Lang) -> Result<String> {
        let format = format.trim_start_matches('.').to_lowercase();
        if !SUPPORTED_AUDIO_FORMATS.contains(&format.as_str()) {
            return Err(Error::Transcription(format!("unsupported audio format: {format}")));
        }

        let work_dir = tempfile::tempdir()?;
        let input = work_dir.path().join(format!("input.{format}"));
        let wav = work_dir.path().join("speech.wav");

        tokio::fs::write(&input, audio).await?;
        self.convert_to_wav(&input, &wav).await?;

        info!("Transcribing {} audio ({})", format, source);

        let output_prefix = work_dir.path().join("transcript");
        let output = Command::new(&self.whisper_command)
            .arg("-m")
            .arg(&self.model_path)
            .arg("-l")
            .arg(source.as_str())
            .arg("-f")
            .arg(&wav)
            .arg("-oj")
            .arg("-of")
            .arg(&output_prefix)
            .arg("-np")
            .output()
            .await
            .map_err(|e| {
                Error::Transcription(format!(
                    "transcription service unreachable ({}): {e}",
                    self.whisper_command
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Transcription(format!(
                "whisper failed: {}",
                stderr.trim()
            )));
        }

        let json = tokio::fs::read_to_string(output_prefix.with_extension("json"))
            .await
            .map_err(|e| Error::Transcription(format!("Failed to read whisper output: {e}")))?;

        let text = parse_transcript(&json)?;
        if text.is_empty() {
            return Err(Error::Transcription("speech could not be understood".to_string()));
        }

        info!("Transcription produced {} characters", text.chars().count());
        Ok(text)
    }
}

/// JSON written by whisper.cpp with `-oj`
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    transcription: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    text: String,
}

/// Join the segments into one paragraph, dropping non-speech tags
fn parse_transcript(json: &str) -> Result<String> {
    let output: WhisperOutput = serde_json::from_str(json)
        .map_err(|e| Error::Transcription(format!("Failed to parse whisper output: {e}")))?;

    Ok(output
        .transcription
        .iter()
        .map(|segment| segment.text.trim())
        .filter(|text| !text.is_empty() && !is_non_speech_tag(text))
        .collect::<Vec<_>>()
        .join(" "))
}

/// Tags such as `[BLANK_AUDIO]` or `[Music]` carry no speech
fn is_non_speech_tag(text: &str) -> bool {
    text.starts_with('[') && text.ends_with(']')
}

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Languages the translator knows about.
///
/// The set is closed: a code outside it is rejected at parse time, so every
/// `Lang` value is a supported one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Fr,
    En,
    Ar,
    Es,
    De,
    It,
}

impl Lang {
    pub const ALL: [Self; 6] = [Self::Fr, Self::En, Self::Ar, Self::Es, Self::De, Self::It];

    /// ISO 639-1 code
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fr => "fr",
            Self::En => "en",
            Self::Ar => "ar",
            Self::Es => "es",
            Self::De => "de",
            Self::It => "it",
        }
    }

    /// Human-readable name, in the language itself
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fr => "Français",
            Self::En => "English",
            Self::Ar => "العربية",
            Self::Es => "Español",
            Self::De => "Deutsch",
            Self::It => "Italiano",
        }
    }

    pub const fn flag(self) -> &'static str {
        match self {
            Self::Fr => "🇫🇷",
            Self::En => "🇬🇧",
            Self::Ar => "🇸🇦",
            Self::Es => "🇪🇸",
            Self::De => "🇩🇪",
            Self::It => "🇮🇹",
        }
    }

    /// Tesseract traineddata name (ISO 639-2)
    pub const fn tesseract_code(self) -> &'static str {
        match self {
            Self::Fr => "fra",
            Self::En => "eng",
            Self::Ar => "ara",
            Self::Es => "spa",
            Self::De => "deu",
            Self::It => "ita",
        }
    }
}

impl FromStr for Lang {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|lang| lang.as_str() == code)
            .ok_or_else(|| Error::UnsupportedLanguage(s.to_string()))
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered (source, target) pair identifying one translation direction.
///
/// Used as the model cache key: `fr-en` and `en-fr` are different entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LanguagePair {
    pub source: Lang,
    pub target: Lang,
}

impl LanguagePair {
    pub const fn new(source: Lang, target: Lang) -> Self {
        Self { source, target }
    }

    pub const fn reversed(self) -> Self {
        Self::new(self.target, self.source)
    }
}

impl std::fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.source, self.target)
    }
}

/// Compute device models are bound to.
///
/// Chosen once at startup and fixed for the lifetime of the model cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    Cpu,
    Cuda(usize),
}

impl Device {
    /// Pick the accelerator when an NVIDIA device is visible, otherwise the CPU.
    pub fn detect() -> Self {
        let hidden = std::env::var("CUDA_VISIBLE_DEVICES")
            .is_ok_and(|v| v.trim().is_empty() || v.trim() == "-1");

        if !hidden && std::path::Path::new("/dev/nvidiactl").exists() {
            Self::Cuda(0)
        } else {
            Self::Cpu
        }
    }

    pub const fn is_accelerator(self) -> bool {
        matches!(self, Self::Cuda(_))
    }
}

impl FromStr for Device {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value = s.trim().to_lowercase();
        match value.as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|idx| idx.parse().ok())
                .map(Self::Cuda)
                .ok_or_else(|| Error::ConfigInvalid {
                    field: "device".to_string(),
                    reason: format!("expected cpu, cuda or cuda:N, got '{s}'"),
                }),
        }
    }
}

impl TryFrom<String> for Device {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda(idx) => write!(f, "cuda:{idx}"),
        }
    }
}

// Serde default functions for common languages
const fn default_source_lang() -> Lang {
    Lang::Fr
}

const fn default_target_lang() -> Lang {
    Lang::En
}

/// How a unit is presented to the inference server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptStyle {
    /// Send the unit text as-is (seq2seq models such as opus-mt)
    #[default]
    Raw,
    /// Wrap the unit in a translation instruction (chat LLMs)
    Instruct,
}

/// Inference server configuration for OpenAI-compatible APIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    pub api_key: Option<String>,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on a server-requested rate-limit wait
    #[serde(default = "default_max_retry_wait_secs")]
    pub max_retry_wait_secs: u64,
    #[serde(default)]
    pub prompt_style: PromptStyle,
}

impl ModelConfig {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key,
            ..Self::default()
        }
    }
}

fn default_api_base() -> String {
    "http://localhost:8080/v1".to_string()
}

const fn default_retry_count() -> u32 {
    3
}

const fn default_retry_delay_ms() -> u64 {
    1000
}

const fn default_timeout_secs() -> u64 {
    60
}

const fn default_max_retry_wait_secs() -> u64 {
    30
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_timeout_secs(),
            max_retry_wait_secs: default_max_retry_wait_secs(),
            prompt_style: PromptStyle::default(),
        }
    }
}

/// OCR engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Tesseract executable
    #[serde(default = "default_tesseract_command")]
    pub command: String,

    /// Page segmentation mode (6 = single uniform block of text)
    #[serde(default = "default_psm")]
    pub psm: u8,
}

fn default_tesseract_command() -> String {
    "tesseract".to_string()
}

const fn default_psm() -> u8 {
    6
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            command: default_tesseract_command(),
            psm: default_psm(),
        }
    }
}

/// Speech transcription configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// whisper.cpp executable
    #[serde(default = "default_whisper_command")]
    pub whisper_command: String,

    /// ggml model file passed to whisper.cpp
    #[serde(default = "default_whisper_model")]
    pub model_path: PathBuf,

    /// ffmpeg executable used to convert non-WAV input
    #[serde(default = "default_ffmpeg_command")]
    pub ffmpeg_command: String,
}

fn default_whisper_command() -> String {
    "whisper-cli".to_string()
}

fn default_whisper_model() -> PathBuf {
    PathBuf::from("models/ggml-base.bin")
}

fn default_ffmpeg_command() -> String {
    "ffmpeg".to_string()
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            whisper_command: default_whisper_command(),
            model_path: default_whisper_model(),
            ffmpeg_command: default_ffmpeg_command(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Source language
    #[serde(default = "default_source_lang")]
    pub source_lang: Lang,

    /// Target language
    #[serde(default = "default_target_lang")]
    pub target_lang: Lang,

    /// Compute device (auto-detected when absent)
    #[serde(default)]
    pub device: Option<Device>,

    /// Token bound per sentence; longer sentences are cut off
    #[serde(default = "default_max_unit_length")]
    pub max_unit_length: usize,

    /// Inference server configuration
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub ocr: OcrConfig,

    #[serde(default)]
    pub speech: SpeechConfig,
}

/// Default token bound per sentence
pub const DEFAULT_MAX_UNIT_LENGTH: usize = 512;

const fn default_max_unit_length() -> usize {
    DEFAULT_MAX_UNIT_LENGTH
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_lang: default_source_lang(),
            target_lang: default_target_lang(),
            device: None,
            max_unit_length: default_max_unit_length(),
            model: ModelConfig::default(),
            ocr: OcrConfig::default(),
            speech: SpeechConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigLoad(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations (~/.config/translator-pro/config.toml, ./config.toml)
    pub fn load() -> Self {
        // Try user config
        if let Some(config_dir) = crate::util::config_dir() {
            let user_config = config_dir.join("translator-pro").join("config.toml");
            if user_config.exists() {
                match Self::from_file(&user_config) {
                    Ok(config) => {
                        tracing::debug!("Loaded config from {}", user_config.display());
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // Try local config
        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            match Self::from_file(&local_config) {
                Ok(config) => {
                    tracing::debug!("Loaded config from ./config.toml");
                    return config;
                }
                Err(e) => {
                    tracing::warn!("Failed to load ./config.toml: {}", e);
                }
            }
        }

        tracing::debug!("No config file found, using defaults");
        Self::default()
    }

    /// Reject values the translator cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.source_lang == self.target_lang {
            return Err(Error::ConfigInvalid {
                field: "target_lang".to_string(),
                reason: format!("must differ from source_lang ({})", self.source_lang),
            });
        }

        if self.max_unit_length == 0 {
            return Err(Error::ConfigInvalid {
                field: "max_unit_length".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.model.retry_count == 0 {
            return Err(Error::ConfigInvalid {
                field: "model.retry_count".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if self.model.api_base.trim().is_empty() {
            return Err(Error::ConfigInvalid {
                field: "model.api_base".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Device models are bound to, detecting one if none is configured
    pub fn resolved_device(&self) -> Device {
        self.device.unwrap_or_else(Device::detect)
    }
}

/// A language option for UI dropdowns
#[derive(Debug, Clone)]
pub struct LanguageOption {
    pub lang: Lang,
    pub name: &'static str,
    pub flag: &'static str,
}

/// Languages offered for both source and target selection
pub fn languages() -> Vec<LanguageOption> {
    Lang::ALL
        .into_iter()
        .map(|lang| LanguageOption {
            lang,
            name: lang.name(),
            flag: lang.flag(),
        })
        .collect()
}

/// Default source language code
pub const DEFAULT_SOURCE_LANG: &str = "fr";
/// Default target language code
pub const DEFAULT_TARGET_LANG: &str = "en";

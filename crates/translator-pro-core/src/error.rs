use thiserror::Error;

use crate::config::LanguagePair;

/// Unified error type for translator-pro-core
///
/// Every failure reaches the caller with a readable message and a variant the
/// caller can branch on:
/// - Language resolution (unknown codes, pairs without a model)
/// - Model loading and inference
/// - Whole-text translation (which unit failed)
/// - Modality adapters (documents, OCR, transcription)
/// - Configuration and general I/O
#[derive(Error, Debug)]
pub enum Error {
    // ==========================================================================
    // Language Errors
    // ==========================================================================
    /// Language code outside the supported set
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// No translation model is known for this language pair
    #[error("unsupported language pair: {pair}")]
    UnsupportedPair { pair: LanguagePair },

    // ==========================================================================
    // Model Errors
    // ==========================================================================
    /// Loading the model for a pair failed; nothing was cached
    #[error("failed to load model {model_id} for {pair}: {reason}")]
    ModelLoad {
        pair: LanguagePair,
        model_id: String,
        reason: String,
    },

    /// Inference request to the model backend failed
    #[error("model request failed: {0}")]
    ModelRequest(String),

    /// Model backend returned something we could not use
    #[error("invalid model response: {0}")]
    ModelInvalidResponse(String),

    /// Rate limited by the model backend
    #[error("model rate limited{}", retry_after.map(|s| format!(", retry after {s} seconds")).unwrap_or_default())]
    ModelRateLimited { retry_after: Option<u64> },

    /// Model request timed out
    #[error("model request timed out")]
    ModelTimeout,

    /// Maximum retry attempts exceeded
    #[error("model request failed after maximum retries")]
    ModelMaxRetriesExceeded,

    // ==========================================================================
    // Translation Errors
    // ==========================================================================
    /// Translating one unit failed; the whole call is aborted
    #[error("translation failed at unit {index}: {source}")]
    Translation {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    // ==========================================================================
    // Adapter Errors
    // ==========================================================================
    /// No usable text could be extracted from an image or document
    #[error("text extraction failed: {0}")]
    Extraction(String),

    /// Document type other than txt, pdf or docx
    #[error("unsupported document type: {0}")]
    UnsupportedDocumentKind(String),

    /// Speech could not be transcribed
    #[error("transcription failed: {0}")]
    Transcription(String),

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Failed to load configuration file
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Invalid configuration value
    #[error("invalid config value for '{field}': {reason}")]
    ConfigInvalid { field: String, reason: String },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a caller may retry the failed operation once.
    ///
    /// Only model loads qualify: the cause may be a transient network or disk
    /// failure and a failed load never leaves anything behind in the cache.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ModelLoad { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

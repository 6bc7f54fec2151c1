//! Translator Pro Core Library
//!
//! This library provides the shared translation engine behind every input
//! modality:
//! - Language-pair resolution to pretrained models
//! - A model cache that loads each pair once and shares it
//! - Structure-preserving sentence segmentation
//! - Adapters turning images, documents and audio into text

pub mod adapters;
pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod segment;
pub mod util;

pub use adapters::{
    DocumentExtractor, DocumentKind, FileExtractor, OcrEngine, SpeechTranscriber, TesseractOcr,
    WhisperCppTranscriber,
};
pub use cache::ModelCache;
pub use config::{
    AppConfig, DEFAULT_MAX_UNIT_LENGTH, DEFAULT_SOURCE_LANG, DEFAULT_TARGET_LANG, Device, Lang,
    LanguageOption, LanguagePair, ModelConfig, PromptStyle, languages,
};
pub use error::{Error, Result};
pub use model::{ModelInfo, ModelLoader, OpenAiModelLoader, TranslationModel, create_loader};
pub use segment::{TextUnit, reassemble, segment};
pub use util::translated_file_name;

use std::sync::Arc;
use tracing::{debug, info};

/// High-level translator that combines the model cache and the segmenter
pub struct TextTranslator {
    cache: Arc<ModelCache>,
    max_unit_length: usize,
}

/// Text pulled out of a document along with its translation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTranslation {
    pub original: String,
    pub translated: String,
}

/// Transcript of a recording along with its translation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTranslation {
    pub transcript: String,
    pub translated: String,
}

impl TextTranslator {
    /// Create a translator with the configured backend, device and unit bound
    pub fn new(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let cache = ModelCache::from_config(config)?;

        Ok(Self {
            cache: Arc::new(cache),
            max_unit_length: config.max_unit_length,
        })
    }

    /// Create with a shared cache (for cache sharing across instances)
    pub const fn with_cache(cache: Arc<ModelCache>, max_unit_length: usize) -> Self {
        Self {
            cache,
            max_unit_length,
        }
    }

    /// Create with a custom model loader
    pub fn with_loader(loader: Arc<dyn ModelLoader>, device: Device) -> Self {
        Self::with_cache(
            Arc::new(ModelCache::new(loader, device)),
            DEFAULT_MAX_UNIT_LENGTH,
        )
    }

    /// Translate `text`, keeping its line structure
    pub async fn translate(&self, text: &str, source: Lang, target: Lang) -> Result<String> {
        self.translate_with_limit(text, source, target, self.max_unit_length)
            .await
    }

    /// Translate with an explicit per-sentence token bound.
    ///
    /// Sentences are translated in order; blank lines pass through. The
    /// first failing sentence aborts the call and no partial text is
    /// returned.
    pub async fn translate_with_limit(
        &self,
        text: &str,
        source: Lang,
        target: Lang,
        max_unit_length: usize,
    ) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        if max_unit_length == 0 {
            return Err(Error::ConfigInvalid {
                field: "max_unit_length".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let pair = LanguagePair::new(source, target);
        let model = self.cache.get_or_load(pair).await?;

        let units = segment::segment(text);
        let mut output = Vec::with_capacity(units.len());

        for (index, unit) in units.iter().enumerate() {
            let TextUnit::Sentence(sentence) = unit else {
                output.push(String::new());
                continue;
            };

            let input = segment::truncate_tokens(sentence, max_unit_length);
            if input.len() < sentence.len() {
                debug!("Unit {} truncated to {} tokens", index, max_unit_length);
            }

            let translated = model
                .translate(input, max_unit_length)
                .await
                .map_err(|e| Error::Translation {
                    index,
                    source: Box::new(e),
                })?;

            // One output line per unit, whatever the model emits
            output.push(translated.lines().map(str::trim).collect::<Vec<_>>().join(" "));
        }

        info!("Translated {} units {}", units.len(), pair);
        Ok(segment::reassemble(&output))
    }

    /// Extract a document's text and translate it
    pub async fn translate_document(
        &self,
        extractor: &dyn DocumentExtractor,
        bytes: &[u8],
        kind: DocumentKind,
        source: Lang,
        target: Lang,
    ) -> Result<DocumentTranslation> {
        model::resolve(LanguagePair::new(source, target))?;

        let original = extractor.extract_text(bytes, kind).await?;
        let translated = self.translate(&original, source, target).await?;

        info!("{} document translated", kind);
        Ok(DocumentTranslation {
            original,
            translated,
        })
    }

    /// Recognize the text in an image and translate it
    pub async fn translate_image(
        &self,
        ocr: &dyn OcrEngine,
        image: &[u8],
        source: Lang,
        target: Lang,
    ) -> Result<String> {
        model::resolve(LanguagePair::new(source, target))?;

        let text = ocr.extract_text(image, source).await?;
        self.translate(&text, source, target).await
    }

    /// Transcribe a recording and translate the transcript
    pub async fn translate_audio(
        &self,
        transcriber: &dyn SpeechTranscriber,
        audio: &[u8],
        format: &str,
        source: Lang,
        target: Lang,
    ) -> Result<AudioTranslation> {
        model::resolve(LanguagePair::new(source, target))?;

        let transcript = transcriber.transcribe(audio, format, source).await?;
        let translated = self.translate(&transcript, source, target).await?;

        Ok(AudioTranslation {
            transcript,
            translated,
        })
    }

    pub const fn max_unit_length(&self) -> usize {
        self.max_unit_length
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Evict every loaded model
    pub async fn clear_model_cache(&self) {
        self.cache.clear().await;
    }
}

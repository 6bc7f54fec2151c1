use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Device, LanguagePair};
use crate::error::Result;

/// Information about a loaded model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    /// Model identifier as resolved from the language pair
    pub model_id: String,
    /// Direction this model translates
    pub pair: LanguagePair,
    /// Device the model is bound to
    pub device: Device,
}

/// A loaded, ready-to-invoke translation model for one language pair.
///
/// Handles are shared behind an `Arc` and never mutated by callers, so
/// implementations must be safe to invoke from many tasks at once.
#[async_trait]
pub trait TranslationModel: Send + Sync {
    fn info(&self) -> ModelInfo;

    /// Translate one sentence, generating at most `max_length` tokens
    async fn translate(&self, text: &str, max_length: usize) -> Result<String>;
}

/// Produces model handles on a cache miss.
///
/// Loading may be slow (network or disk bound). A failed load must not
/// leave anything behind; the cache retries it on the next request.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &'static str;

    async fn load(
        &self,
        model_id: &str,
        pair: LanguagePair,
        device: Device,
    ) -> Result<Arc<dyn TranslationModel>>;
}

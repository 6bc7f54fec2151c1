mod openai;
pub mod registry;
mod traits;

pub use openai::{OpenAiModel, OpenAiModelLoader};
pub use registry::{is_supported, resolve, supported_pairs};
pub use traits::{ModelInfo, ModelLoader, TranslationModel};

use crate::config::ModelConfig;
use crate::error::Result;
use std::sync::Arc;

/// Create a model loader from configuration
pub fn create_loader(config: &ModelConfig) -> Result<Arc<dyn ModelLoader>> {
    let loader = OpenAiModelLoader::new(config)?;

    Ok(Arc::new(loader))
}

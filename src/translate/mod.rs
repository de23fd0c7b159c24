// Machine translation collaborators
//
// - Ollama: segment-by-segment translation through a local Ollama server

pub mod languages;
pub mod ollama;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::TranslationConfig;
use crate::error::Result;
use crate::transcript::TimedSegment;

pub use languages::{is_supported, language_name, same_language};
pub use ollama::{OllamaTranslator, check_ollama_availability};

/// Main trait for translation operations
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate every segment from `source` to `target`. The result has the
    /// same number of segments with unchanged timing.
    async fn translate(
        &self,
        segments: &[TimedSegment],
        source: &str,
        target: &str,
    ) -> Result<Vec<TimedSegment>>;
}

/// Factory for creating translator instances
pub struct TranslatorFactory;

impl TranslatorFactory {
    pub fn create_translator(config: TranslationConfig) -> Result<Arc<dyn Translator>> {
        Ok(Arc::new(OllamaTranslator::new(config)?))
    }
}

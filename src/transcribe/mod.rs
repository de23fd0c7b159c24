// Speech-to-text collaborators
//
// - WhisperCli: drives a whisper command line and maps its JSON output

pub mod whisper_cli;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::config::{ModelsConfig, TranscriptionConfig};
use crate::error::Result;
use crate::transcript::Transcript;

pub use whisper_cli::{WhisperCliTranscriber, WhisperOutput, WhisperSegment};

/// Main trait for transcription operations
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an audio file. A hint of `None` or `"auto"` asks for detection.
    async fn transcribe(&self, audio_path: &Path, language_hint: Option<&str>) -> Result<Transcript>;
}

/// Factory for creating transcriber instances
pub struct TranscriberFactory;

impl TranscriberFactory {
    pub fn create_transcriber(
        models: ModelsConfig,
        settings: TranscriptionConfig,
    ) -> Arc<dyn Transcriber> {
        Arc::new(WhisperCliTranscriber::new(models, settings))
    }
}

// Media collaborators for the extract and subtitles stages:
// - Commands: ffmpeg command builders
// - Processor: ffmpeg-backed extractor and embedder

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub use commands::*;
pub use processor::*;

use crate::config::{MediaConfig, StyleConfig};
use crate::error::Result;
use crate::stage::SubtitleMode;

/// Demuxes the audio track of a video into a file.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()>;
}

/// Produces a subtitled copy of a video.
#[async_trait]
pub trait SubtitleEmbedder: Send + Sync {
    async fn embed_subtitles(
        &self,
        video_path: &Path,
        subtitle_path: &Path,
        mode: SubtitleMode,
        output_path: &Path,
    ) -> Result<()>;
}

/// Factory for creating media processor instances
pub struct MediaProcessorFactory;

impl MediaProcessorFactory {
    /// Create the default media processor implementation (FFmpeg-based)
    pub fn create_processor(media: MediaConfig, style: StyleConfig) -> Arc<MediaProcessorImpl> {
        Arc::new(MediaProcessorImpl::new(media, style))
    }
}

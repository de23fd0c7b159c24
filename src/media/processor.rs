use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

use super::{AudioExtractor, MediaCommandBuilder, SubtitleEmbedder};
use crate::config::{MediaConfig, StyleConfig};
use crate::error::{Result, VidsubError};
use crate::stage::SubtitleMode;

/// Concrete implementation of media processor (FFmpeg-based)
pub struct MediaProcessorImpl {
    media: MediaConfig,
    style: StyleConfig,
    command_builder: MediaCommandBuilder,
}

impl MediaProcessorImpl {
    /// Create a new media processor implementation
    pub fn new(media: MediaConfig, style: StyleConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&media);

        Self {
            media,
            style,
            command_builder,
        }
    }

    /// Check if media processor is available
    pub async fn check_availability(&self) -> Result<()> {
        debug!("Checking media processor: {}", self.media.binary_path);
        self.command_builder
            .version_check()
            .execute()
            .await
            .map_err(|e| VidsubError::Media(format!("Media processor not available: {}", e)))?;
        info!("Media processor is available");
        Ok(())
    }

    fn check_style_assets(&self) -> Result<()> {
        if let Some(fonts_dir) = &self.style.fonts_dir {
            if !fonts_dir.is_dir() {
                return Err(VidsubError::Media(format!(
                    "Subtitle style asset missing: fonts directory {} does not exist",
                    fonts_dir.display()
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AudioExtractor for MediaProcessorImpl {
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()> {
        info!("Extracting audio from {} to {}", video_path.display(), audio_path.display());

        let command = self.command_builder.extract_audio(
            video_path,
            audio_path,
            &self.media,
            self.style.hwaccel(),
        );
        command.execute().await?;

        info!("Audio extraction completed");
        Ok(())
    }
}

#[async_trait]
impl SubtitleEmbedder for MediaProcessorImpl {
    async fn embed_subtitles(
        &self,
        video_path: &Path,
        subtitle_path: &Path,
        mode: SubtitleMode,
        output_path: &Path,
    ) -> Result<()> {
        info!(
            "Embedding {} subtitles from {} into {} -> {}",
            mode,
            subtitle_path.display(),
            video_path.display(),
            output_path.display()
        );

        let command = match mode {
            SubtitleMode::Soft => {
                self.command_builder
                    .soft_subtitles(video_path, subtitle_path, output_path)
            }
            SubtitleMode::Burned => {
                self.check_style_assets()?;
                self.command_builder.burned_subtitles(
                    video_path,
                    subtitle_path,
                    output_path,
                    &self.style,
                )
            }
        };

        command.execute().await?;

        info!("Subtitle embedding completed successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_burned_mode_requires_fonts_dir() {
        let dir = TempDir::new().unwrap();
        let style = StyleConfig {
            fonts_dir: Some(dir.path().join("no-fonts")),
            ..StyleConfig::default()
        };
        let media = MediaConfig {
            binary_path: "/nonexistent/ffmpeg-binary".to_string(),
            ..MediaConfig::default()
        };
        let processor = MediaProcessorImpl::new(media, style);

        let err = processor
            .embed_subtitles(
                Path::new("v.mp4"),
                Path::new("s.srt"),
                SubtitleMode::Burned,
                &PathBuf::from("o.mp4"),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("style asset"));
    }
}

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::config::{MediaConfig, StyleConfig};
use crate::error::{Result, VidsubError};

/// Abstract media processing command representation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
    pub timeout: Option<Duration>,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
            timeout: None,
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Hardware decoding hint, placed before the input it applies to
    pub fn hwaccel(self, hwaccel: Option<&str>) -> Self {
        match hwaccel {
            Some(value) => self.arg("-hwaccel").arg(value),
            None => self,
        }
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    pub fn subtitle_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:s").arg(codec)
    }

    /// Copy video stream
    pub fn copy_video(self) -> Self {
        self.video_codec("copy")
    }

    /// Copy audio stream
    pub fn copy_audio(self) -> Self {
        self.audio_codec("copy")
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Set audio sample rate
    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    /// Set audio channels
    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    /// Add video filter
    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Execute the command
    pub async fn execute(&self) -> Result<()> {
        debug!("Executing media processing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let running = cmd.output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, running).await.map_err(|_| {
                VidsubError::Media(format!(
                    "{} timed out after {}s",
                    self.description,
                    limit.as_secs()
                ))
            })?,
            None => running.await,
        }
        .map_err(|e| VidsubError::Media(format!("Failed to execute media processor: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VidsubError::Media(format!(
                "{} failed: {}",
                self.description,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

/// Builder for the ffmpeg invocations the pipeline needs
pub struct MediaCommandBuilder {
    binary_path: String,
    timeout: Option<Duration>,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new(media: &MediaConfig) -> Self {
        Self {
            binary_path: media.binary_path.clone(),
            timeout: media.timeout_secs.map(Duration::from_secs),
        }
    }

    fn command<S: Into<String>>(&self, description: S) -> MediaCommand {
        MediaCommand::new(&self.binary_path, description).timeout(self.timeout)
    }

    /// Build audio extraction command
    pub fn extract_audio<P: AsRef<Path>>(
        &self,
        video_path: P,
        audio_path: P,
        media: &MediaConfig,
        hwaccel: Option<&str>,
    ) -> MediaCommand {
        self.command("Audio extraction")
            .hwaccel(hwaccel)
            .input(video_path)
            .no_video()
            .audio_codec(media.audio_codec.clone())
            .audio_sample_rate(media.sample_rate)
            .audio_channels(media.channels)
            .overwrite()
            .output(audio_path)
    }

    /// Mux the subtitles as a selectable mov_text track
    pub fn soft_subtitles<P: AsRef<Path>>(
        &self,
        video_path: P,
        subtitle_path: P,
        output_path: P,
    ) -> MediaCommand {
        self.command("Soft subtitle embedding")
            .input(video_path)
            .input(subtitle_path)
            .copy_video()
            .copy_audio()
            .subtitle_codec("mov_text")
            .overwrite()
            .output(output_path)
    }

    /// Render the subtitles into the picture
    pub fn burned_subtitles<P: AsRef<Path>>(
        &self,
        video_path: P,
        subtitle_path: P,
        output_path: P,
        style: &StyleConfig,
    ) -> MediaCommand {
        self.command("Burned subtitle embedding")
            .hwaccel(style.hwaccel())
            .input(video_path)
            .video_filter(subtitles_filter(subtitle_path.as_ref(), style))
            .copy_audio()
            .video_codec("libx264")
            .arg("-preset")
            .arg(style.preset.clone())
            .arg("-crf")
            .arg(style.crf.to_string())
            .arg("-pix_fmt")
            .arg(style.pix_fmt.clone())
            .overwrite()
            .output(output_path)
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        self.command("Version check").arg("-version")
    }
}

/// ASS `force_style` override for the subtitles filter.
pub fn force_style(style: &StyleConfig) -> String {
    format!(
        "FontName={},FontSize={},PrimaryColour={},OutlineColour={},BorderStyle={},Outline={},Shadow={},Alignment={}",
        style.font_name,
        style.font_size,
        style.primary_colour,
        style.outline_colour,
        style.border_style,
        style.outline,
        style.shadow,
        style.position.alignment()
    )
}

/// `subtitles=` filter expression with the path quoted for ffmpeg's filter parser.
pub fn subtitles_filter(subtitle_path: &Path, style: &StyleConfig) -> String {
    let mut filter = format!("subtitles={}", quote_filter_value(&subtitle_path.to_string_lossy()));
    if let Some(fonts_dir) = &style.fonts_dir {
        filter.push_str(&format!(
            ":fontsdir={}",
            quote_filter_value(&fonts_dir.to_string_lossy())
        ));
    }
    filter.push_str(&format!(":force_style='{}'", force_style(style)));
    filter
}

fn quote_filter_value(value: &str) -> String {
    let escaped = value.replace('\\', "/").replace('\'', "'\\''");
    format!("'{}'", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SubtitlePosition;
    use std::path::PathBuf;

    #[test]
    fn test_extract_audio_arguments() {
        let media = MediaConfig::default();
        let builder = MediaCommandBuilder::new(&media);
        let cmd = builder.extract_audio(
            Path::new("in.mp4"),
            Path::new("out.mp3"),
            &media,
            Some("cuda"),
        );
        assert_eq!(
            cmd.args,
            vec![
                "-hwaccel", "cuda", "-i", "in.mp4", "-vn", "-c:a", "libmp3lame", "-ar", "16000",
                "-ac", "1", "-y", "out.mp3"
            ]
        );
    }

    #[test]
    fn test_soft_subtitles_copy_streams() {
        let builder = MediaCommandBuilder::new(&MediaConfig::default());
        let cmd = builder.soft_subtitles(Path::new("v.mp4"), Path::new("s.srt"), Path::new("o.mp4"));
        let joined = cmd.args.join(" ");
        assert_eq!(joined, "-i v.mp4 -i s.srt -c:v copy -c:a copy -c:s mov_text -y o.mp4");
    }

    #[test]
    fn test_burned_subtitles_style() {
        let style = StyleConfig {
            position: SubtitlePosition::Top,
            fonts_dir: Some(PathBuf::from("fonts")),
            ..StyleConfig::default()
        };
        let builder = MediaCommandBuilder::new(&MediaConfig::default());
        let cmd = builder.burned_subtitles(
            Path::new("v.mp4"),
            Path::new("it's.srt"),
            Path::new("o.mp4"),
            &style,
        );

        let filter = &cmd.args[cmd.args.iter().position(|a| a == "-vf").unwrap() + 1];
        assert!(filter.starts_with("subtitles='it'\\''s.srt':fontsdir='fonts':force_style='"));
        assert!(filter.contains("FontName=Arial,FontSize=24"));
        assert!(filter.ends_with("Alignment=8'"));
        assert!(cmd.args.windows(2).any(|w| w == ["-crf", "23"]));
        assert!(cmd.args.windows(2).any(|w| w == ["-c:v", "libx264"]));
    }

    #[tokio::test]
    async fn test_missing_binary_is_media_error() {
        let media = MediaConfig {
            binary_path: "/nonexistent/ffmpeg-binary".to_string(),
            ..MediaConfig::default()
        };
        let err = MediaCommandBuilder::new(&media)
            .version_check()
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, VidsubError::Media(_)));
    }
}

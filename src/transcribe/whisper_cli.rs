use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use super::Transcriber;
use crate::config::{ModelsConfig, TranscriptionConfig};
use crate::error::{Result, VidsubError};
use crate::transcript::{TimedSegment, Transcript};

/// Whisper JSON output format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperOutput {
    #[serde(default)]
    pub text: String,
    pub segments: Vec<WhisperSegment>,
    pub language: Option<String>,
}

/// Whisper segment format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperSegment {
    #[serde(default)]
    pub id: u64,
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub avg_logprob: Option<f64>,
    pub no_speech_prob: Option<f64>,
}

impl WhisperOutput {
    /// Convert to a normalized transcript tagged with the mapped language.
    pub fn into_transcript(self, language_hint: Option<&str>, models: &ModelsConfig) -> Transcript {
        let detected = self
            .language
            .filter(|l| !l.trim().is_empty())
            .or_else(|| language_hint.filter(|h| !is_auto(h)).map(str::to_string))
            .unwrap_or_else(|| "und".to_string());
        let language = models.map_language(&detected.to_lowercase());

        let segments = self
            .segments
            .into_iter()
            .map(|seg| TimedSegment::new(seg.start, seg.end, seg.text.trim()).with_language(&language))
            .collect();

        Transcript::new(language, segments).normalize()
    }
}

fn is_auto(hint: &str) -> bool {
    hint.trim().is_empty() || hint.eq_ignore_ascii_case("auto")
}

/// Runs the `whisper` command line tool into a temporary directory.
pub struct WhisperCliTranscriber {
    models: ModelsConfig,
    settings: TranscriptionConfig,
}

impl WhisperCliTranscriber {
    pub fn new(models: ModelsConfig, settings: TranscriptionConfig) -> Self {
        Self { models, settings }
    }

    /// Command line arguments for one run.
    pub fn build_args(&self, audio_path: &Path, output_dir: &Path, language_hint: Option<&str>) -> Vec<String> {
        let mut args = vec![
            audio_path.to_string_lossy().to_string(),
            "--model".to_string(),
            self.models.whisper_model.clone(),
            "--output_dir".to_string(),
            output_dir.to_string_lossy().to_string(),
            "--output_format".to_string(),
            "json".to_string(),
            "--task".to_string(),
            "transcribe".to_string(),
            "--beam_size".to_string(),
            self.settings.beam_size.to_string(),
            "--temperature".to_string(),
            self.settings.temperature.to_string(),
            "--device".to_string(),
            self.models.device.clone(),
        ];

        if let Some(lang) = language_hint.filter(|h| !is_auto(h)) {
            args.push("--language".to_string());
            args.push(lang.to_string());
        }
        if self.models.is_cpu() {
            args.push("--fp16".to_string());
            args.push("False".to_string());
        }
        if self.settings.word_timestamps {
            args.push("--word_timestamps".to_string());
            args.push("True".to_string());
        }
        if self.settings.vad_filter {
            args.extend([
                "--vad_filter".to_string(),
                "True".to_string(),
                "--vad_min_silence_duration_ms".to_string(),
                self.settings.min_silence_duration_ms.to_string(),
                "--max_initial_timestamp".to_string(),
                self.settings.max_initial_timestamp.to_string(),
            ]);
        }
        args.extend(self.settings.extra_args.iter().cloned());
        args
    }

    fn output_file(audio_path: &Path, output_dir: &Path) -> Result<PathBuf> {
        let stem = audio_path
            .file_stem()
            .ok_or_else(|| VidsubError::Transcriber("Invalid audio filename".to_string()))?;
        Ok(output_dir.join(format!("{}.json", stem.to_string_lossy())))
    }
}

#[async_trait]
impl Transcriber for WhisperCliTranscriber {
    async fn transcribe(&self, audio_path: &Path, language_hint: Option<&str>) -> Result<Transcript> {
        info!(
            "Transcribing {} with whisper model {}",
            audio_path.display(),
            self.models.whisper_model
        );

        let temp_dir = tempfile::tempdir()
            .map_err(|e| VidsubError::Transcriber(format!("Failed to create temp directory: {}", e)))?;
        let output_dir = temp_dir.path();
        let args = self.build_args(audio_path, output_dir, language_hint);
        debug!("Running {} {:?}", self.models.whisper_binary, args);

        let output = Command::new(&self.models.whisper_binary)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| VidsubError::Transcriber(format!("Failed to execute whisper: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VidsubError::Transcriber(format!("Whisper failed: {}", stderr.trim())));
        }

        let json_file = Self::output_file(audio_path, output_dir)?;
        let json_content = tokio::fs::read_to_string(&json_file)
            .await
            .map_err(|e| VidsubError::Transcriber(format!("Failed to read output: {}", e)))?;

        let whisper_output: WhisperOutput = serde_json::from_str(&json_content)
            .map_err(|e| VidsubError::Transcriber(format!("Failed to parse whisper JSON: {}", e)))?;

        let transcript = whisper_output.into_transcript(language_hint, &self.models);
        info!(
            "Transcription finished: {} segments, language {}",
            transcript.segments.len(),
            transcript.language
        );
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "text": " Hello there. How are you?",
        "segments": [
            {"id": 0, "start": 0.0, "end": 2.2, "text": " Hello there.", "avg_logprob": -0.2},
            {"id": 1, "start": 2.0, "end": 4.0, "text": " How are you?"},
            {"id": 2, "start": 4.0, "end": 4.5, "text": "  "}
        ],
        "language": "en"
    }"#;

    #[test]
    fn test_output_maps_language_and_normalizes() {
        let output: WhisperOutput = serde_json::from_str(SAMPLE).unwrap();
        let transcript = output.into_transcript(None, &ModelsConfig::default());

        assert_eq!(transcript.language, "eng_Latn");
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[0].end, 2.0);
        assert_eq!(transcript.segments[1].text, "How are you?");
        assert_eq!(transcript.segments[1].language.as_deref(), Some("eng_Latn"));
    }

    #[test]
    fn test_hint_used_when_language_missing() {
        let output = WhisperOutput {
            text: String::new(),
            segments: vec![],
            language: None,
        };
        let transcript = output.into_transcript(Some("tr"), &ModelsConfig::default());
        assert_eq!(transcript.language, "tur_Latn");
        assert!(transcript.is_empty());
    }

    #[test]
    fn test_args_omit_language_for_auto() {
        let transcriber =
            WhisperCliTranscriber::new(ModelsConfig::default(), TranscriptionConfig::default());
        let args = transcriber.build_args(Path::new("a.mp3"), Path::new("/tmp/out"), Some("auto"));
        assert!(!args.contains(&"--language".to_string()));
        assert!(args.windows(2).any(|w| w == ["--output_format", "json"]));
        assert!(args.windows(2).any(|w| w == ["--beam_size", "5"]));

        let args = transcriber.build_args(Path::new("a.mp3"), Path::new("/tmp/out"), Some("de"));
        assert!(args.windows(2).any(|w| w == ["--language", "de"]));
    }

    #[test]
    fn test_cpu_device_disables_fp16() {
        let models = ModelsConfig {
            device: "cpu".to_string(),
            ..ModelsConfig::default()
        };
        let transcriber = WhisperCliTranscriber::new(models, TranscriptionConfig::default());
        let args = transcriber.build_args(Path::new("a.mp3"), Path::new("out"), None);
        assert!(args.windows(2).any(|w| w == ["--fp16", "False"]));
    }
}

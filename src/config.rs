use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, VidsubError};
use crate::segment::{DEFAULT_MAX_MERGE_GAP, SegmenterConfig, SplitterMode};
use crate::stage::SubtitleMode;

fn default_video_extensions() -> Vec<String> {
    vec!["mp4".to_string()]
}

fn default_max_merge_gap() -> f64 {
    DEFAULT_MAX_MERGE_GAP
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub subtitles: SubtitlesConfig,
    #[serde(default)]
    pub style: StyleConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub accelerator: AcceleratorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Artifact locations. File names are templates where `{stem}` is replaced
/// by the input video's file stem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory scanned for input videos
    pub video_dir: PathBuf,
    /// Accepted video extensions, compared case-insensitively
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,
    pub audio_dir: PathBuf,
    pub audio_file: String,
    pub subs_original_dir: PathBuf,
    pub subs_original_srt: String,
    pub subs_original_txt: String,
    pub subs_original_json: String,
    pub subs_translated_dir: PathBuf,
    pub subs_translated_srt: String,
    pub subs_translated_txt: String,
    pub subs_translated_json: String,
    pub video_with_subs_dir: PathBuf,
    pub output_soft: String,
    pub output_burned: String,
    pub logs_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            video_dir: PathBuf::from("data/video"),
            video_extensions: default_video_extensions(),
            audio_dir: PathBuf::from("data/audio"),
            audio_file: "{stem}.mp3".to_string(),
            subs_original_dir: PathBuf::from("data/subs_original"),
            subs_original_srt: "{stem}.srt".to_string(),
            subs_original_txt: "{stem}.txt".to_string(),
            subs_original_json: "{stem}.json".to_string(),
            subs_translated_dir: PathBuf::from("data/subs_translated"),
            subs_translated_srt: "{stem}.srt".to_string(),
            subs_translated_txt: "{stem}.txt".to_string(),
            subs_translated_json: "{stem}.json".to_string(),
            video_with_subs_dir: PathBuf::from("data/video_with_subs"),
            output_soft: "{stem}_soft.mp4".to_string(),
            output_burned: "{stem}_burned.mp4".to_string(),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

impl PathsConfig {
    fn templates(&self) -> [(&'static str, &str); 9] {
        [
            ("audio_file", self.audio_file.as_str()),
            ("subs_original_srt", self.subs_original_srt.as_str()),
            ("subs_original_txt", self.subs_original_txt.as_str()),
            ("subs_original_json", self.subs_original_json.as_str()),
            ("subs_translated_srt", self.subs_translated_srt.as_str()),
            ("subs_translated_txt", self.subs_translated_txt.as_str()),
            ("subs_translated_json", self.subs_translated_json.as_str()),
            ("output_soft", self.output_soft.as_str()),
            ("output_burned", self.output_burned.as_str()),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Path to the whisper command line binary
    pub whisper_binary: String,
    /// Whisper model name (tiny, base, small, medium, large-v3)
    pub whisper_model: String,
    /// Inference device passed to whisper (cuda, cpu)
    pub device: String,
    /// Spoken language hint, or "auto" to detect
    pub source_lang: String,
    /// Translation target as an NLLB-style tag, e.g. "tur_Latn"
    pub target_lang: String,
    /// Whisper language code to NLLB tag
    #[serde(default = "default_language_code_map")]
    pub language_code_map: BTreeMap<String, String>,
}

fn default_language_code_map() -> BTreeMap<String, String> {
    [
        ("ar", "arb_Arab"),
        ("de", "deu_Latn"),
        ("en", "eng_Latn"),
        ("es", "spa_Latn"),
        ("fr", "fra_Latn"),
        ("it", "ita_Latn"),
        ("ja", "jpn_Jpan"),
        ("ko", "kor_Hang"),
        ("nl", "nld_Latn"),
        ("pt", "por_Latn"),
        ("ru", "rus_Cyrl"),
        ("tr", "tur_Latn"),
        ("zh", "zho_Hans"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            whisper_binary: "whisper".to_string(),
            whisper_model: "large-v3".to_string(),
            device: "cuda".to_string(),
            source_lang: "auto".to_string(),
            target_lang: "tur_Latn".to_string(),
            language_code_map: default_language_code_map(),
        }
    }
}

impl ModelsConfig {
    /// Map a whisper language code to its NLLB tag, passing unknown codes through.
    pub fn map_language(&self, code: &str) -> String {
        self.language_code_map
            .get(code)
            .cloned()
            .unwrap_or_else(|| code.to_string())
    }

    pub fn is_cpu(&self) -> bool {
        self.device.eq_ignore_ascii_case("cpu")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub beam_size: u32,
    /// Drop non-speech regions before decoding. Passes the VAD options,
    /// which only CTranslate2-based whisper command lines understand
    pub vad_filter: bool,
    pub word_timestamps: bool,
    /// Minimum silence that splits speech regions when the VAD filter is on
    pub min_silence_duration_ms: u32,
    /// Latest allowed timestamp of the first segment, in seconds
    pub max_initial_timestamp: f64,
    pub temperature: f32,
    /// Extra arguments appended to the whisper command line
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            beam_size: 5,
            vad_filter: false,
            word_timestamps: false,
            min_silence_duration_ms: 500,
            max_initial_timestamp: 1.0,
            temperature: 0.0,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// Ollama endpoint URL
    pub endpoint: String,
    /// LLM model to use for translation
    pub model: String,
    /// Maximum retries for failed translations
    pub max_retries: u32,
    pub request_timeout_secs: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            max_retries: 3,
            request_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitlesConfig {
    /// Maximum characters per rendered line
    pub max_line_length: usize,
    /// Maximum lines per cue
    pub max_lines: usize,
    pub splitter: SplitterMode,
    /// Seconds of silence above which segments never share a cue
    #[serde(default = "default_max_merge_gap")]
    pub max_merge_gap: f64,
    /// Mode used when the command line does not choose one
    pub mode: SubtitleMode,
}

impl Default for SubtitlesConfig {
    fn default() -> Self {
        Self {
            max_line_length: 42,
            max_lines: 2,
            splitter: SplitterMode::Linguistic,
            max_merge_gap: DEFAULT_MAX_MERGE_GAP,
            mode: SubtitleMode::Burned,
        }
    }
}

impl SubtitlesConfig {
    pub fn segmenter_config(&self) -> Result<SegmenterConfig> {
        SegmenterConfig::new(self.max_line_length, self.max_lines, self.splitter)?
            .with_max_merge_gap(self.max_merge_gap)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitlePosition {
    Bottom,
    Top,
    Center,
}

impl SubtitlePosition {
    /// ASS numpad alignment
    pub fn alignment(self) -> u8 {
        match self {
            Self::Bottom => 2,
            Self::Top => 8,
            Self::Center => 10,
        }
    }
}

/// Rendering of burned-in subtitles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleConfig {
    pub font_name: String,
    pub font_size: u32,
    /// ASS colour in &HAABBGGRR form
    pub primary_colour: String,
    pub outline_colour: String,
    pub border_style: u8,
    pub outline: u32,
    pub shadow: u32,
    pub position: SubtitlePosition,
    /// x264 preset (ultrafast, fast, medium, slow, veryslow)
    pub preset: String,
    /// Quality (0-51, lower = better quality)
    pub crf: u8,
    pub pix_fmt: String,
    /// ffmpeg -hwaccel value, "none" to disable
    pub hwaccel: String,
    /// Directory with fonts for the subtitles filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fonts_dir: Option<PathBuf>,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            font_name: "Arial".to_string(),
            font_size: 24,
            primary_colour: "&H00FFFFFF".to_string(),
            outline_colour: "&H00000000".to_string(),
            border_style: 1,
            outline: 2,
            shadow: 0,
            position: SubtitlePosition::Bottom,
            preset: "medium".to_string(),
            crf: 23,
            pix_fmt: "yuv420p".to_string(),
            hwaccel: "none".to_string(),
            fonts_dir: None,
        }
    }
}

impl StyleConfig {
    pub fn hwaccel(&self) -> Option<&str> {
        let value = self.hwaccel.trim();
        (!value.is_empty() && !value.eq_ignore_ascii_case("none")).then_some(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    pub audio_codec: String,
    pub sample_rate: u32,
    pub channels: u32,
    /// Kill ffmpeg after this many seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            audio_codec: "libmp3lame".to_string(),
            sample_rate: 16000,
            channels: 1,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceleratorConfig {
    /// Upper bound for one transcription or translation call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_timeout_secs: Option<u64>,
    /// Evict the translation model from device memory after each inference stage
    pub unload_translation_model: bool,
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        Self {
            inference_timeout_secs: None,
            unload_translation_model: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    pub file_name: String,
    /// Rotate at startup once the log exceeds this size
    pub max_file_size_mb: u64,
    /// Number of rotated files kept
    pub backups: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_name: "pipeline.log".to_string(),
            max_file_size_mb: 10,
            backups: 5,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VidsubError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| VidsubError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| VidsubError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| VidsubError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Reject settings that would only fail later, mid-run.
    pub fn validate(&self) -> Result<()> {
        self.subtitles.segmenter_config()?;

        for (name, template) in self.paths.templates() {
            if template.trim().is_empty() {
                return Err(VidsubError::Config(format!("paths.{} must not be empty", name)));
            }
        }
        if self.paths.video_extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(VidsubError::Config(
                "paths.video_extensions must list at least one extension".to_string(),
            ));
        }
        if self.models.target_lang.trim().is_empty() {
            return Err(VidsubError::Config("models.target_lang must be set".to_string()));
        }
        if self.models.whisper_model.trim().is_empty() {
            return Err(VidsubError::Config("models.whisper_model must be set".to_string()));
        }
        if self.translation.model.trim().is_empty() {
            return Err(VidsubError::Config("translation.model must be set".to_string()));
        }
        if self.transcription.beam_size == 0 {
            return Err(VidsubError::Config(
                "transcription.beam_size must be at least 1".to_string(),
            ));
        }
        if self.style.crf > 51 {
            return Err(VidsubError::Config(format!(
                "style.crf must be within 0-51, got {}",
                self.style.crf
            )));
        }
        if self.style.font_size == 0 {
            return Err(VidsubError::Config("style.font_size must be positive".to_string()));
        }
        if self.logging.max_file_size_mb == 0 {
            return Err(VidsubError::Config(
                "logging.max_file_size_mb must be positive".to_string(),
            ));
        }
        if self.accelerator.inference_timeout_secs == Some(0) {
            return Err(VidsubError::Config(
                "accelerator.inference_timeout_secs must be positive".to_string(),
            ));
        }
        if self.media.timeout_secs == Some(0) {
            return Err(VidsubError::Config("media.timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::artifacts::write_atomic;
use crate::error::{Result, VidsubError};
use crate::segment::Cue;
use crate::transcript::{TimedSegment, Transcript};

/// JSON dump persisted next to the SRT and text renderings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleDocument {
    pub generated_at: DateTime<Utc>,
    pub source_language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
    pub segments: Vec<TimedSegment>,
    pub cues: Vec<Cue>,
}

impl SubtitleDocument {
    /// Document for a transcript in its spoken language.
    pub fn original(transcript: &Transcript, cues: Vec<Cue>) -> Self {
        Self {
            generated_at: Utc::now(),
            source_language: transcript.language.clone(),
            target_language: None,
            segments: transcript.segments.clone(),
            cues,
        }
    }

    /// Document for translated segments; `transcript.language` is the target.
    pub fn translated(source_language: &str, transcript: &Transcript, cues: Vec<Cue>) -> Self {
        Self {
            generated_at: Utc::now(),
            source_language: source_language.to_string(),
            target_language: Some(transcript.language.clone()),
            segments: transcript.segments.clone(),
            cues,
        }
    }

    /// The segments as a transcript in the language they are written in.
    pub fn transcript(&self) -> Transcript {
        let language = self
            .target_language
            .clone()
            .unwrap_or_else(|| self.source_language.clone());
        Transcript::new(language, self.segments.clone())
    }
}

/// Render cues as SubRip text.
pub fn render_srt(cues: &[Cue]) -> String {
    let mut srt_content = String::new();

    for cue in cues {
        srt_content.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            cue.index,
            format_srt_time(cue.start),
            format_srt_time(cue.end),
            cue.text()
        ));
    }

    srt_content
}

/// Render cues as plain text, one blank line between cues.
pub fn render_text(cues: &[Cue]) -> String {
    let mut text = cues.iter().map(Cue::text).collect::<Vec<_>>().join("\n\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}

pub fn render_json(document: &SubtitleDocument) -> Result<String> {
    Ok(serde_json::to_string_pretty(document)?)
}

pub fn write_srt<P: AsRef<Path>>(path: P, cues: &[Cue]) -> Result<()> {
    let path = path.as_ref();
    info!("Writing SRT file: {} ({} cues)", path.display(), cues.len());
    write_atomic(path, render_srt(cues).as_bytes())
}

pub fn write_text<P: AsRef<Path>>(path: P, cues: &[Cue]) -> Result<()> {
    let path = path.as_ref();
    info!("Writing text file: {}", path.display());
    write_atomic(path, render_text(cues).as_bytes())
}

pub fn write_json<P: AsRef<Path>>(path: P, document: &SubtitleDocument) -> Result<()> {
    let path = path.as_ref();
    info!("Writing JSON document: {}", path.display());
    write_atomic(path, render_json(document)?.as_bytes())
}

/// Read a JSON document and check its segment invariants.
pub fn load_document<P: AsRef<Path>>(path: P) -> Result<SubtitleDocument> {
    let path = path.as_ref();
    let content =
        std::fs::read_to_string(path).map_err(|e| VidsubError::artifact_io(path, e))?;
    let document: SubtitleDocument = serde_json::from_str(&content).map_err(|e| {
        VidsubError::InvalidTranscript(format!("{}: {}", path.display(), e))
    })?;
    document.transcript().validate()?;
    Ok(document)
}

/// Format time in seconds to SRT time format (HH:MM:SS,mmm)
pub fn format_srt_time(seconds: f64) -> String {
    let total_milliseconds = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_milliseconds / 3_600_000;
    let minutes = (total_milliseconds % 3_600_000) / 60_000;
    let secs = (total_milliseconds % 60_000) / 1_000;
    let millis = total_milliseconds % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cue(index: usize, start: f64, end: f64, lines: &[&str]) -> Cue {
        Cue {
            index,
            start,
            end,
            lines: lines.iter().map(|l| l.to_string()).collect(),
            source_language: None,
            target_language: None,
        }
    }

    #[test]
    fn test_format_srt_time() {
        assert_eq!(format_srt_time(0.0), "00:00:00,000");
        assert_eq!(format_srt_time(65.123), "00:01:05,123");
        assert_eq!(format_srt_time(3661.500), "01:01:01,500");
        assert_eq!(format_srt_time(-2.0), "00:00:00,000");
    }

    #[test]
    fn test_render_srt() {
        let cues = vec![
            cue(1, 0.0, 2.0, &["Hello there."]),
            cue(2, 2.0, 3.5, &["How are you", "today?"]),
        ];
        assert_eq!(
            render_srt(&cues),
            "1\n00:00:00,000 --> 00:00:02,000\nHello there.\n\n\
             2\n00:00:02,000 --> 00:00:03,500\nHow are you\ntoday?\n\n"
        );
    }

    #[test]
    fn test_render_text() {
        let cues = vec![cue(1, 0.0, 1.0, &["a", "b"]), cue(2, 1.0, 2.0, &["c"])];
        assert_eq!(render_text(&cues), "a\nb\n\nc\n");
        assert_eq!(render_text(&[]), "");
    }

    #[test]
    fn test_document_written_and_loaded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        let transcript = Transcript::new("en", vec![TimedSegment::new(0.0, 1.5, "Hi.")]);
        let document = SubtitleDocument::original(&transcript, vec![cue(1, 0.0, 1.5, &["Hi."])]);

        write_json(&path, &document).unwrap();
        let loaded = load_document(&path).unwrap();
        assert_eq!(loaded, document);
        assert_eq!(loaded.transcript(), transcript);
    }

    #[test]
    fn test_translated_document_reports_target_language() {
        let translated = Transcript::new("tur_Latn", vec![TimedSegment::new(0.0, 1.0, "Merhaba.")]);
        let document = SubtitleDocument::translated("en", &translated, Vec::new());
        assert_eq!(document.transcript().language, "tur_Latn");
        assert_eq!(document.source_language, "en");
    }

    #[test]
    fn test_load_missing_document_is_artifact_error() {
        let dir = TempDir::new().unwrap();
        let err = load_document(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, VidsubError::ArtifactIo { .. }));
    }

    #[test]
    fn test_load_rejects_corrupt_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_document(&path),
            Err(VidsubError::InvalidTranscript(_))
        ));
    }
}

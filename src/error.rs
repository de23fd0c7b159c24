use std::path::PathBuf;
use thiserror::Error;

use crate::stage::Stage;

#[derive(Error, Debug)]
pub enum VidsubError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stage '{stage}' requires {} which is produced by stage '{producer}'", .artifact.display())]
    MissingPrerequisite {
        stage: Stage,
        artifact: PathBuf,
        producer: Stage,
    },

    #[error("No eligible input video found at {}", .0.display())]
    NoInputFound(PathBuf),

    #[error("Stage '{stage}' failed: {source}")]
    Collaborator {
        stage: Stage,
        #[source]
        source: Box<VidsubError>,
    },

    #[error("Stage '{stage}' timed out after {seconds}s")]
    Timeout { stage: Stage, seconds: u64 },

    #[error("Run cancelled before stage '{before}'")]
    Cancelled { before: Stage },

    #[error("Artifact I/O error on {}: {source}", .path.display())]
    ArtifactIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid transcript: {0}")]
    InvalidTranscript(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transcription error: {0}")]
    Transcriber(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Media processing error: {0}")]
    Media(String),
}

impl VidsubError {
    pub fn artifact_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ArtifactIo {
            path: path.into(),
            source,
        }
    }

    /// Tag an error raised while a stage was executing. Errors that already
    /// carry stage context, and artifact I/O or parse failures, keep their own variant.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            Self::Collaborator { .. }
            | Self::Timeout { .. }
            | Self::Cancelled { .. }
            | Self::MissingPrerequisite { .. }
            | Self::NoInputFound(_)
            | Self::ArtifactIo { .. }
            | Self::InvalidTranscript(_)
            | Self::Config(_) => self,
            other => Self::Collaborator {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage the error is attributed to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::MissingPrerequisite { stage, .. }
            | Self::Collaborator { stage, .. }
            | Self::Timeout { stage, .. } => Some(*stage),
            Self::Cancelled { before } => Some(*before),
            _ => None,
        }
    }

    /// Process exit status for the command surface.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Toml(_) => 2,
            Self::MissingPrerequisite { .. } => 3,
            Self::NoInputFound(_) => 4,
            Self::Collaborator { .. } | Self::Timeout { .. } => 5,
            Self::ArtifactIo { .. } | Self::InvalidTranscript(_) => 6,
            Self::Cancelled { .. } => 130,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, VidsubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_stage_wraps_collaborator_failures() {
        let err = VidsubError::Media("no audio stream".to_string()).in_stage(Stage::Extract);
        assert_eq!(err.stage(), Some(Stage::Extract));
        assert_eq!(err.exit_code(), 5);
        assert!(err.to_string().contains("no audio stream"));
    }

    #[test]
    fn test_in_stage_keeps_artifact_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = VidsubError::artifact_io("/tmp/out.srt", io).in_stage(Stage::Translate);
        assert!(matches!(err, VidsubError::ArtifactIo { .. }));
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn test_in_stage_keeps_invalid_transcript() {
        let err = VidsubError::InvalidTranscript("segment 2 overlaps".to_string())
            .in_stage(Stage::Translate);
        assert!(matches!(err, VidsubError::InvalidTranscript(_)));
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn test_exit_codes_are_distinct_for_taxonomy() {
        let missing = VidsubError::MissingPrerequisite {
            stage: Stage::Translate,
            artifact: PathBuf::from("subs/original.json"),
            producer: Stage::Transcribe,
        };
        let codes = [
            VidsubError::Config("bad".to_string()).exit_code(),
            missing.exit_code(),
            VidsubError::NoInputFound(PathBuf::from("data/video")).exit_code(),
            VidsubError::Timeout { stage: Stage::Transcribe, seconds: 5 }.exit_code(),
        ];
        assert_eq!(codes, [2, 3, 4, 5]);
        assert!(missing.to_string().contains("transcribe"));
    }
}

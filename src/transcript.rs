use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, VidsubError};

/// A span of recognized or translated speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedSegment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl TimedSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    fn has_valid_bounds(&self) -> bool {
        self.start.is_finite() && self.end.is_finite() && self.start >= 0.0 && self.start < self.end
    }
}

/// Ordered, non-overlapping segments in a single language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub language: String,
    pub segments: Vec<TimedSegment>,
}

impl Transcript {
    pub fn new(language: impl Into<String>, segments: Vec<TimedSegment>) -> Self {
        Self {
            language: language.into(),
            segments,
        }
    }

    /// Repair collaborator output so the segment invariants hold.
    ///
    /// Blank and non-finite segments are dropped, the rest are sorted by start,
    /// a segment overlapping its successor is clamped to end where the successor
    /// begins, and anything left without positive duration is dropped.
    pub fn normalize(mut self) -> Self {
        let before = self.segments.len();

        let mut segments: Vec<TimedSegment> = self
            .segments
            .into_iter()
            .filter_map(|mut segment| {
                if segment.is_blank() {
                    debug!("Dropping blank segment at {:.3}s", segment.start);
                    return None;
                }
                if !segment.start.is_finite() || !segment.end.is_finite() {
                    warn!("Dropping segment with non-finite timing: {:?}", segment.text);
                    return None;
                }
                segment.start = segment.start.max(0.0);
                segment.text = segment.text.trim().to_string();
                Some(segment)
            })
            .collect();

        segments.sort_by(|a, b| a.start.total_cmp(&b.start));

        for i in 1..segments.len() {
            let next_start = segments[i].start;
            let previous = &mut segments[i - 1];
            if previous.end > next_start {
                warn!(
                    "Clamping overlapping segment end {:.3}s to {:.3}s",
                    previous.end, next_start
                );
                previous.end = next_start;
            }
        }

        segments.retain(|segment| {
            let keep = segment.start < segment.end;
            if !keep {
                warn!(
                    "Dropping zero-length segment at {:.3}s: {:?}",
                    segment.start, segment.text
                );
            }
            keep
        });

        if segments.len() != before {
            debug!("Normalized transcript: {} -> {} segments", before, segments.len());
        }
        self.segments = segments;
        self
    }

    /// Check ordering and bounds of persisted segments.
    pub fn validate(&self) -> Result<()> {
        for (index, segment) in self.segments.iter().enumerate() {
            if !segment.has_valid_bounds() {
                return Err(VidsubError::InvalidTranscript(format!(
                    "segment {} has invalid bounds {}..{}",
                    index + 1,
                    segment.start,
                    segment.end
                )));
            }
        }
        for (index, pair) in self.segments.windows(2).enumerate() {
            if pair[0].end > pair[1].start {
                return Err(VidsubError::InvalidTranscript(format!(
                    "segment {} ends at {} after segment {} starts at {}",
                    index + 1,
                    pair[0].end,
                    index + 2,
                    pair[1].start
                )));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_sorts_clamps_and_drops() {
        let transcript = Transcript::new(
            "en",
            vec![
                TimedSegment::new(4.0, 6.0, "third"),
                TimedSegment::new(0.0, 2.5, " first "),
                TimedSegment::new(2.0, 4.0, "second"),
                TimedSegment::new(7.0, 8.0, "   "),
                TimedSegment::new(9.0, 9.0, "empty window"),
            ],
        )
        .normalize();

        let spans: Vec<_> = transcript
            .segments
            .iter()
            .map(|s| (s.start, s.end, s.text.as_str()))
            .collect();
        assert_eq!(
            spans,
            vec![(0.0, 2.0, "first"), (2.0, 4.0, "second"), (4.0, 6.0, "third")]
        );
        assert!(transcript.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let transcript = Transcript::new(
            "en",
            vec![TimedSegment::new(0.0, 3.0, "a"), TimedSegment::new(2.0, 4.0, "b")],
        );
        assert!(matches!(
            transcript.validate(),
            Err(VidsubError::InvalidTranscript(_))
        ));
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let transcript = Transcript::new("en", vec![TimedSegment::new(3.0, 1.0, "a")]);
        assert!(transcript.validate().is_err());
    }

    #[test]
    fn test_text_joins_segments() {
        let transcript = Transcript::new(
            "en",
            vec![TimedSegment::new(0.0, 1.0, "Hello"), TimedSegment::new(1.0, 2.0, "world")],
        );
        assert_eq!(transcript.text(), "Hello world");
    }
}

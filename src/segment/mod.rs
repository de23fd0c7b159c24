//! Packs timed segments into display cues that respect line-length and
//! line-count limits.

pub mod splitter;
pub mod wrap;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::error::{Result, VidsubError};
use crate::transcript::TimedSegment;

pub use splitter::{LinguisticSplitter, RegexSplitter, SentenceSplitter, SplitterMode};
pub use wrap::{Script, measure, wrap};

/// Gap in seconds above which neighbouring segments never share a cue.
pub const DEFAULT_MAX_MERGE_GAP: f64 = 2.0;

/// A display unit of one or more subtitle lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// 1-based position in the subtitle file
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub lines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
}

impl Cue {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn with_languages(mut self, source: Option<&str>, target: Option<&str>) -> Self {
        self.source_language = source.map(str::to_string);
        self.target_language = target.map(str::to_string);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmenterConfig {
    max_line_length: usize,
    max_lines: usize,
    splitter: SplitterMode,
    max_merge_gap: f64,
}

impl SegmenterConfig {
    pub fn new(max_line_length: usize, max_lines: usize, splitter: SplitterMode) -> Result<Self> {
        if max_line_length == 0 {
            return Err(VidsubError::Config(
                "max_line_length must be at least 1".to_string(),
            ));
        }
        if max_lines == 0 {
            return Err(VidsubError::Config("max_lines must be at least 1".to_string()));
        }
        Ok(Self {
            max_line_length,
            max_lines,
            splitter,
            max_merge_gap: DEFAULT_MAX_MERGE_GAP,
        })
    }

    pub fn with_max_merge_gap(mut self, seconds: f64) -> Result<Self> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(VidsubError::Config(format!(
                "max_merge_gap must be a non-negative number of seconds, got {}",
                seconds
            )));
        }
        self.max_merge_gap = seconds;
        Ok(self)
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    pub fn splitter(&self) -> SplitterMode {
        self.splitter
    }

    pub fn max_merge_gap(&self) -> f64 {
        self.max_merge_gap
    }
}

/// A packed line and the segments whose text it carries.
#[derive(Debug)]
struct Line {
    text: String,
    width: usize,
    sources: Vec<usize>,
}

impl Line {
    fn new(text: String, source: usize) -> Self {
        Self {
            width: measure(&text),
            text,
            sources: vec![source],
        }
    }

    fn append(&mut self, separator: &str, unit: &str, width: usize, source: usize) {
        self.text.push_str(separator);
        self.text.push_str(unit);
        self.width += measure(separator) + width;
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
    }
}

pub struct Segmenter {
    config: SegmenterConfig,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Turn ordered segments into numbered cues.
    ///
    /// `language` selects sentence rules and the joiner between units; cues
    /// are tagged with it as their source language.
    pub fn segment(&self, segments: &[TimedSegment], language: Option<&str>) -> Vec<Cue> {
        let max_width = self.config.max_line_length;
        let splitter = self.config.splitter.splitter(language);
        let separator = Script::for_language(language).separator();
        let separator_width = measure(separator);

        let mut lines: Vec<Line> = Vec::new();
        let mut current: Option<Line> = None;
        let mut forced_breaks: BTreeSet<usize> = BTreeSet::new();
        let mut previous_end: Option<f64> = None;

        for (index, segment) in segments.iter().enumerate() {
            let text = segment.text.trim();
            if text.is_empty() {
                continue;
            }

            if let Some(end) = previous_end {
                if segment.start - end > self.config.max_merge_gap {
                    lines.extend(current.take());
                    forced_breaks.insert(lines.len());
                }
            }
            previous_end = Some(segment.end);

            for unit in splitter.split(text) {
                let width = measure(&unit);
                if width > max_width {
                    lines.extend(current.take());
                    let mut pieces = wrap(&unit, max_width);
                    // a sentence that fits in one cue must not straddle a cue boundary
                    let max_lines = self.config.max_lines;
                    let last_break = forced_breaks.last().copied().unwrap_or(0);
                    let used = (lines.len() - last_break) % max_lines;
                    if pieces.len() <= max_lines && used + pieces.len() > max_lines {
                        forced_breaks.insert(lines.len());
                    }
                    current = pieces.pop().map(|last| Line::new(last, index));
                    lines.extend(pieces.into_iter().map(|piece| Line::new(piece, index)));
                    continue;
                }

                match current.as_mut() {
                    Some(line) if line.width + separator_width + width <= max_width => {
                        line.append(separator, &unit, width, index);
                    }
                    _ => {
                        lines.extend(current.take());
                        current = Some(Line::new(unit, index));
                    }
                }
            }
        }
        lines.extend(current.take());

        let groups = self.group_lines(lines, &forced_breaks);
        let cues = time_cues(groups, segments, language);
        debug!(
            "Segmented {} segments into {} cues (max {}x{})",
            segments.len(),
            cues.len(),
            self.config.max_lines,
            max_width
        );
        cues
    }

    fn group_lines(&self, lines: Vec<Line>, forced_breaks: &BTreeSet<usize>) -> Vec<Vec<Line>> {
        let mut groups: Vec<Vec<Line>> = Vec::new();
        for (position, line) in lines.into_iter().enumerate() {
            let forced = forced_breaks.contains(&position);
            match groups.last_mut() {
                Some(group) if !forced && group.len() < self.config.max_lines => group.push(line),
                _ => groups.push(vec![line]),
            }
        }
        groups
    }
}

/// Assign each cue the span of its contributing segments. A segment shown
/// across `k` cues is divided into `k` equal consecutive slots.
fn time_cues(groups: Vec<Vec<Line>>, segments: &[TimedSegment], language: Option<&str>) -> Vec<Cue> {
    let cue_sources: Vec<BTreeSet<usize>> = groups
        .iter()
        .map(|group| group.iter().flat_map(|line| line.sources.iter().copied()).collect())
        .collect();

    let mut appearances: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (cue, sources) in cue_sources.iter().enumerate() {
        for &source in sources {
            appearances.entry(source).or_default().push(cue);
        }
    }

    let slot = |source: usize, cue: usize| -> (f64, f64) {
        let segment = &segments[source];
        let cues = appearances.get(&source).map(Vec::as_slice).unwrap_or(&[]);
        let count = cues.len().max(1);
        let position = cues.iter().position(|&c| c == cue).unwrap_or(0);
        let step = segment.duration() / count as f64;
        let start = segment.start + step * position as f64;
        let end = if position + 1 == count {
            segment.end
        } else {
            segment.start + step * (position + 1) as f64
        };
        (start, end)
    };

    groups
        .into_iter()
        .zip(cue_sources.iter())
        .enumerate()
        .map(|(cue, (group, sources))| {
            let (start, end) = sources.iter().fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(start, end), &source| {
                    let (slot_start, slot_end) = slot(source, cue);
                    (start.min(slot_start), end.max(slot_end))
                },
            );
            Cue {
                index: cue + 1,
                start,
                end,
                lines: group.into_iter().map(|line| line.text).collect(),
                source_language: language.map(str::to_string),
                target_language: None,
            }
        })
        .collect()
}

//! Pipeline stage identities, run requests and the per-run state machine.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error};

use crate::error::{Result, VidsubError};

/// One of the four pipeline phases, ordered by data dependency.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Demux the audio track from the input video
    Extract,
    /// Speech-to-text on the extracted audio
    Transcribe,
    /// Machine translation of the original transcript
    Translate,
    /// Embed translated subtitles into the video
    Subtitles,
}

impl Stage {
    /// Canonical execution order.
    pub const ALL: [Stage; 4] = [
        Stage::Extract,
        Stage::Transcribe,
        Stage::Translate,
        Stage::Subtitles,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Transcribe => "transcribe",
            Self::Translate => "translate",
            Self::Subtitles => "subtitles",
        }
    }

    /// Whether the stage runs an inference collaborator on the shared accelerator.
    pub fn uses_accelerator(self) -> bool {
        matches!(self, Self::Transcribe | Self::Translate)
    }

    /// The run state entered while this stage executes.
    pub fn running_state(self) -> RunState {
        match self {
            Self::Extract => RunState::Extracting,
            Self::Transcribe => RunState::Transcribing,
            Self::Translate => RunState::Translating,
            Self::Subtitles => RunState::Embedding,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How the translated subtitles are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleMode {
    /// Selectable subtitle track muxed into the container
    Soft,
    /// Subtitles rendered into the video pixels
    #[default]
    Burned,
}

impl fmt::Display for SubtitleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Soft => f.write_str("soft"),
            Self::Burned => f.write_str("burned"),
        }
    }
}

/// Which stages a run should consider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StageSelection {
    /// Every stage; stages whose outputs already exist are skipped
    #[default]
    Full,
    /// Exactly these stages, always re-executed
    Explicit(BTreeSet<Stage>),
}

impl StageSelection {
    /// Build a selection from a list of requested steps. An empty list means
    /// the full pipeline.
    pub fn from_steps<I: IntoIterator<Item = Stage>>(steps: I) -> Self {
        let set: BTreeSet<Stage> = steps.into_iter().collect();
        if set.is_empty() {
            Self::Full
        } else {
            Self::Explicit(set)
        }
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self, Self::Explicit(_))
    }
}

/// A validated request for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub video: Option<PathBuf>,
    pub stages: StageSelection,
    pub mode: SubtitleMode,
}

impl RunRequest {
    pub fn full(mode: SubtitleMode) -> Self {
        Self {
            video: None,
            stages: StageSelection::Full,
            mode,
        }
    }

    pub fn with_video<P: Into<PathBuf>>(mut self, video: P) -> Self {
        self.video = Some(video.into());
        self
    }

    pub fn with_stages<I: IntoIterator<Item = Stage>>(mut self, stages: I) -> Self {
        self.stages = StageSelection::from_steps(stages);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let StageSelection::Explicit(set) = &self.stages {
            if set.is_empty() {
                return Err(VidsubError::Config(
                    "Explicit stage selection must name at least one stage".to_string(),
                ));
            }
        }
        if let Some(video) = &self.video {
            if video.as_os_str().is_empty() {
                return Err(VidsubError::Config("Video path is empty".to_string()));
            }
        }
        Ok(())
    }
}

/// Whether a planned stage executes or is satisfied by existing artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageAction {
    Run,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedStage {
    pub stage: Stage,
    pub action: StageAction,
}

/// Decide which stages run, in canonical order.
///
/// `outputs_present` reports whether every output artifact of a stage already
/// exists. It is only consulted for the full pipeline: explicitly requested
/// stages always run and unrequested ones are left out of the plan.
pub fn plan_stages<F>(selection: &StageSelection, mut outputs_present: F) -> Vec<PlannedStage>
where
    F: FnMut(Stage) -> bool,
{
    Stage::ALL
        .into_iter()
        .filter_map(|stage| match selection {
            StageSelection::Full => {
                let action = if outputs_present(stage) {
                    StageAction::Skip
                } else {
                    StageAction::Run
                };
                Some(PlannedStage { stage, action })
            }
            StageSelection::Explicit(set) => set.contains(&stage).then_some(PlannedStage {
                stage,
                action: StageAction::Run,
            }),
        })
        .collect()
}

/// Lifecycle of a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Validating,
    Extracting,
    Transcribing,
    Translating,
    Embedding,
    Completed,
    Failed { stage: Option<Stage>, reason: String },
}

impl RunState {
    fn stage_rank(&self) -> Option<usize> {
        match self {
            Self::Extracting => Some(0),
            Self::Transcribing => Some(1),
            Self::Translating => Some(2),
            Self::Embedding => Some(3),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Validating => f.write_str("validating"),
            Self::Extracting => f.write_str("extracting"),
            Self::Transcribing => f.write_str("transcribing"),
            Self::Translating => f.write_str("translating"),
            Self::Embedding => f.write_str("embedding"),
            Self::Completed => f.write_str("completed"),
            Self::Failed { stage: Some(stage), .. } => write!(f, "failed at {}", stage),
            Self::Failed { stage: None, .. } => f.write_str("failed"),
        }
    }
}

/// Sequencer enforcing `Pending → Validating → stages* → Completed | Failed`.
#[derive(Debug, Clone)]
pub struct RunStateMachine {
    history: Vec<RunState>,
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStateMachine {
    pub fn new() -> Self {
        Self {
            history: vec![RunState::Pending],
        }
    }

    pub fn current(&self) -> &RunState {
        // history always starts with Pending
        &self.history[self.history.len() - 1]
    }

    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub fn can_advance(&self, next: &RunState) -> bool {
        let current = self.current();
        if current.is_terminal() {
            return false;
        }
        match (current, next) {
            (RunState::Pending, RunState::Validating) => true,
            (RunState::Pending, _) => false,
            (_, RunState::Completed) | (_, RunState::Failed { .. }) => {
                !matches!(current, RunState::Pending)
            }
            (RunState::Validating, next) => next.stage_rank().is_some(),
            (current, next) => match (current.stage_rank(), next.stage_rank()) {
                (Some(from), Some(to)) => to > from,
                _ => false,
            },
        }
    }

    /// Move to `next`, returning whether the transition was legal.
    pub fn advance(&mut self, next: RunState) -> bool {
        if self.can_advance(&next) {
            debug!("Run state: {} -> {}", self.current(), next);
            self.history.push(next);
            true
        } else {
            error!("Illegal run state transition: {} -> {}", self.current(), next);
            false
        }
    }

    pub fn into_history(self) -> Vec<RunState> {
        self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_plan_skips_stages_with_outputs() {
        let plan = plan_stages(&StageSelection::Full, |stage| stage <= Stage::Transcribe);
        let actions: Vec<_> = plan.iter().map(|p| (p.stage, p.action)).collect();
        assert_eq!(
            actions,
            vec![
                (Stage::Extract, StageAction::Skip),
                (Stage::Transcribe, StageAction::Skip),
                (Stage::Translate, StageAction::Run),
                (Stage::Subtitles, StageAction::Run),
            ]
        );
    }

    #[test]
    fn test_explicit_plan_uses_canonical_order_and_ignores_outputs() {
        let selection = StageSelection::from_steps([Stage::Subtitles, Stage::Extract]);
        let plan = plan_stages(&selection, |_| true);
        assert_eq!(
            plan,
            vec![
                PlannedStage { stage: Stage::Extract, action: StageAction::Run },
                PlannedStage { stage: Stage::Subtitles, action: StageAction::Run },
            ]
        );
    }

    #[test]
    fn test_empty_steps_mean_full_pipeline() {
        assert_eq!(StageSelection::from_steps(Vec::new()), StageSelection::Full);
        assert!(RunRequest::full(SubtitleMode::Soft).validate().is_ok());
    }

    #[test]
    fn test_explicit_empty_selection_is_rejected() {
        let request = RunRequest {
            video: None,
            stages: StageSelection::Explicit(BTreeSet::new()),
            mode: SubtitleMode::Burned,
        };
        assert!(matches!(request.validate(), Err(VidsubError::Config(_))));
    }

    #[test]
    fn test_state_machine_happy_path() {
        let mut machine = RunStateMachine::new();
        assert!(machine.advance(RunState::Validating));
        assert!(machine.advance(RunState::Transcribing));
        assert!(machine.advance(RunState::Embedding));
        assert!(machine.advance(RunState::Completed));
        assert_eq!(machine.history().len(), 5);
    }

    #[test]
    fn test_state_machine_rejects_backwards_and_post_terminal_moves() {
        let mut machine = RunStateMachine::new();
        assert!(!machine.advance(RunState::Extracting));
        assert!(machine.advance(RunState::Validating));
        assert!(machine.advance(RunState::Translating));
        assert!(!machine.advance(RunState::Transcribing));
        assert!(machine.advance(RunState::Failed {
            stage: Some(Stage::Translate),
            reason: "model error".to_string(),
        }));
        assert!(!machine.advance(RunState::Completed));
        assert_eq!(machine.current().to_string(), "failed at translate");
    }

    #[test]
    fn test_stage_labels_and_accelerator_usage() {
        let labels: Vec<_> = Stage::ALL.iter().map(|s| s.to_string()).collect();
        assert_eq!(labels, ["extract", "transcribe", "translate", "subtitles"]);
        assert!(Stage::Transcribe.uses_accelerator());
        assert!(!Stage::Subtitles.uses_accelerator());
    }
}

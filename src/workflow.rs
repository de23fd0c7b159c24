use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::accelerator::Accelerator;
use crate::artifacts::{
    ArtifactLayout, ArtifactProbe, FsProbe, StageArtifact, StagedOutput, select_video,
};
use crate::config::Config;
use crate::error::{Result, VidsubError};
use crate::media::{AudioExtractor, MediaProcessorFactory, SubtitleEmbedder};
use crate::segment::Segmenter;
use crate::stage::{
    PlannedStage, RunRequest, RunState, RunStateMachine, Stage, StageAction, SubtitleMode,
    plan_stages,
};
use crate::subtitle::{self, SubtitleDocument};
use crate::transcribe::{Transcriber, TranscriberFactory};
use crate::transcript::{TimedSegment, Transcript};
use crate::translate::{Translator, TranslatorFactory};

/// External tools each stage delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn AudioExtractor>,
    pub transcriber: Arc<dyn Transcriber>,
    pub translator: Arc<dyn Translator>,
    pub embedder: Arc<dyn SubtitleEmbedder>,
}

impl Collaborators {
    /// ffmpeg, whisper and Ollama backed collaborators.
    pub fn from_config(config: &Config) -> Result<Self> {
        let media =
            MediaProcessorFactory::create_processor(config.media.clone(), config.style.clone());
        Ok(Self {
            extractor: media.clone(),
            transcriber: TranscriberFactory::create_transcriber(
                config.models.clone(),
                config.transcription.clone(),
            ),
            translator: TranslatorFactory::create_translator(config.translation.clone())?,
            embedder: media,
        })
    }
}

/// Shared flag checked between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub video: PathBuf,
    pub executed: Vec<Stage>,
    pub skipped: Vec<Stage>,
    pub states: Vec<RunState>,
}

#[derive(Default)]
struct RunProgress {
    video: Option<PathBuf>,
    executed: Vec<Stage>,
    skipped: Vec<Stage>,
}

pub struct Workflow {
    config: Arc<Config>,
    collaborators: Collaborators,
    accelerator: Accelerator,
    probe: Arc<dyn ArtifactProbe>,
    segmenter: Segmenter,
    cancel: CancelFlag,
}

impl Workflow {
    pub fn new(
        config: Arc<Config>,
        collaborators: Collaborators,
        accelerator: Accelerator,
    ) -> Result<Self> {
        config.validate()?;
        let segmenter = Segmenter::new(config.subtitles.segmenter_config()?);

        Ok(Self {
            config,
            collaborators,
            accelerator,
            probe: Arc::new(FsProbe),
            segmenter,
            cancel: CancelFlag::new(),
        })
    }

    /// Workflow wired to the real external tools.
    pub fn from_config(config: Arc<Config>) -> Result<Self> {
        let collaborators = Collaborators::from_config(&config)?;
        let accelerator = Accelerator::from_config(&config)?;
        Self::new(config, collaborators, accelerator)
    }

    pub fn with_probe(mut self, probe: Arc<dyn ArtifactProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn accelerator(&self) -> &Accelerator {
        &self.accelerator
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolve_video(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        select_video(&self.config.paths, explicit, self.probe.as_ref())
    }

    /// Artifact status of every stage for a video.
    pub fn describe(
        &self,
        video: Option<&Path>,
        mode: SubtitleMode,
    ) -> Result<(PathBuf, Vec<StageArtifact>)> {
        let video = self.resolve_video(video)?;
        let layout = ArtifactLayout::new(&self.config.paths, &video)?;
        let artifacts = Stage::ALL
            .into_iter()
            .map(|stage| layout.describe(stage, mode, self.probe.as_ref()))
            .collect();
        Ok((video, artifacts))
    }

    /// Execute one run to completion or to the first failing stage.
    pub async fn run(&self, request: RunRequest) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", id = %run_id);
        self.run_tracked(run_id, request).instrument(span).await
    }

    async fn run_tracked(&self, run_id: Uuid, request: RunRequest) -> Result<RunReport> {
        let mut machine = RunStateMachine::new();
        let mut progress = RunProgress::default();
        machine.advance(RunState::Validating);

        match self.execute(&request, &mut machine, &mut progress).await {
            Ok(()) => {
                machine.advance(RunState::Completed);
                let video = progress.video.unwrap_or_default();
                info!(
                    "Run completed for {}: executed {:?}, skipped {:?}",
                    video.display(),
                    progress.executed,
                    progress.skipped
                );
                Ok(RunReport {
                    run_id,
                    video,
                    executed: progress.executed,
                    skipped: progress.skipped,
                    states: machine.into_history(),
                })
            }
            Err(e) => {
                machine.advance(RunState::Failed {
                    stage: e.stage(),
                    reason: e.to_string(),
                });
                error!("Run failed: {}", e);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        request: &RunRequest,
        machine: &mut RunStateMachine,
        progress: &mut RunProgress,
    ) -> Result<()> {
        request.validate()?;
        let video = self.resolve_video(request.video.as_deref())?;
        progress.video = Some(video.clone());
        let layout = ArtifactLayout::new(&self.config.paths, &video)?;
        let mode = request.mode;

        let plan = plan_stages(&request.stages, |stage| {
            layout.describe(stage, mode, self.probe.as_ref()).exists
        });
        self.check_plan(&layout, &plan)?;

        for planned in plan {
            let stage = planned.stage;
            if planned.action == StageAction::Skip {
                info!("Skipping {}: artifacts already present", stage);
                progress.skipped.push(stage);
                continue;
            }

            if self.cancel.is_cancelled() {
                warn!("Cancellation requested before {}", stage);
                return Err(VidsubError::Cancelled { before: stage });
            }

            machine.advance(stage.running_state());
            self.check_prerequisites(&layout, stage, &[])?;
            info!("Running stage {}", stage);

            self.execute_stage(stage, &layout, mode)
                .await
                .map_err(|e| e.in_stage(stage))?;
            progress.executed.push(stage);
        }

        Ok(())
    }

    /// Every input of every stage that will run must exist now or be produced
    /// by an earlier stage of the same plan.
    fn check_plan(&self, layout: &ArtifactLayout, plan: &[PlannedStage]) -> Result<()> {
        let mut scheduled = Vec::new();
        for planned in plan.iter().filter(|p| p.action == StageAction::Run) {
            self.check_prerequisites(layout, planned.stage, &scheduled)?;
            scheduled.push(planned.stage);
        }
        Ok(())
    }

    fn check_prerequisites(
        &self,
        layout: &ArtifactLayout,
        stage: Stage,
        produced_earlier: &[Stage],
    ) -> Result<()> {
        for prerequisite in layout.prerequisites(stage) {
            if self.probe.exists(&prerequisite.path) {
                continue;
            }
            match prerequisite.producer {
                Some(producer) if produced_earlier.contains(&producer) => continue,
                Some(producer) => {
                    return Err(VidsubError::MissingPrerequisite {
                        stage,
                        artifact: prerequisite.path,
                        producer,
                    });
                }
                None => return Err(VidsubError::NoInputFound(prerequisite.path)),
            }
        }
        Ok(())
    }

    async fn execute_stage(
        &self,
        stage: Stage,
        layout: &ArtifactLayout,
        mode: SubtitleMode,
    ) -> Result<()> {
        match stage {
            Stage::Extract => self.extract(layout).await,
            Stage::Transcribe => self.transcribe(layout).await,
            Stage::Translate => self.translate(layout).await,
            Stage::Subtitles => self.embed(layout, mode).await,
        }
    }

    async fn extract(&self, layout: &ArtifactLayout) -> Result<()> {
        let staged = StagedOutput::new(layout.audio())?;
        self.collaborators
            .extractor
            .extract_audio(layout.video(), staged.path())
            .await?;
        let audio = staged.commit()?;
        info!("Audio written to {}", audio.display());
        Ok(())
    }

    async fn transcribe(&self, layout: &ArtifactLayout) -> Result<()> {
        let audio = layout.audio();
        let hint = self.config.models.source_lang.clone();
        let transcriber = self.collaborators.transcriber.clone();

        let transcript = self
            .accelerator
            .run(Stage::Transcribe, move || async move {
                transcriber.transcribe(&audio, Some(hint.as_str())).await
            })
            .await?
            .normalize();

        if transcript.is_empty() {
            warn!("Transcription produced no speech segments");
        }

        let cues = self
            .segmenter
            .segment(&transcript.segments, Some(transcript.language.as_str()));
        let document = SubtitleDocument::original(&transcript, cues);

        subtitle::write_srt(layout.original_srt(), &document.cues)?;
        subtitle::write_text(layout.original_txt(), &document.cues)?;
        subtitle::write_json(layout.original_json(), &document)?;
        info!(
            "Original subtitles: {} segments, {} cues ({})",
            document.segments.len(),
            document.cues.len(),
            document.source_language
        );
        Ok(())
    }

    async fn translate(&self, layout: &ArtifactLayout) -> Result<()> {
        let original = subtitle::load_document(layout.original_json())?.transcript();
        let source = original.language.clone();
        let target = self.config.models.target_lang.clone();

        let translator = self.collaborators.translator.clone();
        let segments = original.segments.clone();
        let (call_source, call_target) = (source.clone(), target.clone());
        let translated = self
            .accelerator
            .run(Stage::Translate, move || async move {
                translator
                    .translate(&segments, &call_source, &call_target)
                    .await
            })
            .await?;

        check_translation_contract(&original.segments, &translated)?;

        let translated = Transcript::new(target.clone(), translated);
        let cues = self
            .segmenter
            .segment(&translated.segments, Some(target.as_str()))
            .into_iter()
            .map(|cue| cue.with_languages(Some(source.as_str()), Some(target.as_str())))
            .collect();
        let document = SubtitleDocument::translated(&source, &translated, cues);

        subtitle::write_srt(layout.translated_srt(), &document.cues)?;
        subtitle::write_text(layout.translated_txt(), &document.cues)?;
        subtitle::write_json(layout.translated_json(), &document)?;
        info!(
            "Translated subtitles: {} cues ({} -> {})",
            document.cues.len(),
            source,
            target
        );
        Ok(())
    }

    async fn embed(&self, layout: &ArtifactLayout, mode: SubtitleMode) -> Result<()> {
        let staged = StagedOutput::new(layout.output_video(mode))?;
        self.collaborators
            .embedder
            .embed_subtitles(layout.video(), &layout.translated_srt(), mode, staged.path())
            .await?;
        let output = staged.commit()?;
        info!("Subtitled video written to {}", output.display());
        Ok(())
    }
}

/// Translation must keep segment count and timing.
fn check_translation_contract(original: &[TimedSegment], translated: &[TimedSegment]) -> Result<()> {
    if original.len() != translated.len() {
        return Err(VidsubError::Translation(format!(
            "Translator returned {} segments for {} inputs",
            translated.len(),
            original.len()
        )));
    }
    for (index, (before, after)) in original.iter().zip(translated).enumerate() {
        if before.start != after.start || before.end != after.end {
            return Err(VidsubError::Translation(format!(
                "Translator changed timing of segment {}: {}..{} became {}..{}",
                index + 1,
                before.start,
                before.end,
                after.start,
                after.end
            )));
        }
    }
    Ok(())
}

//! Where each stage reads and writes, and how those files are committed.

use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::PathsConfig;
use crate::error::{Result, VidsubError};
use crate::stage::{Stage, SubtitleMode};

/// Answers whether an artifact is present.
#[cfg_attr(test, mockall::automock)]
pub trait ArtifactProbe: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
}

/// Probe backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl ArtifactProbe for FsProbe {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Status of one stage's outputs, recomputed on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageArtifact {
    pub stage: Stage,
    pub expected: Vec<PathBuf>,
    pub exists: bool,
}

/// An input a stage needs, and the stage that creates it. The input video
/// has no producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prerequisite {
    pub path: PathBuf,
    pub producer: Option<Stage>,
}

/// Concrete artifact paths for one input video.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    video: PathBuf,
    stem: String,
    paths: PathsConfig,
}

impl ArtifactLayout {
    pub fn new(paths: &PathsConfig, video: &Path) -> Result<Self> {
        let stem = video
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                VidsubError::Config(format!("Cannot derive a file stem from {}", video.display()))
            })?
            .to_string();
        Ok(Self {
            video: video.to_path_buf(),
            stem,
            paths: paths.clone(),
        })
    }

    pub fn video(&self) -> &Path {
        &self.video
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    fn render(&self, dir: &Path, template: &str) -> PathBuf {
        dir.join(template.replace("{stem}", &self.stem))
    }

    pub fn audio(&self) -> PathBuf {
        self.render(&self.paths.audio_dir, &self.paths.audio_file)
    }

    pub fn original_srt(&self) -> PathBuf {
        self.render(&self.paths.subs_original_dir, &self.paths.subs_original_srt)
    }

    pub fn original_txt(&self) -> PathBuf {
        self.render(&self.paths.subs_original_dir, &self.paths.subs_original_txt)
    }

    pub fn original_json(&self) -> PathBuf {
        self.render(&self.paths.subs_original_dir, &self.paths.subs_original_json)
    }

    pub fn translated_srt(&self) -> PathBuf {
        self.render(&self.paths.subs_translated_dir, &self.paths.subs_translated_srt)
    }

    pub fn translated_txt(&self) -> PathBuf {
        self.render(&self.paths.subs_translated_dir, &self.paths.subs_translated_txt)
    }

    pub fn translated_json(&self) -> PathBuf {
        self.render(&self.paths.subs_translated_dir, &self.paths.subs_translated_json)
    }

    pub fn output_video(&self, mode: SubtitleMode) -> PathBuf {
        let template = match mode {
            SubtitleMode::Soft => &self.paths.output_soft,
            SubtitleMode::Burned => &self.paths.output_burned,
        };
        self.render(&self.paths.video_with_subs_dir, template)
    }

    /// Files a stage produces. The subtitles output depends on the mode.
    pub fn outputs(&self, stage: Stage, mode: SubtitleMode) -> Vec<PathBuf> {
        match stage {
            Stage::Extract => vec![self.audio()],
            Stage::Transcribe => vec![self.original_json(), self.original_srt(), self.original_txt()],
            Stage::Translate => vec![
                self.translated_json(),
                self.translated_srt(),
                self.translated_txt(),
            ],
            Stage::Subtitles => vec![self.output_video(mode)],
        }
    }

    /// Inputs a stage reads before it can run.
    pub fn prerequisites(&self, stage: Stage) -> Vec<Prerequisite> {
        let video = Prerequisite {
            path: self.video.clone(),
            producer: None,
        };
        let produced_by = |path: PathBuf, producer: Stage| Prerequisite {
            path,
            producer: Some(producer),
        };
        match stage {
            Stage::Extract => vec![video],
            Stage::Transcribe => vec![produced_by(self.audio(), Stage::Extract)],
            Stage::Translate => vec![produced_by(self.original_json(), Stage::Transcribe)],
            Stage::Subtitles => vec![produced_by(self.translated_srt(), Stage::Translate), video],
        }
    }

    pub fn describe(
        &self,
        stage: Stage,
        mode: SubtitleMode,
        probe: &dyn ArtifactProbe,
    ) -> StageArtifact {
        let expected = self.outputs(stage, mode);
        let exists = !expected.is_empty() && expected.iter().all(|path| probe.exists(path));
        StageArtifact {
            stage,
            expected,
            exists,
        }
    }
}

/// Pick the input video: the explicit path if given, otherwise the
/// lexicographically first eligible file directly inside `paths.video_dir`.
pub fn select_video(
    paths: &PathsConfig,
    explicit: Option<&Path>,
    probe: &dyn ArtifactProbe,
) -> Result<PathBuf> {
    if let Some(video) = explicit {
        if probe.exists(video) {
            return Ok(video.to_path_buf());
        }
        return Err(VidsubError::NoInputFound(video.to_path_buf()));
    }

    let dir = &paths.video_dir;
    if !dir.is_dir() {
        return Err(VidsubError::NoInputFound(dir.clone()));
    }

    let extensions: Vec<String> = paths
        .video_extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    let selected = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .find(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| extensions.contains(&e.to_lowercase()))
                .unwrap_or(false)
        });

    match selected {
        Some(video) => {
            info!("Selected input video: {}", video.display());
            Ok(video)
        }
        None => Err(VidsubError::NoInputFound(dir.clone())),
    }
}

fn ensure_parent(path: &Path) -> Result<&Path> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| VidsubError::artifact_io(parent, e))?;
    Ok(parent)
}

/// Write `contents` to `path` through a temporary file in the same directory,
/// so readers never observe a partial file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = ensure_parent(path)?;
    let mut file = NamedTempFile::new_in(parent).map_err(|e| VidsubError::artifact_io(path, e))?;
    file.write_all(contents)
        .and_then(|_| file.flush())
        .map_err(|e| VidsubError::artifact_io(path, e))?;
    file.persist(path)
        .map_err(|e| VidsubError::artifact_io(path, e.error))?;
    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

/// A hidden sibling path handed to a collaborator that writes media. The
/// file is renamed into place by [`StagedOutput::commit`] and removed if the
/// guard is dropped first.
#[derive(Debug)]
pub struct StagedOutput {
    target: PathBuf,
    staging: PathBuf,
    committed: bool,
}

impl StagedOutput {
    pub fn new(target: impl Into<PathBuf>) -> Result<Self> {
        let target = target.into();
        let parent = ensure_parent(&target)?.to_path_buf();
        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                VidsubError::Config(format!("Invalid output path {}", target.display()))
            })?;
        // keep the extension last so ffmpeg still infers the container
        let staging = parent.join(format!(".{}.{}", Uuid::new_v4().simple(), file_name));
        Ok(Self {
            target,
            staging,
            committed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.staging
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn commit(mut self) -> Result<PathBuf> {
        if !self.staging.is_file() {
            return Err(VidsubError::artifact_io(
                &self.staging,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "collaborator reported success but produced no output",
                ),
            ));
        }
        fs::rename(&self.staging, &self.target)
            .map_err(|e| VidsubError::artifact_io(&self.target, e))?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for StagedOutput {
    fn drop(&mut self) {
        if self.committed || !self.staging.exists() {
            return;
        }
        if let Err(e) = fs::remove_file(&self.staging) {
            warn!("Failed to remove staged file {}: {}", self.staging.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;

    fn paths_in(root: &Path) -> PathsConfig {
        PathsConfig {
            video_dir: root.join("video"),
            audio_dir: root.join("audio"),
            subs_original_dir: root.join("orig"),
            subs_translated_dir: root.join("trans"),
            video_with_subs_dir: root.join("out"),
            logs_dir: root.join("logs"),
            ..PathsConfig::default()
        }
    }

    #[test]
    fn test_layout_renders_templates() {
        let paths = PathsConfig::default();
        let layout = ArtifactLayout::new(&paths, Path::new("data/video/talk.mp4")).unwrap();
        assert_eq!(layout.audio(), PathBuf::from("data/audio/talk.mp3"));
        assert_eq!(
            layout.output_video(SubtitleMode::Soft),
            PathBuf::from("data/video_with_subs/talk_soft.mp4")
        );
        assert_eq!(
            layout.prerequisites(Stage::Translate),
            vec![Prerequisite {
                path: PathBuf::from("data/subs_original/talk.json"),
                producer: Some(Stage::Transcribe),
            }]
        );
    }

    #[test]
    fn test_describe_requires_every_output() {
        let layout = ArtifactLayout::new(&PathsConfig::default(), Path::new("talk.mp4")).unwrap();
        let missing_txt = layout.original_txt();

        let mut probe = MockArtifactProbe::new();
        probe
            .expect_exists()
            .withf(move |path| path == missing_txt.as_path())
            .return_const(false);
        probe.expect_exists().return_const(true);

        let transcribe = layout.describe(Stage::Transcribe, SubtitleMode::Burned, &probe);
        assert!(!transcribe.exists);
        assert_eq!(transcribe.expected.len(), 3);
        assert!(layout.describe(Stage::Extract, SubtitleMode::Burned, &probe).exists);
    }

    #[test]
    fn test_select_video_picks_first_matching_file() {
        let temp = TempDir::new().unwrap();
        temp.child("video/b.MP4").touch().unwrap();
        temp.child("video/a.mp4").touch().unwrap();
        temp.child("video/0.txt").touch().unwrap();
        temp.child("video/nested/0.mp4").touch().unwrap();

        let paths = paths_in(temp.path());
        let video = select_video(&paths, None, &FsProbe).unwrap();
        assert_eq!(video, temp.path().join("video/a.mp4"));
    }

    #[test]
    fn test_select_video_reports_empty_directory() {
        let temp = TempDir::new().unwrap();
        temp.child("video/readme.txt").touch().unwrap();
        let paths = paths_in(temp.path());
        assert!(matches!(
            select_video(&paths, None, &FsProbe),
            Err(VidsubError::NoInputFound(_))
        ));
        let explicit = temp.path().join("missing.mp4");
        assert!(matches!(
            select_video(&paths, Some(&explicit), &FsProbe),
            Err(VidsubError::NoInputFound(p)) if p == explicit
        ));
    }

    #[test]
    fn test_write_atomic_creates_directories() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("deep/dir/file.srt");
        write_atomic(&target, b"1\n").unwrap();
        temp.child("deep/dir/file.srt").assert("1\n");
        let leftovers = fs::read_dir(temp.path().join("deep/dir")).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_staged_output_commit_and_drop() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("out/video.mp4");

        let staged = StagedOutput::new(&target).unwrap();
        assert!(staged.path().to_string_lossy().ends_with(".video.mp4"));
        fs::write(staged.path(), b"data").unwrap();
        staged.commit().unwrap();
        assert!(target.is_file());

        let abandoned = StagedOutput::new(temp.path().join("out/other.mp4")).unwrap();
        let staging = abandoned.path().to_path_buf();
        fs::write(&staging, b"partial").unwrap();
        drop(abandoned);
        assert!(!staging.exists());
        assert!(!temp.path().join("out/other.mp4").exists());
    }

    #[test]
    fn test_commit_without_output_fails() {
        let temp = TempDir::new().unwrap();
        let staged = StagedOutput::new(temp.path().join("audio.mp3")).unwrap();
        assert!(matches!(staged.commit(), Err(VidsubError::ArtifactIo { .. })));
    }
}

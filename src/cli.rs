use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::stage::{Stage, SubtitleMode};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path (defaults to ./config.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline for one video
    Run {
        /// Input video; defaults to the first eligible file in the video directory
        #[arg(long)]
        video: Option<PathBuf>,

        /// Subtitle delivery mode (defaults to the configured mode)
        #[arg(short, long, value_enum)]
        mode: Option<SubtitleMode>,

        /// Run exactly these stages, even if their outputs exist (comma-separated)
        #[arg(short, long, value_enum, value_delimiter = ',')]
        steps: Vec<Stage>,
    },

    /// Show which stage artifacts exist for a video
    Status {
        /// Input video; defaults to the first eligible file in the video directory
        #[arg(long)]
        video: Option<PathBuf>,

        /// Mode whose output video is reported
        #[arg(short, long, value_enum)]
        mode: Option<SubtitleMode>,
    },

    /// Write a configuration file with default settings
    InitConfig {
        /// Destination file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Check that ffmpeg and the translation model are reachable
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_steps() {
        let args = Args::parse_from([
            "vidsub", "run", "--video", "talk.mp4", "--mode", "soft", "--steps",
            "translate,subtitles",
        ]);
        match args.command {
            Commands::Run { video, mode, steps } => {
                assert_eq!(video, Some(PathBuf::from("talk.mp4")));
                assert_eq!(mode, Some(SubtitleMode::Soft));
                assert_eq!(steps, vec![Stage::Translate, Stage::Subtitles]);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from(["vidsub", "status", "--verbose", "--config", "alt.toml"]);
        assert!(args.verbose);
        assert_eq!(args.config, Some(PathBuf::from("alt.toml")));
        assert!(matches!(args.command, Commands::Status { video: None, mode: None }));
    }

    #[test]
    fn test_unknown_step_is_rejected() {
        assert!(Args::try_parse_from(["vidsub", "run", "--steps", "dance"]).is_err());
    }
}

//! vidsub - staged video subtitling pipeline
//!
//! Extracts the audio track of a video, transcribes it, translates the
//! transcript and embeds the translated subtitles, persisting every
//! intermediate artifact so that runs can resume or redo single stages.

pub mod accelerator;
pub mod artifacts;
pub mod cli;
pub mod config;
pub mod error;
pub mod media;
pub mod segment;
pub mod stage;
pub mod subtitle;
pub mod transcribe;
pub mod transcript;
pub mod translate;
pub mod workflow;

pub use error::{Result, VidsubError};

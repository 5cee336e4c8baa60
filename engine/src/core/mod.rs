//! subburn Core Engine
//!
//! Subtitle styling, rendering, translation and burn-in.
//! Everything below is usable without the CLI; external collaborators
//! (transcoder, translation service, video storage) sit behind traits.

pub mod burn;
pub mod captions;
pub mod db;
pub mod ffmpeg;
pub mod fs;
pub mod jobs;
pub mod presets;
pub mod process;
pub mod settings;
pub mod storage;
pub mod styles;
pub mod transcripts;
pub mod translation;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;

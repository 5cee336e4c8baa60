//! Translation Module
//!
//! Machine translation of transcripts with quota metering, advisory quality
//! scoring, manual correction and SRT/VTT export.

mod coordinator;
mod detect;
#[cfg(feature = "http-translation")]
mod libretranslate;
mod models;
mod provider;
mod quality;
mod quota;
pub mod store;

pub use coordinator::*;
pub use detect::{detect_offline, DetectedLanguage};
#[cfg(feature = "http-translation")]
pub use libretranslate::LibreTranslateProvider;
pub use models::*;
pub use provider::*;
pub use quality::{mean_quality, validate_quality};
pub use quota::*;

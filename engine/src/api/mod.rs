//! Service API
//!
//! Typed request/response surface over the engine: styles, presets, burn
//! jobs, translations and progress polling. Transports (CLI, HTTP) sit on
//! top of [`SubburnService`].

mod dto;
mod service;

pub use dto::*;
pub use service::{Collaborators, SubburnService};

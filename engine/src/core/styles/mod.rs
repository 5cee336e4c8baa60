//! Styles Module
//!
//! Subtitle style records, their validation rules and the ASS color codec.

pub mod color;
mod models;
mod store;
mod validation;

pub use color::Color;
pub use models::*;
pub use store::StyleStore;
pub use validation::{
    rule_for, validate_candidate, validate_cross_field, validate_fields, validate_settings,
    validate_update,
    FieldRule, Rule, STYLE_RULES,
};

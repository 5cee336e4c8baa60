//! Style Validation
//!
//! Declarative per-field rules. Every field a style accepts has exactly one
//! entry in [`STYLE_RULES`]; validation walks the submitted fields and never
//! stops at the first failure.

use serde_json::{Map, Value};

use super::color::Color;
use super::models::{AnimationKind, FontWeight, HorizontalPosition, StyleSettings, VerticalPosition};
use crate::core::{CoreResult, FieldErrors};

// =============================================================================
// Rules
// =============================================================================

/// Predicate applied to one field value
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Rule {
    /// Integer within an inclusive range
    IntRange(i64, i64),
    /// Finite number within an inclusive range
    FloatRange(f64, f64),
    /// `#RRGGBB` or `#RRGGBBAA`
    HexColor,
    /// One of a fixed set of lowercase names
    OneOf(&'static [&'static str]),
    Bool,
    /// Non-blank text up to `max_len` characters
    Text { max_len: usize },
}

/// A field name bound to its rule
#[derive(Clone, Copy, Debug)]
pub struct FieldRule {
    pub field: &'static str,
    pub rule: Rule,
}

const fn rule(field: &'static str, rule: Rule) -> FieldRule {
    FieldRule { field, rule }
}

/// The complete rule table for [`StyleSettings`]
pub const STYLE_RULES: &[FieldRule] = &[
    rule("font_family", Rule::Text { max_len: 100 }),
    rule("font_size", Rule::IntRange(12, 72)),
    rule("font_weight", Rule::OneOf(FontWeight::NAMES)),
    rule("font_color", Rule::HexColor),
    rule("font_alpha", Rule::FloatRange(0.0, 1.0)),
    rule("background_enabled", Rule::Bool),
    rule("background_color", Rule::HexColor),
    rule("background_alpha", Rule::FloatRange(0.0, 1.0)),
    rule("background_padding", Rule::IntRange(0, 50)),
    rule("background_corner_radius", Rule::IntRange(0, 50)),
    rule("outline_enabled", Rule::Bool),
    rule("outline_color", Rule::HexColor),
    rule("outline_width", Rule::IntRange(0, 8)),
    rule("position_vertical", Rule::OneOf(VerticalPosition::NAMES)),
    rule("position_horizontal", Rule::OneOf(HorizontalPosition::NAMES)),
    rule("margin_vertical", Rule::IntRange(0, 200)),
    rule("margin_horizontal", Rule::IntRange(0, 200)),
    rule("max_width_percent", Rule::IntRange(20, 100)),
    rule("words_per_line", Rule::IntRange(1, 20)),
    rule("max_lines", Rule::IntRange(1, 4)),
    rule("min_display_duration", Rule::FloatRange(0.2, 10.0)),
    rule("max_display_duration", Rule::FloatRange(0.5, 20.0)),
    rule("animation", Rule::OneOf(AnimationKind::NAMES)),
    rule("animation_duration", Rule::FloatRange(0.0, 2.0)),
];

/// Looks up the rule for a field
pub fn rule_for(field: &str) -> Option<Rule> {
    STYLE_RULES
        .iter()
        .find(|r| r.field == field)
        .map(|r| r.rule)
}

impl Rule {
    /// Checks one value, returning the failure reason
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match *self {
            Rule::IntRange(min, max) => {
                let n = as_integer(value).ok_or_else(|| "must be an integer".to_string())?;
                if n < min || n > max {
                    return Err(format!("out of range ({min}-{max})"));
                }
                Ok(())
            }
            Rule::FloatRange(min, max) => {
                let n = value
                    .as_f64()
                    .filter(|n| n.is_finite())
                    .ok_or_else(|| "must be a number".to_string())?;
                if n < min || n > max {
                    return Err(format!("out of range ({min}-{max})"));
                }
                Ok(())
            }
            Rule::HexColor => match value.as_str().and_then(Color::from_hex) {
                Some(_) => Ok(()),
                None => Err("must be a #RRGGBB or #RRGGBBAA hex color".to_string()),
            },
            Rule::OneOf(names) => match value.as_str() {
                Some(s) if names.contains(&s) => Ok(()),
                _ => Err(format!("must be one of: {}", names.join(", "))),
            },
            Rule::Bool => match value {
                Value::Bool(_) => Ok(()),
                _ => Err("must be true or false".to_string()),
            },
            Rule::Text { max_len } => match value.as_str() {
                Some(s) if !s.trim().is_empty() && s.chars().count() <= max_len => Ok(()),
                _ => Err(format!(
                    "must be a non-empty string of at most {max_len} characters"
                )),
            },
        }
    }
}

/// Accepts JSON integers and integral floats (`24` and `24.0`)
fn as_integer(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    value
        .as_f64()
        .filter(|n| n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64)
        .map(|n| n as i64)
}

// =============================================================================
// Validation
// =============================================================================

/// Validates submitted fields one by one.
///
/// Unknown fields are reported as errors rather than ignored so a typo never
/// looks like a successful update.
pub fn validate_fields(fields: &Map<String, Value>) -> FieldErrors {
    let mut errors = FieldErrors::new();
    for (field, value) in fields {
        match rule_for(field) {
            Some(rule) => {
                if let Err(reason) = rule.check(value) {
                    errors.insert(field.as_str(), reason);
                }
            }
            None => errors.insert(field.as_str(), "unknown field"),
        }
    }
    errors
}

/// Rules that involve more than one field
pub fn validate_cross_field(settings: &StyleSettings) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if settings.min_display_duration > settings.max_display_duration {
        errors.insert(
            "min_display_duration",
            "must not exceed max_display_duration",
        );
    }
    errors
}

/// Validates a field set with no style behind it.
///
/// Cross-field rules only compare fields that were both submitted; an
/// unsubmitted partner is unknown, not the default.
pub fn validate_candidate(fields: &Map<String, Value>) -> FieldErrors {
    let errors = validate_fields(fields);
    if !errors.is_empty() {
        return errors;
    }
    let duration = |key: &str| fields.get(key).and_then(Value::as_f64);
    match (duration("min_display_duration"), duration("max_display_duration")) {
        (Some(min), Some(max)) if min > max => FieldErrors::single(
            "min_display_duration",
            "must not exceed max_display_duration",
        ),
        _ => errors,
    }
}

/// Validates a complete settings payload
pub fn validate_settings(settings: &StyleSettings) -> CoreResult<FieldErrors> {
    let errors = validate_fields(&settings.to_field_map()?);
    if !errors.is_empty() {
        return Ok(errors);
    }
    Ok(validate_cross_field(settings))
}

/// Validates `fields` as a partial update of `current`, returning the merged
/// settings when every check passes.
pub fn validate_update(
    current: &StyleSettings,
    fields: &Map<String, Value>,
) -> CoreResult<StyleSettings> {
    validate_fields(fields).into_result()?;
    let merged = current.merged(fields)?;
    validate_cross_field(&merged).into_result()?;
    Ok(merged)
}

// =============================================================================
// Tests
// =============================================================================

//! Style Models
//!
//! The per-(video, language) style record and its settings payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::color::{canonical_hex, Color};
use crate::core::{CoreError, CoreResult, LanguageCode, StyleId, TimeSec, VideoId};

// =============================================================================
// Enums
// =============================================================================

/// Font weight
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    Light,
    #[default]
    Normal,
    Bold,
}

impl FontWeight {
    pub const NAMES: &'static [&'static str] = &["light", "normal", "bold"];

    pub fn is_bold(&self) -> bool {
        matches!(self, Self::Bold)
    }
}

/// Vertical placement of subtitles
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalPosition {
    Top,
    Middle,
    #[default]
    Bottom,
}

impl VerticalPosition {
    pub const NAMES: &'static [&'static str] = &["top", "middle", "bottom"];
}

/// Horizontal placement of subtitles
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HorizontalPosition {
    Left,
    #[default]
    Center,
    Right,
}

impl HorizontalPosition {
    pub const NAMES: &'static [&'static str] = &["left", "center", "right"];
}

/// Cue entrance animation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationKind {
    #[default]
    None,
    Fade,
    Pop,
    Karaoke,
}

impl AnimationKind {
    pub const NAMES: &'static [&'static str] = &["none", "fade", "pop", "karaoke"];
}

// =============================================================================
// Style Settings
// =============================================================================

/// Visual settings of a subtitle style.
///
/// Field names are the keys accepted by partial updates. `*_alpha` fields
/// are transparency in `[0, 1]` (0 = opaque), the same convention as a
/// color's `AA` byte, and layer over the matching color's own alpha.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleSettings {
    pub font_family: String,
    pub font_size: u32,
    pub font_weight: FontWeight,
    pub font_color: String,
    pub font_alpha: f64,

    pub background_enabled: bool,
    pub background_color: String,
    pub background_alpha: f64,
    pub background_padding: u32,
    pub background_corner_radius: u32,

    pub outline_enabled: bool,
    pub outline_color: String,
    pub outline_width: u32,

    pub position_vertical: VerticalPosition,
    pub position_horizontal: HorizontalPosition,
    pub margin_vertical: u32,
    pub margin_horizontal: u32,
    pub max_width_percent: u32,

    pub words_per_line: u32,
    pub max_lines: u32,
    pub min_display_duration: TimeSec,
    pub max_display_duration: TimeSec,

    pub animation: AnimationKind,
    pub animation_duration: TimeSec,
}

impl Default for StyleSettings {
    fn default() -> Self {
        Self {
            font_family: "Arial".to_string(),
            font_size: 24,
            font_weight: FontWeight::Normal,
            font_color: "#FFFFFF".to_string(),
            font_alpha: 0.0,
            background_enabled: false,
            background_color: "#000000".to_string(),
            background_alpha: 0.5,
            background_padding: 8,
            background_corner_radius: 4,
            outline_enabled: true,
            outline_color: "#000000".to_string(),
            outline_width: 2,
            position_vertical: VerticalPosition::Bottom,
            position_horizontal: HorizontalPosition::Center,
            margin_vertical: 50,
            margin_horizontal: 20,
            max_width_percent: 80,
            words_per_line: 6,
            max_lines: 2,
            min_display_duration: 1.0,
            max_display_duration: 5.0,
            animation: AnimationKind::None,
            animation_duration: 0.3,
        }
    }
}

impl StyleSettings {
    /// Numpad-style alignment code (bottom-left = 1 ... top-right = 9)
    pub fn alignment(&self) -> u8 {
        let row = match self.position_vertical {
            VerticalPosition::Bottom => 0,
            VerticalPosition::Middle => 3,
            VerticalPosition::Top => 6,
        };
        let column = match self.position_horizontal {
            HorizontalPosition::Left => 1,
            HorizontalPosition::Center => 2,
            HorizontalPosition::Right => 3,
        };
        row + column
    }

    /// Most words one cue may hold
    pub fn max_words_per_cue(&self) -> usize {
        (self.words_per_line.max(1) * self.max_lines.max(1)) as usize
    }

    /// Text color with `font_alpha` layered on
    pub fn primary_color(&self) -> Color {
        parse_or(&self.font_color, Color::white()).with_alpha(self.font_alpha)
    }

    pub fn outline_color(&self) -> Color {
        parse_or(&self.outline_color, Color::black())
    }

    /// Box color with `background_alpha` layered on
    pub fn background_color(&self) -> Color {
        parse_or(&self.background_color, Color::black()).with_alpha(self.background_alpha)
    }

    /// Upper-cases hex colors and drops an opaque `00` alpha suffix
    pub fn canonicalize(&mut self) {
        for color in [
            &mut self.font_color,
            &mut self.background_color,
            &mut self.outline_color,
        ] {
            if let Some(canonical) = canonical_hex(color) {
                *color = canonical;
            }
        }
    }

    /// Settings as a JSON object keyed by field name
    pub fn to_field_map(&self) -> CoreResult<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(CoreError::Internal(
                "Style settings did not serialize to an object".to_string(),
            )),
        }
    }

    /// Returns a copy with `fields` applied on top.
    ///
    /// Callers validate `fields` first; this only fails on type mismatches.
    pub fn merged(&self, fields: &Map<String, Value>) -> CoreResult<Self> {
        let mut map = self.to_field_map()?;
        for (key, value) in fields {
            map.insert(key.clone(), value.clone());
        }
        let mut merged: Self = serde_json::from_value(Value::Object(map))?;
        merged.canonicalize();
        Ok(merged)
    }
}

fn parse_or(hex: &str, fallback: Color) -> Color {
    Color::from_hex(hex).unwrap_or(fallback)
}

// =============================================================================
// Style Record
// =============================================================================

/// Style owned by a (video, language) pair
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Style {
    pub id: StyleId,
    pub video_id: VideoId,
    pub language_code: LanguageCode,
    pub settings: StyleSettings,
    /// Preset the settings were last seeded from
    pub preset_name: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_settings() {
        let settings = StyleSettings::default();

        assert_eq!(settings.font_size, 24);
        assert_eq!(settings.font_color, "#FFFFFF");
        assert_eq!(settings.position_vertical, VerticalPosition::Bottom);
        assert_eq!(settings.max_words_per_cue(), 12);
    }

    #[test]
    fn test_alignment_codes() {
        let mut settings = StyleSettings::default();
        assert_eq!(settings.alignment(), 2);

        settings.position_vertical = VerticalPosition::Top;
        settings.position_horizontal = HorizontalPosition::Left;
        assert_eq!(settings.alignment(), 7);

        settings.position_vertical = VerticalPosition::Middle;
        settings.position_horizontal = HorizontalPosition::Right;
        assert_eq!(settings.alignment(), 6);

        settings.position_vertical = VerticalPosition::Bottom;
        assert_eq!(settings.alignment(), 3);
    }

    #[test]
    fn test_merged_applies_fields_and_canonicalizes() {
        let fields = json!({"font_size": 30, "font_color": "#ffd70000", "animation": "fade"});
        let merged = StyleSettings::default()
            .merged(fields.as_object().unwrap())
            .unwrap();

        assert_eq!(merged.font_size, 30);
        assert_eq!(merged.font_color, "#FFD700");
        assert_eq!(merged.animation, AnimationKind::Fade);
        assert_eq!(merged.max_lines, 2);
    }

    #[test]
    fn test_alpha_fields_layer_on_colors() {
        let settings = StyleSettings {
            font_alpha: 0.5,
            background_alpha: 0.0,
            background_color: "#00000080".to_string(),
            ..Default::default()
        };

        assert_eq!(settings.primary_color().a, 127);
        assert_eq!(settings.background_color().a, 128);
        assert_eq!(StyleSettings::default().primary_color().to_ass_color(), "&H00FFFFFF");
    }

    #[test]
    fn test_field_map_uses_snake_case_keys() {
        let map = StyleSettings::default().to_field_map().unwrap();
        assert_eq!(map["font_size"], json!(24));
        assert_eq!(map["position_vertical"], json!("bottom"));
        assert_eq!(map.len(), 24);
    }
}

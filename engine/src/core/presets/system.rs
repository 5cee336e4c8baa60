//! Built-in presets seeded into every catalog.

use super::Platform;
use crate::core::styles::{
    AnimationKind, FontWeight, HorizontalPosition, StyleSettings, VerticalPosition,
};

/// A preset definition shipped with the engine
pub struct SystemPreset {
    pub name: &'static str,
    pub description: &'static str,
    pub platform: Platform,
    pub settings: fn() -> StyleSettings,
}

pub const SYSTEM_PRESETS: &[SystemPreset] = &[
    SystemPreset {
        name: "Classic",
        description: "White text with a thin black outline, bottom center",
        platform: Platform::General,
        settings: classic,
    },
    SystemPreset {
        name: "TikTok Viral",
        description: "Large bold gold words in the middle of the frame with a pop-in",
        platform: Platform::Tiktok,
        settings: tiktok_viral,
    },
    SystemPreset {
        name: "YouTube Clean",
        description: "Readable white text on a translucent box",
        platform: Platform::Youtube,
        settings: youtube_clean,
    },
    SystemPreset {
        name: "Instagram Reels",
        description: "Short karaoke-highlighted lines for vertical video",
        platform: Platform::Instagram,
        settings: instagram_reels,
    },
    SystemPreset {
        name: "Minimal Lower Third",
        description: "Small light text anchored bottom left",
        platform: Platform::General,
        settings: minimal_lower_third,
    },
];

fn classic() -> StyleSettings {
    StyleSettings::default()
}

fn tiktok_viral() -> StyleSettings {
    StyleSettings {
        font_family: "Montserrat".to_string(),
        font_size: 48,
        font_weight: FontWeight::Bold,
        font_color: "#FFD700".to_string(),
        outline_width: 4,
        position_vertical: VerticalPosition::Middle,
        words_per_line: 3,
        max_lines: 2,
        min_display_duration: 0.5,
        max_display_duration: 3.0,
        animation: AnimationKind::Pop,
        animation_duration: 0.15,
        ..StyleSettings::default()
    }
}

fn youtube_clean() -> StyleSettings {
    StyleSettings {
        font_family: "Roboto".to_string(),
        font_size: 32,
        background_enabled: true,
        background_color: "#000000".to_string(),
        background_alpha: 0.4,
        outline_enabled: false,
        outline_width: 0,
        margin_vertical: 60,
        words_per_line: 8,
        max_lines: 2,
        ..StyleSettings::default()
    }
}

fn instagram_reels() -> StyleSettings {
    StyleSettings {
        font_family: "Poppins".to_string(),
        font_size: 40,
        font_weight: FontWeight::Bold,
        outline_width: 3,
        position_vertical: VerticalPosition::Middle,
        max_width_percent: 70,
        words_per_line: 4,
        max_lines: 1,
        min_display_duration: 0.6,
        max_display_duration: 3.0,
        animation: AnimationKind::Karaoke,
        ..StyleSettings::default()
    }
}

fn minimal_lower_third() -> StyleSettings {
    StyleSettings {
        font_size: 22,
        font_weight: FontWeight::Light,
        outline_width: 1,
        position_horizontal: HorizontalPosition::Left,
        margin_vertical: 80,
        margin_horizontal: 60,
        max_width_percent: 50,
        ..StyleSettings::default()
    }
}

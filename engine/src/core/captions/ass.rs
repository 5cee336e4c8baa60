//! ASS (Advanced SubStation Alpha) encoder.
//!
//! Produces a single-style script. Every visual property of the style maps
//! onto the `Style:` line; animations are per-line override tags.

use std::fmt::Write as _;

use super::models::{Cue, RenderOptions};
use crate::core::styles::{AnimationKind, Color, StyleSettings};
use crate::core::TimeSec;

/// Name of the single style every dialogue line uses
pub const STYLE_NAME: &str = "Default";

/// Field order of the `[V4+ Styles]` section
pub const STYLE_FORMAT: &str = "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding";

/// Field order of the `[Events]` section
pub const EVENT_FORMAT: &str =
    "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text";

/// Renders cues as a complete ASS script
pub fn render_ass(cues: &[Cue], settings: &StyleSettings, options: &RenderOptions) -> String {
    let mut out = String::with_capacity(1024 + cues.len() * 96);

    out.push_str("[Script Info]\n");
    if let Some(title) = options.title.as_deref() {
        let _ = writeln!(out, "Title: {}", title.replace(['\r', '\n'], " "));
    }
    out.push_str("ScriptType: v4.00+\n");
    let _ = writeln!(out, "PlayResX: {}", options.resolution.width);
    let _ = writeln!(out, "PlayResY: {}", options.resolution.height);
    out.push_str("WrapStyle: 2\n");
    out.push_str("ScaledBorderAndShadow: yes\n");
    out.push('\n');

    out.push_str("[V4+ Styles]\n");
    out.push_str(STYLE_FORMAT);
    out.push('\n');
    out.push_str(&style_line(settings, options.resolution.width));
    out.push('\n');
    out.push('\n');

    out.push_str("[Events]\n");
    out.push_str(EVENT_FORMAT);
    out.push('\n');
    for cue in cues {
        out.push_str(&dialogue_line(cue, settings));
        out.push('\n');
    }

    out
}

/// Builds the `Style:` line from the style settings.
///
/// With a background the script uses BorderStyle 3 (opaque box) and the box
/// is drawn in OutlineColour, so the outline color is replaced by the
/// background color. Otherwise BorderStyle 1 draws a regular outline.
pub fn style_line(settings: &StyleSettings, play_res_x: u32) -> String {
    let primary = settings.primary_color();
    let secondary = karaoke_base_color(primary);

    let (border_style, outline_color, outline_width, back_color) = if settings.background_enabled {
        let back = settings.background_color();
        (3, back, settings.background_padding.max(1), back)
    } else if settings.outline_enabled {
        (
            1,
            settings.outline_color().with_alpha(settings.font_alpha),
            settings.outline_width,
            Color::transparent(),
        )
    } else {
        (1, Color::transparent(), 0, Color::transparent())
    };

    let (margin_l, margin_r) = horizontal_margins(settings, play_res_x);
    let bold = if settings.font_weight.is_bold() { -1 } else { 0 };

    format!(
        "Style: {name},{font},{size},{primary},{secondary},{outline},{back},{bold},0,0,0,100,100,0,0,{border},{outline_w},0,{align},{ml},{mr},{mv},1",
        name = STYLE_NAME,
        font = sanitize_field(&settings.font_family),
        size = settings.font_size,
        primary = primary.to_ass_color(),
        secondary = secondary.to_ass_color(),
        outline = outline_color.to_ass_color(),
        back = back_color.to_ass_color(),
        bold = bold,
        border = border_style,
        outline_w = outline_width,
        align = settings.alignment(),
        ml = margin_l,
        mr = margin_r,
        mv = settings.margin_vertical,
    )
}

/// Side margins: the configured margin, widened so text never exceeds
/// `max_width_percent` of the frame
fn horizontal_margins(settings: &StyleSettings, play_res_x: u32) -> (u32, u32) {
    let percent = settings.max_width_percent.clamp(1, 100);
    let unused = play_res_x.saturating_mul(100 - percent) / 100;
    let side = settings.margin_horizontal.max(unused / 2);
    (side, side)
}

/// Karaoke shows not-yet-spoken words in SecondaryColour: a dimmed primary
fn karaoke_base_color(primary: Color) -> Color {
    primary.with_alpha(0.5)
}

/// Commas separate style fields; strip them from free text
fn sanitize_field(value: &str) -> String {
    value.replace([',', '\r', '\n'], " ").trim().to_string()
}

/// Builds one `Dialogue:` line
pub fn dialogue_line(cue: &Cue, settings: &StyleSettings) -> String {
    format!(
        "Dialogue: 0,{start},{end},{style},,0,0,0,,{text}",
        start = format_ass_timestamp(cue.start_sec),
        end = format_ass_timestamp(cue.end_sec),
        style = STYLE_NAME,
        text = dialogue_text(cue, settings),
    )
}

fn dialogue_text(cue: &Cue, settings: &StyleSettings) -> String {
    let animation_ms = (settings.animation_duration.max(0.0) * 1000.0).round() as u64;
    let prefix = match settings.animation {
        AnimationKind::None => String::new(),
        AnimationKind::Fade => format!("{{\\fad({animation_ms},{animation_ms})}}"),
        AnimationKind::Pop => {
            format!("{{\\fscx80\\fscy80\\t(0,{animation_ms},\\fscx100\\fscy100)}}")
        }
        AnimationKind::Karaoke => String::new(),
    };

    let body = if settings.animation == AnimationKind::Karaoke && !cue.words.is_empty() {
        karaoke_text(cue, settings)
    } else {
        cue.lines
            .iter()
            .map(|l| escape_ass_text(l))
            .collect::<Vec<_>>()
            .join("\\N")
    };

    format!("{prefix}{body}")
}

/// Per-word `\kf` sweep, one tag per word, line breaks every `words_per_line`
fn karaoke_text(cue: &Cue, settings: &StyleSettings) -> String {
    let per_line = settings.words_per_line.max(1) as usize;
    let mut out = String::new();
    let mut cursor = cue.start_sec;

    for (i, word) in cue.words.iter().enumerate() {
        if i > 0 {
            out.push_str(if i % per_line == 0 { "\\N" } else { " " });
        }
        let end = if i + 1 == cue.words.len() {
            cue.end_sec
        } else {
            word.end_sec
        };
        let centis = to_centis(end).saturating_sub(to_centis(cursor));
        let _ = write!(out, "{{\\kf{centis}}}{}", escape_ass_text(&word.text));
        cursor = end;
    }
    out
}

/// Escapes text for a `Dialogue:` line.
///
/// Braces would open override blocks and a backslash would start a tag;
/// newlines become hard line breaks.
pub fn escape_ass_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '{' => out.push('('),
            '}' => out.push(')'),
            '\\' => out.push('/'),
            '\r' => {}
            '\n' => out.push_str("\\N"),
            _ => out.push(c),
        }
    }
    out
}

fn to_centis(seconds: TimeSec) -> u64 {
    (seconds.max(0.0) * 100.0).round() as u64
}

/// Formats seconds as an ASS timestamp (H:MM:SS.cc)
pub fn format_ass_timestamp(seconds: TimeSec) -> String {
    let total_cs = to_centis(seconds);
    let cs = total_cs % 100;
    let total_secs = total_cs / 100;
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;
    let mins = total_mins % 60;
    let hours = total_mins / 60;

    format!("{}:{:02}:{:02}.{:02}", hours, mins, secs, cs)
}

/// Parses an ASS timestamp (H:MM:SS.cc) into seconds
pub fn parse_ass_timestamp(ts: &str) -> Option<TimeSec> {
    let mut parts = ts.trim().split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }
    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}

// =============================================================================
// Tests
// =============================================================================

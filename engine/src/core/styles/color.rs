//! Style colors and their ASS encoding.
//!
//! Colors are stored as `#RRGGBB` or `#RRGGBBAA`. `AA` is transparency
//! (`00` opaque, `FF` invisible), the same convention ASS uses, so the
//! `&HAABBGGRR` form is the hex bytes reversed with alpha leading.
//!
//! The canonical hex is upper-case and drops an opaque `00` alpha. Every
//! canonical hex survives an ASS round trip byte for byte; styles only ever
//! store canonical hex.

use serde::{Deserialize, Serialize};

/// RGBA color
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    /// Transparency (0 = opaque, 255 = invisible)
    pub a: u8,
}

impl Color {
    /// Creates a new color from RGBA components
    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Creates an opaque color from RGB components
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 0)
    }

    /// Fully transparent black, for unused ASS color slots
    pub fn transparent() -> Self {
        Self::rgba(0, 0, 0, 255)
    }

    pub fn white() -> Self {
        Self::rgb(255, 255, 255)
    }

    pub fn black() -> Self {
        Self::rgb(0, 0, 0)
    }

    /// Parses `#RRGGBB` or `#RRGGBBAA` (case-insensitive)
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#')?;
        if !(digits.len() == 6 || digits.len() == 8) || !digits.is_ascii() {
            return None;
        }

        let byte = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        let a = if digits.len() == 8 { byte(6)? } else { 0 };
        Some(Self::rgba(byte(0)?, byte(2)?, byte(4)?, a))
    }

    /// Canonical hex: upper-case, alpha omitted when opaque
    pub fn to_hex(&self) -> String {
        if self.a == 0 {
            format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
        }
    }

    /// Converts to ASS/SSA color format (&HAABBGGRR)
    pub fn to_ass_color(&self) -> String {
        format!(
            "&H{:02X}{:02X}{:02X}{:02X}",
            self.a,
            self.b,
            self.g,
            self.r
        )
    }

    /// Parses `&HAABBGGRR` (or the short `&HBBGGRR` form, opaque)
    pub fn from_ass_color(value: &str) -> Option<Self> {
        let digits = value
            .strip_prefix("&H")
            .or_else(|| value.strip_prefix("&h"))?
            .trim_end_matches('&');
        if !(digits.len() == 6 || digits.len() == 8) || !digits.is_ascii() {
            return None;
        }

        let byte = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        let (alpha, rest) = if digits.len() == 8 {
            (byte(0)?, 2)
        } else {
            (0, 0)
        };
        Some(Self::rgba(
            byte(rest + 4)?,
            byte(rest + 2)?,
            byte(rest)?,
            alpha,
        ))
    }

    /// Layers a transparency in `[0, 1]` (0 = opaque) over the color's own.
    ///
    /// The visible shares multiply: `#000000` at 0.5 gives alpha `7F`,
    /// `#00000080` at 0.5 gives `BF`.
    pub fn with_alpha(self, alpha: f64) -> Self {
        let visible = 1.0 - alpha.clamp(0.0, 1.0);
        let a = 255 - ((255 - self.a) as f64 * visible).round() as u8;
        Self { a, ..self }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::white()
    }
}

/// Returns the canonical form of a hex color, or `None` when malformed
pub fn canonical_hex(hex: &str) -> Option<String> {
    Color::from_hex(hex).map(|c| c.to_hex())
}

/// Hex color to `&HAABBGGRR`
pub fn hex_to_ass(hex: &str) -> Option<String> {
    Color::from_hex(hex).map(|c| c.to_ass_color())
}

/// `&HAABBGGRR` to canonical hex
pub fn ass_to_hex(ass: &str) -> Option<String> {
    Color::from_ass_color(ass).map(|c| c.to_hex())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_hex() {
        assert_eq!(Color::white().to_hex(), "#FFFFFF");
        assert_eq!(Color::rgba(255, 0, 0, 128).to_hex(), "#FF000080");
        assert_eq!(Color::from_hex("#ffd700"), Some(Color::rgb(255, 215, 0)));
        assert_eq!(Color::from_hex("#00000080"), Some(Color::rgba(0, 0, 0, 128)));
        assert_eq!(Color::from_hex("#FFFFFF00"), Some(Color::white()));
    }

    #[test]
    fn test_rejects_malformed_hex() {
        for bad in ["FFFFFF", "#FFF", "#FFFFFFF", "#GGGGGG", "", "#", "#ÿÿÿ"] {
            assert_eq!(Color::from_hex(bad), None, "{bad}");
        }
    }

    #[test]
    fn test_color_ass_format() {
        assert_eq!(Color::white().to_ass_color(), "&H00FFFFFF");
        // Bytes reversed, alpha leading and unchanged
        assert_eq!(hex_to_ass("#12345678").unwrap(), "&H78563412");
        assert_eq!(Color::rgba(255, 0, 0, 128).to_ass_color(), "&H800000FF");
        assert_eq!(hex_to_ass("#FFD700").unwrap(), "&H0000D7FF");
        assert_eq!(hex_to_ass("#FFFFFF00").unwrap(), "&H00FFFFFF");
        assert_eq!(Color::transparent().to_ass_color(), "&HFF000000");
    }

    #[test]
    fn test_ass_roundtrip_preserves_hex() {
        for hex in [
            "#FFFFFF", "#000000", "#FFD700", "#12345678", "#ABCDEF80", "#0A0B0C", "#FFFFFFFF",
        ] {
            let ass = hex_to_ass(hex).unwrap();
            assert_eq!(ass_to_hex(&ass).unwrap(), hex);
        }
    }

    #[test]
    fn test_short_ass_form_is_opaque() {
        assert_eq!(ass_to_hex("&H0000FF").unwrap(), "#FF0000");
        assert_eq!(ass_to_hex("&H00FFFFFF&").unwrap(), "#FFFFFF");
        assert_eq!(ass_to_hex("#FFFFFF"), None);
    }

    #[test]
    fn test_canonical_hex() {
        assert_eq!(canonical_hex("#ffd700").unwrap(), "#FFD700");
        assert_eq!(canonical_hex("#ffd70000").unwrap(), "#FFD700");
        assert_eq!(canonical_hex("#ffd700ff").unwrap(), "#FFD700FF");
        assert_eq!(canonical_hex("#ffd70080").unwrap(), "#FFD70080");
        assert_eq!(canonical_hex("ffd700"), None);
    }

    #[test]
    fn test_canonical_form_is_stable_through_ass() {
        for input in ["#ffd70000", "#abcdef", "#0a0b0c7f"] {
            let canonical = canonical_hex(input).unwrap();
            let ass = hex_to_ass(&canonical).unwrap();
            assert_eq!(ass_to_hex(&ass).unwrap(), canonical);
            assert_eq!(hex_to_ass(input).unwrap(), ass);
        }
    }

    #[test]
    fn test_with_alpha() {
        assert_eq!(Color::white().with_alpha(0.0).a, 0);
        assert_eq!(Color::white().with_alpha(0.5).a, 127);
        assert_eq!(Color::rgba(0, 0, 0, 128).with_alpha(0.0).a, 128);
        assert_eq!(Color::rgba(0, 0, 0, 128).with_alpha(0.5).a, 191);
        assert_eq!(Color::white().with_alpha(1.0).a, 255);
        assert_eq!(Color::white().with_alpha(3.0).a, 255);
        assert_eq!(Color::white().with_alpha(-1.0).a, 0);
    }
}

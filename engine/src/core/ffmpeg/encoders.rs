//! Video encoder selection.
//!
//! Hardware encoders are tried first when available; libx264 is always the
//! last candidate.

use serde::{Deserialize, Serialize};

/// Hardware encoder type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareEncoder {
    /// NVIDIA NVENC
    Nvenc,
    /// Intel QuickSync
    Qsv,
    /// Apple VideoToolbox
    VideoToolbox,
    /// Software fallback
    Software,
}

impl HardwareEncoder {
    /// Hardware encoders in preference order
    pub const HARDWARE: [HardwareEncoder; 3] = [
        HardwareEncoder::Nvenc,
        HardwareEncoder::Qsv,
        HardwareEncoder::VideoToolbox,
    ];

    /// FFmpeg encoder name for H.264
    pub fn h264_encoder(&self) -> &'static str {
        match self {
            HardwareEncoder::Nvenc => "h264_nvenc",
            HardwareEncoder::Qsv => "h264_qsv",
            HardwareEncoder::VideoToolbox => "h264_videotoolbox",
            HardwareEncoder::Software => "libx264",
        }
    }

    pub fn is_hardware(&self) -> bool {
        !matches!(self, HardwareEncoder::Software)
    }

    /// Rate control arguments approximating `crf` on each encoder
    pub fn quality_args(&self, settings: &EncodeSettings) -> Vec<String> {
        let crf = settings.crf.to_string();
        match self {
            HardwareEncoder::Nvenc => vec![
                "-preset".into(),
                "p4".into(),
                "-rc".into(),
                "vbr".into(),
                "-cq".into(),
                crf,
            ],
            HardwareEncoder::Qsv => vec!["-global_quality".into(), crf],
            // VideoToolbox has no CRF; -q:v runs 1-100 with higher meaning better
            HardwareEncoder::VideoToolbox => {
                let q = (100u32.saturating_sub(settings.crf as u32 * 2)).clamp(1, 100);
                vec!["-q:v".into(), q.to_string()]
            }
            HardwareEncoder::Software => vec![
                "-preset".into(),
                settings.software_preset.clone(),
                "-crf".into(),
                crf,
            ],
        }
    }
}

impl std::fmt::Display for HardwareEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.h264_encoder())
    }
}

/// Encoder preferences for burn jobs
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSettings {
    pub prefer_hardware: bool,
    /// x264 preset (ultrafast … veryslow)
    pub software_preset: String,
    /// Constant rate factor, 0-51, lower is better
    pub crf: u8,
    /// Hardware encoders reported by `ffmpeg -encoders`
    pub available_hardware: Vec<HardwareEncoder>,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            prefer_hardware: true,
            software_preset: "veryfast".to_string(),
            crf: 23,
            available_hardware: Vec::new(),
        }
    }
}

impl EncodeSettings {
    /// Encoders to attempt, in order. Software always comes last.
    pub fn candidates(&self) -> Vec<HardwareEncoder> {
        let mut out = Vec::new();
        if self.prefer_hardware {
            for encoder in HardwareEncoder::HARDWARE {
                if self.available_hardware.contains(&encoder) {
                    out.push(encoder);
                    break;
                }
            }
        }
        out.push(HardwareEncoder::Software);
        out
    }
}

//! FFmpeg Detection Module
//!
//! Handles detection and validation of FFmpeg/FFprobe binaries and probes
//! which H.264 encoders the installed build offers.

use std::path::{Path, PathBuf};
use std::process::Command;

use super::{FFmpegError, FFmpegResult, HardwareEncoder};
use crate::core::process::configure_std_command;

/// Where the binaries were found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionSource {
    /// Explicit path from configuration (or `SUBBURN_FFMPEG_PATH`)
    Configured,
    /// Common install location or PATH lookup
    System,
}

/// Information about detected FFmpeg installation
#[derive(Debug, Clone)]
pub struct FFmpegInfo {
    /// Path to ffmpeg binary
    pub ffmpeg_path: PathBuf,
    /// Path to ffprobe binary
    pub ffprobe_path: PathBuf,
    /// FFmpeg version string
    pub version: String,
    pub source: DetectionSource,
}

#[cfg(target_os = "windows")]
const FFMPEG_BINARY: &str = "ffmpeg.exe";
#[cfg(not(target_os = "windows"))]
const FFMPEG_BINARY: &str = "ffmpeg";

#[cfg(target_os = "windows")]
const FFPROBE_BINARY: &str = "ffprobe.exe";
#[cfg(not(target_os = "windows"))]
const FFPROBE_BINARY: &str = "ffprobe";

/// Detects FFmpeg, preferring configured paths over the system install.
///
/// When only the ffmpeg path is configured, ffprobe is looked up next to it
/// before falling back to the system.
pub fn detect_ffmpeg(
    ffmpeg_override: Option<&Path>,
    ffprobe_override: Option<&Path>,
) -> FFmpegResult<FFmpegInfo> {
    let Some(ffmpeg_path) = ffmpeg_override else {
        return detect_system_ffmpeg();
    };

    if !ffmpeg_path.is_file() {
        tracing::warn!(
            path = %ffmpeg_path.display(),
            "Configured ffmpeg path does not exist, falling back to system ffmpeg"
        );
        return detect_system_ffmpeg();
    }

    let ffprobe_path = match ffprobe_override {
        Some(path) if path.is_file() => path.to_path_buf(),
        _ => {
            let sibling = ffmpeg_path.with_file_name(FFPROBE_BINARY);
            if sibling.is_file() {
                sibling
            } else {
                which_binary(FFPROBE_BINARY)?
            }
        }
    };

    let version = get_ffmpeg_version(ffmpeg_path)?;
    Ok(FFmpegInfo {
        ffmpeg_path: ffmpeg_path.to_path_buf(),
        ffprobe_path,
        version,
        source: DetectionSource::Configured,
    })
}

/// Detect FFmpeg from common install locations and the system PATH
pub fn detect_system_ffmpeg() -> FFmpegResult<FFmpegInfo> {
    let ffmpeg_path = which_binary(FFMPEG_BINARY)?;
    let ffprobe_path = which_binary(FFPROBE_BINARY)?;

    let version = get_ffmpeg_version(&ffmpeg_path)?;

    Ok(FFmpegInfo {
        ffmpeg_path,
        ffprobe_path,
        version,
        source: DetectionSource::System,
    })
}

/// Finds a binary in common locations, then via `where` / `which`
fn which_binary(binary_name: &str) -> FFmpegResult<PathBuf> {
    for dir in get_common_ffmpeg_paths() {
        let candidate = dir.join(binary_name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    #[cfg(target_os = "windows")]
    let mut cmd = Command::new("where");
    #[cfg(not(target_os = "windows"))]
    let mut cmd = Command::new("which");

    configure_std_command(&mut cmd);
    let output = cmd
        .arg(binary_name.trim_end_matches(".exe"))
        .output()
        .map_err(|_| FFmpegError::NotFound)?;

    if output.status.success() {
        let path_str = String::from_utf8_lossy(&output.stdout);
        if let Some(first_line) = path_str.lines().next() {
            let trimmed = first_line.trim();
            if !trimmed.is_empty() {
                return Ok(PathBuf::from(trimmed));
            }
        }
    }

    Err(FFmpegError::NotFound)
}

/// Get common FFmpeg installation paths for the current platform
fn get_common_ffmpeg_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    #[cfg(target_os = "windows")]
    {
        paths.push(PathBuf::from(r"C:\ffmpeg\bin"));
        paths.push(PathBuf::from(r"C:\Program Files\ffmpeg\bin"));

        // Chocolatey installation
        if let Ok(programdata) = std::env::var("ProgramData") {
            paths.push(PathBuf::from(programdata).join("chocolatey").join("bin"));
        }

        // Scoop installation
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join("scoop").join("shims"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        // Homebrew paths
        paths.push(PathBuf::from("/opt/homebrew/bin"));
        paths.push(PathBuf::from("/usr/local/bin"));
        paths.push(PathBuf::from("/opt/local/bin")); // MacPorts
    }

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/bin"));
        paths.push(PathBuf::from("/usr/local/bin"));
        paths.push(PathBuf::from("/snap/bin"));
    }

    paths
}

/// Get FFmpeg version string
fn get_ffmpeg_version(ffmpeg_path: &Path) -> FFmpegResult<String> {
    let mut cmd = Command::new(ffmpeg_path);
    configure_std_command(&mut cmd);
    let output = cmd.arg("-version").output()?;

    if !output.status.success() {
        return Err(FFmpegError::ExecutionFailed(
            "Failed to get FFmpeg version".to_string(),
        ));
    }

    parse_version(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| FFmpegError::ParseError("Could not parse FFmpeg version".to_string()))
}

/// Parses the first line of `ffmpeg -version`: "ffmpeg version X.X.X ..."
fn parse_version(output: &str) -> Option<String> {
    let first_line = output.lines().next()?;
    if let Some(version_part) = first_line.strip_prefix("ffmpeg version ") {
        if let Some(version) = version_part.split_whitespace().next() {
            return Some(version.to_string());
        }
    }
    // Return the whole first line if parsing fails
    Some(first_line.to_string()).filter(|s| !s.trim().is_empty())
}

/// Lists the hardware encoders this ffmpeg build was compiled with.
///
/// Being compiled in does not mean the device exists; the runner still
/// falls back to software when a hardware encode fails.
pub fn probe_hardware_encoders(ffmpeg_path: &Path) -> FFmpegResult<Vec<HardwareEncoder>> {
    let mut cmd = Command::new(ffmpeg_path);
    configure_std_command(&mut cmd);
    let output = cmd.args(["-hide_banner", "-encoders"]).output()?;

    if !output.status.success() {
        return Err(FFmpegError::ExecutionFailed(
            "Failed to list FFmpeg encoders".to_string(),
        ));
    }

    Ok(parse_encoder_list(&String::from_utf8_lossy(&output.stdout)))
}

/// Extracts hardware H.264 encoders from `ffmpeg -encoders` output.
///
/// Encoder rows look like ` V....D h264_nvenc   NVIDIA NVENC H.264 encoder`.
pub fn parse_encoder_list(output: &str) -> Vec<HardwareEncoder> {
    let names: Vec<&str> = output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            flags.starts_with('V').then_some(name)
        })
        .collect();

    HardwareEncoder::HARDWARE
        .iter()
        .copied()
        .filter(|encoder| names.contains(&encoder.h264_encoder()))
        .collect()
}

//! FFmpeg Runner Module
//!
//! Executes the burn-in encode and ffprobe queries.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

use super::{
    detect_ffmpeg, probe_hardware_encoders, BurnRequest, EncodeSettings, FFmpegError,
    FFmpegInfo, FFmpegProgress, FFmpegResult, HardwareEncoder, ProgressParser, Transcoder,
};
use crate::core::fs::escape_ffmpeg_filter_path;
use crate::core::process::configure_tokio_command;
use crate::core::{CoreResult, OutputFormat, SubtitleFormat};

/// Lines of stderr kept for error reporting
const STDERR_TAIL_LINES: usize = 20;

/// Media information extracted by FFprobe
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration_sec: f64,
    /// Video stream info (if present)
    pub video: Option<VideoStreamInfo>,
    /// Audio stream info (if present)
    pub audio: Option<AudioStreamInfo>,
    /// Container format
    pub format: String,
    /// File size in bytes
    pub size_bytes: u64,
}

/// Video stream information
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    /// Frame rate (frames per second)
    pub fps: f64,
    /// Codec name (e.g., "h264", "vp9")
    pub codec: String,
    pub pixel_format: String,
}

/// Audio stream information
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AudioStreamInfo {
    pub sample_rate: u32,
    pub channels: u8,
    /// Codec name (e.g., "aac", "mp3")
    pub codec: String,
}

/// FFmpeg runner for executing commands
#[derive(Debug, Clone)]
pub struct FFmpegRunner {
    info: Arc<FFmpegInfo>,
    settings: EncodeSettings,
}

impl FFmpegRunner {
    pub fn new(info: FFmpegInfo, settings: EncodeSettings) -> Self {
        Self {
            info: Arc::new(info),
            settings,
        }
    }

    /// Detects the binaries and probes hardware encoders.
    ///
    /// Encoder probing failures are logged and leave the runner on libx264.
    pub fn detect(
        ffmpeg_override: Option<&Path>,
        ffprobe_override: Option<&Path>,
        mut settings: EncodeSettings,
    ) -> FFmpegResult<Self> {
        let info = detect_ffmpeg(ffmpeg_override, ffprobe_override)?;

        if settings.prefer_hardware {
            match probe_hardware_encoders(&info.ffmpeg_path) {
                Ok(found) => settings.available_hardware = found,
                Err(e) => {
                    tracing::warn!(error = %e, "Encoder probing failed, using software encoding")
                }
            }
        }

        tracing::info!(
            ffmpeg = %info.ffmpeg_path.display(),
            version = %info.version,
            encoders = ?settings.candidates(),
            "Transcoder ready"
        );
        Ok(Self::new(info, settings))
    }

    /// Get the FFmpeg info
    pub fn info(&self) -> &FFmpegInfo {
        &self.info
    }

    pub fn settings(&self) -> &EncodeSettings {
        &self.settings
    }

    /// Burns subtitles, trying each encoder candidate in turn.
    ///
    /// Only a failed hardware encode moves on to the next candidate; subtitle
    /// filter failures and software failures return immediately.
    pub async fn burn(
        &self,
        request: &BurnRequest,
        progress_tx: Option<mpsc::Sender<FFmpegProgress>>,
    ) -> FFmpegResult<()> {
        if !request.input.exists() {
            return Err(FFmpegError::InvalidInput(format!(
                "Input file does not exist: {}",
                request.input.display()
            )));
        }
        if !request.subtitle_path.exists() {
            return Err(FFmpegError::InvalidInput(format!(
                "Subtitle file does not exist: {}",
                request.subtitle_path.display()
            )));
        }
        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                FFmpegError::OutputError(format!("Failed to create output directory: {}", e))
            })?;
        }

        let mut last_error = None;
        for encoder in self.settings.candidates() {
            match self.run_burn(request, encoder, progress_tx.clone()).await {
                Ok(()) => return Ok(()),
                Err(FFmpegError::ExecutionFailed(msg)) if encoder.is_hardware() => {
                    tracing::warn!(
                        encoder = %encoder,
                        error = %msg,
                        "Hardware encode failed, falling back"
                    );
                    let _ = tokio::fs::remove_file(&request.output).await;
                    last_error = Some(FFmpegError::ExecutionFailed(msg));
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(FFmpegError::NotFound))
    }

    async fn run_burn(
        &self,
        request: &BurnRequest,
        encoder: HardwareEncoder,
        progress_tx: Option<mpsc::Sender<FFmpegProgress>>,
    ) -> FFmpegResult<()> {
        let args = build_burn_args(request, encoder, &self.settings);
        tracing::debug!(encoder = %encoder, args = ?args, "Starting burn encode");

        let mut cmd = tokio::process::Command::new(&self.info.ffmpeg_path);
        configure_tokio_command(&mut cmd);
        cmd.args(&args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn()?;

        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(collect_tail(stderr)));

        if let Some(stdout) = child.stdout.take() {
            let mut parser = ProgressParser::new(request.duration_sec, None);
            let mut lines = BufReader::new(stdout).lines();
            let mut tx = progress_tx;

            // Keep draining after the receiver goes away so ffmpeg never
            // blocks on a full pipe.
            while let Some(line) = lines.next_line().await? {
                if let Some(progress) = parser.feed_line(&line) {
                    if let Some(sender) = &tx {
                        if sender.send(progress).await.is_err() {
                            tx = None;
                        }
                    }
                }
            }
        }

        let status = child.wait().await?;
        let tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            let last_line = tail.lines().last().unwrap_or("no output").to_string();
            if is_subtitle_filter_failure(&tail) {
                return Err(FFmpegError::SubtitleFilter(last_line));
            }
            return Err(FFmpegError::ExecutionFailed(format!(
                "{} exited with {}: {}",
                encoder, status, last_line
            )));
        }

        let written = tokio::fs::metadata(&request.output)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if written == 0 {
            return Err(FFmpegError::OutputError(
                "Encoder produced an empty output file".to_string(),
            ));
        }

        Ok(())
    }

    /// Probe media file to get information
    pub async fn probe(&self, input: &Path) -> FFmpegResult<MediaInfo> {
        if !input.exists() {
            return Err(FFmpegError::InvalidInput(format!(
                "Input file does not exist: {}",
                input.display()
            )));
        }

        let mut cmd = tokio::process::Command::new(&self.info.ffprobe_path);
        configure_tokio_command(&mut cmd);
        let output = cmd
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                &input.to_string_lossy(),
            ])
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FFmpegError::ProbeError(format!("FFprobe failed: {}", stderr)));
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl Transcoder for FFmpegRunner {
    async fn probe(&self, input: &Path) -> CoreResult<MediaInfo> {
        Ok(FFmpegRunner::probe(self, input).await?)
    }

    async fn burn_subtitles(
        &self,
        request: &BurnRequest,
        progress_tx: Option<mpsc::Sender<FFmpegProgress>>,
    ) -> CoreResult<()> {
        Ok(self.burn(request, progress_tx).await?)
    }
}

/// Builds the single ffmpeg invocation for a burn.
///
/// Video is re-encoded through the subtitles filter; audio is stream-copied.
pub fn build_burn_args(
    request: &BurnRequest,
    encoder: HardwareEncoder,
    settings: &EncodeSettings,
) -> Vec<String> {
    let escaped = escape_ffmpeg_filter_path(&request.subtitle_path);
    let filter = match request.subtitle_format {
        SubtitleFormat::Ass => format!("subtitles=filename='{escaped}'"),
        SubtitleFormat::Srt | SubtitleFormat::Vtt => {
            format!("subtitles=filename='{escaped}':charenc=UTF-8")
        }
    };

    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-y".into(),
        "-i".into(),
        request.input.to_string_lossy().into_owned(),
        "-vf".into(),
        filter,
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "0:a?".into(),
        "-c:v".into(),
        encoder.h264_encoder().into(),
    ];
    args.extend(encoder.quality_args(settings));
    args.extend(["-pix_fmt", "yuv420p", "-c:a", "copy"].map(String::from));

    if matches!(request.output_format, OutputFormat::Mp4 | OutputFormat::Mov) {
        args.extend(["-movflags", "+faststart"].map(String::from));
    }

    args.extend(["-progress", "pipe:1", "-nostats"].map(String::from));
    args.push(request.output.to_string_lossy().into_owned());
    args
}

/// Keeps the last lines of a process stream
async fn collect_tail<R: AsyncRead + Unpin>(reader: R) -> String {
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join("\n")
}

/// Whether ffmpeg failed inside the subtitles filter rather than the encoder
fn is_subtitle_filter_failure(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("parsed_subtitles")
        || lower.contains("filter 'subtitles'")
        || lower.contains("libass")
        || (lower.contains("unable to open") && lower.contains(".ass"))
}

/// Parse FFprobe JSON output
pub fn parse_probe_output(json_str: &str) -> FFmpegResult<MediaInfo> {
    let json: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| FFmpegError::ParseError(format!("Failed to parse FFprobe output: {}", e)))?;

    let format = json
        .get("format")
        .ok_or_else(|| FFmpegError::ParseError("Missing format info".to_string()))?;

    let duration_sec = str_number::<f64>(format, "duration").unwrap_or(0.0);
    let size_bytes = str_number::<u64>(format, "size").unwrap_or(0);
    let format_name = str_field(format, "format_name");

    let streams = json
        .get("streams")
        .and_then(|s| s.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut video: Option<VideoStreamInfo> = None;
    let mut audio: Option<AudioStreamInfo> = None;

    for stream in streams {
        match stream.get("codec_type").and_then(|c| c.as_str()) {
            Some("video") if video.is_none() => {
                video = Some(VideoStreamInfo {
                    width: stream.get("width").and_then(|w| w.as_u64()).unwrap_or(0) as u32,
                    height: stream.get("height").and_then(|h| h.as_u64()).unwrap_or(0) as u32,
                    fps: stream
                        .get("r_frame_rate")
                        .and_then(|f| f.as_str())
                        .and_then(parse_frame_rate)
                        .unwrap_or(30.0),
                    codec: str_field(stream, "codec_name"),
                    pixel_format: str_field(stream, "pix_fmt"),
                });
            }
            Some("audio") if audio.is_none() => {
                audio = Some(AudioStreamInfo {
                    sample_rate: str_number::<u32>(stream, "sample_rate").unwrap_or(44100),
                    channels: stream.get("channels").and_then(|c| c.as_u64()).unwrap_or(2) as u8,
                    codec: str_field(stream, "codec_name"),
                });
            }
            _ => {}
        }
    }

    Ok(MediaInfo {
        duration_sec,
        video,
        audio,
        format: format_name,
        size_bytes,
    })
}

/// ffprobe reports most numbers as JSON strings
fn str_number<T: std::str::FromStr>(value: &serde_json::Value, key: &str) -> Option<T> {
    value.get(key).and_then(|v| v.as_str()).and_then(|s| s.parse().ok())
}

fn str_field(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string()
}

/// "30/1", "30000/1001" or a plain number
fn parse_frame_rate(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den > 0.0).then(|| num / den)
        }
        None => s.parse().ok(),
    }
}

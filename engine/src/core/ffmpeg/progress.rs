//! `-progress pipe:1` parsing.
//!
//! FFmpeg writes `key=value` lines and closes every block with
//! `progress=continue` or `progress=end`. One [`FFmpegProgress`] is produced
//! per block.

/// Progress information for long-running FFmpeg operations
#[derive(Debug, Clone, PartialEq)]
pub struct FFmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Total frames (if known)
    pub total_frames: Option<u64>,
    /// Progress percentage (0.0 - 100.0)
    pub percent: f32,
    /// Current processing speed (fps)
    pub fps: f32,
    /// Bitrate (kbits/s)
    pub bitrate: Option<f32>,
    /// Current time position
    pub time_sec: f64,
    /// Estimated time remaining (seconds)
    pub eta_seconds: Option<u64>,
    /// Set on the final `progress=end` block
    pub finished: bool,
}

/// Line-oriented state machine over the progress stream
#[derive(Debug, Default)]
pub struct ProgressParser {
    duration_sec: Option<f64>,
    total_frames: Option<u64>,
    frame: u64,
    fps: f32,
    bitrate: Option<f32>,
    time_sec: f64,
    speed: Option<f64>,
}

impl ProgressParser {
    /// `duration_sec` and `fps` come from probing the source; either may be
    /// unknown.
    pub fn new(duration_sec: Option<f64>, fps: Option<f64>) -> Self {
        let duration_sec = duration_sec.filter(|d| d.is_finite() && *d > 0.0);
        let total_frames = match (duration_sec, fps) {
            (Some(d), Some(f)) if f > 0.0 => Some((d * f) as u64),
            _ => None,
        };
        Self {
            duration_sec,
            total_frames,
            ..Default::default()
        }
    }

    /// Feeds one line; returns a snapshot when the line closes a block
    pub fn feed_line(&mut self, line: &str) -> Option<FFmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key {
            "frame" => self.frame = value.parse().unwrap_or(self.frame),
            "fps" => self.fps = value.parse().unwrap_or(self.fps),
            "bitrate" => {
                self.bitrate = value.trim_end_matches("kbits/s").parse().ok();
            }
            // Both keys carry microseconds
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.time_sec = us.max(0) as f64 / 1_000_000.0;
                }
            }
            "speed" => {
                self.speed = value.trim_end_matches('x').parse().ok().filter(|s: &f64| *s > 0.0);
            }
            "progress" => return Some(self.snapshot(value == "end")),
            _ => {}
        }
        None
    }

    fn snapshot(&self, finished: bool) -> FFmpegProgress {
        let percent = if finished {
            100.0
        } else if let Some(duration) = self.duration_sec {
            (self.time_sec / duration * 100.0) as f32
        } else if let Some(total) = self.total_frames.filter(|t| *t > 0) {
            self.frame as f32 / total as f32 * 100.0
        } else {
            0.0
        };

        let eta_seconds = if finished {
            Some(0)
        } else {
            self.duration_sec.and_then(|duration| {
                let remaining = (duration - self.time_sec).max(0.0);
                match self.speed {
                    Some(speed) => Some((remaining / speed).round() as u64),
                    None if self.fps > 0.0 => {
                        self.total_frames.map(|total| {
                            (total.saturating_sub(self.frame) as f32 / self.fps).round() as u64
                        })
                    }
                    None => None,
                }
            })
        };

        FFmpegProgress {
            frame: self.frame,
            total_frames: self.total_frames,
            percent: percent.clamp(0.0, 100.0),
            fps: self.fps,
            bitrate: self.bitrate,
            time_sec: self.time_sec,
            eta_seconds,
            finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parser: &mut ProgressParser, block: &str) -> Vec<FFmpegProgress> {
        block.lines().filter_map(|l| parser.feed_line(l)).collect()
    }

    #[test]
    fn test_block_produces_snapshot() {
        let mut parser = ProgressParser::new(Some(100.0), Some(30.0));
        let out = feed(
            &mut parser,
            "frame=750\nfps=60.0\nbitrate=1534.2kbits/s\nout_time_us=25000000\nspeed=2.0x\nprogress=continue\n",
        );

        assert_eq!(out.len(), 1);
        let p = &out[0];
        assert_eq!(p.frame, 750);
        assert_eq!(p.total_frames, Some(3000));
        assert!((p.percent - 25.0).abs() < 1e-3);
        assert_eq!(p.bitrate, Some(1534.2));
        // 75s of media left at 2x
        assert_eq!(p.eta_seconds, Some(38));
        assert!(!p.finished);
    }

    #[test]
    fn test_end_block_is_complete() {
        let mut parser = ProgressParser::new(Some(10.0), None);
        let out = feed(&mut parser, "out_time_ms=4000000\nprogress=continue\nprogress=end\n");

        assert_eq!(out.len(), 2);
        assert!((out[0].percent - 40.0).abs() < 1e-3);
        assert_eq!(out[1].percent, 100.0);
        assert_eq!(out[1].eta_seconds, Some(0));
        assert!(out[1].finished);
    }

    #[test]
    fn test_unknown_duration_and_noise() {
        let mut parser = ProgressParser::new(None, None);
        let out = feed(
            &mut parser,
            "garbage line\nbitrate=N/A\nout_time_us=N/A\nspeed=N/A\nprogress=continue\n",
        );

        assert_eq!(out[0].percent, 0.0);
        assert_eq!(out[0].eta_seconds, None);
        assert_eq!(out[0].bitrate, None);
    }

    #[test]
    fn test_percent_is_capped() {
        let mut parser = ProgressParser::new(Some(10.0), None);
        let out = feed(&mut parser, "out_time_us=12000000\nprogress=continue\n");
        assert_eq!(out[0].percent, 100.0);
        assert_eq!(out[0].eta_seconds, None);
    }
}

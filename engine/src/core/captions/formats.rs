//! Plain Subtitle Formats
//!
//! SRT (burn fallback and export) and WebVTT (export), plus parsers used to
//! verify generated files and to import corrected subtitles.

use std::fmt::Write as _;

use thiserror::Error;

use super::models::Cue;
use crate::core::{CoreError, TimeSec};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while parsing subtitle text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Unexpected end of input")]
    UnexpectedEnd,
}

impl From<ParseError> for CoreError {
    fn from(e: ParseError) -> Self {
        CoreError::SubtitleGeneration(e.to_string())
    }
}

// =============================================================================
// SRT Format
// =============================================================================

/// Exports cues as SRT.
///
/// Every block, including the last, ends with a blank line:
///
/// ```text
/// 1
/// 00:00:01,000 --> 00:00:04,000
/// First line
/// second line
///
/// ```
pub fn export_srt(cues: &[Cue]) -> String {
    let mut output = String::new();

    for (index, cue) in cues.iter().enumerate() {
        let _ = writeln!(output, "{}", index + 1);
        let _ = writeln!(
            output,
            "{} --> {}",
            format_srt_timestamp(cue.start_sec),
            format_srt_timestamp(cue.end_sec)
        );
        output.push_str(&plain_text(cue));
        output.push_str("\n\n");
    }

    output
}

/// Formats seconds as SRT timestamp (00:00:00,000)
pub fn format_srt_timestamp(seconds: TimeSec) -> String {
    let (hours, mins, secs, ms) = split_millis(seconds);
    format!("{:02}:{:02}:{:02},{:03}", hours, mins, secs, ms)
}

/// Parses SRT content into cues
pub fn parse_srt(content: &str) -> Result<Vec<Cue>, ParseError> {
    let mut cues = Vec::new();
    let mut lines = content.lines().peekable();

    loop {
        while lines.peek().is_some_and(|l| l.trim().is_empty()) {
            lines.next();
        }
        let Some(seq) = lines.next() else {
            break;
        };
        if seq.trim().trim_start_matches('\u{feff}').parse::<u64>().is_err() {
            return Err(ParseError::InvalidFormat(format!(
                "Expected cue number, found '{}'",
                seq.trim()
            )));
        }

        let timestamp_line = lines.next().ok_or(ParseError::UnexpectedEnd)?;
        let (start_sec, end_sec) = parse_timestamp_line(timestamp_line, parse_srt_timestamp)?;

        let mut text_lines = Vec::new();
        while let Some(line) = lines.next_if(|l| !l.trim().is_empty()) {
            text_lines.push(line.to_string());
        }
        if text_lines.is_empty() {
            return Err(ParseError::MissingData(format!("text of cue {}", seq.trim())));
        }

        cues.push(Cue {
            start_sec,
            end_sec,
            lines: text_lines,
            words: Vec::new(),
        });
    }

    Ok(cues)
}

/// Parses an SRT timestamp (e.g., "00:01:23,456") into seconds
pub fn parse_srt_timestamp(ts: &str) -> Result<TimeSec, ParseError> {
    let invalid = || ParseError::InvalidTimestamp(ts.to_string());

    let (hms, millis) = ts.split_once(',').ok_or_else(invalid)?;
    let parts: Vec<&str> = hms.split(':').collect();
    if parts.len() != 3 || millis.len() != 3 {
        return Err(invalid());
    }

    let hours: u64 = parts[0].parse().map_err(|_| invalid())?;
    let minutes: u64 = parts[1].parse().map_err(|_| invalid())?;
    let seconds: u64 = parts[2].parse().map_err(|_| invalid())?;
    let millis: u64 = millis.parse().map_err(|_| invalid())?;
    if minutes >= 60 || seconds >= 60 {
        return Err(invalid());
    }

    Ok(((hours * 3600 + minutes * 60 + seconds) * 1000 + millis) as f64 / 1000.0)
}

// =============================================================================
// VTT Format
// =============================================================================

/// Exports cues as WebVTT
pub fn export_vtt(cues: &[Cue]) -> String {
    let mut output = String::from("WEBVTT\n\n");

    for cue in cues {
        let _ = writeln!(
            output,
            "{} --> {}",
            format_vtt_timestamp(cue.start_sec),
            format_vtt_timestamp(cue.end_sec)
        );
        output.push_str(&plain_text(cue));
        output.push_str("\n\n");
    }

    output
}

/// Formats seconds as VTT timestamp (00:00:00.000)
pub fn format_vtt_timestamp(seconds: TimeSec) -> String {
    let (hours, mins, secs, ms) = split_millis(seconds);
    format!("{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
}

/// Parses WebVTT content into cues, dropping inline tags
pub fn parse_vtt(content: &str) -> Result<Vec<Cue>, ParseError> {
    let mut cues = Vec::new();
    let mut lines = content.lines().peekable();

    match lines.next() {
        Some(first) if first.trim_start_matches('\u{feff}').starts_with("WEBVTT") => {}
        _ => {
            return Err(ParseError::InvalidFormat(
                "VTT file must start with WEBVTT".to_string(),
            ))
        }
    }
    // Header metadata runs until the first blank line
    while lines.next_if(|l| !l.trim().is_empty()).is_some() {}

    loop {
        while lines.peek().is_some_and(|l| l.trim().is_empty()) {
            lines.next();
        }
        let Some(first_line) = lines.next() else {
            break;
        };

        // NOTE blocks carry no timing
        if first_line.starts_with("NOTE") {
            while lines.next_if(|l| !l.trim().is_empty()).is_some() {}
            continue;
        }

        let timestamp_line = if first_line.contains("-->") {
            first_line
        } else {
            lines.next().ok_or(ParseError::UnexpectedEnd)?
        };
        let (start_sec, end_sec) = parse_timestamp_line(timestamp_line, parse_vtt_timestamp)?;

        let mut text_lines = Vec::new();
        while let Some(line) = lines.next_if(|l| !l.trim().is_empty()) {
            text_lines.push(strip_vtt_tags(line));
        }
        if text_lines.is_empty() {
            return Err(ParseError::MissingData("Cue text".to_string()));
        }

        cues.push(Cue {
            start_sec,
            end_sec,
            lines: text_lines,
            words: Vec::new(),
        });
    }

    Ok(cues)
}

/// Parses a VTT timestamp (e.g., "00:01:23.456" or "01:23.456") into seconds
pub fn parse_vtt_timestamp(ts: &str) -> Result<TimeSec, ParseError> {
    let invalid = || ParseError::InvalidTimestamp(ts.to_string());
    let parts: Vec<&str> = ts.split(':').collect();

    let (hours, minutes, seconds) = match parts.as_slice() {
        [m, s] => (0.0, *m, *s),
        [h, m, s] => (h.parse::<f64>().map_err(|_| invalid())?, *m, *s),
        _ => return Err(invalid()),
    };
    let minutes: f64 = minutes.parse().map_err(|_| invalid())?;
    let seconds: f64 = seconds.parse().map_err(|_| invalid())?;
    if !(0.0..60.0).contains(&minutes) || !(0.0..60.0).contains(&seconds) {
        return Err(invalid());
    }

    Ok(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Removes `<...>` tags from cue text
fn strip_vtt_tags(text: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;

    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }

    result
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Parses "start --> end [settings]" with the given timestamp parser
fn parse_timestamp_line(
    line: &str,
    parse: fn(&str) -> Result<TimeSec, ParseError>,
) -> Result<(TimeSec, TimeSec), ParseError> {
    let (start, end) = line.split_once("-->").ok_or_else(|| {
        ParseError::InvalidFormat(format!("Expected 'start --> end' format: {}", line))
    })?;

    let end = end.split_whitespace().next().unwrap_or_default();
    Ok((parse(start.trim())?, parse(end)?))
}

/// Cue lines with blank lines removed; a blank line would end the block
fn plain_text(cue: &Cue) -> String {
    cue.lines
        .iter()
        .flat_map(|l| l.lines())
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn split_millis(seconds: TimeSec) -> (u64, u64, u64, u64) {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;
    (total_mins / 60, total_mins % 60, secs, ms)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(start: f64, end: f64, lines: &[&str]) -> Cue {
        Cue {
            start_sec: start,
            end_sec: end,
            lines: lines.iter().map(|l| l.to_string()).collect(),
            words: Vec::new(),
        }
    }

    #[test]
    fn test_export_srt_blocks() {
        let cues = vec![
            cue(1.0, 4.0, &["Hello", "World"]),
            cue(5.5, 8.0, &["Second"]),
        ];

        assert_eq!(
            export_srt(&cues),
            "1\n00:00:01,000 --> 00:00:04,000\nHello\nWorld\n\n2\n00:00:05,500 --> 00:00:08,000\nSecond\n\n"
        );
    }

    #[test]
    fn test_export_srt_drops_blank_lines() {
        let cues = vec![cue(0.0, 1.0, &["one", "", "two\n\nthree"])];
        assert_eq!(
            export_srt(&cues),
            "1\n00:00:00,000 --> 00:00:01,000\none\ntwo\nthree\n\n"
        );
    }

    #[test]
    fn test_format_srt_timestamp() {
        assert_eq!(format_srt_timestamp(0.0), "00:00:00,000");
        assert_eq!(format_srt_timestamp(3723.456), "01:02:03,456");
    }

    #[test]
    fn test_parse_srt_basic() {
        let srt = "1\n00:00:01,000 --> 00:00:04,000\nHello World\n\n2\n00:00:05,500 --> 00:00:08,000\nSecond caption\nline two\n";

        let cues = parse_srt(srt).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start_sec, 1.0);
        assert_eq!(cues[1].end_sec, 8.0);
        assert_eq!(cues[1].lines, vec!["Second caption", "line two"]);
    }

    #[test]
    fn test_parse_srt_errors() {
        assert!(matches!(
            parse_srt("1\n00:00:01 --> 00:00:02\nx\n"),
            Err(ParseError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            parse_srt("one\n00:00:01,000 --> 00:00:02,000\nx\n"),
            Err(ParseError::InvalidFormat(_))
        ));
        assert!(matches!(parse_srt("1\n"), Err(ParseError::UnexpectedEnd)));
        assert!(matches!(
            parse_srt("1\n00:00:01,000 --> 00:00:02,000\n\n"),
            Err(ParseError::MissingData(_))
        ));
    }

    #[test]
    fn test_srt_export_parses_back() {
        let cues = vec![cue(0.25, 1.75, &["a", "b"]), cue(2.0, 3.0, &["c"])];
        let parsed = parse_srt(&export_srt(&cues)).unwrap();

        assert_eq!(parsed, cues);
    }

    #[test]
    fn test_export_vtt() {
        let cues = vec![cue(1.0, 2.5, &["Hi"])];
        assert_eq!(
            export_vtt(&cues),
            "WEBVTT\n\n00:00:01.000 --> 00:00:02.500\nHi\n\n"
        );
    }

    #[test]
    fn test_parse_vtt_with_ids_notes_and_tags() {
        let vtt = "WEBVTT - Title\nKind: captions\n\nNOTE translated\n\ncue-1\n00:01.000 --> 00:04.000 align:start\n<v Bob>Hello</v> there\n\n00:00:05.500 --> 00:00:08.000\nBye\n";

        let cues = parse_vtt(vtt).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start_sec, 1.0);
        assert_eq!(cues[0].lines, vec!["Hello there"]);
        assert_eq!(cues[1].start_sec, 5.5);
    }

    #[test]
    fn test_parse_vtt_requires_header() {
        assert!(matches!(
            parse_vtt("00:01.000 --> 00:02.000\nx\n"),
            Err(ParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_parse_error_into_core_error() {
        let err: CoreError = ParseError::UnexpectedEnd.into();
        assert!(matches!(err, CoreError::SubtitleGeneration(_)));
    }
}

//! Output verification.
//!
//! Generated files are re-read before they leave the renderer. Anything the
//! transcoder could choke on (missing sections, unparsable or overlapping
//! timestamps) is a generation error.

use super::ass::{parse_ass_timestamp, EVENT_FORMAT, STYLE_FORMAT};
use super::formats::{parse_srt, parse_vtt};
use crate::core::{CoreError, CoreResult, SubtitleFormat, TimeSec};

/// Checks a rendered file and returns its cue timings in file order
pub fn validate_output(format: SubtitleFormat, content: &str) -> CoreResult<Vec<(TimeSec, TimeSec)>> {
    let timings = match format {
        SubtitleFormat::Ass => ass_timings(content)?,
        SubtitleFormat::Srt => {
            check_block_terminator(content)?;
            parse_srt(content)?
                .iter()
                .map(|c| (c.start_sec, c.end_sec))
                .collect()
        }
        SubtitleFormat::Vtt => {
            check_block_terminator(content)?;
            parse_vtt(content)?
                .iter()
                .map(|c| (c.start_sec, c.end_sec))
                .collect()
        }
    };

    check_timeline(&timings)?;
    Ok(timings)
}

fn fail(msg: impl Into<String>) -> CoreError {
    CoreError::SubtitleGeneration(msg.into())
}

/// Timings must increase and never overlap
fn check_timeline(timings: &[(TimeSec, TimeSec)]) -> CoreResult<()> {
    if timings.is_empty() {
        return Err(fail("Subtitle file contains no cues"));
    }
    for (i, (start, end)) in timings.iter().enumerate() {
        if end <= start {
            return Err(fail(format!("Cue {} ends before it starts", i + 1)));
        }
        if i > 0 {
            let (prev_start, prev_end) = timings[i - 1];
            if *start < prev_start {
                return Err(fail(format!("Cue {} is out of order", i + 1)));
            }
            if *start < prev_end {
                return Err(fail(format!("Cue {} overlaps the previous cue", i + 1)));
            }
        }
    }
    Ok(())
}

fn check_block_terminator(content: &str) -> CoreResult<()> {
    if !content.ends_with("\n\n") {
        return Err(fail("Last cue block is not terminated by a blank line"));
    }
    Ok(())
}

/// Walks the ASS sections in order and collects dialogue timings
fn ass_timings(content: &str) -> CoreResult<Vec<(TimeSec, TimeSec)>> {
    #[derive(PartialEq, PartialOrd)]
    enum Section {
        None,
        ScriptInfo,
        Styles,
        Events,
    }

    let mut section = Section::None;
    let mut has_script_type = false;
    let mut style_format = false;
    let mut style_count = 0;
    let mut event_format = false;
    let mut timings = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        let next = match line {
            "[Script Info]" => Some(Section::ScriptInfo),
            "[V4+ Styles]" => Some(Section::Styles),
            "[Events]" => Some(Section::Events),
            _ => None,
        };
        if let Some(next) = next {
            if next <= section {
                return Err(fail(format!("Unexpected section header on line {}", line_no + 1)));
            }
            section = next;
            continue;
        }
        if line.trim().is_empty() || line.starts_with(';') {
            continue;
        }

        match section {
            Section::None => return Err(fail("ASS file must start with [Script Info]")),
            Section::ScriptInfo => {
                if line == "ScriptType: v4.00+" {
                    has_script_type = true;
                }
            }
            Section::Styles => {
                if line == STYLE_FORMAT {
                    style_format = true;
                } else if let Some(rest) = line.strip_prefix("Style: ") {
                    if !style_format || rest.split(',').count() != 23 {
                        return Err(fail(format!("Malformed style on line {}", line_no + 1)));
                    }
                    style_count += 1;
                }
            }
            Section::Events => {
                if line == EVENT_FORMAT {
                    event_format = true;
                } else if let Some(rest) = line.strip_prefix("Dialogue: ") {
                    if !event_format {
                        return Err(fail("Dialogue before the events format line"));
                    }
                    let fields: Vec<&str> = rest.splitn(10, ',').collect();
                    if fields.len() != 10 {
                        return Err(fail(format!("Malformed dialogue on line {}", line_no + 1)));
                    }
                    let start = parse_ass_timestamp(fields[1]);
                    let end = parse_ass_timestamp(fields[2]);
                    match (start, end) {
                        (Some(start), Some(end)) => timings.push((start, end)),
                        _ => {
                            return Err(fail(format!(
                                "Invalid dialogue timestamp on line {}",
                                line_no + 1
                            )))
                        }
                    }
                }
            }
        }
    }

    if !has_script_type {
        return Err(fail("Missing ScriptType in [Script Info]"));
    }
    if style_count == 0 {
        return Err(fail("Missing [V4+ Styles] style definition"));
    }
    if !event_format {
        return Err(fail("Missing [Events] section"));
    }
    Ok(timings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::captions::ass::render_ass;
    use crate::core::captions::formats::{export_srt, export_vtt};
    use crate::core::captions::{Cue, RenderOptions};
    use crate::core::styles::StyleSettings;

    fn cues() -> Vec<Cue> {
        vec![Cue::new(0.0, 1.0, "one"), Cue::new(1.0, 2.5, "two")]
    }

    #[test]
    fn test_generated_files_pass() {
        let ass = render_ass(&cues(), &StyleSettings::default(), &RenderOptions::default());
        assert_eq!(validate_output(SubtitleFormat::Ass, &ass).unwrap().len(), 2);
        assert!(validate_output(SubtitleFormat::Srt, &export_srt(&cues())).is_ok());
        assert!(validate_output(SubtitleFormat::Vtt, &export_vtt(&cues())).is_ok());
    }

    #[test]
    fn test_overlap_rejected() {
        let overlapping = vec![Cue::new(0.0, 2.0, "one"), Cue::new(1.0, 3.0, "two")];
        let err = validate_output(SubtitleFormat::Srt, &export_srt(&overlapping)).unwrap_err();
        assert!(err.to_string().contains("overlaps"));
    }

    #[test]
    fn test_out_of_order_rejected() {
        let reversed = vec![Cue::new(5.0, 6.0, "late"), Cue::new(0.0, 1.0, "early")];
        let ass = render_ass(&reversed, &StyleSettings::default(), &RenderOptions::default());
        let err = validate_output(SubtitleFormat::Ass, &ass).unwrap_err();
        assert!(err.to_string().contains("out of order"));
    }

    #[test]
    fn test_missing_sections_rejected() {
        let ass = render_ass(&cues(), &StyleSettings::default(), &RenderOptions::default());
        let no_events = ass.split("[Events]").next().unwrap().to_string();
        assert!(validate_output(SubtitleFormat::Ass, &no_events).is_err());

        let no_styles = ass.replace("Style: Default", "Styles: Default");
        assert!(validate_output(SubtitleFormat::Ass, &no_styles).is_err());

        assert!(validate_output(SubtitleFormat::Ass, "Dialogue: 0,0:00:00.00").is_err());
    }

    #[test]
    fn test_bad_dialogue_timestamp_rejected() {
        let ass = render_ass(&cues(), &StyleSettings::default(), &RenderOptions::default())
            .replace("0:00:02.50", "0:00:xx.50");
        assert!(validate_output(SubtitleFormat::Ass, &ass).is_err());
    }

    #[test]
    fn test_truncated_srt_rejected() {
        let srt = export_srt(&cues());
        let truncated = srt.trim_end();
        assert!(validate_output(SubtitleFormat::Srt, truncated).is_err());
    }

    #[test]
    fn test_empty_file_rejected() {
        assert!(validate_output(SubtitleFormat::Srt, "").is_err());
    }
}

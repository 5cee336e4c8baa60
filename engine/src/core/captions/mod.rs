//! Subtitle Renderer
//!
//! Turns transcript segments plus a style into subtitle file bytes:
//! - ASS (styled, burned by default)
//! - SRT (unstyled fallback)
//! - VTT (export only)
//!
//! Rendering is pure: no I/O, no clock. The same inputs always produce the
//! same bytes.

pub mod ass;
pub mod formats;
pub mod grouping;
mod models;
pub mod validate;

pub use formats::{export_srt, export_vtt, parse_srt, parse_vtt, ParseError};
pub use grouping::{group_cues, resolve_timing};
pub use models::*;
pub use validate::validate_output;

use crate::core::styles::StyleSettings;
use crate::core::transcripts::TranscriptSegment;
use crate::core::{CoreError, CoreResult, SubtitleFormat};

/// Stateless subtitle renderer
#[derive(Clone, Copy, Debug, Default)]
pub struct SubtitleRenderer;

impl SubtitleRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Groups `segments` into cues and encodes them in `options.format`.
    ///
    /// The result has already passed [`validate_output`].
    pub fn render(
        &self,
        segments: &[TranscriptSegment],
        settings: &StyleSettings,
        options: &RenderOptions,
    ) -> CoreResult<SubtitleDocument> {
        let cues = group_cues(segments, settings)?;
        if cues.is_empty() {
            return Err(CoreError::SubtitleGeneration(
                "Transcript contains no words to display".to_string(),
            ));
        }
        self.encode(cues, settings, options)
    }

    /// Encodes already-grouped cues; used to re-emit the same cues in
    /// another format
    pub fn encode(
        &self,
        cues: Vec<Cue>,
        settings: &StyleSettings,
        options: &RenderOptions,
    ) -> CoreResult<SubtitleDocument> {
        let content = match options.format {
            SubtitleFormat::Ass => ass::render_ass(&cues, settings, options),
            SubtitleFormat::Srt => export_srt(&cues),
            SubtitleFormat::Vtt => export_vtt(&cues),
        };

        validate_output(options.format, &content)?;

        Ok(SubtitleDocument {
            format: options.format,
            cues,
            content,
        })
    }

    /// Re-encodes a document's cues in another format
    pub fn convert(
        &self,
        document: &SubtitleDocument,
        settings: &StyleSettings,
        format: SubtitleFormat,
    ) -> CoreResult<SubtitleDocument> {
        let options = RenderOptions {
            format,
            ..RenderOptions::default()
        };
        self.encode(document.cues.clone(), settings, &options)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transcripts::Word;

    fn ten_segments() -> Vec<TranscriptSegment> {
        (0..10)
            .map(|i| {
                let start = i as f64 * 2.5;
                TranscriptSegment::from_words(vec![
                    Word::new("word", start, start + 0.6),
                    Word::new("number", start + 0.7, start + 1.3),
                    Word::new(&i.to_string(), start + 1.4, start + 2.0),
                ])
            })
            .collect()
    }

    fn dialogue_times(content: &str) -> Vec<(f64, f64)> {
        content
            .lines()
            .filter_map(|l| l.strip_prefix("Dialogue: "))
            .map(|rest| {
                let fields: Vec<&str> = rest.splitn(10, ',').collect();
                (
                    ass::parse_ass_timestamp(fields[1]).unwrap(),
                    ass::parse_ass_timestamp(fields[2]).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_ten_segments_render_ten_dialogue_lines() {
        let doc = SubtitleRenderer::new()
            .render(
                &ten_segments(),
                &StyleSettings::default(),
                &RenderOptions::new(SubtitleFormat::Ass),
            )
            .unwrap();

        let times = dialogue_times(&doc.content);
        assert_eq!(times.len(), 10);
        for pair in times.windows(2) {
            assert!(pair[0].0 < pair[1].0, "ascending");
            assert!(pair[0].1 <= pair[1].0, "non-overlapping");
        }
    }

    #[test]
    fn test_render_is_deterministic() {
        let renderer = SubtitleRenderer::new();
        let segments = ten_segments();
        let options = RenderOptions::new(SubtitleFormat::Ass);

        let a = renderer.render(&segments, &StyleSettings::default(), &options).unwrap();
        let b = renderer.render(&segments, &StyleSettings::default(), &options).unwrap();
        assert_eq!(a.content, b.content);
    }

    #[test]
    fn test_srt_respects_max_lines() {
        let settings = StyleSettings {
            words_per_line: 2,
            max_lines: 2,
            ..Default::default()
        };
        let segment = TranscriptSegment::new(0.0, 4.0, "one two three four five six");

        let doc = SubtitleRenderer::new()
            .render(&[segment], &settings, &RenderOptions::new(SubtitleFormat::Srt))
            .unwrap();

        assert!(doc.content.starts_with("1\n00:00:00,000 --> "));
        assert!(doc.content.contains("one two\nthree four\n\n2\n"));
        assert!(doc.content.ends_with("five six\n\n"));
    }

    #[test]
    fn test_convert_keeps_cues() {
        let renderer = SubtitleRenderer::new();
        let settings = StyleSettings::default();
        let ass = renderer
            .render(&ten_segments(), &settings, &RenderOptions::new(SubtitleFormat::Ass))
            .unwrap();

        let srt = renderer.convert(&ass, &settings, SubtitleFormat::Srt).unwrap();

        assert_eq!(srt.cues, ass.cues);
        assert_eq!(parse_srt(&srt.content).unwrap().len(), 10);
        assert_eq!(srt.file_name("subs"), "subs.srt");
    }

    #[test]
    fn test_empty_transcript_is_generation_error() {
        let err = SubtitleRenderer::new()
            .render(&[], &StyleSettings::default(), &RenderOptions::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::SubtitleGeneration(_)));
    }
}

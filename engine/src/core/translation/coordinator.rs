//! Translation Coordinator
//!
//! Batches transcript segments to the translation provider, meters
//! characters against the account quota, and owns the translation records.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::detect::{detect_offline, DetectedLanguage};
use super::provider::TranslationProvider;
use super::quality::{mean_quality, validate_quality};
use super::quota::QuotaTracker;
use super::store;
use super::{QualityTier, TranslatedText, TranslationRecord, TranslationSegment, TranslationStatus};
use crate::core::captions::{Cue, RenderOptions, SubtitleDocument, SubtitleRenderer};
use crate::core::db::Database;
use crate::core::storage::TranscriptSource;
use crate::core::styles::StyleSettings;
use crate::core::transcripts::Transcript;
use crate::core::{
    is_valid_language_code, now_rfc3339, AccountId, CoreError, CoreResult, FieldErrors,
    LanguageCode, SubtitleFormat, VideoId,
};

/// Largest batch a single provider call may carry
pub const MAX_BATCH_SIZE: usize = 100;

/// Coordinator tuning
#[derive(Clone, Debug, PartialEq)]
pub struct TranslationSettings {
    /// Segments per provider call, 1..=100
    pub batch_size: usize,
    /// Retries per batch on transient errors
    pub max_retries: u32,
    /// Backoff base; attempt `n` waits `base * 2^n`
    pub retry_base_delay: Duration,
    /// Price in USD per million source characters
    pub cost_per_million_chars: f64,
    /// Account charged for usage
    pub account_id: AccountId,
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            cost_per_million_chars: 20.0,
            account_id: "default".to_string(),
        }
    }
}

/// Validated translate request, ready to enqueue
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationPlan {
    pub video_id: VideoId,
    pub source_language: LanguageCode,
    pub target_language: LanguageCode,
    pub segment_count: usize,
    pub character_count: u64,
}

/// Manual correction of one segment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentEdit {
    /// Position in the record's segment list
    pub index: usize,
    pub translated_text: String,
}

/// Progress callback, percent in 0-100
pub type ProgressFn<'a> = &'a (dyn Fn(f32) + Send + Sync);

pub struct TranslationCoordinator {
    db: Database,
    transcripts: Arc<dyn TranscriptSource>,
    provider: Arc<dyn TranslationProvider>,
    quota: QuotaTracker,
    settings: TranslationSettings,
}

impl TranslationCoordinator {
    pub fn new(
        db: Database,
        transcripts: Arc<dyn TranscriptSource>,
        provider: Arc<dyn TranslationProvider>,
        quota: QuotaTracker,
        mut settings: TranslationSettings,
    ) -> Self {
        settings.batch_size = settings.batch_size.clamp(1, MAX_BATCH_SIZE);
        Self {
            db,
            transcripts,
            provider,
            quota,
            settings,
        }
    }

    pub fn settings(&self) -> &TranslationSettings {
        &self.settings
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    // =========================================================================
    // Request validation
    // =========================================================================

    /// Validates a translate request without calling the provider.
    ///
    /// Runs before a job is queued so bad input and an exhausted quota are
    /// reported synchronously.
    pub fn prepare(
        &self,
        video_id: &str,
        source_language: Option<&str>,
        target_language: &str,
    ) -> CoreResult<TranslationPlan> {
        let mut errors = FieldErrors::new();
        if !is_valid_language_code(target_language) {
            errors.insert("target_language", "must be a language code such as 'es' or 'pt-BR'");
        }
        if let Some(source) = source_language {
            if !is_valid_language_code(source) {
                errors.insert("source_language", "must be a language code such as 'en'");
            }
        }
        errors.into_result()?;

        self.db.require_video(video_id)?;
        let transcript = self.source_transcript(video_id, source_language)?;
        if transcript.language == target_language {
            return Err(CoreError::field(
                "target_language",
                "must differ from the source language",
            ));
        }

        let character_count = transcript.character_count() as u64;
        self.quota.check(&self.settings.account_id, character_count)?;

        Ok(TranslationPlan {
            video_id: video_id.to_string(),
            source_language: transcript.language.clone(),
            target_language: target_language.to_string(),
            segment_count: transcript.segments.len(),
            character_count,
        })
    }

    fn source_transcript(&self, video_id: &str, source_language: Option<&str>) -> CoreResult<Transcript> {
        match source_language {
            Some(language) => self.transcripts.transcript(video_id, language)?.ok_or_else(|| {
                CoreError::MissingTranscript {
                    video_id: video_id.to_string(),
                    language: language.to_string(),
                }
            }),
            None => self.transcripts.primary_transcript(video_id),
        }
    }

    // =========================================================================
    // Translation
    // =========================================================================

    /// Translates a video's transcript into `target_language` and stores
    /// the record
    pub async fn translate(
        &self,
        video_id: &str,
        source_language: Option<&str>,
        target_language: &str,
    ) -> CoreResult<TranslationRecord> {
        self.translate_with_progress(video_id, source_language, target_language, &|_| {})
            .await
    }

    /// [`translate`](Self::translate) reporting percent after every batch
    pub async fn translate_with_progress(
        &self,
        video_id: &str,
        source_language: Option<&str>,
        target_language: &str,
        on_progress: ProgressFn<'_>,
    ) -> CoreResult<TranslationRecord> {
        let plan = self.prepare(video_id, source_language, target_language)?;
        let transcript = self.source_transcript(video_id, Some(&plan.source_language))?;

        let existing = store::load_record(&self.db, video_id, target_language)?;
        let keeps_previous = existing
            .as_ref()
            .is_some_and(|r| r.status == TranslationStatus::Completed);
        let mut record = existing.unwrap_or_else(|| {
            TranslationRecord::new(video_id, &plan.source_language, target_language)
        });
        record.source_language = plan.source_language.clone();
        record.error = None;

        // A completed translation stays readable until its replacement lands
        let in_flight = if keeps_previous {
            tracing::info!(video_id, target_language, "Re-translating over a completed translation");
            None
        } else {
            if record.status.can_transition_to(TranslationStatus::Pending) {
                record.status = TranslationStatus::Pending;
            }
            if record.status == TranslationStatus::Processing {
                tracing::warn!(video_id, target_language, "Restarting a translation left processing");
            }
            record.status = TranslationStatus::Processing;
            record.updated_at = now_rfc3339();
            record = store::save_record(&self.db, &record)?;
            Some(InFlightRecord::new(&self.db, &record))
        };

        tracing::info!(
            video_id,
            source = %plan.source_language,
            target = target_language,
            segments = plan.segment_count,
            characters = plan.character_count,
            "Translating transcript"
        );

        let texts: Vec<String> = transcript.segments.iter().map(|s| s.text.clone()).collect();
        let result = self
            .translate_texts(&texts, &plan.source_language, target_language, on_progress)
            .await;

        match result {
            Ok(translated) => {
                record.segments = transcript
                    .segments
                    .iter()
                    .zip(translated)
                    .map(|(segment, t)| {
                        let score = validate_quality(&segment.text, &t.text);
                        TranslationSegment {
                            start_time: segment.start_sec,
                            end_time: segment.end_sec,
                            original_text: segment.text.clone(),
                            translated_text: t.text,
                            confidence: t.confidence.unwrap_or(score).clamp(0.0, 1.0),
                        }
                    })
                    .collect();
                record.refresh_counts();
                record.quality = QualityTier::Machine;
                record.quality_score = mean_quality(
                    record
                        .segments
                        .iter()
                        .map(|s| (s.original_text.as_str(), s.translated_text.as_str())),
                );
                record.status = TranslationStatus::Completed;
                record.updated_at = now_rfc3339();

                let record = store::save_record(&self.db, &record)?;
                if let Some(guard) = in_flight {
                    guard.finish();
                }
                tracing::info!(
                    video_id,
                    target = target_language,
                    quality_score = ?record.quality_score,
                    "Translation completed"
                );
                Ok(record)
            }
            Err(e) => {
                match in_flight {
                    Some(guard) => guard.fail(e.user_message()),
                    None => tracing::warn!(
                        video_id,
                        target = target_language,
                        "Keeping the completed translation"
                    ),
                }
                tracing::warn!(video_id, target = target_language, error = %e, "Translation failed");
                Err(e)
            }
        }
    }

    /// Translates free texts; one entry per input, in order
    pub async fn translate_batch(
        &self,
        texts: &[String],
        source_language: &str,
        target_language: &str,
    ) -> CoreResult<Vec<TranslatedText>> {
        self.translate_texts(texts, source_language, target_language, &|_| {})
            .await
    }

    async fn translate_texts(
        &self,
        texts: &[String],
        source_language: &str,
        target_language: &str,
        on_progress: ProgressFn<'_>,
    ) -> CoreResult<Vec<TranslatedText>> {
        if texts.is_empty() {
            on_progress(100.0);
            return Ok(Vec::new());
        }

        let account = self.settings.account_id.as_str();
        let char_count = |batch: &[String]| -> u64 {
            batch.iter().map(|t| t.chars().count() as u64).sum()
        };
        // Unsent characters go back to the account on every early exit
        let mut hold = self.quota.hold(account, char_count(texts))?;

        let batches: Vec<&[String]> = texts.chunks(self.settings.batch_size).collect();
        let mut translated = Vec::with_capacity(texts.len());

        for (i, batch) in batches.iter().enumerate() {
            let mut out = self
                .translate_chunk(batch, source_language, target_language)
                .await?;
            hold.spend(char_count(batch));
            translated.append(&mut out);
            on_progress((i + 1) as f32 / batches.len() as f32 * 100.0);
        }

        Ok(translated)
    }

    /// One provider call with exponential backoff on transient errors
    async fn translate_chunk(
        &self,
        batch: &[String],
        source_language: &str,
        target_language: &str,
    ) -> CoreResult<Vec<TranslatedText>> {
        let mut attempt = 0u32;
        loop {
            let result = self
                .provider
                .translate(batch, source_language, target_language)
                .await
                .and_then(|out| {
                    if out.len() == batch.len() {
                        Ok(out)
                    } else {
                        Err(CoreError::TranslationApi(format!(
                            "{} returned {} translations for {} texts",
                            self.provider.name(),
                            out.len(),
                            batch.len()
                        )))
                    }
                });

            match result {
                Ok(out) => return Ok(out),
                Err(e) if e.is_transient() && attempt < self.settings.max_retries => {
                    let delay = self.settings.retry_base_delay * 2u32.saturating_pow(attempt);
                    tracing::warn!(
                        provider = self.provider.name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Translation batch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Detects the language of `text`.
    ///
    /// Falls back to offline detection when the provider fails or is
    /// unsure, and to `und` when nothing matches.
    pub async fn detect_language(&self, text: &str) -> CoreResult<DetectedLanguage> {
        if text.trim().is_empty() {
            return Err(CoreError::field("text", "must not be empty"));
        }

        match self.provider.detect(text).await {
            Ok(Some(detected)) => return Ok(detected),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(provider = self.provider.name(), error = %e, "Language detection failed, using offline detection");
            }
        }
        Ok(detect_offline(text).unwrap_or_else(DetectedLanguage::undetermined))
    }

    /// Price in USD for translating `character_count` characters
    pub fn estimate_cost(&self, character_count: u64) -> f64 {
        let cost = character_count as f64 * self.settings.cost_per_million_chars / 1_000_000.0;
        (cost * 10_000.0).round() / 10_000.0
    }

    /// Advisory plausibility score in 0.0-1.0
    pub fn validate_quality(&self, original: &str, translated: &str) -> f32 {
        validate_quality(original, translated)
    }

    // =========================================================================
    // Records
    // =========================================================================

    pub fn get(&self, video_id: &str, target_language: &str) -> CoreResult<TranslationRecord> {
        store::load_record(&self.db, video_id, target_language)?.ok_or_else(|| {
            CoreError::TranslationNotFound {
                video_id: video_id.to_string(),
                language: target_language.to_string(),
            }
        })
    }

    pub fn list(&self, video_id: &str) -> CoreResult<Vec<TranslationRecord>> {
        store::list_records(&self.db, video_id)
    }

    pub fn delete(&self, video_id: &str, target_language: &str) -> CoreResult<bool> {
        store::delete_record(&self.db, video_id, target_language)
    }

    fn completed(&self, video_id: &str, target_language: &str) -> CoreResult<TranslationRecord> {
        store::load_completed_record(&self.db, video_id, target_language)?.ok_or_else(|| {
            CoreError::TranslationNotFound {
                video_id: video_id.to_string(),
                language: target_language.to_string(),
            }
        })
    }

    /// Applies manual corrections; quality becomes at least `reviewed`.
    ///
    /// Every edit is validated first; one bad edit rejects them all.
    pub fn manual_override(
        &self,
        video_id: &str,
        target_language: &str,
        edits: &[SegmentEdit],
    ) -> CoreResult<TranslationRecord> {
        let mut record = self.completed(video_id, target_language)?;

        let mut errors = FieldErrors::new();
        if edits.is_empty() {
            errors.insert("segments", "at least one edit is required");
        }
        for (i, edit) in edits.iter().enumerate() {
            if edit.index >= record.segments.len() {
                errors.insert(
                    format!("segments[{i}].index"),
                    format!("out of range (0-{})", record.segments.len().saturating_sub(1)),
                );
            } else if edit.translated_text.trim().is_empty() {
                errors.insert(format!("segments[{i}].translatedText"), "must not be empty");
            }
        }
        errors.into_result()?;

        for edit in edits {
            let segment = &mut record.segments[edit.index];
            segment.translated_text = edit.translated_text.trim().to_string();
            segment.confidence = 1.0;
        }
        record.refresh_counts();
        record.quality_score = mean_quality(
            record
                .segments
                .iter()
                .map(|s| (s.original_text.as_str(), s.translated_text.as_str())),
        );
        record.promote(QualityTier::Reviewed);
        record.updated_at = now_rfc3339();

        tracing::info!(video_id, target = target_language, edits = edits.len(), "Translation edited");
        store::save_record(&self.db, &record)
    }

    /// Raises the quality tier of a completed translation
    pub fn promote_quality(
        &self,
        video_id: &str,
        target_language: &str,
        tier: QualityTier,
    ) -> CoreResult<TranslationRecord> {
        let mut record = self.completed(video_id, target_language)?;
        record.promote(tier);
        record.updated_at = now_rfc3339();
        store::save_record(&self.db, &record)
    }

    /// Renders a completed translation as an SRT or VTT sidecar
    pub fn export(
        &self,
        video_id: &str,
        target_language: &str,
        format: SubtitleFormat,
    ) -> CoreResult<SubtitleDocument> {
        if format == SubtitleFormat::Ass {
            return Err(CoreError::field("format", "export supports srt or vtt"));
        }
        let record = self.completed(video_id, target_language)?;

        let mut cues: Vec<Cue> = record
            .segments
            .iter()
            .filter(|s| !s.translated_text.trim().is_empty())
            .map(|s| Cue::new(s.start_time, s.end_time, s.translated_text.trim()))
            .collect();
        for i in 1..cues.len() {
            let next_start = cues[i].start_sec;
            if cues[i - 1].end_sec > next_start {
                cues[i - 1].end_sec = next_start;
            }
        }
        cues.retain(|c| c.end_sec > c.start_sec);

        if cues.is_empty() {
            return Err(CoreError::SubtitleGeneration(
                "Translation contains no text to export".to_string(),
            ));
        }

        SubtitleRenderer::new().encode(cues, &StyleSettings::default(), &RenderOptions::new(format))
    }
}

/// A record saved as processing. Unless [`finish`](Self::finish) is
/// called, dropping it marks the record failed, which covers cancelled,
/// timed-out and aborted translations.
struct InFlightRecord<'a> {
    db: &'a Database,
    record: Option<TranslationRecord>,
}

impl<'a> InFlightRecord<'a> {
    fn new(db: &'a Database, record: &TranslationRecord) -> Self {
        Self {
            db,
            record: Some(record.clone()),
        }
    }

    fn finish(mut self) {
        self.record = None;
    }

    fn fail(mut self, message: String) {
        if let Some(record) = self.record.take() {
            mark_failed(self.db, record, message);
        }
    }
}

impl Drop for InFlightRecord<'_> {
    fn drop(&mut self) {
        if let Some(record) = self.record.take() {
            tracing::warn!(
                video_id = %record.video_id,
                target = %record.target_language,
                "Translation interrupted"
            );
            mark_failed(self.db, record, "Translation was interrupted".to_string());
        }
    }
}

fn mark_failed(db: &Database, mut record: TranslationRecord, message: String) {
    record.status = TranslationStatus::Failed;
    record.error = Some(message);
    record.updated_at = now_rfc3339();
    if let Err(e) = store::save_record(db, &record) {
        tracing::warn!(video_id = %record.video_id, error = %e, "Failed to mark translation failed");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::Video;
    use crate::core::transcripts::{save_transcript, TranscriptSegment};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Upper-cases text and prefixes the target language
    #[derive(Default)]
    struct FakeProvider {
        calls: AtomicUsize,
        batch_sizes: Mutex<Vec<usize>>,
        /// Calls that fail transiently before succeeding
        transient_failures: usize,
        quota_exceeded: bool,
        /// Every call fails while set
        failing: AtomicBool,
        /// Calls never return
        hangs: bool,
    }

    #[async_trait]
    impl TranslationProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn translate(
            &self,
            texts: &[String],
            _source_language: &str,
            target_language: &str,
        ) -> CoreResult<Vec<TranslatedText>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hangs {
                std::future::pending::<()>().await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(CoreError::TranslationApi("service unavailable".into()));
            }
            if self.quota_exceeded {
                return Err(CoreError::TranslationQuotaExceeded {
                    used: 0,
                    requested: 1,
                    quota: 0,
                });
            }
            if call < self.transient_failures {
                return Err(CoreError::TranslationApi("503".into()));
            }
            self.batch_sizes.lock().unwrap().push(texts.len());
            Ok(texts
                .iter()
                .map(|t| TranslatedText {
                    text: format!("[{target_language}] {}", t.to_uppercase()),
                    confidence: Some(0.9),
                })
                .collect())
        }

        async fn detect(&self, _text: &str) -> CoreResult<Option<DetectedLanguage>> {
            Err(CoreError::TranslationApi("offline".into()))
        }
    }

    fn setup(provider: FakeProvider, segments: usize, quota: Option<u64>) -> (TranslationCoordinator, Arc<FakeProvider>) {
        let db = Database::in_memory().unwrap();
        db.upsert_video(&Video::new("vid1", "Demo").with_language("en")).unwrap();
        let segments = (0..segments)
            .map(|i| {
                let start = i as f64 * 2.0;
                TranscriptSegment::new(start, start + 1.5, &format!("segment number {i}"))
            })
            .collect();
        save_transcript(&db, &Transcript::new("vid1", "en", segments)).unwrap();

        let provider = Arc::new(provider);
        let settings = TranslationSettings {
            retry_base_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let coordinator = TranslationCoordinator::new(
            db.clone(),
            Arc::new(db.clone()),
            provider.clone(),
            QuotaTracker::new(db, quota),
            settings,
        );
        (coordinator, provider)
    }

    #[tokio::test]
    async fn test_translate_preserves_segment_times() {
        let (coordinator, _) = setup(FakeProvider::default(), 5, None);

        let record = coordinator.translate("vid1", None, "es").await.unwrap();

        assert_eq!(record.segments.len(), 5);
        assert_eq!(record.status, TranslationStatus::Completed);
        assert_eq!(record.quality, QualityTier::Machine);
        assert_eq!(record.source_language, "en");
        for (i, segment) in record.segments.iter().enumerate() {
            let start = i as f64 * 2.0;
            assert_eq!(segment.start_time, start);
            assert_eq!(segment.end_time, start + 1.5);
            assert_eq!(segment.original_text, format!("segment number {i}"));
            assert_eq!(segment.translated_text, format!("[es] SEGMENT NUMBER {i}"));
        }
        assert!(record.quality_score.is_some());
        assert_eq!(coordinator.get("vid1", "es").unwrap(), record);
    }

    #[tokio::test]
    async fn test_batches_are_capped_at_one_hundred() {
        let (coordinator, provider) = setup(FakeProvider::default(), 250, None);
        let percents = Mutex::new(Vec::new());

        coordinator
            .translate_with_progress("vid1", None, "fr", &|p| percents.lock().unwrap().push(p))
            .await
            .unwrap();

        assert_eq!(*provider.batch_sizes.lock().unwrap(), vec![100, 100, 50]);
        let percents = percents.lock().unwrap();
        assert_eq!(percents.len(), 3);
        assert_eq!(*percents.last().unwrap(), 100.0);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let provider = FakeProvider {
            transient_failures: 2,
            ..Default::default()
        };
        let (coordinator, provider) = setup(provider, 3, None);

        let record = coordinator.translate("vid1", None, "de").await.unwrap();

        assert_eq!(record.segments.len(), 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_give_up_and_mark_failed() {
        let provider = FakeProvider {
            transient_failures: 100,
            ..Default::default()
        };
        let (coordinator, provider) = setup(provider, 3, Some(10_000));

        let err = coordinator.translate("vid1", None, "de").await.unwrap_err();

        assert!(matches!(err, CoreError::TranslationApi(_)));
        // First attempt plus three retries
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
        let record = coordinator.get("vid1", "de").unwrap();
        assert_eq!(record.status, TranslationStatus::Failed);
        assert!(record.error.is_some());
        // Reserved characters are returned
        assert_eq!(coordinator.quota().usage("default").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_interrupted_translation_is_not_left_processing() {
        let provider = FakeProvider {
            hangs: true,
            ..Default::default()
        };
        let (coordinator, _) = setup(provider, 5, Some(10_000));

        let outcome = tokio::time::timeout(
            Duration::from_millis(100),
            coordinator.translate("vid1", None, "de"),
        )
        .await;

        assert!(outcome.is_err());
        let record = coordinator.get("vid1", "de").unwrap();
        assert_eq!(record.status, TranslationStatus::Failed);
        assert!(record.error.is_some());
        assert_eq!(coordinator.quota().usage("default").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_retranslation_keeps_completed_record() {
        let (coordinator, provider) = setup(FakeProvider::default(), 3, Some(10_000));
        let plan = coordinator.prepare("vid1", None, "es").unwrap();
        let first = coordinator.translate("vid1", None, "es").await.unwrap();

        provider.failing.store(true, Ordering::SeqCst);
        coordinator.translate("vid1", None, "es").await.unwrap_err();

        let record = coordinator.get("vid1", "es").unwrap();
        assert_eq!(record.status, TranslationStatus::Completed);
        assert_eq!(record.segments, first.segments);
        assert!(record.error.is_none());
        assert!(coordinator.export("vid1", "es", SubtitleFormat::Srt).is_ok());
        // Only the successful run is charged
        assert_eq!(
            coordinator.quota().usage("default").unwrap(),
            plan.character_count
        );

        provider.failing.store(false, Ordering::SeqCst);
        let again = coordinator.translate("vid1", None, "es").await.unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.status, TranslationStatus::Completed);
    }

    #[tokio::test]
    async fn test_quota_errors_are_not_retried() {
        let provider = FakeProvider {
            quota_exceeded: true,
            ..Default::default()
        };
        let (coordinator, provider) = setup(provider, 3, None);

        let err = coordinator.translate("vid1", None, "it").await.unwrap_err();

        assert!(matches!(err, CoreError::TranslationQuotaExceeded { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_account_quota_checked_before_submission() {
        let (coordinator, provider) = setup(FakeProvider::default(), 5, Some(20));

        let err = coordinator.prepare("vid1", None, "es").unwrap_err();
        assert!(matches!(err, CoreError::TranslationQuotaExceeded { quota: 20, .. }));

        let err = coordinator.translate("vid1", None, "es").await.unwrap_err();
        assert!(matches!(err, CoreError::TranslationQuotaExceeded { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_usage_is_recorded() {
        let (coordinator, _) = setup(FakeProvider::default(), 2, Some(1000));
        let plan = coordinator.prepare("vid1", None, "es").unwrap();

        coordinator.translate("vid1", None, "es").await.unwrap();

        assert_eq!(
            coordinator.quota().usage("default").unwrap(),
            plan.character_count
        );
    }

    #[test]
    fn test_prepare_validation() {
        let (coordinator, _) = setup(FakeProvider::default(), 1, None);

        let err = coordinator.prepare("vid1", None, "english").unwrap_err();
        assert!(err.field_errors().unwrap().contains("target_language"));

        let err = coordinator.prepare("vid1", None, "en").unwrap_err();
        assert!(err.field_errors().unwrap().contains("target_language"));

        let err = coordinator.prepare("vid1", Some("ja"), "es").unwrap_err();
        assert!(matches!(err, CoreError::MissingTranscript { .. }));

        assert!(matches!(
            coordinator.prepare("nope", None, "es").unwrap_err(),
            CoreError::VideoNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_translate_batch_keeps_order() {
        let (coordinator, _) = setup(FakeProvider::default(), 1, None);
        let texts = vec!["one".to_string(), "two".to_string()];

        let out = coordinator.translate_batch(&texts, "en", "es").await.unwrap();

        assert_eq!(out[0].text, "[es] ONE");
        assert_eq!(out[1].text, "[es] TWO");
        assert!(coordinator.translate_batch(&[], "en", "es").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_detect_language_falls_back_offline() {
        let (coordinator, _) = setup(FakeProvider::default(), 1, None);

        let detected = coordinator
            .detect_language("El perro está en la casa con los niños")
            .await
            .unwrap();
        assert_eq!(detected.language, "es");

        let unknown = coordinator.detect_language("1234").await.unwrap();
        assert_eq!(unknown.language, "und");

        assert!(coordinator.detect_language("  ").await.is_err());
    }

    #[test]
    fn test_estimate_cost() {
        let (coordinator, _) = setup(FakeProvider::default(), 1, None);
        assert_eq!(coordinator.estimate_cost(0), 0.0);
        assert_eq!(coordinator.estimate_cost(1_000_000), 20.0);
        assert_eq!(coordinator.estimate_cost(50_000), 1.0);
    }

    #[tokio::test]
    async fn test_manual_override_promotes_to_reviewed() {
        let (coordinator, _) = setup(FakeProvider::default(), 3, None);
        coordinator.translate("vid1", None, "es").await.unwrap();

        let edits = vec![SegmentEdit {
            index: 1,
            translated_text: "  segmento número 1 ".into(),
        }];
        let record = coordinator.manual_override("vid1", "es", &edits).unwrap();

        assert_eq!(record.quality, QualityTier::Reviewed);
        assert_eq!(record.segments[1].translated_text, "segmento número 1");
        assert_eq!(record.segments[1].start_time, 2.0);
        assert_eq!(record.segments[0].translated_text, "[es] SEGMENT NUMBER 0");

        // Professional stays professional after further edits
        coordinator
            .promote_quality("vid1", "es", QualityTier::Professional)
            .unwrap();
        let record = coordinator.manual_override("vid1", "es", &edits).unwrap();
        assert_eq!(record.quality, QualityTier::Professional);
    }

    #[tokio::test]
    async fn test_manual_override_rejects_bad_edits_wholesale() {
        let (coordinator, _) = setup(FakeProvider::default(), 2, None);
        coordinator.translate("vid1", None, "es").await.unwrap();

        let edits = vec![
            SegmentEdit {
                index: 0,
                translated_text: "hola".into(),
            },
            SegmentEdit {
                index: 5,
                translated_text: "fuera".into(),
            },
        ];
        let err = coordinator.manual_override("vid1", "es", &edits).unwrap_err();
        assert!(err.field_errors().unwrap().contains("segments[1].index"));

        let record = coordinator.get("vid1", "es").unwrap();
        assert_eq!(record.segments[0].translated_text, "[es] SEGMENT NUMBER 0");
        assert_eq!(record.quality, QualityTier::Machine);

        assert!(matches!(
            coordinator.manual_override("vid1", "de", &edits[..1]).unwrap_err(),
            CoreError::TranslationNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_export_srt_and_vtt() {
        let (coordinator, _) = setup(FakeProvider::default(), 2, None);
        coordinator.translate("vid1", None, "es").await.unwrap();

        let srt = coordinator.export("vid1", "es", SubtitleFormat::Srt).unwrap();
        assert!(srt
            .content
            .starts_with("1\n00:00:00,000 --> 00:00:01,500\n[es] SEGMENT NUMBER 0\n\n"));

        let vtt = coordinator.export("vid1", "es", SubtitleFormat::Vtt).unwrap();
        assert!(vtt.content.starts_with("WEBVTT"));
        assert_eq!(vtt.file_name("vid1_es"), "vid1_es.vtt");

        assert!(coordinator.export("vid1", "es", SubtitleFormat::Ass).is_err());
    }
}

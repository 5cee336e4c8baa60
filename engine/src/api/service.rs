//! Service Facade
//!
//! The request/response surface over the engine components. Validation
//! happens here, synchronously, before anything is queued; background work
//! goes through the worker pool and reports to the progress store.

use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::dto::{
    BurnJobResponse, CreatePresetRequest, ExportResponse, ProgressResponse,
    SubtitledVersionResponse, TranslateRequest, TranslateResponse,
};
use crate::core::burn::{BurnJobRequest, BurnOptions, BurnOrchestrator};
use crate::core::captions::{RenderOptions, SubtitleDocument, SubtitleRenderer};
use crate::core::db::{Database, DbStats, Video};
use crate::core::ffmpeg::{BurnRequest, FFmpegProgress, FFmpegRunner, MediaInfo, Transcoder};
use crate::core::jobs::{
    burn_progress_key, translation_progress_key, Job, JobFuture, JobStage, JobState, JobTask,
    JobType, Priority, ProgressStore, SqliteProgressStore, WorkerPool,
};
use crate::core::presets::{Preset, PresetCatalog, PresetFilter};
use crate::core::settings::AppConfig;
use crate::core::storage::{LocalVideoStorage, TranscriptSource, VideoStorage};
use crate::core::styles::{Style, StyleStore};
use crate::core::transcripts::{save_transcript, Transcript, TranscriptSegment};
use crate::core::translation::{
    create_provider, DetectedLanguage, QualityTier, QuotaSummary, QuotaTracker, SegmentEdit,
    TranslationCoordinator, TranslationProvider, TranslationRecord,
};
use crate::core::{
    is_valid_language_code, CoreError, CoreResult, FieldErrors, JobId, SubtitleFormat,
};

/// Share of a translation job spent calling the provider
const TRANSLATING_SHARE: f32 = 90.0;

/// External collaborators the service is wired to
pub struct Collaborators {
    pub storage: Arc<dyn VideoStorage>,
    pub transcoder: Arc<dyn Transcoder>,
    pub provider: Arc<dyn TranslationProvider>,
    pub progress: Arc<dyn ProgressStore>,
}

pub struct SubburnService {
    db: Database,
    styles: StyleStore,
    storage: Arc<dyn VideoStorage>,
    transcoder: Arc<dyn Transcoder>,
    progress: Arc<dyn ProgressStore>,
    burns: Arc<BurnOrchestrator>,
    translations: Arc<TranslationCoordinator>,
    pool: WorkerPool,
    renderer: SubtitleRenderer,
}

impl SubburnService {
    pub fn new(db: Database, collaborators: Collaborators, config: &AppConfig) -> CoreResult<Self> {
        let Collaborators {
            storage,
            transcoder,
            provider,
            progress,
        } = collaborators;

        let styles = StyleStore::new(db.clone(), PresetCatalog::new(db.clone())?);
        let transcripts: Arc<dyn TranscriptSource> = Arc::new(db.clone());

        let burns = BurnOrchestrator::new(
            db.clone(),
            styles.clone(),
            Arc::clone(&transcripts),
            Arc::clone(&storage),
            Arc::clone(&transcoder),
            Arc::clone(&progress),
            BurnOptions {
                encode_retries: config.transcoder.encode_retries,
                temp_dir: config.storage.temp_dir.clone(),
                ..BurnOptions::default()
            },
        );

        let translations = TranslationCoordinator::new(
            db.clone(),
            transcripts,
            provider,
            QuotaTracker::new(db.clone(), config.translation.monthly_quota),
            config.translation.coordinator_settings(),
        );

        let pool = WorkerPool::new(config.jobs.worker_pool_config(), Arc::clone(&progress));

        Ok(Self {
            db,
            styles,
            storage,
            transcoder,
            progress,
            burns: Arc::new(burns),
            translations: Arc::new(translations),
            pool,
            renderer: SubtitleRenderer::new(),
        })
    }

    /// Opens the on-disk database, local media storage, system ffmpeg and
    /// the configured translation provider
    pub fn open(config: &AppConfig, data_dir: &Path) -> CoreResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db = Database::open(config.storage.database_path(data_dir))?;

        let transcoder: Arc<dyn Transcoder> = match FFmpegRunner::detect(
            config.transcoder.ffmpeg_path.as_deref(),
            config.transcoder.ffprobe_path.as_deref(),
            config.transcoder.encode_settings(),
        ) {
            Ok(runner) => Arc::new(runner),
            Err(e) => {
                tracing::warn!(error = %e, "FFmpeg unavailable; burns will fail until it is installed");
                Arc::new(MissingTranscoder {
                    reason: e.to_string(),
                })
            }
        };

        let collaborators = Collaborators {
            storage: Arc::new(LocalVideoStorage::new(config.storage.media_root(data_dir))),
            transcoder,
            provider: create_provider(&config.translation.provider_config())?,
            progress: Arc::new(SqliteProgressStore::new(db.clone())),
        };
        Self::new(db, collaborators, config)
    }

    /// Spawns the pool workers
    pub fn start_workers(&self) -> Vec<tokio::task::JoinHandle<()>> {
        self.pool.start()
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    // =========================================================================
    // Videos and transcripts
    // =========================================================================

    /// Stores a transcript, registering the video on first sight
    pub fn import_transcript(
        &self,
        video_id: &str,
        language: &str,
        title: Option<&str>,
        segments: Vec<TranscriptSegment>,
    ) -> CoreResult<Transcript> {
        if !is_valid_language_code(language) {
            return Err(CoreError::field(
                "language",
                "must be a language code such as 'en' or 'pt-BR'",
            ));
        }
        if segments.is_empty() {
            return Err(CoreError::field("segments", "must contain at least one segment"));
        }

        let mut video = self
            .db
            .get_video(video_id)?
            .unwrap_or_else(|| Video::new(video_id, title.unwrap_or(video_id)));
        if let Some(title) = title {
            video.title = title.to_string();
        }
        if video.source_language.is_none() {
            video.source_language = Some(language.to_string());
        }
        self.db.upsert_video(&video)?;

        let transcript = Transcript::new(video_id, language, segments);
        save_transcript(&self.db, &transcript)?;
        tracing::info!(
            video_id,
            language,
            segments = transcript.segments.len(),
            "Imported transcript"
        );
        Ok(transcript)
    }

    /// Probes the stored source and records its resolution and duration
    pub async fn refresh_media_info(&self, video_id: &str) -> CoreResult<Video> {
        let mut video = self.db.require_video(video_id)?;
        let source = self.storage.source_path(video_id).await?;
        let info = self.transcoder.probe(&source).await?;

        if let Some(stream) = &info.video {
            video.width = Some(stream.width);
            video.height = Some(stream.height);
        }
        if info.duration_sec > 0.0 {
            video.duration_sec = Some(info.duration_sec);
        }
        self.db.upsert_video(&video)?;
        Ok(video)
    }

    /// Removes a video with its transcripts, styles and translations
    pub fn delete_video(&self, video_id: &str) -> CoreResult<bool> {
        self.db.delete_video(video_id)
    }

    pub fn stats(&self) -> CoreResult<DbStats> {
        self.db.get_stats()
    }

    // =========================================================================
    // Styles
    // =========================================================================

    pub fn list_styles(&self, video_id: &str) -> CoreResult<Vec<Style>> {
        self.db.require_video(video_id)?;
        self.styles.list_for_video(video_id)
    }

    /// The style for (video, language), created with defaults on first read
    pub fn get_style(&self, video_id: &str, language: &str) -> CoreResult<Style> {
        self.db.require_video(video_id)?;
        self.styles.get_or_create_default(video_id, language, None)
    }

    pub fn create_style(
        &self,
        video_id: &str,
        language: &str,
        fields: &Map<String, Value>,
        created_by: Option<&str>,
    ) -> CoreResult<Style> {
        self.db.require_video(video_id)?;
        self.styles.create(video_id, language, fields, created_by)
    }

    /// Partial update; every field is validated before anything is written
    pub fn update_style(
        &self,
        video_id: &str,
        language: &str,
        fields: &Map<String, Value>,
    ) -> CoreResult<Style> {
        let style = self.get_style(video_id, language)?;
        self.styles.update(&style.id, fields)
    }

    pub fn delete_style(&self, video_id: &str, language: &str) -> CoreResult<()> {
        let style = self
            .styles
            .find(video_id, language)?
            .ok_or_else(|| CoreError::StyleNotFound(format!("{video_id}:{language}")))?;
        self.styles.delete(&style.id)
    }

    pub fn clone_style(
        &self,
        video_id: &str,
        language: &str,
        target_video_id: &str,
        target_language: Option<&str>,
    ) -> CoreResult<Style> {
        self.db.require_video(target_video_id)?;
        let source = self.get_style(video_id, language)?;
        self.styles
            .clone_style(&source.id, target_video_id, target_language)
    }

    pub fn apply_preset(
        &self,
        video_id: &str,
        language: &str,
        preset_name: &str,
        applied_by: Option<&str>,
    ) -> CoreResult<Style> {
        self.db.require_video(video_id)?;
        self.styles
            .apply_preset(video_id, language, preset_name, applied_by)
    }

    /// Field errors for a candidate update, without storing anything
    pub fn validate_style(&self, fields: &Map<String, Value>) -> FieldErrors {
        self.styles.validate(fields)
    }

    // =========================================================================
    // Presets
    // =========================================================================

    pub fn list_presets(&self, filter: &PresetFilter) -> CoreResult<Vec<Preset>> {
        self.styles.presets().list(filter)
    }

    pub fn create_preset(&self, request: &CreatePresetRequest) -> CoreResult<Preset> {
        self.styles.export_as_preset(
            &request.style_id,
            &request.name,
            &request.description,
            request.platform,
        )
    }

    /// Deletes by id or name; system presets are rejected
    pub fn delete_preset(&self, id_or_name: &str) -> CoreResult<()> {
        let preset = match self.styles.presets().get(id_or_name) {
            Ok(preset) => preset,
            Err(CoreError::PresetNotFound(_)) => self.styles.presets().get_by_name(id_or_name)?,
            Err(e) => return Err(e),
        };
        self.styles.presets().delete(&preset.id)
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Renders the subtitle file a burn would use, without encoding
    pub fn render_subtitles(
        &self,
        video_id: &str,
        language: &str,
        format: SubtitleFormat,
    ) -> CoreResult<SubtitleDocument> {
        let plan = self.burns.plan(&BurnJobRequest::new(video_id, language))?;
        let (width, height) = plan
            .video
            .width
            .zip(plan.video.height)
            .unwrap_or((1920, 1080));
        let mut options = RenderOptions::new(format).with_resolution(width, height);
        options.title = Some(plan.video.title.clone());
        self.renderer
            .render(&plan.source.segments(), &plan.settings, &options)
    }

    // =========================================================================
    // Burn
    // =========================================================================

    /// Validates and queues a burn
    pub fn submit_burn(&self, request: &BurnJobRequest) -> CoreResult<BurnJobResponse> {
        let plan = self.burns.plan(request)?;
        let estimated_seconds = plan.estimated_seconds;

        let job = Job::new(JobType::Burn, burn_progress_key(&request.video_id))
            .with_priority(Priority::UserRequest);
        let job_id = job.id.clone();

        let burns = Arc::clone(&self.burns);
        let id = job_id.clone();
        let preset_id = plan.preset_id.clone();
        let task: JobTask = Box::new(move |token: CancellationToken| -> JobFuture {
            Box::pin(async move {
                let version = burns.run(plan, Some(id), &token).await?;
                Ok(serde_json::to_value(version)?)
            })
        });

        self.pool.submit(job, task)?;
        self.burns.record_preset_use(preset_id.as_deref());
        tracing::info!(
            job_id = %job_id,
            video_id = %request.video_id,
            language = %request.language,
            "Burn queued"
        );
        Ok(BurnJobResponse {
            job_id,
            estimated_seconds,
        })
    }

    pub fn burn_progress(&self, video_id: &str) -> CoreResult<Option<ProgressResponse>> {
        Ok(self
            .progress
            .get(&burn_progress_key(video_id))?
            .map(ProgressResponse::from))
    }

    pub async fn subtitled_versions(&self, video_id: &str) -> CoreResult<Vec<SubtitledVersionResponse>> {
        let versions = self.burns.list_subtitled_versions(video_id).await?;
        Ok(versions.into_iter().map(Into::into).collect())
    }

    /// Cancels a queued or not-yet-encoding job
    pub fn cancel_job(&self, job_id: &str) -> CoreResult<bool> {
        self.pool.cancel(job_id)
    }

    // =========================================================================
    // Translation
    // =========================================================================

    pub fn list_translations(&self, video_id: &str) -> CoreResult<Vec<TranslationRecord>> {
        self.db.require_video(video_id)?;
        self.translations.list(video_id)
    }

    pub fn get_translation(&self, video_id: &str, language: &str) -> CoreResult<TranslationRecord> {
        self.translations.get(video_id, language)
    }

    pub fn delete_translation(&self, video_id: &str, language: &str) -> CoreResult<bool> {
        self.translations.delete(video_id, language)
    }

    /// Marks a completed translation as reviewed or professional; never lowers it
    pub fn promote_translation(
        &self,
        video_id: &str,
        language: &str,
        tier: QualityTier,
    ) -> CoreResult<TranslationRecord> {
        self.translations.promote_quality(video_id, language, tier)
    }

    pub async fn detect_language(&self, text: &str) -> CoreResult<DetectedLanguage> {
        self.translations.detect_language(text).await
    }

    /// Validates every target, then queues one job per language.
    ///
    /// Nothing is queued when any target fails validation or the combined
    /// request would exceed the monthly quota.
    pub fn submit_translations(&self, request: &TranslateRequest) -> CoreResult<TranslateResponse> {
        let mut targets: Vec<&str> = Vec::new();
        for language in &request.target_languages {
            if !targets.contains(&language.as_str()) {
                targets.push(language);
            }
        }
        if targets.is_empty() {
            return Err(CoreError::field("target_languages", "must name at least one language"));
        }

        let mut plans = Vec::with_capacity(targets.len());
        let mut errors = FieldErrors::new();
        for (i, target) in targets.iter().enumerate() {
            match self
                .translations
                .prepare(&request.video_id, request.source_language.as_deref(), target)
            {
                Ok(plan) => plans.push(plan),
                Err(CoreError::Validation(field_errors)) => {
                    for field in field_errors.fields() {
                        let reason = field_errors.get(field).unwrap_or_default();
                        errors.insert(format!("target_languages[{i}].{field}"), reason);
                    }
                }
                Err(e) => return Err(e),
            }
        }
        errors.into_result()?;

        let total_characters: u64 = plans.iter().map(|p| p.character_count).sum();
        self.translations
            .quota()
            .check(&self.translations.settings().account_id, total_characters)?;
        let estimated_cost = self.translations.estimate_cost(total_characters);

        let mut job_ids = Vec::with_capacity(plans.len());
        for plan in plans {
            job_ids.push(self.queue_translation(
                plan.video_id,
                plan.source_language,
                plan.target_language,
            )?);
        }

        Ok(TranslateResponse {
            job_ids,
            estimated_cost,
        })
    }

    fn queue_translation(
        &self,
        video_id: String,
        source_language: String,
        target_language: String,
    ) -> CoreResult<JobId> {
        let key = translation_progress_key(&video_id, &target_language);
        let job = Job::new(JobType::Translation, key.clone()).with_priority(Priority::UserRequest);
        let job_id = job.id.clone();

        let coordinator = Arc::clone(&self.translations);
        let progress = Arc::clone(&self.progress);
        let id = job_id.clone();
        let task: JobTask = Box::new(move |token: CancellationToken| -> JobFuture {
            Box::pin(async move {
                if token.is_cancelled() {
                    return Err(CoreError::Cancelled);
                }
                let report = |percent: f32| {
                    let state = JobState::new(
                        Some(id.clone()),
                        JobStage::Translating,
                        percent / 100.0 * TRANSLATING_SHARE,
                    );
                    if let Err(e) = progress.put(&key, &state) {
                        tracing::debug!(error = %e, "Failed to write translation progress");
                    }
                };
                report(0.0);

                // Dropping the translation on cancel returns its unsent
                // characters and fails its record
                let translation = coordinator.translate_with_progress(
                    &video_id,
                    Some(&source_language),
                    &target_language,
                    &report,
                );
                let record = tokio::select! {
                    _ = token.cancelled() => return Err(CoreError::Cancelled),
                    result = translation => result?,
                };

                let saving = JobState::new(Some(id.clone()), JobStage::Saving, TRANSLATING_SHARE);
                if let Err(e) = progress.put(&key, &saving) {
                    tracing::debug!(error = %e, "Failed to write translation progress");
                }
                Ok(serde_json::json!({
                    "translationId": record.id,
                    "targetLanguage": record.target_language,
                    "segments": record.segments.len(),
                    "qualityScore": record.quality_score,
                }))
            })
        });

        self.pool.submit(job, task)?;
        tracing::info!(job_id = %job_id, "Translation queued");
        Ok(job_id)
    }

    pub fn translation_progress(
        &self,
        video_id: &str,
        language: &str,
    ) -> CoreResult<Option<ProgressResponse>> {
        Ok(self
            .progress
            .get(&translation_progress_key(video_id, language))?
            .map(ProgressResponse::from))
    }

    /// Manual correction of translated segments
    pub fn update_translation_segments(
        &self,
        video_id: &str,
        language: &str,
        edits: &[SegmentEdit],
    ) -> CoreResult<TranslationRecord> {
        self.translations.manual_override(video_id, language, edits)
    }

    /// Exports a completed translation as SRT or VTT and stores the file
    pub async fn export_translation(
        &self,
        video_id: &str,
        language: &str,
        format: SubtitleFormat,
    ) -> CoreResult<ExportResponse> {
        let document = self.translations.export(video_id, language, format)?;
        let file_name = document.file_name(&format!("{video_id}_{language}"));
        let download_url = self
            .storage
            .store_export(video_id, &file_name, document.as_bytes())
            .await?;
        Ok(ExportResponse { download_url })
    }

    pub fn translation_quota(&self) -> CoreResult<QuotaSummary> {
        self.translations
            .quota()
            .summary(&self.translations.settings().account_id)
    }
}

/// Stand-in used when no ffmpeg could be found at startup
struct MissingTranscoder {
    reason: String,
}

#[async_trait::async_trait]
impl Transcoder for MissingTranscoder {
    async fn probe(&self, _input: &Path) -> CoreResult<MediaInfo> {
        Err(CoreError::Internal(self.reason.clone()))
    }

    async fn burn_subtitles(
        &self,
        _request: &BurnRequest,
        _progress_tx: Option<tokio::sync::mpsc::Sender<FFmpegProgress>>,
    ) -> CoreResult<()> {
        Err(CoreError::Internal(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::translation::TranslatedText;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    struct CopyTranscoder;

    #[async_trait]
    impl Transcoder for CopyTranscoder {
        async fn probe(&self, _input: &Path) -> CoreResult<MediaInfo> {
            Err(CoreError::EncodeFailure("not a real video".into()))
        }

        async fn burn_subtitles(
            &self,
            request: &BurnRequest,
            _progress_tx: Option<tokio::sync::mpsc::Sender<FFmpegProgress>>,
        ) -> CoreResult<()> {
            tokio::fs::copy(&request.input, &request.output).await?;
            Ok(())
        }
    }

    /// Upper-cases text and tags it with the target language
    struct ShoutingProvider;

    #[async_trait]
    impl TranslationProvider for ShoutingProvider {
        fn name(&self) -> &str {
            "shouting"
        }

        async fn translate(
            &self,
            texts: &[String],
            _source: &str,
            target: &str,
        ) -> CoreResult<Vec<TranslatedText>> {
            Ok(texts
                .iter()
                .map(|t| TranslatedText {
                    text: format!("[{target}] {}", t.to_uppercase()),
                    confidence: Some(0.9),
                })
                .collect())
        }

        async fn detect(&self, _text: &str) -> CoreResult<Option<DetectedLanguage>> {
            Ok(None)
        }
    }

    struct Fixture {
        _dir: TempDir,
        service: SubburnService,
    }

    async fn fixture(config: AppConfig) -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = Database::in_memory().unwrap();
        let storage = LocalVideoStorage::new(dir.path().join("media"));
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"video-bytes").unwrap();
        storage.import_source("vid1", &source).await.unwrap();

        let service = SubburnService::new(
            db.clone(),
            Collaborators {
                storage: Arc::new(storage),
                transcoder: Arc::new(CopyTranscoder),
                provider: Arc::new(ShoutingProvider),
                progress: Arc::new(SqliteProgressStore::new(db)),
            },
            &config,
        )
        .unwrap();

        let segments = vec![
            TranscriptSegment::new(0.0, 2.0, "hello there"),
            TranscriptSegment::new(2.5, 4.0, "general kenobi"),
        ];
        service
            .import_transcript("vid1", "en", Some("Demo"), segments)
            .unwrap();

        Fixture { _dir: dir, service }
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.jobs.workers = 2;
        config
    }

    async fn wait_terminal(poll: impl Fn() -> Option<ProgressResponse>) -> ProgressResponse {
        for _ in 0..200 {
            if let Some(state) = poll() {
                if state.stage.is_terminal() {
                    return state;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job did not finish");
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_style_lifecycle() {
        let f = fixture(config()).await;
        let s = &f.service;

        let style = s.get_style("vid1", "en").unwrap();
        assert_eq!(style.settings.font_size, 24);

        let updated = s
            .update_style("vid1", "en", &fields(json!({"font_size": 36})))
            .unwrap();
        assert_eq!(updated.id, style.id);
        assert_eq!(updated.settings.font_size, 36);

        let err = s
            .update_style("vid1", "en", &fields(json!({"font_size": 500, "font_color": "red"})))
            .unwrap_err();
        let errors = err.field_errors().unwrap();
        assert!(errors.contains("font_size"));
        assert!(errors.contains("font_color"));
        assert_eq!(s.get_style("vid1", "en").unwrap().settings.font_size, 36);

        let applied = s.apply_preset("vid1", "en", "TikTok Viral", None).unwrap();
        assert_eq!(applied.settings.font_size, 48);
        assert_eq!(applied.preset_name.as_deref(), Some("TikTok Viral"));

        let cloned = s.clone_style("vid1", "en", "vid1", Some("es")).unwrap();
        assert_eq!(cloned.settings, applied.settings);

        s.delete_style("vid1", "es").unwrap();
        assert!(matches!(
            s.delete_style("vid1", "es"),
            Err(CoreError::StyleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_presets_from_style() {
        let f = fixture(config()).await;
        let s = &f.service;
        let style = s.get_style("vid1", "en").unwrap();

        let preset = s
            .create_preset(&CreatePresetRequest {
                style_id: style.id,
                name: "House Style".into(),
                description: String::new(),
                platform: Default::default(),
            })
            .unwrap();
        assert!(!preset.is_system);

        s.delete_preset("House Style").unwrap();
        assert!(matches!(
            s.delete_preset("Classic"),
            Err(CoreError::PresetImmutable(_))
        ));
    }

    #[tokio::test]
    async fn test_render_subtitles() {
        let f = fixture(config()).await;
        let srt = f
            .service
            .render_subtitles("vid1", "en", SubtitleFormat::Srt)
            .unwrap();
        assert!(srt.content.starts_with("1\n00:00:00,000 --> 00:00:02,000\nhello there\n\n"));
    }

    #[tokio::test]
    async fn test_burn_job_end_to_end() {
        let f = fixture(config()).await;
        let s = &f.service;
        s.start_workers();

        let response = s.submit_burn(&BurnJobRequest::new("vid1", "en")).unwrap();
        assert!(response.estimated_seconds > 0);

        let state = wait_terminal(|| s.burn_progress("vid1").unwrap()).await;
        assert_eq!(state.stage, JobStage::Completed);
        assert_eq!(state.job_id.as_deref(), Some(response.job_id.as_str()));
        assert_eq!(state.percent, 100.0);

        let versions = s.subtitled_versions("vid1").await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].language, "en");
        assert_eq!(versions[0].size, 11);
        s.shutdown();
    }

    #[tokio::test]
    async fn test_burn_rejected_before_queueing() {
        let f = fixture(config()).await;
        let s = &f.service;

        let err = s.submit_burn(&BurnJobRequest::new("vid1", "de")).unwrap_err();
        assert!(matches!(err, CoreError::MissingTranscript { .. }));
        assert!(s.burn_progress("vid1").unwrap().is_none());
        assert!(s.pool().list_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_burn_does_not_count_preset_use() {
        let f = fixture(config()).await;
        let s = &f.service;
        let usage = || {
            s.list_presets(&PresetFilter::default())
                .unwrap()
                .into_iter()
                .find(|p| p.name == "TikTok Viral")
                .unwrap()
                .usage_count
        };
        let before = usage();
        let request = BurnJobRequest::new("vid1", "en")
            .with_style(crate::core::burn::StyleRef::Preset("TikTok Viral".into()));

        // Workers are not started, so the first burn stays queued
        s.submit_burn(&request).unwrap();
        assert_eq!(usage(), before + 1);

        let err = s.submit_burn(&request).unwrap_err();
        assert!(err.field_errors().unwrap().contains("job"));
        assert_eq!(usage(), before + 1);
    }

    #[tokio::test]
    async fn test_translation_jobs_and_export() {
        let f = fixture(config()).await;
        let s = &f.service;
        s.start_workers();

        let response = s
            .submit_translations(&TranslateRequest {
                video_id: "vid1".into(),
                target_languages: vec!["es".into(), "fr".into(), "es".into()],
                source_language: None,
            })
            .unwrap();
        assert_eq!(response.job_ids.len(), 2);
        // 25 characters per language at $20 per million
        assert_eq!(response.estimated_cost, 0.001);

        for language in ["es", "fr"] {
            let state = wait_terminal(|| s.translation_progress("vid1", language).unwrap()).await;
            assert_eq!(state.stage, JobStage::Completed, "{language}: {:?}", state.error);
        }

        let records = s.list_translations("vid1").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].segments[0].translated_text, "[es] HELLO THERE");
        assert_eq!(records[0].segments[1].start_time, 2.5);

        let edited = s
            .update_translation_segments(
                "vid1",
                "es",
                &[SegmentEdit {
                    index: 0,
                    translated_text: "hola".into(),
                }],
            )
            .unwrap();
        assert_eq!(edited.segments[0].translated_text, "hola");

        let export = s
            .export_translation("vid1", "es", SubtitleFormat::Vtt)
            .await
            .unwrap();
        assert!(export.download_url.ends_with("vid1_es.vtt"));

        assert_eq!(s.translation_quota().unwrap().used_characters, 50);

        let promoted = s
            .promote_translation("vid1", "es", QualityTier::Professional)
            .unwrap();
        assert_eq!(promoted.quality, QualityTier::Professional);
        let kept = s.promote_translation("vid1", "es", QualityTier::Reviewed).unwrap();
        assert_eq!(kept.quality, QualityTier::Professional);

        assert!(s.delete_translation("vid1", "fr").unwrap());
        assert!(!s.delete_translation("vid1", "fr").unwrap());
        s.shutdown();
    }

    #[tokio::test]
    async fn test_delete_video_cascades() {
        let f = fixture(config()).await;
        let s = &f.service;
        s.get_style("vid1", "en").unwrap();
        s.get_style("vid1", "es").unwrap();
        assert_eq!(s.list_styles("vid1").unwrap().len(), 2);

        let before = s.stats().unwrap();
        assert_eq!(before.video_count, 1);
        assert_eq!(before.segment_count, 2);

        assert!(s.delete_video("vid1").unwrap());
        let after = s.stats().unwrap();
        assert_eq!(after.video_count, 0);
        assert_eq!(after.segment_count, 0);
        assert_eq!(after.style_count, 0);
        assert_eq!(after.preset_count, before.preset_count);
        assert!(matches!(s.list_styles("vid1"), Err(CoreError::VideoNotFound(_))));
    }

    #[tokio::test]
    async fn test_detect_language_falls_back_offline() {
        let f = fixture(config()).await;
        let detected = f
            .service
            .detect_language("El gato está en la mesa y es feliz")
            .await
            .unwrap();
        assert_eq!(detected.language, "es");
        assert!(f.service.detect_language("   ").await.is_err());
    }

    #[tokio::test]
    async fn test_translation_request_validated_wholesale() {
        let mut config = config();
        config.translation.monthly_quota = Some(30);
        let f = fixture(config).await;
        let s = &f.service;

        let err = s
            .submit_translations(&TranslateRequest {
                video_id: "vid1".into(),
                target_languages: vec!["es".into(), "not a language".into()],
                source_language: None,
            })
            .unwrap_err();
        assert!(err.field_errors().is_some());
        assert!(s.pool().list_jobs().is_empty());

        // 25 characters fit, 50 do not
        let err = s
            .submit_translations(&TranslateRequest {
                video_id: "vid1".into(),
                target_languages: vec!["es".into(), "fr".into()],
                source_language: None,
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::TranslationQuotaExceeded { .. }));
        assert!(s.pool().list_jobs().is_empty());
    }
}

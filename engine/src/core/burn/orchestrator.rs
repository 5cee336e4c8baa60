//! Burn orchestration.
//!
//! `plan` validates synchronously; `run` drives the staged pipeline and
//! reports progress under `burn_progress:{video_id}`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{stage_percent, BurnJobRequest, BurnPlan, StyleRef, SubtitleSource};
use crate::core::captions::{RenderOptions, SubtitleDocument, SubtitleRenderer};
use crate::core::db::Database;
use crate::core::ffmpeg::{BurnRequest, FFmpegProgress, MediaInfo, Transcoder};
use crate::core::jobs::{burn_progress_key, JobStage, JobState, ProgressStore};
use crate::core::storage::{SubtitledVersion, TranscriptSource, VideoStorage};
use crate::core::styles::StyleStore;
use crate::core::translation::store::load_completed_record;
use crate::core::{is_valid_language_code, CoreError, CoreResult, JobId, SubtitleFormat};

/// Orchestrator tuning
#[derive(Clone, Debug, PartialEq)]
pub struct BurnOptions {
    /// Extra encode attempts after a transient failure
    pub encode_retries: u32,
    /// Pause between encode attempts
    pub retry_delay: Duration,
    /// Parent of the per-job scratch directories (system temp when unset)
    pub temp_dir: Option<PathBuf>,
    /// Encode seconds per second of source, for estimates
    pub realtime_factor: f64,
}

impl Default for BurnOptions {
    fn default() -> Self {
        Self {
            encode_retries: 2,
            retry_delay: Duration::from_secs(2),
            temp_dir: None,
            realtime_factor: 0.5,
        }
    }
}

/// Fixed cost of probing, rendering and publishing
const OVERHEAD_SECONDS: f64 = 5.0;

/// Fallback play resolution when neither probe nor catalog knows it
const DEFAULT_RESOLUTION: (u32, u32) = (1920, 1080);

/// Stage and percent reached so far, for failure reporting
struct Checkpoint {
    stage: JobStage,
    percent: f32,
}

pub struct BurnOrchestrator {
    db: Database,
    styles: StyleStore,
    transcripts: Arc<dyn TranscriptSource>,
    storage: Arc<dyn VideoStorage>,
    transcoder: Arc<dyn Transcoder>,
    progress: Arc<dyn ProgressStore>,
    renderer: SubtitleRenderer,
    options: BurnOptions,
}

impl BurnOrchestrator {
    pub fn new(
        db: Database,
        styles: StyleStore,
        transcripts: Arc<dyn TranscriptSource>,
        storage: Arc<dyn VideoStorage>,
        transcoder: Arc<dyn Transcoder>,
        progress: Arc<dyn ProgressStore>,
        options: BurnOptions,
    ) -> Self {
        Self {
            db,
            styles,
            transcripts,
            storage,
            transcoder,
            progress,
            renderer: SubtitleRenderer::new(),
            options,
        }
    }

    pub fn options(&self) -> &BurnOptions {
        &self.options
    }

    // =========================================================================
    // Planning
    // =========================================================================

    /// Validates a request and resolves its style and subtitle text.
    ///
    /// Every failure here happens before a job is queued. Planning has no
    /// side effects; see [`Self::record_preset_use`].
    pub fn plan(&self, request: &BurnJobRequest) -> CoreResult<BurnPlan> {
        if !is_valid_language_code(&request.language) {
            return Err(CoreError::field(
                "language",
                "must be a language code such as 'en' or 'pt-BR'",
            ));
        }
        let video = self.db.require_video(&request.video_id)?;
        let source = self.subtitle_source(&request.video_id, &request.language)?;

        let (settings, style_id, preset_id) = match &request.style {
            StyleRef::Stored => {
                let style =
                    self.styles
                        .get_or_create_default(&request.video_id, &request.language, None)?;
                (style.settings, Some(style.id), None)
            }
            StyleRef::StyleId(id) => {
                let style = self.styles.get(id)?;
                (style.settings, Some(style.id), None)
            }
            StyleRef::Preset(name) => {
                let preset = self.styles.presets().get_by_name(name)?;
                (preset.settings, None, Some(preset.id))
            }
        };

        Ok(BurnPlan {
            request: request.clone(),
            estimated_seconds: self.estimate_seconds(video.duration_sec),
            video,
            settings,
            style_id,
            preset_id,
            source,
        })
    }

    /// Counts a planned preset as applied. Call once the burn is accepted.
    pub fn record_preset_use(&self, preset_id: Option<&str>) {
        let Some(preset_id) = preset_id else {
            return;
        };
        if let Err(e) = self.styles.presets().increment_usage(preset_id) {
            tracing::warn!(preset_id = %preset_id, error = %e, "Failed to record preset usage");
        }
    }

    /// Transcript in the language, else a completed translation into it
    fn subtitle_source(&self, video_id: &str, language: &str) -> CoreResult<SubtitleSource> {
        if let Some(transcript) = self.transcripts.transcript(video_id, language)? {
            return Ok(SubtitleSource::Transcript(transcript));
        }
        if let Some(record) = load_completed_record(&self.db, video_id, language)? {
            return Ok(SubtitleSource::Translation(record));
        }
        Err(CoreError::MissingTranscript {
            video_id: video_id.to_string(),
            language: language.to_string(),
        })
    }

    /// Rough wall-clock seconds for a burn of a source this long
    pub fn estimate_seconds(&self, duration_sec: Option<f64>) -> u64 {
        let duration = duration_sec.filter(|d| d.is_finite() && *d > 0.0).unwrap_or(60.0);
        (duration * self.options.realtime_factor + OVERHEAD_SECONDS).ceil() as u64
    }

    /// Published versions of a video, newest first
    pub async fn list_subtitled_versions(&self, video_id: &str) -> CoreResult<Vec<SubtitledVersion>> {
        self.db.require_video(video_id)?;
        self.storage.list_versions(video_id).await
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Plans and runs a burn
    pub async fn burn(
        &self,
        request: &BurnJobRequest,
        token: &CancellationToken,
    ) -> CoreResult<SubtitledVersion> {
        let plan = self.plan(request)?;
        self.record_preset_use(plan.preset_id.as_deref());
        self.run(plan, None, token).await
    }

    /// Runs a planned burn to completion.
    ///
    /// Cancellation is honoured up to the start of the encode. Scratch
    /// files are removed on every exit path.
    pub async fn run(
        &self,
        plan: BurnPlan,
        job_id: Option<JobId>,
        token: &CancellationToken,
    ) -> CoreResult<SubtitledVersion> {
        let key = burn_progress_key(&plan.request.video_id);
        let mut checkpoint = Checkpoint {
            stage: JobStage::RetrievingSource,
            percent: 0.0,
        };

        let result = self
            .run_stages(&plan, job_id.as_ref(), token, &key, &mut checkpoint)
            .await;

        match &result {
            Ok(version) => {
                let result = serde_json::to_value(version).unwrap_or_default();
                self.report(&key, JobState::completed(job_id, result));
                tracing::info!(
                    video_id = %plan.request.video_id,
                    language = %plan.request.language,
                    url = %version.download_url,
                    "Burn completed"
                );
            }
            Err(e) => {
                self.report(
                    &key,
                    JobState::failed(job_id, checkpoint.stage, checkpoint.percent, e),
                );
                tracing::warn!(
                    video_id = %plan.request.video_id,
                    language = %plan.request.language,
                    stage = %checkpoint.stage,
                    error = %e,
                    "Burn failed"
                );
            }
        }
        result
    }

    async fn run_stages(
        &self,
        plan: &BurnPlan,
        job_id: Option<&JobId>,
        token: &CancellationToken,
        key: &str,
        checkpoint: &mut Checkpoint,
    ) -> CoreResult<SubtitledVersion> {
        let video_id = plan.request.video_id.as_str();
        let language = plan.request.language.as_str();
        let mut enter = |stage: JobStage, fraction: f32| {
            checkpoint.stage = stage;
            checkpoint.percent = stage_percent(stage, fraction);
            self.report(key, JobState::new(job_id.cloned(), stage, checkpoint.percent));
        };

        // Retrieving source
        check_cancelled(token)?;
        enter(JobStage::RetrievingSource, 0.0);
        let source_path = self.storage.source_path(video_id).await?;
        enter(JobStage::RetrievingSource, 0.5);
        let media = match self.transcoder.probe(&source_path).await {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!(video_id, error = %e, "Probe failed, using catalog metadata");
                None
            }
        };
        let (width, height) = resolution(plan, media.as_ref());
        let duration_sec = media
            .as_ref()
            .map(|m| m.duration_sec)
            .filter(|d| *d > 0.0)
            .or(plan.video.duration_sec);

        // Generating subtitles
        check_cancelled(token)?;
        enter(JobStage::GeneratingSubtitles, 0.0);
        let scratch = self.scratch_dir()?;
        let mut document = self.generate(plan, width, height)?;
        let mut subtitle_path = write_document(scratch.path(), &document).await?;
        tracing::debug!(
            video_id,
            source = plan.source.kind(),
            format = %document.format,
            cues = document.cues.len(),
            "Generated subtitles"
        );

        // Encoding; the last cancellation checkpoint
        check_cancelled(token)?;
        enter(JobStage::Encoding, 0.0);
        let output = scratch
            .path()
            .join(format!("output.{}", plan.request.output_format.extension()));

        let mut failures = 0u32;
        let mut fell_back = false;
        loop {
            let request = BurnRequest {
                input: source_path.clone(),
                subtitle_path: subtitle_path.clone(),
                subtitle_format: document.format,
                output: output.clone(),
                output_format: plan.request.output_format,
                duration_sec,
            };

            match self.encode(&request, job_id, key).await {
                Ok(()) => break,
                Err(CoreError::SubtitleGeneration(reason))
                    if document.format == SubtitleFormat::Ass && !fell_back =>
                {
                    tracing::warn!(video_id, reason = %reason, "Transcoder rejected ASS, retrying with SRT");
                    fell_back = true;
                    document = self
                        .renderer
                        .convert(&document, &plan.settings, SubtitleFormat::Srt)?;
                    subtitle_path = write_document(scratch.path(), &document).await?;
                }
                Err(e) if e.is_transient() && failures < self.options.encode_retries => {
                    failures += 1;
                    tracing::warn!(
                        video_id,
                        attempt = failures,
                        error = %e,
                        "Encode failed, retrying"
                    );
                    tokio::time::sleep(self.options.retry_delay).await;
                    enter(JobStage::Encoding, 0.0);
                }
                Err(e) => return Err(e),
            }
        }

        // Publishing
        enter(JobStage::Publishing, 0.0);
        let version = self
            .storage
            .publish(video_id, language, plan.request.output_format, &output)
            .await?;
        drop(scratch);
        Ok(version)
    }

    /// Renders ASS, regenerating the same transcript as SRT when the ASS
    /// encoder fails
    fn generate(&self, plan: &BurnPlan, width: u32, height: u32) -> CoreResult<SubtitleDocument> {
        let segments = plan.source.segments();
        let mut options = RenderOptions::new(SubtitleFormat::Ass).with_resolution(width, height);
        options.title = Some(plan.video.title.clone()).filter(|t| !t.is_empty());

        match self.renderer.render(&segments, &plan.settings, &options) {
            Ok(document) => Ok(document),
            Err(CoreError::SubtitleGeneration(reason)) => {
                tracing::warn!(
                    video_id = %plan.request.video_id,
                    reason = %reason,
                    "ASS generation failed, falling back to SRT"
                );
                options.format = SubtitleFormat::Srt;
                self.renderer.render(&segments, &plan.settings, &options)
            }
            Err(e) => Err(e),
        }
    }

    /// One transcoder invocation with progress forwarded into the store
    async fn encode(&self, request: &BurnRequest, job_id: Option<&JobId>, key: &str) -> CoreResult<()> {
        let (tx, mut rx) = mpsc::channel::<FFmpegProgress>(32);
        let store = self.progress.clone();
        let key = key.to_string();
        let job_id = job_id.cloned();

        let forwarder = tokio::spawn(async move {
            while let Some(progress) = rx.recv().await {
                let percent = stage_percent(JobStage::Encoding, progress.percent / 100.0);
                let state = JobState::new(job_id.clone(), JobStage::Encoding, percent)
                    .with_eta(progress.eta_seconds);
                if let Err(e) = store.put(&key, &state) {
                    tracing::debug!(error = %e, "Failed to write encode progress");
                }
            }
        });

        let result = self.transcoder.burn_subtitles(request, Some(tx)).await;
        if let Err(e) = forwarder.await {
            tracing::debug!(error = %e, "Progress forwarder ended abnormally");
        }
        result
    }

    fn scratch_dir(&self) -> CoreResult<tempfile::TempDir> {
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("subburn-burn-");
            builder
        };
        let dir = match &self.options.temp_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    /// Progress writes are best effort; a broken store never fails a burn
    fn report(&self, key: &str, state: JobState) {
        if let Err(e) = self.progress.put(key, &state) {
            tracing::warn!(key, error = %e, "Failed to write burn progress");
        }
    }
}

fn check_cancelled(token: &CancellationToken) -> CoreResult<()> {
    if token.is_cancelled() {
        Err(CoreError::Cancelled)
    } else {
        Ok(())
    }
}

/// Probed resolution, else the catalog's, else 1080p
fn resolution(plan: &BurnPlan, media: Option<&MediaInfo>) -> (u32, u32) {
    media
        .and_then(|m| m.video.as_ref())
        .map(|v| (v.width, v.height))
        .filter(|(w, h)| *w > 0 && *h > 0)
        .or_else(|| plan.video.width.zip(plan.video.height))
        .unwrap_or(DEFAULT_RESOLUTION)
}

async fn write_document(dir: &Path, document: &SubtitleDocument) -> CoreResult<PathBuf> {
    let path = dir.join(document.file_name("subtitles"));
    tokio::fs::write(&path, document.as_bytes()).await?;
    Ok(path)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::Video;
    use crate::core::ffmpeg::VideoStreamInfo;
    use crate::core::jobs::InMemoryProgressStore;
    use crate::core::presets::PresetCatalog;
    use crate::core::storage::LocalVideoStorage;
    use crate::core::transcripts::{save_transcript, Transcript, TranscriptSegment};
    use crate::core::translation::store::save_record;
    use crate::core::translation::{TranslationRecord, TranslationSegment, TranslationStatus};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted transcoder: pops one outcome per burn, then succeeds
    #[derive(Default)]
    struct FakeTranscoder {
        outcomes: Mutex<VecDeque<CoreError>>,
        /// (format, subtitle file content) per call
        calls: Mutex<Vec<(SubtitleFormat, String)>>,
        probe_fails: bool,
    }

    impl FakeTranscoder {
        fn failing_with(errors: Vec<CoreError>) -> Self {
            Self {
                outcomes: Mutex::new(errors.into()),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<(SubtitleFormat, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn probe(&self, _input: &Path) -> CoreResult<MediaInfo> {
            if self.probe_fails {
                return Err(CoreError::EncodeFailure("probe".into()));
            }
            Ok(MediaInfo {
                duration_sec: 10.0,
                video: Some(VideoStreamInfo {
                    width: 1280,
                    height: 720,
                    fps: 30.0,
                    codec: "h264".into(),
                    pixel_format: "yuv420p".into(),
                }),
                audio: None,
                format: "mov,mp4,m4a,3gp,3g2,mj2".into(),
                size_bytes: 4,
            })
        }

        async fn burn_subtitles(
            &self,
            request: &BurnRequest,
            progress_tx: Option<mpsc::Sender<FFmpegProgress>>,
        ) -> CoreResult<()> {
            let content = std::fs::read_to_string(&request.subtitle_path).unwrap();
            self.calls
                .lock()
                .unwrap()
                .push((request.subtitle_format, content));

            if let Some(err) = self.outcomes.lock().unwrap().pop_front() {
                return Err(err);
            }
            if let Some(tx) = progress_tx {
                let _ = tx
                    .send(FFmpegProgress {
                        frame: 150,
                        total_frames: Some(300),
                        percent: 50.0,
                        fps: 60.0,
                        bitrate: None,
                        time_sec: 5.0,
                        eta_seconds: Some(3),
                        finished: false,
                    })
                    .await;
            }
            std::fs::write(&request.output, b"burned").unwrap();
            Ok(())
        }
    }

    /// Keeps every state written, in order
    #[derive(Default)]
    struct RecordingStore {
        inner: InMemoryProgressStore,
        history: Mutex<Vec<JobState>>,
    }

    impl ProgressStore for RecordingStore {
        fn put(&self, key: &str, state: &JobState) -> CoreResult<()> {
            self.history.lock().unwrap().push(state.clone());
            self.inner.put(key, state)
        }

        fn get(&self, key: &str) -> CoreResult<Option<JobState>> {
            self.inner.get(key)
        }

        fn remove(&self, key: &str) -> CoreResult<()> {
            self.inner.remove(key)
        }

        fn purge_finished(&self, retention: Duration) -> CoreResult<usize> {
            self.inner.purge_finished(retention)
        }
    }

    struct Harness {
        _dir: TempDir,
        work_dir: PathBuf,
        db: Database,
        styles: StyleStore,
        transcoder: Arc<FakeTranscoder>,
        progress: Arc<RecordingStore>,
        orchestrator: BurnOrchestrator,
    }

    async fn harness(transcoder: FakeTranscoder) -> Harness {
        let dir = TempDir::new().unwrap();
        let db = Database::in_memory().unwrap();
        db.upsert_video(&Video::new("vid1", "Demo").with_language("en"))
            .unwrap();
        let segments = (0..4)
            .map(|i| {
                let start = i as f64 * 2.0;
                TranscriptSegment::new(start, start + 1.5, &format!("line number {i}"))
            })
            .collect();
        save_transcript(&db, &Transcript::new("vid1", "en", segments)).unwrap();

        let storage = LocalVideoStorage::new(dir.path().join("media"));
        let source = dir.path().join("in.mp4");
        std::fs::write(&source, b"fake").unwrap();
        storage.import_source("vid1", &source).await.unwrap();

        let styles = StyleStore::new(db.clone(), PresetCatalog::new(db.clone()).unwrap());
        let transcoder = Arc::new(transcoder);
        let progress = Arc::new(RecordingStore::default());
        let work_dir = dir.path().join("work");
        let orchestrator = BurnOrchestrator::new(
            db.clone(),
            styles.clone(),
            Arc::new(db.clone()),
            Arc::new(storage),
            transcoder.clone(),
            progress.clone(),
            BurnOptions {
                retry_delay: Duration::from_millis(1),
                temp_dir: Some(work_dir.clone()),
                ..Default::default()
            },
        );

        Harness {
            _dir: dir,
            work_dir,
            db,
            styles,
            transcoder,
            progress,
            orchestrator,
        }
    }

    fn scratch_is_empty(h: &Harness) -> bool {
        std::fs::read_dir(&h.work_dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }

    fn final_state(h: &Harness) -> JobState {
        h.progress.get(&burn_progress_key("vid1")).unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_burn_publishes_and_reports_stages() {
        let h = harness(FakeTranscoder::default()).await;

        let version = h
            .orchestrator
            .burn(&BurnJobRequest::new("vid1", "en"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(version.language, "en");
        assert!(version.download_url.ends_with("vid1_en.mp4"));
        assert_eq!(version.size_bytes, 6);
        assert!(scratch_is_empty(&h));

        let calls = h.transcoder.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, SubtitleFormat::Ass);
        assert!(calls[0].1.contains("PlayResX: 1280"));
        assert_eq!(calls[0].1.matches("Dialogue: ").count(), 4);

        let history = h.progress.history.lock().unwrap().clone();
        let stages: Vec<JobStage> = history.iter().map(|s| s.stage).collect();
        assert!(stages.contains(&JobStage::GeneratingSubtitles));
        assert!(history
            .iter()
            .any(|s| s.stage == JobStage::Encoding && s.percent == 55.0 && s.estimated_seconds_remaining == Some(3)));
        for pair in history.windows(2) {
            assert!(pair[0].percent <= pair[1].percent, "progress went backwards");
        }

        let last = final_state(&h);
        assert_eq!(last.stage, JobStage::Completed);
        assert_eq!(last.percent, 100.0);
        assert_eq!(
            last.result.unwrap()["downloadUrl"],
            serde_json::Value::String(version.download_url.clone())
        );

        let versions = h.orchestrator.list_subtitled_versions("vid1").await.unwrap();
        assert_eq!(versions.len(), 1);
    }

    #[tokio::test]
    async fn test_ass_rejection_falls_back_to_srt_once() {
        let h = harness(FakeTranscoder::failing_with(vec![CoreError::SubtitleGeneration(
            "Unable to open subtitles.ass".into(),
        )]))
        .await;

        h.orchestrator
            .burn(&BurnJobRequest::new("vid1", "en"), &CancellationToken::new())
            .await
            .unwrap();

        let calls = h.transcoder.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, SubtitleFormat::Ass);
        assert_eq!(calls[1].0, SubtitleFormat::Srt);
        assert!(calls[1].1.starts_with("1\n00:00:00,000 --> "));
    }

    #[tokio::test]
    async fn test_second_subtitle_failure_is_fatal() {
        let h = harness(FakeTranscoder::failing_with(vec![
            CoreError::SubtitleGeneration("ass".into()),
            CoreError::SubtitleGeneration("srt".into()),
        ]))
        .await;

        let err = h
            .orchestrator
            .burn(&BurnJobRequest::new("vid1", "en"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::SubtitleGeneration(_)));
        assert_eq!(h.transcoder.calls().len(), 2);
        assert!(scratch_is_empty(&h));
    }

    #[tokio::test]
    async fn test_transient_encode_failures_retry_twice() {
        let h = harness(FakeTranscoder::failing_with(vec![
            CoreError::EncodeFailure("exit 1".into()),
            CoreError::EncodeFailure("exit 1".into()),
        ]))
        .await;

        h.orchestrator
            .burn(&BurnJobRequest::new("vid1", "en"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(h.transcoder.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_encode_fails_after_retries() {
        let h = harness(FakeTranscoder::failing_with(vec![
            CoreError::EncodeFailure("/tmp/x/in.mp4: moov atom not found".into()),
            CoreError::EncodeFailure("exit 1".into()),
            CoreError::EncodeFailure("exit 1".into()),
        ]))
        .await;

        let err = h
            .orchestrator
            .burn(&BurnJobRequest::new("vid1", "en"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::EncodeFailure(_)));
        assert_eq!(h.transcoder.calls().len(), 3);
        assert!(scratch_is_empty(&h));

        let state = final_state(&h);
        assert_eq!(state.stage, JobStage::Failed);
        assert_eq!(state.percent, 20.0);
        let message = state.error.unwrap();
        assert!(message.starts_with("encoding: "));
        assert!(!message.contains("/tmp"));
    }

    #[tokio::test]
    async fn test_cancel_before_encode() {
        let h = harness(FakeTranscoder::default()).await;
        let token = CancellationToken::new();
        token.cancel();

        let err = h
            .orchestrator
            .burn(&BurnJobRequest::new("vid1", "en"), &token)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Cancelled));
        assert!(h.transcoder.calls().is_empty());
        assert_eq!(final_state(&h).stage, JobStage::Cancelled);
    }

    #[tokio::test]
    async fn test_plan_rejects_missing_transcript_synchronously() {
        let h = harness(FakeTranscoder::default()).await;

        let err = h
            .orchestrator
            .plan(&BurnJobRequest::new("vid1", "fr"))
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingTranscript { .. }));

        let err = h
            .orchestrator
            .plan(&BurnJobRequest::new("vid1", "French"))
            .unwrap_err();
        assert!(err.field_errors().unwrap().contains("language"));

        let err = h
            .orchestrator
            .plan(&BurnJobRequest::new("missing", "en"))
            .unwrap_err();
        assert!(matches!(err, CoreError::VideoNotFound(_)));
    }

    #[tokio::test]
    async fn test_plan_uses_completed_translation() {
        let h = harness(FakeTranscoder::default()).await;
        let mut record = TranslationRecord::new("vid1", "en", "es");
        record.segments = vec![TranslationSegment {
            start_time: 0.0,
            end_time: 1.5,
            original_text: "line number 0".into(),
            translated_text: "línea número cero".into(),
            confidence: 0.9,
        }];
        record.status = TranslationStatus::Completed;
        save_record(&h.db, &record).unwrap();

        let plan = h.orchestrator.plan(&BurnJobRequest::new("vid1", "es")).unwrap();
        assert_eq!(plan.source.kind(), "translation");

        h.orchestrator
            .run(plan, Some("job1".into()), &CancellationToken::new())
            .await
            .unwrap();
        let calls = h.transcoder.calls();
        assert!(calls[0].1.contains("línea número cero"));
        assert_eq!(final_state(&h).job_id.as_deref(), Some("job1"));
    }

    #[tokio::test]
    async fn test_preset_style_ref_counts_usage() {
        let h = harness(FakeTranscoder::default()).await;
        let before = h.styles.presets().get_by_name("TikTok Viral").unwrap().usage_count;

        let plan = h
            .orchestrator
            .plan(
                &BurnJobRequest::new("vid1", "en")
                    .with_style(StyleRef::Preset("TikTok Viral".into())),
            )
            .unwrap();

        assert_eq!(plan.settings.font_size, 48);
        assert!(plan.style_id.is_none());
        let planned = h.styles.presets().get_by_name("TikTok Viral").unwrap().usage_count;
        assert_eq!(planned, before);

        h.orchestrator.record_preset_use(plan.preset_id.as_deref());
        let after = h.styles.presets().get_by_name("TikTok Viral").unwrap().usage_count;
        assert_eq!(after, before + 1);
        // The stored style is untouched
        assert!(h.styles.find("vid1", "en").unwrap().is_none());

        let err = h
            .orchestrator
            .plan(&BurnJobRequest::new("vid1", "en").with_style(StyleRef::Preset("Nope".into())))
            .unwrap_err();
        assert!(matches!(err, CoreError::PresetNotFound(_)));
    }

    #[tokio::test]
    async fn test_probe_failure_uses_catalog_resolution() {
        let transcoder = FakeTranscoder {
            probe_fails: true,
            ..Default::default()
        };
        let h = harness(transcoder).await;
        h.db.upsert_video(
            &Video::new("vid1", "Demo")
                .with_language("en")
                .with_resolution(1080, 1920),
        )
        .unwrap();

        h.orchestrator
            .burn(&BurnJobRequest::new("vid1", "en"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(h.transcoder.calls()[0].1.contains("PlayResX: 1080"));
    }

    #[tokio::test]
    async fn test_estimate_seconds() {
        let h = harness(FakeTranscoder::default()).await;
        assert_eq!(h.orchestrator.estimate_seconds(Some(120.0)), 65);
        assert_eq!(h.orchestrator.estimate_seconds(None), 35);
    }
}

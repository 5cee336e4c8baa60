//! subburn command line
//!
//! Headless surface over the engine. Every command prints JSON on stdout;
//! logs go to stderr.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};

use subburn_lib::api::{
    CreatePresetRequest, ErrorResponse, ProgressResponse, SubburnService, TranslateRequest,
};
use subburn_lib::core::burn::{BurnJobRequest, StyleRef};
use subburn_lib::core::captions::{parse_srt, parse_vtt};
use subburn_lib::core::presets::{Platform, PresetFilter};
use subburn_lib::core::settings::{default_data_dir, AppConfig, ConfigManager};
use subburn_lib::core::storage::LocalVideoStorage;
use subburn_lib::core::transcripts::TranscriptSegment;
use subburn_lib::core::translation::{QualityTier, SegmentEdit};
use subburn_lib::core::{CoreError, OutputFormat, SubtitleFormat};

/// Malformed command line input
#[derive(Debug, thiserror::Error)]
enum InputError {
    #[error("Expected {expected}, got '{got}'")]
    BadPair { expected: &'static str, got: String },
    #[error("Unknown {what}: {value}")]
    UnknownValue { what: &'static str, value: String },
    #[error("Unsupported transcript file type '{0}' (use srt, vtt or json)")]
    UnsupportedTranscript(String),
}

#[derive(Parser, Debug)]
#[command(
    name = "subburn-cli",
    version,
    about = "Style, render, translate and burn subtitles into videos"
)]
struct Cli {
    /// Data directory (database, media, config.json)
    #[arg(long, global = true, env = "SUBBURN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Config file (default: {data_dir}/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transcript management
    #[command(subcommand)]
    Transcript(TranscriptCommand),
    /// Per-video subtitle styles
    #[command(subcommand)]
    Style(StyleCommand),
    /// Style preset catalog
    #[command(subcommand)]
    Preset(PresetCommand),
    /// Render the subtitle file a burn would use
    Render(RenderArgs),
    /// Burn subtitles into a video and wait for the result
    Burn(BurnArgs),
    /// Translate a transcript into one or more languages
    Translate(TranslateArgs),
    /// Stored translations
    #[command(subcommand)]
    Translation(TranslationCommand),
    /// Last known progress of a burn or translation
    Progress(ProgressArgs),
    /// Published subtitled versions of a video
    Versions(VideoArg),
    /// Video records
    #[command(subcommand)]
    Video(VideoCommand),
    /// Detect the language of a piece of text
    Detect {
        text: String,
    },
    /// Record counts and translation quota usage
    Status,
}

#[derive(Subcommand, Debug)]
enum VideoCommand {
    /// Delete a video with its transcripts, styles and translations
    Delete(VideoArg),
}

#[derive(Args, Debug)]
struct VideoArg {
    #[arg(long)]
    video: String,
}

#[derive(Args, Debug)]
struct VideoLang {
    #[arg(long)]
    video: String,
    #[arg(long)]
    language: String,
}

#[derive(Subcommand, Debug)]
enum TranscriptCommand {
    /// Import an SRT, VTT or JSON segment list
    Import {
        #[command(flatten)]
        target: VideoLang,
        /// Transcript file
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        title: Option<String>,
        /// Source video to copy into the media store
        #[arg(long)]
        source: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum StyleCommand {
    Show(VideoLang),
    /// Every style stored for a video
    List(VideoArg),
    Delete(VideoLang),
    /// Create the style explicitly, e.g. `--set font_family=Inter`
    Create {
        #[command(flatten)]
        target: VideoLang,
        #[arg(long = "set", value_name = "FIELD=VALUE")]
        fields: Vec<String>,
        #[arg(long)]
        created_by: Option<String>,
    },
    /// Update fields, e.g. `--set font_size=32 --set font_color=#FFD700`
    Set {
        #[command(flatten)]
        target: VideoLang,
        #[arg(long = "set", value_name = "FIELD=VALUE", required = true)]
        fields: Vec<String>,
        /// Report field errors without saving
        #[arg(long)]
        dry_run: bool,
    },
    ApplyPreset {
        #[command(flatten)]
        target: VideoLang,
        #[arg(long)]
        preset: String,
    },
    Clone {
        #[command(flatten)]
        source: VideoLang,
        #[arg(long)]
        to_video: String,
        #[arg(long)]
        to_language: Option<String>,
    },
    /// Save the style as a new preset
    Export {
        #[command(flatten)]
        source: VideoLang,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "general")]
        platform: Platform,
    },
}

#[derive(Subcommand, Debug)]
enum PresetCommand {
    List {
        #[arg(long)]
        platform: Option<Platform>,
        /// all | system | user
        #[arg(long, default_value = "all")]
        visibility: String,
        /// popular | name | newest
        #[arg(long, default_value = "popular")]
        sort: String,
    },
    /// Delete a user preset by id or name
    Delete { preset: String },
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[command(flatten)]
    target: VideoLang,
    #[arg(long, default_value = "ass")]
    format: SubtitleFormat,
    /// Write here instead of printing
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct BurnArgs {
    #[command(flatten)]
    target: VideoLang,
    /// Use a preset as-is instead of the stored style
    #[arg(long, conflicts_with = "style_id")]
    preset: Option<String>,
    #[arg(long)]
    style_id: Option<String>,
    #[arg(long, default_value = "mp4")]
    format: OutputFormat,
}

#[derive(Args, Debug)]
struct TranslateArgs {
    #[arg(long)]
    video: String,
    /// Target languages, comma separated
    #[arg(long, value_delimiter = ',', required = true)]
    to: Vec<String>,
    #[arg(long)]
    from: Option<String>,
}

#[derive(Subcommand, Debug)]
enum TranslationCommand {
    List(VideoArg),
    Show(VideoLang),
    Delete(VideoLang),
    /// Raise the quality tier (reviewed, professional)
    Promote {
        #[command(flatten)]
        target: VideoLang,
        #[arg(long)]
        quality: QualityTier,
    },
    /// Export a completed translation as SRT or VTT
    Export {
        #[command(flatten)]
        target: VideoLang,
        #[arg(long, default_value = "srt")]
        format: SubtitleFormat,
    },
    /// Correct segments, e.g. `--segment 3="Hola a todos"`
    Edit {
        #[command(flatten)]
        target: VideoLang,
        #[arg(long = "segment", value_name = "INDEX=TEXT", required = true)]
        segments: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct ProgressArgs {
    #[arg(long)]
    video: String,
    /// Translation language; burn progress when omitted
    #[arg(long)]
    language: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        match err.downcast_ref::<CoreError>() {
            Some(core) => {
                let body = ErrorResponse::from(core);
                eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
            }
            None => eprintln!("error: {err:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new(&data_dir),
    };
    let config = manager.load_effective();
    subburn_lib::init_logging(config.logging.directory.as_deref(), &config.logging.level);

    let service = SubburnService::open(&config, &data_dir)?;

    match cli.command {
        Command::Transcript(TranscriptCommand::Import {
            target,
            file,
            title,
            source,
        }) => {
            let segments = read_segments(&file)?;
            let transcript = service.import_transcript(
                &target.video,
                &target.language,
                title.as_deref(),
                segments,
            )?;
            if let Some(source) = source {
                let storage = LocalVideoStorage::new(config.storage.media_root(&data_dir));
                storage.import_source(&target.video, &source).await?;
                if let Err(e) = service.refresh_media_info(&target.video).await {
                    tracing::warn!(error = %e, "Could not probe the source video");
                }
            }
            print_json(&serde_json::json!({
                "videoId": transcript.video_id,
                "language": transcript.language,
                "segments": transcript.segments.len(),
            }))
        }

        Command::Style(command) => style_command(&service, command),

        Command::Preset(PresetCommand::List {
            platform,
            visibility,
            sort,
        }) => {
            let filter = PresetFilter {
                platform,
                visibility: parse_wire(&visibility, "visibility")?,
                sort: parse_wire(&sort, "sort")?,
            };
            print_json(&service.list_presets(&filter)?)
        }
        Command::Preset(PresetCommand::Delete { preset }) => {
            service.delete_preset(&preset)?;
            print_json(&serde_json::json!({ "deleted": preset }))
        }

        Command::Render(args) => {
            let document =
                service.render_subtitles(&args.target.video, &args.target.language, args.format)?;
            match args.output {
                Some(path) => {
                    std::fs::write(&path, document.as_bytes())
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    print_json(&serde_json::json!({
                        "path": path,
                        "format": document.format,
                        "cues": document.cues.len(),
                    }))
                }
                None => {
                    print!("{}", document.content);
                    Ok(())
                }
            }
        }

        Command::Burn(args) => {
            let style = match (args.preset, args.style_id) {
                (Some(name), _) => StyleRef::Preset(name),
                (None, Some(id)) => StyleRef::StyleId(id),
                (None, None) => StyleRef::Stored,
            };
            let request = BurnJobRequest::new(&args.target.video, &args.target.language)
                .with_style(style)
                .with_output_format(args.format);

            service.start_workers();
            let queued = service.submit_burn(&request)?;
            eprintln!(
                "Burn queued as {} (about {}s)",
                queued.job_id, queued.estimated_seconds
            );
            let video = args.target.video.clone();
            let state = wait_for(&service, &[queued.job_id], || {
                Ok(service.burn_progress(&video)?)
            })
            .await?;
            service.shutdown();
            finish(state)
        }

        Command::Translate(args) => {
            let request = TranslateRequest {
                video_id: args.video.clone(),
                target_languages: args.to.clone(),
                source_language: args.from,
            };

            service.start_workers();
            let queued = service.submit_translations(&request)?;
            eprintln!(
                "{} translation job(s) queued, estimated cost ${:.4}",
                queued.job_ids.len(),
                queued.estimated_cost
            );

            let mut results = Map::new();
            for language in &args.to {
                if results.contains_key(language) {
                    continue;
                }
                let state = wait_for(&service, &queued.job_ids, || {
                    Ok(service.translation_progress(&args.video, language)?)
                })
                .await?;
                results.insert(language.clone(), serde_json::to_value(&state)?);
            }
            service.shutdown();
            print_json(&results)
        }

        Command::Translation(TranslationCommand::List(video)) => {
            print_json(&service.list_translations(&video.video)?)
        }
        Command::Translation(TranslationCommand::Delete(target)) => {
            let deleted = service.delete_translation(&target.video, &target.language)?;
            print_json(&serde_json::json!({ "deleted": deleted }))
        }
        Command::Translation(TranslationCommand::Promote { target, quality }) => print_json(
            &service.promote_translation(&target.video, &target.language, quality)?,
        ),
        Command::Translation(TranslationCommand::Show(target)) => {
            print_json(&service.get_translation(&target.video, &target.language)?)
        }
        Command::Translation(TranslationCommand::Export { target, format }) => {
            let export = service
                .export_translation(&target.video, &target.language, format)
                .await?;
            print_json(&export)
        }
        Command::Translation(TranslationCommand::Edit { target, segments }) => {
            let edits = segments
                .iter()
                .map(|s| parse_segment_edit(s))
                .collect::<Result<Vec<_>>>()?;
            let record =
                service.update_translation_segments(&target.video, &target.language, &edits)?;
            print_json(&record)
        }

        Command::Progress(args) => {
            let state = match &args.language {
                Some(language) => service.translation_progress(&args.video, language)?,
                None => service.burn_progress(&args.video)?,
            };
            print_json(&state)
        }

        Command::Versions(video) => print_json(&service.subtitled_versions(&video.video).await?),

        Command::Video(VideoCommand::Delete(video)) => {
            let deleted = service.delete_video(&video.video)?;
            print_json(&serde_json::json!({ "deleted": deleted }))
        }

        Command::Detect { text } => print_json(&service.detect_language(&text).await?),

        Command::Status => print_json(&serde_json::json!({
            "records": service.stats()?,
            "quota": service.translation_quota()?,
        })),
    }
}

fn style_command(service: &SubburnService, command: StyleCommand) -> Result<()> {
    match command {
        StyleCommand::Show(target) => print_json(&service.get_style(&target.video, &target.language)?),
        StyleCommand::List(video) => print_json(&service.list_styles(&video.video)?),
        StyleCommand::Delete(target) => {
            service.delete_style(&target.video, &target.language)?;
            print_json(&serde_json::json!({ "deleted": true }))
        }
        StyleCommand::Create {
            target,
            fields,
            created_by,
        } => print_json(&service.create_style(
            &target.video,
            &target.language,
            &parse_fields(&fields)?,
            created_by.as_deref(),
        )?),
        StyleCommand::Set {
            target,
            fields,
            dry_run,
        } => {
            let fields = parse_fields(&fields)?;
            if dry_run {
                return print_json(&service.validate_style(&fields));
            }
            print_json(&service.update_style(&target.video, &target.language, &fields)?)
        }
        StyleCommand::ApplyPreset { target, preset } => print_json(&service.apply_preset(
            &target.video,
            &target.language,
            &preset,
            None,
        )?),
        StyleCommand::Clone {
            source,
            to_video,
            to_language,
        } => print_json(&service.clone_style(
            &source.video,
            &source.language,
            &to_video,
            to_language.as_deref(),
        )?),
        StyleCommand::Export {
            source,
            name,
            description,
            platform,
        } => {
            let style = service.get_style(&source.video, &source.language)?;
            print_json(&service.create_preset(&CreatePresetRequest {
                style_id: style.id,
                name,
                description,
                platform,
            })?)
        }
    }
}

/// Polls until the job reaches a terminal stage, echoing progress to stderr.
///
/// Ctrl-C cancels `job_ids` and keeps polling so the cancelled state is
/// reported like any other outcome.
async fn wait_for(
    service: &SubburnService,
    job_ids: &[String],
    poll: impl Fn() -> Result<Option<ProgressResponse>>,
) -> Result<ProgressResponse> {
    let mut last_percent = -1.0f32;
    let mut interrupted = false;
    loop {
        if let Some(state) = poll()? {
            if state.percent != last_percent {
                last_percent = state.percent;
                let eta = state
                    .eta_seconds
                    .map(|s| format!(", {s}s left"))
                    .unwrap_or_default();
                eprintln!("{}: {:.0}%{}", state.stage, state.percent, eta);
            }
            if state.stage.is_terminal() {
                return Ok(state);
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(250)) => {}
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                signal.context("Failed to listen for Ctrl-C")?;
                interrupted = true;
                for job_id in job_ids {
                    if service.cancel_job(job_id)? {
                        eprintln!("Cancelling {job_id}");
                    }
                }
            }
        }
    }
}

fn finish(state: ProgressResponse) -> Result<()> {
    print_json(&state)?;
    match &state.error {
        Some(error) => bail!("{error}"),
        None => Ok(()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parses a lowercase wire value (`"popular"`) into a serde enum
fn parse_wire<T: serde::de::DeserializeOwned>(value: &str, what: &'static str) -> Result<T> {
    serde_json::from_value(Value::String(value.to_ascii_lowercase()))
        .map_err(|_| {
            InputError::UnknownValue {
                what,
                value: value.to_string(),
            }
            .into()
        })
}

/// `key=value` pairs; values that parse as JSON keep their type
fn parse_fields(pairs: &[String]) -> Result<Map<String, Value>> {
    let mut fields = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| InputError::BadPair {
                expected: "FIELD=VALUE",
                got: pair.clone(),
            })?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        fields.insert(key.trim().to_string(), value);
    }
    Ok(fields)
}

fn parse_segment_edit(pair: &str) -> Result<SegmentEdit> {
    let (index, text) = pair
        .split_once('=')
        .ok_or_else(|| InputError::BadPair {
            expected: "INDEX=TEXT",
            got: pair.to_string(),
        })?;
    let index = index
        .trim()
        .parse()
        .with_context(|| format!("Invalid segment index '{index}'"))?;
    Ok(SegmentEdit {
        index,
        translated_text: text.to_string(),
    })
}

/// Reads transcript segments from SRT, VTT or a JSON segment list
fn read_segments(path: &Path) -> Result<Vec<TranscriptSegment>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let cues = match extension.as_str() {
        "srt" => parse_srt(&content)?,
        "vtt" => parse_vtt(&content)?,
        "json" => {
            return serde_json::from_str(&content)
                .with_context(|| format!("{} is not a JSON segment list", path.display()));
        }
        other => return Err(InputError::UnsupportedTranscript(other.to_string()).into()),
    };

    Ok(cues
        .iter()
        .map(|cue| TranscriptSegment::new(cue.start_sec, cue.end_sec, &cue.lines.join(" ")))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fields_keeps_json_types() {
        let fields = parse_fields(&[
            "font_size=32".to_string(),
            "font_color=#FFD700".to_string(),
            "animation_enabled=true".to_string(),
        ])
        .unwrap();

        assert_eq!(fields["font_size"], Value::from(32));
        assert_eq!(fields["font_color"], Value::from("#FFD700"));
        assert_eq!(fields["animation_enabled"], Value::Bool(true));
        assert!(parse_fields(&["font_size".to_string()]).is_err());
    }

    #[test]
    fn test_parse_segment_edit() {
        let edit = parse_segment_edit("3=Hola = hola").unwrap();
        assert_eq!(edit.index, 3);
        assert_eq!(edit.translated_text, "Hola = hola");
        assert!(parse_segment_edit("x=Hola").is_err());
    }

    #[test]
    fn test_parse_wire_enums() {
        let filter = PresetFilter {
            platform: None,
            visibility: parse_wire("System", "visibility").unwrap(),
            sort: parse_wire("name", "sort").unwrap(),
        };
        assert_eq!(
            serde_json::to_value(&filter).unwrap()["visibility"],
            Value::from("system")
        );
        assert!(parse_wire::<subburn_lib::core::presets::PresetSort>("loudest", "sort").is_err());
    }

    #[test]
    fn test_read_srt_segments() {
        let dir = std::env::temp_dir().join(format!("subburn-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("t.srt");
        std::fs::write(
            &path,
            "1\n00:00:01,000 --> 00:00:02,500\nHello\nworld\n\n2\n00:00:03,000 --> 00:00:04,000\nAgain\n\n",
        )
        .unwrap();

        let segments = read_segments(&path).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "Hello world");
        assert_eq!(segments[0].end_sec, 2.5);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "subburn-cli",
            "burn",
            "--video",
            "v1",
            "--language",
            "en",
            "--preset",
            "TikTok Viral",
            "--format",
            "mkv",
        ])
        .unwrap();
        match cli.command {
            Command::Burn(args) => {
                assert_eq!(args.preset.as_deref(), Some("TikTok Viral"));
                assert_eq!(args.format, OutputFormat::Mkv);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}

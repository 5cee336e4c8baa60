//! Style Store
//!
//! Persists one style per (video, language). Updates are last-write-wins:
//! every write replaces the settings and refreshes `updated_at`.

use rusqlite::OptionalExtension;
use serde_json::{Map, Value};

use super::models::{Style, StyleSettings};
use super::validation::{validate_candidate, validate_update};
use crate::core::db::Database;
use crate::core::presets::{Platform, Preset, PresetCatalog};
use crate::core::{
    is_valid_language_code, now_rfc3339, CoreError, CoreResult, FieldErrors,
};

const STYLE_COLUMNS: &str =
    "id, video_id, language_code, settings, preset_name, created_by, created_at, updated_at";

/// Style persistence and the operations built on it
#[derive(Clone, Debug)]
pub struct StyleStore {
    db: Database,
    presets: PresetCatalog,
}

impl StyleStore {
    pub fn new(db: Database, presets: PresetCatalog) -> Self {
        Self { db, presets }
    }

    pub fn presets(&self) -> &PresetCatalog {
        &self.presets
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Gets a style by id
    pub fn get(&self, style_id: &str) -> CoreResult<Style> {
        self.query_one("id = ?1", &[style_id])?
            .ok_or_else(|| CoreError::StyleNotFound(style_id.to_string()))
    }

    /// Finds the style for (video, language) without creating one
    pub fn find(&self, video_id: &str, language: &str) -> CoreResult<Option<Style>> {
        self.query_one("video_id = ?1 AND language_code = ?2", &[video_id, language])
    }

    /// All styles of a video, ordered by language
    pub fn list_for_video(&self, video_id: &str) -> CoreResult<Vec<Style>> {
        let sql = format!(
            "SELECT {STYLE_COLUMNS} FROM styles WHERE video_id = ? ORDER BY language_code"
        );
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([video_id], StyleRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(StyleRow::into_style).collect()
    }

    fn query_one(&self, condition: &str, params: &[&str]) -> CoreResult<Option<Style>> {
        let sql = format!("SELECT {STYLE_COLUMNS} FROM styles WHERE {condition}");
        let row = self.db.with_conn(|conn| {
            conn.query_row(
                &sql,
                rusqlite::params_from_iter(params.iter()),
                StyleRow::from_row,
            )
            .optional()
        })?;
        row.map(StyleRow::into_style).transpose()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Returns the style for (video, language), creating a default one on
    /// first access
    pub fn get_or_create_default(
        &self,
        video_id: &str,
        language: &str,
        created_by: Option<&str>,
    ) -> CoreResult<Style> {
        check_language(language)?;
        if let Some(style) = self.find(video_id, language)? {
            return Ok(style);
        }
        self.db.require_video(video_id)?;

        let settings = serde_json::to_string(&StyleSettings::default())?;
        let now = now_rfc3339();
        // Two concurrent first accesses race here; the unique key keeps one.
        self.db.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT OR IGNORE INTO styles
                    (id, video_id, language_code, settings, preset_name, created_by, created_at, updated_at)
                VALUES (?, ?, ?, ?, NULL, ?, ?, ?)
                "#,
                rusqlite::params![
                    ulid::Ulid::new().to_string(),
                    video_id,
                    language,
                    settings,
                    created_by,
                    now,
                    now,
                ],
            )
        })?;

        tracing::debug!(video_id = %video_id, language = %language, "Created default style");
        self.find(video_id, language)?
            .ok_or_else(|| CoreError::Internal("Style vanished after insert".to_string()))
    }

    /// Creates or replaces the style for (video, language) from partial fields
    /// on top of the defaults
    pub fn create(
        &self,
        video_id: &str,
        language: &str,
        fields: &Map<String, Value>,
        created_by: Option<&str>,
    ) -> CoreResult<Style> {
        check_language(language)?;
        let settings = validate_update(&StyleSettings::default(), fields)?;
        self.db.require_video(video_id)?;
        self.write(video_id, language, &settings, None, created_by)
    }

    /// Applies a validated partial update. Nothing is written if any field fails.
    pub fn update(&self, style_id: &str, fields: &Map<String, Value>) -> CoreResult<Style> {
        let mut style = self.get(style_id)?;
        let settings = validate_update(&style.settings, fields)?;

        let now = now_rfc3339();
        let json = serde_json::to_string(&settings)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE styles SET settings = ?, updated_at = ? WHERE id = ?",
                rusqlite::params![json, now, style_id],
            )
        })?;

        tracing::debug!(
            style_id = %style_id,
            fields = fields.len(),
            "Updated style"
        );
        style.settings = settings;
        style.updated_at = now;
        Ok(style)
    }

    /// Copies a preset's settings into the (video, language) style and bumps
    /// the preset's usage counter
    pub fn apply_preset(
        &self,
        video_id: &str,
        language: &str,
        preset_name: &str,
        applied_by: Option<&str>,
    ) -> CoreResult<Style> {
        check_language(language)?;
        let preset = self.presets.get_by_name(preset_name)?;
        self.db.require_video(video_id)?;

        let style = self.write(
            video_id,
            language,
            &preset.settings,
            Some(&preset.name),
            applied_by,
        )?;
        self.presets.increment_usage(&preset.id)?;

        tracing::info!(
            video_id = %video_id,
            language = %language,
            preset = %preset.name,
            "Applied preset"
        );
        Ok(style)
    }

    /// Copies a style onto another video (same language unless overridden)
    pub fn clone_style(
        &self,
        source_style_id: &str,
        target_video_id: &str,
        target_language: Option<&str>,
    ) -> CoreResult<Style> {
        let source = self.get(source_style_id)?;
        let language = target_language.unwrap_or(&source.language_code);
        check_language(language)?;
        self.db.require_video(target_video_id)?;

        self.write(
            target_video_id,
            language,
            &source.settings,
            source.preset_name.as_deref(),
            source.created_by.as_deref(),
        )
    }

    /// Saves a style's settings as a new user preset
    pub fn export_as_preset(
        &self,
        style_id: &str,
        name: &str,
        description: &str,
        platform: Platform,
    ) -> CoreResult<Preset> {
        let style = self.get(style_id)?;
        self.presets.create(
            name,
            description,
            platform,
            &style.settings,
            style.created_by.as_deref(),
        )
    }

    /// Deletes a style; the next access recreates the default
    pub fn delete(&self, style_id: &str) -> CoreResult<()> {
        let deleted = self
            .db
            .with_conn(|conn| conn.execute("DELETE FROM styles WHERE id = ?", [style_id]))?;
        if deleted == 0 {
            return Err(CoreError::StyleNotFound(style_id.to_string()));
        }
        Ok(())
    }

    /// Checks submitted fields without touching storage
    pub fn validate(&self, fields: &Map<String, Value>) -> FieldErrors {
        validate_candidate(fields)
    }

    /// Upserts the full settings for (video, language)
    fn write(
        &self,
        video_id: &str,
        language: &str,
        settings: &StyleSettings,
        preset_name: Option<&str>,
        created_by: Option<&str>,
    ) -> CoreResult<Style> {
        let json = serde_json::to_string(settings)?;
        let now = now_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO styles
                    (id, video_id, language_code, settings, preset_name, created_by, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                ON CONFLICT(video_id, language_code) DO UPDATE SET
                    settings = excluded.settings,
                    preset_name = excluded.preset_name,
                    updated_at = excluded.updated_at
                "#,
                rusqlite::params![
                    ulid::Ulid::new().to_string(),
                    video_id,
                    language,
                    json,
                    preset_name,
                    created_by,
                    now,
                ],
            )
        })?;

        self.find(video_id, language)?
            .ok_or_else(|| CoreError::Internal("Style vanished after upsert".to_string()))
    }
}

fn check_language(language: &str) -> CoreResult<()> {
    if is_valid_language_code(language) {
        Ok(())
    } else {
        Err(CoreError::field(
            "language_code",
            "must be a language code such as 'en' or 'pt-BR'",
        ))
    }
}

/// Raw row before the settings JSON is decoded
struct StyleRow {
    id: String,
    video_id: String,
    language_code: String,
    settings: String,
    preset_name: Option<String>,
    created_by: Option<String>,
    created_at: String,
    updated_at: String,
}

impl StyleRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            video_id: row.get(1)?,
            language_code: row.get(2)?,
            settings: row.get(3)?,
            preset_name: row.get(4)?,
            created_by: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_style(self) -> CoreResult<Style> {
        Ok(Style {
            settings: serde_json::from_str(&self.settings)?,
            id: self.id,
            video_id: self.video_id,
            language_code: self.language_code,
            preset_name: self.preset_name,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

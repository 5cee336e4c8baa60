//! Preset Catalog
//!
//! Named, platform-tagged style templates. System presets are seeded on
//! startup and can be neither modified nor deleted; user presets are created
//! from existing styles. Usage counting happens in SQL so concurrent
//! applications never lose an increment.

mod system;

pub use system::{SystemPreset, SYSTEM_PRESETS};

use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};

use crate::core::db::Database;
use crate::core::styles::{validate_settings, StyleSettings};
use crate::core::{now_rfc3339, CoreError, CoreResult, FieldErrors, PresetId};

// =============================================================================
// Models
// =============================================================================

/// Platform a preset is tuned for
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    General,
    Tiktok,
    Youtube,
    Instagram,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Tiktok => "tiktok",
            Self::Youtube => "youtube",
            Self::Instagram => "instagram",
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" => Ok(Self::General),
            "tiktok" => Ok(Self::Tiktok),
            "youtube" => Ok(Self::Youtube),
            "instagram" => Ok(Self::Instagram),
            other => Err(format!("Unknown platform: {other}")),
        }
    }
}

/// A reusable style template
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: PresetId,
    pub name: String,
    pub description: String,
    pub platform: Platform,
    pub settings: StyleSettings,
    pub is_system: bool,
    pub usage_count: u64,
    pub created_by: Option<String>,
    pub created_at: String,
}

/// Which presets a listing includes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    All,
    System,
    User,
}

/// Listing order
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetSort {
    /// Highest usage first
    #[default]
    Popular,
    Name,
    Newest,
}

/// Catalog query
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresetFilter {
    pub platform: Option<Platform>,
    pub visibility: Visibility,
    pub sort: PresetSort,
}

// =============================================================================
// Catalog
// =============================================================================

const PRESET_COLUMNS: &str =
    "id, name, description, platform, settings, is_system, usage_count, created_by, created_at";

/// Read-mostly preset catalog backed by the database
#[derive(Clone, Debug)]
pub struct PresetCatalog {
    db: Database,
}

impl PresetCatalog {
    /// Opens the catalog, seeding any missing system presets
    pub fn new(db: Database) -> CoreResult<Self> {
        let catalog = Self { db };
        catalog.seed_system_presets()?;
        Ok(catalog)
    }

    fn seed_system_presets(&self) -> CoreResult<()> {
        let now = now_rfc3339();
        let mut seeded = 0;
        for preset in SYSTEM_PRESETS {
            let settings = serde_json::to_string(&(preset.settings)())?;
            seeded += self.db.with_conn(|conn| {
                conn.execute(
                    r#"
                    INSERT OR IGNORE INTO presets
                        (id, name, description, platform, settings, is_system, usage_count, created_at)
                    VALUES (?, ?, ?, ?, ?, 1, 0, ?)
                    "#,
                    rusqlite::params![
                        ulid::Ulid::new().to_string(),
                        preset.name,
                        preset.description,
                        preset.platform.as_str(),
                        settings,
                        now,
                    ],
                )
            })?;
        }
        if seeded > 0 {
            tracing::info!(count = seeded, "Seeded system presets");
        }
        Ok(())
    }

    /// Lists presets matching `filter`
    pub fn list(&self, filter: &PresetFilter) -> CoreResult<Vec<Preset>> {
        let mut sql = format!("SELECT {PRESET_COLUMNS} FROM presets WHERE 1 = 1");
        let mut params: Vec<String> = Vec::new();

        if let Some(platform) = filter.platform {
            sql.push_str(" AND platform = ?");
            params.push(platform.as_str().to_string());
        }
        match filter.visibility {
            Visibility::All => {}
            Visibility::System => sql.push_str(" AND is_system = 1"),
            Visibility::User => sql.push_str(" AND is_system = 0"),
        }
        sql.push_str(match filter.sort {
            PresetSort::Popular => " ORDER BY usage_count DESC, name ASC",
            PresetSort::Name => " ORDER BY name COLLATE NOCASE ASC",
            PresetSort::Newest => " ORDER BY created_at DESC, name ASC",
        });

        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), PresetRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter().map(PresetRow::into_preset).collect()
    }

    /// Gets a preset by id
    pub fn get(&self, id: &str) -> CoreResult<Preset> {
        self.query_one("id", id)?
            .ok_or_else(|| CoreError::PresetNotFound(id.to_string()))
    }

    /// Gets a preset by its unique name
    pub fn get_by_name(&self, name: &str) -> CoreResult<Preset> {
        self.query_one("name", name)?
            .ok_or_else(|| CoreError::PresetNotFound(name.to_string()))
    }

    fn query_one(&self, column: &str, value: &str) -> CoreResult<Option<Preset>> {
        let sql = format!("SELECT {PRESET_COLUMNS} FROM presets WHERE {column} = ?");
        let row = self
            .db
            .with_conn(|conn| conn.query_row(&sql, [value], PresetRow::from_row).optional())?;
        row.map(PresetRow::into_preset).transpose()
    }

    /// Creates a user preset
    pub fn create(
        &self,
        name: &str,
        description: &str,
        platform: Platform,
        settings: &StyleSettings,
        created_by: Option<&str>,
    ) -> CoreResult<Preset> {
        let name = name.trim();
        let mut errors = FieldErrors::new();
        if name.is_empty() || name.chars().count() > 100 {
            errors.insert("name", "must be a non-empty string of at most 100 characters");
        } else if self.query_one("name", name)?.is_some() {
            errors.insert("name", "a preset with this name already exists");
        }
        if description.chars().count() > 500 {
            errors.insert("description", "must be at most 500 characters");
        }
        errors.into_result()?;
        validate_settings(settings)?.into_result()?;

        let preset = Preset {
            id: ulid::Ulid::new().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            platform,
            settings: settings.clone(),
            is_system: false,
            usage_count: 0,
            created_by: created_by.map(str::to_string),
            created_at: now_rfc3339(),
        };
        let settings_json = serde_json::to_string(&preset.settings)?;

        self.db.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO presets
                    (id, name, description, platform, settings, is_system, usage_count, created_by, created_at)
                VALUES (?, ?, ?, ?, ?, 0, 0, ?, ?)
                "#,
                rusqlite::params![
                    preset.id,
                    preset.name,
                    preset.description,
                    preset.platform.as_str(),
                    settings_json,
                    preset.created_by,
                    preset.created_at,
                ],
            )
        })?;

        tracing::info!(preset_id = %preset.id, name = %preset.name, "Created preset");
        Ok(preset)
    }

    /// Deletes a user preset; system presets are rejected
    pub fn delete(&self, id: &str) -> CoreResult<()> {
        let preset = self.get(id)?;
        if preset.is_system {
            return Err(CoreError::PresetImmutable(preset.id));
        }
        self.db
            .with_conn(|conn| conn.execute("DELETE FROM presets WHERE id = ? AND is_system = 0", [id]))?;
        tracing::info!(preset_id = %id, name = %preset.name, "Deleted preset");
        Ok(())
    }

    /// Atomically increments the usage counter
    pub fn increment_usage(&self, id: &str) -> CoreResult<()> {
        let updated = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE presets SET usage_count = usage_count + 1 WHERE id = ?",
                [id],
            )
        })?;
        if updated == 0 {
            return Err(CoreError::PresetNotFound(id.to_string()));
        }
        Ok(())
    }
}

/// Raw row before the settings JSON is decoded
struct PresetRow {
    id: String,
    name: String,
    description: String,
    platform: String,
    settings: String,
    is_system: bool,
    usage_count: i64,
    created_by: Option<String>,
    created_at: String,
}

impl PresetRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            platform: row.get(3)?,
            settings: row.get(4)?,
            is_system: row.get(5)?,
            usage_count: row.get(6)?,
            created_by: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_preset(self) -> CoreResult<Preset> {
        Ok(Preset {
            platform: self
                .platform
                .parse::<Platform>()
                .map_err(CoreError::Internal)?,
            settings: serde_json::from_str(&self.settings)?,
            id: self.id,
            name: self.name,
            description: self.description,
            is_system: self.is_system,
            usage_count: self.usage_count.max(0) as u64,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

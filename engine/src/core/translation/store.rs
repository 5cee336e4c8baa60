//! SQLite persistence for translation records.

use rusqlite::{params, OptionalExtension, Row};

use super::{QualityTier, TranslationRecord, TranslationStatus};
use crate::core::db::Database;
use crate::core::{CoreError, CoreResult};

const COLUMNS: &str = "id, video_id, source_language, target_language, segments, quality, status, \
     character_count, word_count, quality_score, error, created_at, updated_at";

fn parse_enum<T: std::str::FromStr<Err = String>>(idx: usize, raw: String) -> rusqlite::Result<T> {
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<TranslationRecord> {
    let segments: String = row.get(4)?;
    let segments = serde_json::from_str(&segments).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(TranslationRecord {
        id: row.get(0)?,
        video_id: row.get(1)?,
        source_language: row.get(2)?,
        target_language: row.get(3)?,
        segments,
        quality: parse_enum::<QualityTier>(5, row.get(5)?)?,
        status: parse_enum::<TranslationStatus>(6, row.get(6)?)?,
        character_count: row.get::<_, i64>(7)?.max(0) as u64,
        word_count: row.get::<_, i64>(8)?.max(0) as u64,
        quality_score: row.get::<_, Option<f64>>(9)?.map(|s| s as f32),
        error: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Inserts or replaces the record for (video, target language).
///
/// Last write wins; the row id and creation time of an existing record are
/// kept.
pub fn save_record(db: &Database, record: &TranslationRecord) -> CoreResult<TranslationRecord> {
    let segments = serde_json::to_string(&record.segments)?;
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO translations (id, video_id, source_language, target_language, segments,
                 quality, status, character_count, word_count, quality_score, error,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(video_id, target_language) DO UPDATE SET
                 source_language = excluded.source_language,
                 segments = excluded.segments,
                 quality = excluded.quality,
                 status = excluded.status,
                 character_count = excluded.character_count,
                 word_count = excluded.word_count,
                 quality_score = excluded.quality_score,
                 error = excluded.error,
                 updated_at = excluded.updated_at",
            params![
                record.id,
                record.video_id,
                record.source_language,
                record.target_language,
                segments,
                record.quality.as_str(),
                record.status.as_str(),
                record.character_count as i64,
                record.word_count as i64,
                record.quality_score.map(f64::from),
                record.error,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(())
    })?;

    load_record(db, &record.video_id, &record.target_language)?.ok_or_else(|| {
        CoreError::Internal("Translation vanished after write".to_string())
    })
}

pub fn load_record(
    db: &Database,
    video_id: &str,
    target_language: &str,
) -> CoreResult<Option<TranslationRecord>> {
    db.with_conn(|conn| {
        conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM translations WHERE video_id = ?1 AND target_language = ?2"
            ),
            [video_id, target_language],
            row_to_record,
        )
        .optional()
    })
}

/// Records for a video ordered by target language
pub fn list_records(db: &Database, video_id: &str) -> CoreResult<Vec<TranslationRecord>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM translations WHERE video_id = ? ORDER BY target_language"
        ))?;
        let rows = stmt.query_map([video_id], row_to_record)?;
        rows.collect()
    })
}

pub fn delete_record(db: &Database, video_id: &str, target_language: &str) -> CoreResult<bool> {
    let deleted = db.with_conn(|conn| {
        conn.execute(
            "DELETE FROM translations WHERE video_id = ?1 AND target_language = ?2",
            [video_id, target_language],
        )
    })?;
    Ok(deleted > 0)
}

/// Completed translation usable for rendering, if any
pub fn load_completed_record(
    db: &Database,
    video_id: &str,
    target_language: &str,
) -> CoreResult<Option<TranslationRecord>> {
    Ok(load_record(db, video_id, target_language)?
        .filter(|r| r.status == TranslationStatus::Completed))
}

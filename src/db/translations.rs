//! Tag translation cache operations.
//!
//! Lookups are cache-aside: a miss records a `has_translate = 0`
//! placeholder so untranslated tags surface for later manual review
//! instead of being re-resolved on every occurrence.

use crate::error::DatabaseError;
use crate::types::TagHint;
use crate::{Error, Result};

use super::{Database, TranslationEntry};

impl Database {
    /// Look up a tag translation, recording a placeholder on miss
    ///
    /// Returns the stored translation when one exists. On a miss, upserts
    /// a placeholder entry carrying the caller-supplied caption hint and
    /// returns `None`. The placeholder write never downgrades an entry
    /// that gained a translation in the meantime.
    pub async fn lookup_translation(
        &self,
        origin: &str,
        hint: Option<&TagHint>,
    ) -> Result<Option<String>> {
        let translation: Option<String> = sqlx::query_scalar(
            "SELECT translation FROM translations WHERE origin = ? AND has_translate = 1",
        )
        .bind(origin)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to look up translation: {}",
                e
            )))
        })?
        .flatten();

        if translation.is_some() {
            return Ok(translation);
        }

        let extra_info = match hint {
            Some(hint) if !hint.is_empty() => Some(serde_json::to_string(hint)?),
            _ => None,
        };
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO translations (origin, translation, has_translate, extra_info, created_at, updated_at)
            VALUES (?, NULL, 0, ?, ?, ?)
            ON CONFLICT(origin) DO UPDATE SET
                extra_info = COALESCE(excluded.extra_info, translations.extra_info),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(origin)
        .bind(&extra_info)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record translation placeholder: {}",
                e
            )))
        })?;

        Ok(None)
    }

    /// Insert or update a translation entry
    ///
    /// When a translation is supplied, the entry is marked translated and
    /// the translation fans out to every stored image tag with the same
    /// name. Passing `None` refreshes the placeholder hint only.
    pub async fn upsert_translation(
        &self,
        origin: &str,
        translation: Option<&str>,
        extra_info: Option<&str>,
    ) -> Result<()> {
        let has_translate: i32 = if translation.is_some() { 1 } else { 0 };
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO translations (origin, translation, has_translate, extra_info, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(origin) DO UPDATE SET
                translation = excluded.translation,
                has_translate = excluded.has_translate,
                extra_info = COALESCE(excluded.extra_info, translations.extra_info),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(origin)
        .bind(translation)
        .bind(has_translate)
        .bind(extra_info)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to upsert translation: {}",
                e
            )))
        })?;

        if let Some(translation) = translation {
            sqlx::query("UPDATE image_tags SET translation = ? WHERE name = ?")
                .bind(translation)
                .bind(origin)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to propagate translation to image tags: {}",
                        e
                    )))
                })?;
        }

        Ok(())
    }

    /// Get a translation entry by origin
    pub async fn get_translation(&self, origin: &str) -> Result<Option<TranslationEntry>> {
        let row = sqlx::query_as::<_, TranslationEntry>(
            r#"
            SELECT origin, translation, has_translate, extra_info, created_at, updated_at
            FROM translations
            WHERE origin = ?
            "#,
        )
        .bind(origin)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get translation: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List origins still waiting for a translation
    pub async fn list_untranslated(&self) -> Result<Vec<TranslationEntry>> {
        let rows = sqlx::query_as::<_, TranslationEntry>(
            r#"
            SELECT origin, translation, has_translate, extra_info, created_at, updated_at
            FROM translations
            WHERE has_translate = 0
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list untranslated entries: {}",
                e
            )))
        })?;

        Ok(rows)
    }
}

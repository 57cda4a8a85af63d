//! Shared deny-list operations.
//!
//! The ban list and forbidden-word list are maintained by the
//! surrounding system (operator tooling, discovery job) and consulted
//! by the ingestion pipeline before any page is fetched.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::Database;

impl Database {
    /// Check whether an author is on the ban list
    pub async fn is_author_banned(&self, author_id: &str) -> Result<bool> {
        let exists: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM banned_authors WHERE author_id = ?)")
                .bind(author_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to check banned author: {}",
                        e
                    )))
                })?;

        Ok(exists != 0)
    }

    /// Add an author to the ban list
    pub async fn ban_author(&self, author_id: &str, reason: Option<&str>) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO banned_authors (author_id, reason, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(author_id) DO UPDATE SET reason = excluded.reason
            "#,
        )
        .bind(author_id)
        .bind(reason)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to ban author: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// List every forbidden word
    pub async fn forbidden_words(&self) -> Result<Vec<String>> {
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT word FROM forbidden_words ORDER BY word ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to list forbidden words: {}",
                        e
                    )))
                })?;

        Ok(rows)
    }

    /// Add a word to the forbidden list
    pub async fn add_forbidden_word(&self, word: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO forbidden_words (word, created_at)
            VALUES (?, ?)
            ON CONFLICT(word) DO NOTHING
            "#,
        )
        .bind(word)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to add forbidden word: {}",
                e
            )))
        })?;

        Ok(())
    }
}

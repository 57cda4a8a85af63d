//! Database layer for pixiv-ingest
//!
//! Handles SQLite persistence for ingestion tasks, tag translations, image
//! records, and moderation lists.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`tasks`] — Task lifecycle queries (poll, mark, idempotent insert)
//! - [`translations`] — Tag translation cache-aside persistence
//! - [`images`] — Image record upserts, dedup lookups, tag fan-out
//! - [`moderation`] — Ban-list and forbidden-word queries

use crate::types::{TaskId, TaskStatus};
use sqlx::{FromRow, sqlite::SqlitePool};

mod images;
mod migrations;
mod moderation;
mod tasks;
mod translations;

/// Ingestion task record from database
#[derive(Debug, Clone, FromRow)]
pub struct DownloadTask {
    /// Unique database ID
    pub id: TaskId,
    /// The illustration this task ingests (natural key, unique)
    pub illust_id: String,
    /// Current status (0=pending, 1=running, 2=fail, 3=dead, 4=success)
    pub status: i32,
    /// Run attempts so far; only ever increases
    pub retry_count: i32,
    /// Unix timestamp of the most recent run start
    pub last_run_at: Option<i64>,
    /// Error message from the most recent failed run
    pub last_run_error: Option<String>,
    /// Unix timestamp when the task was created
    pub created_at: i64,
    /// Unix timestamp of the last status change
    pub updated_at: i64,
}

impl DownloadTask {
    /// Decode the status column
    pub fn task_status(&self) -> TaskStatus {
        TaskStatus::from_i32(self.status)
    }
}

/// Tag translation record from database
#[derive(Debug, Clone, FromRow)]
pub struct TranslationEntry {
    /// Source-language tag text (unique key)
    pub origin: String,
    /// The translation, when one exists
    pub translation: Option<String>,
    /// Whether a translation exists (0 = placeholder, 1 = translated)
    pub has_translate: i32,
    /// JSON hints captured when the placeholder was written
    pub extra_info: Option<String>,
    /// Unix timestamp when the entry was first written
    pub created_at: i64,
    /// Unix timestamp of the last upsert
    pub updated_at: i64,
}

impl TranslationEntry {
    /// Whether this entry carries a usable translation
    pub fn is_translated(&self) -> bool {
        self.has_translate != 0 && self.translation.is_some()
    }
}

/// New image record to be upserted into the database
#[derive(Debug, Clone)]
pub struct NewImage {
    /// Dedup key derived from the page URL tail (unique)
    pub pixiv_addr: String,
    /// The illustration this page belongs to
    pub illust_id: String,
    /// Display name of the author
    pub author: String,
    /// The author's account identifier
    pub author_id: String,
    /// Work title
    pub title: String,
    /// False when the work carries an adult-content marker
    pub visible: bool,
    /// Resolved tags in listing order
    pub tags: Vec<NewImageTag>,
}

/// One resolved tag attached to a [`NewImage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImageTag {
    /// Source-language tag text
    pub name: String,
    /// Translation from the cache, when one exists
    pub translation: Option<String>,
    /// False when the tag itself is an adult-content marker
    pub visible: bool,
}

/// Image record from database
#[derive(Debug, Clone, FromRow)]
pub struct ImageRecord {
    /// Dedup key derived from the page URL tail (unique)
    pub pixiv_addr: String,
    /// The illustration this page belongs to
    pub illust_id: String,
    /// Display name of the author
    pub author: String,
    /// The author's account identifier
    pub author_id: String,
    /// Work title
    pub title: String,
    /// Whether the work may be shown (0 = restricted, 1 = visible)
    pub visible: i32,
    /// Whether the page still needs its bytes fetched (0 = no, 1 = yes)
    pub need_download: i32,
    /// Reference to the stored file, filled in by the storage collaborator
    pub stored_file: Option<String>,
    /// Soft-delete flag (0 = live, 1 = deleted)
    pub del_flag: i32,
    /// Unix timestamp when the record was first written
    pub created_at: i64,
    /// Unix timestamp of the last upsert
    pub updated_at: i64,
}

impl ImageRecord {
    /// Whether the page's bytes are already persisted out-of-band
    pub fn is_stored(&self) -> bool {
        self.stored_file.as_deref().is_some_and(|f| !f.is_empty())
    }
}

/// Image tag record from database
#[derive(Debug, Clone, FromRow)]
pub struct ImageTag {
    /// The owning image's dedup key
    pub pixiv_addr: String,
    /// Zero-based position in the gallery's listing order
    pub position: i32,
    /// Source-language tag text
    pub name: String,
    /// Translation, when the cache has one
    pub translation: Option<String>,
    /// Whether the tag may be shown (0 = restricted marker, 1 = visible)
    pub visible: i32,
}

/// Database handle for pixiv-ingest
pub struct Database {
    pool: SqlitePool,
}

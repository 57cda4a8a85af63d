//! Core types for pixiv-ingest

use serde::{Deserialize, Serialize};

/// Unique identifier for an ingestion task
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for TaskId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<TaskId> for i64 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl PartialEq<i64> for TaskId {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl PartialEq<TaskId> for i64 {
    fn eq(&self, other: &TaskId) -> bool {
        *self == other.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for TaskId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Ingestion task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting for its first run
    Pending,
    /// Currently being processed by the worker
    Running,
    /// Failed with retries remaining (re-enters the pollable pool)
    Fail,
    /// Failed with retries exhausted (terminal, never polled again)
    Dead,
    /// Fully processed (terminal)
    Success,
}

impl TaskStatus {
    /// Convert integer status code to TaskStatus enum
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => TaskStatus::Pending,
            1 => TaskStatus::Running,
            2 => TaskStatus::Fail,
            3 => TaskStatus::Dead,
            4 => TaskStatus::Success,
            _ => TaskStatus::Fail, // Default to Fail for unknown status
        }
    }

    /// Convert TaskStatus enum to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Running => 1,
            TaskStatus::Fail => 2,
            TaskStatus::Dead => 3,
            TaskStatus::Success => 4,
        }
    }

    /// Whether the poll query may hand a task in this status to the worker
    pub fn is_pollable(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Fail)
    }

    /// Whether this status ends the task's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Dead | TaskStatus::Success)
    }
}

/// Kind of work as reported by the gallery metadata endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IllustKind {
    /// Single or multi-page still illustration
    Illust,
    /// Manga-flagged still illustration set
    Manga,
    /// Animated work (frame archive; not ingestable as pages)
    Ugoira,
}

impl IllustKind {
    /// Convert the gallery's integer type code to IllustKind
    pub fn from_i32(kind: i32) -> Self {
        match kind {
            0 => IllustKind::Illust,
            1 => IllustKind::Manga,
            2 => IllustKind::Ugoira,
            _ => IllustKind::Illust, // Unknown codes are treated as plain illustrations
        }
    }

    /// Convert IllustKind to the gallery's integer type code
    pub fn to_i32(&self) -> i32 {
        match self {
            IllustKind::Illust => 0,
            IllustKind::Manga => 1,
            IllustKind::Ugoira => 2,
        }
    }

    /// Whether this kind is an animated format that the pipeline skips
    pub fn is_animated(&self) -> bool {
        matches!(self, IllustKind::Ugoira)
    }
}

/// One tag as reported by the gallery metadata endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IllustTag {
    /// Source-language tag text
    pub name: String,

    /// Gallery-provided translation, if the gallery has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated: Option<String>,

    /// Gallery-provided romanization, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub romaji: Option<String>,
}

impl IllustTag {
    /// Caption hint for the translation cache placeholder
    pub fn hint(&self) -> TagHint {
        TagHint {
            en: self.translated.clone(),
            romaji: self.romaji.clone(),
        }
    }
}

/// Source-language hints stored alongside a still-untranslated tag
///
/// Persisted as the `extra_info` JSON of a placeholder translation entry so a
/// later manual translation pass has the gallery's own captions to work from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagHint {
    /// Gallery-provided English caption, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub en: Option<String>,

    /// Gallery-provided romanization, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub romaji: Option<String>,
}

impl TagHint {
    /// True when neither hint is present
    pub fn is_empty(&self) -> bool {
        self.en.is_none() && self.romaji.is_none()
    }
}

/// Illustration metadata fetched from the gallery
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IllustMetadata {
    /// The illustration's natural key
    pub illust_id: String,

    /// Display name of the author
    pub author: String,

    /// The author's account identifier
    pub author_id: String,

    /// Work title
    pub title: String,

    /// Kind of work (still, manga, animated)
    pub kind: IllustKind,

    /// Tags in gallery listing order
    pub tags: Vec<IllustTag>,
}

/// One page of an illustration as reported by the pages endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IllustPage {
    /// Original-resolution URL; its tail segment is the dedup key
    pub url_original: String,
}

/// How a pipeline run ended
///
/// Policy skips complete the task as Success with no downloads; only returned
/// errors count as failures for retry bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// Pages were examined and persisted
    Ingested {
        /// Pages considered after truncation
        pages_total: usize,
        /// Pages whose records were written this run
        pages_stored: usize,
        /// Pages skipped (already stored, or fetch failed)
        pages_skipped: usize,
    },

    /// Animated work, nothing to ingest
    SkippedAnimated,

    /// Author is on the shared ban list
    SkippedBannedAuthor,

    /// A tag matched the shared forbidden-word list
    SkippedForbiddenTag {
        /// The word that matched
        word: String,
    },
}

impl IngestOutcome {
    /// Whether this outcome was a policy skip rather than an ingestion
    pub fn is_skip(&self) -> bool {
        !matches!(self, IngestOutcome::Ingested { .. })
    }
}

/// Counts of tasks per status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    /// Tasks waiting for a first run
    pub pending: usize,

    /// Tasks currently marked running
    pub running: usize,

    /// Tasks that failed with retries remaining
    pub fail: usize,

    /// Tasks that exhausted their retries
    pub dead: usize,

    /// Tasks fully processed
    pub success: usize,
}

impl TaskStats {
    /// Total number of tasks across all statuses
    pub fn total(&self) -> usize {
        self.pending + self.running + self.fail + self.dead + self.success
    }

    /// Number of tasks the poll query would consider
    pub fn pollable(&self) -> usize {
        self.pending + self.fail
    }
}

/// Event emitted during the ingestion lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A task was picked up and is about to run
    TaskStarted {
        /// Task ID
        id: TaskId,
        /// The illustration being ingested
        illust_id: String,
    },

    /// A task completed successfully
    TaskSucceeded {
        /// Task ID
        id: TaskId,
        /// The illustration that was ingested
        illust_id: String,
        /// How the run ended (ingested or policy skip)
        outcome: IngestOutcome,
    },

    /// A task failed with retries remaining
    TaskFailed {
        /// Task ID
        id: TaskId,
        /// The illustration that failed
        illust_id: String,
        /// Error message
        error: String,
        /// Run attempts so far
        retry_count: i32,
    },

    /// A task failed with retries exhausted
    TaskDead {
        /// Task ID
        id: TaskId,
        /// The illustration that failed
        illust_id: String,
        /// Error message from the final attempt
        error: String,
    },

    /// A page record was written
    PageStored {
        /// The owning illustration
        illust_id: String,
        /// The page's dedup key
        pixiv_addr: String,
    },

    /// A page was skipped (already stored, or its fetch failed)
    PageSkipped {
        /// The owning illustration
        illust_id: String,
        /// The page's dedup key
        pixiv_addr: String,
        /// Why the page was skipped
        reason: String,
    },

    /// The rate throttle tripped and spent a cooldown window
    ThrottleCooldown {
        /// Calls made in the window that just closed
        calls_made: u32,
    },

    /// The worker loop exited
    WorkerStopped,
}

//! Error types for pixiv-ingest
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Gallery, Database, Config)
//! - Nested detail enums carrying context (illust id, page URL, query text)
//! - Conversions from the underlying driver errors (sqlx, reqwest, serde_json)
//!
//! Policy skips (banned author, forbidden tag, animated work) are not errors;
//! they surface as [`crate::types::IngestOutcome`] variants instead.

use thiserror::Error;

/// Result type alias for pixiv-ingest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pixiv-ingest
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "throttle.max_calls")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Upstream gallery error
    #[error("gallery error: {0}")]
    Gallery(#[from] GalleryError),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Upstream gallery errors
#[derive(Debug, Error)]
pub enum GalleryError {
    /// The gallery endpoint answered with its error envelope
    #[error("endpoint rejected illust {illust_id}: {message}")]
    Endpoint {
        /// The illustration the request was about
        illust_id: String,
        /// The message field of the error envelope
        message: String,
    },

    /// A page fetch came back with a non-success status
    #[error("page fetch for {url} returned status {status}")]
    PageFetch {
        /// The page URL that was requested
        url: String,
        /// The HTTP status code received
        status: u16,
    },

    /// A page URL could not be parsed into a dedup key
    #[error("page url has no usable tail segment: {url}")]
    InvalidPageUrl {
        /// The offending URL
        url: String,
    },
}

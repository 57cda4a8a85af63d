//! Per-task ingestion pipeline.
//!
//! One [`IngestionPipeline::run`] call takes an illustration through metadata
//! fetch, content policy checks, page listing, tag translation resolution, and
//! a bounded concurrent walk over its pages, ending in an [`IngestOutcome`].
//! Policy skips (animated work, banned author, forbidden tag) complete as
//! successes with nothing downloaded; only infrastructure failures return
//! errors and feed the task's retry bookkeeping.

use crate::cache::MetadataCache;
use crate::config::{Config, PipelineConfig};
use crate::db::{Database, NewImage, NewImageTag};
use crate::error::{GalleryError, Result};
use crate::pool;
use crate::source::{GallerySource, ModerationList};
use crate::types::{Event, IllustMetadata, IngestOutcome};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

mod filters;

/// How a single page ended up after the per-page walk
enum PageOutcome {
    /// A record was written for this page
    Stored,
    /// The page was skipped (already stored, unusable URL, or fetch failed)
    Skipped,
}

/// Drives one illustration from metadata to persisted page records
pub struct IngestionPipeline {
    db: Arc<Database>,
    source: Arc<dyn GallerySource>,
    moderation: Arc<dyn ModerationList>,
    metadata_cache: MetadataCache<IllustMetadata>,
    config: PipelineConfig,
    event_tx: broadcast::Sender<Event>,
}

impl IngestionPipeline {
    /// Create a pipeline over the given collaborators.
    ///
    /// Pulls its page concurrency, truncation, and pacing settings from
    /// `config.pipeline` and the metadata TTL from `config.cache`.
    pub fn new(
        db: Arc<Database>,
        source: Arc<dyn GallerySource>,
        moderation: Arc<dyn ModerationList>,
        config: &Config,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            db,
            source,
            moderation,
            metadata_cache: MetadataCache::new(config.cache.metadata_ttl),
            config: config.pipeline.clone(),
            event_tx,
        }
    }

    /// Ingest one illustration end to end.
    ///
    /// The steps, in order:
    /// 1. Fetch metadata through the in-memory cache.
    /// 2. Skip animated works (success, nothing to ingest).
    /// 3. Skip banned authors and forbidden-word tag matches; note whether an
    ///    adult-content marker restricts visibility.
    /// 4. Fetch the page list and truncate long sets.
    /// 5. Resolve the tag set through the translation cache.
    /// 6. Walk every page under the concurrency cap: dedup check, pacing
    ///    delay, proxied fetch, record upsert.
    ///
    /// A failing page fetch skips that page only. Metadata, page-list, and
    /// database failures abort the run and are returned to the caller.
    pub async fn run(&self, illust_id: &str) -> Result<IngestOutcome> {
        let metadata = self
            .metadata_cache
            .get_or_fetch(illust_id, || async {
                self.source.illust_metadata(illust_id).await
            })
            .await?;

        if metadata.kind.is_animated() {
            info!(illust_id = %illust_id, kind = ?metadata.kind, "Animated work, nothing to ingest");
            return Ok(IngestOutcome::SkippedAnimated);
        }

        if self.moderation.is_author_banned(&metadata.author_id).await? {
            info!(
                illust_id = %illust_id,
                author_id = %metadata.author_id,
                "Author is on the ban list, skipping"
            );
            return Ok(IngestOutcome::SkippedBannedAuthor);
        }

        let words = self.moderation.forbidden_words().await?;
        if let Some(word) = filters::find_forbidden_word(&metadata.tags, &words) {
            info!(illust_id = %illust_id, word = %word, "Tag matched a forbidden word, skipping");
            return Ok(IngestOutcome::SkippedForbiddenTag { word: word.clone() });
        }

        let restricted = metadata
            .tags
            .iter()
            .any(|tag| filters::is_restriction_marker(&tag.name));

        let mut pages = self.source.illust_pages(illust_id).await?;
        if pages.len() > self.config.max_pages {
            debug!(
                illust_id = %illust_id,
                listed = pages.len(),
                kept = self.config.max_pages,
                "Truncating long page list"
            );
            pages.truncate(self.config.max_pages);
        }

        let tags = self.resolve_tags(&metadata).await?;

        let units: Vec<_> = pages
            .iter()
            .map(|page| self.ingest_page(&metadata, !restricted, &tags, &page.url_original))
            .collect();
        let results = pool::run_bounded(self.config.page_concurrency, units).await;

        let mut pages_stored = 0;
        let mut pages_skipped = 0;
        for result in results {
            match result? {
                PageOutcome::Stored => pages_stored += 1,
                PageOutcome::Skipped => pages_skipped += 1,
            }
        }

        info!(
            illust_id = %illust_id,
            pages_total = pages.len(),
            pages_stored,
            pages_skipped,
            "Illustration ingested"
        );

        Ok(IngestOutcome::Ingested {
            pages_total: pages.len(),
            pages_stored,
            pages_skipped,
        })
    }

    /// Drop expired metadata cache entries.
    ///
    /// Called by the worker between tasks; expired entries are also dropped
    /// lazily on access.
    pub async fn purge_metadata_cache(&self) {
        self.metadata_cache.purge_expired().await;
    }

    /// Resolve the persistable tag set for an illustration.
    ///
    /// Noise tags are dropped. Every remaining tag goes through the persisted
    /// translation cache; a miss records a placeholder carrying the gallery's
    /// own captions as hints and leaves the tag untranslated for now.
    /// Adult-content marker tags stay in the set but are flagged invisible.
    async fn resolve_tags(&self, metadata: &IllustMetadata) -> Result<Vec<NewImageTag>> {
        let mut tags = Vec::with_capacity(metadata.tags.len());
        for tag in &metadata.tags {
            if filters::is_noise_tag(&tag.name) {
                debug!(tag = %tag.name, "Dropping noise tag");
                continue;
            }

            let hint = tag.hint();
            let translation = self.db.lookup_translation(&tag.name, Some(&hint)).await?;
            tags.push(NewImageTag {
                name: tag.name.clone(),
                translation,
                visible: !filters::is_restriction_marker(&tag.name),
            });
        }
        Ok(tags)
    }

    /// Walk a single page: dedup check, pacing delay, proxied fetch, upsert.
    ///
    /// Fetch failures and unusable URLs skip the page and report it through
    /// the event channel; database failures propagate and fail the task.
    async fn ingest_page(
        &self,
        metadata: &IllustMetadata,
        visible: bool,
        tags: &[NewImageTag],
        url: &str,
    ) -> Result<PageOutcome> {
        let illust_id = metadata.illust_id.as_str();

        let pixiv_addr = match page_addr(url) {
            Ok(addr) => addr,
            Err(e) => {
                warn!(illust_id, url = %url, error = %e, "Skipping page with unusable URL");
                return Ok(PageOutcome::Skipped);
            }
        };

        if self.db.image_is_stored(&pixiv_addr).await? {
            debug!(illust_id, pixiv_addr = %pixiv_addr, "Page already stored, skipping");
            self.emit_event(Event::PageSkipped {
                illust_id: illust_id.to_string(),
                pixiv_addr,
                reason: "already stored".to_string(),
            });
            return Ok(PageOutcome::Skipped);
        }

        // Upstream pacing: every page fetch is preceded by a fixed delay
        tokio::time::sleep(self.config.page_delay).await;

        if let Err(e) = self.source.fetch_page(url).await {
            warn!(illust_id, pixiv_addr = %pixiv_addr, error = %e, "Page fetch failed, skipping page");
            self.emit_event(Event::PageSkipped {
                illust_id: illust_id.to_string(),
                pixiv_addr,
                reason: e.to_string(),
            });
            return Ok(PageOutcome::Skipped);
        }

        let image = NewImage {
            pixiv_addr: pixiv_addr.clone(),
            illust_id: illust_id.to_string(),
            author: metadata.author.clone(),
            author_id: metadata.author_id.clone(),
            title: metadata.title.clone(),
            visible,
            tags: tags.to_vec(),
        };
        self.db.upsert_image(&image).await?;

        debug!(illust_id, pixiv_addr = %pixiv_addr, "Page record written");
        self.emit_event(Event::PageStored {
            illust_id: illust_id.to_string(),
            pixiv_addr,
        });
        Ok(PageOutcome::Stored)
    }

    /// Emit an event to all subscribers.
    ///
    /// send() errs when no receivers are subscribed; the event is dropped.
    fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

/// Derive the dedup key for a page from its original-resolution URL.
///
/// The key is the final path segment, e.g. `98765_p0.png` for
/// `https://i.pximg.net/img-original/img/.../98765_p0.png`.
/// The same page always derives the same key, so re-running an illustration
/// cannot duplicate records.
fn page_addr(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|_| GalleryError::InvalidPageUrl {
        url: url.to_string(),
    })?;
    let addr = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| GalleryError::InvalidPageUrl {
            url: url.to_string(),
        })?;
    Ok(addr.to_string())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

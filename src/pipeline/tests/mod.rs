use super::*;
use crate::error::Error;
use crate::types::{IllustKind, IllustPage, IllustTag};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

/// Gallery stub with canned responses and call instrumentation.
struct MockGallery {
    metadata: IllustMetadata,
    pages: Vec<IllustPage>,
    metadata_calls: AtomicUsize,
    pages_calls: AtomicUsize,
    fetched: Mutex<Vec<String>>,
    /// Fail `fetch_page` for URLs containing this marker
    fail_fetch_marker: Option<String>,
    /// Fail `illust_pages` outright
    fail_page_list: bool,
}

impl MockGallery {
    fn new(metadata: IllustMetadata, pages: Vec<IllustPage>) -> Self {
        Self {
            metadata,
            pages,
            metadata_calls: AtomicUsize::new(0),
            pages_calls: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::new()),
            fail_fetch_marker: None,
            fail_page_list: false,
        }
    }

    async fn fetched_urls(&self) -> Vec<String> {
        self.fetched.lock().await.clone()
    }
}

#[async_trait]
impl GallerySource for MockGallery {
    async fn illust_metadata(&self, _illust_id: &str) -> Result<IllustMetadata> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.metadata.clone())
    }

    async fn illust_pages(&self, illust_id: &str) -> Result<Vec<IllustPage>> {
        self.pages_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_page_list {
            return Err(GalleryError::Endpoint {
                illust_id: illust_id.to_string(),
                message: "page list unavailable".to_string(),
            }
            .into());
        }
        Ok(self.pages.clone())
    }

    async fn fetch_page(&self, url: &str) -> Result<()> {
        if let Some(marker) = &self.fail_fetch_marker
            && url.contains(marker)
        {
            return Err(GalleryError::PageFetch {
                url: url.to_string(),
                status: 503,
            }
            .into());
        }
        self.fetched.lock().await.push(url.to_string());
        Ok(())
    }
}

struct TestHarness {
    _db_file: NamedTempFile,
    db: Arc<Database>,
    gallery: Arc<MockGallery>,
    pipeline: IngestionPipeline,
    events: broadcast::Receiver<Event>,
}

fn test_config() -> Config {
    let mut config = Config::default();
    // No pacing delay in unit tests
    config.pipeline.page_delay = Duration::ZERO;
    config
}

/// Build a pipeline over a temp database, the given gallery stub, and the
/// database itself as the moderation list.
async fn setup(gallery: MockGallery) -> TestHarness {
    let file = NamedTempFile::new().expect("Failed to create temp file");
    let db = Arc::new(
        Database::new(file.path())
            .await
            .expect("Failed to create database"),
    );
    let gallery = Arc::new(gallery);
    let (event_tx, events) = broadcast::channel(64);

    let pipeline = IngestionPipeline::new(
        Arc::clone(&db),
        Arc::clone(&gallery) as Arc<dyn GallerySource>,
        Arc::clone(&db) as Arc<dyn ModerationList>,
        &test_config(),
        event_tx,
    );

    TestHarness {
        _db_file: file,
        db,
        gallery,
        pipeline,
        events,
    }
}

fn sample_metadata(illust_id: &str) -> IllustMetadata {
    IllustMetadata {
        illust_id: illust_id.to_string(),
        author: "空野カゼハ".to_string(),
        author_id: "44123".to_string(),
        title: "夏の終わり".to_string(),
        kind: IllustKind::Illust,
        tags: vec![
            IllustTag {
                name: "風景".to_string(),
                translated: Some("landscape".to_string()),
                romaji: Some("fuukei".to_string()),
            },
            IllustTag {
                name: "オリジナル".to_string(),
                translated: None,
                romaji: None,
            },
        ],
    }
}

fn page(name: &str) -> IllustPage {
    IllustPage {
        url_original: format!("https://i.example.net/img-original/img/2026/08/01/{name}"),
    }
}

// ---------------------------------------------------------------------------
// Dedup key derivation
// ---------------------------------------------------------------------------

#[test]
fn test_page_addr_is_the_url_tail_segment() {
    let addr =
        page_addr("https://i.example.net/img-original/img/2026/08/01/98765_p0.png").unwrap();
    assert_eq!(addr, "98765_p0.png");
}

#[test]
fn test_page_addr_ignores_query_string() {
    let addr = page_addr("https://i.example.net/img/98765_p0.png?version=2").unwrap();
    assert_eq!(addr, "98765_p0.png");
}

#[test]
fn test_page_addr_rejects_url_without_tail() {
    let err = page_addr("https://i.example.net/").unwrap_err();
    assert!(matches!(
        err,
        Error::Gallery(GalleryError::InvalidPageUrl { .. })
    ));
}

#[test]
fn test_page_addr_rejects_garbage() {
    assert!(page_addr("not a url").is_err());
}

// ---------------------------------------------------------------------------
// Full runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_run_ingests_every_page() {
    let gallery = MockGallery::new(
        sample_metadata("9001"),
        vec![
            page("9001_p0.png"),
            page("9001_p1.png"),
            page("9001_p2.png"),
        ],
    );
    let mut h = setup(gallery).await;

    let outcome = h.pipeline.run("9001").await.unwrap();
    assert_eq!(
        outcome,
        IngestOutcome::Ingested {
            pages_total: 3,
            pages_stored: 3,
            pages_skipped: 0,
        }
    );

    let records = h.db.list_images_for_illust("9001").await.unwrap();
    assert_eq!(records.len(), 3);

    let first = h.db.find_image("9001_p0.png").await.unwrap().unwrap();
    assert_eq!(first.author, "空野カゼハ");
    assert_eq!(first.title, "夏の終わり");
    assert_eq!(first.visible, 1);
    assert_eq!(first.need_download, 1, "fresh records await their bytes");
    assert!(first.stored_file.is_none());

    let tags = h.db.list_image_tags("9001_p0.png").await.unwrap();
    assert_eq!(tags.len(), 2);
    assert_eq!(tags[0].name, "風景");
    assert_eq!(tags[0].translation, None, "no stored translation yet");

    // Every page announced itself on the event channel
    let mut stored = Vec::new();
    while let Ok(event) = h.events.try_recv() {
        if let Event::PageStored { pixiv_addr, .. } = event {
            stored.push(pixiv_addr);
        }
    }
    stored.sort();
    assert_eq!(stored, vec!["9001_p0.png", "9001_p1.png", "9001_p2.png"]);
}

#[tokio::test]
async fn test_run_records_translation_placeholders_with_hints() {
    let gallery = MockGallery::new(sample_metadata("9002"), vec![page("9002_p0.png")]);
    let h = setup(gallery).await;

    h.pipeline.run("9002").await.unwrap();

    let placeholder = h.db.get_translation("風景").await.unwrap().unwrap();
    assert_eq!(placeholder.has_translate, 0);
    let extra = placeholder.extra_info.unwrap();
    assert!(
        extra.contains("landscape") && extra.contains("fuukei"),
        "gallery captions should be captured as hints: {extra}"
    );

    let bare = h.db.get_translation("オリジナル").await.unwrap().unwrap();
    assert_eq!(
        bare.extra_info, None,
        "a tag without gallery captions stores no hint"
    );
}

#[tokio::test]
async fn test_stored_translation_lands_on_new_tags() {
    let gallery = MockGallery::new(sample_metadata("9003"), vec![page("9003_p0.png")]);
    let h = setup(gallery).await;

    h.db
        .upsert_translation("風景", Some("landscape"), None)
        .await
        .unwrap();

    h.pipeline.run("9003").await.unwrap();

    let tags = h.db.list_image_tags("9003_p0.png").await.unwrap();
    assert_eq!(tags[0].translation.as_deref(), Some("landscape"));
}

// ---------------------------------------------------------------------------
// Policy skips
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_animated_work_is_skipped_before_page_listing() {
    let mut metadata = sample_metadata("9010");
    metadata.kind = IllustKind::Ugoira;
    let gallery = MockGallery::new(metadata, vec![page("9010_p0.png")]);
    let h = setup(gallery).await;

    let outcome = h.pipeline.run("9010").await.unwrap();
    assert_eq!(outcome, IngestOutcome::SkippedAnimated);
    assert!(outcome.is_skip());

    assert_eq!(h.gallery.pages_calls.load(Ordering::SeqCst), 0);
    assert!(h.db.list_images_for_illust("9010").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_banned_author_is_skipped() {
    let gallery = MockGallery::new(sample_metadata("9011"), vec![page("9011_p0.png")]);
    let h = setup(gallery).await;

    h.db.ban_author("44123", Some("repeat dmca")).await.unwrap();

    let outcome = h.pipeline.run("9011").await.unwrap();
    assert_eq!(outcome, IngestOutcome::SkippedBannedAuthor);
    assert_eq!(h.gallery.pages_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_forbidden_word_in_translation_skips_illust() {
    let gallery = MockGallery::new(sample_metadata("9012"), vec![page("9012_p0.png")]);
    let h = setup(gallery).await;

    h.db.add_forbidden_word("landscape").await.unwrap();

    let outcome = h.pipeline.run("9012").await.unwrap();
    assert_eq!(
        outcome,
        IngestOutcome::SkippedForbiddenTag {
            word: "landscape".to_string(),
        }
    );
    assert!(h.gallery.fetched_urls().await.is_empty());
}

#[tokio::test]
async fn test_restriction_marker_restricts_visibility_without_skipping() {
    let mut metadata = sample_metadata("9013");
    metadata.tags.push(IllustTag {
        name: "R-18".to_string(),
        translated: None,
        romaji: None,
    });
    let gallery = MockGallery::new(metadata, vec![page("9013_p0.png")]);
    let h = setup(gallery).await;

    let outcome = h.pipeline.run("9013").await.unwrap();
    assert!(!outcome.is_skip(), "the marker restricts, it does not reject");

    let record = h.db.find_image("9013_p0.png").await.unwrap().unwrap();
    assert_eq!(record.visible, 0);

    let tags = h.db.list_image_tags("9013_p0.png").await.unwrap();
    let marker = tags.iter().find(|t| t.name == "R-18").unwrap();
    assert_eq!(marker.visible, 0, "the marker tag itself is hidden");
    let landscape = tags.iter().find(|t| t.name == "風景").unwrap();
    assert_eq!(landscape.visible, 1, "ordinary tags stay visible");
}

#[tokio::test]
async fn test_noise_tags_are_dropped_from_the_tag_set() {
    let mut metadata = sample_metadata("9014");
    metadata.tags.push(IllustTag {
        name: "500users入り".to_string(),
        translated: None,
        romaji: None,
    });
    let gallery = MockGallery::new(metadata, vec![page("9014_p0.png")]);
    let h = setup(gallery).await;

    h.pipeline.run("9014").await.unwrap();

    let tags = h.db.list_image_tags("9014_p0.png").await.unwrap();
    assert!(tags.iter().all(|t| t.name != "500users入り"));
    assert!(
        h.db.get_translation("500users入り").await.unwrap().is_none(),
        "noise tags never reach the translation cache"
    );
}

// ---------------------------------------------------------------------------
// Per-page failure isolation and dedup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_page_fetch_failure_skips_that_page_only() {
    let mut gallery = MockGallery::new(
        sample_metadata("9020"),
        vec![
            page("9020_p0.png"),
            page("9020_p1.png"),
            page("9020_p2.png"),
        ],
    );
    gallery.fail_fetch_marker = Some("_p1".to_string());
    let mut h = setup(gallery).await;

    let outcome = h.pipeline.run("9020").await.unwrap();
    assert_eq!(
        outcome,
        IngestOutcome::Ingested {
            pages_total: 3,
            pages_stored: 2,
            pages_skipped: 1,
        }
    );

    assert!(h.db.find_image("9020_p1.png").await.unwrap().is_none());
    assert!(h.db.find_image("9020_p0.png").await.unwrap().is_some());

    let mut skipped = Vec::new();
    while let Ok(event) = h.events.try_recv() {
        if let Event::PageSkipped {
            pixiv_addr, reason, ..
        } = event
        {
            skipped.push((pixiv_addr, reason));
        }
    }
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].0, "9020_p1.png");
    assert!(skipped[0].1.contains("503"), "reason: {}", skipped[0].1);
}

#[tokio::test]
async fn test_unusable_page_url_is_skipped() {
    let gallery = MockGallery::new(
        sample_metadata("9021"),
        vec![IllustPage {
            url_original: "https://i.example.net/".to_string(),
        }],
    );
    let h = setup(gallery).await;

    let outcome = h.pipeline.run("9021").await.unwrap();
    assert_eq!(
        outcome,
        IngestOutcome::Ingested {
            pages_total: 1,
            pages_stored: 0,
            pages_skipped: 1,
        }
    );
    assert!(
        h.gallery.fetched_urls().await.is_empty(),
        "a page without a dedup key is never fetched"
    );
}

#[tokio::test]
async fn test_rerun_skips_pages_with_stored_bytes() {
    let gallery = MockGallery::new(sample_metadata("9022"), vec![page("9022_p0.png")]);
    let h = setup(gallery).await;

    let first = h.pipeline.run("9022").await.unwrap();
    assert_eq!(
        first,
        IngestOutcome::Ingested {
            pages_total: 1,
            pages_stored: 1,
            pages_skipped: 0,
        }
    );

    // The storage collaborator persists the bytes out-of-band
    h.db
        .set_stored_file("9022_p0.png", "blobs/9022_p0.png")
        .await
        .unwrap();

    let second = h.pipeline.run("9022").await.unwrap();
    assert_eq!(
        second,
        IngestOutcome::Ingested {
            pages_total: 1,
            pages_stored: 0,
            pages_skipped: 1,
        }
    );

    assert_eq!(h.db.list_images_for_illust("9022").await.unwrap().len(), 1);
    assert_eq!(
        h.gallery.fetched_urls().await.len(),
        1,
        "the stored page is not fetched again"
    );
}

#[tokio::test]
async fn test_rerun_without_stored_bytes_refetches() {
    let gallery = MockGallery::new(sample_metadata("9023"), vec![page("9023_p0.png")]);
    let h = setup(gallery).await;

    h.pipeline.run("9023").await.unwrap();
    let second = h.pipeline.run("9023").await.unwrap();

    assert_eq!(
        second,
        IngestOutcome::Ingested {
            pages_total: 1,
            pages_stored: 1,
            pages_skipped: 0,
        }
    );
    assert_eq!(
        h.gallery.fetched_urls().await.len(),
        2,
        "a record without stored bytes is fetched again"
    );
    assert_eq!(
        h.db.list_images_for_illust("9023").await.unwrap().len(),
        1,
        "the rerun upserts the same record"
    );
}

// ---------------------------------------------------------------------------
// Truncation, caching, task-level failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_long_page_list_is_truncated_to_the_lead_pages() {
    let pages: Vec<IllustPage> = (0..35).map(|i| page(&format!("9030_p{i}.png"))).collect();
    let gallery = MockGallery::new(sample_metadata("9030"), pages);
    let h = setup(gallery).await;

    let outcome = h.pipeline.run("9030").await.unwrap();
    assert_eq!(
        outcome,
        IngestOutcome::Ingested {
            pages_total: 20,
            pages_stored: 20,
            pages_skipped: 0,
        }
    );

    let mut fetched = h.gallery.fetched_urls().await;
    fetched.sort();
    let mut expected: Vec<String> = (0..20)
        .map(|i| page(&format!("9030_p{i}.png")).url_original)
        .collect();
    expected.sort();
    assert_eq!(fetched, expected, "only the lead pages are considered");
}

#[tokio::test]
async fn test_metadata_is_cached_across_runs() {
    let gallery = MockGallery::new(sample_metadata("9031"), vec![page("9031_p0.png")]);
    let h = setup(gallery).await;

    h.pipeline.run("9031").await.unwrap();
    h.pipeline.run("9031").await.unwrap();

    assert_eq!(
        h.gallery.metadata_calls.load(Ordering::SeqCst),
        1,
        "the second run hits the metadata cache"
    );
}

#[tokio::test]
async fn test_page_list_failure_fails_the_run() {
    let mut gallery = MockGallery::new(sample_metadata("9032"), vec![page("9032_p0.png")]);
    gallery.fail_page_list = true;
    let h = setup(gallery).await;

    let err = h.pipeline.run("9032").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Gallery(GalleryError::Endpoint { .. })
    ));
    assert!(h.db.list_images_for_illust("9032").await.unwrap().is_empty());
}

//! Scripted gallery sources and worker construction helpers

use async_trait::async_trait;
use pixiv_ingest::{
    Config, Database, GalleryError, GallerySource, IllustKind, IllustMetadata, IllustPage,
    IllustTag, IngestWorker, ModerationList, Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

/// Gallery source backed by canned metadata, with per-illust failure
/// injection and call instrumentation.
pub struct ScriptedGallery {
    illusts: HashMap<String, (IllustMetadata, Vec<IllustPage>)>,
    /// Remaining scripted metadata failures, per illust id
    metadata_failures: Mutex<HashMap<String, usize>>,
    /// Metadata endpoint calls observed
    pub metadata_calls: AtomicUsize,
    /// Page URLs fetched, in completion order
    fetched: Mutex<Vec<String>>,
}

impl ScriptedGallery {
    pub fn new() -> Self {
        Self {
            illusts: HashMap::new(),
            metadata_failures: Mutex::new(HashMap::new()),
            metadata_calls: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Script an illustration the gallery will serve.
    pub fn with_illust(mut self, metadata: IllustMetadata, pages: Vec<IllustPage>) -> Self {
        self.illusts
            .insert(metadata.illust_id.clone(), (metadata, pages));
        self
    }

    /// Make the next `times` metadata fetches for `illust_id` fail.
    pub async fn fail_metadata(&self, illust_id: &str, times: usize) {
        self.metadata_failures
            .lock()
            .await
            .insert(illust_id.to_string(), times);
    }

    /// Page URLs fetched so far.
    pub async fn fetched_urls(&self) -> Vec<String> {
        self.fetched.lock().await.clone()
    }
}

#[async_trait]
impl GallerySource for ScriptedGallery {
    async fn illust_metadata(&self, illust_id: &str) -> Result<IllustMetadata> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);

        let mut failures = self.metadata_failures.lock().await;
        if let Some(remaining) = failures.get_mut(illust_id)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(GalleryError::Endpoint {
                illust_id: illust_id.to_string(),
                message: "scripted metadata failure".to_string(),
            }
            .into());
        }
        drop(failures);

        match self.illusts.get(illust_id) {
            Some((metadata, _)) => Ok(metadata.clone()),
            None => Err(GalleryError::Endpoint {
                illust_id: illust_id.to_string(),
                message: "unknown illust".to_string(),
            }
            .into()),
        }
    }

    async fn illust_pages(&self, illust_id: &str) -> Result<Vec<IllustPage>> {
        match self.illusts.get(illust_id) {
            Some((_, pages)) => Ok(pages.clone()),
            None => Err(GalleryError::Endpoint {
                illust_id: illust_id.to_string(),
                message: "unknown illust".to_string(),
            }
            .into()),
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<()> {
        self.fetched.lock().await.push(url.to_string());
        Ok(())
    }
}

/// Metadata for a plain two-tag illustration by a fixed test author.
pub fn illust(illust_id: &str) -> IllustMetadata {
    IllustMetadata {
        illust_id: illust_id.to_string(),
        author: "冬空レイジ".to_string(),
        author_id: "770012".to_string(),
        title: format!("習作 {illust_id}"),
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

/// `count` sequentially numbered original-resolution page URLs.
pub fn pages(illust_id: &str, count: usize) -> Vec<IllustPage> {
    (0..count)
        .map(|i| IllustPage {
            url_original: format!(
                "https://i.example.net/img-original/img/2026/08/25/{illust_id}_p{i}.png"
            ),
        })
        .collect()
}

/// Config with millisecond pacing so the poll loop spins fast under test.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.worker.inter_task_delay = Duration::from_millis(10);
    config.worker.idle_backoff_start = Duration::from_millis(10);
    config.worker.idle_backoff_cap = Duration::from_millis(40);
    config.throttle.max_calls = 10_000;
    config.pipeline.page_delay = Duration::ZERO;
    config
}

/// Build a worker over a fresh temp database and the given gallery script.
///
/// The database doubles as the moderation list, matching production wiring.
/// The returned temp file handle must outlive the worker.
pub async fn build_worker(
    gallery: Arc<ScriptedGallery>,
    config: Config,
) -> (NamedTempFile, Arc<IngestWorker>) {
    let file = NamedTempFile::new().expect("Failed to create temp database file");
    let db = Arc::new(
        Database::new(file.path())
            .await
            .expect("Failed to open database"),
    );
    let worker = IngestWorker::with_collaborators(
        config,
        Arc::clone(&db),
        gallery as Arc<dyn GallerySource>,
        db as Arc<dyn ModerationList>,
    )
    .expect("Failed to construct worker");
    (file, Arc::new(worker))
}

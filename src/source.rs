//! Gallery collaborators: metadata source, deny lists, notification channel.
//!
//! The pipeline talks to the upstream gallery service only through the
//! [`GallerySource`] trait so tests can substitute a scripted source.
//! The reference implementation targets the gallery's public JSON
//! endpoints through an optional HTTP proxy.

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::{GalleryConfig, WebhookConfig};
use crate::error::GalleryError;
use crate::types::{IllustKind, IllustMetadata, IllustPage, IllustTag};
use crate::{Error, Result};

/// Upstream gallery operations the pipeline depends on
#[async_trait]
pub trait GallerySource: Send + Sync {
    /// Fetch metadata for one illustration
    async fn illust_metadata(&self, illust_id: &str) -> Result<IllustMetadata>;

    /// Fetch the ordered page list for one illustration
    async fn illust_pages(&self, illust_id: &str) -> Result<Vec<IllustPage>>;

    /// Fetch one page's content
    ///
    /// The body is persisted out-of-band by the proxy side; only success
    /// or failure is reported back.
    async fn fetch_page(&self, url: &str) -> Result<()>;
}

/// Shared deny-lists consulted before any page is fetched
#[async_trait]
pub trait ModerationList: Send + Sync {
    /// Whether the author is banned outright
    async fn is_author_banned(&self, author_id: &str) -> Result<bool>;

    /// Words that make an illustration ineligible when found in a tag
    async fn forbidden_words(&self) -> Result<Vec<String>>;
}

#[async_trait]
impl ModerationList for crate::db::Database {
    async fn is_author_banned(&self, author_id: &str) -> Result<bool> {
        crate::db::Database::is_author_banned(self, author_id).await
    }

    async fn forbidden_words(&self) -> Result<Vec<String>> {
        crate::db::Database::forbidden_words(self).await
    }
}

/// Fire-and-forget notification channel
///
/// Used by the surrounding discovery job; delivery failures are logged
/// and dropped, never surfaced to the caller.
pub trait Notifier: Send + Sync {
    /// Send a text notification without waiting for delivery
    fn notify(&self, text: &str);
}

// ---------------------------------------------------------------------------
// HTTP gallery source
// ---------------------------------------------------------------------------

/// JSON envelope every gallery ajax endpoint wraps its payload in
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    error: bool,
    #[serde(default)]
    message: String,
    body: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IllustBody {
    illust_id: String,
    illust_title: String,
    illust_type: i32,
    user_id: String,
    user_name: String,
    tags: TagsBody,
}

#[derive(Debug, Deserialize)]
struct TagsBody {
    tags: Vec<TagBody>,
}

#[derive(Debug, Deserialize)]
struct TagBody {
    tag: String,
    translation: Option<TagTranslationBody>,
    romaji: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagTranslationBody {
    en: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageBody {
    urls: PageUrls,
}

#[derive(Debug, Deserialize)]
struct PageUrls {
    original: String,
}

/// [`GallerySource`] backed by the gallery's public JSON endpoints
///
/// Metadata comes from `{base}/ajax/illust/{id}`, pages from
/// `{base}/ajax/illust/{id}/pages`. Every request carries the configured
/// `Referer`; the image CDN rejects bare requests. All traffic goes
/// through the configured proxy when one is set.
pub struct HttpGallerySource {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpGallerySource {
    /// Build a source from the gallery configuration
    pub fn new(config: &GalleryConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| Error::Config {
            message: format!("Invalid gallery base URL: {}", e),
            key: Some("gallery.base_url".to_string()),
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            header::REFERER,
            HeaderValue::from_str(&config.referer).map_err(|e| Error::Config {
                message: format!("Invalid referer value: {}", e),
                key: Some("gallery.referer".to_string()),
            })?,
        );

        let mut builder = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .default_headers(headers);

        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        let client = builder.build()?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, illust_id: &str, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(|e| {
            Error::Gallery(GalleryError::Endpoint {
                illust_id: illust_id.to_string(),
                message: format!("Invalid endpoint URL: {}", e),
            })
        })
    }

    /// GET an ajax endpoint and unwrap its envelope
    async fn get_body<T: DeserializeOwned>(&self, illust_id: &str, url: Url) -> Result<T> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        let envelope: Envelope<T> = match response.json().await {
            Ok(envelope) => envelope,
            // Error pages are not always JSON; fold the status into the message
            Err(_) if !status.is_success() => {
                return Err(Error::Gallery(GalleryError::Endpoint {
                    illust_id: illust_id.to_string(),
                    message: format!("HTTP {}", status),
                }));
            }
            Err(e) => return Err(e.into()),
        };

        if envelope.error {
            return Err(Error::Gallery(GalleryError::Endpoint {
                illust_id: illust_id.to_string(),
                message: envelope.message,
            }));
        }

        envelope.body.ok_or_else(|| {
            Error::Gallery(GalleryError::Endpoint {
                illust_id: illust_id.to_string(),
                message: "Envelope carried no body".to_string(),
            })
        })
    }
}

#[async_trait]
impl GallerySource for HttpGallerySource {
    async fn illust_metadata(&self, illust_id: &str) -> Result<IllustMetadata> {
        let url = self.endpoint(illust_id, &format!("ajax/illust/{}", illust_id))?;
        let body: IllustBody = self.get_body(illust_id, url).await?;

        Ok(IllustMetadata {
            illust_id: body.illust_id,
            author: body.user_name,
            author_id: body.user_id,
            title: body.illust_title,
            kind: IllustKind::from_i32(body.illust_type),
            tags: body
                .tags
                .tags
                .into_iter()
                .map(|t| IllustTag {
                    name: t.tag,
                    translated: t.translation.and_then(|tr| tr.en),
                    romaji: t.romaji,
                })
                .collect(),
        })
    }

    async fn illust_pages(&self, illust_id: &str) -> Result<Vec<IllustPage>> {
        let url = self.endpoint(illust_id, &format!("ajax/illust/{}/pages", illust_id))?;
        let body: Vec<PageBody> = self.get_body(illust_id, url).await?;

        Ok(body
            .into_iter()
            .map(|p| IllustPage {
                url_original: p.urls.original,
            })
            .collect())
    }

    async fn fetch_page(&self, url: &str) -> Result<()> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(Error::Gallery(GalleryError::PageFetch {
                url: url.to_string(),
                status: status.as_u16(),
            }));
        }

        // Drain the body; the proxy persists it as a side effect
        response.bytes().await?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Webhook notifier
// ---------------------------------------------------------------------------

/// [`Notifier`] that POSTs to a configured webhook
///
/// Delivery is spawned onto the runtime so the caller never waits on the
/// webhook endpoint. Failures are logged and swallowed.
pub struct WebhookNotifier {
    config: WebhookConfig,
}

impl WebhookNotifier {
    /// Create a notifier for the given webhook
    #[must_use]
    pub fn new(config: WebhookConfig) -> Self {
        Self { config }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, text: &str) {
        let config = self.config.clone();
        let payload = serde_json::json!({
            "text": text,
            "timestamp": chrono::Utc::now().timestamp(),
        });

        tokio::spawn(async move {
            let client = reqwest::Client::new();
            let mut request = client
                .post(&config.url)
                .json(&payload)
                .timeout(config.timeout);

            if let Some(auth) = &config.auth_header {
                request = request.header("Authorization", auth);
            }

            match request.send().await {
                Ok(response) if !response.status().is_success() => {
                    tracing::warn!(
                        url = %config.url,
                        status = %response.status(),
                        "Notification webhook returned an error"
                    );
                }
                Ok(_) => {
                    tracing::debug!(url = %config.url, "Notification sent");
                }
                Err(e) => {
                    tracing::warn!(url = %config.url, error = %e, "Failed to send notification");
                }
            }
        });
    }
}

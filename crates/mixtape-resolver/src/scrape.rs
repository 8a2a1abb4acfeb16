use std::collections::{HashMap, HashSet};
use std::sync::{LazyLock, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mixtape_core::config::ResolverConfig;
use regex::Regex;
use tracing::debug;

use crate::error::FetchError;

/// Item URIs embedded in widget JSON (`spotify:track:<22 chars>`).
static URI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"spotify:track:([A-Za-z0-9]{22})").expect("uri pattern is valid")
});

/// Item links in page markup (`/track/<22 chars>`).
static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/track/([A-Za-z0-9]{22})").expect("link pattern is valid")
});

/// The two unauthenticated surfaces a public collection is published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageForm {
    /// Embeddable widget; small, usually lists every item.
    Embed,
    /// Full public page.
    Public,
}

impl PageForm {
    /// Order in which forms are tried.
    pub const ORDER: [PageForm; 2] = [PageForm::Embed, PageForm::Public];

    pub fn as_str(&self) -> &'static str {
        match self {
            PageForm::Embed => "embed",
            PageForm::Public => "public",
        }
    }
}

/// Fetches the raw public representation of a collection.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, form: PageForm, collection_id: &str) -> Result<String, FetchError>;
}

/// reqwest-backed fetcher driven by the URL templates in [`ResolverConfig`].
pub struct HttpPageFetcher {
    client: reqwest::Client,
    embed_url: String,
    page_url: String,
}

impl HttpPageFetcher {
    pub fn new(config: &ResolverConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(concat!("mixtape/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            embed_url: config.embed_url.clone(),
            page_url: config.page_url.clone(),
        })
    }

    fn url_for(&self, form: PageForm, collection_id: &str) -> String {
        let template = match form {
            PageForm::Embed => &self.embed_url,
            PageForm::Public => &self.page_url,
        };
        template.replace("{id}", collection_id)
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, form: PageForm, collection_id: &str) -> Result<String, FetchError> {
        let url = self.url_for(form, collection_id);
        debug!(%url, form = form.as_str(), "fetching public page");
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }
        Ok(resp.text().await?)
    }
}

/// Pull item ids out of a page body, first occurrence order, no duplicates.
pub fn extract_item_ids(body: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = URI_PATTERN
        .captures_iter(body)
        .chain(LINK_PATTERN.captures_iter(body))
        .filter_map(|c| c.get(1).map(|m| (m.start(), m.as_str().to_string())))
        .collect();
    found.sort_by_key(|(pos, _)| *pos);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter_map(|(_, id)| seen.insert(id.clone()).then_some(id))
        .collect()
}

/// Successful scrapes keyed by source collection id, reused for `ttl`.
pub(crate) struct ScrapeCache {
    entries: Mutex<HashMap<String, (Instant, Vec<String>)>>,
    ttl: Duration,
}

impl ScrapeCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<Vec<String>> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some((at, ids)) if at.elapsed() < self.ttl => Some(ids.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store `ids` under `key`, dropping every expired entry first.
    pub(crate) fn put(&self, key: &str, ids: Vec<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|_, (at, _)| at.elapsed() < self.ttl);
            entries.insert(key.to_string(), (Instant::now(), ids));
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const A: &str = "4uLU6hMCjMI75M1A2tKUQC";
    const B: &str = "7ouMYWpwJ422jRcDASZB7P";
    const C: &str = "0VjIjW4GlUZAMYd2vXMi3b";

    #[test]
    fn extracts_uris_and_links_in_document_order() {
        let body = format!(
            r#"<a href="/track/{B}">b</a> {{"uri":"spotify:track:{A}"}} <a href="/track/{C}"></a>
               <meta content="spotify:track:{B}">"#
        );
        assert_eq!(extract_item_ids(&body), vec![B, A, C]);
    }

    #[test]
    fn ignores_malformed_ids() {
        assert!(extract_item_ids("spotify:track:short /track/also-short").is_empty());
        assert!(extract_item_ids("").is_empty());
    }

    #[test]
    fn cache_expires_after_ttl() {
        let cache = ScrapeCache::new(Duration::from_millis(0));
        cache.put("pl", vec![A.to_string()]);
        assert!(cache.get("pl").is_none());

        let cache = ScrapeCache::new(Duration::from_secs(60));
        cache.put("pl", vec![A.to_string()]);
        assert_eq!(cache.get("pl"), Some(vec![A.to_string()]));
    }

    #[test]
    fn put_sweeps_expired_entries() {
        let cache = ScrapeCache::new(Duration::from_millis(20));
        cache.put("old-1", vec![A.to_string()]);
        cache.put("old-2", vec![B.to_string()]);
        std::thread::sleep(Duration::from_millis(30));

        cache.put("fresh", vec![C.to_string()]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("fresh"), Some(vec![C.to_string()]));
    }

    #[tokio::test]
    async fn http_fetcher_uses_templates_and_maps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/embed/playlist/pl-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("spotify:track:{A}")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/playlist/pl-1"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let config = ResolverConfig {
            embed_url: format!("{}/embed/playlist/{{id}}", server.uri()),
            page_url: format!("{}/playlist/{{id}}", server.uri()),
            ..ResolverConfig::default()
        };
        let fetcher = HttpPageFetcher::new(&config).unwrap();

        let body = fetcher.fetch(PageForm::Embed, "pl-1").await.unwrap();
        assert_eq!(extract_item_ids(&body), vec![A]);

        let err = fetcher.fetch(PageForm::Public, "pl-1").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 403, .. }));
    }
}

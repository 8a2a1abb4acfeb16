use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mixtape_core::{PlaylistGateway, ResolveResult, SourceKind, UpstreamSource};
use tracing::{debug, warn};

use crate::scrape::{extract_item_ids, PageFetcher, PageForm, ScrapeCache};

pub const DIRECT_FETCH: &str = "direct-fetch";
pub const SEARCH_DISCOVERY: &str = "search-discovery";
pub const PUBLIC_SCRAPE: &str = "public-scrape";

/// One strategy for resolving a source's item list.
///
/// `resolve` never fails: every error is reported inside the returned
/// [`ResolveResult`] so the resolver can fall through to the next pathway.
#[async_trait]
pub trait Pathway: Send + Sync {
    /// Stable name recorded in `UpstreamSource::last_pathway`.
    fn name(&self) -> &'static str;

    /// Whether this pathway can say anything about `source`.
    fn applies_to(&self, source: &UpstreamSource) -> bool;

    async fn resolve(&self, source: &UpstreamSource) -> ResolveResult;
}

fn is_collection_source(source: &UpstreamSource) -> bool {
    matches!(source.kind, SourceKind::Owned | SourceKind::External)
        && source.source_collection_id.is_some()
}

/// Read the source collection through the authenticated API.
pub struct DirectFetch {
    gateway: Arc<dyn PlaylistGateway>,
}

impl DirectFetch {
    pub fn new(gateway: Arc<dyn PlaylistGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Pathway for DirectFetch {
    fn name(&self) -> &'static str {
        DIRECT_FETCH
    }

    fn applies_to(&self, source: &UpstreamSource) -> bool {
        is_collection_source(source)
    }

    async fn resolve(&self, source: &UpstreamSource) -> ResolveResult {
        let Some(collection_id) = source.source_collection_id.as_deref() else {
            return ResolveResult::failed(DIRECT_FETCH, "source has no collection id");
        };
        match self.gateway.list_items(collection_id).await {
            // The provider silently withholds items of some non-owned
            // collections; an empty list must fall through, not win.
            Ok(items) if items.is_empty() => {
                ResolveResult::failed(DIRECT_FETCH, "source returned no items")
            }
            Ok(items) => {
                ResolveResult::complete(DIRECT_FETCH, items.into_iter().map(|i| i.id).collect())
            }
            Err(e) => ResolveResult::failed(DIRECT_FETCH, e.to_string()),
        }
    }
}

/// Bounded catalogue search; only ever a sample, so always partial.
pub struct SearchDiscovery {
    gateway: Arc<dyn PlaylistGateway>,
    pages: usize,
    page_size: usize,
}

impl SearchDiscovery {
    pub fn new(gateway: Arc<dyn PlaylistGateway>, pages: usize, page_size: usize) -> Self {
        Self {
            gateway,
            pages: pages.max(1),
            page_size: page_size.max(1),
        }
    }
}

#[async_trait]
impl Pathway for SearchDiscovery {
    fn name(&self) -> &'static str {
        SEARCH_DISCOVERY
    }

    fn applies_to(&self, source: &UpstreamSource) -> bool {
        source
            .query
            .as_deref()
            .is_some_and(|q| !q.trim().is_empty())
    }

    async fn resolve(&self, source: &UpstreamSource) -> ResolveResult {
        let Some(query) = source.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) else {
            return ResolveResult::failed(SEARCH_DISCOVERY, "source has no query");
        };

        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for page in 0..self.pages {
            let offset = page * self.page_size;
            match self.gateway.search(query, self.page_size, offset).await {
                Ok(items) => {
                    let short_page = items.len() < self.page_size;
                    ids.extend(
                        items
                            .into_iter()
                            .map(|i| i.id)
                            .filter(|id| seen.insert(id.clone())),
                    );
                    if short_page {
                        break;
                    }
                }
                Err(e) if page == 0 => return ResolveResult::failed(SEARCH_DISCOVERY, e.to_string()),
                Err(e) => {
                    // keep what earlier pages produced
                    warn!(source_id = %source.id, page, error = %e, "search page failed");
                    break;
                }
            }
        }

        if ids.is_empty() {
            ResolveResult::failed(SEARCH_DISCOVERY, "search returned no items")
        } else {
            ResolveResult::partial(SEARCH_DISCOVERY, ids)
        }
    }
}

/// Last resort: extract ids from the unauthenticated public representations.
pub struct PublicScrape {
    fetcher: Arc<dyn PageFetcher>,
    cache: ScrapeCache,
}

impl PublicScrape {
    pub fn new(fetcher: Arc<dyn PageFetcher>, cache_ttl: Duration) -> Self {
        Self {
            fetcher,
            cache: ScrapeCache::new(cache_ttl),
        }
    }
}

#[async_trait]
impl Pathway for PublicScrape {
    fn name(&self) -> &'static str {
        PUBLIC_SCRAPE
    }

    fn applies_to(&self, source: &UpstreamSource) -> bool {
        is_collection_source(source)
    }

    async fn resolve(&self, source: &UpstreamSource) -> ResolveResult {
        let Some(collection_id) = source.source_collection_id.as_deref() else {
            return ResolveResult::failed(PUBLIC_SCRAPE, "source has no collection id");
        };

        if let Some(ids) = self.cache.get(collection_id) {
            debug!(collection = %collection_id, items = ids.len(), "public scrape cache hit");
            return ResolveResult::complete(PUBLIC_SCRAPE, ids);
        }

        let mut last_error = String::from("no item ids found");
        for form in PageForm::ORDER {
            match self.fetcher.fetch(form, collection_id).await {
                Ok(body) => {
                    let ids = extract_item_ids(&body);
                    if ids.is_empty() {
                        debug!(collection = %collection_id, form = form.as_str(), "page had no item ids");
                        last_error = format!("{} page had no item ids", form.as_str());
                        continue;
                    }
                    self.cache.put(collection_id, ids.clone());
                    return ResolveResult::complete(PUBLIC_SCRAPE, ids);
                }
                Err(e) => {
                    debug!(collection = %collection_id, form = form.as_str(), error = %e, "page fetch failed");
                    last_error = format!("{} page: {e}", form.as_str());
                }
            }
        }
        ResolveResult::failed(PUBLIC_SCRAPE, last_error)
    }
}

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use mixtape_core::config::ResolverConfig;
use mixtape_core::{PlaylistGateway, ResolveResult, UpstreamSource};
use tracing::{debug, info, instrument, warn};

use crate::pathway::{DirectFetch, Pathway, PublicScrape, SearchDiscovery};
use crate::scrape::PageFetcher;

/// Resolution of one source inside a `resolve_all` call.
#[derive(Debug, Clone)]
pub struct SourceResolution {
    pub source_id: String,
    pub result: ResolveResult,
}

/// Merged output of `resolve_all`.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSources {
    /// New ids across all sources: no duplicates, nothing from the exclusion set.
    pub item_ids: Vec<String>,
    /// One entry per input source, in input order.
    pub per_source: Vec<SourceResolution>,
}

/// Resolves raid sources through a fixed-priority pathway chain.
pub struct SourceResolver {
    pathways: Vec<Box<dyn Pathway>>,
}

impl SourceResolver {
    /// Standard chain: direct-fetch → search-discovery → public-scrape.
    pub fn new(
        gateway: Arc<dyn PlaylistGateway>,
        fetcher: Arc<dyn PageFetcher>,
        config: &ResolverConfig,
    ) -> Self {
        Self::with_pathways(vec![
            Box::new(DirectFetch::new(Arc::clone(&gateway))),
            Box::new(SearchDiscovery::new(
                gateway,
                config.search_pages,
                config.search_page_size,
            )),
            Box::new(PublicScrape::new(
                fetcher,
                Duration::from_secs(config.scrape_cache_ttl_secs),
            )),
        ])
    }

    /// Custom chain, tried in the given order.
    pub fn with_pathways(pathways: Vec<Box<dyn Pathway>>) -> Self {
        Self { pathways }
    }

    /// Resolve one source.
    ///
    /// Returns the first complete result; failing that, the partial result
    /// with the most items; failing that, the last failure.
    #[instrument(skip(self, source), fields(source_id = %source.id, kind = %source.kind))]
    pub async fn resolve(&self, source: &UpstreamSource) -> ResolveResult {
        let mut best_partial: Option<ResolveResult> = None;
        let mut last_failure: Option<ResolveResult> = None;

        for pathway in self.pathways.iter().filter(|p| p.applies_to(source)) {
            let result = pathway.resolve(source).await;
            debug!(
                pathway = pathway.name(),
                status = result.status_label(),
                items = result.item_ids.len(),
                "pathway finished"
            );

            if result.is_final() {
                return result;
            }
            if result.success {
                let better = best_partial
                    .as_ref()
                    .map_or(true, |b| result.item_ids.len() > b.item_ids.len());
                if better {
                    best_partial = Some(result);
                }
            } else {
                last_failure = Some(result);
            }
        }

        best_partial.or(last_failure).unwrap_or_else(|| {
            ResolveResult::failed("none", format!("no pathway applies to {} source", source.kind))
        })
    }

    /// Resolve every source independently and merge their items.
    ///
    /// Ids in `exclude` and ids already contributed by an earlier source are
    /// dropped. Bookkeeping on the sources is left to the caller.
    pub async fn resolve_all(
        &self,
        sources: &[UpstreamSource],
        exclude: &HashSet<String>,
    ) -> ResolvedSources {
        let results = join_all(sources.iter().map(|s| self.resolve(s))).await;

        let mut seen: HashSet<String> = HashSet::new();
        let mut item_ids = Vec::new();
        let mut per_source = Vec::with_capacity(sources.len());
        for (source, result) in sources.iter().zip(results) {
            if result.success {
                for id in &result.item_ids {
                    if !exclude.contains(id) && seen.insert(id.clone()) {
                        item_ids.push(id.clone());
                    }
                }
            } else {
                warn!(
                    source_id = %source.id,
                    pathway = %result.pathway,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "source could not be resolved"
                );
            }
            per_source.push(SourceResolution {
                source_id: source.id.clone(),
                result,
            });
        }

        info!(
            sources = sources.len(),
            new_items = item_ids.len(),
            "sources resolved"
        );
        ResolvedSources {
            item_ids,
            per_source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use mixtape_core::{GatewayError, SourceKind};
    use mixtape_test_utils::{GatewayCall, MemoryGateway};

    use crate::error::FetchError;
    use crate::scrape::PageForm;

    /// Serves a canned body per page form and counts fetches.
    #[derive(Default)]
    struct CannedPages {
        embed: Option<String>,
        public: Option<String>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl PageFetcher for CannedPages {
        async fn fetch(&self, form: PageForm, _collection_id: &str) -> Result<String, FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let body = match form {
                PageForm::Embed => self.embed.clone(),
                PageForm::Public => self.public.clone(),
            };
            body.ok_or(FetchError::Status {
                status: 404,
                url: form.as_str().to_string(),
            })
        }
    }

    fn track_id(n: usize) -> String {
        format!("{:0>22}", n)
    }

    fn page_with(ids: &[String]) -> String {
        ids.iter()
            .map(|id| format!(r#"<a href="https://open.example/track/{id}">t</a>"#))
            .collect()
    }

    fn resolver(gw: Arc<MemoryGateway>, pages: Arc<CannedPages>) -> SourceResolver {
        SourceResolver::new(gw, pages, &ResolverConfig::default())
    }

    fn strings(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn direct_fetch_wins_for_owned_source() {
        let gw = Arc::new(MemoryGateway::new());
        gw.set_items("src", &["a", "b", "c"]);
        let pages = Arc::new(CannedPages::default());
        let source = UpstreamSource::collection("u1", "target", SourceKind::Owned, "src");

        let result = resolver(gw, Arc::clone(&pages)).resolve(&source).await;
        assert_eq!(result.pathway, "direct-fetch");
        assert!(result.is_final());
        assert_eq!(result.item_ids, strings(&["a", "b", "c"]));
        assert_eq!(pages.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_direct_fetch_falls_through_to_public_scrape() {
        let gw = Arc::new(MemoryGateway::new());
        gw.set_items("ext", &[] as &[&str]);
        let ids: Vec<String> = (1..=7).map(track_id).collect();
        let pages = Arc::new(CannedPages {
            embed: Some(page_with(&ids)),
            ..CannedPages::default()
        });
        let source = UpstreamSource::collection("u1", "target", SourceKind::External, "ext");

        let result = resolver(gw, pages).resolve(&source).await;
        assert_eq!(result.pathway, "public-scrape");
        assert!(result.success && !result.partial);
        assert_eq!(result.item_ids, ids);
    }

    #[tokio::test]
    async fn scrape_tries_public_page_after_embed() {
        let gw = Arc::new(MemoryGateway::new());
        gw.fail_collection("ext", GatewayError::Unauthorized("not yours".into()));
        let ids: Vec<String> = (1..=2).map(track_id).collect();
        let pages = Arc::new(CannedPages {
            embed: Some("<html>nothing here</html>".to_string()),
            public: Some(page_with(&ids)),
            ..CannedPages::default()
        });
        let source = UpstreamSource::collection("u1", "target", SourceKind::External, "ext");

        let result = resolver(gw, Arc::clone(&pages)).resolve(&source).await;
        assert_eq!(result.item_ids, ids);
        assert_eq!(pages.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn scrape_results_are_cached_per_source() {
        let gw = Arc::new(MemoryGateway::new());
        gw.set_items("ext", &[] as &[&str]);
        let pages = Arc::new(CannedPages {
            embed: Some(page_with(&[track_id(1)])),
            ..CannedPages::default()
        });
        let resolver = resolver(gw, Arc::clone(&pages));
        let source = UpstreamSource::collection("u1", "target", SourceKind::External, "ext");

        resolver.resolve(&source).await;
        let again = resolver.resolve(&source).await;
        assert_eq!(again.item_ids, vec![track_id(1)]);
        assert_eq!(pages.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn every_pathway_failing_yields_failed_result() {
        let gw = Arc::new(MemoryGateway::new());
        gw.fail_collection("ext", GatewayError::UpstreamUnavailable("down".into()));
        let pages = Arc::new(CannedPages::default());
        let source = UpstreamSource::collection("u1", "target", SourceKind::External, "ext");

        let result = resolver(gw, pages).resolve(&source).await;
        assert!(!result.success);
        assert!(result.item_ids.is_empty());
        assert_eq!(result.pathway, "public-scrape");
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn search_source_is_partial_and_pages() {
        let gw = Arc::new(MemoryGateway::new());
        let hits: Vec<String> = (0..7).map(|i| format!("s{i}")).collect();
        gw.set_search_results("lofi beats", &hits);
        let config = ResolverConfig {
            search_pages: 2,
            search_page_size: 3,
            ..ResolverConfig::default()
        };
        let resolver = SourceResolver::new(gw.clone(), Arc::new(CannedPages::default()), &config);
        let source = UpstreamSource::search("u1", "target", "lofi beats");

        let result = resolver.resolve(&source).await;
        assert_eq!(result.pathway, "search-discovery");
        assert!(result.partial);
        // two pages of three, the seventh hit is never requested
        assert_eq!(result.item_ids, hits[..6].to_vec());
    }

    #[tokio::test]
    async fn search_keeps_first_page_when_a_later_page_fails() {
        let gw = Arc::new(MemoryGateway::new());
        let hits: Vec<String> = (0..7).map(|i| format!("s{i}")).collect();
        gw.set_search_results("lofi beats", &hits);
        gw.fail_search_from(3, GatewayError::UpstreamUnavailable("timeout".into()));
        let config = ResolverConfig {
            search_pages: 3,
            search_page_size: 3,
            ..ResolverConfig::default()
        };
        let resolver = SourceResolver::new(gw.clone(), Arc::new(CannedPages::default()), &config);
        let source = UpstreamSource::search("u1", "target", "lofi beats");

        let result = resolver.resolve(&source).await;
        assert!(result.success && result.partial);
        assert_eq!(result.pathway, "search-discovery");
        assert_eq!(result.item_ids, hits[..3].to_vec());
        // the failed page stops paging
        let searches = gw
            .calls()
            .into_iter()
            .filter(|c| matches!(c, GatewayCall::Search { .. }))
            .count();
        assert_eq!(searches, 2);
    }

    #[tokio::test]
    async fn complete_scrape_beats_partial_search_enrichment() {
        let gw = Arc::new(MemoryGateway::new());
        gw.set_items("ext", &[] as &[&str]);
        gw.set_search_results("hint", &["x"]);
        let ids: Vec<String> = (1..=3).map(track_id).collect();
        let pages = Arc::new(CannedPages {
            embed: Some(page_with(&ids)),
            ..CannedPages::default()
        });
        let source =
            UpstreamSource::collection("u1", "target", SourceKind::External, "ext").with_query("hint");

        let result = resolver(gw, pages).resolve(&source).await;
        assert_eq!(result.pathway, "public-scrape");
        assert_eq!(result.item_ids, ids);
    }

    #[tokio::test]
    async fn partial_search_kept_when_scrape_fails() {
        let gw = Arc::new(MemoryGateway::new());
        gw.set_items("ext", &[] as &[&str]);
        gw.set_search_results("hint", &["x", "y"]);
        let source =
            UpstreamSource::collection("u1", "target", SourceKind::External, "ext").with_query("hint");

        let result = resolver(gw, Arc::new(CannedPages::default())).resolve(&source).await;
        assert_eq!(result.pathway, "search-discovery");
        assert!(result.success && result.partial);
        assert_eq!(result.item_ids, strings(&["x", "y"]));
    }

    #[tokio::test]
    async fn resolve_all_merges_and_deduplicates() {
        let gw = Arc::new(MemoryGateway::new());
        gw.set_items("owned-src", &["n1", "n2", "n3"]);
        gw.set_search_results("synthwave", &["n3", "n4"]);
        let sources = vec![
            UpstreamSource::collection("u1", "target", SourceKind::Owned, "owned-src"),
            UpstreamSource::search("u1", "target", "synthwave"),
        ];

        let resolved = resolver(gw, Arc::new(CannedPages::default()))
            .resolve_all(&sources, &HashSet::new())
            .await;
        assert_eq!(resolved.item_ids, strings(&["n1", "n2", "n3", "n4"]));
        assert_eq!(resolved.per_source.len(), 2);
        assert_eq!(resolved.per_source[0].result.pathway, "direct-fetch");
        assert_eq!(resolved.per_source[1].result.pathway, "search-discovery");
    }

    #[tokio::test]
    async fn resolve_all_drops_excluded_ids_and_survives_failures() {
        let gw = Arc::new(MemoryGateway::new());
        gw.set_items("a", &["x", "y", "x", "z"]);
        gw.set_items("b", &["z", "w"]);
        gw.fail_collection("broken", GatewayError::UpstreamUnavailable("down".into()));
        let sources = vec![
            UpstreamSource::collection("u1", "target", SourceKind::Owned, "a"),
            UpstreamSource::collection("u1", "target", SourceKind::External, "broken"),
            UpstreamSource::collection("u1", "target", SourceKind::Owned, "b"),
        ];
        let exclude: HashSet<String> = ["y".to_string()].into_iter().collect();

        let resolved = resolver(gw, Arc::new(CannedPages::default()))
            .resolve_all(&sources, &exclude)
            .await;
        assert_eq!(resolved.item_ids, strings(&["x", "z", "w"]));
        assert!(!resolved.per_source[1].result.success);

        let unique: HashSet<&String> = resolved.item_ids.iter().collect();
        assert_eq!(unique.len(), resolved.item_ids.len());
        assert!(resolved.item_ids.iter().all(|id| !exclude.contains(id)));
    }
}

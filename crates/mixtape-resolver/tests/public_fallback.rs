// Resolver fallback chain against a real HTTP fetcher and a mock public site.

use std::collections::HashSet;
use std::sync::Arc;

use mixtape_core::config::ResolverConfig;
use mixtape_core::{GatewayError, SourceKind, UpstreamSource};
use mixtape_resolver::{HttpPageFetcher, SourceResolver};
use mixtape_test_utils::MemoryGateway;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn item_id(n: usize) -> String {
    format!("{:0>22}", n)
}

fn config_for(server: &MockServer) -> ResolverConfig {
    ResolverConfig {
        embed_url: format!("{}/embed/playlist/{{id}}", server.uri()),
        page_url: format!("{}/playlist/{{id}}", server.uri()),
        ..ResolverConfig::default()
    }
}

#[tokio::test]
async fn withheld_external_collection_falls_back_to_public_page() {
    let server = MockServer::start().await;
    let links: String = (1..=7)
        .map(|n| format!(r#"<a href="/track/{}">#{n}</a>"#, item_id(n)))
        .collect();
    Mock::given(method("GET"))
        .and(path("/embed/playlist/ext-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>no data</html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/playlist/ext-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(links))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = Arc::new(MemoryGateway::new());
    // the API answers but withholds every item
    gateway.set_items("ext-1", &[] as &[&str]);
    let fetcher = Arc::new(HttpPageFetcher::new(&config_for(&server)).unwrap());
    let resolver = SourceResolver::new(gateway, fetcher, &config_for(&server));

    let source = UpstreamSource::collection("u1", "mix", SourceKind::External, "ext-1");
    let result = resolver.resolve(&source).await;

    assert!(result.success);
    assert!(!result.partial);
    assert_eq!(result.pathway, "public-scrape");
    let expected: Vec<String> = (1..=7).map(item_id).collect();
    assert_eq!(result.item_ids, expected);

    // served from cache, the mock's expect(1) checks no second request
    let again = resolver.resolve(&source).await;
    assert_eq!(again.item_ids, expected);
}

#[tokio::test]
async fn unreachable_everywhere_reports_last_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let gateway = Arc::new(MemoryGateway::new());
    gateway.fail_collection("gone", GatewayError::not_found("gone"));
    let fetcher = Arc::new(HttpPageFetcher::new(&config_for(&server)).unwrap());
    let resolver = SourceResolver::new(gateway, fetcher, &config_for(&server));

    let source = UpstreamSource::collection("u1", "mix", SourceKind::External, "gone");
    let resolved = resolver
        .resolve_all(std::slice::from_ref(&source), &HashSet::new())
        .await;

    assert!(resolved.item_ids.is_empty());
    assert_eq!(resolved.per_source.len(), 1);
    let outcome = &resolved.per_source[0].result;
    assert!(!outcome.success);
    assert_eq!(outcome.pathway, "public-scrape");
    assert!(outcome.error.as_deref().unwrap_or("").contains("404"));
}

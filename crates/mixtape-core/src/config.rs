use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::gateway::DEFAULT_BATCH_LIMIT;

pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;
pub const DEFAULT_FALLBACK_CRON: &str = "0 3 * * *";
pub const DEFAULT_SNAPSHOT_RETENTION: usize = 50;
pub const DEFAULT_SCRAPE_CACHE_TTL_SECS: u64 = 3600;
pub const DEFAULT_SEARCH_PAGES: usize = 2;
pub const DEFAULT_SEARCH_PAGE_SIZE: usize = 50;

/// Top-level config (mixtape.toml + MIXTAPE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MixtapeConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub snapshots: SnapshotConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on jobs running at once across all schedules.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Trigger used when a schedule's cron expression does not parse.
    #[serde(default = "default_fallback_cron")]
    pub fallback_cron: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            fallback_cron: DEFAULT_FALLBACK_CRON.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Snapshots kept per (owner, collection); older ones are trimmed on capture.
    #[serde(default = "default_retention")]
    pub retention: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            retention: DEFAULT_SNAPSHOT_RETENTION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Item ids per mutating call. Must not exceed the provider's documented limit.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Result pages concatenated by search discovery.
    #[serde(default = "default_search_pages")]
    pub search_pages: usize,
    #[serde(default = "default_search_page_size")]
    pub search_page_size: usize,
    /// How long a successful public scrape is reused per source.
    #[serde(default = "default_scrape_cache_ttl_secs")]
    pub scrape_cache_ttl_secs: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Embeddable widget URL; `{id}` is replaced with the source collection id.
    #[serde(default = "default_embed_url")]
    pub embed_url: String,
    /// Full public page URL; `{id}` is replaced with the source collection id.
    #[serde(default = "default_page_url")]
    pub page_url: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            search_pages: DEFAULT_SEARCH_PAGES,
            search_page_size: DEFAULT_SEARCH_PAGE_SIZE,
            scrape_cache_ttl_secs: DEFAULT_SCRAPE_CACHE_TTL_SECS,
            http_timeout_secs: default_http_timeout_secs(),
            embed_url: default_embed_url(),
            page_url: default_page_url(),
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.mixtape/mixtape.db", home)
}
fn default_max_concurrent_jobs() -> usize {
    DEFAULT_MAX_CONCURRENT_JOBS
}
fn default_fallback_cron() -> String {
    DEFAULT_FALLBACK_CRON.to_string()
}
fn default_retention() -> usize {
    DEFAULT_SNAPSHOT_RETENTION
}
fn default_batch_limit() -> usize {
    DEFAULT_BATCH_LIMIT
}
fn default_search_pages() -> usize {
    DEFAULT_SEARCH_PAGES
}
fn default_search_page_size() -> usize {
    DEFAULT_SEARCH_PAGE_SIZE
}
fn default_scrape_cache_ttl_secs() -> u64 {
    DEFAULT_SCRAPE_CACHE_TTL_SECS
}
fn default_http_timeout_secs() -> u64 {
    15
}
fn default_embed_url() -> String {
    "https://open.spotify.com/embed/playlist/{id}".to_string()
}
fn default_page_url() -> String {
    "https://open.spotify.com/playlist/{id}".to_string()
}

impl MixtapeConfig {
    /// Load config from a TOML file with MIXTAPE_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.mixtape/mixtape.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: MixtapeConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("MIXTAPE_").split("__"))
            .extract()
            .map_err(|e| crate::error::MixtapeError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.mixtape/mixtape.toml", home)
}

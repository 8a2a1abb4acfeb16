//! `mixtape-resolver`: turns raid sources into item-id lists.
//!
//! Each [`UpstreamSource`](mixtape_core::UpstreamSource) is resolved through a
//! fixed-priority chain of pathways:
//!
//! | Pathway            | Applies to                         | Result            |
//! |--------------------|------------------------------------|-------------------|
//! | `direct-fetch`     | `owned`, `external`                | complete          |
//! | `search-discovery` | `search-query`, or any with a query | always partial    |
//! | `public-scrape`    | `owned`, `external`                | complete, cached  |
//!
//! The first complete result wins; otherwise the largest partial result is
//! kept. Pathway failures never propagate: they are folded into a failed
//! [`ResolveResult`](mixtape_core::ResolveResult) so other sources still
//! contribute to a raid.

pub mod db;
pub mod error;
pub mod pathway;
pub mod resolver;
pub mod scrape;
pub mod store;

pub use error::{FetchError, SourceStoreError};
pub use pathway::{DirectFetch, Pathway, PublicScrape, SearchDiscovery};
pub use resolver::{ResolvedSources, SourceResolution, SourceResolver};
pub use scrape::{extract_item_ids, HttpPageFetcher, PageFetcher, PageForm};
pub use store::SourceStore;

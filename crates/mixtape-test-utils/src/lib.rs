//! Shared test doubles for the mixtape workspace.
//!
//! - [`MemoryGateway`] - in-memory [`PlaylistGateway`] that records every call,
//!   enforces the per-call batch limit and can inject typed failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use mixtape_core::{GatewayError, Item, PlaylistGateway};

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    List(String),
    Replace { collection: String, count: usize },
    Add { collection: String, count: usize },
    Remove { collection: String, count: usize },
    Search { query: String, limit: usize, offset: usize },
    Create { owner: String, name: String },
}

impl GatewayCall {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            GatewayCall::Replace { .. } | GatewayCall::Add { .. } | GatewayCall::Remove { .. }
        )
    }
}

/// In-memory remote API.
///
/// Unknown collections raise `NotFound`. Mutating calls larger than the
/// batch limit raise `UpstreamUnavailable` so tests notice missing batching.
pub struct MemoryGateway {
    collections: Mutex<HashMap<String, Vec<String>>>,
    search_results: Mutex<HashMap<String, Vec<String>>>,
    failures: Mutex<HashMap<String, GatewayError>>,
    search_failure: Mutex<Option<(usize, GatewayError)>>,
    calls: Mutex<Vec<GatewayCall>>,
    batch_limit: usize,
    next_id: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::with_batch_limit(mixtape_core::gateway::DEFAULT_BATCH_LIMIT)
    }

    pub fn with_batch_limit(batch_limit: usize) -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            search_results: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            search_failure: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            batch_limit,
            next_id: AtomicUsize::new(1),
        }
    }

    /// Create or overwrite a collection.
    pub fn set_items<S: AsRef<str>>(&self, collection: &str, ids: &[S]) {
        let ids = ids.iter().map(|s| s.as_ref().to_string()).collect();
        self.collections.lock().unwrap().insert(collection.to_string(), ids);
    }

    /// Current contents of a collection (empty if unknown).
    pub fn items(&self, collection: &str) -> Vec<String> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_collection(&self, collection: &str) -> bool {
        self.collections.lock().unwrap().contains_key(collection)
    }

    /// Canned result ids for a search query, served page by page.
    pub fn set_search_results<S: AsRef<str>>(&self, query: &str, ids: &[S]) {
        let ids = ids.iter().map(|s| s.as_ref().to_string()).collect();
        self.search_results.lock().unwrap().insert(query.to_string(), ids);
    }

    /// Every call touching `collection` fails with `err`.
    pub fn fail_collection(&self, collection: &str, err: GatewayError) {
        self.failures.lock().unwrap().insert(collection.to_string(), err);
    }

    pub fn fail_search(&self, err: GatewayError) {
        self.fail_search_from(0, err);
    }

    /// Search pages starting at `offset` or later fail with `err`.
    pub fn fail_search_from(&self, offset: usize, err: GatewayError) {
        *self.search_failure.lock().unwrap() = Some((offset, err));
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutation_calls(&self) -> Vec<GatewayCall> {
        self.calls().into_iter().filter(GatewayCall::is_mutation).collect()
    }

    fn record(&self, call: GatewayCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, collection: &str) -> Result<(), GatewayError> {
        if let Some(err) = self.failures.lock().unwrap().get(collection) {
            return Err(err.clone());
        }
        if !self.has_collection(collection) {
            return Err(GatewayError::not_found(collection));
        }
        Ok(())
    }

    fn check_batch(&self, ids: &[String]) -> Result<(), GatewayError> {
        if ids.len() > self.batch_limit {
            return Err(GatewayError::UpstreamUnavailable(format!(
                "batch of {} exceeds limit {}",
                ids.len(),
                self.batch_limit
            )));
        }
        Ok(())
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlaylistGateway for MemoryGateway {
    async fn list_items(&self, collection_id: &str) -> Result<Vec<Item>, GatewayError> {
        self.record(GatewayCall::List(collection_id.to_string()));
        self.check(collection_id)?;
        Ok(self.items(collection_id).iter().map(|id| Item::new(id)).collect())
    }

    async fn replace_items(
        &self,
        collection_id: &str,
        item_ids: &[String],
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::Replace {
            collection: collection_id.to_string(),
            count: item_ids.len(),
        });
        self.check(collection_id)?;
        self.check_batch(item_ids)?;
        self.set_items(collection_id, item_ids);
        Ok(())
    }

    async fn add_items(&self, collection_id: &str, item_ids: &[String]) -> Result<(), GatewayError> {
        self.record(GatewayCall::Add {
            collection: collection_id.to_string(),
            count: item_ids.len(),
        });
        self.check(collection_id)?;
        self.check_batch(item_ids)?;
        let mut collections = self.collections.lock().unwrap();
        if let Some(items) = collections.get_mut(collection_id) {
            items.extend(item_ids.iter().cloned());
        }
        Ok(())
    }

    async fn remove_items(
        &self,
        collection_id: &str,
        item_ids: &[String],
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::Remove {
            collection: collection_id.to_string(),
            count: item_ids.len(),
        });
        self.check(collection_id)?;
        self.check_batch(item_ids)?;
        let mut collections = self.collections.lock().unwrap();
        if let Some(items) = collections.get_mut(collection_id) {
            items.retain(|id| !item_ids.contains(id));
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Item>, GatewayError> {
        self.record(GatewayCall::Search {
            query: query.to_string(),
            limit,
            offset,
        });
        if let Some((from, err)) = self.search_failure.lock().unwrap().clone() {
            if offset >= from {
                return Err(err);
            }
        }
        let results = self.search_results.lock().unwrap();
        Ok(results
            .get(query)
            .map(|ids| {
                ids.iter()
                    .skip(offset)
                    .take(limit)
                    .map(|id| Item::new(id))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_collection(&self, owner_id: &str, name: &str) -> Result<String, GatewayError> {
        self.record(GatewayCall::Create {
            owner: owner_id.to_string(),
            name: name.to_string(),
        });
        let id = format!("created-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.collections.lock().unwrap().insert(id.clone(), Vec::new());
        Ok(id)
    }

    fn batch_limit(&self) -> usize {
        self.batch_limit
    }
}

//! Wiring shared by the handler tests.

use std::sync::Arc;

use async_trait::async_trait;
use mixtape_core::config::ResolverConfig;
use mixtape_core::{JobType, Recurrence, Schedule};
use mixtape_resolver::{FetchError, PageFetcher, PageForm, SourceResolver, SourceStore};
use mixtape_snapshots::SnapshotStore;
use mixtape_test_utils::MemoryGateway;
use rusqlite::Connection;

use crate::algorithm::AlgorithmRegistry;
use crate::archive::ArchivePairs;
use crate::executor::JobExecutor;
use crate::handler::JobHandler;
use crate::raid::RaidHandler;
use crate::reshuffle::ReshuffleHandler;
use crate::rotate::RotateHandler;

/// Public pages are never reachable in unit tests.
pub(crate) struct NoPages;

#[async_trait]
impl PageFetcher for NoPages {
    async fn fetch(&self, form: PageForm, _collection_id: &str) -> Result<String, FetchError> {
        Err(FetchError::Status {
            status: 404,
            url: form.as_str().to_string(),
        })
    }
}

pub(crate) struct Fixture {
    pub gateway: Arc<MemoryGateway>,
    pub snapshots: Arc<SnapshotStore>,
    pub sources: Arc<SourceStore>,
    pub archives: Arc<ArchivePairs>,
}

fn memory_db(init: impl FnOnce(&Connection)) -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    init(&conn);
    conn
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(MemoryGateway::new(), true)
    }

    pub fn with_batch_limit(limit: usize) -> Self {
        Self::build(MemoryGateway::with_batch_limit(limit), true)
    }

    /// Snapshot table never created, so every capture fails.
    pub fn with_broken_snapshots() -> Self {
        Self::build(MemoryGateway::new(), false)
    }

    fn build(gateway: MemoryGateway, snapshot_schema: bool) -> Self {
        let snapshots = memory_db(|c| {
            if snapshot_schema {
                mixtape_snapshots::db::init_db(c).unwrap();
            }
        });
        let sources = memory_db(|c| mixtape_resolver::db::init_db(c).unwrap());
        let archives = memory_db(|c| crate::archive::init_db(c).unwrap());
        Self {
            gateway: Arc::new(gateway),
            snapshots: Arc::new(SnapshotStore::new(snapshots, 50)),
            sources: Arc::new(SourceStore::new(sources)),
            archives: Arc::new(ArchivePairs::new(archives)),
        }
    }

    pub fn schedule(&self, job_type: JobType, target: &str, params: serde_json::Value) -> Schedule {
        Schedule::new("u1", target, "Test Mix", job_type, params, Recurrence::interval("daily"))
    }

    pub fn resolver(&self) -> Arc<SourceResolver> {
        Arc::new(SourceResolver::new(
            self.gateway.clone(),
            Arc::new(NoPages),
            &ResolverConfig::default(),
        ))
    }

    pub fn reshuffle(&self) -> ReshuffleHandler {
        ReshuffleHandler::new(
            self.gateway.clone(),
            self.snapshots.clone(),
            AlgorithmRegistry::default(),
        )
    }

    pub fn raid(&self) -> RaidHandler {
        RaidHandler::new(
            self.gateway.clone(),
            self.snapshots.clone(),
            self.sources.clone(),
            self.resolver(),
        )
    }

    pub fn rotate(&self) -> RotateHandler {
        RotateHandler::new(
            self.gateway.clone(),
            self.snapshots.clone(),
            self.archives.clone(),
        )
    }

    pub fn executor(&self) -> JobExecutor {
        let handlers: Vec<Arc<dyn JobHandler>> = vec![
            Arc::new(self.reshuffle()),
            Arc::new(self.raid()),
            Arc::new(self.rotate()),
        ];
        JobExecutor::new(handlers)
    }
}

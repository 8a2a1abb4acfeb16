use std::sync::Arc;

use mixtape_core::{JobError, PlaylistGateway, SnapshotCause};
use mixtape_snapshots::SnapshotStore;
use tracing::{info, instrument, warn};

use crate::batch::{add_batched, replace_batched};
use crate::error::Result;
use crate::handler::list_ids;

/// Where a snapshot's ordering is written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreTarget {
    /// Overwrite the collection the snapshot was taken from.
    Original,
    /// Create a fresh collection with this name.
    NewCollection { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub collection_id: String,
    pub items: usize,
    /// Snapshot of the overwritten state, when restoring over the original.
    pub pre_restore_snapshot_id: Option<String>,
}

/// Applies stored snapshots through the gateway.
pub struct SnapshotRestorer {
    gateway: Arc<dyn PlaylistGateway>,
    snapshots: Arc<SnapshotStore>,
}

impl SnapshotRestorer {
    pub fn new(gateway: Arc<dyn PlaylistGateway>, snapshots: Arc<SnapshotStore>) -> Self {
        Self { gateway, snapshots }
    }

    #[instrument(skip(self))]
    pub async fn restore(
        &self,
        owner_id: &str,
        snapshot_id: &str,
        target: RestoreTarget,
    ) -> Result<RestoreReport> {
        let snapshot = self.snapshots.get(owner_id, snapshot_id)?;
        let gw = self.gateway.as_ref();

        let report = match target {
            RestoreTarget::Original => {
                let collection = snapshot.collection_id.as_str();
                let current = list_ids(gw, collection).await?;
                let pre_restore = match self.snapshots.capture(
                    owner_id,
                    collection,
                    &snapshot.collection_name,
                    &current,
                    SnapshotCause::PreRestore,
                    Some(&format!("before restoring {snapshot_id}")),
                ) {
                    Ok(s) => Some(s.id),
                    Err(e) => {
                        warn!(collection = %collection, error = %e, "pre-restore snapshot failed, continuing");
                        None
                    }
                };
                replace_batched(gw, collection, &snapshot.item_ids)
                    .await
                    .map_err(|e| JobError::from_gateway(e, collection))?;
                RestoreReport {
                    collection_id: collection.to_string(),
                    items: snapshot.item_ids.len(),
                    pre_restore_snapshot_id: pre_restore,
                }
            }
            RestoreTarget::NewCollection { name } => {
                let collection = gw
                    .create_collection(owner_id, &name)
                    .await
                    .map_err(|e| JobError::from_gateway(e, &name))?;
                add_batched(gw, &collection, &snapshot.item_ids)
                    .await
                    .map_err(|e| JobError::from_gateway(e, &collection))?;
                RestoreReport {
                    collection_id: collection,
                    items: snapshot.item_ids.len(),
                    pre_restore_snapshot_id: None,
                }
            }
        };

        info!(
            snapshot_id = %snapshot_id,
            collection = %report.collection_id,
            items = report.items,
            "snapshot restored"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixtape_snapshots::SnapshotError;
    use mixtape_test_utils::GatewayCall;

    use crate::error::RestoreError;
    use crate::testing::Fixture;

    fn restorer(fx: &Fixture) -> SnapshotRestorer {
        SnapshotRestorer::new(fx.gateway.clone(), fx.snapshots.clone())
    }

    fn capture(fx: &Fixture, collection: &str, items: &[&str]) -> String {
        let ids: Vec<String> = items.iter().map(|s| s.to_string()).collect();
        fx.snapshots
            .capture("u1", collection, "Mix", &ids, SnapshotCause::Manual, None)
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn restores_over_original_with_pre_restore_snapshot() {
        let fx = Fixture::with_batch_limit(2);
        let snap = capture(&fx, "mix", &["a", "b", "c"]);
        fx.gateway.set_items("mix", &["z"]);

        let report = restorer(&fx)
            .restore("u1", &snap, RestoreTarget::Original)
            .await
            .unwrap();
        assert_eq!(fx.gateway.items("mix"), vec!["a", "b", "c"]);
        assert_eq!(report.items, 3);

        let pre = fx
            .snapshots
            .get("u1", report.pre_restore_snapshot_id.as_deref().unwrap())
            .unwrap();
        assert_eq!(pre.item_ids, vec!["z"]);
        assert_eq!(pre.cause, SnapshotCause::PreRestore);
    }

    #[tokio::test]
    async fn restores_into_new_collection() {
        let fx = Fixture::new();
        let snap = capture(&fx, "mix", &["a", "b"]);

        let report = restorer(&fx)
            .restore(
                "u1",
                &snap,
                RestoreTarget::NewCollection {
                    name: "Mix (restored)".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(fx.gateway.items(&report.collection_id), vec!["a", "b"]);
        assert!(fx.gateway.calls().contains(&GatewayCall::Create {
            owner: "u1".into(),
            name: "Mix (restored)".into()
        }));
        assert!(!fx.gateway.has_collection("mix"));
    }

    #[tokio::test]
    async fn other_owners_snapshot_is_not_found() {
        let fx = Fixture::new();
        let snap = capture(&fx, "mix", &["a"]);
        let err = restorer(&fx)
            .restore("u2", &snap, RestoreTarget::Original)
            .await
            .unwrap_err();
        assert!(matches!(err, RestoreError::Snapshot(SnapshotError::NotFound { .. })));
        assert!(fx.gateway.calls().is_empty());
    }
}

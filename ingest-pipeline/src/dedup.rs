use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use ingest_common::health::HealthHandle;
use ingest_common::record::Record;
use ingest_common::store::{DocumentStore, StoreError};
use metrics::gauge;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::StageError;
use crate::stage::{Transform, Transformed};

/// Gate in front of the enrichment chain that discards records whose key
/// the store already holds.
///
/// Membership is a snapshot of the store's keys, replaced wholesale on a
/// timer and never mutated per record. Between refreshes the snapshot goes
/// stale, so a burst of duplicates inside one refresh window is admitted
/// on purpose; the store's uniqueness constraint catches them at the sink.
/// Admission checks read an immutable snapshot behind an `Arc` swap and
/// never observe a half-built set.
pub struct DedupFilter {
    collection: String,
    store: Arc<dyn DocumentStore>,
    snapshot: RwLock<Arc<HashSet<String>>>,
}

impl DedupFilter {
    pub fn new(store: Arc<dyn DocumentStore>, collection: &str) -> Arc<Self> {
        Arc::new(Self {
            collection: collection.to_owned(),
            store,
            snapshot: RwLock::new(Arc::new(HashSet::new())),
        })
    }

    pub fn admit(&self, key: &str) -> bool {
        let snapshot = self
            .snapshot
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default();
        !snapshot.contains(key)
    }

    /// Load the key set from the store and install it as the new snapshot.
    /// On failure the previous snapshot stays in effect.
    pub async fn refresh(&self) -> Result<usize, StoreError> {
        let keys = self.store.fetch_keys(&self.collection).await?;
        let size = keys.len();

        if let Ok(mut guard) = self.snapshot.write() {
            *guard = Arc::new(keys);
        }
        gauge!("dedup_known_keys", "collection" => self.collection.clone()).set(size as f64);
        debug!("refreshed dedup snapshot for {}: {} keys", self.collection, size);
        Ok(size)
    }

    /// Refresh the snapshot on a fixed interval, independently of message
    /// flow. A failed refresh is logged and retried on the next tick.
    pub fn spawn_refresher(
        self: &Arc<Self>,
        interval: Duration,
        liveness: Option<HealthHandle>,
    ) -> JoinHandle<()> {
        let filter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = filter.refresh().await {
                    warn!(
                        "dedup refresh for {} failed, keeping previous snapshot: {}",
                        filter.collection, err
                    );
                }
                if let Some(liveness) = &liveness {
                    liveness.report_healthy().await;
                }
            }
        })
    }
}

#[async_trait]
impl<R: Record> Transform<R> for DedupFilter {
    fn name(&self) -> &str {
        "dedup_filter"
    }

    async fn apply(&self, record: R) -> Result<Transformed<R>, StageError> {
        if self.admit(record.key()) {
            Ok(Transformed::Ok(record))
        } else {
            Ok(Transformed::Discard)
        }
    }
}

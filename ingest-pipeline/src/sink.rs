use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use ingest_common::record::Record;
use ingest_common::store::{DocumentStore, UpsertOutcome};
use metrics::counter;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{SinkError, StageError};
use crate::stage::{Transform, Transformed};

/// Outcome of one write through the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The key was already stored, typically an at-least-once redelivery
    /// or a duplicate admitted during a stale dedup window.
    Duplicate,
}

/// Terminal stage: normalizes the record's timestamp, stamps `insert_date`
/// and performs a uniqueness-constrained insert. Shared by every pipeline,
/// parameterized only by the target collection.
///
/// Run it at width 1 so one key's writes never race each other.
pub struct IdempotentSink {
    stage_name: String,
    collection: String,
    store: Arc<dyn DocumentStore>,
}

impl IdempotentSink {
    pub fn new(store: Arc<dyn DocumentStore>, collection: &str) -> Arc<Self> {
        Arc::new(Self {
            stage_name: format!("write_{collection}"),
            collection: collection.to_owned(),
            store,
        })
    }

    pub async fn write<R: Record>(&self, record: &mut R) -> Result<WriteOutcome, SinkError> {
        record.normalize_timestamp()?;

        let mut document = serde_json::to_value(&*record)?;
        if let Value::Object(map) = &mut document {
            map.insert("insert_date".to_owned(), json!(Utc::now()));
        }

        let outcome = self
            .store
            .upsert_unique(&self.collection, record.key(), document)
            .await?;

        match outcome {
            UpsertOutcome::Inserted => {
                self.count_outcome("written");
                info!("inserted record {} into {}", record.key(), self.collection);
                Ok(WriteOutcome::Written)
            }
            UpsertOutcome::Duplicate => {
                self.count_outcome("duplicate");
                info!(
                    "skipped duplicate record {} for {}",
                    record.key(),
                    self.collection
                );
                Ok(WriteOutcome::Duplicate)
            }
        }
    }

    fn count_outcome(&self, outcome: &'static str) {
        counter!(
            "sink_writes_total",
            "collection" => self.collection.clone(),
            "outcome" => outcome
        )
        .increment(1);
    }
}

#[async_trait]
impl<R: Record> Transform<R> for IdempotentSink {
    fn name(&self) -> &str {
        &self.stage_name
    }

    async fn apply(&self, mut record: R) -> Result<Transformed<R>, StageError> {
        match self.write(&mut record).await {
            Ok(_) => Ok(Transformed::Ok(record)),
            Err(err) => Err(StageError::failed(err)),
        }
    }
}

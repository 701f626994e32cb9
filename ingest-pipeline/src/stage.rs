use std::sync::Arc;

use async_trait::async_trait;
use ingest_common::record::Record;
use metrics::counter;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::StageError;

/// Outcome of applying a transform to one record.
#[derive(Debug)]
pub enum Transformed<R> {
    /// Forward on the stage's primary output.
    Ok(R),
    /// Forward on the stage's fallback output. A recognized degrade
    /// condition, not an error.
    Degraded(R),
    /// Terminally handled; the record does not advance further.
    Discard,
}

/// One enrichment step. Implementations are pure with respect to the
/// pipeline: any I/O they perform (extraction fetches, store writes) is
/// their own and surfaces only through the returned result.
#[async_trait]
pub trait Transform<R>: Send + Sync {
    fn name(&self) -> &str;

    async fn apply(&self, record: R) -> Result<Transformed<R>, StageError>;
}

/// Runs one transform with a pool of workers pulling from a shared input
/// channel. Failure handling is uniform across every stage: catch, log
/// with the record's key and the stage name, drop. One record's failure
/// never reaches its siblings.
///
/// Ordering across records is not preserved for `width > 1`; only the
/// order of stages is guaranteed per record.
pub(crate) struct StageRunner<R: Record> {
    name: Arc<str>,
    transform: Arc<dyn Transform<R>>,
    input: Arc<Mutex<mpsc::Receiver<R>>>,
    ok_out: Option<mpsc::Sender<R>>,
    degraded_out: Option<mpsc::Sender<R>>,
    width: usize,
}

impl<R: Record> StageRunner<R> {
    pub(crate) fn new(
        transform: Arc<dyn Transform<R>>,
        input: mpsc::Receiver<R>,
        ok_out: Option<mpsc::Sender<R>>,
        degraded_out: Option<mpsc::Sender<R>>,
        width: usize,
    ) -> Self {
        Self {
            name: Arc::from(transform.name()),
            transform,
            input: Arc::new(Mutex::new(input)),
            ok_out,
            degraded_out,
            width: width.max(1),
        }
    }

    pub(crate) fn spawn(self, tasks: &mut JoinSet<()>) {
        for _ in 0..self.width {
            tasks.spawn(run_worker(
                self.name.clone(),
                self.transform.clone(),
                self.input.clone(),
                self.ok_out.clone(),
                self.degraded_out.clone(),
            ));
        }
    }
}

async fn run_worker<R: Record>(
    name: Arc<str>,
    transform: Arc<dyn Transform<R>>,
    input: Arc<Mutex<mpsc::Receiver<R>>>,
    ok_out: Option<mpsc::Sender<R>>,
    degraded_out: Option<mpsc::Sender<R>>,
) {
    loop {
        // Hold the lock only for the receive; the record is owned by this
        // worker alone from here to the hand-off.
        let received = { input.lock().await.recv().await };
        let Some(record) = received else {
            break;
        };

        let key = record.key().to_owned();
        match transform.apply(record).await {
            Ok(Transformed::Ok(record)) => {
                record_outcome(&name, "forwarded");
                let Some(out) = &ok_out else {
                    continue; // terminal stage
                };
                if out.send(record).await.is_err() {
                    warn!("output of stage {} closed, stopping worker", name);
                    break;
                }
            }
            Ok(Transformed::Degraded(record)) => {
                record_outcome(&name, "degraded");
                match &degraded_out {
                    Some(out) => {
                        if out.send(record).await.is_err() {
                            warn!("fallback output of stage {} closed, stopping worker", name);
                            break;
                        }
                    }
                    None => {
                        error!(
                            "stage {} degraded record {} but has no fallback output, dropping",
                            name, key
                        );
                    }
                }
            }
            Ok(Transformed::Discard) => {
                record_outcome(&name, "discarded");
                info!("discarded record {} at stage {}", key, name);
            }
            Err(StageError::Unavailable(reason)) => {
                record_outcome(&name, "dropped");
                warn!("dropping record {} at stage {}: {}", key, name, reason);
            }
            Err(err) => {
                record_outcome(&name, "dropped");
                error!("dropping record {} at stage {}: {:?}", key, name, err);
            }
        }
    }
}

fn record_outcome(stage: &Arc<str>, outcome: &'static str) {
    counter!(
        "pipeline_records_total",
        "stage" => stage.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_common::time::TimestampError;
    use serde::Serialize;

    #[derive(Serialize, Clone, Debug, PartialEq)]
    struct TestRecord {
        key: String,
        value: u32,
    }

    impl Record for TestRecord {
        fn key(&self) -> &str {
            &self.key
        }

        fn normalize_timestamp(&mut self) -> Result<(), TimestampError> {
            Ok(())
        }
    }

    struct Doubler;

    #[async_trait]
    impl Transform<TestRecord> for Doubler {
        fn name(&self) -> &str {
            "doubler"
        }

        async fn apply(&self, mut record: TestRecord) -> Result<Transformed<TestRecord>, StageError> {
            if record.value == 13 {
                return Err(StageError::message("unlucky"));
            }
            record.value *= 2;
            Ok(Transformed::Ok(record))
        }
    }

    fn record(key: &str, value: u32) -> TestRecord {
        TestRecord {
            key: key.to_owned(),
            value,
        }
    }

    #[tokio::test]
    async fn test_runner_forwards_transformed_records() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);

        let mut tasks = JoinSet::new();
        StageRunner::new(Arc::new(Doubler), in_rx, Some(out_tx), None, 1).spawn(&mut tasks);

        in_tx.send(record("a", 2)).await.unwrap();
        drop(in_tx);

        assert_eq!(out_rx.recv().await.unwrap().value, 4);
        assert!(out_rx.recv().await.is_none());
        while tasks.join_next().await.is_some() {}
    }

    #[tokio::test]
    async fn test_failing_record_does_not_stop_siblings() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);

        let mut tasks = JoinSet::new();
        StageRunner::new(Arc::new(Doubler), in_rx, Some(out_tx), None, 2).spawn(&mut tasks);

        for (key, value) in [("a", 1), ("b", 13), ("c", 3)] {
            in_tx.send(record(key, value)).await.unwrap();
        }
        drop(in_tx);

        let mut survivors = Vec::new();
        while let Some(out) = out_rx.recv().await {
            survivors.push(out.key);
        }
        survivors.sort();
        assert_eq!(survivors, vec!["a", "c"]);
        while tasks.join_next().await.is_some() {}
    }
}

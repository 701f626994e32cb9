use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

/// Enumeration of errors for operations against the document store.
/// Errors can originate from sqlx and are wrapped by us to provide additional context.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
    #[error("'{0}' is not a valid collection name")]
    InvalidCollectionName(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a uniqueness-constrained insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// A document with the same key already exists. Expected under
    /// at-least-once delivery, not an error.
    Duplicate,
}

/// The durable store behind the pipeline sink, reduced to the two
/// operations the pipeline needs: a uniqueness-constrained insert and a
/// full key scan for the dedup filter.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn upsert_unique(
        &self,
        collection: &str,
        key: &str,
        document: Value,
    ) -> Result<UpsertOutcome, StoreError>;

    async fn fetch_keys(&self, collection: &str) -> Result<HashSet<String>, StoreError>;
}

/// A document store on top of PostgreSQL: one table per collection with a
/// `key` column under a primary-key constraint and the document as JSONB.
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub async fn new(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|error| StoreError::ConnectionError { error })?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the collection table and its uniqueness constraint. Called
    /// once at setup, never on the write path.
    pub async fn ensure_collection(&self, collection: &str) -> Result<(), StoreError> {
        let table = quoted_table(collection)?;

        let query = format!(
            r#"
CREATE TABLE IF NOT EXISTS {table} (
    key TEXT PRIMARY KEY,
    document JSONB NOT NULL
)
            "#
        );
        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|error| StoreError::QueryError {
                command: "CREATE TABLE".to_owned(),
                error,
            })?;

        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn upsert_unique(
        &self,
        collection: &str,
        key: &str,
        document: Value,
    ) -> Result<UpsertOutcome, StoreError> {
        let table = quoted_table(collection)?;

        let query = format!(
            "INSERT INTO {table} (key, document) VALUES ($1, $2) ON CONFLICT (key) DO NOTHING"
        );
        let result = sqlx::query(&query)
            .bind(key)
            .bind(sqlx::types::Json(document))
            .execute(&self.pool)
            .await
            .map_err(|error| StoreError::QueryError {
                command: "INSERT".to_owned(),
                error,
            })?;

        if result.rows_affected() == 0 {
            Ok(UpsertOutcome::Duplicate)
        } else {
            Ok(UpsertOutcome::Inserted)
        }
    }

    async fn fetch_keys(&self, collection: &str) -> Result<HashSet<String>, StoreError> {
        let table = quoted_table(collection)?;

        let query = format!("SELECT key FROM {table}");
        let keys: Vec<String> = sqlx::query_scalar(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| StoreError::QueryError {
                command: "SELECT".to_owned(),
                error,
            })?;

        Ok(keys.into_iter().collect())
    }
}

/// Collection names come from configuration, not user input, but they are
/// interpolated into SQL and so are restricted to a safe character set.
fn quoted_table(collection: &str) -> Result<String, StoreError> {
    let valid = !collection.is_empty()
        && collection
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '.');
    if !valid {
        return Err(StoreError::InvalidCollectionName(collection.to_owned()));
    }
    Ok(format!("\"{collection}\""))
}

/// An in-memory store for tests: same contract, plus an injectable failure
/// switch and direct access to what was written.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, BTreeMap<String, Value>>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent store call fail, as if the store were unreachable.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Seed a key directly, bypassing the pipeline. Used to model rows
    /// written by other producers between dedup refreshes.
    pub fn seed_key(&self, collection: &str, key: &str) {
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_owned())
            .or_default()
            .insert(key.to_owned(), Value::Null);
    }

    pub fn documents(&self, collection: &str) -> Vec<Value> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn document(&self, collection: &str, key: &str) -> Option<Value> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected failure".to_owned()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert_unique(
        &self,
        collection: &str,
        key: &str,
        document: Value,
    ) -> Result<UpsertOutcome, StoreError> {
        self.check_available()?;

        let mut collections = self.collections.lock().unwrap();
        let docs = collections.entry(collection.to_owned()).or_default();
        if docs.contains_key(key) {
            Ok(UpsertOutcome::Duplicate)
        } else {
            docs.insert(key.to_owned(), document);
            Ok(UpsertOutcome::Inserted)
        }
    }

    async fn fetch_keys(&self, collection: &str) -> Result<HashSet<String>, StoreError> {
        self.check_available()?;

        Ok(self
            .collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default())
    }
}

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use super::schema::RecordKey;
use crate::transition_log::{LogSink, TransitionLogEntry};

/// Errors raised by record stores and log sinks
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Transition log entry {id:?} not found")]
    MissingLogEntry { id: Option<i64> },

    #[error("Stored data is corrupt: {reason}")]
    Corrupt { reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "database")]
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// A row write and its log entry, committed together
#[derive(Debug, Clone)]
pub struct StateChange {
    pub key: RecordKey,
    /// `(field, state name)` pairs to store; empty leaves the stored row untouched
    pub states: Vec<(String, String)>,
    /// Entry for the store's log sink; `None` skips logging
    pub log: Option<TransitionLogEntry>,
}

/// Persistence layer for state columns
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn load_state(&self, key: &RecordKey, field: &str) -> Result<Option<String>, PersistenceError>;

    async fn save_state(&self, key: &RecordKey, field: &str, state: &str) -> Result<(), PersistenceError>;

    /// Apply a state change; either both the row and the log entry are
    /// written or neither is. Returns the stored log entry, if any.
    async fn commit(&self, change: StateChange) -> Result<Option<TransitionLogEntry>, PersistenceError>;

    /// Ids of stored records for a model, ascending
    async fn record_ids(&self, model: &str) -> Result<Vec<i64>, PersistenceError>;

    /// Sink receiving transition entries committed through this store
    fn log_sink(&self) -> Option<Arc<dyn LogSink>>;
}

type Rows = BTreeMap<RecordKey, HashMap<String, String>>;

/// In-memory record store, mostly for tests and tooling
#[derive(Default)]
pub struct MemoryRecordStore {
    rows: RwLock<Rows>,
    log: Option<Arc<dyn LogSink>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log = Some(sink);
        self
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn load_state(&self, key: &RecordKey, field: &str) -> Result<Option<String>, PersistenceError> {
        let rows = self.rows.read().await;
        Ok(rows.get(key).and_then(|fields| fields.get(field)).cloned())
    }

    async fn save_state(&self, key: &RecordKey, field: &str, state: &str) -> Result<(), PersistenceError> {
        let mut rows = self.rows.write().await;
        rows.entry(key.clone())
            .or_default()
            .insert(field.to_string(), state.to_string());
        Ok(())
    }

    async fn commit(&self, change: StateChange) -> Result<Option<TransitionLogEntry>, PersistenceError> {
        // Held across the log write so the row only changes once the entry is stored
        let mut rows = self.rows.write().await;

        let logged = match (change.log, &self.log) {
            (Some(entry), Some(sink)) => Some(sink.record(entry).await?),
            _ => None,
        };

        if !change.states.is_empty() {
            rows.entry(change.key).or_default().extend(change.states);
        }
        Ok(logged)
    }

    async fn record_ids(&self, model: &str) -> Result<Vec<i64>, PersistenceError> {
        let rows = self.rows.read().await;
        Ok(rows.keys().filter(|key| key.model == model).map(|key| key.id).collect())
    }

    fn log_sink(&self) -> Option<Arc<dyn LogSink>> {
        self.log.clone()
    }
}

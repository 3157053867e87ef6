#[cfg(feature = "database")]
use anyhow::Result;
#[cfg(feature = "database")]
use async_trait::async_trait;
#[cfg(feature = "database")]
use chrono::{DateTime, Utc};
#[cfg(feature = "database")]
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqlitePoolOptions, SqliteRow},
    Row, SqliteConnection, SqlitePool,
};
#[cfg(feature = "database")]
use std::sync::Arc;
#[cfg(feature = "database")]
use tracing::{debug, info};

#[cfg(feature = "database")]
use crate::config::TransitionLogConfig;
#[cfg(feature = "database")]
use crate::records::{PersistenceError, RecordKey, RecordStore, StateChange};
#[cfg(feature = "database")]
use crate::transition_log::{ExtraLogAttribute, LogShape, LogSink, SubjectKind, SubjectRef, TransitionLogEntry};

#[cfg(feature = "database")]
/// Database manager for state columns and transition logs
pub struct DatabaseManager {
    pool: SqlitePool,
}

#[cfg(feature = "database")]
impl DatabaseManager {
    /// Initialize database with automatic migrations
    pub async fn new(database_url: &str, max_connections: u32, auto_migrate: bool) -> Result<Self> {
        // Create database if it doesn't exist
        if !sqlx::Sqlite::database_exists(database_url).await? {
            info!("Creating database at {}", database_url);
            sqlx::Sqlite::create_database(database_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        if auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Database migrations completed");
        }

        Ok(Self { pool })
    }

    /// Wrap an existing pool, running migrations on it
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, PersistenceError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Transition log for records of `model`.
    ///
    /// Direct subjects carry only an id, so their rows are stored under the
    /// model label to keep logs of different models apart.
    pub fn transition_log(&self, shape: LogShape, subject_kind: SubjectKind, model: &str) -> SqliteTransitionLog {
        SqliteTransitionLog {
            pool: self.pool.clone(),
            model: model.to_string(),
            shape,
            subject_kind,
            extra_attributes: Vec::new(),
        }
    }

    /// Transition log described by `settings`; `None` when logging is disabled
    pub fn configured_log(&self, settings: &TransitionLogConfig, model: &str) -> Option<SqliteTransitionLog> {
        if !settings.enabled {
            debug!(model = %model, "Transition logging disabled");
            return None;
        }
        let log = settings
            .extra_attributes
            .iter()
            .cloned()
            .fold(self.transition_log(settings.shape, settings.subject, model), |log, attribute| {
                log.with_extra_attribute(attribute)
            });
        Some(log)
    }

    pub fn record_store(&self) -> SqliteRecordStore {
        SqliteRecordStore {
            pool: self.pool.clone(),
            log: None,
        }
    }

    /// Close database connections gracefully
    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
        info!("Database connections closed");
    }
}

#[cfg(feature = "database")]
/// State columns stored in the `record_states` table
pub struct SqliteRecordStore {
    pool: SqlitePool,
    log: Option<Arc<SqliteTransitionLog>>,
}

#[cfg(feature = "database")]
impl SqliteRecordStore {
    /// Log transitions to `log` inside the same database transaction as the state write
    pub fn with_log(mut self, log: Arc<SqliteTransitionLog>) -> Self {
        self.log = Some(log);
        self
    }
}

#[cfg(feature = "database")]
async fn upsert_state(conn: &mut SqliteConnection, key: &RecordKey, field: &str, state: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO record_states (model, record_id, field, state, updated_at)
        VALUES (?1, ?2, ?3, ?4, datetime('now'))
        ON CONFLICT (model, record_id, field)
        DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at
        "#,
    )
    .bind(&key.model)
    .bind(key.id)
    .bind(field)
    .bind(state)
    .execute(conn)
    .await?;
    Ok(())
}

#[cfg(feature = "database")]
#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn load_state(&self, key: &RecordKey, field: &str) -> Result<Option<String>, PersistenceError> {
        let row = sqlx::query(
            r#"
            SELECT state FROM record_states
            WHERE model = ?1 AND record_id = ?2 AND field = ?3
            "#,
        )
        .bind(&key.model)
        .bind(key.id)
        .bind(field)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.get("state")))
    }

    async fn save_state(&self, key: &RecordKey, field: &str, state: &str) -> Result<(), PersistenceError> {
        let mut conn = self.pool.acquire().await?;
        upsert_state(&mut *conn, key, field, state).await?;
        Ok(())
    }

    async fn commit(&self, change: StateChange) -> Result<Option<TransitionLogEntry>, PersistenceError> {
        let mut tx = self.pool.begin().await?;

        for (field, state) in &change.states {
            upsert_state(&mut *tx, &change.key, field, state).await?;
        }

        let logged = match (change.log, &self.log) {
            (Some(entry), Some(log)) => Some(log.write(&mut *tx, entry).await?),
            _ => None,
        };

        tx.commit().await?;
        debug!(record = %change.key, fields = change.states.len(), "Committed state change");
        Ok(logged)
    }

    async fn record_ids(&self, model: &str) -> Result<Vec<i64>, PersistenceError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT record_id FROM record_states
            WHERE model = ?1
            ORDER BY record_id ASC
            "#,
        )
        .bind(model)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("record_id")).collect())
    }

    fn log_sink(&self) -> Option<Arc<dyn LogSink>> {
        self.log.clone().map(|log| log as Arc<dyn LogSink>)
    }
}

#[cfg(feature = "database")]
/// Transition log stored in `transition_logs` (append-only) or
/// `last_transition_logs` (latest-only, unique per subject)
pub struct SqliteTransitionLog {
    pool: SqlitePool,
    model: String,
    shape: LogShape,
    subject_kind: SubjectKind,
    extra_attributes: Vec<ExtraLogAttribute>,
}

#[cfg(feature = "database")]
impl SqliteTransitionLog {
    pub fn with_extra_attribute(mut self, attribute: ExtraLogAttribute) -> Self {
        self.extra_attributes.push(attribute);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Stored `content_type` for a subject
    fn content_type<'a>(&'a self, subject: &'a SubjectRef) -> &'a str {
        subject.content_type().unwrap_or(self.model.as_str())
    }

    fn table(&self) -> &'static str {
        match self.shape {
            LogShape::AppendOnly => "transition_logs",
            LogShape::LatestOnly => "last_transition_logs",
        }
    }

    /// Insert (or, for latest-only logs, upsert) an entry on `conn`
    pub async fn write(
        &self,
        conn: &mut SqliteConnection,
        mut entry: TransitionLogEntry,
    ) -> Result<TransitionLogEntry, PersistenceError> {
        let extras = serde_json::to_string(&entry.extras)?;
        let content_type = self.content_type(&entry.subject).to_string();
        let content_id = entry.subject.content_id();

        match self.shape {
            LogShape::AppendOnly => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO transition_logs
                        (content_type, content_id, transition, from_state, to_state, timestamp, actor, extras)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                )
                .bind(&content_type)
                .bind(content_id)
                .bind(&entry.transition)
                .bind(&entry.from_state)
                .bind(&entry.to_state)
                .bind(entry.timestamp)
                .bind(&entry.actor)
                .bind(&extras)
                .execute(&mut *conn)
                .await?;
                entry.id = Some(result.last_insert_rowid());
            }
            LogShape::LatestOnly => {
                entry.timestamp = Utc::now();
                let row = sqlx::query(
                    r#"
                    INSERT INTO last_transition_logs
                        (content_type, content_id, transition, from_state, to_state, timestamp, actor, extras)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT (content_type, content_id) DO UPDATE SET
                        transition = excluded.transition,
                        from_state = excluded.from_state,
                        to_state = excluded.to_state,
                        timestamp = excluded.timestamp,
                        actor = excluded.actor,
                        extras = excluded.extras
                    RETURNING id
                    "#,
                )
                .bind(&content_type)
                .bind(content_id)
                .bind(&entry.transition)
                .bind(&entry.from_state)
                .bind(&entry.to_state)
                .bind(entry.timestamp)
                .bind(&entry.actor)
                .bind(&extras)
                .fetch_one(&mut *conn)
                .await?;
                entry.id = Some(row.get("id"));
            }
        }

        debug!(table = self.table(), subject = %entry.subject, transition = %entry.transition, "Wrote transition log entry");
        Ok(entry)
    }

    fn entry_from_row(&self, row: &SqliteRow) -> Result<TransitionLogEntry, PersistenceError> {
        let content_type: String = row.get("content_type");
        let content_id: i64 = row.get("content_id");
        let subject = match self.subject_kind {
            SubjectKind::Direct => SubjectRef::Direct { id: content_id },
            SubjectKind::Generic => SubjectRef::Generic { content_type, content_id },
        };
        let extras: String = row.get("extras");
        let timestamp: DateTime<Utc> = row.get("timestamp");

        Ok(TransitionLogEntry {
            id: Some(row.get("id")),
            subject,
            transition: row.get("transition"),
            from_state: row.get("from_state"),
            to_state: row.get("to_state"),
            timestamp,
            actor: row.get("actor"),
            extras: serde_json::from_str(&extras)?,
        })
    }
}

#[cfg(feature = "database")]
#[async_trait]
impl LogSink for SqliteTransitionLog {
    fn shape(&self) -> LogShape {
        self.shape
    }

    fn subject_kind(&self) -> SubjectKind {
        self.subject_kind
    }

    fn extra_attributes(&self) -> Vec<ExtraLogAttribute> {
        self.extra_attributes.clone()
    }

    async fn record(&self, entry: TransitionLogEntry) -> Result<TransitionLogEntry, PersistenceError> {
        let mut tx = self.pool.begin().await?;
        let stored = self.write(&mut *tx, entry).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn history(&self, subject: &SubjectRef) -> Result<Vec<TransitionLogEntry>, PersistenceError> {
        let query = format!(
            r#"
            SELECT id, content_type, content_id, transition, from_state, to_state, timestamp, actor, extras
            FROM {}
            WHERE content_type = ?1 AND content_id = ?2
            ORDER BY timestamp ASC, id ASC
            "#,
            self.table()
        );
        let rows = sqlx::query(&query)
            .bind(self.content_type(subject))
            .bind(subject.content_id())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|row| self.entry_from_row(row)).collect()
    }

    async fn update(&self, entry: &TransitionLogEntry) -> Result<(), PersistenceError> {
        let id = entry.id.ok_or(PersistenceError::MissingLogEntry { id: None })?;
        let query = format!(
            r#"
            UPDATE {}
            SET transition = ?1, from_state = ?2, to_state = ?3, timestamp = ?4, actor = ?5, extras = ?6
            WHERE id = ?7
            "#,
            self.table()
        );
        let result = sqlx::query(&query)
            .bind(&entry.transition)
            .bind(&entry.from_state)
            .bind(&entry.to_state)
            .bind(entry.timestamp)
            .bind(&entry.actor)
            .bind(serde_json::to_string(&entry.extras)?)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::MissingLogEntry { id: Some(id) });
        }
        Ok(())
    }
}

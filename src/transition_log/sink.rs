use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use super::types::{ExtraLogAttribute, LogShape, SubjectKind, SubjectRef, TransitionLogEntry};
use crate::records::PersistenceError;

/// Destination for transition history
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LogSink: Send + Sync {
    fn shape(&self) -> LogShape;

    fn subject_kind(&self) -> SubjectKind;

    /// Transition keyword arguments copied into each entry
    fn extra_attributes(&self) -> Vec<ExtraLogAttribute>;

    /// Store an entry and return it with its assigned id
    async fn record(&self, entry: TransitionLogEntry) -> Result<TransitionLogEntry, PersistenceError>;

    /// Entries for one subject, oldest first
    async fn history(&self, subject: &SubjectRef) -> Result<Vec<TransitionLogEntry>, PersistenceError>;

    /// Overwrite a stored entry, matched by id
    async fn update(&self, entry: &TransitionLogEntry) -> Result<(), PersistenceError>;
}

fn sort_oldest_first(entries: &mut [TransitionLogEntry]) {
    entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
}

#[derive(Default)]
struct AppendState {
    next_id: i64,
    entries: Vec<TransitionLogEntry>,
}

/// In-memory log keeping every transition
pub struct AppendOnlyLog {
    subject_kind: SubjectKind,
    extra_attributes: Vec<ExtraLogAttribute>,
    inner: RwLock<AppendState>,
}

impl AppendOnlyLog {
    pub fn new(subject_kind: SubjectKind) -> Self {
        Self {
            subject_kind,
            extra_attributes: Vec::new(),
            inner: RwLock::new(AppendState::default()),
        }
    }

    pub fn with_extra_attribute(mut self, attribute: ExtraLogAttribute) -> Self {
        self.extra_attributes.push(attribute);
        self
    }

    /// All entries, newest first
    pub async fn entries(&self) -> Vec<TransitionLogEntry> {
        let mut entries = self.inner.read().await.entries.clone();
        sort_oldest_first(&mut entries);
        entries.reverse();
        entries
    }
}

#[async_trait]
impl LogSink for AppendOnlyLog {
    fn shape(&self) -> LogShape {
        LogShape::AppendOnly
    }

    fn subject_kind(&self) -> SubjectKind {
        self.subject_kind
    }

    fn extra_attributes(&self) -> Vec<ExtraLogAttribute> {
        self.extra_attributes.clone()
    }

    async fn record(&self, mut entry: TransitionLogEntry) -> Result<TransitionLogEntry, PersistenceError> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        entry.id = Some(inner.next_id);
        inner.entries.push(entry.clone());
        debug!(subject = %entry.subject, transition = %entry.transition, "Appended transition log entry");
        Ok(entry)
    }

    async fn history(&self, subject: &SubjectRef) -> Result<Vec<TransitionLogEntry>, PersistenceError> {
        let inner = self.inner.read().await;
        let mut entries: Vec<_> = inner.entries.iter().filter(|e| &e.subject == subject).cloned().collect();
        sort_oldest_first(&mut entries);
        Ok(entries)
    }

    async fn update(&self, entry: &TransitionLogEntry) -> Result<(), PersistenceError> {
        let mut inner = self.inner.write().await;
        let slot = inner
            .entries
            .iter_mut()
            .find(|e| e.id.is_some() && e.id == entry.id)
            .ok_or(PersistenceError::MissingLogEntry { id: entry.id })?;
        *slot = entry.clone();
        Ok(())
    }
}

#[derive(Default)]
struct LatestState {
    next_id: i64,
    entries: HashMap<SubjectRef, TransitionLogEntry>,
}

/// In-memory log keeping only the latest transition per subject.
///
/// Concurrent writers for one subject are serialized by the sink's lock and
/// the last one to acquire it wins.
pub struct LatestOnlyLog {
    subject_kind: SubjectKind,
    extra_attributes: Vec<ExtraLogAttribute>,
    inner: RwLock<LatestState>,
}

impl LatestOnlyLog {
    pub fn new(subject_kind: SubjectKind) -> Self {
        Self {
            subject_kind,
            extra_attributes: Vec::new(),
            inner: RwLock::new(LatestState::default()),
        }
    }

    pub fn with_extra_attribute(mut self, attribute: ExtraLogAttribute) -> Self {
        self.extra_attributes.push(attribute);
        self
    }

    pub async fn latest(&self, subject: &SubjectRef) -> Option<TransitionLogEntry> {
        self.inner.read().await.entries.get(subject).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }
}

#[async_trait]
impl LogSink for LatestOnlyLog {
    fn shape(&self) -> LogShape {
        LogShape::LatestOnly
    }

    fn subject_kind(&self) -> SubjectKind {
        self.subject_kind
    }

    fn extra_attributes(&self) -> Vec<ExtraLogAttribute> {
        self.extra_attributes.clone()
    }

    async fn record(&self, entry: TransitionLogEntry) -> Result<TransitionLogEntry, PersistenceError> {
        let mut inner = self.inner.write().await;
        let stored = match inner.entries.get(&entry.subject).and_then(|existing| existing.id) {
            Some(id) => TransitionLogEntry {
                id: Some(id),
                timestamp: Utc::now(),
                ..entry
            },
            None => {
                inner.next_id += 1;
                TransitionLogEntry {
                    id: Some(inner.next_id),
                    ..entry
                }
            }
        };
        inner.entries.insert(stored.subject.clone(), stored.clone());
        debug!(subject = %stored.subject, transition = %stored.transition, "Upserted latest transition");
        Ok(stored)
    }

    async fn history(&self, subject: &SubjectRef) -> Result<Vec<TransitionLogEntry>, PersistenceError> {
        Ok(self.inner.read().await.entries.get(subject).cloned().into_iter().collect())
    }

    async fn update(&self, entry: &TransitionLogEntry) -> Result<(), PersistenceError> {
        let mut inner = self.inner.write().await;
        match inner.entries.get_mut(&entry.subject) {
            Some(slot) if slot.id == entry.id => {
                *slot = entry.clone();
                Ok(())
            }
            _ => Err(PersistenceError::MissingLogEntry { id: entry.id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(id: i64) -> SubjectRef {
        SubjectRef::Generic {
            content_type: "tracker.Ticket".to_string(),
            content_id: id,
        }
    }

    #[tokio::test]
    async fn test_append_only_keeps_every_entry() {
        let log = AppendOnlyLog::new(SubjectKind::Generic);
        log.record(TransitionLogEntry::new(subject(1), "start", "new", "developing")).await.unwrap();
        log.record(TransitionLogEntry::new(subject(1), "review", "developing", "review")).await.unwrap();
        log.record(TransitionLogEntry::new(subject(2), "start", "new", "developing")).await.unwrap();

        let history = log.history(&subject(1)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].transition, "start");
        assert_eq!(history[1].transition, "review");
        assert_eq!(log.entries().await.len(), 3);
        assert_eq!(log.entries().await[0].id, Some(3));
    }

    #[tokio::test]
    async fn test_latest_only_overwrites_per_subject() {
        let log = LatestOnlyLog::new(SubjectKind::Generic);
        let first = log.record(TransitionLogEntry::new(subject(1), "start", "new", "developing")).await.unwrap();
        let second = log.record(TransitionLogEntry::new(subject(1), "review", "developing", "review")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert!(second.timestamp >= first.timestamp);
        assert_eq!(log.len().await, 1);

        let latest = log.latest(&subject(1)).await.unwrap();
        assert_eq!(latest.transition, "review");
        assert_eq!(latest.from_state, "developing");
        assert_eq!(latest.to_state, "review");
    }

    #[tokio::test]
    async fn test_update_unknown_entry_fails() {
        let log = AppendOnlyLog::new(SubjectKind::Direct);
        let entry = TransitionLogEntry::new(SubjectRef::Direct { id: 1 }, "start", "new", "developing");
        let err = log.update(&entry).await.unwrap_err();
        assert!(matches!(err, PersistenceError::MissingLogEntry { id: None }));
    }
}

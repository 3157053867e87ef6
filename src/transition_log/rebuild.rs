use tracing::{info, warn};

use super::sink::LogSink;
use crate::records::{ModelSchema, RecordError, RecordStore};

/// A log entry naming a transition its workflow does not define
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLoggedTransition {
    pub log_id: Option<i64>,
    pub record_id: i64,
    pub transition: String,
}

#[derive(Debug, Default)]
pub struct RebuildReport {
    pub records_scanned: usize,
    pub entries_updated: usize,
    pub unknown_transitions: Vec<UnknownLoggedTransition>,
}

/// Backfill empty `from_state` / `to_state` columns of logged transitions.
///
/// Each record's history is replayed oldest first starting from the
/// workflow's initial state: a missing origin is the previous entry's
/// destination, a missing destination is the transition's target.
pub async fn rebuild_log_states(
    schema: &ModelSchema,
    field: &str,
    store: &dyn RecordStore,
    sink: &dyn LogSink,
) -> Result<RebuildReport, RecordError> {
    let property = schema.property(field)?;
    let workflow = property.workflow();
    let initial = property.field().default_name().to_string();
    let kind = sink.subject_kind();

    let mut report = RebuildReport::default();

    for id in store.record_ids(schema.label()).await? {
        report.records_scanned += 1;
        let subject = kind.subject_for(&schema.key(id));
        let mut previous = initial.clone();

        for mut entry in sink.history(&subject).await? {
            let Some(transition) = workflow.transition(&entry.transition) else {
                warn!(
                    model = %schema.label(),
                    record_id = id,
                    log_id = ?entry.id,
                    transition = %entry.transition,
                    "Unknown transition in log"
                );
                report.unknown_transitions.push(UnknownLoggedTransition {
                    log_id: entry.id,
                    record_id: id,
                    transition: entry.transition.clone(),
                });
                continue;
            };

            let mut updated = false;
            if entry.from_state.is_empty() {
                entry.from_state = previous.clone();
                updated = true;
            }
            if entry.to_state.is_empty() {
                entry.to_state = transition.target().to_string();
                updated = true;
            }

            previous = entry.to_state.clone();
            if updated {
                sink.update(&entry).await?;
                report.entries_updated += 1;
            }
        }
    }

    info!(
        model = %schema.label(),
        field = %field,
        records = report.records_scanned,
        updated = report.entries_updated,
        unknown = report.unknown_transitions.len(),
        "Rebuilt transition log states"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::StateField;
    use crate::records::{MemoryRecordStore, RecordKey};
    use crate::transition_log::{AppendOnlyLog, SubjectKind, TransitionLogEntry};
    use crate::workflows::Workflow;
    use chrono::{Duration, Utc};

    fn schema() -> ModelSchema {
        let wf = Workflow::builder("MyWorkflow")
            .state("foo", "Foo")
            .state("bar", "Bar")
            .state("baz", "Baz")
            .initial_state("foo")
            .transition("foobar", ["foo"], "bar")
            .transition("gobaz", ["foo", "bar"], "baz")
            .build()
            .unwrap();
        ModelSchema::builder("tests.MyWorkflowEnabled")
            .state_field("state", StateField::new(wf).unwrap())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_fills_missing_states() {
        let schema = schema();
        let store = MemoryRecordStore::new();
        store
            .save_state(&RecordKey::new("tests.MyWorkflowEnabled", 1), "state", "baz")
            .await
            .unwrap();

        let log = AppendOnlyLog::new(SubjectKind::Generic);
        let subject = SubjectKind::Generic.subject_for(&schema.key(1));
        let start = Utc::now() - Duration::minutes(10);

        let mut first = TransitionLogEntry::new(subject.clone(), "foobar", "", "");
        first.timestamp = start;
        let mut second = TransitionLogEntry::new(subject.clone(), "gobaz", "", "baz");
        second.timestamp = start + Duration::minutes(1);
        let mut third = TransitionLogEntry::new(subject.clone(), "vanished", "", "");
        third.timestamp = start + Duration::minutes(2);
        for entry in [first, second, third] {
            log.record(entry).await.unwrap();
        }

        let report = rebuild_log_states(&schema, "state", &store, &log).await.unwrap();
        assert_eq!(report.records_scanned, 1);
        assert_eq!(report.entries_updated, 2);
        assert_eq!(report.unknown_transitions.len(), 1);
        assert_eq!(report.unknown_transitions[0].transition, "vanished");

        let history = log.history(&subject).await.unwrap();
        assert_eq!((history[0].from_state.as_str(), history[0].to_state.as_str()), ("foo", "bar"));
        assert_eq!((history[1].from_state.as_str(), history[1].to_state.as_str()), ("bar", "baz"));
        assert_eq!(history[2].from_state, "");
    }

    #[tokio::test]
    async fn test_unknown_field() {
        let schema = schema();
        let store = MemoryRecordStore::new();
        let log = AppendOnlyLog::new(SubjectKind::Generic);
        let err = rebuild_log_states(&schema, "missing", &store, &log).await.unwrap_err();
        assert!(matches!(err, RecordError::UnknownField { .. }));
    }
}

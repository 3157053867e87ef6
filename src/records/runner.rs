use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::schema::{ModelSchema, Record};
use super::store::{RecordStore, StateChange};
use super::RecordError;
use crate::field::StateValue;
use crate::transition_log::{resolve_extras, TransitionLogEntry};

/// Per-call switches for [`TransitionRunner::perform`]
#[derive(Debug, Clone)]
pub struct TransitionOptions {
    /// Persist the new state name
    pub save: bool,
    /// Write a transition log entry
    pub log: bool,
    pub actor: Option<String>,
    /// Keyword arguments of the transition, matched against the sink's extra attributes
    pub kwargs: Map<String, Value>,
}

impl Default for TransitionOptions {
    fn default() -> Self {
        Self {
            save: true,
            log: true,
            actor: None,
            kwargs: Map::new(),
        }
    }
}

impl TransitionOptions {
    pub fn without_save(mut self) -> Self {
        self.save = false;
        self
    }

    pub fn without_log(mut self) -> Self {
        self.log = false;
        self
    }

    pub fn by(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_kwarg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(name.into(), value);
        self
    }
}

#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub transition: String,
    pub from: StateValue,
    pub to: StateValue,
    pub log: Option<TransitionLogEntry>,
}

/// Applies named transitions to records, then saves and logs them.
///
/// The record in memory only changes after the store accepted the commit.
pub struct TransitionRunner {
    store: Arc<dyn RecordStore>,
}

impl TransitionRunner {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub async fn perform(
        &self,
        schema: &ModelSchema,
        record: &mut Record,
        field: &str,
        transition: &str,
        options: TransitionOptions,
    ) -> Result<TransitionOutcome, RecordError> {
        let property = schema.property(field)?;
        let state_field = property.field();
        let workflow = state_field.workflow();

        let definition = workflow
            .transition(transition)
            .ok_or_else(|| RecordError::UnknownTransition {
                workflow: workflow.name().to_string(),
                transition: transition.to_string(),
            })?;

        let from = property.get(record);
        if !definition.accepts(from.state()) {
            warn!(
                model = %schema.label(),
                record_id = record.id(),
                transition = %transition,
                from_state = %from.name(),
                "Transition not available from current state"
            );
            return Err(RecordError::ForbiddenTransition {
                transition: transition.to_string(),
                state: from.name().to_string(),
            });
        }

        let to = state_field.decode(definition.target())?;
        state_field.validate_value(&to)?;

        let log = match (options.log, self.store.log_sink()) {
            (true, Some(sink)) => {
                let mut entry = TransitionLogEntry::new(
                    sink.subject_kind().subject_for(record.key()),
                    transition,
                    from.name(),
                    to.name(),
                );
                entry.actor = options.actor.clone();
                entry.extras = resolve_extras(&sink.extra_attributes(), &options.kwargs);
                Some(entry)
            }
            _ => None,
        };

        // Saving writes the whole row, including fields assigned since the last save
        let states = if options.save {
            let mut states = record.encoded_states(schema)?;
            let target = state_field.encode(&to)?;
            for (name, state) in states.iter_mut() {
                if name.as_str() == field {
                    *state = target.clone();
                }
            }
            states
        } else {
            Vec::new()
        };

        let logged = if !states.is_empty() || log.is_some() {
            self.store
                .commit(StateChange {
                    key: record.key().clone(),
                    states,
                    log,
                })
                .await?
        } else {
            None
        };

        record.put(field, to.clone());

        info!(
            model = %schema.label(),
            record_id = record.id(),
            field = %field,
            transition = %transition,
            from_state = %from.name(),
            to_state = %to.name(),
            saved = options.save,
            logged = logged.is_some(),
            "Transition applied"
        );

        Ok(TransitionOutcome {
            transition: transition.to_string(),
            from,
            to,
            log: logged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::StateField;
    use crate::records::MemoryRecordStore;
    use crate::transition_log::{AppendOnlyLog, SubjectKind};
    use crate::workflows::Workflow;

    fn schema() -> ModelSchema {
        let wf = Workflow::builder("MyWorkflow")
            .state("foo", "Foo")
            .state("bar", "Bar")
            .state("baz", "Baz")
            .initial_state("foo")
            .transition("foobar", ["foo"], "bar")
            .transition("gobaz", ["foo", "bar"], "baz")
            .transition("bazbar", ["baz"], "bar")
            .build()
            .unwrap();
        ModelSchema::builder("tests.MyWorkflowEnabled")
            .state_field("state", StateField::new(wf).unwrap())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_transitions_follow_sources() {
        let schema = schema();
        let store = Arc::new(MemoryRecordStore::new());
        let runner = TransitionRunner::new(store.clone());
        let mut record = Record::new(&schema, 1);

        runner.perform(&schema, &mut record, "state", "foobar", TransitionOptions::default()).await.unwrap();
        assert_eq!(record.get(&schema, "state").unwrap().name(), "bar");

        let err = runner
            .perform(&schema, &mut record, "state", "foobar", TransitionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::ForbiddenTransition { .. }));
        assert_eq!(record.get(&schema, "state").unwrap().name(), "bar");

        let outcome = runner.perform(&schema, &mut record, "state", "gobaz", TransitionOptions::default()).await.unwrap();
        assert_eq!(outcome.from.name(), "bar");
        assert_eq!(outcome.to.name(), "baz");
        assert!(outcome.log.is_none());
        assert_eq!(store.load_state(record.key(), "state").await.unwrap().as_deref(), Some("baz"));
    }

    #[tokio::test]
    async fn test_unknown_transition() {
        let schema = schema();
        let runner = TransitionRunner::new(Arc::new(MemoryRecordStore::new()));
        let mut record = Record::new(&schema, 1);
        let err = runner
            .perform(&schema, &mut record, "state", "nope", TransitionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::UnknownTransition { .. }));
    }

    #[tokio::test]
    async fn test_no_saving_still_logs() {
        let schema = schema();
        let log = Arc::new(AppendOnlyLog::new(SubjectKind::Generic));
        let store = Arc::new(MemoryRecordStore::new().with_log(log.clone()));
        let runner = TransitionRunner::new(store.clone());
        let mut record = Record::new(&schema, 1);

        let outcome = runner
            .perform(&schema, &mut record, "state", "foobar", TransitionOptions::default().without_save())
            .await
            .unwrap();

        assert_eq!(record.get(&schema, "state").unwrap().name(), "bar");
        assert_eq!(store.load_state(record.key(), "state").await.unwrap(), None);
        assert_eq!(outcome.log.unwrap().to_state, "bar");
        assert_eq!(log.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_saving_writes_unsaved_sibling_fields() {
        let base = schema();
        let review = Workflow::builder("Review")
            .state("p", "Pending")
            .state("q", "Queued")
            .initial_state("p")
            .build()
            .unwrap();
        let schema = ModelSchema::builder("tests.TwoFields")
            .state_field("state", base.property("state").unwrap().field().clone())
            .state_field("review", StateField::new(review).unwrap())
            .build()
            .unwrap();
        let store = Arc::new(MemoryRecordStore::new());
        let runner = TransitionRunner::new(store.clone());
        let mut record = Record::new(&schema, 1);

        record.set(&schema, "review", "q").unwrap();
        runner
            .perform(&schema, &mut record, "state", "foobar", TransitionOptions::default())
            .await
            .unwrap();

        let reloaded = Record::load(&schema, 1, store.as_ref()).await.unwrap();
        assert_eq!(reloaded.get(&schema, "state").unwrap().name(), "bar");
        assert_eq!(reloaded.get(&schema, "review").unwrap().name(), "q");
    }
}

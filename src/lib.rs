// workflow-field: persisted records carrying state from finite workflows
// This exposes the core components for applications and tooling

pub mod config;
pub mod database;
pub mod field;
pub mod records;
pub mod telemetry;
pub mod transition_log;
pub mod workflows;

// Re-export key types for easy access
pub use config::{config, WorkflowFieldConfig};
#[cfg(feature = "database")]
pub use database::{DatabaseManager, SqliteRecordStore, SqliteTransitionLog};
pub use field::{FieldDescriptor, FieldError, RawValue, StateField, StateValue};
pub use records::{
    MemoryRecordStore, ModelSchema, PersistenceError, Record, RecordError, RecordKey, RecordStore,
    StateFieldProperty, TransitionOptions, TransitionOutcome, TransitionRunner,
};
pub use telemetry::{create_field_span, init_telemetry};
pub use transition_log::{
    rebuild_log_states, AppendOnlyLog, ExtraLogAttribute, LatestOnlyLog, LogShape, LogSink, SubjectKind,
    SubjectRef, TransitionLogEntry,
};
pub use workflows::{SerializedWorkflow, State, Transition, Workflow, WorkflowError, WorkflowId};

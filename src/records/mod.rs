// Records carrying state fields, their persistence, and transition application

pub mod runner;
pub mod schema;
pub mod store;

use thiserror::Error;

use crate::field::FieldError;

pub use runner::{TransitionOptions, TransitionOutcome, TransitionRunner};
pub use schema::{ModelSchema, ModelSchemaBuilder, Record, RecordKey, StateFieldProperty};
pub use store::{MemoryRecordStore, PersistenceError, RecordStore, StateChange};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Model {model} has no state field '{field}'")]
    UnknownField { model: String, field: String },

    #[error("State field '{field}' declared twice on model {model}")]
    DuplicateField { model: String, field: String },

    #[error("Workflow {workflow} has no transition '{transition}'")]
    UnknownTransition { workflow: String, transition: String },

    #[error("Transition '{transition}' is not available from state '{state}'")]
    ForbiddenTransition { transition: String, state: String },

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

// Workflow definitions consumed by state fields

pub mod definition;
pub mod serialized;

pub use definition::{
    State, StateSpec, Transition, TransitionSpec, Workflow, WorkflowBuilder, WorkflowError, WorkflowId,
    WorkflowSpec,
};
pub use serialized::SerializedWorkflow;

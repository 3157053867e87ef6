use thiserror::Error;

/// Failures raised by a state field while decoding or validating values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("Workflow {workflow} cannot back a state field: {reason}")]
    Configuration { workflow: String, reason: String },

    #[error("{name} is not a valid state.")]
    InvalidState { name: String },

    #[error("Please enter a valid value (got {got}).")]
    WrongType { got: String },

    #[error("Please enter a value from the right workflow (got {workflow}).")]
    WrongWorkflow { workflow: String },
}

impl FieldError {
    pub(crate) fn invalid_state(name: impl Into<String>) -> Self {
        FieldError::InvalidState { name: name.into() }
    }

    pub(crate) fn configuration(workflow: &str, reason: impl Into<String>) -> Self {
        FieldError::Configuration {
            workflow: workflow.to_string(),
            reason: reason.into(),
        }
    }
}

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::errors::FieldError;
use super::value::{RawValue, StateValue};
use crate::workflows::{SerializedWorkflow, State, Workflow};

/// Minimum storage width reserved for state names
pub const DEFAULT_MAX_LENGTH: usize = 16;

const FIELD_PATH: &str = "workflow_field::StateField";

/// Bridges a persisted state name and an in-memory, validated [`StateValue`].
///
/// The allowed domain, the default and the storage width are computed once
/// at construction and never change afterwards.
#[derive(Debug, Clone)]
pub struct StateField {
    workflow: Arc<Workflow>,
    initial: State,
    choices: Vec<(String, String)>,
    longest_name: usize,
    max_length: usize,
    snapshot: SerializedWorkflow,
}

impl StateField {
    pub fn new(workflow: impl Into<Arc<Workflow>>) -> Result<Self, FieldError> {
        let workflow = workflow.into();

        if workflow.states().is_empty() {
            return Err(FieldError::configuration(workflow.name(), "workflow declares no states"));
        }
        let initial = workflow
            .initial_state()
            .cloned()
            .ok_or_else(|| FieldError::configuration(workflow.name(), "workflow has no initial state"))?;
        let snapshot = SerializedWorkflow::from_workflow(&workflow)
            .ok_or_else(|| FieldError::configuration(workflow.name(), "workflow has no initial state"))?;

        let choices = workflow
            .states()
            .iter()
            .map(|st| (st.name().to_string(), st.title().to_string()))
            .collect();
        let longest_name = workflow.states().iter().map(|st| st.name().len()).max().unwrap_or(0);

        Ok(Self {
            workflow,
            initial,
            choices,
            longest_name,
            max_length: DEFAULT_MAX_LENGTH.max(longest_name),
            snapshot,
        })
    }

    /// Build the field from a workflow factory instead of a shared instance
    pub fn from_factory<F>(factory: F) -> Result<Self, FieldError>
    where
        F: FnOnce() -> Workflow,
    {
        Self::new(factory())
    }

    /// Rebuild a field from a deconstructed descriptor
    pub fn from_descriptor(descriptor: &FieldDescriptor) -> Result<Self, FieldError> {
        let workflow = descriptor
            .workflow
            .to_workflow()
            .map_err(|e| FieldError::configuration(&descriptor.workflow.name, e.to_string()))?;
        Ok(Self::new(workflow)?.with_max_length(descriptor.max_length))
    }

    /// Raise the storage width floor; never drops below the longest name
    pub fn with_max_length(mut self, floor: usize) -> Self {
        self.max_length = floor.max(self.longest_name);
        self
    }

    pub fn workflow(&self) -> &Arc<Workflow> {
        &self.workflow
    }

    /// `(name, title)` pairs in workflow order
    pub fn choices(&self) -> &[(String, String)] {
        &self.choices
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn default_name(&self) -> &str {
        self.initial.name()
    }

    pub fn default_value(&self) -> StateValue {
        StateValue::new(self.initial.clone(), Arc::clone(&self.workflow))
    }

    /// Convert a stored or assigned value into a validated state value
    pub fn decode(&self, raw: impl Into<RawValue>) -> Result<StateValue, FieldError> {
        let value = match raw.into() {
            RawValue::Value(value) => value,
            RawValue::State(state) => StateValue::new(state, Arc::clone(&self.workflow)),
            RawValue::Null => self.default_value(),
            RawValue::Text(name) => match self.workflow.state(&name) {
                Some(state) => StateValue::new(state.clone(), Arc::clone(&self.workflow)),
                None => {
                    debug!(workflow = %self.workflow.name(), state = %name, "Rejected unknown state name");
                    return Err(FieldError::invalid_state(name));
                }
            },
            other @ (RawValue::Integer(_) | RawValue::Other(_)) => {
                return Err(FieldError::WrongType { got: other.describe() });
            }
        };

        if !self.workflow.contains(value.state()) {
            return Err(FieldError::invalid_state(value.name()));
        }
        Ok(value)
    }

    /// The state name to store for `raw`
    pub fn encode(&self, raw: impl Into<RawValue>) -> Result<String, FieldError> {
        self.decode(raw).map(|value| value.name().to_string())
    }

    /// Check an assigned value: it must already be decoded, bound to this
    /// field's workflow, and name a current member of that workflow.
    pub fn validate(&self, raw: &RawValue) -> Result<(), FieldError> {
        match raw {
            RawValue::Value(value) => self.validate_value(value),
            other => Err(FieldError::WrongType { got: other.describe() }),
        }
    }

    pub fn validate_value(&self, value: &StateValue) -> Result<(), FieldError> {
        if !value.workflow().same_as(&self.workflow) {
            return Err(FieldError::WrongWorkflow {
                workflow: format!("{} ({})", value.workflow().name(), value.workflow().id()),
            });
        }
        if !self.workflow.contains(value.state()) {
            return Err(FieldError::invalid_state(value.name()));
        }
        Ok(())
    }

    pub fn display_label<'a>(&self, value: &'a StateValue) -> &'a str {
        value.title()
    }

    /// Name of the choice a select widget should mark for `raw`
    pub fn selected_choice(&self, raw: &RawValue) -> String {
        match raw {
            RawValue::Value(value) => value.name().to_string(),
            RawValue::State(state) => state.name().to_string(),
            RawValue::Text(text) => text.clone(),
            RawValue::Null => String::new(),
            RawValue::Integer(i) => i.to_string(),
            RawValue::Other(repr) => repr.clone(),
        }
    }

    /// Describe this field for schema snapshots
    pub fn deconstruct(&self) -> FieldDescriptor {
        FieldDescriptor {
            path: FIELD_PATH.to_string(),
            workflow: self.snapshot.clone(),
            max_length: self.max_length,
        }
    }
}

/// Snapshot of a state field's configuration.
///
/// Choices and default are left out since both derive from the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub path: String,
    pub workflow: SerializedWorkflow,
    pub max_length: usize,
}

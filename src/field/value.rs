use std::fmt;
use std::sync::Arc;

use crate::workflows::{State, Workflow};

/// The current state carried by a record: a state bound to its workflow.
#[derive(Debug, Clone)]
pub struct StateValue {
    state: State,
    workflow: Arc<Workflow>,
}

impl StateValue {
    /// Pair a state with a workflow without checking membership; the field
    /// adapter re-validates every value it hands out.
    pub(crate) fn new(state: State, workflow: Arc<Workflow>) -> Self {
        Self { state, workflow }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn workflow(&self) -> &Arc<Workflow> {
        &self.workflow
    }

    pub fn name(&self) -> &str {
        self.state.name()
    }

    pub fn title(&self) -> &str {
        self.state.title()
    }
}

impl PartialEq for StateValue {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state && self.workflow.same_as(&other.workflow)
    }
}

impl Eq for StateValue {}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.state.name())
    }
}

/// Untyped input accepted at the field's decode and validate boundaries
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Text(String),
    Integer(i64),
    State(State),
    Value(StateValue),
    /// Any other serialized shape (booleans, floats, arrays, objects)
    Other(String),
}

impl RawValue {
    /// Short rendering used in error messages
    pub fn describe(&self) -> String {
        match self {
            RawValue::Null => "None".to_string(),
            RawValue::Text(text) => format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'")),
            RawValue::Integer(i) => i.to_string(),
            RawValue::State(state) => format!("<State: {}>", state.name()),
            RawValue::Value(value) => format!("<StateValue: {}>", value.name()),
            RawValue::Other(repr) => repr.clone(),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<Option<&str>> for RawValue {
    fn from(value: Option<&str>) -> Self {
        value.map_or(RawValue::Null, RawValue::from)
    }
}

impl From<Option<String>> for RawValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(RawValue::Null, RawValue::Text)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Integer(value)
    }
}

impl From<State> for RawValue {
    fn from(value: State) -> Self {
        RawValue::State(value)
    }
}

impl From<&State> for RawValue {
    fn from(value: &State) -> Self {
        RawValue::State(value.clone())
    }
}

impl From<StateValue> for RawValue {
    fn from(value: StateValue) -> Self {
        RawValue::Value(value)
    }
}

impl From<&StateValue> for RawValue {
    fn from(value: &StateValue) -> Self {
        RawValue::Value(value.clone())
    }
}

impl From<serde_json::Value> for RawValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RawValue::Null,
            serde_json::Value::String(s) => RawValue::Text(s),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => RawValue::Integer(i),
                None => RawValue::Other(n.to_string()),
            },
            other => RawValue::Other(other.to_string()),
        }
    }
}

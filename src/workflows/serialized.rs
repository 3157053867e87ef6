use serde::{Deserialize, Serialize};

use super::definition::{Workflow, WorkflowError};

/// Structural snapshot of a workflow used by schema-evolution tooling.
///
/// Only names survive: titles and transitions are not part of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedWorkflow {
    pub name: String,
    pub initial_state: String,
    pub states: Vec<String>,
}

impl SerializedWorkflow {
    /// Snapshot a workflow; `None` when it has no initial state
    pub fn from_workflow(workflow: &Workflow) -> Option<Self> {
        let initial = workflow.initial_state()?;
        Some(Self {
            name: workflow.name().to_string(),
            initial_state: initial.name().to_string(),
            states: workflow.states().iter().map(|s| s.name().to_string()).collect(),
        })
    }

    /// Rebuild a fresh workflow whose states are titled by their names
    pub fn to_workflow(&self) -> Result<Workflow, WorkflowError> {
        let builder = self
            .states
            .iter()
            .fold(Workflow::builder(self.name.clone()), |b, st| b.state(st.clone(), st.clone()));
        builder.initial_state(self.initial_state.clone()).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_then_rebuild() {
        let wf = Workflow::builder("MyWorkflow")
            .state("foo", "Foo")
            .state("bar", "Bar")
            .state("baz", "Baz")
            .initial_state("foo")
            .transition("foobar", ["foo"], "bar")
            .build()
            .unwrap();

        let snapshot = SerializedWorkflow::from_workflow(&wf).unwrap();
        assert_eq!(snapshot.states, vec!["foo", "bar", "baz"]);
        assert_eq!(snapshot.initial_state, "foo");

        let rebuilt = snapshot.to_workflow().unwrap();
        assert_eq!(rebuilt.name(), "MyWorkflow");
        assert_eq!(rebuilt.initial_state().unwrap().name(), "foo");
        assert_eq!(rebuilt.state("bar").unwrap().title(), "bar");
        assert!(rebuilt.transitions().is_empty());
        assert!(!rebuilt.same_as(&wf));
    }

    #[test]
    fn test_snapshot_as_json() {
        let snapshot = SerializedWorkflow {
            name: "Alt".to_string(),
            initial_state: "a".to_string(),
            states: vec!["a".to_string(), "b".to_string()],
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["initial_state"], "a");
        assert_eq!(json["states"][1], "b");
    }
}

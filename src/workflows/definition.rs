use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

/// Problems found while assembling a workflow definition
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Duplicate state '{name}' in workflow {workflow}")]
    DuplicateState { workflow: String, name: String },
    #[error("Duplicate transition '{name}' in workflow {workflow}")]
    DuplicateTransition { workflow: String, name: String },
    #[error("Workflow {workflow} references unknown state '{name}'")]
    UnknownState { workflow: String, name: String },
    #[error("Transition '{transition}' in workflow {workflow} has no source states")]
    EmptySources { workflow: String, transition: String },
    #[error("Failed to read workflow file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse workflow definition: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Identity of one constructed workflow instance.
///
/// Two workflows built from identical definitions still get distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(Uuid);

impl WorkflowId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named, titled member of a workflow's domain
#[derive(Debug, Clone, Eq)]
pub struct State {
    workflow: WorkflowId,
    name: String,
    title: String,
}

impl State {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn workflow_id(&self) -> WorkflowId {
        self.workflow
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.workflow == other.workflow && self.name == other.name
    }
}

impl std::hash::Hash for State {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.workflow.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    name: String,
    sources: Vec<String>,
    target: String,
}

impl Transition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn accepts(&self, state: &State) -> bool {
        self.sources.iter().any(|s| s == state.name())
    }
}

/// Immutable workflow definition: ordered states, an initial state and
/// the transitions between them.
#[derive(Debug)]
pub struct Workflow {
    id: WorkflowId,
    name: String,
    states: Vec<State>,
    initial_state: Option<String>,
    transitions: Vec<Transition>,
}

impl Workflow {
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder {
            name: name.into(),
            states: Vec::new(),
            initial_state: None,
            transitions: Vec::new(),
        }
    }

    /// Load a workflow definition from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, WorkflowError> {
        let content = std::fs::read_to_string(path)?;
        let spec: WorkflowSpec = toml::from_str(&content)?;
        spec.into_workflow()
    }

    pub fn id(&self) -> WorkflowId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn initial_state(&self) -> Option<&State> {
        self.initial_state.as_deref().and_then(|name| self.state(name))
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, state: &State) -> bool {
        self.states.iter().any(|s| s == state)
    }

    pub fn transition(&self, name: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.name == name)
    }

    /// Transitions whose source set includes `state`, in declaration order
    pub fn available_transitions<'a>(&'a self, state: &'a State) -> impl Iterator<Item = &'a Transition> + 'a {
        self.transitions.iter().filter(move |t| t.accepts(state))
    }

    pub fn same_as(&self, other: &Workflow) -> bool {
        self.id == other.id
    }
}

pub struct WorkflowBuilder {
    name: String,
    states: Vec<(String, String)>,
    initial_state: Option<String>,
    transitions: Vec<(String, Vec<String>, String)>,
}

impl WorkflowBuilder {
    pub fn state(mut self, name: impl Into<String>, title: impl Into<String>) -> Self {
        self.states.push((name.into(), title.into()));
        self
    }

    pub fn initial_state(mut self, name: impl Into<String>) -> Self {
        self.initial_state = Some(name.into());
        self
    }

    pub fn transition<I, S>(mut self, name: impl Into<String>, sources: I, target: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transitions.push((
            name.into(),
            sources.into_iter().map(Into::into).collect(),
            target.into(),
        ));
        self
    }

    pub fn build(self) -> Result<Workflow, WorkflowError> {
        let id = WorkflowId::generate();
        let workflow_name = self.name;

        let mut seen = HashSet::new();
        let mut states = Vec::with_capacity(self.states.len());
        for (name, title) in self.states {
            if !seen.insert(name.clone()) {
                return Err(WorkflowError::DuplicateState { workflow: workflow_name, name });
            }
            states.push(State { workflow: id, name, title });
        }

        let unknown = |name: &str| WorkflowError::UnknownState {
            workflow: workflow_name.clone(),
            name: name.to_string(),
        };

        if let Some(initial) = &self.initial_state {
            if !seen.contains(initial) {
                return Err(unknown(initial));
            }
        }

        let mut transition_names = HashSet::new();
        let mut transitions = Vec::with_capacity(self.transitions.len());
        for (name, sources, target) in self.transitions {
            if !transition_names.insert(name.clone()) {
                return Err(WorkflowError::DuplicateTransition { workflow: workflow_name.clone(), name });
            }
            if sources.is_empty() {
                return Err(WorkflowError::EmptySources { workflow: workflow_name.clone(), transition: name });
            }
            if let Some(missing) = sources.iter().chain(std::iter::once(&target)).find(|s| !seen.contains(*s)) {
                return Err(unknown(missing));
            }
            transitions.push(Transition { name, sources, target });
        }

        Ok(Workflow {
            id,
            name: workflow_name,
            states,
            initial_state: self.initial_state,
            transitions,
        })
    }
}

/// Serializable workflow definition, as found in workflow TOML files
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowSpec {
    pub name: String,
    #[serde(default)]
    pub initial_state: Option<String>,
    #[serde(default)]
    pub states: Vec<StateSpec>,
    #[serde(default)]
    pub transitions: Vec<TransitionSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateSpec {
    pub name: String,
    /// Defaults to the state name
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransitionSpec {
    pub name: String,
    pub source: Vec<String>,
    pub target: String,
}

impl WorkflowSpec {
    pub fn into_workflow(self) -> Result<Workflow, WorkflowError> {
        let mut builder = Workflow::builder(self.name);
        for state in self.states {
            let title = state.title.unwrap_or_else(|| state.name.clone());
            builder = builder.state(state.name, title);
        }
        if let Some(initial) = self.initial_state {
            builder = builder.initial_state(initial);
        }
        for transition in self.transitions {
            builder = builder.transition(transition.name, transition.source, transition.target);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket_workflow() -> Workflow {
        Workflow::builder("TicketWorkflow")
            .state("new", "New")
            .state("developing", "Developing")
            .state("done", "Done")
            .initial_state("new")
            .transition("start", ["new"], "developing")
            .transition("finish", ["developing"], "done")
            .build()
            .unwrap()
    }

    #[test]
    fn test_states_keep_declaration_order() {
        let wf = ticket_workflow();
        let names: Vec<_> = wf.states().iter().map(State::name).collect();
        assert_eq!(names, vec!["new", "developing", "done"]);
        assert_eq!(wf.initial_state().unwrap().name(), "new");
    }

    #[test]
    fn test_state_equality_is_scoped_to_workflow() {
        let a = ticket_workflow();
        let b = ticket_workflow();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.state("new"), b.state("new"));
        assert_eq!(a.state("new"), a.state("new"));
        assert!(!a.contains(b.state("new").unwrap()));
    }

    #[test]
    fn test_available_transitions() {
        let wf = ticket_workflow();
        let new = wf.state("new").unwrap();
        let names: Vec<_> = wf.available_transitions(new).map(Transition::name).collect();
        assert_eq!(names, vec!["start"]);
    }

    #[test]
    fn test_build_rejects_unknown_target() {
        let err = Workflow::builder("Broken")
            .state("a", "A")
            .initial_state("a")
            .transition("go", ["a"], "b")
            .build()
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownState { ref name, .. } if name == "b"));
    }

    #[test]
    fn test_build_rejects_duplicate_state() {
        let err = Workflow::builder("Broken")
            .state("a", "A")
            .state("a", "Again")
            .build()
            .unwrap_err();
        assert!(matches!(err, WorkflowError::DuplicateState { .. }));
    }

    #[test]
    fn test_build_allows_empty_definition() {
        let wf = Workflow::builder("Empty").build().unwrap();
        assert!(wf.states().is_empty());
        assert!(wf.initial_state().is_none());
    }

    #[test]
    fn test_definition_from_toml() {
        let spec: WorkflowSpec = toml::from_str(
            r#"
            name = "Review"
            initial_state = "draft"

            [[states]]
            name = "draft"
            title = "Draft"

            [[states]]
            name = "published"

            [[transitions]]
            name = "publish"
            source = ["draft"]
            target = "published"
            "#,
        )
        .unwrap();
        let wf = spec.into_workflow().unwrap();
        assert_eq!(wf.state("published").unwrap().title(), "published");
        assert_eq!(wf.transition("publish").unwrap().target(), "published");
    }
}

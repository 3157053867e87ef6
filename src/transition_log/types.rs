use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::records::RecordKey;

/// Reference from a log row to the record whose state changed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubjectRef {
    /// Typed foreign key: the log table is dedicated to one model
    Direct { id: i64 },
    /// Polymorphic reference by model label and id
    Generic { content_type: String, content_id: i64 },
}

impl SubjectRef {
    pub fn content_id(&self) -> i64 {
        match self {
            SubjectRef::Direct { id } => *id,
            SubjectRef::Generic { content_id, .. } => *content_id,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        match self {
            SubjectRef::Direct { .. } => None,
            SubjectRef::Generic { content_type, .. } => Some(content_type),
        }
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectRef::Direct { id } => write!(f, "#{id}"),
            SubjectRef::Generic { content_type, content_id } => write!(f, "{content_type}#{content_id}"),
        }
    }
}

/// How a sink resolves the subject of a transition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Direct,
    #[default]
    Generic,
}

impl SubjectKind {
    pub fn subject_for(&self, key: &RecordKey) -> SubjectRef {
        match self {
            SubjectKind::Direct => SubjectRef::Direct { id: key.id },
            SubjectKind::Generic => SubjectRef::Generic {
                content_type: key.model.clone(),
                content_id: key.id,
            },
        }
    }
}

/// Storage shape of a transition log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogShape {
    /// Every transition inserts a new row
    #[default]
    #[serde(alias = "append")]
    AppendOnly,
    /// One row per subject, overwritten by each transition
    #[serde(alias = "latest")]
    LatestOnly,
}

/// Extra transition argument copied into the log.
///
/// `kwarg` is looked up in the transition's keyword arguments and stored
/// under `db_field`; `default` is stored when the argument is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraLogAttribute {
    pub db_field: String,
    pub kwarg: String,
    #[serde(default)]
    pub default: Value,
}

impl ExtraLogAttribute {
    pub fn new(db_field: impl Into<String>, kwarg: impl Into<String>, default: Value) -> Self {
        Self {
            db_field: db_field.into(),
            kwarg: kwarg.into(),
            default,
        }
    }
}

pub fn resolve_extras(attributes: &[ExtraLogAttribute], kwargs: &Map<String, Value>) -> Map<String, Value> {
    attributes
        .iter()
        .map(|attr| {
            let value = kwargs.get(&attr.kwarg).cloned().unwrap_or_else(|| attr.default.clone());
            (attr.db_field.clone(), value)
        })
        .collect()
}

/// One logged transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionLogEntry {
    /// Assigned by the sink on insert
    pub id: Option<i64>,
    pub subject: SubjectRef,
    pub transition: String,
    pub from_state: String,
    pub to_state: String,
    pub timestamp: DateTime<Utc>,
    pub actor: Option<String>,
    #[serde(default)]
    pub extras: Map<String, Value>,
}

impl TransitionLogEntry {
    pub fn new(
        subject: SubjectRef,
        transition: impl Into<String>,
        from_state: impl Into<String>,
        to_state: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            subject,
            transition: transition.into(),
            from_state: from_state.into(),
            to_state: to_state.into(),
            timestamp: Utc::now(),
            actor: None,
            extras: Map::new(),
        }
    }
}

impl fmt::Display for TransitionLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {} at {}",
            self.subject,
            self.from_state,
            self.to_state,
            self.timestamp.to_rfc3339()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_extras_uses_defaults() {
        let attrs = vec![
            ExtraLogAttribute::new("comment", "comment", json!("")),
            ExtraLogAttribute::new("ticket_ref", "ticket", Value::Null),
        ];
        let mut kwargs = Map::new();
        kwargs.insert("ticket".to_string(), json!("T-42"));
        kwargs.insert("ignored".to_string(), json!(1));

        let extras = resolve_extras(&attrs, &kwargs);
        assert_eq!(extras.len(), 2);
        assert_eq!(extras["comment"], json!(""));
        assert_eq!(extras["ticket_ref"], json!("T-42"));
    }

    #[test]
    fn test_subject_for_key() {
        let key = RecordKey::new("tracker.Ticket", 7);
        assert_eq!(SubjectKind::Direct.subject_for(&key), SubjectRef::Direct { id: 7 });
        let generic = SubjectKind::Generic.subject_for(&key);
        assert_eq!(generic.content_type(), Some("tracker.Ticket"));
        assert_eq!(generic.to_string(), "tracker.Ticket#7");
    }

    #[test]
    fn test_log_shape_aliases() {
        let shape: LogShape = serde_json::from_value(json!("latest")).unwrap();
        assert_eq!(shape, LogShape::LatestOnly);
        let shape: LogShape = serde_json::from_value(json!("append_only")).unwrap();
        assert_eq!(shape, LogShape::AppendOnly);
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::store::RecordStore;
use super::RecordError;
use crate::field::{FieldError, RawValue, StateField, StateValue};
use crate::workflows::Workflow;

/// Identity of a persisted record: model label plus integer id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub model: String,
    pub id: i64,
}

impl RecordKey {
    pub fn new(model: impl Into<String>, id: i64) -> Self {
        Self { model: model.into(), id }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.model, self.id)
    }
}

/// Accessor for one declared state field.
///
/// At the schema level it exposes the workflow; on a record it reads the
/// stored value (falling back to the workflow's initial state) and writes
/// only values that decode and validate.
#[derive(Debug, Clone)]
pub struct StateFieldProperty {
    name: String,
    field: Arc<StateField>,
}

impl StateFieldProperty {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self) -> &StateField {
        &self.field
    }

    pub fn workflow(&self) -> &Arc<Workflow> {
        self.field.workflow()
    }

    pub fn get(&self, record: &Record) -> StateValue {
        record
            .values
            .get(&self.name)
            .cloned()
            .unwrap_or_else(|| self.field.default_value())
    }

    pub fn set(&self, record: &mut Record, raw: impl Into<RawValue>) -> Result<(), FieldError> {
        let value = self.field.decode(raw)?;
        self.field.validate_value(&value)?;
        record.values.insert(self.name.clone(), value);
        Ok(())
    }

    /// Title of the record's current state
    pub fn display(&self, record: &Record) -> String {
        self.get(record).title().to_string()
    }
}

/// The state fields declared for one model
#[derive(Debug, Clone)]
pub struct ModelSchema {
    label: String,
    properties: Vec<StateFieldProperty>,
}

impl ModelSchema {
    pub fn builder(label: impl Into<String>) -> ModelSchemaBuilder {
        ModelSchemaBuilder {
            label: label.into(),
            fields: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn properties(&self) -> &[StateFieldProperty] {
        &self.properties
    }

    pub fn property(&self, field: &str) -> Result<&StateFieldProperty, RecordError> {
        self.properties
            .iter()
            .find(|p| p.name == field)
            .ok_or_else(|| RecordError::UnknownField {
                model: self.label.clone(),
                field: field.to_string(),
            })
    }

    pub fn key(&self, id: i64) -> RecordKey {
        RecordKey::new(self.label.clone(), id)
    }
}

pub struct ModelSchemaBuilder {
    label: String,
    fields: Vec<(String, StateField)>,
}

impl ModelSchemaBuilder {
    pub fn state_field(mut self, name: impl Into<String>, field: StateField) -> Self {
        self.fields.push((name.into(), field));
        self
    }

    pub fn build(self) -> Result<ModelSchema, RecordError> {
        let mut properties: Vec<StateFieldProperty> = Vec::with_capacity(self.fields.len());
        for (name, field) in self.fields {
            if properties.iter().any(|p| p.name == name) {
                return Err(RecordError::DuplicateField { model: self.label, field: name });
            }
            properties.push(StateFieldProperty {
                name,
                field: Arc::new(field),
            });
        }
        Ok(ModelSchema {
            label: self.label,
            properties,
        })
    }
}

/// A record carrying the current value of each declared state field
#[derive(Debug, Clone)]
pub struct Record {
    key: RecordKey,
    values: HashMap<String, StateValue>,
}

impl Record {
    pub fn new(schema: &ModelSchema, id: i64) -> Self {
        Self {
            key: schema.key(id),
            values: HashMap::new(),
        }
    }

    /// Load stored state names; fields without a stored value keep their default
    pub async fn load(schema: &ModelSchema, id: i64, store: &dyn RecordStore) -> Result<Self, RecordError> {
        let mut record = Self::new(schema, id);
        for property in schema.properties() {
            if let Some(stored) = store.load_state(&record.key, property.name()).await? {
                let value = property.field().decode(stored)?;
                record.values.insert(property.name().to_string(), value);
            }
        }
        Ok(record)
    }

    /// Write the encoded value of every state field
    pub async fn save(&self, schema: &ModelSchema, store: &dyn RecordStore) -> Result<(), RecordError> {
        for (field, state) in self.encoded_states(schema)? {
            store.save_state(&self.key, &field, &state).await?;
        }
        Ok(())
    }

    /// `(field, state name)` for every declared state field, in declaration order
    pub fn encoded_states(&self, schema: &ModelSchema) -> Result<Vec<(String, String)>, RecordError> {
        schema
            .properties()
            .iter()
            .map(|property| -> Result<(String, String), RecordError> {
                let state = property.field().encode(property.get(self))?;
                Ok((property.name().to_string(), state))
            })
            .collect()
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn id(&self) -> i64 {
        self.key.id
    }

    pub fn get(&self, schema: &ModelSchema, field: &str) -> Result<StateValue, RecordError> {
        Ok(schema.property(field)?.get(self))
    }

    pub fn set(&mut self, schema: &ModelSchema, field: &str, raw: impl Into<RawValue>) -> Result<(), RecordError> {
        schema.property(field)?.set(self, raw)?;
        Ok(())
    }

    pub fn display(&self, schema: &ModelSchema, field: &str) -> Result<String, RecordError> {
        Ok(schema.property(field)?.display(self))
    }

    pub(crate) fn put(&mut self, field: &str, value: StateValue) {
        self.values.insert(field.to_string(), value);
    }
}

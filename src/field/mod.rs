// State-backed field adapter: state name on disk, validated state in memory

pub mod errors;
pub mod state_field;
pub mod value;

pub use errors::FieldError;
pub use state_field::{FieldDescriptor, StateField, DEFAULT_MAX_LENGTH};
pub use value::{RawValue, StateValue};

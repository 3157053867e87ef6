// Transition history: entry types, sinks, and log repair

pub mod rebuild;
pub mod sink;
pub mod types;

pub use rebuild::{rebuild_log_states, RebuildReport, UnknownLoggedTransition};
#[cfg(test)]
pub use sink::MockLogSink;
pub use sink::{AppendOnlyLog, LatestOnlyLog, LogSink};
pub use types::{resolve_extras, ExtraLogAttribute, LogShape, SubjectKind, SubjectRef, TransitionLogEntry};

//! Pipeline events for observability.
//!
//! The engine emits one event per lifecycle step and per guard decision.
//! Sinks decide where they go: nowhere, the log, or an in-memory buffer.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};

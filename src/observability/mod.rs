//! Observability for the query engine
//!
//! - Structured logging (JSON lines on stderr)
//! - Typed lifecycle events
//! - Relaxed atomic counters
//!
//! Observability never affects results: logging failures are ignored and
//! nothing here returns an error.

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{EngineMetrics, MetricsSnapshot};

/// Log an event at its natural severity
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    let severity = if event == Event::StorageFailure {
        Severity::Error
    } else if event.is_failure() {
        Severity::Warn
    } else if event.is_per_record() {
        Severity::Trace
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}

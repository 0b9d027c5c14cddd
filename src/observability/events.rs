//! Observable engine events

use std::fmt;

/// Events emitted by query translation, execution and the write path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Translation
    /// Filter tree translated into native sub-queries
    QueryCompiled,
    /// Sub-query set replaced by a cartesian expansion
    SubQueriesExpanded,
    /// Primary-key filter routed to batch key lookup
    PrimaryKeyFastPath,
    /// Part of the filter tree left to in-memory evaluation
    EmulationRequired,
    /// Ancestor scope set a second time
    AncestorReplaced,

    // Execution
    FetchExecuted,
    CountExecuted,
    DeleteExecuted,

    // Writes
    InsertCommitted,
    UpdateApplied,
    /// Candidate no longer matched on re-validation
    UpdateSkipped,
    UpdateCompleted,

    // Failures
    /// Continuation cursor could not be persisted (non-fatal)
    CursorSaveFailed,
    /// Backing store call failed
    StorageFailure,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::QueryCompiled => "QUERY_COMPILED",
            Event::SubQueriesExpanded => "SUB_QUERIES_EXPANDED",
            Event::PrimaryKeyFastPath => "PRIMARY_KEY_FAST_PATH",
            Event::EmulationRequired => "EMULATION_REQUIRED",
            Event::AncestorReplaced => "ANCESTOR_REPLACED",
            Event::FetchExecuted => "FETCH_EXECUTED",
            Event::CountExecuted => "COUNT_EXECUTED",
            Event::DeleteExecuted => "DELETE_EXECUTED",
            Event::InsertCommitted => "INSERT_COMMITTED",
            Event::UpdateApplied => "UPDATE_APPLIED",
            Event::UpdateSkipped => "UPDATE_SKIPPED",
            Event::UpdateCompleted => "UPDATE_COMPLETED",
            Event::CursorSaveFailed => "CURSOR_SAVE_FAILED",
            Event::StorageFailure => "STORAGE_FAILURE",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Event::CursorSaveFailed | Event::StorageFailure)
    }

    /// Per-record events are only interesting at trace level
    pub fn is_per_record(&self) -> bool {
        matches!(self, Event::UpdateApplied | Event::UpdateSkipped)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

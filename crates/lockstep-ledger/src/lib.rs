//! Causal chain recorder for the Lockstep simulation kernel.
//!
//! Every output and every event carries a trace identifier (the root of its
//! causal chain) and optionally a cause (the record that triggered it). This
//! crate validates those fields and keeps the durable, append-only log that
//! audit and replay tooling query by trace.
//!
//! # Architecture
//!
//! - [`record`] -- [`CausalRecord`], the serializable log entry.
//! - [`recorder`] -- [`CausalRecorder`]: validation, frame appends, trace queries.
//! - [`audit`] -- Causal completeness checks over the whole log.
//!
//! # Structure
//!
//! The log is a directed, append-only list. Each record points only at
//! records appended before it (an event at the output that caused it, an
//! output at the event that triggered its plugin), so the structure is
//! cycle-free by construction and has no in-memory back-pointers.
//!
//! ```text
//! Output(root, cause=None) --> Event(cause=Output) --> Output(cause=Event) --> Event ...
//!        \___________________ all share one TraceId ___________________/
//! ```
//!
//! A frame's records are validated as a unit and appended only when the
//! frame is applied; an aborted frame leaves the log untouched.

pub mod audit;
pub mod record;
pub mod recorder;

pub use audit::AuditResult;
pub use record::CausalRecord;
pub use recorder::CausalRecorder;

use lockstep_types::{Cause, ContractViolation, EventId, TraceId};

/// Errors raised by the causal recorder.
#[derive(Debug, thiserror::Error)]
pub enum CausalError {
    /// An output broke the trace/cause contract.
    #[error("contract violation: {source}")]
    Contract {
        /// The violation.
        #[from]
        source: ContractViolation,
    },

    /// An event names a cause that is not in the log or the frame.
    #[error("event {event} cites missing record {cause:?}")]
    DanglingCause {
        /// The event.
        event: EventId,
        /// The missing cause.
        cause: Cause,
    },

    /// An event's trace differs from its cause's trace.
    #[error("event {event} has trace {actual}, its cause has {expected}")]
    EventTraceMismatch {
        /// The event.
        event: EventId,
        /// Trace of the cause.
        expected: TraceId,
        /// Trace on the event.
        actual: TraceId,
    },

    /// An event id was recorded twice.
    #[error("event {0} already recorded")]
    DuplicateEvent(EventId),

    /// A causal walk did not end at a root output.
    #[error("event {event} does not resolve to a root output: {reason}")]
    IncompleteChain {
        /// The event whose chain is broken.
        event: EventId,
        /// What went wrong.
        reason: String,
    },
}

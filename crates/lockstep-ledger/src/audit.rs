//! Causal completeness checks.
//!
//! Every non-diagnostic event must resolve, by following cause links, to
//! an output that has no cause (a root) on the same trace. Diagnostic
//! events (isolated plugin failures) are roots of their own chain.

use lockstep_types::{Cause, EventId, OutputKey};

use crate::CausalError;
use crate::record::CausalRecord;
use crate::recorder::CausalRecorder;

/// Outcome of a completeness audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditResult {
    /// Every event resolves to a root output.
    Complete {
        /// Number of events checked.
        events: usize,
    },
    /// At least one chain is broken.
    Broken {
        /// Events whose chains are broken, with the reason.
        failures: Vec<(EventId, String)>,
    },
}

impl CausalRecorder {
    /// Follow cause links from an event back to its root output.
    ///
    /// # Errors
    ///
    /// Returns [`CausalError::IncompleteChain`] when a link is missing,
    /// changes trace, or the event is a diagnostic with no root output.
    pub fn root_of(&self, event: EventId) -> Result<OutputKey, CausalError> {
        let broken = |reason: String| CausalError::IncompleteChain { event, reason };
        let start = self
            .event(event)
            .ok_or_else(|| broken("event is not in the log".to_owned()))?;
        let trace = start.trace();
        let mut current = start;
        // Each link points at an earlier record, so a walk is bounded by
        // the log length.
        for _ in 0..=self.len() {
            if current.trace() != trace {
                return Err(broken(format!(
                    "link changes trace from {trace} to {}",
                    current.trace()
                )));
            }
            let next = match current {
                CausalRecord::Output { key, cause: None, .. } => return Ok(*key),
                CausalRecord::Output {
                    cause: Some(cause), ..
                } => self
                    .event(*cause)
                    .ok_or_else(|| broken(format!("missing event {cause}")))?,
                CausalRecord::Event { cause: None, .. } => {
                    return Err(broken("chain ends at an uncaused event".to_owned()));
                }
                CausalRecord::Event {
                    cause: Some(Cause::Output(key)),
                    ..
                } => self
                    .output(*key)
                    .ok_or_else(|| broken(format!("missing output {key}")))?,
                CausalRecord::Event {
                    cause: Some(Cause::Event(id)),
                    ..
                } => self
                    .event(*id)
                    .ok_or_else(|| broken(format!("missing event {id}")))?,
            };
            current = next;
        }
        Err(broken("cause links do not terminate".to_owned()))
    }

    /// Check every non-diagnostic event in the log.
    pub fn audit(&self) -> AuditResult {
        let mut checked = 0_usize;
        let mut failures = Vec::new();
        for record in self.records() {
            let CausalRecord::Event { id, diagnostic, .. } = record else {
                continue;
            };
            if *diagnostic {
                continue;
            }
            checked = checked.saturating_add(1);
            if let Err(e) = self.root_of(*id) {
                failures.push((*id, e.to_string()));
            }
        }
        if failures.is_empty() {
            AuditResult::Complete { events: checked }
        } else {
            AuditResult::Broken { failures }
        }
    }
}

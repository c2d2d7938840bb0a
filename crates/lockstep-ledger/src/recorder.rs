//! The causal recorder: validation, frame appends and trace queries.

use std::collections::BTreeMap;

use tracing::debug;

use lockstep_types::{Cause, ContractViolation, Event, EventId, Output, OutputKey, TraceId};

use crate::CausalError;
use crate::record::CausalRecord;

/// Append-only causal log keyed by trace.
#[derive(Debug, Default, Clone)]
pub struct CausalRecorder {
    records: Vec<CausalRecord>,
    by_trace: BTreeMap<TraceId, Vec<usize>>,
    events: BTreeMap<EventId, usize>,
    outputs: BTreeMap<OutputKey, usize>,
}

impl CausalRecorder {
    /// Create an empty log.
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
            by_trace: BTreeMap::new(),
            events: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Rebuild a log from exported records.
    ///
    /// # Errors
    ///
    /// Fails if the records would not have passed validation when they
    /// were first appended.
    pub fn from_records(records: Vec<CausalRecord>) -> Result<Self, CausalError> {
        let mut recorder = Self::new();
        for record in records {
            if let CausalRecord::Event { id, trace, cause, .. } = &record {
                recorder.check_event_cause(*id, *trace, cause.as_ref(), &BTreeMap::new(), &BTreeMap::new())?;
            }
            recorder.push(record)?;
        }
        Ok(recorder)
    }

    /// Number of records.
    pub const fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log is empty.
    pub const fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in append order.
    pub fn records(&self) -> &[CausalRecord] {
        &self.records
    }

    /// Look up an event record.
    pub fn event(&self, id: EventId) -> Option<&CausalRecord> {
        self.events.get(&id).and_then(|&i| self.records.get(i))
    }

    /// Look up an output record.
    pub fn output(&self, key: OutputKey) -> Option<&CausalRecord> {
        self.outputs.get(&key).and_then(|&i| self.records.get(i))
    }

    /// Every record sharing `trace`, in append order.
    pub fn chain(&self, trace: TraceId) -> Vec<&CausalRecord> {
        self.by_trace
            .get(&trace)
            .map(|indices| indices.iter().filter_map(|&i| self.records.get(i)).collect())
            .unwrap_or_default()
    }

    /// Check an output's trace and cause against the durable log.
    ///
    /// # Errors
    ///
    /// [`ContractViolation::MissingTrace`] for an empty trace,
    /// [`ContractViolation::UnknownCause`] for a cause not in the log, and
    /// [`ContractViolation::TraceMismatch`] when the cause is on a
    /// different chain.
    pub fn validate_output(&self, output: &Output) -> Result<(), ContractViolation> {
        if output.trace.is_empty() {
            return Err(ContractViolation::MissingTrace {
                plugin: output.plugin.clone(),
                entity: output.source,
                tick: output.tick,
                output_type: output.output_type.clone(),
            });
        }
        if let Some(cause) = output.cause {
            let Some(record) = self.event(cause) else {
                return Err(ContractViolation::UnknownCause {
                    plugin: output.plugin.clone(),
                    entity: output.source,
                    tick: output.tick,
                    cause,
                });
            };
            if record.trace() != output.trace {
                return Err(ContractViolation::TraceMismatch {
                    plugin: output.plugin.clone(),
                    entity: output.source,
                    tick: output.tick,
                    cause,
                    expected: record.trace(),
                    actual: output.trace,
                });
            }
        }
        Ok(())
    }

    /// Validate one frame's outputs and events as a unit.
    ///
    /// Event causes may point at outputs of this frame, events earlier in
    /// this frame, or events already in the log. Events without a cause
    /// are only accepted as diagnostics.
    ///
    /// # Errors
    ///
    /// Returns the first problem found; nothing is recorded.
    pub fn validate_frame(&self, outputs: &[Output], events: &[Event]) -> Result<(), CausalError> {
        let frame_outputs: BTreeMap<OutputKey, TraceId> =
            outputs.iter().map(|o| (o.key(), o.trace)).collect();
        for output in outputs {
            self.validate_output(output)?;
        }
        let mut frame_events: BTreeMap<EventId, TraceId> = BTreeMap::new();
        for event in events {
            if self.events.contains_key(&event.id) || frame_events.contains_key(&event.id) {
                return Err(CausalError::DuplicateEvent(event.id));
            }
            if event.trace.is_empty() || (event.cause.is_none() && !event.is_diagnostic()) {
                return Err(CausalError::IncompleteChain {
                    event: event.id,
                    reason: "event lacks causal metadata".to_owned(),
                });
            }
            self.check_event_cause(event.id, event.trace, event.cause.as_ref(), &frame_outputs, &frame_events)?;
            frame_events.insert(event.id, event.trace);
        }
        Ok(())
    }

    /// Validate and append one applied frame.
    ///
    /// Outputs are appended first (in buffer order), then events (in
    /// application order).
    ///
    /// # Errors
    ///
    /// Returns the validation error; the log is unchanged on failure.
    pub fn append_frame(&mut self, outputs: &[Output], events: &[Event]) -> Result<(), CausalError> {
        self.validate_frame(outputs, events)?;
        for output in outputs {
            self.push(CausalRecord::from(output))?;
        }
        for event in events {
            self.push(CausalRecord::from(event))?;
        }
        debug!(
            outputs = outputs.len(),
            events = events.len(),
            total = self.records.len(),
            "causal log appended"
        );
        Ok(())
    }

    fn check_event_cause(
        &self,
        event: EventId,
        trace: TraceId,
        cause: Option<&Cause>,
        frame_outputs: &BTreeMap<OutputKey, TraceId>,
        frame_events: &BTreeMap<EventId, TraceId>,
    ) -> Result<(), CausalError> {
        let Some(cause) = cause else {
            return Ok(());
        };
        let expected = match cause {
            Cause::Output(key) => frame_outputs
                .get(key)
                .copied()
                .or_else(|| self.output(*key).map(CausalRecord::trace)),
            Cause::Event(id) => frame_events
                .get(id)
                .copied()
                .or_else(|| self.event(*id).map(CausalRecord::trace)),
        };
        let Some(expected) = expected else {
            return Err(CausalError::DanglingCause {
                event,
                cause: *cause,
            });
        };
        if expected == trace {
            Ok(())
        } else {
            Err(CausalError::EventTraceMismatch {
                event,
                expected,
                actual: trace,
            })
        }
    }

    fn push(&mut self, record: CausalRecord) -> Result<(), CausalError> {
        let index = self.records.len();
        match &record {
            CausalRecord::Output { key, .. } => {
                self.outputs.insert(*key, index);
            }
            CausalRecord::Event { id, .. } => {
                if self.events.insert(*id, index).is_some() {
                    return Err(CausalError::DuplicateEvent(*id));
                }
            }
        }
        self.by_trace.entry(record.trace()).or_default().push(index);
        self.records.push(record);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use lockstep_types::{
        Component, EntityId, EventOrigin, EventType, OutputId, OutputType, Payload, PluginId,
        ResolverId,
    };

    use super::*;

    pub(crate) fn output(tick: u64, id: u64, trace: u64, cause: Option<u64>) -> Output {
        Output {
            id: OutputId::new(id),
            output_type: OutputType::from("FireWeapon"),
            tick,
            source: EntityId::new(1),
            plugin: PluginId::from("fire_control"),
            seq: 0,
            trace: TraceId::new(trace),
            cause: cause.map(EventId::new),
            payload: Payload::Command {
                target: None,
                args: Component::new(),
            },
        }
    }

    pub(crate) fn event(id: u64, tick: u64, trace: u64, cause: Option<Cause>) -> Event {
        Event {
            id: EventId::new(id),
            event_type: EventType::from("WeaponFired"),
            tick,
            subject: EntityId::new(1),
            origin: EventOrigin::Resolver(ResolverId::from("combat")),
            trace: TraceId::new(trace),
            cause,
            data: Component::new(),
        }
    }

    fn key(tick: u64, id: u64) -> Cause {
        Cause::Output(OutputKey {
            tick,
            id: OutputId::new(id),
        })
    }

    #[test]
    fn empty_trace_is_rejected() {
        let rec = CausalRecorder::new();
        let err = rec.validate_output(&output(0, 1, 0, None)).unwrap_err();
        assert!(matches!(err, ContractViolation::MissingTrace { .. }));
    }

    #[test]
    fn unknown_cause_is_rejected() {
        let rec = CausalRecorder::new();
        let err = rec.validate_output(&output(0, 1, 5, Some(3))).unwrap_err();
        assert!(matches!(err, ContractViolation::UnknownCause { .. }));
    }

    #[test]
    fn cause_on_another_trace_is_rejected() {
        let mut rec = CausalRecorder::new();
        rec.append_frame(&[output(0, 1, 5, None)], &[event(1, 0, 5, Some(key(0, 1)))])
            .unwrap();
        let err = rec.validate_output(&output(1, 1, 6, Some(1))).unwrap_err();
        assert!(matches!(err, ContractViolation::TraceMismatch { .. }));
        assert!(rec.validate_output(&output(1, 1, 5, Some(1))).is_ok());
    }

    #[test]
    fn chain_returns_records_in_order() {
        let mut rec = CausalRecorder::new();
        rec.append_frame(
            &[output(0, 1, 5, None), output(0, 2, 8, None)],
            &[event(1, 0, 5, Some(key(0, 1)))],
        )
        .unwrap();
        rec.append_frame(&[output(1, 1, 5, Some(1))], &[event(2, 1, 5, Some(key(1, 1)))])
            .unwrap();
        let chain = rec.chain(TraceId::new(5));
        assert_eq!(chain.len(), 4);
        assert!(chain.first().unwrap().is_root());
        let ticks: Vec<u64> = chain.iter().map(|r| r.tick()).collect();
        assert_eq!(ticks, vec![0, 0, 1, 1]);
        assert_eq!(rec.chain(TraceId::new(8)).len(), 1);
        assert!(rec.chain(TraceId::new(99)).is_empty());
    }

    #[test]
    fn failed_frame_leaves_log_untouched() {
        let mut rec = CausalRecorder::new();
        let dangling = event(1, 0, 5, Some(key(0, 9)));
        let err = rec.append_frame(&[output(0, 1, 5, None)], &[dangling]).unwrap_err();
        assert!(matches!(err, CausalError::DanglingCause { .. }));
        assert!(rec.is_empty());
    }

    #[test]
    fn event_trace_must_match_its_cause() {
        let rec = CausalRecorder::new();
        let err = rec
            .validate_frame(&[output(0, 1, 5, None)], &[event(1, 0, 6, Some(key(0, 1)))])
            .unwrap_err();
        assert!(matches!(err, CausalError::EventTraceMismatch { .. }));
    }

    #[test]
    fn uncaused_resolver_event_is_rejected() {
        let rec = CausalRecorder::new();
        assert!(rec.validate_frame(&[], &[event(1, 0, 6, None)]).is_err());
    }

    #[test]
    fn records_round_trip_through_export() {
        let mut rec = CausalRecorder::new();
        rec.append_frame(&[output(0, 1, 5, None)], &[event(1, 0, 5, Some(key(0, 1)))])
            .unwrap();
        let json = serde_json::to_string(rec.records()).unwrap();
        let records: Vec<CausalRecord> = serde_json::from_str(&json).unwrap();
        let back = CausalRecorder::from_records(records).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.chain(TraceId::new(5)).len(), 2);
    }
}

//! The Output Buffer: the frame's deterministically ordered proposals.
//!
//! Parallel evaluation finishes in any order, so pending outputs carry
//! their ordering keys `(source, plugin, seq)` from submission. Sealing
//! sorts by those keys and only then hands out [`OutputId`]s, which makes
//! the ids, and everything sorted by them, independent of worker timing.

use std::cmp::Ordering;

use lockstep_types::{EntityId, Output, OutputId, PluginId, Proposal};
use lockstep_world::SchemaRegistry;

/// A validated proposal awaiting its id.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOutput {
    /// Entity the plugin ran on.
    pub source: EntityId,
    /// Emitting plugin.
    pub plugin: PluginId,
    /// Index in the invocation's result list.
    pub seq: u32,
    /// The proposal itself.
    pub proposal: Proposal,
}

/// Errors raised while building a buffer.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    /// More outputs than the id space holds.
    #[error("output id space exhausted")]
    IdOverflow,

    /// A recorded output belongs to another tick.
    #[error("output {id} belongs to tick {found}, expected {expected}")]
    WrongTick {
        /// Offending output.
        id: OutputId,
        /// Tick being resolved.
        expected: u64,
        /// Tick stamped on the output.
        found: u64,
    },

    /// Two recorded outputs share an id.
    #[error("output id {0} appears twice")]
    DuplicateId(OutputId),
}

/// Immutable, sealed outputs of one frame, held in id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputBuffer {
    outputs: Vec<Output>,
}

impl OutputBuffer {
    /// Sort pending outputs by `(source, plugin, seq)` and number them
    /// `1..=n` in that order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::IdOverflow`] if `n` exceeds the id space.
    pub fn seal(tick: u64, mut pending: Vec<PendingOutput>) -> Result<Self, BufferError> {
        pending.sort_by(|a, b| {
            (a.source, &a.plugin, a.seq).cmp(&(b.source, &b.plugin, b.seq))
        });
        let mut outputs = Vec::with_capacity(pending.len());
        let mut next: u64 = 1;
        for p in pending {
            outputs.push(Output {
                id: OutputId::new(next),
                output_type: p.proposal.output_type,
                tick,
                source: p.source,
                plugin: p.plugin,
                seq: p.seq,
                trace: p.proposal.trace,
                cause: p.proposal.cause,
                payload: p.proposal.payload,
            });
            next = next.checked_add(1).ok_or(BufferError::IdOverflow)?;
        }
        Ok(Self { outputs })
    }

    /// Rebuild a buffer from recorded outputs of `tick`.
    ///
    /// # Errors
    ///
    /// Rejects outputs stamped with another tick and repeated ids.
    pub fn from_recorded(tick: u64, mut outputs: Vec<Output>) -> Result<Self, BufferError> {
        outputs.sort_by_key(|o| o.id);
        for pair in outputs.windows(2) {
            if let [a, b] = pair {
                if a.id == b.id {
                    return Err(BufferError::DuplicateId(a.id));
                }
            }
        }
        if let Some(o) = outputs.iter().find(|o| o.tick != tick) {
            return Err(BufferError::WrongTick {
                id: o.id,
                expected: tick,
                found: o.tick,
            });
        }
        Ok(Self { outputs })
    }

    /// Outputs in id order.
    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// Number of outputs.
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Whether the frame produced nothing.
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Outputs in resolution order: `(rank, tick, source, id)`.
    pub fn resolution_order<'a>(&'a self, schema: &SchemaRegistry) -> Vec<&'a Output> {
        let mut ordered: Vec<&Output> = self.outputs.iter().collect();
        ordered.sort_by(|a, b| resolution_cmp(schema, a, b));
        ordered
    }

    /// Give up the outputs, in id order.
    pub fn into_outputs(self) -> Vec<Output> {
        self.outputs
    }
}

/// Total order used for routing outputs to resolvers.
///
/// Output types missing from the schema sort last; they never pass
/// scheduler validation, so this only matters for hand-built buffers.
pub fn resolution_cmp(schema: &SchemaRegistry, a: &Output, b: &Output) -> Ordering {
    let rank = |o: &Output| schema.rank(&o.output_type).unwrap_or(u32::MAX);
    (rank(a), a.tick, a.source, a.id).cmp(&(rank(b), b.tick, b.source, b.id))
}

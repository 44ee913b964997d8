//! The remote executor: applies commands to the render state and produces
//! correlated responses.
//!
//! The executor owns the only live [`RenderState`]. Commands are applied one
//! at a time; each incoming envelope yields exactly one response carrying the
//! incoming correlation id, success or structured error, so the dispatcher's
//! pending call always reaches a terminal outcome. A failed command leaves
//! the state at its pre-command value: the transition runs against a scratch
//! copy that is committed only on success.

use molv_protocol::{CommandEnvelope, ResponseEnvelope, encode_image};

use crate::render::{RenderState, StructureSource, SyntheticStructures};
use crate::snapshot;

pub struct Executor {
    state: RenderState,
    source: Box<dyn StructureSource>,
}

impl Executor {
    pub fn new() -> Self {
        Self::with_source(Box::new(SyntheticStructures))
    }

    pub fn with_source(source: Box<dyn StructureSource>) -> Self {
        Self {
            state: RenderState::default(),
            source,
        }
    }

    /// Current render state, for inspection.
    pub fn state(&self) -> &RenderState {
        &self.state
    }

    /// Execute one envelope and build its response.
    pub fn handle(&mut self, envelope: CommandEnvelope) -> ResponseEnvelope {
        let id = envelope.correlation_id;
        let mut scratch = self.state.clone();
        let outcome = scratch
            .apply(&envelope.command, self.source.as_ref())
            .and_then(|_| snapshot::capture(&scratch));

        match outcome {
            Ok(snap) => {
                self.state = scratch;
                tracing::debug!(
                    target: "molv",
                    id = %id,
                    command = envelope.command.name(),
                    bytes = snap.bytes.len(),
                    "command applied"
                );
                ResponseEnvelope::ok(id, encode_image(&snap.bytes))
            }
            Err(err) => {
                tracing::warn!(
                    target: "molv",
                    id = %id,
                    command = envelope.command.name(),
                    error = %err,
                    "command failed"
                );
                ResponseEnvelope::error(id, err.to_string())
            }
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

// Capability every game state must provide to be synchronized.
// The protocol treats inputs, deltas and snapshots as opaque byte sequences.

use thiserror::Error;

/// One raw client input, exactly as it arrived in an `Input` packet.
pub type Input = Vec<u8>;

/// Encoded change advancing the state by one or more frames.
pub type Delta = Vec<u8>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid delta: {0}")]
    InvalidDelta(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

pub trait SimulationState: Send + Sync {
    /// Full snapshot sent to joining clients.
    fn serialize(&self) -> Vec<u8>;

    /// Replaces the state with a snapshot produced by `serialize`.
    fn deserialize(&mut self, snapshot: &[u8]) -> Result<(), StateError>;

    /// Client side: applies a delta produced by `generate_delta` on the server.
    fn apply_delta(&mut self, delta: &[u8]) -> Result<(), StateError>;

    /// Server side: applies one frame's batch of inputs in arrival order.
    fn apply_inputs(&mut self, inputs: &[Input]) -> Result<(), StateError>;

    /// Summarizes `inputs` into a delta for `frame` without mutating the state.
    fn generate_delta(&self, frame: u64, inputs: &[Input]) -> Result<Delta, StateError>;
}

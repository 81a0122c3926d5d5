// Demo game: a single shared counter. Inputs and deltas are both a signed
// varint difference; the snapshot is the signed varint of the counter.

use crate::state::{Delta, Input, SimulationState, StateError};
use crate::varint::{get_varint, put_varint, varint_len};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterDelta {
    pub diff: i64,
}

impl CounterDelta {
    pub fn new(diff: i64) -> Self {
        Self { diff }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(varint_len(self.diff));
        put_varint(&mut data, self.diff);
        data
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        get_varint(data).map(|(diff, _)| Self { diff })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterState {
    counter: i64,
}

impl CounterState {
    pub fn new(counter: i64) -> Self {
        Self { counter }
    }

    pub fn counter(&self) -> i64 {
        self.counter
    }

    /// Net diff of a batch. Inputs are unvalidated client bytes, so an
    /// undecodable one counts as zero rather than failing the frame.
    fn sum(inputs: &[Input]) -> i64 {
        inputs
            .iter()
            .filter_map(|input| CounterDelta::decode(input))
            .fold(0i64, |total, delta| total.wrapping_add(delta.diff))
    }
}

impl SimulationState for CounterState {
    fn serialize(&self) -> Vec<u8> {
        CounterDelta::new(self.counter).encode()
    }

    fn deserialize(&mut self, snapshot: &[u8]) -> Result<(), StateError> {
        if snapshot.is_empty() {
            self.counter = 0;
            return Ok(());
        }
        let (counter, _) = get_varint(snapshot)
            .ok_or_else(|| StateError::InvalidSnapshot(format!("{:02X?}", snapshot)))?;
        self.counter = counter;
        Ok(())
    }

    fn apply_delta(&mut self, delta: &[u8]) -> Result<(), StateError> {
        let delta = CounterDelta::decode(delta)
            .ok_or_else(|| StateError::InvalidDelta(format!("{:02X?}", delta)))?;
        self.counter = self.counter.wrapping_add(delta.diff);
        Ok(())
    }

    fn apply_inputs(&mut self, inputs: &[Input]) -> Result<(), StateError> {
        self.counter = self.counter.wrapping_add(Self::sum(inputs));
        Ok(())
    }

    fn generate_delta(&self, _frame: u64, inputs: &[Input]) -> Result<Delta, StateError> {
        Ok(CounterDelta::new(Self::sum(inputs)).encode())
    }
}

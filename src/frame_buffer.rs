// Fixed-capacity ring of pending inputs, indexed by `frame % capacity`.
// A slot belongs to exactly one absolute frame in [current, current + capacity).

use thiserror::Error;

use crate::state::Input;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("outdated frame {frame} (current frame {current})")]
    OutdatedFrame { frame: u64, current: u64 },

    #[error("frame {frame} outside buffered window [{current}, {current} + {capacity})")]
    FrameOutOfWindow {
        frame: u64,
        current: u64,
        capacity: usize,
    },
}

#[derive(Debug, Clone)]
pub struct FrameBuffer {
    slots: Vec<Vec<Input>>,
}

impl FrameBuffer {
    /// # Panics
    /// If `capacity` is zero; configuration validation rejects that earlier.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "frame buffer capacity must be non-zero");
        Self {
            slots: vec![Vec::new(); capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn index(&self, frame: u64) -> usize {
        (frame % self.slots.len() as u64) as usize
    }

    /// Checks that `frame` maps onto a slot owned by it while `current` is
    /// the oldest unconsumed frame.
    pub fn check_window(&self, current: u64, frame: u64) -> Result<(), FrameError> {
        if frame < current {
            return Err(FrameError::OutdatedFrame { frame, current });
        }
        if frame - current >= self.slots.len() as u64 {
            return Err(FrameError::FrameOutOfWindow {
                frame,
                current,
                capacity: self.slots.len(),
            });
        }
        Ok(())
    }

    /// Appends `input` to the slot for `frame`. Inputs accumulate in call order.
    pub fn push(&mut self, current: u64, frame: u64, input: Input) -> Result<(), FrameError> {
        self.check_window(current, frame)?;
        let index = self.index(frame);
        self.slots[index].push(input);
        Ok(())
    }

    pub fn slot(&self, frame: u64) -> &[Input] {
        &self.slots[self.index(frame)]
    }

    /// Empties the slot for `frame` so it can be reused for `frame + capacity`.
    pub fn take(&mut self, frame: u64) -> Vec<Input> {
        let index = self.index(frame);
        std::mem::take(&mut self.slots[index])
    }

    /// Concatenates the inputs of every frame from `current` through `frame` inclusive.
    pub fn collect_through(&self, current: u64, frame: u64) -> Result<Vec<Input>, FrameError> {
        self.check_window(current, frame)?;
        let mut inputs = Vec::new();
        for f in current..=frame {
            inputs.extend(self.slot(f).iter().cloned());
        }
        Ok(inputs)
    }

    pub fn pending(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }
}

//! Append/maybe-flush buffer that turns compressed units into sized chunks.

use crate::size_budget::ChunkBudget;
use bytes::Bytes;

/// Buffers raw bytes until they make a chunk of the right encoded size.
///
/// After each appended unit the buffer is flushed if one more unit of
/// `unit_hint` bytes would take the encoded chunk to the budget's lower bound.
/// Nothing is ever buffered past [`ChunkBudget::max_raw_bytes`], so memory
/// stays bounded by the budget no matter how large the source is.
#[derive(Debug)]
pub struct ChunkAccumulator {
    budget: ChunkBudget,
    unit_hint: usize,
    buffer: Vec<u8>,
}

impl ChunkAccumulator {
    pub fn new(budget: ChunkBudget, unit_hint: usize) -> Self {
        Self {
            budget,
            unit_hint,
            buffer: Vec::with_capacity(budget.max_raw_bytes()),
        }
    }

    pub fn budget(&self) -> ChunkBudget {
        self.budget
    }

    /// Raw bytes currently buffered.
    pub fn accumulated_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Append one unit. Returns the chunks that became ready, in order.
    ///
    /// A unit larger than the room left is split so no chunk exceeds the
    /// upper bound.
    pub fn append(&mut self, mut unit: &[u8]) -> Vec<Bytes> {
        let max_raw = self.budget.max_raw_bytes();
        let mut ready = Vec::new();

        while !unit.is_empty() {
            let take = (max_raw - self.buffer.len()).min(unit.len());
            self.buffer.extend_from_slice(&unit[..take]);
            unit = &unit[take..];

            if self.buffer.len() >= max_raw {
                ready.push(self.take());
            }
        }

        if self.budget.should_flush(self.buffer.len(), self.unit_hint) {
            ready.push(self.take());
        }

        ready
    }

    /// Remaining bytes as a final chunk, if any.
    pub fn finish(&mut self) -> Option<Bytes> {
        (!self.buffer.is_empty()).then(|| self.take())
    }

    fn take(&mut self) -> Bytes {
        let capacity = self.budget.max_raw_bytes();
        Bytes::from(std::mem::replace(
            &mut self.buffer,
            Vec::with_capacity(capacity),
        ))
    }
}

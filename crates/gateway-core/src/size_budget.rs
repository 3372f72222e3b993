//! Safe chunk sizes for messages that carry base64 text inside a JSON envelope.
//!
//! Base64 turns every 3 raw bytes into 4 characters, padded to a multiple of
//! 4, so a raw chunk of `n` bytes costs `ceil(n / 3) * 4` bytes on the wire.
//! The lower bound sits at 75% of the room left after the envelope, which
//! keeps message counts low without ever crossing the transport cap.

use crate::error::{GatewayError, Result};
use serde::Serialize;

/// Window of encoded sizes a flushed chunk should land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkBudget {
    /// Flush once the encoded chunk would reach this size.
    pub min_bytes: usize,
    /// Encoded chunk size that must never be exceeded.
    pub max_bytes: usize,
}

/// Compute the chunk budget for a message cap and the envelope it travels in.
///
/// `max_bytes = max_message_bytes - len(serialize(envelope_template))` and
/// `min_bytes = max_bytes * 0.75`.
pub fn compute_chunk_budget<T: Serialize + ?Sized>(
    max_message_bytes: usize,
    envelope_template: &T,
) -> Result<ChunkBudget> {
    let overhead = serde_json::to_vec(envelope_template)?.len();
    let max_bytes = max_message_bytes.saturating_sub(overhead);

    // Anything below one base64 quantum cannot carry a single raw byte.
    if max_bytes < 4 {
        return Err(GatewayError::BudgetTooSmall {
            max_message_bytes,
            available: max_bytes,
        });
    }

    Ok(ChunkBudget {
        min_bytes: max_bytes * 3 / 4,
        max_bytes,
    })
}

impl ChunkBudget {
    /// Base64 length of `raw_bytes` bytes, padding included.
    pub fn encoded_len(raw_bytes: usize) -> usize {
        raw_bytes.div_ceil(3) * 4
    }

    /// Largest raw chunk whose encoding still fits in `max_bytes`.
    pub fn max_raw_bytes(&self) -> usize {
        self.max_bytes / 4 * 3
    }

    /// Whether an encoded size falls inside `[min_bytes, max_bytes]`.
    pub fn contains(&self, encoded_bytes: usize) -> bool {
        encoded_bytes >= self.min_bytes && encoded_bytes <= self.max_bytes
    }

    /// Whether a buffer of `buffered_raw` bytes should be flushed before the
    /// next unit of `next_unit` bytes arrives.
    ///
    /// True once buffering the next unit would put the encoded chunk at or
    /// past `min_bytes`.
    pub fn should_flush(&self, buffered_raw: usize, next_unit: usize) -> bool {
        buffered_raw > 0 && Self::encoded_len(buffered_raw + next_unit) >= self.min_bytes
    }
}

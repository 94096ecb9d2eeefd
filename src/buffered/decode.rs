//! Incremental UTF-8 decoding over buffered refills.
//!
//! A multi-byte encoded unit may straddle a refill boundary. The decoder
//! retains the incomplete trailing byte sequence and prepends it to the
//! next chunk instead of treating it as a decode error; only a sequence
//! that can never complete is invalid.

use std::str;

/// Stateful UTF-8 decoder for chunked byte input
///
/// Feed raw chunks (typically from
/// [`BufferedStream::read`](crate::buffered::BufferedStream::read)) in
/// order; each call yields the decoded text available so far. Call
/// [`finish`](Utf8Decoder::finish) at end-of-data to reject a dangling
/// partial sequence.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    /// Incomplete trailing sequence carried to the next chunk (at most 3
    /// bytes)
    partial: Vec<u8>,
    /// Bytes decoded so far, for error offsets
    consumed: u64,
}

impl Utf8Decoder {
    /// Create a decoder with no carried state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently carried as an incomplete sequence.
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    /// Decode the next chunk, prepending any carried partial sequence.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<String, DecodeError> {
        let data: Vec<u8> = if self.partial.is_empty() {
            chunk.to_vec()
        } else {
            let mut joined = std::mem::take(&mut self.partial);
            joined.extend_from_slice(chunk);
            joined
        };

        match str::from_utf8(&data) {
            Ok(text) => {
                self.consumed += data.len() as u64;
                Ok(text.to_string())
            }
            Err(e) if e.error_len().is_none() => {
                // Incomplete trailing sequence: carry it to the next
                // refill.
                let valid = e.valid_up_to();
                self.partial = data[valid..].to_vec();
                let text = str::from_utf8(&data[..valid])
                    .expect("valid_up_to marks a UTF-8 boundary")
                    .to_string();
                self.consumed += valid as u64;
                Ok(text)
            }
            Err(e) => Err(DecodeError::Invalid {
                offset: self.consumed + e.valid_up_to() as u64,
            }),
        }
    }

    /// Signal end-of-data; a carried partial sequence can never complete
    /// and is an error.
    pub fn finish(&mut self) -> Result<(), DecodeError> {
        if self.partial.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::Truncated {
                offset: self.consumed,
            })
        }
    }
}

/// UTF-8 decode failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A byte sequence that can never form a valid scalar value.
    #[error("invalid UTF-8 sequence at byte {offset}")]
    Invalid {
        /// Absolute byte offset of the offending sequence
        offset: u64,
    },

    /// End-of-data arrived mid-sequence.
    #[error("truncated UTF-8 sequence at byte {offset}")]
    Truncated {
        /// Absolute byte offset where the sequence began
        offset: u64,
    },
}

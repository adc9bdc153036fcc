//! Buffered UTF-8 decoding that never splits a multi-byte sequence.
//!
//! Strings are read through a fixed scratch buffer. A fill may end in the
//! middle of a character; the undecoded tail (at most three bytes) moves to
//! the front of the buffer and the next fill appends after it.

use tracing::debug;

use crate::error::{BsonError, Result};

/// Smallest scratch buffer able to hold one complete character.
const MIN_CAPACITY: usize = 4;

/// Number of bytes in the sequence introduced by `lead`, or 0 for a
/// continuation (or otherwise invalid leading) byte.
pub fn sequence_length(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}

/// Offset just past the last complete character of `bytes`.
///
/// Bytes after the returned offset form an incomplete trailing sequence.
pub fn last_full_char_stop(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(MIN_CAPACITY) {
        let index = len - back;
        match sequence_length(bytes[index]) {
            0 => continue,
            needed if needed > back => return index,
            _ => return len,
        }
    }
    len
}

/// Scratch buffer plus the carried prefix of an incomplete character.
#[derive(Debug, Clone)]
pub struct Utf8Carry {
    buffer: Vec<u8>,
    carried: usize,
}

impl Utf8Carry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![0; capacity.max(MIN_CAPACITY)],
            carried: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes held over from the previous fill.
    pub fn carried(&self) -> usize {
        self.carried
    }

    pub fn reset(&mut self) {
        self.carried = 0;
    }

    /// Free space after the carried prefix, to be filled from the stream.
    pub fn fill_slot(&mut self) -> &mut [u8] {
        &mut self.buffer[self.carried..]
    }

    /// Decodes the carried prefix plus `filled` fresh bytes into `out`,
    /// holding back an incomplete trailing sequence. Returns the number of
    /// bytes decoded.
    pub fn commit(&mut self, filled: usize, out: &mut String) -> Result<usize> {
        let total = self.carried + filled;
        let stop = last_full_char_stop(&self.buffer[..total]);
        let text = std::str::from_utf8(&self.buffer[..stop]).map_err(|_| BsonError::InvalidUtf8)?;
        out.push_str(text);

        let tail = total - stop;
        if tail >= MIN_CAPACITY {
            return Err(BsonError::InvalidUtf8);
        }
        if tail > 0 {
            debug!(tail, "carrying incomplete UTF-8 sequence into next fill");
            self.buffer.copy_within(stop..total, 0);
        }
        self.carried = tail;
        Ok(stop)
    }

    /// Fails when the input ended inside a multi-byte sequence.
    pub fn finish(&mut self) -> Result<()> {
        if self.carried > 0 {
            self.carried = 0;
            return Err(BsonError::InvalidUtf8);
        }
        Ok(())
    }
}

impl Default for Utf8Carry {
    fn default() -> Self {
        Self::with_capacity(crate::options::DEFAULT_READ_BUFFER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_lengths() {
        assert_eq!(sequence_length(b'a'), 1);
        assert_eq!(sequence_length(0xC3), 2);
        assert_eq!(sequence_length(0xE6), 3);
        assert_eq!(sequence_length(0xF0), 4);
        assert_eq!(sequence_length(0x80), 0);
        assert_eq!(sequence_length(0xBF), 0);
        assert_eq!(sequence_length(0xC0), 0);
        assert_eq!(sequence_length(0xF5), 0);
    }

    #[test]
    fn stop_before_incomplete_tail() {
        let euro = "€".as_bytes(); // E2 82 AC
        assert_eq!(last_full_char_stop(b"ab"), 2);
        assert_eq!(last_full_char_stop(&[b'a', euro[0]]), 1);
        assert_eq!(last_full_char_stop(&[b'a', euro[0], euro[1]]), 1);
        assert_eq!(last_full_char_stop(&[b'a', euro[0], euro[1], euro[2]]), 4);
        assert_eq!(last_full_char_stop(&[]), 0);
    }

    #[test]
    fn carries_split_character_between_fills() {
        let bytes = "a€b".as_bytes();
        let mut carry = Utf8Carry::with_capacity(4);
        let mut out = String::new();

        carry.fill_slot()[..3].copy_from_slice(&bytes[..3]);
        assert_eq!(carry.commit(3, &mut out).unwrap(), 1);
        assert_eq!(carry.carried(), 2);
        assert_eq!(out, "a");

        let slot = carry.fill_slot();
        assert_eq!(slot.len(), 2);
        slot.copy_from_slice(&bytes[3..5]);
        carry.commit(2, &mut out).unwrap();
        assert_eq!(carry.carried(), 0);
        assert_eq!(out, "a€b");
        carry.finish().unwrap();
    }

    #[test]
    fn truncated_sequence_fails_on_finish() {
        let mut carry = Utf8Carry::with_capacity(8);
        let mut out = String::new();
        carry.fill_slot()[..2].copy_from_slice(&[b'x', 0xE2]);
        carry.commit(2, &mut out).unwrap();
        assert!(matches!(carry.finish(), Err(BsonError::InvalidUtf8)));
    }

    #[test]
    fn invalid_bytes_fail() {
        let mut carry = Utf8Carry::with_capacity(8);
        let mut out = String::new();
        carry.fill_slot()[..3].copy_from_slice(&[b'x', 0xFF, b'y']);
        assert!(matches!(carry.commit(3, &mut out), Err(BsonError::InvalidUtf8)));
    }

    #[test]
    fn capacity_never_below_one_character() {
        assert_eq!(Utf8Carry::with_capacity(1).capacity(), 4);
    }
}

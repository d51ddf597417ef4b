//! Bounded, flow-controlled in-memory byte stream.
//!
//! A [`FlowBuffer`] sits between exactly one producer and one consumer:
//! - The producer calls [`FlowBuffer::write`] and finally [`FlowBuffer::end_input`].
//! - The consumer drains bytes with [`FlowBuffer::read`] (or
//!   [`FlowBuffer::peek`] followed by [`FlowBuffer::pop`]).
//!
//! Nothing here ever blocks.  A write into a full buffer is accepted only up
//! to the remaining capacity and the caller learns how much went in from the
//! return value.
//!
//! # Invariants
//!
//! ```text
//!  bytes_read                 bytes_written
//!      │ <── buffer_size ───▶ │ <── remaining_capacity ──▶ │
//!  ────┼──────────────────────┼────────────────────────────┼──▶ stream offset
//!                                          bytes_read + capacity
//! ```
//!
//! - `bytes_read + buffer_size == bytes_written`
//! - `buffer_size <= capacity`
//! - `eof() == input_ended() && buffer_size == 0`

use std::collections::VecDeque;

/// A bounded FIFO byte buffer with end-of-input and sticky error signalling.
#[derive(Debug, Clone)]
pub struct FlowBuffer {
    buffer: VecDeque<u8>,
    capacity: usize,
    bytes_written: u64,
    bytes_read: u64,
    input_ended: bool,
    error: bool,
}

impl FlowBuffer {
    /// Create an empty buffer that holds at most `capacity` bytes at a time.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity.min(64 * 1024)),
            capacity,
            bytes_written: 0,
            bytes_read: 0,
            input_ended: false,
            error: false,
        }
    }

    /// Append as much of `data` as fits and return the number of bytes accepted.
    ///
    /// Once input has ended nothing more is accepted.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if self.input_ended {
            return 0;
        }
        let n = self.remaining_capacity().min(data.len());
        self.buffer.extend(&data[..n]);
        self.bytes_written += n as u64;
        n
    }

    /// Copy up to `len` bytes from the front of the buffer without consuming them.
    pub fn peek(&self, len: usize) -> Vec<u8> {
        let n = len.min(self.buffer.len());
        self.buffer.iter().take(n).copied().collect()
    }

    /// Discard up to `len` bytes from the front of the buffer.
    pub fn pop(&mut self, len: usize) {
        let n = len.min(self.buffer.len());
        self.buffer.drain(..n);
        self.bytes_read += n as u64;
    }

    /// Remove and return up to `len` bytes from the front of the buffer.
    pub fn read(&mut self, len: usize) -> Vec<u8> {
        let n = len.min(self.buffer.len());
        self.bytes_read += n as u64;
        self.buffer.drain(..n).collect()
    }

    /// Signal that the producer has finished writing.  One-way.
    pub fn end_input(&mut self) {
        self.input_ended = true;
    }

    pub fn input_ended(&self) -> bool {
        self.input_ended
    }

    /// `true` once input has ended and every buffered byte has been consumed.
    pub fn eof(&self) -> bool {
        self.input_ended && self.buffer.is_empty()
    }

    /// Number of bytes currently buffered.
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn buffer_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// How many more bytes a [`write`](Self::write) would accept right now.
    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of bytes ever accepted by [`write`](Self::write).
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Total number of bytes ever consumed by [`read`](Self::read) or [`pop`](Self::pop).
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Mark the stream as failed.  Sticky: there is no way to clear it.
    pub fn set_error(&mut self) {
        self.error = true;
    }

    pub fn error(&self) -> bool {
        self.error
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

//! Out-of-order byte reassembly.
//!
//! Segments arrive as `(absolute_index, bytes)` substrings of one logical
//! stream, in any order, possibly duplicated or overlapping.  The
//! [`Reassembler`] keeps the not-yet-contiguous pieces in an ordered set of
//! disjoint ranges and writes the contiguous prefix into its output
//! [`FlowBuffer`] as soon as it becomes available.
//!
//! # Window
//!
//! ```text
//!        bytes_read        bytes_written              first_unacceptable
//!            │ <── output ──▶ │ <── pending / gaps ──▶ │
//!  ──────────┼────────────────┼────────────────────────┼──────▶ stream index
//!            │ <────────────────── capacity ─────────▶ │
//! ```
//!
//! Anything at or beyond `first_unacceptable` is dropped on arrival; the
//! peer is responsible for sending it again once the window opens.

use std::collections::BTreeMap;

use crate::flow_buffer::FlowBuffer;

/// Reassembles a byte stream from arbitrarily ordered substrings.
#[derive(Debug)]
pub struct Reassembler {
    /// Disjoint, non-adjacent pending ranges keyed by start index.
    pending: BTreeMap<u64, Vec<u8>>,
    /// Sum of the lengths of all pending ranges.
    pending_bytes: usize,
    /// Absolute index one past the last byte of the stream, once known.
    eof_index: Option<u64>,
    output: FlowBuffer,
}

impl Reassembler {
    /// Create a reassembler whose output stream (plus pending bytes) holds at
    /// most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: BTreeMap::new(),
            pending_bytes: 0,
            eof_index: None,
            output: FlowBuffer::new(capacity),
        }
    }

    /// Accept a substring that starts at absolute stream index `index`.
    ///
    /// `is_last` marks `data` as ending the stream.  Bytes that were already
    /// delivered, or that fall outside the window, are discarded.
    pub fn push(&mut self, data: &[u8], index: u64, is_last: bool) {
        if is_last && self.eof_index.is_none() {
            self.eof_index = Some(index + data.len() as u64);
        }

        let first_unassembled = self.output.bytes_written();
        let first_unacceptable = first_unassembled + self.output.remaining_capacity() as u64;

        let start = index.max(first_unassembled);
        let end = (index + data.len() as u64).min(first_unacceptable);
        if start < end {
            let lo = (start - index) as usize;
            let hi = (end - index) as usize;
            self.insert(start, &data[lo..hi]);
            self.flush();
        }

        if self
            .eof_index
            .is_some_and(|eof| self.output.bytes_written() >= eof)
        {
            self.output.end_input();
        }
    }

    /// Number of bytes held that are not yet contiguous with the output.
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// `true` when nothing is waiting on a gap.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn stream_out(&self) -> &FlowBuffer {
        &self.output
    }

    pub fn stream_out_mut(&mut self) -> &mut FlowBuffer {
        &mut self.output
    }

    /// Insert `[start, start + data.len())`, coalescing every pending range it
    /// overlaps or touches into a single range.
    fn insert(&mut self, start: u64, data: &[u8]) {
        let end = start + data.len() as u64;

        // Ranges are disjoint, so ordering by start also orders by end: walk
        // backwards from the last range starting at or before `end` until one
        // ends before `start`.
        let touching: Vec<u64> = self
            .pending
            .range(..=end)
            .rev()
            .take_while(|&(&s, bytes)| s + bytes.len() as u64 >= start)
            .map(|(&s, _)| s)
            .collect();

        let merged_start = touching.last().map_or(start, |&s| s.min(start));
        let mut merged_end = end;
        let mut old = Vec::with_capacity(touching.len());
        for s in touching {
            if let Some(bytes) = self.pending.remove(&s) {
                self.pending_bytes -= bytes.len();
                merged_end = merged_end.max(s + bytes.len() as u64);
                old.push((s, bytes));
            }
        }

        let mut merged = vec![0u8; (merged_end - merged_start) as usize];
        for (s, bytes) in old {
            let at = (s - merged_start) as usize;
            merged[at..at + bytes.len()].copy_from_slice(&bytes);
        }
        let at = (start - merged_start) as usize;
        merged[at..at + data.len()].copy_from_slice(data);

        self.pending_bytes += merged.len();
        self.pending.insert(merged_start, merged);
    }

    /// Move every range that is now contiguous with the output into it.
    fn flush(&mut self) {
        while let Some(entry) = self.pending.first_entry() {
            if *entry.key() != self.output.bytes_written() {
                break;
            }
            let bytes = entry.remove();
            self.pending_bytes -= bytes.len();
            let written = self.output.write(&bytes);
            debug_assert_eq!(written, bytes.len(), "pending range exceeded the window");
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

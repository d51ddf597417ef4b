//! Inbound half of a connection: reassembly, ACK number and receive window.
//!
//! The [`Receiver`] is responsible for everything that happens *after* a
//! segment has been decoded and *before* the application reads contiguous
//! bytes:
//! - Capturing the peer's ISN from its SYN.
//! - Translating wire sequence numbers into stream indices.
//! - Handing payloads to the [`Reassembler`], which buffers out-of-order
//!   data, drops duplicates and enforces the window.
//! - Computing the ACK number and advertised window for outbound segments.
//!
//! The [`Receiver`] does **not** send ACKs itself; it provides the values
//! that [`crate::connection::Connection`] stamps on outbound segments.

use crate::flow_buffer::FlowBuffer;
use crate::reassembler::Reassembler;
use crate::segment::Segment;
use crate::seqnum::{unwrap, wrap, SeqNum};

/// Receive-side state for one connection.
#[derive(Debug)]
pub struct Receiver {
    reassembler: Reassembler,
    capacity: usize,
    /// Peer's initial sequence number; `None` until its SYN arrives.
    isn: Option<SeqNum>,
    /// Absolute sequence number of the most recent segment, for unwrapping.
    checkpoint: u64,
}

impl Receiver {
    /// Create a receiver whose inbound stream holds at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            reassembler: Reassembler::new(capacity),
            capacity,
            isn: None,
            checkpoint: 0,
        }
    }

    /// Process an inbound segment.
    ///
    /// Before the peer's SYN is seen, everything except a SYN is ignored.
    pub fn segment_received(&mut self, seg: &Segment) {
        let header = &seg.header;
        let isn = match self.isn {
            Some(isn) => isn,
            None if header.syn => {
                self.isn = Some(header.seqno);
                self.checkpoint = 0;
                log::debug!("[rx] ← SYN isn={}", header.seqno);
                header.seqno
            }
            None => return,
        };

        let absolute = unwrap(header.seqno, isn, self.checkpoint);
        self.checkpoint = absolute;

        // Stream index 0 is the byte right after the SYN.  A non-SYN segment
        // claiming absolute 0 is stale and has no stream position.
        let Some(index) = (absolute + u64::from(header.syn)).checked_sub(1) else {
            return;
        };
        self.reassembler.push(&seg.payload, index, header.fin);
    }

    /// ACK number to advertise, or `None` before the peer's SYN has arrived.
    ///
    /// Covers the SYN, every byte delivered in order, and the FIN once the
    /// inbound stream has ended.
    pub fn ackno(&self) -> Option<SeqNum> {
        let isn = self.isn?;
        let out = self.reassembler.stream_out();
        let absolute = out.bytes_written() + 1 + u64::from(out.input_ended());
        Some(wrap(absolute, isn))
    }

    /// Number of bytes the receiver is willing to accept beyond [`ackno`](Self::ackno).
    pub fn window_size(&self) -> usize {
        self.capacity - self.reassembler.stream_out().buffer_size()
    }

    pub fn unassembled_bytes(&self) -> usize {
        self.reassembler.pending_bytes()
    }

    pub fn isn(&self) -> Option<SeqNum> {
        self.isn
    }

    /// The reassembled inbound stream, for the application to read.
    pub fn stream_out(&self) -> &FlowBuffer {
        self.reassembler.stream_out()
    }

    pub fn stream_out_mut(&mut self) -> &mut FlowBuffer {
        self.reassembler.stream_out_mut()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

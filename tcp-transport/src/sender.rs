//! Outbound half of a connection: segmentation, flight tracking, retransmission.
//!
//! [`Sender`] reads application bytes from its outbound [`FlowBuffer`], cuts
//! them into segments that fit the peer's advertised window, and queues the
//! segments for transmission.  It does **not** touch the link;
//! [`crate::connection::Connection`] drains [`Sender::segments_out`], stamps
//! the receive-side fields and hands the segments down.
//!
//! # Sequence-number layout
//!
//! ```text
//!  last ackno              next_seqno            ackno + window
//!      │                       │                       │
//!  ────┼───────────────────────┼───────────────────────┼─────▶ absolute seqno
//!      │ <── bytes in flight ─▶│ <──── sendable ─────▶ │
//! ```
//!
//! # Retransmission contract
//!
//! - Every segment that occupies sequence space is tracked until a
//!   cumulative ACK covers all of it.  Pure ACKs are never tracked.
//! - One timer covers the whole flight: armed iff anything is tracked.
//! - On expiry only the oldest tracked segment is re-sent.  The RTO doubles
//!   and the retransmission counts as consecutive only when the peer's
//!   window is open; a zero window is the receiver stalling, not loss.
//! - A strictly newer ACK restores the initial RTO (unless it advertises a
//!   zero window), restarts the timer and clears the consecutive count.

use std::collections::VecDeque;
use std::time::Duration;

use crate::flow_buffer::FlowBuffer;
use crate::segment::{Header, Segment};
use crate::seqnum::{unwrap, wrap, SeqNum};
use crate::state::{ConnectionState, StateEvent};
use crate::timer::RetransmitTimer;

// ---------------------------------------------------------------------------
// FlightTracker
// ---------------------------------------------------------------------------

/// A transmitted segment awaiting acknowledgement.
#[derive(Debug, Clone)]
struct TrackedSegment {
    /// Absolute sequence number of the segment's first element.
    seqno: u64,
    segment: Segment,
}

impl TrackedSegment {
    /// One past the last absolute sequence number this segment occupies.
    fn end(&self) -> u64 {
        self.seqno + self.segment.length_in_sequence_space() as u64
    }
}

/// What a cumulative ACK retired.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct AckOutcome {
    retired: usize,
    syn_acked: bool,
    fin_acked: bool,
}

/// Outstanding segments plus the single retransmission timer covering them.
#[derive(Debug)]
struct FlightTracker {
    /// In-flight segments in send order, which is also ascending seqno order.
    segments: VecDeque<TrackedSegment>,
    timer: RetransmitTimer,
}

impl FlightTracker {
    fn new(initial_rto: Duration) -> Self {
        Self {
            segments: VecDeque::new(),
            timer: RetransmitTimer::new(initial_rto),
        }
    }

    fn track(&mut self, seqno: u64, segment: Segment) {
        self.segments.push_back(TrackedSegment { seqno, segment });
        self.timer.arm();
    }

    /// Retire every segment fully covered by `ackno`.
    ///
    /// `is_new` says whether `ackno` is strictly beyond every earlier ACK.
    fn ack_received(&mut self, ackno: u64, is_new: bool, window: u16) -> AckOutcome {
        let mut outcome = AckOutcome::default();
        self.segments.retain(|t| {
            // A SYN is retired only by the exact ACK for it, so an unrelated
            // ACK can never complete the handshake.
            let covered = if t.segment.header.syn {
                ackno == t.seqno + 1
            } else {
                ackno >= t.end()
            };
            if covered {
                outcome.retired += 1;
                outcome.syn_acked |= t.segment.header.syn;
                outcome.fin_acked |= t.segment.header.fin;
            }
            !covered
        });

        if is_new {
            if window != 0 {
                self.timer.reset_rto();
            }
            if !self.segments.is_empty() {
                self.timer.restart();
            }
        }
        if self.segments.is_empty() {
            self.timer.disarm();
        }
        outcome
    }

    /// Advance the timer; on expiry return the oldest segment for re-sending.
    fn tick(&mut self, dt: Duration) -> Option<Segment> {
        if !self.timer.tick(dt) {
            return None;
        }
        self.segments.front().map(|t| t.segment.clone())
    }

    fn bytes_in_flight(&self) -> u64 {
        self.segments
            .iter()
            .map(|t| t.segment.length_in_sequence_space() as u64)
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Send-side state for one connection.
#[derive(Debug)]
pub struct Sender {
    isn: SeqNum,
    stream: FlowBuffer,
    segments_out: VecDeque<Segment>,
    tracker: FlightTracker,
    max_payload_size: usize,

    /// Absolute sequence number of the next new element to send.
    next_seqno: u64,
    /// Most recent ACK number and window from the peer.
    last_ackno: SeqNum,
    last_window: u16,
    /// Recent absolute sequence number used to unwrap ACKs.
    checkpoint: u64,
    consecutive_retransmissions: u32,
    state: ConnectionState,
}

impl Sender {
    /// Create a sender.
    ///
    /// `capacity` bounds the outbound stream, `initial_rto` seeds the
    /// retransmission timer and `isn` is the sequence number of our SYN.
    pub fn new(capacity: usize, initial_rto: Duration, max_payload_size: usize, isn: SeqNum) -> Self {
        Self {
            isn,
            stream: FlowBuffer::new(capacity),
            segments_out: VecDeque::new(),
            tracker: FlightTracker::new(initial_rto),
            max_payload_size,
            next_seqno: 0,
            last_ackno: isn,
            // Assume a one-byte window until the peer advertises one.
            last_window: 1,
            checkpoint: 0,
            consecutive_retransmissions: 0,
            state: ConnectionState::Closed,
        }
    }

    /// Emit as many segments as the peer's window allows.
    ///
    /// The first call sends the SYN and nothing else.  Afterwards data is cut
    /// into segments of at most `max_payload_size` bytes; the FIN rides on the
    /// last data segment when there is room for it, or goes out alone.
    pub fn fill_window(&mut self) {
        if self.state == ConnectionState::Reset {
            return;
        }
        if self.next_seqno == 0 {
            self.send_new(Vec::new(), true, false);
            return;
        }
        if self.state.fin_sent() {
            return;
        }

        let right_edge = self.window_right_edge();
        while right_edge > self.next_seqno {
            let room = right_edge - self.next_seqno;
            let len = (self.max_payload_size as u64).min(room) as usize;
            let payload = self.stream.read(len);
            let fin = self.stream.eof() && (payload.len() as u64) < room;
            if payload.is_empty() && !fin {
                break;
            }
            self.send_new(payload, false, fin);
            if fin {
                break;
            }
        }
    }

    /// Process an ACK from the peer, then try to use any newly opened window.
    pub fn ack_received(&mut self, ackno: SeqNum, window_size: u16) {
        let absolute = unwrap(ackno, self.isn, self.checkpoint);
        if absolute > self.next_seqno {
            log::debug!("[tx] ← ACK ack={ackno} beyond next seqno, ignored");
            return;
        }
        let previous = unwrap(self.last_ackno, self.isn, self.checkpoint);

        let outcome = self.tracker.ack_received(absolute, absolute > previous, window_size);
        if outcome.retired > 0 {
            log::debug!(
                "[tx] ← ACK ack={ackno} win={window_size} retired={} in_flight={}",
                outcome.retired,
                self.bytes_in_flight()
            );
        }
        if outcome.syn_acked {
            self.state = self.state.on_event(StateEvent::SynAcked);
        }
        if outcome.fin_acked {
            self.state = self.state.on_event(StateEvent::FinAcked);
        }

        self.consecutive_retransmissions = 0;
        // A reordered older ACK must not move the reference point backwards.
        if absolute >= previous {
            self.last_ackno = ackno;
            self.last_window = window_size;
        }

        self.fill_window();
    }

    /// Notify the sender that `dt` has passed; may retransmit one segment.
    pub fn tick(&mut self, dt: Duration) {
        let Some(segment) = self.tracker.tick(dt) else {
            return;
        };
        log::debug!("[tx] timeout, retransmit {segment} rto={:?}", self.tracker.timer.rto());
        self.segments_out.push_back(segment);
        if self.last_window != 0 {
            self.consecutive_retransmissions += 1;
            self.tracker.timer.back_off();
        }
    }

    /// Queue an untracked, zero-length segment at `next_seqno`.
    ///
    /// Used for pure ACKs, keep-alive replies and RST.
    pub fn send_empty_segment(&mut self) {
        self.segments_out.push_back(Segment {
            header: Header {
                seqno: wrap(self.next_seqno, self.isn),
                ..Header::default()
            },
            payload: Vec::new(),
        });
    }

    /// Stop sending for good.
    pub fn abort(&mut self) {
        self.stream.set_error();
        self.state = self.state.on_event(StateEvent::Reset);
    }

    /// Sequence numbers sent but not yet acknowledged (SYN and FIN count one each).
    pub fn bytes_in_flight(&self) -> u64 {
        self.tracker.bytes_in_flight()
    }

    pub fn consecutive_retransmissions(&self) -> u32 {
        self.consecutive_retransmissions
    }

    /// Segments waiting to be handed to the link, oldest first.
    pub fn segments_out(&mut self) -> &mut VecDeque<Segment> {
        &mut self.segments_out
    }

    pub fn next_seqno_absolute(&self) -> u64 {
        self.next_seqno
    }

    pub fn next_seqno(&self) -> SeqNum {
        wrap(self.next_seqno, self.isn)
    }

    pub fn isn(&self) -> SeqNum {
        self.isn
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current retransmission timeout.
    pub fn rto(&self) -> Duration {
        self.tracker.timer.rto()
    }

    pub fn timer_armed(&self) -> bool {
        self.tracker.timer.is_armed()
    }

    /// The outbound stream the application writes into.
    pub fn stream_in(&self) -> &FlowBuffer {
        &self.stream
    }

    pub fn stream_in_mut(&mut self) -> &mut FlowBuffer {
        &mut self.stream
    }

    /// Absolute sequence number one past the usable window.
    ///
    /// A zero window counts as one so that a single byte can still go out.
    fn window_right_edge(&self) -> u64 {
        unwrap(self.last_ackno, self.isn, self.checkpoint) + u64::from(self.last_window.max(1))
    }

    /// Assign the next sequence number to a fresh segment and queue it.
    fn send_new(&mut self, payload: Vec<u8>, syn: bool, fin: bool) {
        let segment = Segment {
            header: Header {
                seqno: wrap(self.next_seqno, self.isn),
                syn,
                fin,
                ..Header::default()
            },
            payload,
        };
        let seqno = self.next_seqno;
        let len = segment.length_in_sequence_space() as u64;
        log::debug!("[tx] → {segment}");

        self.checkpoint = seqno;
        self.next_seqno += len;
        self.segments_out.push_back(segment.clone());
        if len > 0 {
            self.tracker.track(seqno, segment);
        }
        if syn {
            self.state = self.state.on_event(StateEvent::SynSent);
        }
        if fin {
            self.state = self.state.on_event(StateEvent::FinSent);
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

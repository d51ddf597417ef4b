//! Per-connection lifecycle manager.
//!
//! A [`Connection`] owns the complete state for one peer-to-peer session:
//! - a [`Sender`] for the outbound byte stream,
//! - a [`Receiver`] for the inbound byte stream,
//! - a [`SegmentLink`] that carries stamped outbound segments away.
//!
//! It is driven entirely from outside.  The lower layer calls
//! [`Connection::on_segment`] for every inbound segment, the application
//! calls [`Connection::write`] / [`Connection::read`], and the driver calls
//! [`Connection::tick`] with the virtual time that has passed.  Nothing here
//! blocks or reads a clock.
//!
//! # Closing
//!
//! ```text
//!  prerequisites met:   inbound ended and fully reassembled
//!                       outbound ended, FIN sent, nothing in flight
//!
//!  peer closed first  ──▶ inactive as soon as prerequisites are met
//!  we closed first    ──▶ linger 10 × RTO after prerequisites are met,
//!                         so a lost final ACK can be repeated
//! ```
//!
//! A RST (received, or sent after too many retransmissions) is terminal:
//! both streams are marked errored and the connection goes inactive at once.
//! Dropping a connection that is still active sends a best-effort RST.

use std::collections::VecDeque;
use std::time::Duration;

use crate::config::{ConfigError, TcpConfig};
use crate::flow_buffer::FlowBuffer;
use crate::link::SegmentLink;
use crate::receiver::Receiver;
use crate::segment::Segment;
use crate::sender::Sender;
use crate::seqnum::{FixedIsn, IsnSource, RandomIsn};
use crate::state::ConnectionState;

/// A reliable, bidirectional byte stream over an unreliable segment link.
#[derive(Debug)]
pub struct Connection<L: SegmentLink = VecDeque<Segment>> {
    cfg: TcpConfig,
    sender: Sender,
    receiver: Receiver,
    link: L,

    /// Set once a RST has been received or sent.
    rst: bool,
    /// Cleared when the peer closes first; no need to wait for stragglers then.
    linger_after_streams_finish: bool,
    /// Virtual time at which the close prerequisites were first met.
    linger_start: Option<Duration>,
    now: Duration,
    last_segment_received_at: Duration,
}

impl<L: SegmentLink> Connection<L> {
    /// Create a closed connection.
    ///
    /// The ISN is `cfg.fixed_isn` if set, otherwise drawn from OS entropy.
    pub fn new(cfg: TcpConfig, link: L) -> Result<Self, ConfigError> {
        match cfg.fixed_isn {
            Some(isn) => Self::with_isn_source(cfg, link, &mut FixedIsn(isn)),
            None => Self::with_isn_source(cfg, link, &mut RandomIsn::from_entropy()),
        }
    }

    /// Create a closed connection whose ISN comes from `isn_source`.
    pub fn with_isn_source(
        cfg: TcpConfig,
        link: L,
        isn_source: &mut impl IsnSource,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let isn = isn_source.next_isn();
        log::debug!("[conn] new connection isn={isn}");
        Ok(Self {
            sender: Sender::new(cfg.send_capacity, cfg.rt_timeout, cfg.max_payload_size, isn),
            receiver: Receiver::new(cfg.recv_capacity),
            cfg,
            link,
            rst: false,
            linger_after_streams_finish: true,
            linger_start: None,
            now: Duration::ZERO,
            last_segment_received_at: Duration::ZERO,
        })
    }

    // -----------------------------------------------------------------------
    // Application surface
    // -----------------------------------------------------------------------

    /// Active open: send the SYN.
    pub fn connect(&mut self) {
        if self.sender.next_seqno_absolute() != 0 {
            log::warn!("[conn] connect() called on a connection that already sent its SYN");
            return;
        }
        self.sender.fill_window();
        self.flush();
    }

    /// Queue application bytes for sending.  Returns how many were accepted.
    ///
    /// Writing on a closed connection opens it.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if self.rst {
            return 0;
        }
        let accepted = self.sender.stream_in_mut().write(data);
        self.sender.fill_window();
        self.flush();
        accepted
    }

    /// Close the outbound direction.  The FIN follows the last queued byte.
    pub fn end_input_stream(&mut self) {
        if self.rst {
            return;
        }
        self.sender.stream_in_mut().end_input();
        self.sender.fill_window();
        self.flush();
        self.update_linger();
    }

    /// Read up to `len` reassembled inbound bytes.
    pub fn read(&mut self, len: usize) -> Vec<u8> {
        self.receiver.stream_out_mut().read(len)
    }

    pub fn inbound_stream(&self) -> &FlowBuffer {
        self.receiver.stream_out()
    }

    pub fn inbound_stream_mut(&mut self) -> &mut FlowBuffer {
        self.receiver.stream_out_mut()
    }

    pub fn remaining_outbound_capacity(&self) -> usize {
        self.sender.stream_in().remaining_capacity()
    }

    pub fn bytes_in_flight(&self) -> u64 {
        self.sender.bytes_in_flight()
    }

    pub fn unassembled_bytes(&self) -> usize {
        self.receiver.unassembled_bytes()
    }

    pub fn time_since_last_segment_received(&self) -> Duration {
        self.now.saturating_sub(self.last_segment_received_at)
    }

    pub fn state(&self) -> ConnectionState {
        self.sender.state()
    }

    pub fn config(&self) -> &TcpConfig {
        &self.cfg
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    // -----------------------------------------------------------------------
    // Driver surface
    // -----------------------------------------------------------------------

    /// Process one inbound segment.
    pub fn on_segment(&mut self, seg: &Segment) {
        if self.rst {
            log::trace!("[conn] ← {seg} after reset, ignored");
            return;
        }
        self.last_segment_received_at = self.now;
        let header = &seg.header;
        log::trace!("[conn] ← {seg}");

        if header.rst {
            log::warn!("[conn] ← RST, connection reset by peer");
            self.enter_reset();
            return;
        }

        // The peer closed before our outbound stream finished: passive close.
        if header.fin && !self.sender.stream_in().eof() {
            self.linger_after_streams_finish = false;
        }

        self.receiver.segment_received(seg);

        // An ACK means nothing to a sender that has not sent its SYN.
        if header.ack && self.receiver.ackno().is_some() && self.sender.next_seqno_absolute() > 0 {
            self.sender.ack_received(header.ackno, header.window);
            self.sender.fill_window();
        }

        let sent = self.flush();

        // Anything that occupies sequence space must be acknowledged.
        if sent == 0 && seg.length_in_sequence_space() > 0 && self.receiver.ackno().is_some() {
            self.sender.fill_window();
            if self.sender.segments_out().is_empty() {
                self.sender.send_empty_segment();
            }
            self.flush();
        }

        // Keep-alive: a zero-length segment one below the ACK number.
        if let Some(ackno) = self.receiver.ackno() {
            if seg.length_in_sequence_space() == 0 && header.seqno == ackno - 1 {
                self.sender.send_empty_segment();
                self.flush();
            }
        }

        self.update_linger();
    }

    /// Advance virtual time by `dt`.
    ///
    /// May retransmit, and resets the connection once the consecutive
    /// retransmission count exceeds `cfg.max_retx_attempts`.
    pub fn tick(&mut self, dt: Duration) {
        self.now = self.now.saturating_add(dt);
        if self.rst {
            return;
        }
        self.sender.tick(dt);
        if self.sender.consecutive_retransmissions() > self.cfg.max_retx_attempts {
            log::warn!(
                "[conn] {} consecutive retransmissions, giving up",
                self.sender.consecutive_retransmissions()
            );
            self.send_rst();
        } else {
            self.flush();
        }
    }

    /// `true` while the connection still has work to do or is lingering.
    pub fn active(&self) -> bool {
        if self.rst {
            return false;
        }
        match self.linger_start {
            None => true,
            Some(start) => {
                self.linger_after_streams_finish
                    && self.now.saturating_sub(start) < self.cfg.linger_timeout()
            }
        }
    }

    /// Both streams are finished and every byte we sent has been acknowledged.
    pub fn prerequisites_met(&self) -> bool {
        let inbound = self.receiver.stream_out();
        inbound.input_ended()
            && self.receiver.unassembled_bytes() == 0
            && self.sender.stream_in().eof()
            && self.sender.state().fin_sent()
            && self.sender.bytes_in_flight() == 0
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Stamp and transmit every queued outbound segment.  Returns how many went out.
    fn flush(&mut self) -> usize {
        let ackno = self.receiver.ackno();
        let window = u16::try_from(self.receiver.window_size()).unwrap_or(u16::MAX);
        let mut sent = 0;
        while let Some(mut seg) = self.sender.segments_out().pop_front() {
            if let Some(ackno) = ackno {
                seg.header.ack = true;
                seg.header.ackno = ackno;
                seg.header.window = window;
            }
            seg.header.rst |= self.rst;
            log::trace!("[conn] → {seg}");
            if let Err(e) = self.link.transmit(seg) {
                log::warn!("[conn] transmit failed: {e}");
            }
            sent += 1;
        }
        sent
    }

    fn update_linger(&mut self) {
        if self.prerequisites_met() {
            if self.linger_start.is_none() {
                self.linger_start = Some(self.now);
            }
        } else {
            self.linger_start = None;
        }
    }

    fn enter_reset(&mut self) {
        self.rst = true;
        self.linger_after_streams_finish = false;
        self.sender.abort();
        self.receiver.stream_out_mut().set_error();
    }

    /// Reset the connection and tell the peer.
    fn send_rst(&mut self) {
        self.enter_reset();
        self.sender.segments_out().clear();
        self.sender.send_empty_segment();
        self.flush();
    }
}

impl<L: SegmentLink> Drop for Connection<L> {
    fn drop(&mut self) {
        if self.active() {
            log::warn!("[conn] dropped while active, sending RST");
            self.send_rst();
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

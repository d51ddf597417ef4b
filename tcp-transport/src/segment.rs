//! In-memory TCP segment structure.
//!
//! A [`Segment`] is what the transport core produces and consumes.  Turning
//! it into bytes (and validating checksums) belongs to the framing layer
//! underneath; by the time a segment reaches this crate it is well-formed.

use std::fmt;

use crate::seqnum::SeqNum;

/// TCP header fields relevant to the transport core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    /// Sequence number of the first sequence-space element (SYN or first byte).
    pub seqno: SeqNum,
    /// `ackno` is meaningful.
    pub ack: bool,
    /// Next sequence number expected from the peer.
    pub ackno: SeqNum,
    /// Abort the connection.
    pub rst: bool,
    /// Synchronise sequence numbers.
    pub syn: bool,
    /// Sender has no more data.
    pub fin: bool,
    /// Advertised receive window in bytes.
    pub window: u16,
}

/// A complete segment: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Segment {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Segment {
    /// Number of sequence numbers this segment occupies (SYN and FIN count one each).
    pub fn length_in_sequence_space(&self) -> usize {
        self.payload.len() + usize::from(self.header.syn) + usize::from(self.header.fin)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = &self.header;
        write!(f, "seq={}", h.seqno)?;
        for (set, name) in [(h.syn, "SYN"), (h.fin, "FIN"), (h.rst, "RST")] {
            if set {
                write!(f, " {name}")?;
            }
        }
        if h.ack {
            write!(f, " ack={} win={}", h.ackno, h.window)?;
        }
        write!(f, " len={}", self.payload.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_segment(syn: bool, fin: bool, payload: &[u8]) -> Segment {
        Segment {
            header: Header {
                seqno: SeqNum::new(42),
                syn,
                fin,
                ..Header::default()
            },
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn sequence_space_counts_flags() {
        assert_eq!(make_segment(false, false, b"").length_in_sequence_space(), 0);
        assert_eq!(make_segment(true, false, b"").length_in_sequence_space(), 1);
        assert_eq!(make_segment(false, true, b"abc").length_in_sequence_space(), 4);
        assert_eq!(make_segment(true, true, b"abc").length_in_sequence_space(), 5);
    }

    #[test]
    fn display_lists_flags_and_ack() {
        let mut seg = make_segment(true, false, b"");
        seg.header.ack = true;
        seg.header.ackno = SeqNum::new(7);
        seg.header.window = 100;
        assert_eq!(seg.to_string(), "seq=42 SYN ack=7 win=100 len=0");
    }

    #[test]
    fn default_header_is_clear() {
        let h = Header::default();
        assert!(!h.ack && !h.rst && !h.syn && !h.fin);
        assert_eq!(h.window, 0);
    }
}

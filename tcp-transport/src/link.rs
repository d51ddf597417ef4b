//! Lower-layer seam: where a connection's outbound segments go.
//!
//! A [`crate::connection::Connection`] owns one [`SegmentLink`] and pushes
//! every stamped outbound segment through it.  Framing, addressing and the
//! actual wire live below this trait; the transport core never sees them.
//!
//! Three links are provided:
//! - `VecDeque<Segment>`: an in-memory queue the driver drains.
//! - `Rc<RefCell<VecDeque<Segment>>>`: the same, shared with the driver so
//!   segments sent while the connection is dropped remain observable.
//! - `tokio::sync::mpsc::UnboundedSender<Segment>`: hands segments to an
//!   async task.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::segment::Segment;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors a link can report when asked to transmit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Nobody is listening on the other side any more.
    #[error("link closed")]
    Closed,
    /// The shared queue is borrowed elsewhere.
    #[error("link busy")]
    Busy,
}

// ---------------------------------------------------------------------------
// SegmentLink
// ---------------------------------------------------------------------------

/// Something that accepts outbound segments.
pub trait SegmentLink {
    fn transmit(&mut self, segment: Segment) -> Result<(), LinkError>;
}

impl SegmentLink for VecDeque<Segment> {
    fn transmit(&mut self, segment: Segment) -> Result<(), LinkError> {
        self.push_back(segment);
        Ok(())
    }
}

impl SegmentLink for Rc<RefCell<VecDeque<Segment>>> {
    fn transmit(&mut self, segment: Segment) -> Result<(), LinkError> {
        self.try_borrow_mut()
            .map_err(|_| LinkError::Busy)?
            .push_back(segment);
        Ok(())
    }
}

impl SegmentLink for UnboundedSender<Segment> {
    fn transmit(&mut self, segment: Segment) -> Result<(), LinkError> {
        self.send(segment).map_err(|_| LinkError::Closed)
    }
}

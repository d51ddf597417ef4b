//! `tcp-transport`: the transport core of a user-space TCP.
//!
//! # Architecture
//!
//! ```text
//!   application  write / end_input_stream          read
//!                     │                              ▲
//!  ┌──────────────────▼──────────────────────────────┴───────────┐
//!  │                        Connection                           │
//!  │  ┌──────────────────────┐        ┌────────────────────────┐ │
//!  │  │ Sender               │        │ Receiver               │ │
//!  │  │  FlowBuffer (out)    │        │  Reassembler           │ │
//!  │  │  flight + RTO timer  │        │   └─ FlowBuffer (in)   │ │
//!  │  └──────────┬───────────┘        └───────────▲────────────┘ │
//!  │             │ segments   stamp ackno/window  │ segments     │
//!  └─────────────┼────────────────────────────────┼──────────────┘
//!           ┌────▼─────┐                     on_segment
//!           │   link   │  (SegmentLink: queue, shared queue, mpsc)
//!           └──────────┘
//! ```
//!
//! Everything is single-threaded and driven from outside; time is virtual
//! and advances only through `tick(dt)`.
//!
//! Each module has a single responsibility:
//! - [`flow_buffer`]  : bounded in-memory byte stream
//! - [`seqnum`]       : 32-bit wrapping sequence numbers and ISN sources
//! - [`reassembler`]  : out-of-order substrings into an in-order stream
//! - [`receiver`]     : inbound half: ISN capture, ackno, window
//! - [`sender`]       : outbound half: segmentation, flight, retransmission
//! - [`timer`]        : virtual-time retransmission timer
//! - [`state`]        : connection phase state machine
//! - [`connection`]   : composes the halves, close and reset handling
//! - [`segment`]      : in-memory segment structure
//! - [`link`]         : where outbound segments go
//! - [`config`]       : tunables and their validation
//! - [`simulator`]    : lossy/reordering network for testing

pub mod config;
pub mod connection;
pub mod flow_buffer;
pub mod link;
pub mod reassembler;
pub mod receiver;
pub mod segment;
pub mod sender;
pub mod seqnum;
pub mod simulator;
pub mod state;
pub mod timer;

pub use config::{ConfigError, TcpConfig};
pub use connection::Connection;
pub use flow_buffer::FlowBuffer;
pub use link::{LinkError, SegmentLink};
pub use segment::{Header, Segment};
pub use seqnum::SeqNum;
pub use state::ConnectionState;

//! Connection phase as an explicit finite-state machine.
//!
//! The phase tracks the *sending* half's progress through the connection
//! lifecycle; the receiving half needs no phase beyond "ISN known or not".
//! Every transition goes through [`ConnectionState::on_event`], whose match
//! arms are the complete transition table:
//!
//! ```text
//!  CLOSED ──SYN sent──▶ SYN_SENT ──SYN acked──▶ ESTABLISHED
//!                          │                         │
//!                          └──────FIN sent───────────┤
//!                                                    ▼
//!                             FIN_ACKED ◀──FIN acked── FIN_SENT
//!
//!  any ──reset──▶ RESET   (absorbing)
//! ```

/// All possible phases of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Nothing sent yet.
    #[default]
    Closed,
    /// SYN sent; waiting for it to be acknowledged.
    SynSent,
    /// Our SYN has been acknowledged; data may flow.
    Established,
    /// Our FIN is outstanding.
    FinSent,
    /// Our FIN has been acknowledged: the outbound direction is finished.
    FinAcked,
    /// The connection was aborted by a RST, sent or received.
    Reset,
}

/// Things that move a [`ConnectionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    SynSent,
    SynAcked,
    FinSent,
    FinAcked,
    Reset,
}

impl ConnectionState {
    /// Apply `event`.  Events with no entry in the table leave the state unchanged.
    pub fn on_event(self, event: StateEvent) -> Self {
        use self::ConnectionState as S;
        use self::StateEvent as E;

        let next = match (self, event) {
            (S::Reset, _) => S::Reset,
            (_, E::Reset) => S::Reset,
            (S::Closed, E::SynSent) => S::SynSent,
            (S::SynSent, E::SynAcked) => S::Established,
            (S::SynSent | S::Established, E::FinSent) => S::FinSent,
            (S::FinSent, E::FinAcked) => S::FinAcked,
            (state, _) => state,
        };
        if next != self {
            log::trace!("[state] {self} --{event:?}--> {next}");
        }
        next
    }

    /// `true` once a FIN has gone out (acknowledged or not).
    pub fn fin_sent(self) -> bool {
        matches!(self, Self::FinSent | Self::FinAcked)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

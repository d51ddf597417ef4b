//! Tunable parameters for a connection.

use std::time::Duration;

use thiserror::Error;

use crate::seqnum::SeqNum;

/// Default capacity of each direction's byte stream.
pub const DEFAULT_CAPACITY: usize = 64_000;
/// Largest payload carried by one segment.
pub const MAX_PAYLOAD_SIZE: usize = 1_000;
/// Initial retransmission timeout.
pub const TIMEOUT_DFLT: Duration = Duration::from_millis(1_000);
/// Consecutive retransmissions tolerated before the connection is aborted.
pub const MAX_RETX_ATTEMPTS: u32 = 8;

/// Per-connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    /// Capacity of the inbound stream (and so the largest receive window).
    pub recv_capacity: usize,
    /// Capacity of the outbound stream.
    pub send_capacity: usize,
    /// Initial RTO.  Lingering after a clean close lasts ten times this.
    pub rt_timeout: Duration,
    pub max_retx_attempts: u32,
    pub max_payload_size: usize,
    /// Use this ISN instead of drawing one at random.
    pub fixed_isn: Option<SeqNum>,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            recv_capacity: DEFAULT_CAPACITY,
            send_capacity: DEFAULT_CAPACITY,
            rt_timeout: TIMEOUT_DFLT,
            max_retx_attempts: MAX_RETX_ATTEMPTS,
            max_payload_size: MAX_PAYLOAD_SIZE,
            fixed_isn: None,
        }
    }
}

impl TcpConfig {
    /// Reject configurations under which a connection could never make progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recv_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("receive"));
        }
        if self.send_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("send"));
        }
        if self.max_payload_size == 0 {
            return Err(ConfigError::ZeroPayloadSize);
        }
        if self.rt_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// How long a cleanly finished connection stays active to absorb stragglers.
    pub fn linger_timeout(&self) -> Duration {
        self.rt_timeout.saturating_mul(10)
    }
}

/// Reasons a [`TcpConfig`] is unusable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} capacity must be non-zero")]
    ZeroCapacity(&'static str),
    #[error("maximum payload size must be non-zero")]
    ZeroPayloadSize,
    #[error("retransmission timeout must be non-zero")]
    ZeroTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = TcpConfig::default();
        assert_eq!(cfg.validate(), Ok(()));
        assert_eq!(cfg.linger_timeout(), Duration::from_millis(10_000));
        assert_eq!(cfg.fixed_isn, None);
    }

    #[test]
    fn zero_values_are_rejected() {
        let cfg = TcpConfig {
            recv_capacity: 0,
            ..TcpConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroCapacity("receive")));

        let cfg = TcpConfig {
            send_capacity: 0,
            ..TcpConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroCapacity("send")));

        let cfg = TcpConfig {
            max_payload_size: 0,
            ..TcpConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroPayloadSize));

        let cfg = TcpConfig {
            rt_timeout: Duration::ZERO,
            ..TcpConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            ConfigError::ZeroCapacity("send").to_string(),
            "send capacity must be non-zero"
        );
    }
}

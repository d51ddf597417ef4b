//! Network simulator for deterministic testing.
//!
//! Real networks drop, reorder, and duplicate segments.  To exercise the
//! reliability mechanisms without depending on actual network conditions,
//! [`Simulator`] sits between two connections and applies a configurable
//! fault model to every batch of segments it carries:
//!
//! | Fault            | Description                                       |
//! |------------------|---------------------------------------------------|
//! | Segment loss     | Drop a segment with probability `loss_rate`.      |
//! | Reordering       | Hold a segment back until after the next batch,   |
//! |                  | letting later segments overtake it.               |
//! | Duplication      | Deliver a segment twice.                          |
//!
//! All randomness comes from a [`StdRng`] seeded from the config, so a failing
//! run replays exactly.
//!
//! [`Endpoints`] wires a client and a server [`Connection`] together through
//! one simulator per direction and drives both in virtual time.

use std::collections::VecDeque;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::connection::Connection;
use crate::segment::Segment;

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given segment is silently dropped.
    pub loss_rate: f64,
    /// Probability that a segment is delivered twice.
    pub duplicate_rate: f64,
    /// Probability that a segment is held back one batch.
    pub reorder_rate: f64,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default: the simulator is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            reorder_rate: 0.0,
            seed: 0,
        }
    }
}

impl SimulatorConfig {
    fn validate(&self) -> Result<(), SimulatorError> {
        for (name, rate) in [
            ("loss", self.loss_rate),
            ("duplicate", self.duplicate_rate),
            ("reorder", self.reorder_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(SimulatorError::InvalidRate { name, rate });
            }
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulatorError {
    #[error("{name} rate {rate} is outside [0, 1]")]
    InvalidRate { name: &'static str, rate: f64 },
}

/// Running totals of what the simulator did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimulatorStats {
    pub delivered: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub reordered: u64,
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// A fault-injecting, one-directional segment carrier.
#[derive(Debug)]
pub struct Simulator {
    config: SimulatorConfig,
    rng: StdRng,
    /// Segments held back by reordering, released after the next batch.
    held: Vec<Segment>,
    stats: SimulatorStats,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Result<Self, SimulatorError> {
        config.validate()?;
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            held: Vec::new(),
            stats: SimulatorStats::default(),
        })
    }

    /// Carry one batch of segments across the simulated network.
    ///
    /// Returns what arrives at the far end, in arrival order.  Segments held
    /// back from the previous batch arrive after this batch's survivors.
    pub fn carry(&mut self, segments: impl IntoIterator<Item = Segment>) -> Vec<Segment> {
        let released = std::mem::take(&mut self.held);
        let mut out = Vec::new();

        for seg in segments {
            if self.rng.gen_bool(self.config.loss_rate) {
                log::trace!("[sim] drop {seg}");
                self.stats.dropped += 1;
                continue;
            }
            if self.rng.gen_bool(self.config.reorder_rate) {
                log::trace!("[sim] hold {seg}");
                self.stats.reordered += 1;
                self.held.push(seg);
                continue;
            }
            if self.rng.gen_bool(self.config.duplicate_rate) {
                log::trace!("[sim] duplicate {seg}");
                self.stats.duplicated += 1;
                out.push(seg.clone());
            }
            out.push(seg);
        }

        out.extend(released);
        self.stats.delivered += out.len() as u64;
        out
    }

    /// Number of segments currently held back.
    pub fn held(&self) -> usize {
        self.held.len()
    }

    pub fn stats(&self) -> SimulatorStats {
        self.stats
    }
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// Two connections joined by a simulated network, driven in virtual time.
#[derive(Debug)]
pub struct Endpoints {
    pub client: Connection,
    pub server: Connection,
    to_server: Simulator,
    to_client: Simulator,
}

impl Endpoints {
    /// Join `client` and `server`.  The two directions fault independently.
    pub fn new(
        client: Connection,
        server: Connection,
        config: SimulatorConfig,
    ) -> Result<Self, SimulatorError> {
        let reverse = SimulatorConfig {
            seed: config.seed.wrapping_add(1),
            ..config.clone()
        };
        Ok(Self {
            client,
            server,
            to_server: Simulator::new(config)?,
            to_client: Simulator::new(reverse)?,
        })
    }

    /// Exchange every queued segment in both directions, then advance both
    /// clocks by `dt`.
    pub fn step(&mut self, dt: Duration) {
        let outbound = drain(&mut self.client);
        for seg in self.to_server.carry(outbound) {
            self.server.on_segment(&seg);
        }
        let outbound = drain(&mut self.server);
        for seg in self.to_client.carry(outbound) {
            self.client.on_segment(&seg);
        }
        self.client.tick(dt);
        self.server.tick(dt);
    }

    /// Step until `done` holds, for at most `max_steps` steps.
    ///
    /// Returns whether `done` was reached.
    pub fn run_until(
        &mut self,
        mut done: impl FnMut(&Self) -> bool,
        dt: Duration,
        max_steps: usize,
    ) -> bool {
        for _ in 0..max_steps {
            if done(self) {
                return true;
            }
            self.step(dt);
        }
        done(self)
    }

    /// Fault statistics for (client → server, server → client).
    pub fn stats(&self) -> (SimulatorStats, SimulatorStats) {
        (self.to_server.stats(), self.to_client.stats())
    }
}

fn drain(conn: &mut Connection) -> VecDeque<Segment> {
    std::mem::take(conn.link_mut())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

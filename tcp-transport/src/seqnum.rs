//! 32-bit wire sequence numbers and their mapping to 64-bit stream offsets.
//!
//! On the wire a TCP sequence number is a `u32` that starts at a random
//! Initial Sequence Number (ISN) and wraps modulo 2^32.  Inside the stack we
//! count in *absolute* sequence numbers: a `u64` that starts at 0 for the SYN
//! and never wraps.
//!
//! ```text
//!  absolute:   0      1      2     ...    2^32-1-isn   2^32-isn   ...
//!  wire:      isn   isn+1  isn+2   ...    u32::MAX        0       ...
//! ```
//!
//! [`wrap`] goes from absolute to wire; [`unwrap`] goes back, which needs a
//! *checkpoint* (a recently seen absolute value) to pick among the infinitely
//! many absolute numbers that share one wire value.

use std::fmt;
use std::ops;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SPAN: u64 = 1 << 32;

/// A wrapping 32-bit sequence number as carried in a segment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SeqNum(u32);

impl SeqNum {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for SeqNum {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<SeqNum> for u32 {
    fn from(n: SeqNum) -> Self {
        n.0
    }
}

impl ops::Add<u32> for SeqNum {
    type Output = SeqNum;

    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0.wrapping_add(rhs))
    }
}

impl ops::Sub<u32> for SeqNum {
    type Output = SeqNum;

    fn sub(self, rhs: u32) -> Self::Output {
        Self(self.0.wrapping_sub(rhs))
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Map absolute sequence number `n` onto the wire, relative to `isn`.
pub fn wrap(n: u64, isn: SeqNum) -> SeqNum {
    // Truncation is the modulo-2^32 reduction.
    isn + n as u32
}

/// Map wire value `n` back to the absolute sequence number closest to `checkpoint`.
///
/// Candidates are exactly 2^32 apart.  When two candidates are equally far
/// from the checkpoint the larger one wins; a candidate that does not fit in
/// a `u64` is never chosen.
pub fn unwrap(n: SeqNum, isn: SeqNum, checkpoint: u64) -> u64 {
    let offset = u64::from(n.raw().wrapping_sub(wrap(checkpoint, isn).raw()));
    if offset == 0 {
        return checkpoint;
    }
    let forward = checkpoint.checked_add(offset);
    let backward = checkpoint.checked_sub(SPAN - offset);
    match (forward, backward) {
        (Some(_), Some(b)) if offset > SPAN - offset => b,
        (Some(f), _) => f,
        // Forward overflows only when checkpoint >= 2^32, so backward fits.
        (None, b) => b.unwrap_or(checkpoint),
    }
}

// ---------------------------------------------------------------------------
// ISN sources
// ---------------------------------------------------------------------------

/// Supplies the initial sequence number for a new connection.
pub trait IsnSource {
    fn next_isn(&mut self) -> SeqNum;
}

/// Always hands out the same ISN.  Useful for reproducible tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedIsn(pub SeqNum);

impl IsnSource for FixedIsn {
    fn next_isn(&mut self) -> SeqNum {
        self.0
    }
}

/// Draws ISNs from a [`StdRng`].
#[derive(Debug, Clone)]
pub struct RandomIsn {
    rng: StdRng,
}

impl RandomIsn {
    /// Seed from operating-system entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic sequence of ISNs for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl IsnSource for RandomIsn {
    fn next_isn(&mut self) -> SeqNum {
        SeqNum(self.rng.gen())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_basics() {
        assert_eq!(wrap(3 * SPAN, SeqNum(0)), SeqNum(0));
        assert_eq!(wrap(3 * SPAN + 17, SeqNum(15)), SeqNum(32));
        assert_eq!(wrap(7 * SPAN - 2, SeqNum(15)), SeqNum(13));
        assert_eq!(wrap(1, SeqNum(u32::MAX)), SeqNum(0));
    }

    #[test]
    fn unwrap_first_sequence_after_zero() {
        assert_eq!(unwrap(SeqNum(1), SeqNum(0), 0), 1);
    }

    #[test]
    fn unwrap_first_wrap_value() {
        assert_eq!(unwrap(SeqNum(1), SeqNum(0), u64::from(u32::MAX)), SPAN + 1);
    }

    #[test]
    fn unwrap_last_value_before_third_wrap() {
        assert_eq!(unwrap(SeqNum(u32::MAX - 1), SeqNum(0), 3 * SPAN), 3 * SPAN - 2);
    }

    #[test]
    fn unwrap_tenth_from_last_before_third_wrap() {
        assert_eq!(unwrap(SeqNum(u32::MAX - 10), SeqNum(0), 3 * SPAN), 3 * SPAN - 11);
    }

    #[test]
    fn unwrap_non_zero_isn() {
        assert_eq!(unwrap(SeqNum(u32::MAX), SeqNum(10), 3 * SPAN), 3 * SPAN - 11);
        assert_eq!(unwrap(SeqNum(u32::MAX), SeqNum(u32::MAX), 0), 0);
        assert_eq!(unwrap(SeqNum(16), SeqNum(16), 0), 0);
        assert_eq!(unwrap(SeqNum(15), SeqNum(16), 0), u64::from(u32::MAX));
        assert_eq!(unwrap(SeqNum(0), SeqNum(i32::MAX as u32), 0), (i32::MAX as u64) + 2);
    }

    #[test]
    fn unwrap_big_offsets() {
        assert_eq!(unwrap(SeqNum(u32::MAX), SeqNum(0), 0), u64::from(u32::MAX));
        assert_eq!(unwrap(SeqNum(i32::MAX as u32), SeqNum(0), 0), i32::MAX as u64);
    }

    #[test]
    fn unwrap_never_goes_below_zero() {
        // Closest candidate would be negative; only the forward one is valid.
        assert_eq!(unwrap(SeqNum(u32::MAX), SeqNum(0), 0), u64::from(u32::MAX));
    }

    #[test]
    fn unwrap_near_u64_max_picks_backward_candidate() {
        let checkpoint = u64::MAX - 5;
        let n = wrap(checkpoint + 3, SeqNum(99));
        assert_eq!(unwrap(n, SeqNum(99), checkpoint), checkpoint + 3);

        let n = wrap(checkpoint - 100, SeqNum(99));
        assert_eq!(unwrap(n, SeqNum(99), checkpoint), checkpoint - 100);
    }

    #[test]
    fn unwrap_tie_is_deterministic() {
        let checkpoint = 5 * SPAN;
        let n = wrap(checkpoint + SPAN / 2, SeqNum(7));
        let first = unwrap(n, SeqNum(7), checkpoint);
        assert_eq!(first, checkpoint + SPAN / 2);
        assert_eq!(unwrap(n, SeqNum(7), checkpoint), first);
    }

    #[test]
    fn roundtrip_with_nearby_checkpoint() {
        let mut rng = StdRng::seed_from_u64(42);
        let max_dist = (1u64 << 31) - 1;
        for _ in 0..20_000 {
            let isn = SeqNum(rng.gen());
            let n: u64 = rng.gen_range(0..(1u64 << 63));
            let dist = rng.gen_range(0..=max_dist);
            let checkpoint = if rng.gen_bool(0.5) { n + dist } else { n.saturating_sub(dist) };
            assert_eq!(unwrap(wrap(n, isn), isn, checkpoint), n, "isn={isn} n={n} cp={checkpoint}");
        }
    }

    #[test]
    fn seqnum_arithmetic_wraps() {
        assert_eq!(SeqNum(u32::MAX) + 2, SeqNum(1));
        assert_eq!(SeqNum(0) - 1, SeqNum(u32::MAX));
    }

    #[test]
    fn isn_sources() {
        let mut fixed = FixedIsn(SeqNum(1234));
        assert_eq!(fixed.next_isn(), SeqNum(1234));
        assert_eq!(fixed.next_isn(), SeqNum(1234));

        let mut a = RandomIsn::seeded(9);
        let mut b = RandomIsn::seeded(9);
        assert_eq!(a.next_isn(), b.next_isn());
    }
}

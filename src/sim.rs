//! Synthetic bidder stream.
//!
//! Deterministic, configurable sequence of purchase attempts for load tests,
//! demos, and benches. The same seed always yields the same attempts.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::UserId;

/// Configuration for the synthetic bidder stream.
/// All ranges are inclusive. Same config + seed produces the same stream.
#[derive(Clone, Debug)]
pub struct SimConfig {
    /// RNG seed. Same seed, same attempt stream.
    pub seed: u64,
    /// Number of attempts to generate (used when collecting).
    pub num_attempts: usize,
    /// Number of distinct buyer ids (1..=num_bidders).
    pub num_bidders: u64,
    /// Quantity range (inclusive) per attempt.
    pub quantity_min: u32,
    pub quantity_max: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            num_attempts: 100,
            num_bidders: 8,
            quantity_min: 1,
            quantity_max: 5,
        }
    }
}

/// One synthetic purchase attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct BidAttempt {
    pub buyer_id: UserId,
    pub buyer_name: String,
    pub quantity: u32,
}

/// Deterministic attempt stream. Create with [`BidderSim::new`]; pull attempts.
pub struct BidderSim {
    rng: StdRng,
    config: SimConfig,
}

impl BidderSim {
    /// Builds a stream with the given config. Same config and seed, same stream.
    pub fn new(config: SimConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self { rng, config }
    }

    /// Generates the next attempt. Advances the RNG.
    pub fn next_attempt(&mut self) -> BidAttempt {
        let buyer = self.rng.gen_range(1..=self.config.num_bidders.max(1));
        let quantity = self
            .rng
            .gen_range(self.config.quantity_min..=self.config.quantity_max.max(self.config.quantity_min));
        BidAttempt {
            buyer_id: UserId(buyer),
            buyer_name: format!("bidder-{buyer}"),
            quantity,
        }
    }

    /// Returns exactly `n` attempts. Advances the stream state.
    pub fn take_attempts(&mut self, n: usize) -> Vec<BidAttempt> {
        (0..n).map(|_| self.next_attempt()).collect()
    }

    /// Returns the full stream as defined by `config.num_attempts`.
    pub fn all_attempts(&mut self) -> Vec<BidAttempt> {
        self.take_attempts(self.config.num_attempts)
    }
}

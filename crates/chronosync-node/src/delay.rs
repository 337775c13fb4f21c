//! Seeded inter-publication delay generator

use crate::config::{rate_interval, ConfigError, PublishDelay};
use rand::distributions::{Distribution, Uniform};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Sampler {
    UniformMs(Uniform<u64>),
    Fixed(Duration),
}

/// Draws publish delays from a [`PublishDelay`] distribution
///
/// Two generators built from the same seed and distribution yield the same
/// sequence. The rate-based cadence never touches the RNG.
#[derive(Debug, Clone)]
pub struct DelayGenerator {
    rng: ChaCha8Rng,
    sampler: Sampler,
}

impl DelayGenerator {
    pub fn new(delay: &PublishDelay, seed: u32) -> Result<Self, ConfigError> {
        let sampler = match *delay {
            PublishDelay::UniformMs { min_ms, max_ms } => {
                if min_ms > max_ms {
                    return Err(ConfigError::InvalidDelayRange { min_ms, max_ms });
                }
                Sampler::UniformMs(Uniform::new_inclusive(min_ms, max_ms))
            }
            PublishDelay::Rate { per_second } => Sampler::Fixed(rate_interval(per_second)?),
        };

        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(u64::from(seed)),
            sampler,
        })
    }

    /// Next delay in the sequence
    pub fn next_delay(&mut self) -> Duration {
        match &self.sampler {
            Sampler::UniformMs(uniform) => Duration::from_millis(uniform.sample(&mut self.rng)),
            Sampler::Fixed(interval) => *interval,
        }
    }
}

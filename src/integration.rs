//! Simulation draws used to integrate random coefficients out of the likelihood.
//!
//! Draws are stored as an `(N, K, R)` tensor: one stream per individual, one
//! dimension per random coefficient, and `R` replications. Halton draws are
//! fully deterministic; pseudo-random draws honour an explicit seed.

use ndarray::{Array3, Axis};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::{Distribution, Open01};
use serde::{Deserialize, Serialize};

use crate::distribution::MixingDistribution;
use crate::error::{MixedLogitError, Result};

/// How raw uniform draws are produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawMethod {
    /// Low-discrepancy Halton sequences, one prime base per dimension.
    Halton,
    /// Uniform draws from a seeded pseudo-random generator.
    PseudoRandom,
}

/// Configuration for draw generation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DrawOptions {
    /// Number of replications `R` per individual.
    pub n_draws: usize,
    /// Draw generation method.
    pub method: DrawMethod,
    /// Seed for pseudo-random draws; `None` seeds from system entropy.
    pub seed: Option<u64>,
    /// Number of leading Halton points discarded per dimension.
    pub halton_drop: usize,
    /// Apply a fixed per-dimension permutation to each Halton stream.
    pub shuffle: bool,
}

impl Default for DrawOptions {
    fn default() -> Self {
        Self {
            n_draws: 200,
            method: DrawMethod::Halton,
            seed: None,
            halton_drop: 100,
            shuffle: false,
        }
    }
}

impl DrawOptions {
    /// Override the number of replications.
    pub fn with_draws(mut self, n_draws: usize) -> Self {
        self.n_draws = n_draws;
        self
    }

    /// Switch to seeded pseudo-random draws.
    pub fn pseudo_random(mut self, seed: u64) -> Self {
        self.method = DrawMethod::PseudoRandom;
        self.seed = Some(seed);
        self
    }

    /// Switch back to Halton draws.
    pub fn halton(mut self) -> Self {
        self.method = DrawMethod::Halton;
        self
    }

    /// Enable or disable the deterministic Halton shuffle.
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }
}

/// Simulation draws for heterogeneous tastes, shape `(N, K, R)`.
#[derive(Clone, Debug)]
pub struct SimulationDraws {
    draws: Array3<f64>,
}

impl SimulationDraws {
    /// Wraps an existing `(N, K, R)` draws tensor.
    pub fn new(draws: Array3<f64>) -> Result<Self> {
        if draws.len_of(Axis(2)) == 0 {
            return Err(MixedLogitError::dimension_mismatch("simulation draws", 1, 0));
        }
        if draws.iter().any(|value| value.is_nan()) {
            return Err(MixedLogitError::NumericalError {
                context: "simulation draws",
            });
        }
        Ok(Self { draws })
    }

    /// Generates raw uniform draws on `(0, 1)` following `options`.
    pub fn generate(individuals: usize, dimension: usize, options: &DrawOptions) -> Result<Self> {
        if options.n_draws == 0 {
            return Err(MixedLogitError::invalid_option(
                "n_draws",
                "at least one draw is required",
            ));
        }
        let draws = match options.method {
            DrawMethod::Halton => Self::halton(
                individuals,
                dimension,
                options.n_draws,
                options.halton_drop,
                options.shuffle,
            ),
            DrawMethod::PseudoRandom => {
                let mut rng = match options.seed {
                    Some(seed) => SmallRng::seed_from_u64(seed),
                    None => SmallRng::from_entropy(),
                };
                Self::uniform(individuals, dimension, options.n_draws, &mut rng)
            }
        };
        log::debug!(
            "generated {:?} draws: {} individuals x {} dimensions x {} replications",
            options.method,
            individuals,
            dimension,
            options.n_draws
        );
        Ok(draws)
    }

    /// Halton draws. Dimension `k` uses the `(k + 1)`-th prime as its base and
    /// its `N * R` points are laid out row-major into `(N, R)`.
    pub fn halton(
        individuals: usize,
        dimension: usize,
        draws: usize,
        drop: usize,
        shuffle: bool,
    ) -> Self {
        let length = individuals * draws;
        let mut tensor = Array3::zeros((individuals, dimension, draws));
        for (k, base) in prime_bases(dimension).into_iter().enumerate() {
            let mut sequence = halton_sequence(length, base, drop);
            if shuffle {
                let mut rng = SmallRng::seed_from_u64(base);
                sequence.shuffle(&mut rng);
            }
            for (index, value) in sequence.into_iter().enumerate() {
                tensor[[index / draws, k, index % draws]] = value;
            }
        }
        Self { draws: tensor }
    }

    /// Pseudo-random uniform draws on the open interval `(0, 1)`.
    pub fn uniform(individuals: usize, dimension: usize, draws: usize, rng: &mut SmallRng) -> Self {
        let tensor =
            Array3::from_shape_simple_fn((individuals, dimension, draws), || Open01.sample(rng));
        Self { draws: tensor }
    }

    /// Maps raw uniform draws onto each dimension's distribution kernel.
    pub fn shaped(mut self, distributions: &[MixingDistribution]) -> Result<Self> {
        if distributions.len() != self.dimension() {
            return Err(MixedLogitError::dimension_mismatch(
                "draw dimension",
                distributions.len(),
                self.dimension(),
            ));
        }
        for (k, distribution) in distributions.iter().enumerate() {
            self.draws
                .index_axis_mut(Axis(1), k)
                .mapv_inplace(|u| distribution.kernel(u));
        }
        Ok(self)
    }

    /// Number of individuals `N`.
    pub fn individual_count(&self) -> usize {
        self.draws.len_of(Axis(0))
    }

    /// Dimension of the random coefficients.
    pub fn dimension(&self) -> usize {
        self.draws.len_of(Axis(1))
    }

    /// Number of Monte Carlo replications per individual.
    pub fn draw_count(&self) -> usize {
        self.draws.len_of(Axis(2))
    }

    /// Returns a view of the draws tensor.
    pub fn draws(&self) -> &Array3<f64> {
        &self.draws
    }
}

/// The first `length` points of the Halton sequence in `base`, skipping the first `drop`.
///
/// The point at index zero is always skipped so values stay inside `(0, 1)`.
pub fn halton_sequence(length: usize, base: u64, drop: usize) -> Vec<f64> {
    let start = drop.max(1) as u64;
    (0..length as u64)
        .map(|offset| radical_inverse(start + offset, base))
        .collect()
}

fn radical_inverse(mut index: u64, base: u64) -> f64 {
    let mut value = 0.0;
    let mut factor = 1.0;
    while index > 0 {
        factor /= base as f64;
        value += factor * (index % base) as f64;
        index /= base;
    }
    value
}

/// The first `count` primes, starting at 2.
pub fn prime_bases(count: usize) -> Vec<u64> {
    let mut primes: Vec<u64> = Vec::with_capacity(count);
    let mut candidate = 2u64;
    while primes.len() < count {
        if primes
            .iter()
            .take_while(|p| **p * **p <= candidate)
            .all(|p| candidate % p != 0)
        {
            primes.push(candidate);
        }
        candidate += 1;
    }
    primes
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn prime_bases_are_consecutive_primes() {
        assert_eq!(prime_bases(8), vec![2, 3, 5, 7, 11, 13, 17, 19]);
        assert_eq!(prime_bases(20)[19], 71);
    }

    #[test]
    fn halton_sequence_skips_leading_points() {
        let seq = halton_sequence(3, 2, 100);
        assert_relative_eq!(seq[0], 0.1484375, epsilon = 1e-15);
        assert_relative_eq!(seq[1], 0.6484375, epsilon = 1e-15);
        assert_relative_eq!(halton_sequence(1, 3, 100)[0], 0.411_522_633_744_855_9, epsilon = 1e-15);
        assert_eq!(halton_sequence(4, 2, 0), vec![0.5, 0.25, 0.75, 0.125]);
    }

    #[test]
    fn halton_draws_are_reproducible_and_inside_unit_interval() {
        let first = SimulationDraws::halton(7, 3, 11, 100, false);
        let second = SimulationDraws::halton(7, 3, 11, 100, false);
        assert_eq!(first.draws(), second.draws());
        assert!(first.draws().iter().all(|v| *v > 0.0 && *v < 1.0));
        assert_eq!(first.individual_count(), 7);
        assert_eq!(first.dimension(), 3);
        assert_eq!(first.draw_count(), 11);
        // Individual 1 continues the stream where individual 0 stopped.
        let stream = halton_sequence(22, 3, 100);
        assert_eq!(first.draws()[[1, 1, 0]], stream[11]);
    }

    #[test]
    fn shuffled_halton_is_a_deterministic_permutation() {
        let plain = SimulationDraws::halton(4, 2, 5, 100, false);
        let shuffled = SimulationDraws::halton(4, 2, 5, 100, true);
        assert_eq!(
            shuffled.draws(),
            SimulationDraws::halton(4, 2, 5, 100, true).draws()
        );
        let options = DrawOptions::default()
            .pseudo_random(3)
            .halton()
            .with_draws(5)
            .with_shuffle(true);
        assert_eq!(
            SimulationDraws::generate(4, 2, &options).unwrap().draws(),
            shuffled.draws()
        );
        for k in 0..2 {
            let mut a: Vec<f64> = plain.draws().index_axis(Axis(1), k).iter().copied().collect();
            let mut b: Vec<f64> = shuffled.draws().index_axis(Axis(1), k).iter().copied().collect();
            a.sort_by(|x, y| x.total_cmp(y));
            b.sort_by(|x, y| x.total_cmp(y));
            assert_eq!(a, b);
        }
    }

    #[test]
    fn pseudo_random_draws_respect_seed() {
        let options = DrawOptions::default().with_draws(16).pseudo_random(42);
        let a = SimulationDraws::generate(5, 2, &options).unwrap();
        let b = SimulationDraws::generate(5, 2, &options).unwrap();
        assert_eq!(a.draws(), b.draws());
        assert!(a.draws().iter().all(|v| *v > 0.0 && *v < 1.0));
        let c = SimulationDraws::generate(5, 2, &DrawOptions::default().with_draws(16).pseudo_random(7))
            .unwrap();
        assert_ne!(a.draws(), c.draws());
    }

    #[test]
    fn shaping_applies_kernels_per_dimension() {
        let raw = SimulationDraws::halton(3, 2, 5, 100, false);
        let shaped = raw
            .clone()
            .shaped(&[MixingDistribution::Normal, MixingDistribution::Uniform])
            .unwrap();
        for ((n, k, r), value) in shaped.draws().indexed_iter() {
            let u = raw.draws()[[n, k, r]];
            if k == 0 {
                assert_relative_eq!(*value, MixingDistribution::Normal.kernel(u));
            } else {
                assert_relative_eq!(*value, 2.0 * u - 1.0);
            }
        }
        assert!(raw.shaped(&[MixingDistribution::Normal]).is_err());
    }

    #[test]
    fn zero_draws_are_rejected() {
        let options = DrawOptions::default().with_draws(0);
        assert!(matches!(
            SimulationDraws::generate(3, 1, &options),
            Err(MixedLogitError::InvalidOption { .. })
        ));
    }
}

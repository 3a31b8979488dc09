//! Configuration structures for fitting and prediction.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::integration::DrawOptions;
use crate::solving::LbfgsOptions;

/// Array backend used to evaluate per-individual likelihood terms.
///
/// The backend is chosen once, when a [`LikelihoodEngine`](crate::likelihood::LikelihoodEngine)
/// is constructed. Both backends reduce individual terms in the same order and
/// return identical values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
    /// Evaluate individuals sequentially on the calling thread.
    #[default]
    Serial,
    /// Evaluate individuals on the rayon thread pool.
    Parallel,
}

/// Controls estimation: draws, optimizer, regularization, and backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FitOptions {
    /// Simulation draw configuration.
    pub draws: DrawOptions,
    /// Configuration of the L-BFGS minimiser.
    pub optimizer: LbfgsOptions,
    /// L2 penalty `lambda * ||beta||^2` added to the negative log-likelihood.
    pub regularization: f64,
    /// Starting coefficients; defaults to `0.1` for every coefficient.
    pub initial_coefficients: Option<DVector<f64>>,
    /// Array backend.
    pub backend: Backend,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            draws: DrawOptions::default(),
            optimizer: LbfgsOptions::default(),
            regularization: 0.0,
            initial_coefficients: None,
            backend: Backend::Serial,
        }
    }
}

impl FitOptions {
    /// Override the draw settings while preserving other defaults.
    pub fn with_draws(mut self, draws: DrawOptions) -> Self {
        self.draws = draws;
        self
    }

    /// Set the number of replications per individual.
    pub fn with_n_draws(mut self, n_draws: usize) -> Self {
        self.draws.n_draws = n_draws;
        self
    }

    /// Override the optimizer settings.
    pub fn with_optimizer(mut self, optimizer: LbfgsOptions) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Set the maximum number of optimizer iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.optimizer.max_iterations = max_iterations;
        self
    }

    /// Set the L2 regularization strength.
    pub fn with_regularization(mut self, lambda: f64) -> Self {
        self.regularization = lambda;
        self
    }

    /// Start the optimizer from explicit coefficients.
    pub fn with_initial_coefficients(mut self, coefficients: DVector<f64>) -> Self {
        self.initial_coefficients = Some(coefficients);
        self
    }

    /// Select the array backend.
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }
}

/// Controls prediction: draws and backend.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PredictOptions {
    /// Simulation draw configuration.
    pub draws: DrawOptions,
    /// Array backend.
    pub backend: Backend,
}

impl PredictOptions {
    /// Set the number of replications per individual.
    pub fn with_n_draws(mut self, n_draws: usize) -> Self {
        self.draws.n_draws = n_draws;
        self
    }

    /// Override the draw settings.
    pub fn with_draws(mut self, draws: DrawOptions) -> Self {
        self.draws = draws;
        self
    }

    /// Select the array backend.
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }
}

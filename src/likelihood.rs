//! Simulated log-likelihood of the mixed logit model and its analytic gradient.
//!
//! For individual `n` and draw `r`, the panel likelihood is the product over
//! observed periods of the chosen alternative's logit probability. Averaging
//! over draws gives the simulated likelihood `Lbar[n]`; the objective is
//! `-sum_n w_n log(max(Lbar[n], eps)) + lambda * ||beta||^2`.
//!
//! The gradient follows from `d log P_chosen / dV_j = y_j - P_j`: for each draw
//! the score is `L[n, r] * sum_p sum_j (y - P) x`, scaled by the derivative of
//! the coefficient transform for random coefficients and additionally by the
//! draw for spread parameters, then averaged over draws and divided by
//! `Lbar[n]`.

use nalgebra::{DMatrix, DVector};
use ndarray::{s, Array1, Array2, Array3, Array4, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

use crate::distribution::{transform_coefficients, MixingDistribution, RandomCoefficients};
use crate::error::{MixedLogitError, Result};
use crate::formulation::CoefficientLayout;
use crate::integration::SimulationDraws;
use crate::options::Backend;
use crate::panel::BalancedPanels;
use crate::probability::{logit_probabilities_into, MIN_PROBABILITY};
use crate::solving::Objective;

/// Fixed coefficients, random means, and random spreads of a parameter vector.
#[derive(Clone, Debug)]
pub(crate) struct SplitCoefficients<'a> {
    pub fixed: &'a [f64],
    pub means: &'a [f64],
    pub spreads: &'a [f64],
}

/// Splits `betas` following `[fixed..., means..., spreads...]`.
pub(crate) fn split_coefficients<'a>(
    betas: &'a DVector<f64>,
    fixed: usize,
    random: usize,
) -> Result<SplitCoefficients<'a>> {
    let expected = fixed + 2 * random;
    if betas.len() != expected {
        return Err(MixedLogitError::dimension_mismatch(
            "coefficient vector",
            expected,
            betas.len(),
        ));
    }
    let values = betas.as_slice();
    Ok(SplitCoefficients {
        fixed: &values[..fixed],
        means: &values[fixed..fixed + random],
        spreads: &values[fixed + random..],
    })
}

/// Fills `coefficients` (length `K`) for one individual and draw.
#[inline]
pub(crate) fn assemble_coefficients(
    coefficients: &mut Array1<f64>,
    fixed_columns: &[usize],
    fixed_values: &[f64],
    random_columns: &[usize],
    random_values: ArrayView1<'_, f64>,
) {
    for (&col, &value) in fixed_columns.iter().zip(fixed_values) {
        coefficients[col] = value;
    }
    for (&col, &value) in random_columns.iter().zip(random_values.iter()) {
        coefficients[col] = value;
    }
}

/// Utilities `V_j = sum_k x[j, k] * beta_k` for one period.
#[inline]
pub(crate) fn utilities(x: ArrayView2<'_, f64>, coefficients: &Array1<f64>) -> Array1<f64> {
    x.dot(coefficients)
}

/// Full output of one likelihood evaluation.
#[derive(Clone, Debug)]
pub struct LikelihoodEvaluation {
    /// Weighted simulated log-likelihood, without the penalty.
    pub log_likelihood: f64,
    /// Objective handed to the optimizer: `-log_likelihood + penalty`.
    pub objective: f64,
    /// Gradient of the objective.
    pub gradient: DVector<f64>,
    /// Weighted per-individual gradients of the log-likelihood, shape `(N, parameters)`.
    pub scores: DMatrix<f64>,
}

/// Simulated likelihood over balanced panels and fixed draws.
///
/// The engine owns its inputs and never mutates them, so [`evaluate`](Self::evaluate)
/// is a pure function of the coefficient vector.
#[derive(Clone, Debug)]
pub struct LikelihoodEngine {
    x: Array4<f64>,
    y: Array3<f64>,
    panel_info: Array2<f64>,
    draws: Array3<f64>,
    weights: Option<Vec<f64>>,
    fixed: Vec<usize>,
    random: Vec<usize>,
    distributions: Vec<MixingDistribution>,
    regularization: f64,
    backend: Backend,
}

impl LikelihoodEngine {
    /// Validates shapes and assembles the engine.
    ///
    /// `draws` must already be shaped for each random coefficient's distribution.
    pub fn new(
        panels: BalancedPanels,
        draws: SimulationDraws,
        layout: &CoefficientLayout,
        weights: Option<Vec<f64>>,
        regularization: f64,
        backend: Backend,
    ) -> Result<Self> {
        let (individuals, periods, _, attributes) = panels.x.dim();
        if attributes != layout.columns().len() {
            return Err(MixedLogitError::dimension_mismatch(
                "design columns",
                layout.columns().len(),
                attributes,
            ));
        }
        if panels.y.dim() != (individuals, periods, panels.x.len_of(Axis(2))) {
            return Err(MixedLogitError::dimension_mismatch(
                "choice tensor",
                panels.x.len_of(Axis(2)),
                panels.y.len_of(Axis(2)),
            ));
        }
        if panels.panel_info.dim() != (individuals, periods) {
            return Err(MixedLogitError::dimension_mismatch(
                "panel mask",
                individuals * periods,
                panels.panel_info.len(),
            ));
        }
        if draws.individual_count() != individuals {
            return Err(MixedLogitError::dimension_mismatch(
                "draw individuals",
                individuals,
                draws.individual_count(),
            ));
        }
        if draws.dimension() != layout.random().len() {
            return Err(MixedLogitError::dimension_mismatch(
                "draw dimension",
                layout.random().len(),
                draws.dimension(),
            ));
        }
        if let Some(weights) = &weights {
            if weights.len() != individuals {
                return Err(MixedLogitError::dimension_mismatch(
                    "individual weights",
                    individuals,
                    weights.len(),
                ));
            }
        }
        if !(regularization.is_finite() && regularization >= 0.0) {
            return Err(MixedLogitError::invalid_option(
                "regularization",
                "must be non-negative and finite",
            ));
        }

        Ok(Self {
            x: panels.x,
            y: panels.y,
            panel_info: panels.panel_info,
            draws: draws.draws().to_owned(),
            weights,
            fixed: layout.fixed().to_vec(),
            random: layout.random().to_vec(),
            distributions: layout.distributions().to_vec(),
            regularization,
            backend,
        })
    }

    /// Number of individuals `N`.
    pub fn individual_count(&self) -> usize {
        self.panel_info.nrows()
    }

    /// Number of draws `R`.
    pub fn draw_count(&self) -> usize {
        self.draws.len_of(Axis(2))
    }

    /// Length of the coefficient vector.
    pub fn parameter_count(&self) -> usize {
        self.fixed.len() + 2 * self.random.len()
    }

    /// Negative simulated log-likelihood (plus penalty) and its gradient.
    pub fn evaluate(&self, betas: &DVector<f64>) -> Result<(f64, DVector<f64>)> {
        let evaluation = self.evaluate_full(betas)?;
        Ok((evaluation.objective, evaluation.gradient))
    }

    /// Evaluates the objective and keeps per-individual scores.
    pub fn evaluate_full(&self, betas: &DVector<f64>) -> Result<LikelihoodEvaluation> {
        let split = split_coefficients(betas, self.fixed.len(), self.random.len())?;
        let coefficients = transform_coefficients(
            split.means,
            split.spreads,
            &self.distributions,
            self.draws.view(),
        )?;

        let individuals = self.individual_count();
        let terms: Vec<(f64, Array1<f64>)> = match self.backend {
            Backend::Serial => (0..individuals)
                .map(|n| self.individual_term(n, split.fixed, &coefficients))
                .collect(),
            Backend::Parallel => (0..individuals)
                .into_par_iter()
                .map(|n| self.individual_term(n, split.fixed, &coefficients))
                .collect(),
        };

        let parameters = self.parameter_count();
        let mut log_likelihood = 0.0;
        let mut scores = DMatrix::zeros(individuals, parameters);
        for (n, (log_lik, score)) in terms.into_iter().enumerate() {
            let weight = self.weights.as_ref().map_or(1.0, |w| w[n]);
            log_likelihood += weight * log_lik;
            for (i, value) in score.iter().enumerate() {
                scores[(n, i)] = weight * value;
            }
        }

        let penalty = self.regularization * betas.norm_squared();
        let objective = -log_likelihood + penalty;
        let gradient = -scores.row_sum().transpose() + betas * (2.0 * self.regularization);

        Ok(LikelihoodEvaluation {
            log_likelihood,
            objective,
            gradient,
            scores,
        })
    }

    /// `log Lbar[n]` and the gradient of it for one individual.
    fn individual_term(
        &self,
        n: usize,
        fixed_values: &[f64],
        coefficients: &RandomCoefficients,
    ) -> (f64, Array1<f64>) {
        let (_, periods, alternatives, attributes) = self.x.dim();
        let draws = self.draw_count();
        let kf = self.fixed.len();
        let kr = self.random.len();

        let mut beta = Array1::zeros(attributes);
        let mut probabilities = Array1::zeros(alternatives);
        let mut residual_x = Array1::zeros(attributes);
        let mut score = Array1::zeros(kf + 2 * kr);
        let mut likelihood_sum = 0.0;

        for r in 0..draws {
            assemble_coefficients(
                &mut beta,
                &self.fixed,
                fixed_values,
                &self.random,
                coefficients.values.slice(s![n, .., r]),
            );
            residual_x.fill(0.0);
            let mut chosen = 1.0;
            for p in 0..periods {
                // Padded periods contribute a factor of one.
                if self.panel_info[[n, p]] == 0.0 {
                    continue;
                }
                let x = self.x.slice(s![n, p, .., ..]);
                let y = self.y.slice(s![n, p, ..]);
                let v = utilities(x, &beta);
                logit_probabilities_into(v.view(), probabilities.view_mut());
                chosen *= y.dot(&probabilities);
                let residual = &y - &probabilities;
                residual_x += &x.t().dot(&residual);
            }

            let likelihood = chosen.max(MIN_PROBABILITY);
            likelihood_sum += likelihood;
            for (i, &col) in self.fixed.iter().enumerate() {
                score[i] += residual_x[col] * likelihood;
            }
            for (i, &col) in self.random.iter().enumerate() {
                let mean_term = residual_x[col] * coefficients.derivatives[[n, i, r]] * likelihood;
                score[kf + i] += mean_term;
                score[kf + kr + i] += mean_term * self.draws[[n, i, r]];
            }
        }

        let simulated = (likelihood_sum / draws as f64).max(MIN_PROBABILITY);
        let scale = draws as f64 * simulated;
        score.mapv_inplace(|g| g / scale);
        (simulated.ln(), score)
    }
}

impl Objective for LikelihoodEngine {
    fn evaluate(&self, parameters: &DVector<f64>) -> Result<(f64, DVector<f64>)> {
        LikelihoodEngine::evaluate(self, parameters)
    }
}

//! High-level fit and predict entry points for the mixed logit model.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::data::ChoiceData;
use crate::distribution::normal_cdf;
use crate::error::{MixedLogitError, Result};
use crate::formulation::ModelSpecification;
use crate::integration::SimulationDraws;
use crate::likelihood::LikelihoodEngine;
use crate::options::{FitOptions, PredictOptions};
use crate::panel::{balance_panels, BalancedPanels};
use crate::prediction::{predict, Prediction};
use crate::solving::minimize;

/// Default starting value of every coefficient.
pub const DEFAULT_INITIAL_COEFFICIENT: f64 = 0.1;

/// Mixed logit model estimated by maximum simulated likelihood.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MixedLogit {
    specification: ModelSpecification,
}

impl MixedLogit {
    /// Wraps a validated specification.
    pub fn new(specification: ModelSpecification) -> Self {
        Self { specification }
    }

    /// Accessor for the model specification.
    pub fn specification(&self) -> &ModelSpecification {
        &self.specification
    }

    /// Estimates the coefficients on `data`, which must carry choices.
    pub fn fit(&self, data: &ChoiceData, options: &FitOptions) -> Result<FitResult> {
        if !(options.regularization.is_finite() && options.regularization >= 0.0) {
            return Err(MixedLogitError::invalid_option(
                "regularization",
                "must be non-negative and finite",
            ));
        }
        let y = data.choice_matrix()?;
        let weights = data.individual_weights()?;
        let (design, layout) = self.specification.design(data)?;

        let initial = match &options.initial_coefficients {
            Some(coefficients) => {
                layout.check_length(coefficients.len())?;
                coefficients.clone()
            }
            None => DVector::from_element(layout.parameter_count(), DEFAULT_INITIAL_COEFFICIENT),
        };

        let panels = match data.panels() {
            Some(ids) => balance_panels(design.view(), y.view(), ids)?,
            None => BalancedPanels::cross_section(design.view(), y.view())?,
        };
        let individuals = panels.individual_count();
        log::debug!(
            "fitting {} individuals, up to {} periods, {} alternatives, {} draws, {} parameters",
            individuals,
            panels.period_count(),
            data.alternative_count(),
            options.draws.n_draws,
            layout.parameter_count()
        );

        let draws = SimulationDraws::generate(individuals, layout.random().len(), &options.draws)?
            .shaped(layout.distributions())?;
        let engine = LikelihoodEngine::new(
            panels,
            draws,
            &layout,
            weights,
            options.regularization,
            options.backend,
        )?;

        let summary = minimize(&engine, initial, &options.optimizer)?;
        if !summary.converged {
            log::warn!(
                "optimizer stopped after {} iterations without converging",
                summary.iterations
            );
        }

        let evaluation = engine.evaluate_full(&summary.parameters)?;
        let std_errors = bhhh_standard_errors(&evaluation.scores)?;
        let (z_values, p_values) = wald_statistics(&summary.parameters, &std_errors);

        log::info!(
            "fit finished after {} iterations: log-likelihood {:.6}, converged {}",
            summary.iterations,
            evaluation.log_likelihood,
            summary.converged
        );

        Ok(FitResult {
            coefficients: summary.parameters,
            names: layout.names().to_vec(),
            std_errors,
            z_values,
            p_values,
            log_likelihood: evaluation.log_likelihood,
            converged: summary.converged,
            iterations: summary.iterations,
            gradient_norm: summary.gradient.norm(),
            individuals,
            situations: data.situation_count(),
            draws: engine.draw_count(),
        })
    }

    /// Predicts choices on `data` from explicit coefficients.
    pub fn predict(
        &self,
        data: &ChoiceData,
        coefficients: &DVector<f64>,
        options: &PredictOptions,
    ) -> Result<Prediction> {
        predict(data, &self.specification, coefficients, options)
    }

    /// Predicts choices from a fit result after checking its coefficient names.
    pub fn predict_fitted(
        &self,
        data: &ChoiceData,
        fit: &FitResult,
        options: &PredictOptions,
    ) -> Result<Prediction> {
        let layout = self.specification.layout(data.alternatives())?;
        layout.check_names(&fit.names)?;
        self.predict(data, &fit.coefficients, options)
    }
}

/// Estimated coefficients and diagnostics of a fit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FitResult {
    /// Estimated coefficients: fixed, random means, random spreads.
    pub coefficients: DVector<f64>,
    /// Coefficient names aligned with `coefficients`.
    pub names: Vec<String>,
    /// BHHH standard errors.
    pub std_errors: DVector<f64>,
    /// Wald z statistics; `None` where the standard error is zero.
    pub z_values: Vec<Option<f64>>,
    /// Two-sided normal p-values; `None` where the z statistic is.
    pub p_values: Vec<Option<f64>>,
    /// Simulated log-likelihood at the estimate, without the penalty.
    pub log_likelihood: f64,
    pub converged: bool,
    pub iterations: usize,
    /// Euclidean norm of the objective gradient at termination.
    pub gradient_norm: f64,
    /// Number of individuals (panels, or situations without panels).
    pub individuals: usize,
    /// Number of choice situations.
    pub situations: usize,
    /// Replications per individual.
    pub draws: usize,
}

impl FitResult {
    /// Coefficient by name.
    pub fn coefficient(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.coefficients[i])
    }
}

/// z statistics and two-sided p-values for each coefficient.
fn wald_statistics(
    coefficients: &DVector<f64>,
    std_errors: &DVector<f64>,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    coefficients
        .iter()
        .zip(std_errors.iter())
        .map(|(beta, se)| {
            let z = Some(beta / se).filter(|z| *se > 0.0 && z.is_finite());
            (z, z.map(|z| 2.0 * normal_cdf(-z.abs())))
        })
        .unzip()
}

/// Standard errors from the pseudo-inverse of the outer product of scores.
fn bhhh_standard_errors(scores: &DMatrix<f64>) -> Result<DVector<f64>> {
    let information = scores.transpose() * scores;
    let dimension = information.nrows();
    let tolerance = f64::EPSILON * dimension.max(1) as f64 * information.amax();
    let svd = information.svd(true, true);
    if svd.rank(tolerance) < dimension {
        log::warn!("BHHH information matrix is singular; using its pseudo-inverse");
    }
    let covariance = svd
        .pseudo_inverse(tolerance)
        .map_err(|_| MixedLogitError::singular("BHHH information matrix"))?;
    Ok(covariance.diagonal().map(|v| v.max(0.0).sqrt()))
}

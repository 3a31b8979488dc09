//! Choice prediction with the same simulation machinery used for fitting.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use ndarray::{s, Array1, Array2, Array3, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::ChoiceData;
use crate::distribution::{transform_coefficients, RandomCoefficients};
use crate::error::{MixedLogitError, Result};
use crate::formulation::{CoefficientLayout, ModelSpecification};
use crate::integration::SimulationDraws;
use crate::likelihood::{assemble_coefficients, split_coefficients, utilities};
use crate::options::{Backend, PredictOptions};
use crate::panel::{balance_panels, BalancedPanels};
use crate::probability::logit_probabilities_into;

/// Predicted choices for every choice situation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Prediction {
    /// Alternative with the highest simulated probability, per situation.
    pub choices: Vec<String>,
    /// Simulated choice probabilities, shape `(situations, alternatives)`.
    pub probabilities: DMatrix<f64>,
    /// Share of situations predicted for each alternative, rounded to three decimals.
    pub frequencies: BTreeMap<String, f64>,
}

/// Draw-averaged probabilities `(N, P, J)`; padded periods stay zero.
pub fn simulate_probabilities(
    panels: &BalancedPanels,
    draws: &SimulationDraws,
    layout: &CoefficientLayout,
    betas: &DVector<f64>,
    backend: Backend,
) -> Result<Array3<f64>> {
    let (individuals, periods, alternatives, attributes) = panels.x.dim();
    if attributes != layout.columns().len() {
        return Err(MixedLogitError::dimension_mismatch(
            "design columns",
            layout.columns().len(),
            attributes,
        ));
    }
    if draws.individual_count() != individuals {
        return Err(MixedLogitError::dimension_mismatch(
            "draw individuals",
            individuals,
            draws.individual_count(),
        ));
    }
    let split = split_coefficients(betas, layout.fixed().len(), layout.random().len())?;
    let coefficients = transform_coefficients(
        split.means,
        split.spreads,
        layout.distributions(),
        draws.draws().view(),
    )?;

    let individual = |n: usize| individual_probabilities(panels, layout, split.fixed, &coefficients, n);
    let rows: Vec<Array2<f64>> = match backend {
        Backend::Serial => (0..individuals).map(individual).collect(),
        Backend::Parallel => (0..individuals).into_par_iter().map(individual).collect(),
    };

    let mut probabilities = Array3::zeros((individuals, periods, alternatives));
    for (n, row) in rows.into_iter().enumerate() {
        probabilities.index_axis_mut(Axis(0), n).assign(&row);
    }
    Ok(probabilities)
}

fn individual_probabilities(
    panels: &BalancedPanels,
    layout: &CoefficientLayout,
    fixed_values: &[f64],
    coefficients: &RandomCoefficients,
    n: usize,
) -> Array2<f64> {
    let (_, periods, alternatives, attributes) = panels.x.dim();
    let draws = coefficients.values.len_of(Axis(2));
    let mut beta = Array1::zeros(attributes);
    let mut probabilities = Array1::zeros(alternatives);
    let mut average = Array2::zeros((periods, alternatives));

    for r in 0..draws {
        assemble_coefficients(
            &mut beta,
            layout.fixed(),
            fixed_values,
            layout.random(),
            coefficients.values.slice(s![n, .., r]),
        );
        for p in 0..periods {
            if panels.panel_info[[n, p]] == 0.0 {
                continue;
            }
            let v = utilities(panels.x.slice(s![n, p, .., ..]), &beta);
            logit_probabilities_into(v.view(), probabilities.view_mut());
            let mut row = average.row_mut(p);
            row.scaled_add(1.0 / draws as f64, &probabilities);
        }
    }
    average
}

/// Predicts choices for `data` from coefficients ordered as the specification's layout.
pub fn predict(
    data: &ChoiceData,
    specification: &ModelSpecification,
    betas: &DVector<f64>,
    options: &PredictOptions,
) -> Result<Prediction> {
    let (design, layout) = specification.design(data)?;
    layout.check_length(betas.len())?;

    let placeholder = Array2::zeros((data.situation_count(), data.alternative_count()));
    let panels = match data.panels() {
        Some(ids) => balance_panels(design.view(), placeholder.view(), ids)?,
        None => BalancedPanels::cross_section(design.view(), placeholder.view())?,
    };
    let draws = SimulationDraws::generate(
        panels.individual_count(),
        layout.random().len(),
        &options.draws,
    )?
    .shaped(layout.distributions())?;

    let simulated = simulate_probabilities(&panels, &draws, &layout, betas, options.backend)?;

    let alternatives = data.alternatives();
    let mut probabilities = DMatrix::zeros(data.situation_count(), alternatives.len());
    let mut choices = Vec::with_capacity(data.situation_count());
    let mut situation = 0usize;
    for n in 0..panels.individual_count() {
        for p in 0..panels.period_count() {
            if panels.panel_info[[n, p]] == 0.0 {
                continue;
            }
            let mut best = 0usize;
            for (j, value) in simulated.slice(s![n, p, ..]).iter().enumerate() {
                probabilities[(situation, j)] = *value;
                if *value > probabilities[(situation, best)] {
                    best = j;
                }
            }
            choices.push(alternatives[best].clone());
            situation += 1;
        }
    }

    let frequencies = choice_frequencies(&choices);
    log::debug!(
        "predicted {} choice situations over {} alternatives",
        choices.len(),
        alternatives.len()
    );
    Ok(Prediction {
        choices,
        probabilities,
        frequencies,
    })
}

/// Share of each predicted label, rounded to three decimals.
pub fn choice_frequencies(choices: &[String]) -> BTreeMap<String, f64> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for choice in choices {
        *counts.entry(choice.clone()).or_default() += 1;
    }
    let total = choices.len() as f64;
    counts
        .into_iter()
        .map(|(label, count)| (label, (count as f64 / total * 1000.0).round() / 1000.0))
        .collect()
}

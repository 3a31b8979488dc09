//! Numerically stabilised multinomial logit probabilities.

use ndarray::{Array4, ArrayView1, ArrayView4, ArrayViewMut1, Axis, Zip};

/// Utilities above this bound are clamped before exponentiation.
pub const MAX_EXP_UTILITY: f64 = 700.0;

/// Smallest probability or likelihood value allowed into a logarithm.
pub const MIN_PROBABILITY: f64 = 1e-300;

/// Logit probabilities over one choice set, written into `out`.
///
/// Utilities are clamped at [`MAX_EXP_UTILITY`] and shifted by their maximum,
/// so the denominator is at least one and the result sums to one for any
/// finite input.
pub fn logit_probabilities_into(utilities: ArrayView1<'_, f64>, mut out: ArrayViewMut1<'_, f64>) {
    let ceiling = utilities
        .iter()
        .fold(f64::NEG_INFINITY, |acc, &v| acc.max(v.min(MAX_EXP_UTILITY)));
    if !ceiling.is_finite() {
        let uniform = 1.0 / utilities.len() as f64;
        out.fill(uniform);
        return;
    }

    let mut denominator = 0.0;
    Zip::from(&mut out).and(&utilities).for_each(|p, &v| {
        *p = (v.min(MAX_EXP_UTILITY) - ceiling).exp();
        denominator += *p;
    });
    out.mapv_inplace(|p| p / denominator);
}

/// Choice probabilities for a utility tensor `(N, P, J, R)`, normalised over `J`.
pub fn choice_probabilities(utilities: ArrayView4<'_, f64>) -> Array4<f64> {
    let mut probabilities = Array4::zeros(utilities.raw_dim());
    Zip::from(probabilities.lanes_mut(Axis(2)))
        .and(utilities.lanes(Axis(2)))
        .for_each(|out, v| logit_probabilities_into(v, out));
    probabilities
}

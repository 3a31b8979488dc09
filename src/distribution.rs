//! Mixing distributions for random coefficients.
//!
//! Each random coefficient follows one [`MixingDistribution`]. The distribution
//! is resolved once per fit and then applied across the whole draws tensor:
//! [`MixingDistribution::kernel`] maps a uniform draw on `(0, 1)` onto the
//! distribution's kernel (standard normal, symmetric triangular, or uniform on
//! `(-1, 1)`), and [`transform_coefficients`] turns `(mean, spread)` pairs plus
//! kernel draws into realised coefficients together with their derivative.

use std::f64::consts::SQRT_2;
use std::fmt;
use std::str::FromStr;

use ndarray::{Array3, ArrayView3, Axis, Zip};
use serde::{Deserialize, Serialize};
use statrs::function::erf::{erfc, erfc_inv};

use crate::error::{MixedLogitError, Result};

/// Population distribution of a random coefficient.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MixingDistribution {
    /// `mean + spread * z`, `z ~ N(0, 1)`.
    Normal,
    /// `exp(mean + spread * z)`, `z ~ N(0, 1)`.
    LogNormal,
    /// `mean + spread * u`, `u ~ U(-1, 1)`.
    Uniform,
    /// `mean + spread * t`, `t` symmetric triangular on `(-1, 1)`.
    Triangular,
    /// `max(mean + spread * z, 0)`, `z ~ N(0, 1)`.
    TruncatedNormal,
}

impl MixingDistribution {
    /// Short code used in random-variable specifications.
    pub fn code(self) -> &'static str {
        match self {
            Self::Normal => "n",
            Self::LogNormal => "ln",
            Self::Uniform => "u",
            Self::Triangular => "t",
            Self::TruncatedNormal => "tn",
        }
    }

    /// Maps a uniform draw on `(0, 1)` onto the kernel this distribution scales.
    pub fn kernel(self, uniform: f64) -> f64 {
        match self {
            Self::Normal | Self::LogNormal | Self::TruncatedNormal => inverse_normal_cdf(uniform),
            Self::Uniform => 2.0 * uniform - 1.0,
            Self::Triangular => {
                if uniform <= 0.5 {
                    (2.0 * uniform).sqrt() - 1.0
                } else {
                    1.0 - (2.0 * (1.0 - uniform)).sqrt()
                }
            }
        }
    }

    /// Realised coefficient for one kernel draw, and its derivative with respect to the mean.
    ///
    /// The derivative with respect to the spread is the returned derivative times `draw`.
    #[inline]
    pub fn transform(self, mean: f64, spread: f64, draw: f64) -> (f64, f64) {
        let linear = mean + spread * draw;
        match self {
            Self::LogNormal => {
                let value = linear.exp();
                (value, value)
            }
            Self::TruncatedNormal => {
                if linear > 0.0 {
                    (linear, 1.0)
                } else {
                    (0.0, 0.0)
                }
            }
            Self::Normal | Self::Uniform | Self::Triangular => (linear, 1.0),
        }
    }
}

impl FromStr for MixingDistribution {
    type Err = MixedLogitError;

    /// Accepts the short codes (`n`, `ln`, `u`, `t`, `tn`) and their long names.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "n" | "normal" => Ok(Self::Normal),
            "ln" | "lognormal" => Ok(Self::LogNormal),
            "u" | "uniform" => Ok(Self::Uniform),
            "t" | "triangular" => Ok(Self::Triangular),
            "tn" | "truncated_normal" => Ok(Self::TruncatedNormal),
            _ => Err(MixedLogitError::UnsupportedDistribution {
                code: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for MixingDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Inverse of the standard normal CDF.
#[inline]
pub fn inverse_normal_cdf(p: f64) -> f64 {
    -SQRT_2 * erfc_inv(2.0 * p)
}

/// Standard normal CDF.
#[inline]
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / SQRT_2)
}

/// Realised random coefficients for every individual and draw.
#[derive(Clone, Debug)]
pub struct RandomCoefficients {
    /// Coefficient realisations, shape `(N, Kr, R)`.
    pub values: Array3<f64>,
    /// Derivative of each realisation with respect to its mean, shape `(N, Kr, R)`.
    pub derivatives: Array3<f64>,
}

/// Realises random coefficients from `(mean, spread)` pairs and kernel draws `(N, Kr, R)`.
pub fn transform_coefficients(
    means: &[f64],
    spreads: &[f64],
    distributions: &[MixingDistribution],
    draws: ArrayView3<'_, f64>,
) -> Result<RandomCoefficients> {
    let kr = distributions.len();
    if means.len() != kr {
        return Err(MixedLogitError::dimension_mismatch(
            "random coefficient means",
            kr,
            means.len(),
        ));
    }
    if spreads.len() != kr {
        return Err(MixedLogitError::dimension_mismatch(
            "random coefficient spreads",
            kr,
            spreads.len(),
        ));
    }
    if draws.len_of(Axis(1)) != kr {
        return Err(MixedLogitError::dimension_mismatch(
            "draw dimension",
            kr,
            draws.len_of(Axis(1)),
        ));
    }

    let mut values = Array3::zeros(draws.raw_dim());
    let mut derivatives = Array3::zeros(draws.raw_dim());
    for (k, distribution) in distributions.iter().enumerate() {
        let (mean, spread) = (means[k], spreads[k]);
        Zip::from(values.index_axis_mut(Axis(1), k))
            .and(derivatives.index_axis_mut(Axis(1), k))
            .and(draws.index_axis(Axis(1), k))
            .for_each(|value, derivative, &draw| {
                let (v, d) = distribution.transform(mean, spread, draw);
                *value = v;
                *derivative = d;
            });
    }

    Ok(RandomCoefficients {
        values,
        derivatives,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    fn sample_draws() -> Array3<f64> {
        Array3::from_shape_fn((3, 2, 4), |(n, k, r)| {
            -1.5 + 0.37 * n as f64 + 0.81 * k as f64 + 0.29 * r as f64
        })
    }

    #[test]
    fn parses_codes_and_names() {
        assert_eq!("n".parse::<MixingDistribution>().unwrap(), MixingDistribution::Normal);
        assert_eq!("ln".parse::<MixingDistribution>().unwrap(), MixingDistribution::LogNormal);
        assert_eq!(
            "triangular".parse::<MixingDistribution>().unwrap(),
            MixingDistribution::Triangular
        );
        assert_eq!(
            "tn".parse::<MixingDistribution>().unwrap(),
            MixingDistribution::TruncatedNormal
        );
        let err = "fake".parse::<MixingDistribution>().unwrap_err();
        assert!(matches!(err, MixedLogitError::UnsupportedDistribution { code } if code == "fake"));
    }

    #[test]
    fn normal_transform_is_mean_plus_spread_times_draw() {
        let draws = sample_draws();
        let means = [0.1, -0.4];
        let spreads = [0.3, 1.7];
        let dists = [MixingDistribution::Normal; 2];
        let out = transform_coefficients(&means, &spreads, &dists, draws.view()).unwrap();
        for ((n, k, r), value) in out.values.indexed_iter() {
            assert_eq!(*value, means[k] + spreads[k] * draws[[n, k, r]]);
            assert_eq!(out.derivatives[[n, k, r]], 1.0);
        }
    }

    #[test]
    fn lognormal_derivative_equals_value() {
        let draws = sample_draws();
        let dists = [MixingDistribution::LogNormal, MixingDistribution::TruncatedNormal];
        let out = transform_coefficients(&[0.2, 0.0], &[0.5, 1.0], &dists, draws.view()).unwrap();
        for ((n, k, r), value) in out.values.indexed_iter() {
            if k == 0 {
                assert_relative_eq!(*value, (0.2 + 0.5 * draws[[n, 0, r]]).exp());
                assert_eq!(out.derivatives[[n, k, r]], *value);
            } else {
                assert!(*value >= 0.0);
                let expected = if draws[[n, 1, r]] > 0.0 { 1.0 } else { 0.0 };
                assert_eq!(out.derivatives[[n, k, r]], expected);
            }
        }
    }

    #[test]
    fn kernels_map_into_expected_supports() {
        for i in 1..100 {
            let u = i as f64 / 100.0;
            let t = MixingDistribution::Triangular.kernel(u);
            let w = MixingDistribution::Uniform.kernel(u);
            assert!(t > -1.0 && t < 1.0);
            assert!(w > -1.0 && w < 1.0);
        }
        assert_relative_eq!(MixingDistribution::Triangular.kernel(0.5), 0.0, epsilon = 1e-12);
        assert_relative_eq!(MixingDistribution::Normal.kernel(0.5), 0.0, epsilon = 1e-12);
        assert_relative_eq!(
            MixingDistribution::Normal.kernel(0.975),
            1.959_963_984_540_054,
            epsilon = 1e-9
        );
        assert_relative_eq!(normal_cdf(1.959_963_984_540_054), 0.975, epsilon = 1e-9);
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let draws = sample_draws();
        let err = transform_coefficients(&[0.1], &[0.1, 0.2], &[MixingDistribution::Normal; 2], draws.view());
        assert!(matches!(err, Err(MixedLogitError::DimensionMismatch { .. })));
    }
}

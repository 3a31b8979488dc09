//! Balancing of ragged panels into a rectangular tensor with a validity mask.
//!
//! Choice situations arrive as an `(S, J, K)` tensor. Grouping them by panel
//! yields individuals with different numbers of periods; balancing pads every
//! individual to the longest panel `P` with zero rows and records which
//! periods are real in an `(N, P)` mask.

use std::collections::HashSet;

use ndarray::{s, Array2, Array3, Array4, ArrayView2, ArrayView3, Axis};

use crate::error::{MixedLogitError, Result};

/// Rectangular panel data ready for simulation.
#[derive(Clone, Debug)]
pub struct BalancedPanels {
    /// Attributes, shape `(N, P, J, K)`; padded periods are zero.
    pub x: Array4<f64>,
    /// One-hot choices, shape `(N, P, J)`; padded periods are zero.
    pub y: Array3<f64>,
    /// Validity mask, shape `(N, P)`; one for observed periods.
    pub panel_info: Array2<f64>,
    /// Panel identifier of each individual, in order of first appearance.
    pub ids: Vec<String>,
}

impl BalancedPanels {
    /// Treats every choice situation as its own individual with a single period.
    pub fn cross_section(x: ArrayView3<'_, f64>, y: ArrayView2<'_, f64>) -> Result<Self> {
        let (situations, alternatives, _) = x.dim();
        check_choice_shape(y, situations, alternatives)?;
        let x = x.to_owned().insert_axis(Axis(1));
        let y = y.to_owned().insert_axis(Axis(1));
        Ok(Self {
            x,
            y,
            panel_info: Array2::ones((situations, 1)),
            ids: (0..situations).map(|i| i.to_string()).collect(),
        })
    }

    /// Number of individuals `N`.
    pub fn individual_count(&self) -> usize {
        self.panel_info.nrows()
    }

    /// Longest panel length `P`.
    pub fn period_count(&self) -> usize {
        self.panel_info.ncols()
    }

    /// Number of observed periods of individual `n`.
    pub fn observed_periods(&self, n: usize) -> usize {
        self.panel_info.row(n).iter().filter(|v| **v > 0.0).count()
    }
}

/// Groups choice situations by panel id and pads them to a common length.
///
/// `panels` carries one id per long-format row (`S * J` entries). Every
/// situation must sit inside a single panel and each panel's situations must
/// be contiguous.
pub fn balance_panels(
    x: ArrayView3<'_, f64>,
    y: ArrayView2<'_, f64>,
    panels: &[String],
) -> Result<BalancedPanels> {
    let (situations, alternatives, attributes) = x.dim();
    check_choice_shape(y, situations, alternatives)?;
    if panels.len() != situations * alternatives {
        return Err(MixedLogitError::dimension_mismatch(
            "panel ids",
            situations * alternatives,
            panels.len(),
        ));
    }
    if alternatives == 0 {
        return Err(MixedLogitError::dimension_mismatch("alternatives", 1, 0));
    }

    // (panel id, first situation, number of situations)
    let mut blocks: Vec<(String, usize, usize)> = Vec::new();
    let mut seen = HashSet::new();
    for situation in 0..situations {
        let rows = &panels[situation * alternatives..(situation + 1) * alternatives];
        let id = &rows[0];
        if rows.iter().any(|row| row != id) {
            return Err(MixedLogitError::InconsistentPanel { index: situation });
        }
        match blocks.last_mut() {
            Some(block) if block.0 == *id => block.2 += 1,
            _ => {
                if !seen.insert(id.clone()) {
                    return Err(MixedLogitError::NonContiguousGroup {
                        kind: "panel",
                        id: id.clone(),
                    });
                }
                blocks.push((id.clone(), situation, 1));
            }
        }
    }

    let individuals = blocks.len();
    let periods = blocks.iter().map(|block| block.2).max().unwrap_or(0);
    let mut x_balanced = Array4::zeros((individuals, periods, alternatives, attributes));
    let mut y_balanced = Array3::zeros((individuals, periods, alternatives));
    let mut panel_info = Array2::zeros((individuals, periods));

    for (n, (_, start, count)) in blocks.iter().enumerate() {
        let range = *start..start + count;
        x_balanced
            .slice_mut(s![n, ..*count, .., ..])
            .assign(&x.slice(s![range.clone(), .., ..]));
        y_balanced
            .slice_mut(s![n, ..*count, ..])
            .assign(&y.slice(s![range, ..]));
        panel_info.slice_mut(s![n, ..*count]).fill(1.0);
    }

    log::debug!(
        "balanced {} choice situations into {} panels of up to {} periods",
        situations,
        individuals,
        periods
    );

    Ok(BalancedPanels {
        x: x_balanced,
        y: y_balanced,
        panel_info,
        ids: blocks.into_iter().map(|block| block.0).collect(),
    })
}

fn check_choice_shape(y: ArrayView2<'_, f64>, situations: usize, alternatives: usize) -> Result<()> {
    if y.nrows() != situations {
        return Err(MixedLogitError::dimension_mismatch(
            "choice rows",
            situations,
            y.nrows(),
        ));
    }
    if y.ncols() != alternatives {
        return Err(MixedLogitError::dimension_mismatch(
            "choice alternatives",
            alternatives,
            y.ncols(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn reference() -> (Array3<f64>, Array2<f64>) {
        let x = Array3::from_shape_vec(
            (3, 2, 2),
            vec![2.0, 1.0, 1.0, 3.0, 3.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 4.0],
        )
        .unwrap();
        let y = array![[0.0, 1.0], [0.0, 1.0], [0.0, 1.0]];
        (x, y)
    }

    #[test]
    fn balances_ragged_panels() {
        let (x, y) = reference();
        let panels = ids(&["1", "1", "1", "1", "2", "2"]);
        let balanced = balance_panels(x.view(), y.view(), &panels).unwrap();

        assert_eq!(balanced.panel_info, array![[1.0, 1.0], [1.0, 0.0]]);
        assert_eq!(balanced.x.dim(), (2, 2, 2, 2));
        assert_eq!(balanced.x.slice(s![1, 0, .., ..]), x.slice(s![2, .., ..]));
        assert!(balanced.x.slice(s![1, 1.., .., ..]).iter().all(|v| *v == 0.0));
        assert!(balanced.y.slice(s![1, 1.., ..]).iter().all(|v| *v == 0.0));
        assert_eq!(balanced.observed_periods(0), 2);
        assert_eq!(balanced.observed_periods(1), 1);
        assert_eq!(balanced.ids, ids(&["1", "2"]));
    }

    #[test]
    fn balanced_input_passes_through() {
        let (x, y) = reference();
        let panels = ids(&["a", "a", "b", "b", "c", "c"]);
        let balanced = balance_panels(x.view(), y.view(), &panels).unwrap();
        assert_eq!(balanced.panel_info, Array2::<f64>::ones((3, 1)));
        assert_eq!(
            balanced.x.index_axis(Axis(1), 0),
            x.view()
        );
    }

    #[test]
    fn rejects_inconsistent_grouping() {
        let (x, y) = reference();
        let split = ids(&["1", "1", "2", "2", "1", "1"]);
        assert!(matches!(
            balance_panels(x.view(), y.view(), &split),
            Err(MixedLogitError::NonContiguousGroup { .. })
        ));

        let straddling = ids(&["1", "1", "2", "3", "3", "3"]);
        assert!(matches!(
            balance_panels(x.view(), y.view(), &straddling),
            Err(MixedLogitError::InconsistentPanel { index: 1 })
        ));

        let short = ids(&["1", "1", "1"]);
        assert!(matches!(
            balance_panels(x.view(), y.view(), &short),
            Err(MixedLogitError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn rejects_empty_choice_sets() {
        let x = Array3::<f64>::zeros((2, 0, 1));
        let y = Array2::<f64>::zeros((2, 0));
        assert!(matches!(
            balance_panels(x.view(), y.view(), &[]),
            Err(MixedLogitError::DimensionMismatch {
                context: "alternatives",
                ..
            })
        ));
    }

    #[test]
    fn cross_section_has_single_period() {
        let (x, y) = reference();
        let balanced = BalancedPanels::cross_section(x.view(), y.view()).unwrap();
        assert_eq!(balanced.x.dim(), (3, 1, 2, 2));
        assert_eq!(balanced.y.dim(), (3, 1, 2));
        assert_eq!(balanced.period_count(), 1);
        assert_eq!(balanced.individual_count(), 3);
    }
}

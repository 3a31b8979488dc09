//! Long-format choice data containers and validation utilities.
//!
//! Every row of the input describes one alternative within one choice
//! situation. [`ChoiceDataBuilder`] checks that rows of a situation are
//! contiguous and list every alternative exactly once, then reorders them into
//! the model's alternative order so the rows can be reshaped into a
//! `(situations, alternatives, columns)` tensor.

use std::collections::{BTreeSet, HashSet};

use nalgebra::{DMatrix, DVector};
use ndarray::Array2;

use crate::error::{MixedLogitError, Result};

/// Validated long-format choice data.
#[derive(Clone, Debug)]
pub struct ChoiceData {
    column_names: Vec<String>,
    x: DMatrix<f64>,
    choices: Option<DVector<f64>>,
    alternatives: Vec<String>,
    situation_ids: Vec<String>,
    panels: Option<Vec<String>>,
    weights: Option<DVector<f64>>,
}

impl ChoiceData {
    /// Number of long-format rows (`situations * alternatives`).
    pub fn row_count(&self) -> usize {
        self.x.nrows()
    }

    /// Number of choice situations.
    pub fn situation_count(&self) -> usize {
        self.situation_ids.len()
    }

    /// Number of alternatives `J` in every choice set.
    pub fn alternative_count(&self) -> usize {
        self.alternatives.len()
    }

    /// Sorted alternative labels; rows of each situation follow this order.
    pub fn alternatives(&self) -> &[String] {
        &self.alternatives
    }

    /// Names of the attribute columns.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Position of a named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|c| c == name)
    }

    /// Attribute matrix after reordering, one row per (situation, alternative).
    pub fn x(&self) -> &DMatrix<f64> {
        &self.x
    }

    /// Chosen indicator per row, when supplied.
    pub fn choices(&self) -> Option<&DVector<f64>> {
        self.choices.as_ref()
    }

    /// Identifier of each choice situation, in input order.
    pub fn situation_ids(&self) -> &[String] {
        &self.situation_ids
    }

    /// Panel identifier per row, when supplied.
    pub fn panels(&self) -> Option<&[String]> {
        self.panels.as_deref()
    }

    /// Observation weight per row, when supplied.
    pub fn weights(&self) -> Option<&DVector<f64>> {
        self.weights.as_ref()
    }

    /// Choices reshaped into a one-hot `(situations, alternatives)` matrix.
    pub fn choice_matrix(&self) -> Result<Array2<f64>> {
        let choices = self
            .choices
            .as_ref()
            .ok_or_else(|| MixedLogitError::missing_component("choices"))?;
        let j = self.alternative_count();
        Ok(Array2::from_shape_fn((self.situation_count(), j), |(s, a)| {
            choices[s * j + a]
        }))
    }

    /// One weight per individual (panel, or situation without panels), normalised to mean one.
    pub fn individual_weights(&self) -> Result<Option<Vec<f64>>> {
        let Some(weights) = self.weights.as_ref() else {
            return Ok(None);
        };
        let j = self.alternative_count();
        let mut grouped: Vec<f64> = Vec::new();
        let mut previous: Option<&str> = None;
        for situation in 0..self.situation_count() {
            let row = situation * j;
            let key = match &self.panels {
                Some(panels) => panels[row].as_str(),
                None => self.situation_ids[situation].as_str(),
            };
            let weight = weights[row];
            for offset in 0..j {
                if weights[row + offset] != weight {
                    return Err(MixedLogitError::InvalidWeight {
                        index: row + offset,
                        weight: weights[row + offset],
                    });
                }
            }
            match (previous, grouped.last()) {
                (Some(prev), Some(&last)) if prev == key => {
                    if last != weight {
                        return Err(MixedLogitError::InvalidWeight { index: row, weight });
                    }
                }
                _ => grouped.push(weight),
            }
            previous = Some(key);
        }

        let mean = grouped.iter().sum::<f64>() / grouped.len() as f64;
        Ok(Some(grouped.into_iter().map(|w| w / mean).collect()))
    }
}

/// Builder that validates dimensions and choice-set structure before constructing [`ChoiceData`].
#[derive(Debug)]
pub struct ChoiceDataBuilder {
    x: DMatrix<f64>,
    column_names: Vec<String>,
    alternatives: Vec<String>,
    ids: Vec<String>,
    choices: Option<DVector<f64>>,
    panels: Option<Vec<String>>,
    weights: Option<DVector<f64>>,
}

impl ChoiceDataBuilder {
    /// Start from the attribute matrix, its column names, and per-row alternative and situation labels.
    pub fn new(
        x: DMatrix<f64>,
        column_names: Vec<String>,
        alternatives: Vec<String>,
        ids: Vec<String>,
    ) -> Self {
        Self {
            x,
            column_names,
            alternatives,
            ids,
            choices: None,
            panels: None,
            weights: None,
        }
    }

    /// Sets the chosen indicator (1 for the chosen row, 0 otherwise).
    pub fn choices(mut self, choices: DVector<f64>) -> Self {
        self.choices = Some(choices);
        self
    }

    /// Groups choice situations into panels (one id per row).
    pub fn panels(mut self, panels: Vec<String>) -> Self {
        self.panels = Some(panels);
        self
    }

    /// Sets observation weights (one per row, constant within an individual).
    pub fn weights(mut self, weights: DVector<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Finalizes construction after validating shapes and choice sets.
    pub fn build(self) -> Result<ChoiceData> {
        let n = self.x.nrows();
        if self.column_names.len() != self.x.ncols() {
            return Err(MixedLogitError::dimension_mismatch(
                "column names",
                self.x.ncols(),
                self.column_names.len(),
            ));
        }
        if self.alternatives.len() != n {
            return Err(MixedLogitError::dimension_mismatch(
                "alternative labels",
                n,
                self.alternatives.len(),
            ));
        }
        if self.ids.len() != n {
            return Err(MixedLogitError::dimension_mismatch("situation ids", n, self.ids.len()));
        }
        if let Some(choices) = &self.choices {
            if choices.len() != n {
                return Err(MixedLogitError::dimension_mismatch("choices", n, choices.len()));
            }
        }
        if let Some(panels) = &self.panels {
            if panels.len() != n {
                return Err(MixedLogitError::dimension_mismatch("panel ids", n, panels.len()));
            }
        }
        if let Some(weights) = &self.weights {
            if weights.len() != n {
                return Err(MixedLogitError::dimension_mismatch("weights", n, weights.len()));
            }
            for (index, weight) in weights.iter().enumerate() {
                if !(weight.is_finite() && *weight > 0.0) {
                    return Err(MixedLogitError::InvalidWeight {
                        index,
                        weight: *weight,
                    });
                }
            }
        }
        let mut seen_names = HashSet::new();
        for name in &self.column_names {
            if !seen_names.insert(name.as_str()) {
                return Err(MixedLogitError::InvalidSpecification {
                    reason: format!("column `{name}` is declared twice"),
                });
            }
        }

        let alternatives: Vec<String> = self
            .alternatives
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let partition = SituationPartition::new(&self.ids, &self.alternatives, &alternatives)?;

        if let Some(choices) = &self.choices {
            for (situation, rows) in partition.order.chunks(alternatives.len()).enumerate() {
                let chosen = rows.iter().filter(|&&row| choices[row] != 0.0).count();
                let binary = rows
                    .iter()
                    .all(|&row| choices[row] == 0.0 || choices[row] == 1.0);
                if chosen != 1 || !binary {
                    return Err(MixedLogitError::InvalidChoice {
                        id: partition.ids[situation].clone(),
                        chosen,
                    });
                }
            }
        }

        let order = &partition.order;
        let x = self.x.select_rows(order.iter());
        let choices = self
            .choices
            .map(|c| DVector::from_iterator(n, order.iter().map(|&row| c[row])));
        let weights = self
            .weights
            .map(|w| DVector::from_iterator(n, order.iter().map(|&row| w[row])));
        let panels = self
            .panels
            .map(|p| order.iter().map(|&row| p[row].clone()).collect());

        Ok(ChoiceData {
            column_names: self.column_names,
            x,
            choices,
            alternatives,
            situation_ids: partition.ids,
            panels,
            weights,
        })
    }
}

/// Contiguous choice situations and the row order that sorts each by alternative.
struct SituationPartition {
    ids: Vec<String>,
    order: Vec<usize>,
}

impl SituationPartition {
    fn new(ids: &[String], labels: &[String], alternatives: &[String]) -> Result<Self> {
        let blocks = contiguous_blocks(ids)?;
        let j = alternatives.len();
        let mut situations = Vec::with_capacity(blocks.len());
        let mut order = Vec::with_capacity(ids.len());

        for (start, end) in blocks {
            let id = &ids[start];
            let incomplete = || MixedLogitError::IncompleteChoiceSet {
                id: id.clone(),
                expected: j,
                found: end - start,
            };
            let mut slots: Vec<Option<usize>> = vec![None; j];
            for row in start..end {
                let position = alternatives
                    .binary_search(&labels[row])
                    .map_err(|_| MixedLogitError::UnknownAlternative {
                        label: labels[row].clone(),
                    })?;
                if slots[position].replace(row).is_some() {
                    return Err(incomplete());
                }
            }
            if end - start != j {
                return Err(incomplete());
            }
            order.extend(slots.into_iter().flatten());
            situations.push(id.clone());
        }

        Ok(Self {
            ids: situations,
            order,
        })
    }
}

/// Maximal runs of equal situation ids as `(start, end)` row ranges.
///
/// Fails when an id reappears after its run has ended.
fn contiguous_blocks(ids: &[String]) -> Result<Vec<(usize, usize)>> {
    let mut blocks = Vec::new();
    let mut seen = HashSet::new();
    let mut start = 0usize;
    while start < ids.len() {
        let id = &ids[start];
        if !seen.insert(id) {
            return Err(MixedLogitError::NonContiguousGroup {
                kind: "choice situation",
                id: id.clone(),
            });
        }
        let mut end = start + 1;
        while end < ids.len() && ids[end] == *id {
            end += 1;
        }
        blocks.push((start, end));
        start = end;
    }
    Ok(blocks)
}

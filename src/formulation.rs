//! Model specifications and the coefficient layout they imply.
//!
//! A [`ModelSpecification`] names the variables entering utility, which of them
//! are random (and with what [`MixingDistribution`]), which are
//! individual-specific, and whether alternative-specific intercepts are fitted.
//! Resolving it against the alternative set yields a [`CoefficientLayout`]:
//! the design columns and the order of the parameter vector
//! `[fixed..., random means..., random spreads...]`.

use std::collections::HashSet;

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::data::ChoiceData;
use crate::distribution::MixingDistribution;
use crate::error::{MixedLogitError, Result};

/// Name given to the intercept when alternative-specific constants are fitted.
pub const INTERCEPT: &str = "_inter";

/// Validated description of the utility function.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelSpecification {
    varnames: Vec<String>,
    isvars: Vec<String>,
    randvars: Vec<(String, MixingDistribution)>,
    fit_intercept: bool,
    base_alternative: Option<String>,
}

impl ModelSpecification {
    /// Starts a specification over the given variable names.
    pub fn builder<I, S>(varnames: I) -> SpecificationBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SpecificationBuilder {
            varnames: varnames.into_iter().map(Into::into).collect(),
            isvars: Vec::new(),
            randvars: Vec::new(),
            fit_intercept: false,
            base_alternative: None,
        }
    }

    /// Declared variable names.
    pub fn varnames(&self) -> &[String] {
        &self.varnames
    }

    /// Random variables and their distributions.
    pub fn random_variables(&self) -> &[(String, MixingDistribution)] {
        &self.randvars
    }

    /// Distribution of a variable, or `None` when it is fixed.
    pub fn distribution_of(&self, name: &str) -> Option<MixingDistribution> {
        self.randvars
            .iter()
            .find(|(var, _)| var == name)
            .map(|(_, dist)| *dist)
    }

    /// Resolves design columns and parameter order for an alternative set.
    pub fn layout(&self, alternatives: &[String]) -> Result<CoefficientLayout> {
        let base = match &self.base_alternative {
            Some(label) => alternatives
                .iter()
                .position(|alt| alt == label)
                .ok_or_else(|| MixedLogitError::UnknownAlternative {
                    label: label.clone(),
                })?,
            None => 0,
        };

        let mut columns = Vec::new();
        let mut sources: Vec<Option<&str>> = Vec::new();
        if self.fit_intercept {
            sources.push(None);
        }
        sources.extend(self.isvars.iter().map(|v| Some(v.as_str())));
        for source in sources {
            for (alternative, label) in alternatives.iter().enumerate() {
                if alternative == base {
                    continue;
                }
                let stem = source.unwrap_or(INTERCEPT);
                columns.push(DesignColumn {
                    name: format!("{stem}.{label}"),
                    source: DesignSource::Interaction {
                        variable: source.map(str::to_string),
                        alternative,
                    },
                });
            }
        }
        for var in self.varnames.iter().filter(|v| !self.isvars.contains(v)) {
            columns.push(DesignColumn {
                name: var.clone(),
                source: DesignSource::Attribute(var.clone()),
            });
        }

        let mut fixed = Vec::new();
        let mut random = Vec::new();
        let mut distributions = Vec::new();
        for (index, column) in columns.iter().enumerate() {
            match (&column.source, self.distribution_of(&column.name)) {
                (DesignSource::Attribute(_), Some(dist)) => {
                    random.push(index);
                    distributions.push(dist);
                }
                _ => fixed.push(index),
            }
        }

        let mut names: Vec<String> = fixed.iter().map(|&i| columns[i].name.clone()).collect();
        names.extend(random.iter().map(|&i| columns[i].name.clone()));
        names.extend(random.iter().map(|&i| format!("sd.{}", columns[i].name)));

        Ok(CoefficientLayout {
            columns,
            fixed,
            random,
            distributions,
            names,
        })
    }

    /// Builds the `(situations, alternatives, design columns)` tensor for `data`.
    pub fn design(&self, data: &ChoiceData) -> Result<(Array3<f64>, CoefficientLayout)> {
        let layout = self.layout(data.alternatives())?;
        let mut source_columns = Vec::with_capacity(layout.columns.len());
        for column in &layout.columns {
            let variable = match &column.source {
                DesignSource::Attribute(var) => Some(var),
                DesignSource::Interaction { variable, .. } => variable.as_ref(),
            };
            let index = match variable {
                Some(var) => Some(data.column_index(var).ok_or_else(|| {
                    MixedLogitError::UnknownVariable { name: var.clone() }
                })?),
                None => None,
            };
            source_columns.push(index);
        }

        let j = data.alternative_count();
        let x = data.x();
        let design = Array3::from_shape_fn(
            (data.situation_count(), j, layout.columns.len()),
            |(s, a, k)| {
                let value = source_columns[k].map_or(1.0, |col| x[(s * j + a, col)]);
                match layout.columns[k].source {
                    DesignSource::Interaction { alternative, .. } if alternative != a => 0.0,
                    _ => value,
                }
            },
        );
        Ok((design, layout))
    }
}

/// Builder that validates variable and distribution names.
#[derive(Clone, Debug)]
pub struct SpecificationBuilder {
    varnames: Vec<String>,
    isvars: Vec<String>,
    randvars: Vec<(String, String)>,
    fit_intercept: bool,
    base_alternative: Option<String>,
}

impl SpecificationBuilder {
    /// Declares a random variable with a distribution code (`n`, `ln`, `u`, `t`, `tn`).
    pub fn random_variable(mut self, name: impl Into<String>, code: impl Into<String>) -> Self {
        self.randvars.push((name.into(), code.into()));
        self
    }

    /// Declares several random variables at once.
    pub fn random_variables<I, K, V>(mut self, randvars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.randvars
            .extend(randvars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Marks variables as individual-specific; they enter as alternative interactions.
    pub fn individual_specific<I, S>(mut self, isvars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.isvars.extend(isvars.into_iter().map(Into::into));
        self
    }

    /// Adds alternative-specific intercepts.
    pub fn fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    /// Alternative omitted from intercepts and individual-specific interactions.
    pub fn base_alternative(mut self, label: impl Into<String>) -> Self {
        self.base_alternative = Some(label.into());
        self
    }

    /// Validates names and distribution codes.
    pub fn build(self) -> Result<ModelSpecification> {
        let mut declared = HashSet::new();
        for name in &self.varnames {
            if !declared.insert(name.as_str()) {
                return Err(MixedLogitError::InvalidSpecification {
                    reason: format!("variable `{name}` is declared twice"),
                });
            }
        }
        if self.varnames.is_empty() && !self.fit_intercept {
            return Err(MixedLogitError::InvalidSpecification {
                reason: "at least one variable or an intercept is required".to_string(),
            });
        }

        let mut randvars: Vec<(String, MixingDistribution)> = Vec::with_capacity(self.randvars.len());
        for (name, code) in self.randvars {
            if !declared.contains(name.as_str()) {
                return Err(MixedLogitError::UnknownRandomVariable { name });
            }
            let distribution = code.parse::<MixingDistribution>()?;
            if randvars.iter().any(|(var, _)| *var == name) {
                return Err(MixedLogitError::InvalidSpecification {
                    reason: format!("random variable `{name}` is declared twice"),
                });
            }
            randvars.push((name, distribution));
        }

        for name in &self.isvars {
            if !declared.contains(name.as_str()) {
                return Err(MixedLogitError::UnknownVariable { name: name.clone() });
            }
            if randvars.iter().any(|(var, _)| var == name) {
                return Err(MixedLogitError::InvalidSpecification {
                    reason: format!("individual-specific variable `{name}` cannot be random"),
                });
            }
        }

        Ok(ModelSpecification {
            varnames: self.varnames,
            isvars: self.isvars,
            randvars,
            fit_intercept: self.fit_intercept,
            base_alternative: self.base_alternative,
        })
    }
}

/// Where a design column takes its values from.
#[derive(Clone, Debug, PartialEq)]
pub enum DesignSource {
    /// An alternative-specific attribute column.
    Attribute(String),
    /// An individual-specific variable (or the intercept when `variable` is `None`)
    /// interacted with an alternative dummy.
    Interaction {
        variable: Option<String>,
        alternative: usize,
    },
}

/// One column of the design tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct DesignColumn {
    /// Column name, also used as the coefficient name.
    pub name: String,
    /// Source of the column values.
    pub source: DesignSource,
}

/// Design columns and the parameter order derived from a [`ModelSpecification`].
#[derive(Clone, Debug, PartialEq)]
pub struct CoefficientLayout {
    columns: Vec<DesignColumn>,
    fixed: Vec<usize>,
    random: Vec<usize>,
    distributions: Vec<MixingDistribution>,
    names: Vec<String>,
}

impl CoefficientLayout {
    /// Builds a layout directly from design column names and per-column distributions.
    pub fn from_columns(columns: &[(&str, Option<MixingDistribution>)]) -> Self {
        let mut fixed = Vec::new();
        let mut random = Vec::new();
        let mut distributions = Vec::new();
        for (index, (_, dist)) in columns.iter().enumerate() {
            match dist {
                Some(dist) => {
                    random.push(index);
                    distributions.push(*dist);
                }
                None => fixed.push(index),
            }
        }
        let columns: Vec<DesignColumn> = columns
            .iter()
            .map(|(name, _)| DesignColumn {
                name: name.to_string(),
                source: DesignSource::Attribute(name.to_string()),
            })
            .collect();
        let mut names: Vec<String> = fixed.iter().map(|&i| columns[i].name.clone()).collect();
        names.extend(random.iter().map(|&i| columns[i].name.clone()));
        names.extend(random.iter().map(|&i| format!("sd.{}", columns[i].name)));
        Self {
            columns,
            fixed,
            random,
            distributions,
            names,
        }
    }

    /// Design columns in tensor order.
    pub fn columns(&self) -> &[DesignColumn] {
        &self.columns
    }

    /// Indices of fixed design columns.
    pub fn fixed(&self) -> &[usize] {
        &self.fixed
    }

    /// Indices of random design columns.
    pub fn random(&self) -> &[usize] {
        &self.random
    }

    /// Distribution of each random column, aligned with [`random`](Self::random).
    pub fn distributions(&self) -> &[MixingDistribution] {
        &self.distributions
    }

    /// Coefficient names: fixed, random means, then `sd.`-prefixed spreads.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Length of the parameter vector.
    pub fn parameter_count(&self) -> usize {
        self.fixed.len() + 2 * self.random.len()
    }

    /// Checks that a coefficient vector has the layout's length.
    pub fn check_length(&self, found: usize) -> Result<()> {
        if found != self.parameter_count() {
            return Err(MixedLogitError::CoefficientMismatch {
                expected: format!("{} coefficients ({})", self.parameter_count(), self.names.join(", ")),
                found: format!("{found} coefficients"),
            });
        }
        Ok(())
    }

    /// Checks that coefficient names follow the layout's order.
    pub fn check_names(&self, names: &[String]) -> Result<()> {
        if names != self.names.as_slice() {
            return Err(MixedLogitError::CoefficientMismatch {
                expected: self.names.join(", "),
                found: names.join(", "),
            });
        }
        Ok(())
    }
}

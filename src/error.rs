use thiserror::Error;

/// Unified error type for `mixlogit` operations.
///
/// Every variant describes a problem with the inputs and is raised before any
/// simulation work starts. Numerical edge cases inside the likelihood are
/// clamped instead of reported.
#[derive(Debug, Error)]
pub enum MixedLogitError {
    /// Raised when provided arrays or matrices have incompatible dimensions.
    #[error("dimension mismatch in {context}: expected {expected} but found {found}")]
    DimensionMismatch {
        /// Human-readable context describing the operation.
        context: &'static str,
        /// The required dimension, often the model-implied value.
        expected: usize,
        /// The dimension that was actually supplied.
        found: usize,
    },

    /// Raised when a specification refers to a column the data does not carry.
    #[error("variable `{name}` is not among the declared variable names")]
    UnknownVariable { name: String },

    /// Raised when a random-variable key is not a declared variable name.
    #[error("random variable `{name}` is not among the declared variable names")]
    UnknownRandomVariable { name: String },

    /// Raised when a mixing distribution code is outside the supported set.
    #[error("unsupported mixing distribution `{code}`; expected one of n, ln, u, t, tn")]
    UnsupportedDistribution { code: String },

    /// Raised for contradictory model specifications.
    #[error("invalid model specification: {reason}")]
    InvalidSpecification { reason: String },

    /// Raised when rows of a choice situation or panel are not grouped contiguously.
    #[error("{kind} identifiers must appear in contiguous blocks; `{id}` is split")]
    NonContiguousGroup { kind: &'static str, id: String },

    /// Raised when the panel id changes inside a single choice situation.
    ///
    /// `index` is the zero-based position of the situation in the design tensor.
    #[error("choice situation at position {index} spans more than one panel")]
    InconsistentPanel { index: usize },

    /// Raised when a choice situation does not list every alternative exactly once.
    #[error("choice situation `{id}` must list {expected} distinct alternatives, found {found}")]
    IncompleteChoiceSet {
        id: String,
        expected: usize,
        found: usize,
    },

    /// Raised when an alternative label is not part of the model's alternative set.
    #[error("alternative `{label}` is not part of the choice set")]
    UnknownAlternative { label: String },

    /// Raised when a choice situation does not have exactly one chosen alternative.
    #[error("choice situation `{id}` must have exactly one chosen alternative, found {chosen}")]
    InvalidChoice { id: String, chosen: usize },

    /// Raised when observation weights are non-positive, non-finite, or vary within an individual.
    #[error("weight at row {index} is invalid ({weight})")]
    InvalidWeight { index: usize, weight: f64 },

    /// Raised when supplied coefficients do not follow the model's coefficient layout.
    #[error("coefficients do not match the model layout: expected {expected}, found {found}")]
    CoefficientMismatch { expected: String, found: String },

    /// Raised when a required component has not been provided to a builder.
    #[error("{component} must be provided before estimating the model")]
    MissingComponent { component: &'static str },

    /// Raised when linear algebra operations encounter a singular system.
    #[error("matrix in {context} is singular")]
    SingularMatrix { context: &'static str },

    /// Raised when numerical routines produce NaN.
    #[error("encountered NaN during {context}")]
    NumericalError { context: &'static str },

    /// Raised when an option carries an unusable value.
    #[error("option `{option}` is invalid: {reason}")]
    InvalidOption {
        option: &'static str,
        reason: &'static str,
    },

    /// Raised when the optimizer itself fails, for example in its line search.
    #[error("optimization failed: {reason}")]
    Optimization { reason: String },
}

impl MixedLogitError {
    /// Helper to format a [`DimensionMismatch`](MixedLogitError::DimensionMismatch) error.
    pub fn dimension_mismatch(context: &'static str, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            context,
            expected,
            found,
        }
    }

    /// Helper to raise when a matrix factorization fails due to singularity.
    pub fn singular(context: &'static str) -> Self {
        Self::SingularMatrix { context }
    }

    /// Helper for bubbling up missing component errors from builders.
    pub fn missing_component(component: &'static str) -> Self {
        Self::MissingComponent { component }
    }

    /// Helper for rejecting an option value.
    pub fn invalid_option(option: &'static str, reason: &'static str) -> Self {
        Self::InvalidOption { option, reason }
    }
}

impl From<argmin::core::Error> for MixedLogitError {
    fn from(err: argmin::core::Error) -> Self {
        match err.downcast::<MixedLogitError>() {
            Ok(inner) => inner,
            Err(other) => MixedLogitError::Optimization {
                reason: other.to_string(),
            },
        }
    }
}

/// Type alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, MixedLogitError>;

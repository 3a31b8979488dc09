//! Quasi-Newton minimisation of the simulated negative log-likelihood.
//!
//! The optimizer only sees an [`Objective`]: a map from a parameter vector to
//! a scalar loss and its gradient. [`minimize`] bridges it to `argmin` and runs
//! L-BFGS with a More–Thuente line search, which may evaluate the objective at
//! arbitrary points, in any order.

use std::sync::Mutex;

use argmin::core::{
    CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus,
};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::{MixedLogitError, Result};

type Parameters = DVector<f64>;
type MoreThuente = MoreThuenteLineSearch<Parameters, Parameters, f64>;
type LbfgsMoreThuente = LBFGS<MoreThuente, Parameters, Parameters, f64>;

/// History length kept by L-BFGS unless configured otherwise.
pub const DEFAULT_LBFGS_MEMORY: usize = 7;

/// Scalar loss with its gradient.
pub trait Objective {
    /// Evaluates the loss and its gradient at `parameters`.
    fn evaluate(&self, parameters: &DVector<f64>) -> Result<(f64, DVector<f64>)>;
}

impl<F> Objective for F
where
    F: Fn(&DVector<f64>) -> Result<(f64, DVector<f64>)>,
{
    fn evaluate(&self, parameters: &DVector<f64>) -> Result<(f64, DVector<f64>)> {
        self(parameters)
    }
}

/// Configuration for the L-BFGS minimiser.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LbfgsOptions {
    /// Maximum number of iterations. Zero returns the starting point.
    pub max_iterations: usize,
    /// Convergence threshold on the L2 norm of the gradient.
    pub gradient_tolerance: f64,
    /// Convergence threshold on the change of the objective between iterations.
    pub cost_tolerance: f64,
    /// Number of past updates kept to approximate the inverse Hessian.
    pub memory: usize,
}

impl Default for LbfgsOptions {
    fn default() -> Self {
        Self {
            max_iterations: 2_000,
            gradient_tolerance: 1e-6,
            cost_tolerance: f64::EPSILON,
            memory: DEFAULT_LBFGS_MEMORY,
        }
    }
}

impl LbfgsOptions {
    fn validate(&self) -> Result<()> {
        if !(self.gradient_tolerance.is_finite() && self.gradient_tolerance > 0.0) {
            return Err(MixedLogitError::invalid_option(
                "gradient_tolerance",
                "must be positive and finite",
            ));
        }
        if !(self.cost_tolerance.is_finite() && self.cost_tolerance > 0.0) {
            return Err(MixedLogitError::invalid_option(
                "cost_tolerance",
                "must be positive and finite",
            ));
        }
        if self.memory == 0 {
            return Err(MixedLogitError::invalid_option(
                "memory",
                "at least one update must be kept",
            ));
        }
        Ok(())
    }

    fn build_solver(&self) -> Result<LbfgsMoreThuente> {
        let solver = LBFGS::new(MoreThuente::new(), self.memory)
            .with_tolerance_grad(self.gradient_tolerance)?
            .with_tolerance_cost(self.cost_tolerance)?;
        Ok(solver)
    }
}

/// Outcome of a minimisation run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OptimizationSummary {
    /// Best parameters found.
    pub parameters: DVector<f64>,
    /// Objective value at `parameters`.
    pub value: f64,
    /// Gradient at `parameters`.
    pub gradient: DVector<f64>,
    /// Number of iterations run.
    pub iterations: usize,
    /// Whether a tolerance was met before the iteration cap.
    pub converged: bool,
    /// Why the solver stopped.
    pub termination: String,
}

/// Exposes an [`Objective`] as an `argmin` problem.
///
/// The line search asks for the cost and the gradient at the same point in
/// separate calls, so the last evaluation is cached.
struct ArgminObjective<'a, O: ?Sized> {
    objective: &'a O,
    last: Mutex<Option<(Parameters, f64, Parameters)>>,
}

impl<'a, O: Objective + ?Sized> ArgminObjective<'a, O> {
    fn new(objective: &'a O) -> Self {
        Self {
            objective,
            last: Mutex::new(None),
        }
    }

    fn evaluate(&self, parameters: &Parameters) -> Result<(f64, Parameters)> {
        if let Ok(last) = self.last.lock() {
            if let Some((point, value, gradient)) = last.as_ref() {
                if point == parameters {
                    return Ok((*value, gradient.clone()));
                }
            }
        }
        let (value, gradient) = self.objective.evaluate(parameters)?;
        check_finite(value, &gradient)?;
        if let Ok(mut last) = self.last.lock() {
            *last = Some((parameters.clone(), value, gradient.clone()));
        }
        Ok((value, gradient))
    }
}

impl<O: Objective + ?Sized> CostFunction for ArgminObjective<'_, O> {
    type Param = Parameters;
    type Output = f64;

    fn cost(
        &self,
        parameters: &Self::Param,
    ) -> std::result::Result<Self::Output, argmin::core::Error> {
        Ok(self.evaluate(parameters)?.0)
    }
}

impl<O: Objective + ?Sized> Gradient for ArgminObjective<'_, O> {
    type Param = Parameters;
    type Gradient = Parameters;

    fn gradient(
        &self,
        parameters: &Self::Param,
    ) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        Ok(self.evaluate(parameters)?.1)
    }
}

/// Minimises `objective` from `initial` with L-BFGS and a More–Thuente line search.
///
/// The returned parameters are the best point visited, so the value never
/// exceeds the value at `initial`.
pub fn minimize<O: Objective + ?Sized>(
    objective: &O,
    initial: DVector<f64>,
    options: &LbfgsOptions,
) -> Result<OptimizationSummary> {
    options.validate()?;
    let problem = ArgminObjective::new(objective);
    if options.max_iterations == 0 {
        let (value, gradient) = problem.evaluate(&initial)?;
        return Ok(OptimizationSummary {
            parameters: initial,
            value,
            gradient,
            iterations: 0,
            converged: false,
            termination: "no iterations requested".to_string(),
        });
    }

    let solver = options.build_solver()?;
    let max_iterations = options.max_iterations as u64;
    let result = Executor::new(problem, solver)
        .configure(|state| state.param(initial).max_iters(max_iterations))
        .run()?;

    let mut state = result.state().clone();
    let iterations = state.get_iter() as usize;
    let status = state.get_termination_status().clone();
    let converged = matches!(
        status,
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
    );
    let parameters = state
        .take_best_param()
        .ok_or(MixedLogitError::NumericalError {
            context: "optimizer state",
        })?;
    let (value, gradient) = objective.evaluate(&parameters)?;
    log::debug!(
        "l-bfgs stopped after {} iterations: objective {:.8}, {:?}",
        iterations,
        value,
        status
    );

    Ok(OptimizationSummary {
        parameters,
        value,
        gradient,
        iterations,
        converged,
        termination: format!("{status:?}"),
    })
}

fn check_finite(value: f64, gradient: &DVector<f64>) -> Result<()> {
    if value.is_nan() || gradient.iter().any(|g| g.is_nan()) {
        return Err(MixedLogitError::NumericalError {
            context: "objective evaluation",
        });
    }
    Ok(())
}

//! Mixed (random parameters) logit estimation by maximum simulated likelihood.
//!
//! Decision makers choose one alternative per choice situation; tastes for
//! some attributes vary across individuals following a mixing distribution.
//! The likelihood integrates over that distribution by simulation with Halton
//! or pseudo-random draws, and the crate maximises it with L-BFGS using the
//! analytic gradient. It offers tools to
//!
//! - arrange long-format choice data (`data` module),
//! - describe the utility specification and coefficient order (`formulation` module),
//! - balance ragged panels (`panel` module),
//! - generate and shape simulation draws (`integration` and `distribution` modules),
//! - evaluate the simulated log-likelihood and its gradient (`likelihood` module),
//! - minimise it (`solving` module), and
//! - fit models and predict choices (`estimation` and `prediction` modules).
//!
//! # Quick start
//!
//! ```no_run
//! use mixlogit::data::ChoiceDataBuilder;
//! use mixlogit::formulation::ModelSpecification;
//! use mixlogit::{FitOptions, MixedLogit, PredictOptions};
//! use nalgebra::{DMatrix, DVector};
//!
//! let labels = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
//! let x = DMatrix::from_row_slice(4, 2, &[2.0, 1.0, 1.0, 3.0, 3.0, 1.0, 2.0, 4.0]);
//! let data = ChoiceDataBuilder::new(
//!     x,
//!     labels(&["price", "time"]),
//!     labels(&["bus", "car", "bus", "car"]),
//!     labels(&["1", "1", "2", "2"]),
//! )
//! .choices(DVector::from_vec(vec![0.0, 1.0, 1.0, 0.0]))
//! .build()
//! .expect("well-formed choice data");
//!
//! let specification = ModelSpecification::builder(["price", "time"])
//!     .random_variable("time", "n")
//!     .build()
//!     .expect("valid specification");
//! let model = MixedLogit::new(specification);
//!
//! let fit = model
//!     .fit(&data, &FitOptions::default().with_n_draws(100))
//!     .expect("fit");
//! println!("{:?} = {:?}", fit.names, fit.coefficients);
//!
//! let prediction = model
//!     .predict_fitted(&data, &fit, &PredictOptions::default())
//!     .expect("prediction");
//! println!("{:?}", prediction.frequencies);
//! ```

pub mod data;
pub mod distribution;
pub mod error;
pub mod estimation;
pub mod formulation;
pub mod integration;
pub mod likelihood;
pub mod options;
pub mod panel;
pub mod prediction;
pub mod probability;
pub mod solving;

pub use distribution::MixingDistribution;
pub use error::{MixedLogitError, Result};
pub use estimation::{FitResult, MixedLogit};
pub use integration::{DrawMethod, DrawOptions, SimulationDraws};
pub use options::{Backend, FitOptions, PredictOptions};
pub use prediction::Prediction;
pub use solving::{LbfgsOptions, OptimizationSummary};

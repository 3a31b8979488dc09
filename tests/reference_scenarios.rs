use approx::assert_relative_eq;
use mixlogit::data::{ChoiceData, ChoiceDataBuilder};
use mixlogit::formulation::ModelSpecification;
use mixlogit::{
    DrawOptions, FitOptions, FitResult, MixedLogit, MixedLogitError, PredictOptions,
};
use nalgebra::{DMatrix, DVector};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Gumbel, Normal};

const X: [f64; 12] = [2., 1., 1., 3., 3., 1., 2., 4., 2., 1., 2., 4.];

fn labels(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn small_data(panels: bool) -> ChoiceData {
    let builder = ChoiceDataBuilder::new(
        DMatrix::from_row_slice(6, 2, &X),
        labels(&["a", "b"]),
        labels(&["1", "2", "1", "2", "1", "2"]),
        labels(&["1", "1", "2", "2", "3", "3"]),
    )
    .choices(DVector::from_vec(vec![0., 1., 0., 1., 0., 1.]));
    let builder = if panels {
        builder.panels(labels(&["1", "1", "1", "1", "2", "2"]))
    } else {
        builder
    };
    builder.build().unwrap()
}

fn both_normal() -> MixedLogit {
    MixedLogit::new(
        ModelSpecification::builder(["a", "b"])
            .random_variables([("a", "n"), ("b", "n")])
            .build()
            .unwrap(),
    )
}

/// Long-format data with three alternatives and logit errors.
/// The time coefficient is drawn once per individual from N(0.5, 0.8).
fn simulated_choices(individuals: usize, periods: usize, seed: u64) -> ChoiceData {
    let mut rng = SmallRng::seed_from_u64(seed);
    let gumbel = Gumbel::new(0.0, 1.0).unwrap();
    let taste = Normal::new(0.5, 0.8).unwrap();
    let mut x = Vec::new();
    let mut choices = Vec::new();
    let mut alternatives = Vec::new();
    let mut ids = Vec::new();
    let mut panels = Vec::new();
    for n in 0..individuals {
        let time_coefficient: f64 = taste.sample(&mut rng);
        for p in 0..periods {
            let mut best = (0, f64::NEG_INFINITY);
            for j in 0..3 {
                let price: f64 = rng.gen_range(0.0..3.0);
                let time: f64 = rng.gen_range(0.0..2.0);
                let utility = -1.0 * price + time_coefficient * time + gumbel.sample(&mut rng);
                if utility > best.1 {
                    best = (j, utility);
                }
                x.extend([price, time]);
            }
            for j in 0..3 {
                choices.push(if j == best.0 { 1.0 } else { 0.0 });
                alternatives.push(["bus", "car", "train"][j].to_string());
                ids.push(format!("{n}-{p}"));
                panels.push(n.to_string());
            }
        }
    }
    ChoiceDataBuilder::new(
        DMatrix::from_row_slice(x.len() / 2, 2, &x),
        labels(&["price", "time"]),
        alternatives,
        ids,
    )
    .choices(DVector::from_vec(choices))
    .panels(panels)
    .build()
    .unwrap()
}

#[test]
fn zero_iteration_fit_reproduces_reference_log_likelihood() {
    let options = FitOptions::default().with_n_draws(10).with_max_iterations(0);
    let fit = both_normal().fit(&small_data(true), &options).unwrap();
    assert_relative_eq!(fit.log_likelihood, -1.794_516_32, epsilon = 1e-6);
    assert_eq!(fit.iterations, 0);
    assert!(!fit.converged);
    assert_eq!(fit.coefficients, DVector::from_element(4, 0.1));
    assert_eq!(fit.names, labels(&["a", "b", "sd.a", "sd.b"]));
    assert_eq!((fit.individuals, fit.situations, fit.draws), (2, 3, 10));
}

#[test]
fn prediction_matches_hand_computed_probabilities() {
    let prediction = both_normal()
        .predict(
            &small_data(false),
            &DVector::from_element(4, 0.1),
            &PredictOptions::default().with_n_draws(5),
        )
        .unwrap();
    assert_relative_eq!(prediction.probabilities[(0, 0)], 0.463_617_424_685_280_4, epsilon = 1e-9);
    assert_relative_eq!(prediction.probabilities[(0, 1)], 0.536_382_575_314_719_6, epsilon = 1e-9);
    assert_eq!(prediction.choices, labels(&["2", "2", "2"]));
    assert_eq!(prediction.frequencies.len(), 1);
    assert_eq!(prediction.frequencies["2"], 1.0);
}

#[test]
fn invalid_specifications_are_rejected() {
    let fake_code = ModelSpecification::builder(["a", "b"])
        .random_variable("a", "fake")
        .build();
    assert!(matches!(
        fake_code,
        Err(MixedLogitError::UnsupportedDistribution { .. })
    ));
    let fake_name = ModelSpecification::builder(["a", "b"])
        .random_variable("fake", "n")
        .build();
    assert!(matches!(
        fake_name,
        Err(MixedLogitError::UnknownRandomVariable { .. })
    ));
}

#[test]
fn wrong_coefficient_count_is_rejected_at_prediction() {
    let result = both_normal().predict(
        &small_data(false),
        &DVector::from_element(3, 0.1),
        &PredictOptions::default(),
    );
    assert!(matches!(result, Err(MixedLogitError::CoefficientMismatch { .. })));
}

#[test]
fn fixed_logit_recovers_the_generating_coefficients() {
    let data = simulated_choices(1500, 1, 7);
    let model = MixedLogit::new(
        ModelSpecification::builder(["price", "time"])
            .build()
            .unwrap(),
    );
    let fit = model
        .fit(&data, &FitOptions::default().with_n_draws(1))
        .unwrap();
    assert!(fit.converged);
    assert_relative_eq!(fit.coefficient("price").unwrap(), -1.0, epsilon = 0.2);
    assert!(fit.coefficient("time").unwrap() > 0.0);
    assert!(fit.std_errors.iter().all(|se| se.is_finite() && *se > 0.0));
    assert!(fit.p_values[0].is_some_and(|p| p < 1e-6));
}

#[test]
fn panel_mixed_logit_improves_on_the_starting_point() {
    let data = simulated_choices(120, 4, 11);
    let model = MixedLogit::new(
        ModelSpecification::builder(["price", "time"])
            .random_variable("time", "n")
            .build()
            .unwrap(),
    );
    let start = model
        .fit(&data, &FitOptions::default().with_n_draws(50).with_max_iterations(0))
        .unwrap();
    let fit = model
        .fit(&data, &FitOptions::default().with_n_draws(50).with_max_iterations(200))
        .unwrap();
    assert_eq!(fit.names, labels(&["price", "time", "sd.time"]));
    assert_eq!((fit.individuals, fit.situations), (120, 480));
    assert!(fit.log_likelihood > start.log_likelihood);
    assert!(fit.coefficient("price").unwrap() < -0.5);

    let prediction = model
        .predict_fitted(&data, &fit, &PredictOptions::default().with_n_draws(50))
        .unwrap();
    assert_eq!(prediction.choices.len(), 480);
    let share: f64 = prediction.frequencies.values().sum();
    assert_relative_eq!(share, 1.0, epsilon = 2e-3);
}

#[test]
fn seeded_pseudo_random_draws_are_reproducible() {
    let options = FitOptions::default()
        .with_draws(DrawOptions::default().with_draws(25).pseudo_random(99))
        .with_max_iterations(0);
    let first = both_normal().fit(&small_data(true), &options).unwrap();
    let second = both_normal().fit(&small_data(true), &options).unwrap();
    assert_eq!(first.log_likelihood, second.log_likelihood);
}

#[test]
fn uniform_weights_leave_the_fit_unchanged() {
    let plain = small_data(true);
    let weighted = ChoiceDataBuilder::new(
        DMatrix::from_row_slice(6, 2, &X),
        labels(&["a", "b"]),
        labels(&["1", "2", "1", "2", "1", "2"]),
        labels(&["1", "1", "2", "2", "3", "3"]),
    )
    .choices(DVector::from_vec(vec![0., 1., 0., 1., 0., 1.]))
    .panels(labels(&["1", "1", "1", "1", "2", "2"]))
    .weights(DVector::from_element(6, 3.0))
    .build()
    .unwrap();
    let options = FitOptions::default().with_n_draws(10).with_max_iterations(0);
    let a = both_normal().fit(&plain, &options).unwrap();
    let b = both_normal().fit(&weighted, &options).unwrap();
    assert_relative_eq!(a.log_likelihood, b.log_likelihood, epsilon = 1e-12);
}

#[test]
fn fit_results_survive_json_persistence() {
    let data = simulated_choices(200, 1, 3);
    let model = MixedLogit::new(
        ModelSpecification::builder(["price", "time"])
            .build()
            .unwrap(),
    );
    let fit = model
        .fit(&data, &FitOptions::default().with_n_draws(1))
        .unwrap();
    let json = serde_json::to_string(&fit).unwrap();
    let restored: FitResult = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.names, fit.names);
    assert_relative_eq!(restored.coefficients, fit.coefficients, epsilon = 1e-12);
    assert_relative_eq!(restored.log_likelihood, fit.log_likelihood, epsilon = 1e-12);

    let prediction = model
        .predict_fitted(&data, &restored, &PredictOptions::default().with_n_draws(1))
        .unwrap();
    assert_eq!(prediction.choices.len(), 200);
}

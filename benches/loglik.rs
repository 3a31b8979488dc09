//! Cost of one simulated log-likelihood and gradient evaluation.
//!
//! Compares the serial and rayon backends over a panel of synthetic
//! individuals with two random coefficients.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use mixlogit::formulation::CoefficientLayout;
use mixlogit::likelihood::LikelihoodEngine;
use mixlogit::panel::balance_panels;
use mixlogit::{Backend, MixingDistribution, SimulationDraws};
use nalgebra::DVector;
use ndarray::{Array2, Array3};

const ALTERNATIVES: usize = 4;
const PERIODS: usize = 5;

fn engine(individuals: usize, draws: usize, backend: Backend) -> LikelihoodEngine {
    let situations = individuals * PERIODS;
    let x = Array3::from_shape_fn((situations, ALTERNATIVES, 3), |(s, j, k)| {
        ((s * 7 + j * 3 + k * 11) % 13) as f64 / 6.5 - 1.0
    });
    let y = Array2::from_shape_fn((situations, ALTERNATIVES), |(s, j)| {
        if (s * 5 + 1) % ALTERNATIVES == j {
            1.0
        } else {
            0.0
        }
    });
    let panels: Vec<String> = (0..situations)
        .flat_map(|s| std::iter::repeat((s / PERIODS).to_string()).take(ALTERNATIVES))
        .collect();
    let balanced = balance_panels(x.view(), y.view(), &panels).expect("balanced panels");

    let distributions = [MixingDistribution::Normal, MixingDistribution::LogNormal];
    let layout = CoefficientLayout::from_columns(&[
        ("price", None),
        ("time", Some(distributions[0])),
        ("comfort", Some(distributions[1])),
    ]);
    let draws = SimulationDraws::halton(individuals, 2, draws, 100, false)
        .shaped(&distributions)
        .expect("shaped draws");
    LikelihoodEngine::new(balanced, draws, &layout, None, 0.0, backend).expect("engine")
}

fn bench_loglik(c: &mut Criterion) {
    let betas = DVector::from_vec(vec![-0.8, 0.4, -0.5, 0.6, 0.3]);
    let mut group = c.benchmark_group("loglik");
    for individuals in [100usize, 1_000] {
        for backend in [Backend::Serial, Backend::Parallel] {
            let engine = engine(individuals, 200, backend);
            group.bench_with_input(
                BenchmarkId::new(format!("{backend:?}"), individuals),
                &engine,
                |b, engine| b.iter(|| engine.evaluate(black_box(&betas)).expect("evaluation")),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_loglik);
criterion_main!(benches);

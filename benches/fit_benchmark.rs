use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mixgrad::mixture::{Dataset, FamilyKind, MixtureModel, Optimizer, OptimizerConfig};

fn iris_like() -> Dataset {
    let mut rng = fastrand::Rng::with_seed(0);
    let centers = [[5.0, 3.4, 1.5, 0.2], [5.9, 2.8, 4.3, 1.3], [6.6, 3.0, 5.6, 2.0]];
    let rows: Vec<Vec<f64>> = centers
        .iter()
        .flat_map(|center| {
            (0..50)
                .map(|_| center.iter().map(|m| m + 0.7 * (rng.f64() - 0.5)).collect())
                .collect::<Vec<_>>()
        })
        .collect();
    Dataset::from_rows(&rows).unwrap()
}

fn fit_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit");
    let model = MixtureModel::new(iris_like(), FamilyKind::Gmm, None).unwrap();
    let init = model.init_params(3, 0.5, None, true).unwrap();
    for optimizer in Optimizer::ALL {
        let config = OptimizerConfig::new(optimizer).with_max_steps(20);
        group.bench_with_input(
            BenchmarkId::new("GMM", optimizer.identifier()),
            &config,
            |b, config| {
                b.iter(|| black_box(model.fit_with(&init, config).unwrap()));
            },
        );
    }
    group.finish();
}

criterion_group!(benches, fit_benchmark);
criterion_main!(benches);

use fastrand::Rng;

use crate::{core::SampleFloat, mixture::Dataset, Float};

/// Isotropic Gaussian clusters around `centers`, `per_cluster` points each, in cluster order.
pub(crate) fn gaussian_blobs<C: AsRef<[Float]>>(
    centers: &[C],
    per_cluster: usize,
    spread: Float,
    seed: u64,
) -> Dataset {
    let mut rng = Rng::with_seed(seed);
    let rows: Vec<Vec<Float>> = centers
        .iter()
        .flat_map(|center| {
            (0..per_cluster)
                .map(|_| {
                    center
                        .as_ref()
                        .iter()
                        .map(|&m| rng.normal(m, spread))
                        .collect()
                })
                .collect::<Vec<_>>()
        })
        .collect();
    Dataset::from_rows(&rows).unwrap()
}

/// Two well-separated clusters in the plane.
pub(crate) fn two_blobs(per_cluster: usize, seed: u64) -> Dataset {
    gaussian_blobs(&[[-3.0, 0.0], [3.0, 1.0]], per_cluster, 1.0, seed)
}

/// Three 4-dimensional clusters shaped like the iris measurements.
pub(crate) fn iris_like(seed: u64) -> Dataset {
    gaussian_blobs(
        &[[5.0, 3.4, 1.5, 0.2], [5.9, 2.8, 4.3, 1.3], [6.6, 3.0, 5.6, 2.0]],
        50,
        0.35,
        seed,
    )
}

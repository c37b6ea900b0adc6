use crate::pca::{cumulative_variance_ratio, project, ComponentSelection, Pca};

use approx::assert_abs_diff_eq;
use ndarray::{Array2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::NamedTempFile;

fn generate_random_data(n_samples: usize, n_features: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::random_using((n_samples, n_features), Uniform::new(-1.0, 1.0), &mut rng)
}

/// Data whose variance is concentrated in a single latent trend, with
/// small independent jitter on top.
fn generate_concentrated_data(n_samples: usize, n_features: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut data = Array2::zeros((n_samples, n_features));
    for i in 0..n_samples {
        let latent = i as f64 / n_samples as f64 * 10.0;
        for j in 0..n_features {
            data[[i, j]] = (j + 1) as f64 * latent + rng.gen_range(-0.05..0.05);
        }
    }
    data
}

fn reconstruction_error(x: &Array2<f64>, rebuilt: &Array2<f64>) -> f64 {
    (x - rebuilt).mapv(|v| v * v).sum()
}

#[test]
fn full_rank_round_trip_is_exact_tall_matrix() {
    // n > d: covariance path, full rank = d.
    let x = generate_random_data(20, 8, 11);
    let (scores, basis) = project(&x, ComponentSelection::Leading(8)).unwrap();
    assert_eq!(scores.dim(), (20, 8));
    let rebuilt = basis.inverse_transform(&scores).unwrap();
    for (a, b) in x.iter().zip(rebuilt.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-8);
    }
}

#[test]
fn full_rank_round_trip_is_exact_wide_matrix() {
    // d > n: Gram path, full rank = n. The centered matrix has rank
    // n - 1; the final zero-variance axis contributes nothing and the
    // round trip is still exact.
    let x = generate_random_data(6, 10, 13);
    let (scores, basis) = project(&x, ComponentSelection::Leading(6)).unwrap();
    assert_eq!(scores.dim(), (6, 6));
    let rebuilt = basis.inverse_transform(&scores).unwrap();
    for (a, b) in x.iter().zip(rebuilt.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-6);
    }
}

#[test]
fn reconstruction_error_is_monotone_in_k() {
    let x = generate_random_data(30, 10, 17);
    let mut previous = f64::INFINITY;
    for k in 0..=10 {
        let (scores, basis) = project(&x, ComponentSelection::Leading(k)).unwrap();
        let rebuilt = basis.inverse_transform(&scores).unwrap();
        let err = reconstruction_error(&x, &rebuilt);
        assert!(
            err <= previous + 1e-9,
            "error grew from {} to {} at k = {}",
            previous,
            err,
            k
        );
        previous = err;
    }
    // Full rank ends at (numerically) zero error.
    assert!(previous < 1e-12);
}

#[test]
fn leading_and_trailing_selections_are_disjoint() {
    let x = generate_random_data(25, 8, 19);
    let (_, leading) = project(&x, ComponentSelection::Leading(3)).unwrap();
    let (_, trailing) = project(&x, ComponentSelection::Trailing(3)).unwrap();

    // Every trailing direction carries no more variance than any
    // leading one.
    let leading_min = leading
        .explained_variance()
        .unwrap()
        .iter()
        .cloned()
        .fold(f64::INFINITY, f64::min);
    let trailing_max = trailing
        .explained_variance()
        .unwrap()
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    assert!(leading_min >= trailing_max - 1e-12);

    // The two sets of directions are mutually orthogonal regardless of
    // per-component sign.
    for lead_col in leading.rotation().unwrap().columns() {
        for trail_col in trailing.rotation().unwrap().columns() {
            assert!(lead_col.dot(&trail_col).abs() < 1e-8);
        }
    }

    // Together (with the middle components missing) they explain less
    // than everything.
    let ratio_sum: f64 = leading
        .explained_variance_ratio()
        .unwrap()
        .sum()
        + trailing.explained_variance_ratio().unwrap().sum();
    assert!(ratio_sum <= 1.0 + 1e-9);
}

#[test]
fn full_basis_ratios_sum_to_one() {
    let x = generate_random_data(30, 6, 23);
    let mut basis = Pca::new();
    basis.fit(x, None).unwrap();
    let total: f64 = basis.explained_variance_ratio().unwrap().sum();
    assert_abs_diff_eq!(total, 1.0, epsilon = 1e-9);
}

#[test]
fn trailing_scores_match_the_full_decomposition() {
    let x = generate_random_data(15, 7, 29);
    let mut full = Pca::new();
    full.fit(x.clone(), None).unwrap();
    let full_scores = full.transform(&x).unwrap();
    let rank = full.n_components();

    let (scores, basis) = project(&x, ComponentSelection::Trailing(2)).unwrap();
    assert_eq!(scores.dim(), (15, 2));
    assert_eq!(basis.n_components(), 2);
    assert_eq!(basis.source_rank(), Some(rank));
    assert_eq!(basis.mean().unwrap(), full.mean().unwrap());

    for i in 0..15 {
        for j in 0..2 {
            assert_abs_diff_eq!(
                scores[[i, j]],
                full_scores[[i, rank - 2 + j]],
                epsilon = 1e-10
            );
        }
    }
}

#[test]
fn trailing_reconstruction_stays_near_the_mean() {
    let x = generate_concentrated_data(40, 8, 31);
    let means = x.mean_axis(Axis(0)).unwrap();

    let (lead_scores, lead_basis) = project(&x, ComponentSelection::Leading(2)).unwrap();
    let (trail_scores, trail_basis) = project(&x, ComponentSelection::Trailing(2)).unwrap();
    let lead_rebuilt = lead_basis.inverse_transform(&lead_scores).unwrap();
    let trail_rebuilt = trail_basis.inverse_transform(&trail_scores).unwrap();

    let deviation = |m: &Array2<f64>| -> f64 {
        let mut total = 0.0;
        for row in m.rows() {
            for (v, mu) in row.iter().zip(means.iter()) {
                total += (v - mu).abs();
            }
        }
        total
    };
    // Low-variance directions reconstruct something close to the flat
    // per-feature mean, unlike the leading directions which recover
    // the dominant trend.
    assert!(deviation(&trail_rebuilt) * 10.0 < deviation(&lead_rebuilt));
}

#[test]
fn rotation_columns_are_orthonormal() {
    let x = generate_random_data(5, 12, 37);
    let (_, basis) = project(&x, ComponentSelection::Leading(4)).unwrap();
    let r = basis.rotation().unwrap();
    let gram = r.t().dot(r);
    for i in 0..4 {
        for j in 0..4 {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert_abs_diff_eq!(gram[[i, j]], expected, epsilon = 1e-8);
        }
    }
}

#[test]
fn fit_is_deterministic() {
    let x = generate_random_data(18, 9, 41);
    let (scores_a, basis_a) = project(&x, ComponentSelection::Leading(5)).unwrap();
    let (scores_b, basis_b) = project(&x, ComponentSelection::Leading(5)).unwrap();
    assert_eq!(scores_a, scores_b);
    assert_eq!(basis_a.rotation().unwrap(), basis_b.rotation().unwrap());
}

#[test]
fn zero_components_is_a_valid_leading_selection() {
    let x = generate_random_data(10, 4, 43);
    let (scores, basis) = project(&x, ComponentSelection::Leading(0)).unwrap();
    assert_eq!(scores.dim(), (10, 0));
    assert_eq!(basis.n_components(), 0);
}

#[test]
fn invalid_requests_are_rejected() {
    let x = generate_random_data(10, 4, 47);

    // More components than min(rows, cols).
    assert!(project(&x, ComponentSelection::Leading(5)).is_err());
    assert!(project(&x, ComponentSelection::Trailing(5)).is_err());
    // Trailing needs at least one component.
    assert!(project(&x, ComponentSelection::Trailing(0)).is_err());

    // Degenerate matrices.
    let empty = Array2::<f64>::zeros((0, 4));
    assert!(project(&empty, ComponentSelection::Leading(1)).is_err());
    let single = generate_random_data(1, 4, 53);
    assert!(project(&single, ComponentSelection::Leading(1)).is_err());

    // Unfitted basis refuses to transform.
    let unfitted = Pca::new();
    assert!(unfitted.transform(&x).is_err());
    assert!(unfitted.inverse_transform(&x).is_err());

    // Dimension mismatches.
    let (_, basis) = project(&x, ComponentSelection::Leading(2)).unwrap();
    let wrong_width = generate_random_data(3, 7, 59);
    assert!(basis.transform(&wrong_width).is_err());
    assert!(basis.inverse_transform(&wrong_width).is_err());
}

#[test]
fn cumulative_variance_curve_is_monotone_and_complete() {
    let x = generate_random_data(20, 6, 61);
    let curve = cumulative_variance_ratio(&x).unwrap();
    assert_eq!(curve.len(), 6);
    let mut previous = 0.0;
    for &v in curve.iter() {
        assert!(v >= previous - 1e-12);
        previous = v;
    }
    assert_abs_diff_eq!(curve[curve.len() - 1], 1.0, epsilon = 1e-9);
}

#[test]
fn save_load_round_trip_preserves_transforms() -> Result<(), Box<dyn std::error::Error>> {
    let x = generate_random_data(16, 6, 67);
    let (_, basis) = project(&x, ComponentSelection::Leading(3))?;
    let before = basis.transform(&x)?;

    let file = NamedTempFile::new()?;
    basis.save_model(file.path())?;
    let loaded = Pca::load_model(file.path())?;
    let after = loaded.transform(&x)?;

    for (a, b) in before.iter().zip(after.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-12);
    }
    assert_eq!(loaded.source_rank(), basis.source_rank());
    Ok(())
}

#[test]
fn saving_an_unfitted_basis_fails() {
    let file = NamedTempFile::new().unwrap();
    let unfitted = Pca::new();
    assert!(unfitted.save_model(file.path()).is_err());
}

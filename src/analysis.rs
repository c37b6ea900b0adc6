//! Batch orchestration: reconstruction experiments, scatter/variance
//! projections and per-subset classifier evaluation, driven by an
//! explicit configuration value so runs are deterministic and
//! parameterizable in isolation.

use ndarray::{s, Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::error::Error;
use std::ops::Range;

use log::info;

use crate::classify::{accuracy, decision_region, DecisionRegion, GaussianNb};
use crate::pca::{cumulative_variance_ratio, project, ComponentSelection};
use crate::reconstruct::reconstruct;
use crate::standardize::Standardizer;

/// Parameters of one analysis run, passed into each stage at call time.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Component selections to reconstruct samples through.
    pub reconstruction_selections: Vec<ComponentSelection>,
    /// How many leading components to project for scatter summaries.
    pub scatter_components: usize,
    /// Column pairs of the scatter projection to report.
    pub scatter_pairs: Vec<(usize, usize)>,
    /// Leading components the classifier experiments project onto.
    pub classifier_components: usize,
    /// Column ranges of the projected space, one classifier per range.
    pub feature_subsets: Vec<Range<usize>>,
    /// Step of the decision-region mesh.
    pub region_step: f64,
    /// Fraction of samples held out for scoring.
    pub test_fraction: f64,
    /// Seed for the split shuffle.
    pub seed: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            reconstruction_selections: vec![
                ComponentSelection::Leading(60),
                ComponentSelection::Leading(6),
                ComponentSelection::Leading(2),
                ComponentSelection::Trailing(6),
            ],
            scatter_components: 12,
            scatter_pairs: vec![(0, 1), (2, 3), (9, 10)],
            classifier_components: 60,
            feature_subsets: vec![0..2, 2..4, 0..60],
            region_step: 0.1,
            test_fraction: 0.3,
            seed: 42,
        }
    }
}

/// Raw-domain reconstruction of every sample through one selection.
#[derive(Debug)]
pub struct ReconstructionArtifact {
    pub selection: ComponentSelection,
    /// Shape: (n_samples, n_features), continuous raw-domain values.
    pub samples: Array2<f64>,
}

/// Projected coordinates for scatter reporting plus the full
/// cumulative explained-variance curve.
#[derive(Debug)]
pub struct ScatterProjection {
    /// Shape: (n_samples, scatter_components).
    pub coordinates: Array2<f64>,
    /// The column pairs the renderer should plot.
    pub pairs: Vec<(usize, usize)>,
    /// Cumulative explained-variance ratio of the full decomposition.
    pub cumulative_variance: Array1<f64>,
}

/// Outcome of one classifier experiment over a projected column range.
#[derive(Debug)]
pub struct SubsetEvaluation {
    pub columns: Range<usize>,
    pub accuracy: f64,
    /// Present only for 2-wide subsets, derived over the training
    /// points.
    pub region: Option<DecisionRegion>,
}

/// Runs every requested reconstruction, aborting on the first failure
/// so no partial artifact set is reported as a successful run.
///
/// # Errors
/// Propagates standardizer and projection failures.
pub fn run_reconstructions(
    raw: &Array2<f64>,
    scaler: &Standardizer,
    selections: &[ComponentSelection],
) -> Result<Vec<ReconstructionArtifact>, Box<dyn Error>> {
    let mut artifacts = Vec::with_capacity(selections.len());
    for &selection in selections {
        info!("reconstructing through {}", selection);
        let samples = reconstruct(raw, scaler, selection)?;
        artifacts.push(ReconstructionArtifact { selection, samples });
    }
    Ok(artifacts)
}

/// Projects the standardized matrix onto the leading scatter
/// components and computes the full cumulative variance curve.
///
/// # Errors
/// Returns an error if a requested pair indexes past the projection
/// width, or on any fit failure.
pub fn project_for_scatter(
    standardized: &Array2<f64>,
    config: &AnalysisConfig,
) -> Result<ScatterProjection, Box<dyn Error>> {
    for &(a, b) in &config.scatter_pairs {
        if a >= config.scatter_components || b >= config.scatter_components {
            return Err(format!(
                "Scatter pair ({}, {}) indexes past the {} projected components.",
                a, b, config.scatter_components
            )
            .into());
        }
    }

    let (coordinates, _) = project(
        standardized,
        ComponentSelection::Leading(config.scatter_components),
    )?;
    let cumulative_variance = cumulative_variance_ratio(standardized)?;

    Ok(ScatterProjection {
        coordinates,
        pairs: config.scatter_pairs.clone(),
        cumulative_variance,
    })
}

/// Splits `0..n_samples` into shuffled train and test index sets.
///
/// # Errors
/// Returns an error unless `0 < test_fraction < 1` and both resulting
/// sets are non-empty.
pub fn train_test_split(
    n_samples: usize,
    test_fraction: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), Box<dyn Error>> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(format!(
            "Test fraction must be strictly between 0 and 1, got {}.",
            test_fraction
        )
        .into());
    }
    let n_test = (n_samples as f64 * test_fraction).round() as usize;
    if n_test == 0 || n_test >= n_samples {
        return Err(format!(
            "Splitting {} samples at fraction {} leaves an empty split.",
            n_samples, test_fraction
        )
        .into());
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let test = indices.split_off(n_samples - n_test);
    Ok((indices, test))
}

/// Trains and scores one independent Gaussian naive Bayes model per
/// configured column subset of the projected feature space.
///
/// The training split is projected onto the leading
/// `classifier_components`; the test split is transformed through the
/// same basis. Each 2-wide subset additionally yields a decision
/// region derived over its training points.
///
/// Standardization statistics are expected to come from the full
/// matrix fitted before the split; see DESIGN.md for the caveat.
///
/// # Errors
/// Returns an error on a label/row count mismatch, on a subset range
/// that is empty or extends past the projection width, and propagates
/// split, fit and scoring failures.
pub fn evaluate_subsets(
    standardized: &Array2<f64>,
    labels: &[usize],
    config: &AnalysisConfig,
) -> Result<Vec<SubsetEvaluation>, Box<dyn Error>> {
    if labels.len() != standardized.nrows() {
        return Err(format!(
            "Label vector has {} entries for {} samples.",
            labels.len(),
            standardized.nrows()
        )
        .into());
    }
    for subset in &config.feature_subsets {
        if subset.start >= subset.end {
            return Err(format!(
                "Feature subset {}..{} is empty.",
                subset.start, subset.end
            )
            .into());
        }
        if subset.end > config.classifier_components {
            return Err(format!(
                "Feature subset {}..{} extends past the {} projected components.",
                subset.start, subset.end, config.classifier_components
            )
            .into());
        }
    }

    let (train_idx, test_idx) =
        train_test_split(standardized.nrows(), config.test_fraction, config.seed)?;
    info!(
        "split {} samples into {} train / {} test",
        standardized.nrows(),
        train_idx.len(),
        test_idx.len()
    );

    let train_matrix = standardized.select(Axis(0), &train_idx);
    let test_matrix = standardized.select(Axis(0), &test_idx);
    let train_labels: Vec<usize> = train_idx.iter().map(|&i| labels[i]).collect();
    let test_labels: Vec<usize> = test_idx.iter().map(|&i| labels[i]).collect();

    let (train_scores, basis) = project(
        &train_matrix,
        ComponentSelection::Leading(config.classifier_components),
    )?;
    let test_scores = basis.transform(&test_matrix)?;

    let mut evaluations = Vec::with_capacity(config.feature_subsets.len());
    for subset in &config.feature_subsets {
        let train_slice = train_scores
            .slice(s![.., subset.start..subset.end])
            .to_owned();
        let test_slice = test_scores
            .slice(s![.., subset.start..subset.end])
            .to_owned();

        let model = GaussianNb::fit(&train_slice, &train_labels)?;
        let predicted = model.predict(&test_slice)?;
        let score = accuracy(&predicted, &test_labels)?;
        info!(
            "components {}..{}: held-out accuracy {:.4}",
            subset.start, subset.end, score
        );

        let region = if subset.end - subset.start == 2 {
            Some(decision_region(&model, &train_slice, config.region_step)?)
        } else {
            None
        };

        evaluations.push(SubsetEvaluation {
            columns: subset.clone(),
            accuracy: score,
            region,
        });
    }
    Ok(evaluations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_is_deterministic_and_disjoint() {
        let (train_a, test_a) = train_test_split(100, 0.3, 42).unwrap();
        let (train_b, test_b) = train_test_split(100, 0.3, 42).unwrap();
        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);
        assert_eq!(train_a.len(), 70);
        assert_eq!(test_a.len(), 30);

        let mut all: Vec<usize> = train_a.iter().chain(test_a.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());

        let (train_c, _) = train_test_split(100, 0.3, 7).unwrap();
        assert_ne!(train_a, train_c);
    }

    #[test]
    fn split_rejects_degenerate_requests() {
        assert!(train_test_split(10, 0.0, 42).is_err());
        assert!(train_test_split(10, 1.0, 42).is_err());
        assert!(train_test_split(1, 0.5, 42).is_err());
        assert!(train_test_split(2, 0.01, 42).is_err());
    }

    #[test]
    fn scatter_pairs_are_validated() {
        let standardized = Array2::<f64>::zeros((10, 4));
        let config = AnalysisConfig {
            scatter_components: 3,
            scatter_pairs: vec![(0, 5)],
            ..AnalysisConfig::default()
        };
        assert!(project_for_scatter(&standardized, &config).is_err());
    }

    #[test]
    fn subset_ranges_are_validated() {
        let standardized = Array2::<f64>::zeros((10, 4));
        let labels = vec![0; 10];

        let empty_range = AnalysisConfig {
            classifier_components: 4,
            feature_subsets: vec![2..2],
            ..AnalysisConfig::default()
        };
        assert!(evaluate_subsets(&standardized, &labels, &empty_range).is_err());

        let too_wide = AnalysisConfig {
            classifier_components: 4,
            feature_subsets: vec![0..9],
            ..AnalysisConfig::default()
        };
        assert!(evaluate_subsets(&standardized, &labels, &too_wide).is_err());

        let short_labels = vec![0; 3];
        assert!(evaluate_subsets(&standardized, &short_labels, &AnalysisConfig::default()).is_err());
    }
}

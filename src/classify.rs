//! Gaussian naive Bayes classification over projected feature subsets,
//! held-out accuracy scoring, and 2-D decision-region derivation.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::error::Error;

use log::info;

/// Portion of the largest per-feature variance added to every class
/// variance, keeping the likelihood finite for degenerate features.
const VAR_SMOOTHING: f64 = 1e-9;

/// Gaussian naive Bayes model: one independent normal per class per
/// feature. Immutable after fit and scoped to the exact feature width
/// it was trained on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNb {
    /// Distinct class labels, ascending; row order of `means`/`variances`.
    classes: Vec<usize>,
    /// Empirical class priors. Shape: (n_classes).
    priors: Array1<f64>,
    /// Per-class feature means. Shape: (n_classes, n_features).
    means: Array2<f64>,
    /// Per-class smoothed feature variances. Shape: (n_classes, n_features).
    variances: Array2<f64>,
}

impl GaussianNb {
    /// Fits the model on a feature matrix and its parallel label slice.
    ///
    /// Variances are population variances (ddof = 0), smoothed by
    /// `VAR_SMOOTHING` times the largest per-feature variance of the
    /// whole training matrix.
    ///
    /// # Errors
    /// Returns an error on an empty matrix, on a label slice whose
    /// length differs from the row count, or if any observed class ends
    /// up with zero samples.
    pub fn fit(features: &Array2<f64>, labels: &[usize]) -> Result<Self, Box<dyn Error>> {
        let n_samples = features.nrows();
        let n_features = features.ncols();

        if n_samples == 0 || n_features == 0 {
            return Err("Cannot fit a classifier on an empty feature matrix.".into());
        }
        if labels.len() != n_samples {
            return Err(format!(
                "Label vector has {} entries for {} samples.",
                labels.len(),
                n_samples
            )
            .into());
        }

        let mut classes: Vec<usize> = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();
        let n_classes = classes.len();

        // Smoothing is proportional to the widest feature spread of the
        // full training matrix, not of any single class.
        let global_variance = features.map_axis(Axis(0), |col| {
            let mean = col.mean().unwrap_or(0.0);
            col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / col.len() as f64
        });
        let epsilon = VAR_SMOOTHING
            * global_variance
                .iter()
                .fold(0.0_f64, |acc, &v| acc.max(v))
                .max(f64::MIN_POSITIVE);

        let mut priors = Array1::<f64>::zeros(n_classes);
        let mut means = Array2::<f64>::zeros((n_classes, n_features));
        let mut variances = Array2::<f64>::zeros((n_classes, n_features));

        for (c, &class) in classes.iter().enumerate() {
            let member_rows: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|(_, &l)| l == class)
                .map(|(i, _)| i)
                .collect();
            if member_rows.is_empty() {
                return Err(format!("Class {} has no training samples.", class).into());
            }
            let count = member_rows.len() as f64;
            priors[c] = count / n_samples as f64;

            for j in 0..n_features {
                let mut sum = 0.0;
                for &i in &member_rows {
                    sum += features[[i, j]];
                }
                let mu = sum / count;
                means[[c, j]] = mu;

                let mut sq = 0.0;
                for &i in &member_rows {
                    sq += (features[[i, j]] - mu).powi(2);
                }
                variances[[c, j]] = sq / count + epsilon;
            }
        }
        info!(
            "fitted Gaussian naive Bayes: {} classes, {} features, {} samples",
            n_classes, n_features, n_samples
        );

        Ok(Self {
            classes,
            priors,
            means,
            variances,
        })
    }

    /// Feature width the model was trained on.
    pub fn n_features(&self) -> usize {
        self.means.ncols()
    }

    /// Distinct class labels the model knows, ascending.
    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    /// Predicts the arg-max posterior class per row.
    ///
    /// # Errors
    /// Returns an error if the input width differs from the width the
    /// model was trained on.
    pub fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>, Box<dyn Error>> {
        if features.ncols() != self.n_features() {
            return Err(format!(
                "Input has {} features but the model was trained on {}.",
                features.ncols(),
                self.n_features()
            )
            .into());
        }

        let mut predictions = Vec::with_capacity(features.nrows());
        for row in features.rows() {
            let mut best_class = self.classes[0];
            let mut best_score = f64::NEG_INFINITY;
            for (c, &class) in self.classes.iter().enumerate() {
                // log P(c) - 1/2 sum_j [ ln(2 pi s^2) + (x - mu)^2 / s^2 ]
                let mut score = self.priors[c].ln();
                for (j, &x) in row.iter().enumerate() {
                    let mu = self.means[[c, j]];
                    let var = self.variances[[c, j]];
                    score -= 0.5
                        * ((2.0 * std::f64::consts::PI * var).ln() + (x - mu).powi(2) / var);
                }
                if score > best_score {
                    best_score = score;
                    best_class = class;
                }
            }
            predictions.push(best_class);
        }
        Ok(predictions)
    }
}

/// Fraction of exact matches between predicted and actual labels.
///
/// # Errors
/// Returns an error on empty inputs (0/0 must not silently become NaN
/// or 0) or on a length mismatch.
pub fn accuracy(predicted: &[usize], actual: &[usize]) -> Result<f64, Box<dyn Error>> {
    if predicted.is_empty() || actual.is_empty() {
        return Err("Cannot score accuracy on empty label sequences.".into());
    }
    if predicted.len() != actual.len() {
        return Err(format!(
            "Predicted ({}) and actual ({}) label counts differ.",
            predicted.len(),
            actual.len()
        )
        .into());
    }
    let matches = predicted
        .iter()
        .zip(actual.iter())
        .filter(|(p, a)| p == a)
        .count();
    Ok(matches as f64 / actual.len() as f64)
}

/// Predicted-label grid over a regular 2-D mesh, plus the axis
/// coordinates the grid was evaluated at. `labels[[i, j]]` is the
/// prediction at `(x_coords[j], y_coords[i])`.
#[derive(Debug, Clone)]
pub struct DecisionRegion {
    pub labels: Array2<usize>,
    pub x_coords: Array1<f64>,
    pub y_coords: Array1<f64>,
}

/// Classifies every point of a regular grid spanning each feature's
/// observed min - 1 to max + 1 at the given step.
///
/// Only defined for exactly two features: both the observed feature
/// matrix and the model must be 2-wide.
///
/// # Errors
/// Returns an error if `features` is empty or not 2 columns wide, if
/// the model was not trained on exactly 2 features, or if `step` is not
/// strictly positive.
pub fn decision_region(
    model: &GaussianNb,
    features: &Array2<f64>,
    step: f64,
) -> Result<DecisionRegion, Box<dyn Error>> {
    if features.nrows() == 0 {
        return Err("Cannot derive a decision region from zero samples.".into());
    }
    if features.ncols() != 2 {
        return Err(format!(
            "Decision regions are only defined for exactly 2 features, got {}.",
            features.ncols()
        )
        .into());
    }
    if model.n_features() != 2 {
        return Err(format!(
            "Decision regions need a 2-feature model, this one was trained on {}.",
            model.n_features()
        )
        .into());
    }
    if !(step > 0.0) {
        return Err(format!("Grid step must be strictly positive, got {}.", step).into());
    }

    let x_col = features.column(0);
    let y_col = features.column(1);
    let x_min = x_col.iter().cloned().fold(f64::INFINITY, f64::min) - 1.0;
    let x_max = x_col.iter().cloned().fold(f64::NEG_INFINITY, f64::max) + 1.0;
    let y_min = y_col.iter().cloned().fold(f64::INFINITY, f64::min) - 1.0;
    let y_max = y_col.iter().cloned().fold(f64::NEG_INFINITY, f64::max) + 1.0;

    let x_coords = Array1::from_iter(
        (0..)
            .map(|i| x_min + i as f64 * step)
            .take_while(|&v| v < x_max),
    );
    let y_coords = Array1::from_iter(
        (0..)
            .map(|i| y_min + i as f64 * step)
            .take_while(|&v| v < y_max),
    );

    // One batched prediction over the flattened mesh, row-major with x
    // varying fastest.
    let mut grid_points = Array2::<f64>::zeros((x_coords.len() * y_coords.len(), 2));
    for (i, &y) in y_coords.iter().enumerate() {
        for (j, &x) in x_coords.iter().enumerate() {
            let r = i * x_coords.len() + j;
            grid_points[[r, 0]] = x;
            grid_points[[r, 1]] = y;
        }
    }
    let flat = model.predict(&grid_points)?;
    let labels = Array2::from_shape_vec((y_coords.len(), x_coords.len()), flat)
        .map_err(|e| format!("Failed to shape the decision grid: {}", e))?;

    Ok(DecisionRegion {
        labels,
        x_coords,
        y_coords,
    })
}

//! Principal component engine: fitting, projection and inverse projection.
//!
//! The decomposition is exact. When `n_features <= n_samples` the
//! covariance matrix (d x d) is eigendecomposed directly; otherwise the
//! Gram matrix (n x n) is decomposed and its eigenvectors are mapped back
//! into feature space, which keeps the cost at `min(n, d)^3` for wide
//! image matrices.

use ndarray::{s, Array1, Array2, Axis};
use ndarray_linalg::{Eigh, UPLO};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Which slice of the component spectrum a projection should use.
///
/// `Leading(k)` keeps the `k` highest-variance directions and is an
/// ordinary truncated fit. `Trailing(k)` keeps the `k` lowest-variance
/// directions; those are only meaningful relative to the complete
/// decomposition, so the full basis is fitted first and the trailing
/// columns are sliced out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentSelection {
    Leading(usize),
    Trailing(usize),
}

impl ComponentSelection {
    /// Number of components the selection yields.
    pub fn count(&self) -> usize {
        match *self {
            ComponentSelection::Leading(k) | ComponentSelection::Trailing(k) => k,
        }
    }

    /// Short tag for naming per-selection output artifacts,
    /// e.g. `"60"` or `"6last"`.
    pub fn label(&self) -> String {
        match *self {
            ComponentSelection::Leading(k) => format!("{}", k),
            ComponentSelection::Trailing(k) => format!("{}last", k),
        }
    }
}

impl fmt::Display for ComponentSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ComponentSelection::Leading(k) => write!(f, "leading {} components", k),
            ComponentSelection::Trailing(k) => write!(f, "trailing {} components", k),
        }
    }
}

/// A fitted principal component basis.
///
/// Holds the rotation matrix (one column per component, unit length,
/// ordered by descending explained variance), the mean vector the fit
/// centered on, and the per-component explained variance. The mean here
/// lives in the fit's own input domain; it is not the `Standardizer`
/// mean, and the two must not be conflated.
///
/// A basis produced by a `Trailing` selection is a derived view over a
/// full decomposition: it carries only the trailing component columns
/// but the same mean and the same `source_rank` as the full fit, so
/// inverse projection through it is well defined.
#[derive(Serialize, Deserialize, Debug)]
pub struct Pca {
    /// Shape: (n_features, k_components).
    rotation: Option<Array2<f64>>,
    /// Centering point computed at fit time. Shape: (n_features).
    mean: Option<Array1<f64>>,
    /// Eigenvalues of the covariance matrix, descending. Shape: (k_components).
    explained_variance: Option<Array1<f64>>,
    /// Fraction of total variance per kept component. Shape: (k_components).
    explained_variance_ratio: Option<Array1<f64>>,
    /// Rank of the decomposition this basis was taken from,
    /// i.e. `min(n_samples, n_features)` of the fitting matrix.
    source_rank: Option<usize>,
}

impl Default for Pca {
    fn default() -> Self {
        Self::new()
    }
}

impl Pca {
    /// Creates an empty, unfitted basis.
    pub fn new() -> Self {
        Self {
            rotation: None,
            mean: None,
            explained_variance: None,
            explained_variance_ratio: None,
            source_rank: None,
        }
    }

    fn from_parts(
        rotation: Array2<f64>,
        mean: Array1<f64>,
        explained_variance: Array1<f64>,
        explained_variance_ratio: Array1<f64>,
        source_rank: usize,
    ) -> Self {
        Self {
            rotation: Some(rotation),
            mean: Some(mean),
            explained_variance: Some(explained_variance),
            explained_variance_ratio: Some(explained_variance_ratio),
            source_rank: Some(source_rank),
        }
    }

    /// Returns the rotation matrix (n_features x k_components), if fitted.
    pub fn rotation(&self) -> Option<&Array2<f64>> {
        self.rotation.as_ref()
    }

    /// Returns the centering mean vector, if fitted.
    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.mean.as_ref()
    }

    /// Returns the explained variance per kept component, descending.
    pub fn explained_variance(&self) -> Option<&Array1<f64>> {
        self.explained_variance.as_ref()
    }

    /// Returns the explained-variance ratio per kept component.
    pub fn explained_variance_ratio(&self) -> Option<&Array1<f64>> {
        self.explained_variance_ratio.as_ref()
    }

    /// Rank of the decomposition this basis originates from.
    pub fn source_rank(&self) -> Option<usize> {
        self.source_rank
    }

    /// Number of components kept in this basis (0 if unfitted).
    pub fn n_components(&self) -> usize {
        self.rotation.as_ref().map_or(0, |r| r.ncols())
    }

    /// Fits the basis to the data.
    ///
    /// * `data_matrix` - Input data, shape (n_samples, n_features). The
    ///   matrix is consumed; centering happens in place.
    /// * `components` - `Some(k)` keeps the leading `k` directions,
    ///   `None` keeps the full basis (all `min(n_samples, n_features)`
    ///   directions).
    ///
    /// The fit centers on its own column mean. It does not rescale;
    /// feature standardization is a separate, earlier step.
    ///
    /// # Errors
    /// Returns an error if the matrix has zero rows or columns, fewer
    /// than 2 samples, if `k` exceeds `min(n_samples, n_features)`, or
    /// if the eigendecomposition fails.
    pub fn fit(
        &mut self,
        mut data_matrix: Array2<f64>,
        components: Option<usize>,
    ) -> Result<(), Box<dyn Error>> {
        let n_samples = data_matrix.nrows();
        let n_features = data_matrix.ncols();

        if n_samples == 0 || n_features == 0 {
            return Err("Input matrix has zero samples or zero features.".into());
        }
        if n_samples < 2 {
            return Err("Input matrix must have at least 2 samples.".into());
        }

        let available = std::cmp::min(n_samples, n_features);
        let keep = match components {
            Some(k) if k > available => {
                return Err(format!(
                    "Requested {} components but only {} are available for a {}x{} matrix.",
                    k, available, n_samples, n_features
                )
                .into());
            }
            Some(k) => k,
            None => available,
        };
        info!(
            "fitting PCA on {}x{} matrix, keeping {} of {} components",
            n_samples, n_features, keep, available
        );

        let mean_vector = data_matrix
            .mean_axis(Axis(0))
            .ok_or("Failed to compute mean of the data.")?;
        data_matrix -= &mean_vector;
        self.mean = Some(mean_vector);

        // Eigen pairs sorted by descending eigenvalue, plus the total
        // variance of the decomposition for the ratio curve.
        let (eig_pairs, total_variance) = if n_features <= n_samples {
            let mut cov_matrix = data_matrix.t().dot(&data_matrix);
            cov_matrix /= (n_samples - 1) as f64;

            let (vals, vecs) = cov_matrix
                .eigh(UPLO::Upper)
                .map_err(|e| format!("Eigen decomposition of covariance matrix failed: {}", e))?;

            let mut pairs: Vec<(f64, Array1<f64>)> = vals
                .into_iter()
                .zip(vecs.columns().into_iter().map(|col| col.to_owned()))
                .collect();
            pairs.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

            let total: f64 = pairs.iter().map(|(v, _)| v.max(0.0)).sum();
            (pairs, total)
        } else {
            // Gram trick: eigendecompose X X^T / (n-1) and map each
            // sample-space eigenvector u back to the feature-space axis
            // X^T u / sqrt(lambda * (n-1)).
            let mut gram_matrix = data_matrix.dot(&data_matrix.t());
            gram_matrix /= (n_samples - 1) as f64;

            let (vals, u_vecs) = gram_matrix
                .eigh(UPLO::Upper)
                .map_err(|e| format!("Eigen decomposition of Gram matrix failed: {}", e))?;

            let mut pairs: Vec<(f64, Array1<f64>)> = vals
                .into_iter()
                .zip(u_vecs.columns().into_iter().map(|col| col.to_owned()))
                .collect();
            pairs.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

            let total: f64 = pairs.iter().map(|(v, _)| v.max(0.0)).sum();

            let mapped: Vec<(f64, Array1<f64>)> = pairs
                .into_iter()
                .map(|(eigval, u_col)| {
                    let lam_sqrt = eigval.max(1e-12).sqrt();
                    let denom = lam_sqrt * ((n_samples - 1) as f64).sqrt();
                    let mut axis = data_matrix.t().dot(&u_col);
                    axis.mapv_inplace(|x| x / denom);
                    (eigval, axis)
                })
                .collect();
            (mapped, total)
        };

        if keep == 0 {
            self.rotation = Some(Array2::zeros((n_features, 0)));
            self.explained_variance = Some(Array1::zeros(0));
            self.explained_variance_ratio = Some(Array1::zeros(0));
            self.source_rank = Some(available);
            return Ok(());
        }

        let mut rotation_matrix = Array2::<f64>::zeros((n_features, keep));
        let mut kept_eigenvalues: Vec<f64> = Vec::with_capacity(keep);
        for (i, (eigval, mut axis)) in eig_pairs.into_iter().take(keep).enumerate() {
            kept_eigenvalues.push(eigval.max(0.0));
            // Unit-length columns; axes with vanishing norm carry no
            // variance and are stored as zero vectors.
            let norm = axis.dot(&axis).sqrt();
            if norm > 1e-9 {
                axis.mapv_inplace(|x| x / norm);
            } else {
                axis.fill(0.0);
            }
            rotation_matrix.slice_mut(s![.., i]).assign(&axis);
        }

        let explained_variance = Array1::from(kept_eigenvalues);
        let explained_variance_ratio = if total_variance > 1e-12 {
            &explained_variance / total_variance
        } else {
            Array1::zeros(explained_variance.len())
        };
        debug!(
            "kept eigenvalue range [{:.3e}, {:.3e}], total variance {:.3e}",
            explained_variance.last().copied().unwrap_or(0.0),
            explained_variance.first().copied().unwrap_or(0.0),
            total_variance
        );

        self.rotation = Some(rotation_matrix);
        self.explained_variance = Some(explained_variance);
        self.explained_variance_ratio = Some(explained_variance_ratio);
        self.source_rank = Some(available);
        Ok(())
    }

    /// Projects data into the component space: `(x - mean) . rotation`.
    ///
    /// # Errors
    /// Returns an error if the basis is unfitted or the input feature
    /// dimension does not match the basis.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, Box<dyn Error>> {
        let rotation_matrix = self
            .rotation
            .as_ref()
            .ok_or("PCA basis: rotation matrix not set. Fit a basis first.")?;
        let mean_vector = self
            .mean
            .as_ref()
            .ok_or("PCA basis: mean vector not set. Fit a basis first.")?;

        if x.ncols() != mean_vector.len() {
            return Err(format!(
                "Input feature dimension ({}) does not match basis feature dimension ({}).",
                x.ncols(),
                mean_vector.len()
            )
            .into());
        }
        if x.nrows() == 0 {
            return Ok(Array2::zeros((0, rotation_matrix.ncols())));
        }

        let centered = x - mean_vector;
        Ok(centered.dot(rotation_matrix))
    }

    /// Maps projected coordinates back into the basis's input space:
    /// `scores . rotation^T + mean`.
    ///
    /// For a trailing-component basis this yields an approximation built
    /// solely from low-variance directions; it is expected to sit close
    /// to the per-feature mean rather than resemble the sample.
    ///
    /// # Errors
    /// Returns an error if the basis is unfitted or the score width does
    /// not match the number of kept components.
    pub fn inverse_transform(&self, scores: &Array2<f64>) -> Result<Array2<f64>, Box<dyn Error>> {
        let rotation_matrix = self
            .rotation
            .as_ref()
            .ok_or("PCA basis: rotation matrix not set. Fit a basis first.")?;
        let mean_vector = self
            .mean
            .as_ref()
            .ok_or("PCA basis: mean vector not set. Fit a basis first.")?;

        if scores.ncols() != rotation_matrix.ncols() {
            return Err(format!(
                "Score width ({}) does not match the number of kept components ({}).",
                scores.ncols(),
                rotation_matrix.ncols()
            )
            .into());
        }

        Ok(scores.dot(&rotation_matrix.t()) + mean_vector)
    }

    /// Saves the fitted basis to a file using bincode.
    ///
    /// # Errors
    /// Returns an error if the basis is unfitted or if file I/O or
    /// serialization fails.
    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn Error>> {
        if self.rotation.is_none() || self.mean.is_none() {
            return Err("Cannot save an unfitted PCA basis (missing rotation or mean).".into());
        }
        let file = File::create(path.as_ref())
            .map_err(|e| format!("Failed to create file at {:?}: {}", path.as_ref(), e))?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| format!("Failed to serialize PCA basis: {}", e))?;
        Ok(())
    }

    /// Loads a basis previously saved with `save_model`, validating its
    /// internal consistency.
    ///
    /// # Errors
    /// Returns an error if file I/O or deserialization fails, or if the
    /// loaded basis has mismatched dimensions or invalid variances.
    pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error>> {
        let file = File::open(path.as_ref())
            .map_err(|e| format!("Failed to open file at {:?}: {}", path.as_ref(), e))?;
        let mut reader = BufReader::new(file);
        let basis: Pca =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
                .map_err(|e| format!("Failed to deserialize PCA basis: {}", e))?;

        let rotation = basis
            .rotation
            .as_ref()
            .ok_or("Loaded PCA basis is missing its rotation matrix.")?;
        let mean = basis
            .mean
            .as_ref()
            .ok_or("Loaded PCA basis is missing its mean vector.")?;
        if rotation.nrows() != mean.len() {
            return Err(format!(
                "Loaded PCA basis has inconsistent feature dimensions: rotation has {}, mean has {}.",
                rotation.nrows(),
                mean.len()
            )
            .into());
        }
        if let Some(ev) = basis.explained_variance.as_ref() {
            if ev.len() != rotation.ncols() {
                return Err(format!(
                    "Loaded PCA basis has {} variances for {} components.",
                    ev.len(),
                    rotation.ncols()
                )
                .into());
            }
            if ev.iter().any(|&v| !v.is_finite() || v < 0.0) {
                return Err(
                    "Loaded PCA basis has non-finite or negative explained variances.".into(),
                );
            }
        }
        if let Some(ratio) = basis.explained_variance_ratio.as_ref() {
            if ratio.len() != rotation.ncols() {
                return Err(format!(
                    "Loaded PCA basis has {} variance ratios for {} components.",
                    ratio.len(),
                    rotation.ncols()
                )
                .into());
            }
        }
        Ok(basis)
    }
}

/// Fits a basis for the given selection and projects the data through it.
///
/// * `Leading(k)` performs a truncated fit and returns the projected
///   coordinates together with the truncated basis.
/// * `Trailing(k)` fits the full basis, takes the trailing `k` score
///   columns (the lowest-variance directions), and returns them together
///   with a derived basis holding only those component vectors, the
///   full-fit mean and the full-fit rank, so the result remains usable
///   for `inverse_transform`.
///
/// # Errors
/// Returns an error on an empty matrix, on `Trailing(0)`, or when the
/// selection count exceeds `min(n_samples, n_features)`.
pub fn project(
    matrix: &Array2<f64>,
    selection: ComponentSelection,
) -> Result<(Array2<f64>, Pca), Box<dyn Error>> {
    match selection {
        ComponentSelection::Leading(k) => {
            let mut basis = Pca::new();
            basis.fit(matrix.clone(), Some(k))?;
            let scores = basis.transform(matrix)?;
            Ok((scores, basis))
        }
        ComponentSelection::Trailing(k) => {
            if k == 0 {
                return Err("Trailing selection requires at least 1 component.".into());
            }
            let mut full = Pca::new();
            full.fit(matrix.clone(), None)?;
            let full_scores = full.transform(matrix)?;

            let rank = full.n_components();
            if k > rank {
                return Err(format!(
                    "Requested the trailing {} components but the full decomposition only has {}.",
                    k, rank
                )
                .into());
            }

            let scores = full_scores.slice(s![.., rank - k..]).to_owned();
            let rotation = full
                .rotation()
                .ok_or("Internal error: full fit produced no rotation matrix.")?
                .slice(s![.., rank - k..])
                .to_owned();
            let explained_variance = full
                .explained_variance()
                .ok_or("Internal error: full fit produced no explained variance.")?
                .slice(s![rank - k..])
                .to_owned();
            let explained_variance_ratio = full
                .explained_variance_ratio()
                .ok_or("Internal error: full fit produced no variance ratios.")?
                .slice(s![rank - k..])
                .to_owned();
            let mean = full
                .mean()
                .ok_or("Internal error: full fit produced no mean vector.")?
                .clone();
            let source_rank = full.source_rank().unwrap_or(rank);

            let basis = Pca::from_parts(
                rotation,
                mean,
                explained_variance,
                explained_variance_ratio,
                source_rank,
            );
            Ok((scores, basis))
        }
    }
}

/// Cumulative explained-variance ratios of a full decomposition of the
/// given matrix, for variance-curve reporting.
///
/// # Errors
/// Propagates any fit failure.
pub fn cumulative_variance_ratio(matrix: &Array2<f64>) -> Result<Array1<f64>, Box<dyn Error>> {
    let mut full = Pca::new();
    full.fit(matrix.clone(), None)?;
    let ratios = full
        .explained_variance_ratio()
        .ok_or("Internal error: full fit produced no variance ratios.")?;
    let mut running = 0.0;
    Ok(ratios.mapv(|r| {
        running += r;
        running
    }))
}

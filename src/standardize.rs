//! Per-feature standardization (zero mean, unit variance) with an exact
//! inverse, fit once on a reference matrix and reused for every later
//! transform of matrices sharing the same column space.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::error::Error;

/// Divisors below this are treated as zero-variance and replaced by 1.0,
/// so constant columns pass through centering unscaled instead of
/// producing a division by zero.
const SCALE_SANITIZATION_THRESHOLD: f64 = 1e-9;

/// Column-wise mean/standard-deviation state.
///
/// The stored scale vector is sanitized: it contains only positive,
/// finite values. State is a pure value; `transform` and
/// `inverse_transform` never mutate it.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Standardizer {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl Standardizer {
    /// Computes column-wise mean and standard deviation over the matrix.
    ///
    /// # Errors
    /// Returns an error if the matrix has zero rows or zero columns.
    pub fn fit(matrix: &Array2<f64>) -> Result<Self, Box<dyn Error>> {
        if matrix.nrows() == 0 || matrix.ncols() == 0 {
            return Err("Cannot fit a standardizer on an empty matrix.".into());
        }

        let mean = matrix
            .mean_axis(Axis(0))
            .ok_or("Failed to compute column means.")?;
        let std_dev = matrix.map_axis(Axis(0), |column| column.std(0.0));
        let scale = std_dev.mapv(|s| {
            if s.is_finite() && s.abs() > SCALE_SANITIZATION_THRESHOLD {
                s
            } else {
                1.0
            }
        });

        Ok(Self { mean, scale })
    }

    /// Returns the fitted column means.
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Returns the sanitized column standard deviations (all positive).
    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    /// Subtracts the mean and divides by the standard deviation,
    /// column-wise.
    ///
    /// # Errors
    /// Returns an error if the input column count does not match the
    /// fitted state.
    pub fn transform(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, Box<dyn Error>> {
        self.check_width(matrix)?;
        Ok((matrix - &self.mean) / &self.scale)
    }

    /// Reverses `transform` exactly: multiplies by the standard
    /// deviation and adds the mean back.
    ///
    /// # Errors
    /// Returns an error if the input column count does not match the
    /// fitted state.
    pub fn inverse_transform(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, Box<dyn Error>> {
        self.check_width(matrix)?;
        Ok(matrix * &self.scale + &self.mean)
    }

    fn check_width(&self, matrix: &Array2<f64>) -> Result<(), Box<dyn Error>> {
        if matrix.ncols() != self.mean.len() {
            return Err(format!(
                "Input feature dimension ({}) does not match the fitted standardizer ({}).",
                matrix.ncols(),
                self.mean.len()
            )
            .into());
        }
        Ok(())
    }
}

//! Raw-domain reconstruction: standardize, project, invert the
//! projection, and undo the standardization, then clip into the valid
//! intensity range before narrowing to a storage type.

use ndarray::{Array2, ArrayView1};
use std::error::Error;

use crate::pca::{project, ComponentSelection};
use crate::standardize::Standardizer;

/// Reconstructs every row of `raw` through the reduced subspace chosen
/// by `selection`.
///
/// Composition: `Standardizer^-1 . Pca^-1 . Pca . Standardizer`. The
/// result lives in the raw intensity domain but is continuous;
/// truncation error routinely pushes values slightly outside the valid
/// range, so clip with [`to_intensity_bytes`] before storing pixels.
///
/// # Errors
/// Propagates standardizer width mismatches and projection failures.
pub fn reconstruct(
    raw: &Array2<f64>,
    scaler: &Standardizer,
    selection: ComponentSelection,
) -> Result<Array2<f64>, Box<dyn Error>> {
    let standardized = scaler.transform(raw)?;
    let (scores, basis) = project(&standardized, selection)?;
    let approximation = basis.inverse_transform(&scores)?;
    scaler.inverse_transform(&approximation)
}

/// Clips each value into [0, 255] and narrows to `u8`.
///
/// Clipping happens here, after inverse standardization, never before;
/// narrowing truncates the fractional part.
pub fn to_intensity_bytes(values: ArrayView1<f64>) -> Vec<u8> {
    values.iter().map(|&v| v.clamp(0.0, 255.0) as u8).collect()
}

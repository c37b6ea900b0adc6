//! Builds the numeric feature matrix from decoded image records.
//!
//! Rows of the matrix, the label vector and the shape list are parallel
//! sequences indexed by sample position; that correspondence is an
//! invariant every downstream transform preserves.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::error::Error;

/// Original dimensions of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl ImageShape {
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Flattened length: `height * width * channels`.
    pub fn len(&self) -> usize {
        self.height * self.width * self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One decoded image with its label, as handed over by the dataset
/// collaborator. Pixels are flattened in row-major order.
#[derive(Debug, Clone)]
pub struct LabeledImage {
    pub pixels: Vec<u8>,
    pub shape: ImageShape,
    pub label: usize,
}

impl LabeledImage {
    pub fn new(pixels: Vec<u8>, shape: ImageShape, label: usize) -> Self {
        Self {
            pixels,
            shape,
            label,
        }
    }
}

/// Flattened raw feature matrix with its parallel label vector and
/// per-sample shape list. Immutable once built.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub matrix: Array2<f64>,
    pub labels: Vec<usize>,
    pub shapes: Vec<ImageShape>,
}

impl FeatureMatrix {
    pub fn n_samples(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.matrix.ncols()
    }
}

/// Turns a collection of decoded images into a feature matrix.
///
/// All images must share a common flattened length; the collection
/// must be non-empty.
///
/// # Errors
/// Returns an error on an empty collection, on a sample whose pixel
/// buffer disagrees with its declared shape, or on ragged flattened
/// lengths across samples.
pub fn build_feature_matrix(images: &[LabeledImage]) -> Result<FeatureMatrix, Box<dyn Error>> {
    if images.is_empty() {
        return Err("Cannot build a feature matrix from zero images.".into());
    }

    let n_features = images[0].shape.len();
    let n_samples = images.len();

    let mut matrix = Array2::<f64>::zeros((n_samples, n_features));
    let mut labels = Vec::with_capacity(n_samples);
    let mut shapes = Vec::with_capacity(n_samples);

    for (i, image) in images.iter().enumerate() {
        if image.pixels.len() != image.shape.len() {
            return Err(format!(
                "Sample {}: pixel buffer has {} values but its shape {}x{}x{} implies {}.",
                i,
                image.pixels.len(),
                image.shape.height,
                image.shape.width,
                image.shape.channels,
                image.shape.len()
            )
            .into());
        }
        if image.pixels.len() != n_features {
            return Err(format!(
                "Sample {}: flattened length {} differs from the first sample's {}.",
                i,
                image.pixels.len(),
                n_features
            )
            .into());
        }
        for (j, &p) in image.pixels.iter().enumerate() {
            matrix[[i, j]] = f64::from(p);
        }
        labels.push(image.label);
        shapes.push(image.shape);
    }

    Ok(FeatureMatrix {
        matrix,
        labels,
        shapes,
    })
}

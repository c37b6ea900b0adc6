// PCA subspace analysis for image datasets

#![doc = include_str!("../README.md")]

pub mod analysis;
pub mod classify;
pub mod dataset;
pub mod features;
pub mod pca;
pub mod reconstruct;
pub mod standardize;

pub use analysis::{
    evaluate_subsets, project_for_scatter, run_reconstructions, train_test_split, AnalysisConfig,
    ReconstructionArtifact, ScatterProjection, SubsetEvaluation,
};
pub use classify::{accuracy, decision_region, DecisionRegion, GaussianNb};
pub use dataset::{ClassInfo, DatasetLayout};
pub use features::{build_feature_matrix, FeatureMatrix, ImageShape, LabeledImage};
pub use pca::{cumulative_variance_ratio, project, ComponentSelection, Pca};
pub use reconstruct::{reconstruct, to_intensity_bytes};
pub use standardize::Standardizer;

#[cfg(test)]
mod pca_tests;

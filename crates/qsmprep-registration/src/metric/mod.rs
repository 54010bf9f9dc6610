//! Similarity metrics and the cost function the optimizer drives.

pub mod trait_;
pub mod histogram;
pub mod mattes;
pub mod mean_squares;
pub mod cost;

pub use trait_::{MetricKind, MetricSamples, SimilarityMetric};
pub use histogram::ParzenJointHistogram;
pub use mattes::MattesMutualInformation;
pub use mean_squares::MeanSquares;
pub use cost::{MetricCost, MIN_VALID_SAMPLES};

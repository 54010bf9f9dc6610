//! Intensity-based rigid and affine registration.
//!
//! [`RegistrationEngine::estimate_transform`] aligns a moving volume to a
//! fixed one: centred initialisation, a coarse-to-fine pyramid, a
//! Mattes-style mutual information metric on a seeded subsample of the
//! fixed image, and regular-step gradient descent on physically scaled
//! parameters. Derivatives come from burn's autodiff, so the engine runs
//! on any `AutodiffBackend`.

pub mod config;
pub mod engine;
pub mod error;
pub mod initializer;
pub mod metric;
pub mod optimizer;
pub mod progress;
pub mod result;
pub mod sampling;
pub mod scales;
pub mod validation;

pub use config::RegistrationConfig;
pub use engine::RegistrationEngine;
pub use error::{RegistrationError, Result};
pub use initializer::{CenteredInitializer, InitializerMode};
pub use metric::{MetricKind, SimilarityMetric};
pub use optimizer::{Optimizer, RegularStepGradientDescent, StopCondition};
pub use progress::{ConsoleProgressCallback, HistoryCallback, ProgressCallback, ProgressInfo};
pub use result::{LevelReport, RegistrationResult};
pub use sampling::SamplingStrategy;

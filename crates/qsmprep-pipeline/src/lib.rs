//! Carrying one registration to every volume of a case, for many cases.
//!
//! [`TransformPropagation`] runs a case through Estimate, Apply-Primary and
//! Apply-Dependents over pluggable storage ([`VolumeSource`],
//! [`VolumeSink`], [`TransformStore`]). Batch work discovers cases with a
//! [`CaseDiscovery`] and runs them in parallel with [`BatchRunner`].

pub mod batch;
pub mod config;
pub mod deadline;
pub mod discovery;
pub mod error;
pub mod inspect;
pub mod propagate;
pub mod report;
pub mod store;

pub use batch::{BatchRunner, BatchSummary, Manifest};
pub use config::PipelineConfig;
pub use deadline::with_deadline;
pub use discovery::{CaseDescriptor, CaseDiscovery, FilePattern, LayoutConfig, VisitLayout};
pub use error::{ErrorKind, PipelineError, Result, Stage};
pub use inspect::{inspect_consistency, ConsistencyReport};
pub use propagate::TransformPropagation;
pub use report::{ApplyStatus, CaseReport, CaseStatus, DependentOutcome, RegistrationSummary};
pub use store::{FileStore, MemoryStore, TransformStore, VolumeSink, VolumeSource};

//! Per-case outcome of a pipeline run.

use serde::{Deserialize, Serialize};

use qsmprep_core::{InterpolationPolicy, Transform, TransformKind};
use qsmprep_registration::{LevelReport, RegistrationResult};

use crate::error::{ErrorKind, PipelineError, Stage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApplyStatus {
    Applied { output_key: String },
    Failed { kind: ErrorKind, message: String },
}

/// Result of resampling one volume through the case transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentOutcome {
    pub key: String,
    /// Policy actually used, after pixel-type enforcement.
    pub policy: Option<InterpolationPolicy>,
    pub status: ApplyStatus,
}

impl DependentOutcome {
    pub fn applied(key: &str, policy: InterpolationPolicy, output_key: String) -> Self {
        Self {
            key: key.to_string(),
            policy: Some(policy),
            status: ApplyStatus::Applied { output_key },
        }
    }

    pub fn failed(key: &str, policy: Option<InterpolationPolicy>, err: &PipelineError) -> Self {
        Self {
            key: key.to_string(),
            policy,
            status: ApplyStatus::Failed {
                kind: err.kind(),
                message: err.to_string(),
            },
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self.status, ApplyStatus::Applied { .. })
    }
}

/// Convergence metadata of the Estimate stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationSummary {
    pub kind: TransformKind,
    pub iterations: usize,
    pub final_metric: f64,
    pub converged: bool,
    pub levels: Vec<LevelReport>,
}

impl From<&RegistrationResult> for RegistrationSummary {
    fn from(result: &RegistrationResult) -> Self {
        Self {
            kind: result.transform().kind(),
            iterations: result.iterations(),
            final_metric: result.final_metric(),
            converged: result.converged(),
            levels: result.levels().to_vec(),
        }
    }
}

/// Terminal state of a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CaseStatus {
    Success,
    /// Everything was applied, but registration stopped on the iteration
    /// cap rather than a convergence criterion.
    ConvergenceWarning,
    /// The transform and primary were produced; `failed` dependents were not.
    /// `converged` is false when registration also stopped on the cap.
    PartialSuccess { failed: usize, converged: bool },
    Failed { stage: Stage, kind: ErrorKind, message: String },
}

impl CaseStatus {
    pub fn name(&self) -> &'static str {
        match self {
            CaseStatus::Success => "success",
            CaseStatus::ConvergenceWarning => "convergence-warning",
            CaseStatus::PartialSuccess { .. } => "partial-success",
            CaseStatus::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    pub case_id: String,
    pub status: CaseStatus,
    /// Transform that carried the case's volumes into reference space.
    pub transform: Option<Transform>,
    pub registration: Option<RegistrationSummary>,
    pub primary: Option<DependentOutcome>,
    pub dependents: Vec<DependentOutcome>,
    pub elapsed_ms: u64,
}

impl CaseReport {
    pub(crate) fn new(case_id: &str) -> Self {
        Self {
            case_id: case_id.to_string(),
            status: CaseStatus::Success,
            transform: None,
            registration: None,
            primary: None,
            dependents: Vec::new(),
            elapsed_ms: 0,
        }
    }

    /// A case that never produced anything.
    pub fn failed(case_id: &str, stage: Stage, err: &PipelineError) -> Self {
        let mut report = Self::new(case_id);
        report.fail(stage, err);
        report
    }

    pub(crate) fn fail(&mut self, stage: Stage, err: &PipelineError) {
        tracing::error!(case = %self.case_id, %stage, error = %err, "case failed");
        self.status = CaseStatus::Failed {
            stage,
            kind: err.kind(),
            message: err.to_string(),
        };
    }

    /// Settle the status once every dependent has been attempted.
    pub(crate) fn conclude(&mut self) {
        if matches!(self.status, CaseStatus::Failed { .. }) {
            return;
        }
        let failed = self.dependents.iter().filter(|d| !d.is_applied()).count();
        let converged = self.registration.as_ref().map_or(true, |r| r.converged);
        self.status = if failed > 0 {
            tracing::warn!(
                case = %self.case_id,
                failed,
                total = self.dependents.len(),
                converged,
                "case finished with failed dependents"
            );
            if !converged {
                tracing::warn!(case = %self.case_id, "registration did not converge");
            }
            CaseStatus::PartialSuccess { failed, converged }
        } else if !converged {
            tracing::warn!(case = %self.case_id, "case finished but registration did not converge");
            CaseStatus::ConvergenceWarning
        } else {
            CaseStatus::Success
        };
    }

    /// Only a fully applied, converged case counts.
    pub fn is_success(&self) -> bool {
        self.status == CaseStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, CaseStatus::Failed { .. })
    }

    pub fn failed_dependents(&self) -> impl Iterator<Item = &DependentOutcome> {
        self.dependents.iter().filter(|d| !d.is_applied())
    }

    /// One line naming the case, and the failed stage if there is one.
    pub fn describe(&self) -> String {
        match &self.status {
            CaseStatus::Failed { stage, kind, message } => {
                format!("case '{}' failed at stage {} ({}): {}", self.case_id, stage, kind, message)
            }
            CaseStatus::PartialSuccess { failed, converged } => format!(
                "case '{}' partially succeeded: {} of {} dependents failed{}",
                self.case_id,
                failed,
                self.dependents.len(),
                if *converged { "" } else { "; registration did not converge" }
            ),
            status => format!("case '{}': {}", self.case_id, status.name()),
        }
    }
}

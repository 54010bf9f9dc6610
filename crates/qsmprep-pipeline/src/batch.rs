//! Parallel execution of independent cases.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::discovery::CaseDescriptor;
use crate::error::{PipelineError, Result, Stage};
use crate::report::{CaseReport, CaseStatus};

/// Append-only JSON-lines record of finished cases, shared by all workers.
#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl Manifest {
    /// Open `path` for appending, creating it and its parent directory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, report: &CaseReport) -> Result<()> {
        let line = serde_json::to_string(report)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| PipelineError::Worker("manifest writer poisoned".to_string()))?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }

    /// Every report recorded in a manifest file.
    pub fn read(path: &Path) -> Result<Vec<CaseReport>> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::missing(format!("manifest {}", path.display()))
            } else {
                PipelineError::File(e)
            }
        })?;
        let mut reports = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            reports.push(serde_json::from_str(&line)?);
        }
        Ok(reports)
    }
}

/// Counts per terminal state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub success: usize,
    pub convergence_warning: usize,
    pub partial_success: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

impl BatchSummary {
    pub fn from_reports(reports: &[CaseReport]) -> Self {
        let mut summary = Self {
            total: reports.len(),
            ..Self::default()
        };
        for report in reports {
            match report.status {
                CaseStatus::Success => summary.success += 1,
                CaseStatus::ConvergenceWarning => summary.convergence_warning += 1,
                CaseStatus::PartialSuccess { .. } => summary.partial_success += 1,
                CaseStatus::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }

    pub fn all_succeeded(&self) -> bool {
        self.success == self.total
    }
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} cases: {} succeeded, {} unconverged, {} partial, {} failed ({:.1}s)",
            self.total,
            self.success,
            self.convergence_warning,
            self.partial_success,
            self.failed,
            self.elapsed_ms as f64 / 1000.0
        )
    }
}

/// Runs cases on a rayon pool. Cases share nothing; one failing or
/// panicking case never stops the others.
#[derive(Debug, Clone, Default)]
pub struct BatchRunner {
    threads: Option<usize>,
}

impl BatchRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Worker count; defaults to the number of CPU cores.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads.max(1));
        self
    }

    pub fn run<F>(
        &self,
        cases: &[CaseDescriptor],
        manifest: Option<&Manifest>,
        job: F,
    ) -> Result<(Vec<CaseReport>, BatchSummary)>
    where
        F: Fn(&CaseDescriptor) -> CaseReport + Send + Sync,
    {
        let started = Instant::now();
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("qsmprep-case-{}", i));
        if let Some(threads) = self.threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|e| PipelineError::invalid_configuration(format!("cannot build worker pool: {}", e)))?;
        tracing::info!(cases = cases.len(), workers = pool.current_num_threads(), "starting batch");

        let reports: Vec<CaseReport> = pool.install(|| {
            cases
                .par_iter()
                .map(|case| {
                    let report = catch_unwind(AssertUnwindSafe(|| job(case))).unwrap_or_else(|panic| {
                        let message = panic
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "case worker panicked".to_string());
                        CaseReport::failed(&case.id, Stage::Batch, &PipelineError::Worker(message))
                    });
                    if let Some(manifest) = manifest {
                        if let Err(err) = manifest.append(&report) {
                            tracing::error!(case = %case.id, error = %err, "could not record case in manifest");
                        }
                    }
                    if report.is_success() {
                        tracing::info!("{}", report.describe());
                    } else {
                        tracing::warn!("{}", report.describe());
                    }
                    report
                })
                .collect()
        });

        let mut summary = BatchSummary::from_reports(&reports);
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(%summary, "batch finished");
        Ok((reports, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn case(id: &str) -> CaseDescriptor {
        CaseDescriptor {
            id: id.to_string(),
            patient: "p".to_string(),
            visit: "2020".to_string(),
            directory: PathBuf::from("."),
            files: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    #[test]
    fn test_failures_and_panics_are_isolated() {
        let cases: Vec<_> = ["a", "b", "c", "d"].iter().map(|id| case(id)).collect();
        let (reports, summary) = BatchRunner::new()
            .with_threads(2)
            .run(&cases, None, |case| match case.id.as_str() {
                "b" => CaseReport::failed(&case.id, Stage::Load, &PipelineError::missing("t1")),
                "c" => panic!("worker blew up"),
                _ => {
                    let mut report = CaseReport::new(&case.id);
                    report.conclude();
                    report
                }
            })
            .unwrap();

        assert_eq!(reports.len(), 4);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.success, 2);
        assert_eq!(summary.failed, 2);
        assert!(!summary.all_succeeded());
        let panicked = reports.iter().find(|r| r.case_id == "c").unwrap();
        assert!(matches!(panicked.status, CaseStatus::Failed { stage: Stage::Batch, .. }));
    }

    #[test]
    fn test_manifest_collects_every_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("manifest.jsonl");
        let manifest = Manifest::open(&path).unwrap();
        let cases: Vec<_> = (0..6).map(|i| case(&format!("case-{}", i))).collect();
        BatchRunner::new()
            .run(&cases, Some(&manifest), |case| CaseReport::failed(&case.id, Stage::Estimate, &PipelineError::missing("x")))
            .unwrap();
        drop(manifest);

        let mut ids: Vec<_> = Manifest::read(&path).unwrap().into_iter().map(|r| r.case_id).collect();
        ids.sort();
        assert_eq!(ids, (0..6).map(|i| format!("case-{}", i)).collect::<Vec<_>>());
    }
}

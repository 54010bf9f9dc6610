//! Case discovery over patient / visit directory trees.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// One unit of batch work: a patient visit and the files it provides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseDescriptor {
    /// `<root>/<patient>/<visit>`, unique across roots.
    pub id: String,
    pub patient: String,
    pub visit: String,
    /// Directory outputs are written to by default.
    pub directory: PathBuf,
    /// Input files found for each key. Keys whose file was not found are
    /// absent.
    pub files: BTreeMap<String, PathBuf>,
    /// Explicit output locations per key.
    pub outputs: BTreeMap<String, PathBuf>,
}

impl CaseDescriptor {
    pub fn file(&self, key: &str) -> Option<&Path> {
        self.files.get(key).map(PathBuf::as_path)
    }
}

pub trait CaseDiscovery {
    /// All cases, sorted by id.
    fn discover(&self) -> Result<Vec<CaseDescriptor>>;
}

/// Where [`VisitLayout`] looks for things.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Visit folders are the patient sub-folders starting with this prefix.
    pub visit_prefix: String,
    /// Sub-folder of a visit holding its images; `None` uses the visit
    /// folder itself.
    pub visit_subdir: Option<String>,
    /// Per-visit files, key to pattern.
    pub visit_files: BTreeMap<String, String>,
    /// Patient-level folders searched for `patient_files`.
    pub patient_dirs: Vec<String>,
    /// Files shared by all visits of a patient, key to pattern.
    pub patient_files: BTreeMap<String, String>,
    /// Output key to file name inside the visit directory.
    pub outputs: BTreeMap<String, String>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        let map = |pairs: &[(&str, &str)]| -> BTreeMap<String, String> {
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
        };
        Self {
            visit_prefix: "20".to_string(),
            visit_subdir: Some("registered".to_string()),
            visit_files: map(&[
                ("mag", "mag_canonical.nii.gz"),
                ("t1", "T1_corrected_canonical.nii.gz"),
                ("flair", "FLAIR_corrected_canonical.nii.gz"),
                ("t1_to_mag", "T1_corrected_canonical.nii_toMag_transform.tfm"),
            ]),
            patient_dirs: vec!["RESULTS_xnatSpaceMS".to_string()],
            patient_files: map(&[("lesions", "*lesion_labels.nii.gz")]),
            outputs: map(&[
                ("t1_to_mag", "T1_corrected_canonical.nii_toMag_transform.tfm"),
                ("t1_toMag", "T1_corrected_canonical.nii_toMag.nii.gz"),
                ("lesions_toMag", "lesions_MSpace_Mask.nii.gz"),
            ]),
        }
    }
}

/// A file-name pattern: an exact name, or `*suffix` matching any name
/// ending in `suffix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilePattern {
    Exact(String),
    Suffix(String),
}

impl FilePattern {
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_prefix('*') {
            Some(suffix) => FilePattern::Suffix(suffix.to_string()),
            None => FilePattern::Exact(pattern.to_string()),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            FilePattern::Exact(exact) => name == exact,
            FilePattern::Suffix(suffix) => name.ends_with(suffix.as_str()),
        }
    }

    /// First matching regular file in `dir`, by name order.
    pub fn find_in(&self, dir: &Path) -> Option<PathBuf> {
        if let FilePattern::Exact(name) = self {
            let path = dir.join(name);
            return path.is_file().then_some(path);
        }
        let mut names: Vec<_> = fs::read_dir(dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| self.matches(name))
            .collect();
        names.sort();
        names.into_iter().next().map(|name| dir.join(name))
    }
}

/// `<root>/<patient>/<visit prefix>*/<visit subdir>` trees.
#[derive(Debug, Clone)]
pub struct VisitLayout {
    roots: Vec<PathBuf>,
    config: LayoutConfig,
}

impl VisitLayout {
    pub fn new(roots: Vec<PathBuf>, config: LayoutConfig) -> Self {
        Self { roots, config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    fn patient_cases(&self, root_name: &str, patient_dir: &Path, patient: &str) -> Result<Vec<CaseDescriptor>> {
        let mut shared = BTreeMap::new();
        for (key, pattern) in &self.config.patient_files {
            let pattern = FilePattern::parse(pattern);
            let found = self
                .config
                .patient_dirs
                .iter()
                .map(|dir| patient_dir.join(dir))
                .filter(|dir| dir.is_dir())
                .find_map(|dir| pattern.find_in(&dir));
            match found {
                Some(path) => {
                    shared.insert(key.clone(), path);
                }
                None => tracing::debug!(patient, key = %key, "patient file not found"),
            }
        }

        let mut cases = Vec::new();
        for visit in sorted_subdirs(patient_dir)? {
            if !visit.starts_with(&self.config.visit_prefix) {
                continue;
            }
            let mut directory = patient_dir.join(&visit);
            if let Some(subdir) = &self.config.visit_subdir {
                directory = directory.join(subdir);
            }
            if !directory.is_dir() {
                tracing::warn!(patient, visit = %visit, dir = %directory.display(), "visit has no image folder, skipping");
                continue;
            }

            let mut files = shared.clone();
            for (key, pattern) in &self.config.visit_files {
                if let Some(path) = FilePattern::parse(pattern).find_in(&directory) {
                    files.insert(key.clone(), path);
                }
            }
            let outputs = self
                .config
                .outputs
                .iter()
                .map(|(key, name)| (key.clone(), directory.join(name)))
                .collect();
            cases.push(CaseDescriptor {
                id: format!("{}/{}/{}", root_name, patient, visit),
                patient: patient.to_string(),
                visit,
                directory,
                files,
                outputs,
            });
        }
        Ok(cases)
    }
}

impl CaseDiscovery for VisitLayout {
    fn discover(&self) -> Result<Vec<CaseDescriptor>> {
        let mut cases = Vec::new();
        for root in &self.roots {
            if !root.is_dir() {
                return Err(PipelineError::missing(format!("case root {}", root.display())));
            }
            let root_name = root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| root.display().to_string());
            for patient in sorted_subdirs(root)? {
                let found = self.patient_cases(&root_name, &root.join(&patient), &patient)?;
                tracing::debug!(root = %root_name, patient = %patient, visits = found.len(), "discovered patient");
                cases.extend(found);
            }
        }
        cases.sort_by(|a, b| a.id.cmp(&b.id));
        tracing::info!(cases = cases.len(), roots = self.roots.len(), "case discovery finished");
        Ok(cases)
    }
}

/// Names of the sub-directories of `dir`, sorted.
fn sorted_subdirs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns() {
        let exact = FilePattern::parse("mag_canonical.nii.gz");
        assert!(exact.matches("mag_canonical.nii.gz"));
        assert!(!exact.matches("x_mag_canonical.nii.gz"));
        let suffix = FilePattern::parse("*lesion_labels.nii.gz");
        assert_eq!(suffix, FilePattern::Suffix("lesion_labels.nii.gz".to_string()));
        assert!(suffix.matches("sub-01_lesion_labels.nii.gz"));
        assert!(!suffix.matches("lesion_labels.nii"));
    }

    #[test]
    fn test_missing_root_is_reported() {
        let layout = VisitLayout::new(vec![PathBuf::from("/nonexistent/qsmprep/root")], LayoutConfig::default());
        let err = layout.discover().unwrap_err();
        assert!(err.is_retryable());
    }
}

//! Pipeline configuration.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use qsmprep_core::{InterpolationPolicy, PixelType, TransformKind};
use qsmprep_registration::RegistrationConfig;

use crate::error::{PipelineError, Result};

/// Which volumes a case is made of and how each is treated.
///
/// Volumes are addressed by key; the storage layer maps keys to files or
/// memory. The reference key names the fixed space, the primary key the
/// modality registered to it, and every dependent key a volume carried
/// into the reference space with the primary's transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub reference_key: String,
    pub primary_key: String,
    pub dependent_keys: Vec<String>,
    /// Keys whose data are labels regardless of what the file header says.
    pub categorical_keys: BTreeSet<String>,
    /// Requested interpolation per key; never honoured when it would blend
    /// labels.
    pub interpolation_overrides: BTreeMap<String, InterpolationPolicy>,
    /// Key under which the estimated transform is persisted.
    pub transform_key: String,
    pub transform_kind: TransformKind,
    pub fill_value: f64,
    /// Deadline for the Estimate stage; `None` waits indefinitely.
    pub estimate_timeout_secs: Option<u64>,
    /// Dependents must sit on exactly the primary's grid.
    pub require_primary_grid: bool,
    /// Appended to a key to name its resampled output.
    pub output_suffix: String,
    pub registration: RegistrationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reference_key: "mag".to_string(),
            primary_key: "t1".to_string(),
            dependent_keys: vec!["flair".to_string(), "lesions".to_string()],
            categorical_keys: ["lesions".to_string()].into_iter().collect(),
            interpolation_overrides: BTreeMap::new(),
            transform_key: "t1_to_mag".to_string(),
            transform_kind: TransformKind::Affine,
            fill_value: 0.0,
            estimate_timeout_secs: None,
            require_primary_grid: false,
            output_suffix: "_toMag".to_string(),
            registration: RegistrationConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new(reference_key: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            reference_key: reference_key.into(),
            primary_key: primary_key.into(),
            dependent_keys: Vec::new(),
            categorical_keys: BTreeSet::new(),
            ..Self::default()
        }
    }

    /// Read a JSON configuration; absent fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::missing(format!("configuration {}", path.display()))
            } else {
                PipelineError::File(e)
            }
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_dependent(mut self, key: impl Into<String>, pixel_type: PixelType) -> Self {
        let key = key.into();
        if pixel_type == PixelType::Categorical {
            self.categorical_keys.insert(key.clone());
        }
        self.dependent_keys.push(key);
        self
    }

    pub fn with_override(mut self, key: impl Into<String>, policy: InterpolationPolicy) -> Self {
        self.interpolation_overrides.insert(key.into(), policy);
        self
    }

    pub fn with_transform_kind(mut self, kind: TransformKind) -> Self {
        self.transform_kind = kind;
        self
    }

    pub fn with_estimate_timeout(mut self, timeout: Duration) -> Self {
        self.estimate_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn with_registration(mut self, registration: RegistrationConfig) -> Self {
        self.registration = registration;
        self
    }

    pub fn with_require_primary_grid(mut self, required: bool) -> Self {
        self.require_primary_grid = required;
        self
    }

    pub fn estimate_timeout(&self) -> Option<Duration> {
        self.estimate_timeout_secs.map(Duration::from_secs)
    }

    pub fn is_categorical(&self, key: &str) -> bool {
        self.categorical_keys.contains(key)
    }

    /// Pixel type declared for `key`, overriding whatever the file suggests.
    ///
    /// The reference and primary are registered and resampled as
    /// intensities, so they are always continuous. Other keys are
    /// categorical when listed; `None` keeps the type the loader inferred.
    pub fn pixel_type_of(&self, key: &str) -> Option<PixelType> {
        if self.is_categorical(key) {
            Some(PixelType::Categorical)
        } else if key == self.reference_key || key == self.primary_key {
            Some(PixelType::Continuous)
        } else {
            None
        }
    }

    /// Name of the resampled output for `key`.
    pub fn output_key(&self, key: &str) -> String {
        format!("{}{}", key, self.output_suffix)
    }

    pub fn validate(&self) -> Result<()> {
        let keys = [&self.reference_key, &self.primary_key, &self.transform_key];
        if keys.iter().any(|k| k.trim().is_empty()) {
            return Err(PipelineError::invalid_configuration(
                "reference, primary and transform keys must be non-empty",
            ));
        }
        if self.reference_key == self.primary_key {
            return Err(PipelineError::invalid_configuration(format!(
                "primary key '{}' is also the reference key",
                self.primary_key
            )));
        }
        if self.is_categorical(&self.reference_key) || self.is_categorical(&self.primary_key) {
            return Err(PipelineError::invalid_configuration(
                "the reference and primary are intensity images and cannot be categorical",
            ));
        }
        let mut seen = BTreeSet::new();
        for key in &self.dependent_keys {
            if key == &self.reference_key || key == &self.primary_key {
                return Err(PipelineError::invalid_configuration(format!(
                    "dependent '{}' repeats the reference or primary key",
                    key
                )));
            }
            if !seen.insert(key) {
                return Err(PipelineError::invalid_configuration(format!("dependent '{}' listed twice", key)));
            }
        }
        if !self.fill_value.is_finite() {
            return Err(PipelineError::invalid_configuration("fill value must be finite"));
        }
        if self.estimate_timeout_secs == Some(0) {
            return Err(PipelineError::invalid_configuration("estimate timeout must be positive"));
        }
        self.registration.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_t1_to_magnitude_layout() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.transform_kind, TransformKind::Affine);
        assert!(config.is_categorical("lesions"));
        assert!(!config.is_categorical("flair"));
        assert_eq!(config.output_key("flair"), "flair_toMag");
    }

    #[test]
    fn test_declared_pixel_types() {
        let config = PipelineConfig::default();
        assert_eq!(config.pixel_type_of("mag"), Some(PixelType::Continuous));
        assert_eq!(config.pixel_type_of("t1"), Some(PixelType::Continuous));
        assert_eq!(config.pixel_type_of("lesions"), Some(PixelType::Categorical));
        assert_eq!(config.pixel_type_of("flair"), None);

        let mut labelled_primary = PipelineConfig::default();
        labelled_primary.categorical_keys.insert("t1".to_string());
        assert!(labelled_primary.validate().is_err());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "dependent_keys": ["mask"],
            "categorical_keys": ["mask"],
            "interpolation_overrides": {"mask": "linear"},
            "transform_kind": "rigid",
            "estimate_timeout_secs": 600
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.reference_key, "mag");
        assert_eq!(config.transform_kind, TransformKind::Rigid);
        assert_eq!(config.interpolation_overrides["mask"], InterpolationPolicy::Linear);
        assert_eq!(config.estimate_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.registration, RegistrationConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_overlapping_keys() {
        let config = PipelineConfig::new("mag", "mag");
        assert!(config.validate().is_err());
        let config = PipelineConfig::new("mag", "t1").with_dependent("t1", PixelType::Continuous);
        assert!(config.validate().is_err());
        let config = PipelineConfig::new("mag", "t1")
            .with_dependent("mask", PixelType::Categorical)
            .with_dependent("mask", PixelType::Categorical);
        assert!(config.validate().is_err());
    }
}

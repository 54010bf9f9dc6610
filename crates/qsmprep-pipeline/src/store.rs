//! Where case volumes and transforms come from and go to.
//!
//! The pipeline addresses everything by key. [`FileStore`] resolves keys to
//! NIfTI and transform files of one case; [`MemoryStore`] keeps them in
//! memory for tests and embedding.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use burn::tensor::backend::Backend;

use qsmprep_core::{Transform, Volume};

use crate::discovery::CaseDescriptor;
use crate::error::{PipelineError, Result};

pub trait VolumeSource<B: Backend> {
    fn load(&self, key: &str) -> Result<Volume<B>>;
}

pub trait VolumeSink<B: Backend> {
    fn store(&self, key: &str, volume: &Volume<B>) -> Result<()>;
}

/// Durable storage of estimated transforms.
pub trait TransformStore {
    fn save(&self, key: &str, transform: &Transform) -> Result<()>;

    /// # Errors
    /// `MissingResource` when nothing was saved under `key`.
    fn load(&self, key: &str) -> Result<Transform>;
}

/// Files of one case on disk.
///
/// Inputs are looked up in `inputs`. Outputs go to the path listed in
/// `outputs` for the key, or to `<output_dir>/<key>.nii.gz` (volumes) and
/// `<output_dir>/<key>.tfm` (transforms) otherwise.
#[derive(Debug, Clone)]
pub struct FileStore<B: Backend> {
    inputs: BTreeMap<String, PathBuf>,
    outputs: BTreeMap<String, PathBuf>,
    output_dir: PathBuf,
    device: B::Device,
}

impl<B: Backend> FileStore<B> {
    pub fn new(output_dir: impl Into<PathBuf>, device: B::Device) -> Self {
        Self {
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            output_dir: output_dir.into(),
            device,
        }
    }

    pub fn for_case(case: &CaseDescriptor, device: B::Device) -> Self {
        Self {
            inputs: case.files.clone(),
            outputs: case.outputs.clone(),
            output_dir: case.directory.clone(),
            device,
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.inputs.insert(key.into(), path.into());
        self
    }

    pub fn with_output(mut self, key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.outputs.insert(key.into(), path.into());
        self
    }

    pub fn input_path(&self, key: &str) -> Option<&Path> {
        self.inputs.get(key).map(PathBuf::as_path)
    }

    pub fn output_path(&self, key: &str, extension: &str) -> PathBuf {
        match self.outputs.get(key) {
            Some(path) => path.clone(),
            None => self.output_dir.join(format!("{}.{}", key, extension)),
        }
    }
}

impl<B: Backend> VolumeSource<B> for FileStore<B> {
    fn load(&self, key: &str) -> Result<Volume<B>> {
        let path = self
            .input_path(key)
            .ok_or_else(|| PipelineError::missing(format!("no file for '{}'", key)))?;
        Ok(qsmprep_io::load_volume(path, &self.device)?)
    }
}

impl<B: Backend> VolumeSink<B> for FileStore<B> {
    fn store(&self, key: &str, volume: &Volume<B>) -> Result<()> {
        let path = self.output_path(key, "nii.gz");
        qsmprep_io::save_volume(volume, &path)?;
        tracing::info!(key, path = %path.display(), "wrote volume");
        Ok(())
    }
}

impl<B: Backend> TransformStore for FileStore<B> {
    fn save(&self, key: &str, transform: &Transform) -> Result<()> {
        let path = self.output_path(key, "tfm");
        qsmprep_io::save_transform(transform, &path)?;
        tracing::info!(key, path = %path.display(), "persisted transform");
        Ok(())
    }

    /// Prefers a transform listed among the inputs, then the output
    /// location a previous run would have written.
    fn load(&self, key: &str) -> Result<Transform> {
        let path = match self.input_path(key) {
            Some(path) => path.to_path_buf(),
            None => self.output_path(key, "tfm"),
        };
        Ok(qsmprep_io::load_transform(&path)?)
    }
}

/// Keyed volumes and transforms held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore<B: Backend> {
    volumes: Mutex<BTreeMap<String, Volume<B>>>,
    transforms: Mutex<BTreeMap<String, Transform>>,
}

impl<B: Backend> MemoryStore<B> {
    pub fn new() -> Self {
        Self {
            volumes: Mutex::new(BTreeMap::new()),
            transforms: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_volume(self, key: impl Into<String>, volume: Volume<B>) -> Self {
        self.insert(key, volume);
        self
    }

    pub fn insert(&self, key: impl Into<String>, volume: Volume<B>) {
        lock(&self.volumes).insert(key.into(), volume);
    }

    pub fn get(&self, key: &str) -> Option<Volume<B>> {
        lock(&self.volumes).get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.volumes).contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.volumes).keys().cloned().collect()
    }
}

impl<B: Backend> VolumeSource<B> for MemoryStore<B> {
    fn load(&self, key: &str) -> Result<Volume<B>> {
        self.get(key)
            .ok_or_else(|| PipelineError::missing(format!("no volume stored under '{}'", key)))
    }
}

impl<B: Backend> VolumeSink<B> for MemoryStore<B> {
    fn store(&self, key: &str, volume: &Volume<B>) -> Result<()> {
        self.insert(key, volume.clone());
        Ok(())
    }
}

impl<B: Backend> TransformStore for MemoryStore<B> {
    fn save(&self, key: &str, transform: &Transform) -> Result<()> {
        lock(&self.transforms).insert(key.to_string(), transform.clone());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Transform> {
        lock(&self.transforms)
            .get(key)
            .cloned()
            .ok_or_else(|| PipelineError::missing(format!("no transform stored under '{}'", key)))
    }
}

/// A poisoned map still holds consistent entries; keep using it.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use qsmprep_core::{Point3, TransformKind};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_memory_store_reports_missing_keys() {
        let store = MemoryStore::<TestBackend>::new();
        let err = VolumeSource::load(&store, "t1").unwrap_err();
        assert!(err.is_retryable());
        let err = TransformStore::load(&store, "t1_to_mag").unwrap_err();
        assert!(matches!(err, PipelineError::MissingResource(_)));

        let t = Transform::identity(TransformKind::Rigid, Point3::origin());
        store.save("t1_to_mag", &t).unwrap();
        assert_eq!(TransformStore::load(&store, "t1_to_mag").unwrap(), t);
    }

    #[test]
    fn test_file_store_output_paths() {
        let store = FileStore::<TestBackend>::new("/data/case", Default::default())
            .with_output("lesions_toMag", "/data/case/lesions_MSpace_Mask.nii.gz");
        assert_eq!(store.output_path("flair_toMag", "nii.gz"), PathBuf::from("/data/case/flair_toMag.nii.gz"));
        assert_eq!(
            store.output_path("lesions_toMag", "nii.gz"),
            PathBuf::from("/data/case/lesions_MSpace_Mask.nii.gz")
        );
        assert!(VolumeSource::load(&store, "t1").unwrap_err().is_retryable());
    }
}

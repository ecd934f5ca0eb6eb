use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Deserialize;

use crate::inference::domain::tensor_engine::BackendKind;
use crate::shared::config_bag::ConfigBag;
use crate::shared::constants::MANIFEST_FILENAME;
use crate::shared::error::{FaceError, Result};

/// Where a model's weights live.
#[derive(Clone, Debug)]
pub enum ModelData {
    File(PathBuf),
    Buffer(Arc<[u8]>),
}

/// Immutable model weights plus the configuration that travels with them.
///
/// Shared between engine instances via `Arc`; nothing mutates a blob once
/// it has been loaded.
#[derive(Clone, Debug)]
pub struct ModelBlob {
    pub name: String,
    pub index: usize,
    /// Backend the weights were exported for, if the archive declares one.
    pub backend: Option<BackendKind>,
    pub data: ModelData,
    pub config: ConfigBag,
}

/// Handle through which stages obtain their model weights.
pub trait ModelSource: Send + Sync {
    fn read_model(&self, index: usize) -> Result<Arc<ModelBlob>>;

    fn load_named_model(&self, name: &str) -> Result<Arc<ModelBlob>>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Hand the engine the file path.
    #[default]
    File,
    /// Read the file into memory once and share the bytes.
    Buffer,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub index: usize,
    pub file: PathBuf,
    #[serde(default)]
    pub backend: Option<BackendKind>,
    #[serde(default)]
    pub config: ConfigBag,
    #[serde(default)]
    pub load: LoadMode,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Manifest {
    pub models: Vec<ManifestEntry>,
}

/// Models described by a `manifest.json` inside a directory.
///
/// Each blob is materialized on first request and the same `Arc` is handed
/// out afterwards.
pub struct DirectoryModelSource {
    root: PathBuf,
    manifest: Manifest,
    loaded: Mutex<HashMap<String, Arc<ModelBlob>>>,
}

impl DirectoryModelSource {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let manifest_path = root.join(MANIFEST_FILENAME);
        let text = fs::read_to_string(&manifest_path).map_err(|e| FaceError::Io {
            path: manifest_path.clone(),
            source: e,
        })?;
        let manifest: Manifest = serde_json::from_str(&text).map_err(|e| {
            FaceError::Configuration(format!("invalid {}: {e}", manifest_path.display()))
        })?;
        log::info!(
            "Model manifest {} lists {} models",
            manifest_path.display(),
            manifest.models.len()
        );
        Ok(Self {
            root,
            manifest,
            loaded: Mutex::new(HashMap::new()),
        })
    }

    /// Opens the platform default model directory.
    pub fn open_default() -> Result<Self> {
        Self::open(default_model_dir()?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.manifest.models
    }

    fn materialize(&self, entry: &ManifestEntry) -> Result<Arc<ModelBlob>> {
        let mut loaded = self.loaded.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(blob) = loaded.get(&entry.name) {
            return Ok(Arc::clone(blob));
        }

        let path = self.root.join(&entry.file);
        if !path.exists() {
            return Err(FaceError::ModelNotFound(format!(
                "{} ({})",
                entry.name,
                path.display()
            )));
        }
        let data = match entry.load {
            LoadMode::File => ModelData::File(path),
            LoadMode::Buffer => {
                let bytes = fs::read(&path).map_err(|e| FaceError::Io {
                    path: path.clone(),
                    source: e,
                })?;
                ModelData::Buffer(bytes.into())
            }
        };
        let blob = Arc::new(ModelBlob {
            name: entry.name.clone(),
            index: entry.index,
            backend: entry.backend,
            data,
            config: entry.config.clone(),
        });
        loaded.insert(entry.name.clone(), Arc::clone(&blob));
        Ok(blob)
    }
}

impl ModelSource for DirectoryModelSource {
    fn read_model(&self, index: usize) -> Result<Arc<ModelBlob>> {
        let entry = self
            .manifest
            .models
            .iter()
            .find(|m| m.index == index)
            .ok_or_else(|| FaceError::ModelNotFound(format!("model #{index}")))?;
        self.materialize(entry)
    }

    fn load_named_model(&self, name: &str) -> Result<Arc<ModelBlob>> {
        let entry = self
            .manifest
            .models
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| FaceError::ModelNotFound(name.to_string()))?;
        self.materialize(entry)
    }
}

/// Models held in memory, mostly for embedding and tests.
#[derive(Default)]
pub struct MemoryModelSource {
    blobs: Vec<Arc<ModelBlob>>,
}

impl MemoryModelSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, blob: ModelBlob) {
        self.blobs.retain(|b| b.name != blob.name);
        self.blobs.push(Arc::new(blob));
    }
}

impl ModelSource for MemoryModelSource {
    fn read_model(&self, index: usize) -> Result<Arc<ModelBlob>> {
        self.blobs
            .iter()
            .find(|b| b.index == index)
            .cloned()
            .ok_or_else(|| FaceError::ModelNotFound(format!("model #{index}")))
    }

    fn load_named_model(&self, name: &str) -> Result<Arc<ModelBlob>> {
        self.blobs
            .iter()
            .find(|b| b.name == name)
            .cloned()
            .ok_or_else(|| FaceError::ModelNotFound(name.to_string()))
    }
}

/// Platform-specific model directory.
///
/// - macOS: `~/Library/Application Support/facetrack/models/`
/// - Linux: `$XDG_CACHE_HOME/facetrack/models/` or `~/.cache/facetrack/models/`
/// - Windows: `%LOCALAPPDATA%/facetrack/models/`
pub fn default_model_dir() -> Result<PathBuf> {
    #[cfg(target_os = "macos")]
    let base = dirs::data_dir();
    #[cfg(not(target_os = "macos"))]
    let base = dirs::cache_dir();

    base.map(|d| d.join("facetrack").join("models"))
        .ok_or_else(|| FaceError::Configuration("could not determine model directory".into()))
}

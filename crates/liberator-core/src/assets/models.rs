//! 3D model files copied into `<project>/models/`

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use super::unique_name;

/// Directory of the project holding liberated models
pub const MODELS_DIR: &str = "models";

/// Extensions of model files that travel together when they share a stem
pub const MODEL_EXTS: &[&str] = &["wrl", "step", "stp", "wings", "vrml"];

/// Model files to copy, deduplicated by source path
#[derive(Debug, Clone, Default)]
pub struct ModelStore {
    /// File stems in use in the models directory
    taken: BTreeSet<String>,
    /// Source file -> file name inside the models directory
    sources: HashMap<PathBuf, String>,
    /// File name inside the models directory -> source file
    files: BTreeMap<String, PathBuf>,
}

impl ModelStore {
    /// Store for a project; files already in its models directory keep
    /// their names
    pub fn open(project_dir: &Path) -> Self {
        let mut store = ModelStore::default();
        if let Ok(entries) = fs::read_dir(project_dir.join(MODELS_DIR)) {
            for entry in entries.filter_map(|entry| entry.ok()) {
                if let Some(stem) = entry.path().file_stem() {
                    store.taken.insert(stem.to_string_lossy().into_owned());
                }
            }
        }
        store
    }

    /// Register the model at `path` and its same-stem companions; returns
    /// the file name the model gets in the models directory
    pub fn add(&mut self, path: &Path) -> String {
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if let Some(name) = self.sources.get(&key) {
            return name.clone();
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
        let new_stem = unique_name(&stem, &self.taken);
        self.taken.insert(new_stem.clone());

        let name = match &ext {
            Some(ext) => format!("{}.{}", new_stem, ext),
            None => new_stem.clone(),
        };
        self.files.insert(name.clone(), path.to_path_buf());
        self.sources.insert(key, name.clone());

        for companion_ext in MODEL_EXTS {
            if ext.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(companion_ext)) {
                continue;
            }
            let companion = path.with_extension(companion_ext);
            if companion.is_file() {
                let companion_name = format!("{}.{}", new_stem, companion_ext);
                tracing::debug!("Copying companion model {}", companion.display());
                let companion_key =
                    fs::canonicalize(&companion).unwrap_or_else(|_| companion.clone());
                self.sources.insert(companion_key, companion_name.clone());
                self.files.insert(companion_name, companion);
            }
        }

        name
    }

    /// Number of files to copy
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// (path relative to the project, source file) pairs
    pub fn files(&self) -> impl Iterator<Item = (PathBuf, &Path)> {
        self.files
            .iter()
            .map(|(name, source)| (Path::new(MODELS_DIR).join(name), source.as_path()))
    }
}

//! Project-local footprint library

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use super::{unique_name, FOOTPRINT_EXT};
use crate::error::{LiberateError, Result};
use crate::sexpr::{Document, List};

/// The `<nickname>.pretty` directory being built
#[derive(Debug, Clone)]
pub struct LocalFootprintLibrary {
    relative: PathBuf,
    taken: BTreeSet<String>,
    added: BTreeMap<String, Document>,
}

impl LocalFootprintLibrary {
    /// Open the local library directory at `relative` below the project;
    /// footprints it already holds keep their names
    pub fn open(project_dir: &Path, relative: impl Into<PathBuf>) -> Result<Self> {
        let relative = relative.into();
        let dir = project_dir.join(&relative);

        let mut taken = BTreeSet::new();
        if dir.is_dir() {
            let entries = fs::read_dir(&dir).map_err(|e| LiberateError::io(&dir, e))?;
            for entry in entries.filter_map(|entry| entry.ok()) {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == FOOTPRINT_EXT) {
                    if let Some(stem) = path.file_stem() {
                        taken.insert(stem.to_string_lossy().into_owned());
                    }
                }
            }
            tracing::debug!(
                "Appending to existing footprint library {} ({} footprints)",
                relative.display(),
                taken.len()
            );
        }

        Ok(Self {
            relative,
            taken,
            added: BTreeMap::new(),
        })
    }

    pub fn relative(&self) -> &Path {
        &self.relative
    }

    pub fn unique_name(&self, base: &str) -> String {
        unique_name(base, &self.taken)
    }

    pub fn add(&mut self, name: String, footprint: Document) {
        self.taken.insert(name.clone());
        self.added.insert(name, footprint);
    }

    pub fn added(&self) -> impl Iterator<Item = &str> {
        self.added.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.added.len()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
    }

    pub fn rewrite_added(&mut self, mut edit: impl FnMut(&mut List) -> usize) -> usize {
        self.added.values_mut().map(|doc| edit(doc.root_mut())).sum()
    }

    /// Added footprint files, relative to the project
    pub fn files(&self) -> impl Iterator<Item = (PathBuf, &Document)> {
        self.added.iter().map(|(name, doc)| {
            let file = self.relative.join(format!("{}.{}", name, FOOTPRINT_EXT));
            (file, doc)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_existing_names_are_taken() {
        let dir = TempDir::new().unwrap();
        let pretty = dir.path().join("demo.pretty");
        fs::create_dir(&pretty).unwrap();
        fs::write(pretty.join("R_0603.kicad_mod"), "(footprint \"R_0603\")").unwrap();
        fs::write(pretty.join("notes.txt"), "").unwrap();

        let mut lib = LocalFootprintLibrary::open(dir.path(), "demo.pretty").unwrap();
        assert_eq!(lib.unique_name("R_0603"), "R_0603_01");
        assert_eq!(lib.unique_name("C_0603"), "C_0603");

        let doc = Document::parse("(footprint \"R_0603_01\")").unwrap();
        lib.add("R_0603_01".to_string(), doc);
        assert_eq!(lib.unique_name("R_0603"), "R_0603_02");

        let files: Vec<PathBuf> = lib.files().map(|(path, _)| path).collect();
        assert_eq!(files, vec![PathBuf::from("demo.pretty").join("R_0603_01.kicad_mod")]);
    }
}

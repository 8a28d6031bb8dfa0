//! Project discovery

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::{Project, SourceFile, BOARD_EXT, PROJECT_EXT, SCHEMATIC_EXT};
use crate::error::{LiberateError, Result};
use crate::io;
use crate::sexpr::Document;

/// Property naming the file of a sub-sheet; KiCad 6 wrote it with a space
const SHEET_FILE_PROPERTIES: &[&str] = &["Sheetfile", "Sheet file"];

impl Project {
    /// Find the single project in `dir` and parse its schematics and board
    pub fn locate(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(LiberateError::NotFound(format!(
                "project directory {}",
                dir.display()
            )));
        }
        let dir = fs::canonicalize(dir).map_err(|e| LiberateError::io(dir, e))?;

        let descriptor = find_descriptor(&dir)?;
        let name = descriptor
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let root_schematic = dir.join(format!("{}.{}", name, SCHEMATIC_EXT));
        let board_path = dir.join(format!("{}.{}", name, BOARD_EXT));
        if !root_schematic.is_file() && !board_path.is_file() {
            return Err(LiberateError::NotFound(format!(
                "schematic or board for project '{}' in {}",
                name,
                dir.display()
            )));
        }

        let mut project = Project {
            name,
            descriptor,
            schematics: Vec::new(),
            board: None,
            warnings: Vec::new(),
            dir,
        };

        if root_schematic.is_file() {
            let mut visited = HashSet::new();
            project.add_sheet(root_schematic, &mut visited)?;
        }
        if board_path.is_file() {
            project.board = Some(project.source_file(board_path)?);
        }

        tracing::info!(
            "Located project '{}': {} schematic(s), {}",
            project.name,
            project.schematics.len(),
            if project.board.is_some() { "board" } else { "no board" }
        );
        Ok(project)
    }

    /// Parse `path` and, recursively, the sheets it references
    fn add_sheet(&mut self, path: PathBuf, visited: &mut HashSet<PathBuf>) -> Result<()> {
        if !visited.insert(path.clone()) {
            return Ok(());
        }

        let sheet = self.source_file(path)?;
        let from = sheet.path.clone();
        let base = from.parent().map(Path::to_path_buf).unwrap_or_default();
        let children = sheet_files(&sheet.document);
        self.schematics.push(sheet);

        for child in children {
            let child_path = base.join(&child);
            if !child_path.is_file() {
                return Err(LiberateError::NotFound(format!(
                    "sub-sheet {} referenced from {}",
                    child_path.display(),
                    from.display()
                )));
            }
            let child_path =
                fs::canonicalize(&child_path).map_err(|e| LiberateError::io(&child_path, e))?;

            if !child_path.starts_with(&self.dir) {
                if visited.insert(child_path.clone()) {
                    tracing::warn!(
                        "Sub-sheet {} is outside the project directory",
                        child_path.display()
                    );
                    self.warnings
                        .push(LiberateError::ExternalSheet { path: child_path });
                }
                continue;
            }
            self.add_sheet(child_path, visited)?;
        }
        Ok(())
    }

    fn source_file(&self, path: PathBuf) -> Result<SourceFile> {
        let document = io::read_document(&path)?;
        let relative = path
            .strip_prefix(&self.dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.clone());
        tracing::debug!("Parsed {}", relative.display());
        Ok(SourceFile {
            path,
            relative,
            document,
        })
    }
}

fn find_descriptor(dir: &Path) -> Result<PathBuf> {
    let entries = fs::read_dir(dir).map_err(|e| LiberateError::io(dir, e))?;

    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(PROJECT_EXT))
        })
        .collect();
    found.sort();

    match found.len() {
        0 => Err(LiberateError::NotFound(format!(
            "no .{} file in {}",
            PROJECT_EXT,
            dir.display()
        ))),
        1 => Ok(found.remove(0)),
        _ => Err(LiberateError::AmbiguousProject {
            dir: dir.to_path_buf(),
            files: found,
        }),
    }
}

/// File names of the sub-sheets placed in a schematic
fn sheet_files(doc: &Document) -> Vec<String> {
    doc.root()
        .find_all("sheet")
        .filter_map(|sheet| {
            SHEET_FILE_PROPERTIES
                .iter()
                .find_map(|name| sheet.property(name))
        })
        .filter(|file| !file.is_empty())
        .map(str::to_string)
        .collect()
}

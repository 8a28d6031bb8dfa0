//! File helpers that attach the offending path to every error

use std::fs;
use std::path::Path;

use crate::error::{LiberateError, Result};
use crate::sexpr::Document;

/// Read a whole file as UTF-8
pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| LiberateError::io(path, e))
}

/// Read and parse an S-expression file
pub fn read_document(path: &Path) -> Result<Document> {
    let text = read_text(path)?;
    Document::parse(&text).map_err(|source| LiberateError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a file, creating its parent directory
pub fn write_text(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| LiberateError::io(parent, e))?;
    }
    fs::write(path, content).map_err(|e| LiberateError::io(path, e))
}

/// Copy a file, creating the parent directory of `to`
pub fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| LiberateError::io(parent, e))?;
    }
    fs::copy(from, to)
        .map(|_| ())
        .map_err(|e| LiberateError::io(from, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_error_carries_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.kicad_sch");
        fs::write(&path, "(kicad_sch (version 1)").unwrap();

        match read_document(&path).unwrap_err() {
            LiberateError::Parse { path: p, source } => {
                assert_eq!(p, path);
                assert_eq!(source.line, 1);
            }
            other => panic!("Expected parse error, got {other}"),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = read_text(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, LiberateError::Io { .. }));
    }

    #[test]
    fn test_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c.txt");
        write_text(&path, "hello").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "hello");
    }
}

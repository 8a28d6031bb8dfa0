//! Destination writer
//!
//! The destination is assembled in a hidden staging directory next to it
//! and renamed into place only once every file has been written. A failed
//! run removes the staging directory, so the destination either appears
//! complete or not at all. The source tree is only read.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{LiberateError, Result};
use crate::io;

/// What to place at one path of the destination
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayContent {
    /// Serialized file content
    Text(String),
    /// Copy of a file outside the project tree
    Copy(PathBuf),
}

/// Files replacing or extending the copied source tree, keyed by path
/// relative to the destination root
#[derive(Debug, Clone, Default)]
pub struct Overlay {
    files: BTreeMap<PathBuf, OverlayContent>,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_text(&mut self, relative: impl Into<PathBuf>, content: impl Into<String>) {
        self.files
            .insert(relative.into(), OverlayContent::Text(content.into()));
    }

    pub fn add_copy(&mut self, relative: impl Into<PathBuf>, source: impl Into<PathBuf>) {
        self.files
            .insert(relative.into(), OverlayContent::Copy(source.into()));
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &OverlayContent)> {
        self.files.iter()
    }
}

/// Refuse destinations that exist or that lie inside the source tree
pub fn check_destination(source: &Path, dest: &Path) -> Result<()> {
    if dest.symlink_metadata().is_ok() {
        return Err(LiberateError::DestinationExists {
            path: dest.to_path_buf(),
        });
    }

    let source = fs::canonicalize(source).map_err(|e| LiberateError::io(source, e))?;
    if absolute_dest(dest)?.starts_with(&source) {
        return Err(LiberateError::Configuration(format!(
            "destination {} lies inside the source project {}",
            dest.display(),
            source.display()
        )));
    }
    Ok(())
}

/// Copy `source` to `dest` and apply `overlay` on top
pub fn write_project(source: &Path, dest: &Path, overlay: &Overlay) -> Result<()> {
    check_destination(source, dest)?;

    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| LiberateError::io(&parent, e))?;

    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            LiberateError::Configuration(format!("invalid destination {}", dest.display()))
        })?;
    let staging = parent.join(format!(".{}.liberating-{}", name, std::process::id()));
    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(|e| LiberateError::io(&staging, e))?;
    }

    let result = stage(source, &staging, overlay)
        .and_then(|()| fs::rename(&staging, dest).map_err(|e| LiberateError::io(dest, e)));

    if result.is_err() && staging.exists() {
        if let Err(e) = fs::remove_dir_all(&staging) {
            tracing::warn!(
                "Could not remove staging directory {}: {}",
                staging.display(),
                e
            );
        }
    }
    result
}

fn stage(source: &Path, staging: &Path, overlay: &Overlay) -> Result<()> {
    let copied = copy_tree(source, staging)?;
    tracing::debug!("Copied {} files from {}", copied, source.display());

    for (relative, content) in overlay.iter() {
        let target = staging.join(relative);
        match content {
            OverlayContent::Text(text) => io::write_text(&target, text)?,
            OverlayContent::Copy(from) => io::copy_file(from, &target)?,
        }
    }
    tracing::debug!("Wrote {} generated files", overlay.len());
    Ok(())
}

/// Recursive copy; returns the number of files copied
fn copy_tree(source: &Path, target: &Path) -> Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source).to_path_buf();
            LiberateError::io(path, e.into())
        })?;

        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let to = target.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&to).map_err(|e| LiberateError::io(&to, e))?;
        } else if entry.path().is_file() {
            fs::copy(entry.path(), &to).map_err(|e| LiberateError::io(entry.path(), e))?;
            copied += 1;
        } else {
            tracing::debug!("Skipping {}", entry.path().display());
        }
    }
    Ok(copied)
}

fn absolute_dest(dest: &Path) -> Result<PathBuf> {
    let absolute = if dest.is_absolute() {
        dest.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| LiberateError::io(dest, e))?
            .join(dest)
    };

    // Canonicalize the deepest existing ancestor and re-append the rest
    let mut existing = absolute.as_path();
    let mut rest = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = fs::canonicalize(existing).unwrap_or_else(|_| existing.to_path_buf());
    for name in rest.iter().rev() {
        resolved.push(name);
    }
    Ok(normalize(&resolved))
}

/// Resolve `.` and `..` lexically
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("demo.kicad_pro"), "{}").unwrap();
        fs::write(dir.path().join("demo.kicad_sch"), "(kicad_sch)").unwrap();
        fs::create_dir_all(dir.path().join("docs/img")).unwrap();
        fs::write(dir.path().join("docs/img/front.png"), [0u8, 1, 2, 255]).unwrap();
        dir
    }

    #[test]
    fn test_copy_with_overlay() {
        let source = source_tree();
        let out = TempDir::new().unwrap();
        let dest = out.path().join("liberated");

        let extra = out.path().join("R.wrl");
        fs::write(&extra, "#VRML V2.0 utf8").unwrap();

        let mut overlay = Overlay::new();
        overlay.add_text("demo.kicad_sch", "(kicad_sch (version 2))\n");
        overlay.add_copy("models/R.wrl", &extra);
        write_project(source.path(), &dest, &overlay).unwrap();

        assert_eq!(fs::read_to_string(dest.join("demo.kicad_pro")).unwrap(), "{}");
        assert_eq!(
            fs::read_to_string(dest.join("demo.kicad_sch")).unwrap(),
            "(kicad_sch (version 2))\n"
        );
        assert_eq!(
            fs::read(dest.join("docs/img/front.png")).unwrap(),
            vec![0u8, 1, 2, 255]
        );
        assert!(dest.join("models/R.wrl").is_file());

        // Source untouched, no staging left behind
        assert_eq!(
            fs::read_to_string(source.path().join("demo.kicad_sch")).unwrap(),
            "(kicad_sch)"
        );
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_existing_destination() {
        let source = source_tree();
        let out = TempDir::new().unwrap();
        fs::write(out.path().join("keep.txt"), "mine").unwrap();

        let err = write_project(source.path(), out.path(), &Overlay::new()).unwrap_err();
        assert!(matches!(err, LiberateError::DestinationExists { .. }));
        assert_eq!(fs::read_to_string(out.path().join("keep.txt")).unwrap(), "mine");
    }

    #[test]
    fn test_destination_inside_source() {
        let source = source_tree();
        let dest = source.path().join("docs/../out");
        let err = check_destination(source.path(), &dest).unwrap_err();
        assert!(matches!(err, LiberateError::Configuration(_)));
    }

    #[test]
    fn test_failure_removes_staging() {
        let source = source_tree();
        let out = TempDir::new().unwrap();
        let dest = out.path().join("liberated");

        let mut overlay = Overlay::new();
        overlay.add_copy("models/missing.wrl", out.path().join("missing.wrl"));

        let err = write_project(source.path(), &dest, &overlay).unwrap_err();
        assert!(matches!(err, LiberateError::Io { .. }));
        assert!(!dest.exists());
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
    }
}

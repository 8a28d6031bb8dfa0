//! Error types for project liberation

use std::path::PathBuf;
use thiserror::Error;

use crate::reference::ItemKind;
use crate::sexpr::ParseError;

/// Errors raised while liberating a project.
///
/// Discovery, configuration, parse and write failures are fatal. The
/// per-item variants (`UnknownLibrary`, `UnsupportedLibrary`,
/// `DisabledLibrary`, `ItemNotFound`, `ModelNotFound`, `ExternalSheet`, and
/// `UnresolvedVariable` for model paths) are collected as warnings in the run report instead.
#[derive(Error, Debug)]
pub enum LiberateError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Multiple KiCad project files found in {}: {}", dir.display(), format_paths(files))]
    AmbiguousProject { dir: PathBuf, files: Vec<PathBuf> },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Environment variable '{name}' used in '{template}' is not defined")]
    UnresolvedVariable { name: String, template: String },

    #[error("{kind} library '{nickname}' (needed for '{item}') is not in any library table")]
    UnknownLibrary {
        kind: ItemKind,
        nickname: String,
        item: String,
    },

    #[error("{kind} library '{nickname}' has unsupported type '{plugin}'")]
    UnsupportedLibrary {
        kind: ItemKind,
        nickname: String,
        plugin: String,
    },

    #[error("{kind} library '{nickname}' is disabled in its library table")]
    DisabledLibrary { kind: ItemKind, nickname: String },

    #[error("{kind} '{item}' not found in library '{nickname}'")]
    ItemNotFound {
        kind: ItemKind,
        nickname: String,
        item: String,
    },

    #[error("Sub-sheet {} lies outside the project and is not rewritten", path.display())]
    ExternalSheet { path: PathBuf },

    #[error("3D model file not found: {}", path.display())]
    ModelNotFound { path: PathBuf },

    #[error("Destination already exists: {}", path.display())]
    DestinationExists { path: PathBuf },

    #[error("Parse error in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LiberateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LiberateError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error only affects a single library item
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LiberateError::UnknownLibrary { .. }
                | LiberateError::UnsupportedLibrary { .. }
                | LiberateError::DisabledLibrary { .. }
                | LiberateError::ItemNotFound { .. }
                | LiberateError::ModelNotFound { .. }
                | LiberateError::ExternalSheet { .. }
                | LiberateError::UnresolvedVariable { .. }
        )
    }
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, LiberateError>;

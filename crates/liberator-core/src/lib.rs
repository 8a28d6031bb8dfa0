//! # Liberator Core Library
//!
//! Makes KiCad projects self-contained.
//!
//! A KiCad project normally points at symbols, footprints and 3D models in
//! libraries installed on the host. This library copies every item a
//! project uses into project-local libraries and rewrites the references,
//! producing a copy of the project that opens on any machine.
//!
//! This library provides:
//! - A lossless S-expression reader and writer for KiCad files
//! - Host configuration discovery and `${VAR}` path resolution
//! - Global and project library table loading
//! - Reference scanning, asset collection and reference rewriting
//! - An all-or-nothing project writer
//!
//! ## Example
//!
//! ```rust,ignore
//! use liberator_core::prelude::*;
//!
//! let config = HostConfig::discover()?;
//! let report = Liberator::new(config, LiberateOptions::default())
//!     .run("my_board".as_ref(), "my_board_liberated".as_ref())?;
//! println!("{} references liberated", report.liberated());
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod assets;
pub mod config;
pub mod error;
pub mod io;
pub mod liberate;
pub mod library;
pub mod project;
pub mod reference;
pub mod sexpr;

pub use error::{LiberateError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{EnvBindings, HostConfig};
    pub use crate::error::{LiberateError, Result};
    pub use crate::liberate::{LiberateOptions, Liberator, Report};
    pub use crate::library::{LibraryEntry, LibraryKind, LibraryTable, LibraryTables};
    pub use crate::project::Project;
    pub use crate::reference::{ItemKind, LibId, ReferenceSet, RewriteMap};
    pub use crate::sexpr::{Atom, Document, List, Sexpr};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

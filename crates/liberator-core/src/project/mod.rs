//! KiCad projects
//!
//! A project is a directory holding exactly one descriptor file:
//! ```text
//! [name]/
//! ├── name.kicad_pro       # Project settings (JSON, copied untouched)
//! ├── name.kicad_sch       # Root schematic
//! ├── power.kicad_sch      # Sub-sheets referenced from the root, recursively
//! ├── name.kicad_pcb       # Board
//! ├── sym-lib-table        # Optional project library tables
//! └── fp-lib-table
//! ```
//!
//! [`Project::locate`] parses every schematic and the board once; the rest of
//! the pipeline works on those documents and [`writer`] serializes them into
//! the destination.

mod locator;
pub mod writer;

pub use writer::{Overlay, OverlayContent};

use std::path::PathBuf;

use crate::error::LiberateError;
use crate::sexpr::Document;

/// Extension of the project descriptor
pub const PROJECT_EXT: &str = "kicad_pro";

/// Extension of schematic files
pub const SCHEMATIC_EXT: &str = "kicad_sch";

/// Extension of board files
pub const BOARD_EXT: &str = "kicad_pcb";

/// A parsed file of the project
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the project directory
    pub relative: PathBuf,
    pub document: Document,
}

/// A located and parsed project
#[derive(Debug)]
pub struct Project {
    /// Base name of the descriptor
    pub name: String,
    /// Project directory (canonical)
    pub dir: PathBuf,
    pub descriptor: PathBuf,
    /// Root schematic first, then sub-sheets in discovery order
    pub schematics: Vec<SourceFile>,
    pub board: Option<SourceFile>,
    /// Problems that do not stop liberation, such as sub-sheets stored
    /// outside the project directory
    pub warnings: Vec<LiberateError>,
}

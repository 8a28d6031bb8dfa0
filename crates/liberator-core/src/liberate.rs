//! The liberation pipeline
//!
//! locate -> bindings -> tables -> scan -> collect -> rewrite -> write.
//! Every fatal error is raised before the writer starts, and the writer
//! removes its staging directory when it fails, so a failed run never
//! leaves a destination behind.

use std::path::{Component, Path};

use crate::assets::{Collection, Collector};
use crate::config::{HostConfig, PROJECT_DIR_VAR};
use crate::error::{LiberateError, Result};
use crate::io;
use crate::library::{set_entry, LibraryEntry, LibraryKind, LibraryTable, LibraryTables};
use crate::project::writer::{check_destination, write_project};
use crate::project::{Overlay, Project};
use crate::reference::rewriter::{rewrite_board, rewrite_schematic};
use crate::reference::scanner::scan_project;
use crate::reference::RewriteMap;

/// Suffix appended to the local nickname when a system library uses it
const NICKNAME_SUFFIX: &str = "_local";

/// Knobs of a run
#[derive(Debug, Clone, Default)]
pub struct LiberateOptions {
    /// Nickname of the local libraries; defaults to the project name
    pub nickname: Option<String>,
    /// Recover items missing from their libraries from the copies embedded
    /// in the schematic and board
    pub from_embedded: bool,
}

/// Outcome of a successful run
#[derive(Debug)]
pub struct Report {
    pub project: String,
    /// Nickname of the local libraries
    pub nickname: String,
    /// Symbols added to the local symbol library
    pub symbols: Vec<String>,
    /// Footprints added to the local footprint library
    pub footprints: Vec<String>,
    /// Files copied into the models directory
    pub models: Vec<String>,
    /// Old reference to new reference
    pub map: RewriteMap,
    pub rewritten_sites: usize,
    /// Recoverable problems; affected references still point at the
    /// system libraries
    pub warnings: Vec<LiberateError>,
}

impl Report {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Number of references that were redirected to local copies
    pub fn liberated(&self) -> usize {
        self.map.len()
    }
}

/// Runs the pipeline against one host configuration
#[derive(Debug, Clone)]
pub struct Liberator {
    config: HostConfig,
    options: LiberateOptions,
}

impl Liberator {
    pub fn new(config: HostConfig, options: LiberateOptions) -> Self {
        Self { config, options }
    }

    /// Liberate the project in `source` into the new directory `dest`
    pub fn run(&self, source: &Path, dest: &Path) -> Result<Report> {
        let mut project = Project::locate(source)?;
        check_destination(&project.dir, dest)?;

        let bindings = self.config.bindings(&project.dir)?;
        let tables = LibraryTables::load(&self.config, &bindings, &project.dir)?;
        let nickname = self.local_nickname(&project, &tables);

        let mut refs = scan_project(&project);
        refs.retain_foreign(&tables);
        tracing::info!(
            "{} symbol, {} footprint and {} 3D model references to liberate",
            refs.symbols.len(),
            refs.footprints.len(),
            refs.models.len()
        );

        let collection = Collector::new(&project, &tables, &bindings, nickname)
            .from_embedded(self.options.from_embedded)
            .collect(&refs)?;

        let mut overlay = Overlay::new();
        let rewritten_sites = rewrite_files(&mut project, &collection.map, &mut overlay);
        collection.write_into(&mut overlay);
        add_table_entries(&project, &tables, &collection, &mut overlay)?;
        tracing::info!("Rewrote {} references", rewritten_sites);

        write_project(&project.dir, dest, &overlay)?;
        tracing::info!("Wrote {}", dest.display());

        let mut warnings = std::mem::take(&mut project.warnings);
        warnings.extend(collection.warnings);

        Ok(Report {
            project: project.name,
            symbols: collection.symbols.added().map(str::to_string).collect(),
            footprints: collection.footprints.added().map(str::to_string).collect(),
            models: collection
                .models
                .files()
                .filter_map(|(relative, _)| {
                    relative.file_name().map(|n| n.to_string_lossy().into_owned())
                })
                .collect(),
            nickname: collection.nickname,
            map: collection.map,
            rewritten_sites,
            warnings,
        })
    }

    /// The project name, or the configured nickname, with `:` replaced; a
    /// nickname already used by a system library gets `_local`
    fn local_nickname(&self, project: &Project, tables: &LibraryTables) -> String {
        let base = self
            .options
            .nickname
            .clone()
            .unwrap_or_else(|| project.name.clone())
            .replace(':', "_");

        let taken = LibraryKind::ALL
            .iter()
            .any(|&kind| tables.get(kind, &base).is_some_and(|lib| !lib.project_local));
        if taken {
            let nickname = format!("{}{}", base, NICKNAME_SUFFIX);
            tracing::info!(
                "Nickname '{}' belongs to a system library, using '{}'",
                base,
                nickname
            );
            nickname
        } else {
            base
        }
    }
}

/// Rewrite every schematic and the board; edited files go into `overlay`
fn rewrite_files(project: &mut Project, map: &RewriteMap, overlay: &mut Overlay) -> usize {
    let mut total = 0;
    for sheet in &mut project.schematics {
        let count = rewrite_schematic(&mut sheet.document, map);
        if count > 0 {
            tracing::debug!("{}: {} references", sheet.relative.display(), count);
            overlay.add_text(&sheet.relative, sheet.document.to_string());
        }
        total += count;
    }
    if let Some(board) = &mut project.board {
        let count = rewrite_board(&mut board.document, map);
        if count > 0 {
            tracing::debug!("{}: {} references", board.relative.display(), count);
            overlay.add_text(&board.relative, board.document.to_string());
        }
        total += count;
    }
    total
}

/// Register the local libraries in the project tables
///
/// Tables are only touched for kinds that gained items, and only when the
/// nickname is not already registered as a project library.
fn add_table_entries(
    project: &Project,
    tables: &LibraryTables,
    collection: &Collection,
    overlay: &mut Overlay,
) -> Result<()> {
    let libraries = [
        (LibraryKind::Symbol, collection.symbols.is_empty(), collection.symbols.relative()),
        (
            LibraryKind::Footprint,
            collection.footprints.is_empty(),
            collection.footprints.relative(),
        ),
    ];

    for (kind, empty, relative) in libraries {
        if empty {
            continue;
        }
        let registered = tables
            .get(kind, &collection.nickname)
            .is_some_and(|lib| lib.project_local);
        if registered {
            continue;
        }

        let path = project.dir.join(kind.table_file());
        let mut doc = if path.is_file() {
            io::read_document(&path)?
        } else {
            LibraryTable::empty_document(kind)
        };
        let uri = format!("${{{}}}/{}", PROJECT_DIR_VAR, slash_path(relative));
        set_entry(&mut doc, &LibraryEntry::new(collection.nickname.clone(), uri));
        overlay.add_text(kind.table_file(), doc.to_string());
    }
    Ok(())
}

/// Relative path with `/` separators, as KiCad writes URIs on every platform
fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_slash_path() {
        assert_eq!(slash_path(&PathBuf::from("libs").join("Board.pretty")), "libs/Board.pretty");
        assert_eq!(slash_path(Path::new("Board.kicad_sym")), "Board.kicad_sym");
    }

    #[test]
    fn test_clean_report() {
        let report = Report {
            project: "demo".to_string(),
            nickname: "demo".to_string(),
            symbols: Vec::new(),
            footprints: Vec::new(),
            models: Vec::new(),
            map: RewriteMap::default(),
            rewritten_sites: 0,
            warnings: Vec::new(),
        };
        assert!(report.is_clean());
        assert_eq!(report.liberated(), 0);
    }
}

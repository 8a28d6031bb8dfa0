//! Reference scanning
//!
//! Walks parsed schematics and boards and collects the distinct library
//! items they use.

use std::collections::BTreeSet;

use super::{is_local_model, LibId};
use crate::library::LibraryTables;
use crate::project::Project;
use crate::sexpr::{Document, List};

/// Distinct references found in a project
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceSet {
    pub symbols: BTreeSet<LibId>,
    pub footprints: BTreeSet<LibId>,
    /// 3D model path templates, as written in the files
    pub models: BTreeSet<String>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.footprints.is_empty() && self.models.is_empty()
    }

    pub fn len(&self) -> usize {
        self.symbols.len() + self.footprints.len() + self.models.len()
    }

    /// Drop references that already resolve inside the project: bare names,
    /// libraries registered with a project-local URI, and project-relative
    /// model paths
    pub fn retain_foreign(&mut self, tables: &LibraryTables) {
        self.symbols.retain(|id| match &id.nickname {
            Some(nickname) => !tables.symbol(nickname).is_some_and(|lib| lib.project_local),
            None => false,
        });
        self.footprints.retain(|id| match &id.nickname {
            Some(nickname) => !tables.footprint(nickname).is_some_and(|lib| lib.project_local),
            None => false,
        });
        self.models.retain(|template| !is_local_model(template));
    }
}

/// Collect references from every schematic and the board of a project
pub fn scan_project(project: &Project) -> ReferenceSet {
    let mut refs = ReferenceSet::new();
    for sheet in &project.schematics {
        scan_schematic(&sheet.document, &mut refs);
    }
    if let Some(board) = &project.board {
        scan_board(&board.document, &mut refs);
    }

    tracing::debug!(
        "Found {} symbol, {} footprint and {} 3D model references",
        refs.symbols.len(),
        refs.footprints.len(),
        refs.models.len()
    );
    refs
}

/// Symbol instances and their footprint assignments
pub fn scan_schematic(doc: &Document, refs: &mut ReferenceSet) {
    for instance in doc.root().find_all("symbol") {
        if let Some(lib_id) = instance.value_of("lib_id") {
            insert_id(&mut refs.symbols, lib_id);
        }
        if let Some(footprint) = instance.property("Footprint") {
            insert_id(&mut refs.footprints, footprint);
        }
    }
}

/// Footprint instances and their 3D models
pub fn scan_board(doc: &Document, refs: &mut ReferenceSet) {
    for instance in footprint_instances(doc.root()) {
        if let Some(name) = instance.atom(1) {
            insert_id(&mut refs.footprints, name);
        }
        scan_models(instance, &mut refs.models);
    }
}

/// `model` children of a footprint, board instance or library file alike
pub fn scan_models(footprint: &List, models: &mut BTreeSet<String>) {
    for model in footprint.find_all("model") {
        if let Some(template) = model.atom(1) {
            if !template.is_empty() {
                models.insert(template.to_string());
            }
        }
    }
}

/// Top-level footprints of a board; KiCad 5 boards call them `module`
pub fn footprint_instances(root: &List) -> impl Iterator<Item = &List> {
    root.lists()
        .filter(|l| matches!(l.keyword(), Some("footprint") | Some("module")))
}

fn insert_id(set: &mut BTreeSet<LibId>, text: &str) {
    if text.is_empty() {
        return;
    }
    set.insert(LibId::parse(text));
}

//! Asset collection
//!
//! Copies every referenced library item into one project-local library per
//! kind and records how each reference has to change. Items are processed
//! in sorted order; the first item with a given name keeps it and later
//! items with the same name from another library get `_01`, `_02`, ...
//! Names already used by an existing local library count as taken.
//!
//! Per-item failures (unknown or unreadable library, missing item or model
//! file) become warnings and leave the reference pointing at the system
//! library. Malformed library files are fatal.

pub mod embedded;
pub mod footprints;
pub mod models;
pub mod symbols;

pub use footprints::LocalFootprintLibrary;
pub use models::ModelStore;
pub use symbols::{LocalSymbolLibrary, SourceHeader};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::config::{EnvBindings, PROJECT_DIR_VAR};
use crate::error::{LiberateError, Result};
use crate::io;
use crate::library::{LibraryKind, LibraryTables, ResolvedLibrary};
use crate::project::{Overlay, Project};
use crate::reference::rewriter;
use crate::reference::scanner::scan_models;
use crate::reference::{is_local_model, ItemKind, LibId, ReferenceSet, RewriteMap};
use crate::sexpr::{Document, List};

/// Extension of footprint files inside a `.pretty` directory
pub const FOOTPRINT_EXT: &str = "kicad_mod";

/// Extension of symbol library files
pub const SYMBOL_LIB_EXT: &str = "kicad_sym";

/// First free name among `base`, `base_01`, `base_02`, ...
pub fn unique_name(base: &str, taken: &BTreeSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{}_{:02}", base, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Everything the collector produced
#[derive(Debug)]
pub struct Collection {
    /// Nickname of the local libraries
    pub nickname: String,
    pub symbols: LocalSymbolLibrary,
    pub footprints: LocalFootprintLibrary,
    pub models: ModelStore,
    /// Old reference to new reference for every liberated item
    pub map: RewriteMap,
    pub warnings: Vec<LiberateError>,
}

impl Collection {
    /// Add the local libraries and model files to `overlay`
    pub fn write_into(&self, overlay: &mut Overlay) {
        if !self.symbols.is_empty() {
            overlay.add_text(self.symbols.relative(), self.symbols.to_document().to_string());
        }
        for (relative, doc) in self.footprints.files() {
            overlay.add_text(relative, doc.to_string());
        }
        for (relative, source) in self.models.files() {
            overlay.add_copy(relative, source);
        }
    }
}

/// Gathers library items for one project
pub struct Collector<'a> {
    project: &'a Project,
    tables: &'a LibraryTables,
    bindings: &'a EnvBindings,
    nickname: String,
    from_embedded: bool,
    /// Symbol library files read so far; `None` when the file is missing
    symbol_libs: HashMap<PathBuf, Option<Document>>,
    /// (source library, source name) -> local name, including `extends`
    /// parents that are not referenced directly
    imported: BTreeMap<LibId, String>,
    map: RewriteMap,
    warnings: Vec<LiberateError>,
}

impl<'a> Collector<'a> {
    pub fn new(
        project: &'a Project,
        tables: &'a LibraryTables,
        bindings: &'a EnvBindings,
        nickname: impl Into<String>,
    ) -> Self {
        Self {
            project,
            tables,
            bindings,
            nickname: nickname.into(),
            from_embedded: false,
            symbol_libs: HashMap::new(),
            imported: BTreeMap::new(),
            map: RewriteMap::default(),
            warnings: Vec::new(),
        }
    }

    /// Fall back to the copies embedded in the schematic and board for
    /// items that cannot be read from their library
    pub fn from_embedded(mut self, enabled: bool) -> Self {
        self.from_embedded = enabled;
        self
    }

    pub fn collect(mut self, refs: &ReferenceSet) -> Result<Collection> {
        let symbol_path = self.local_path(LibraryKind::Symbol);
        let mut symbols = LocalSymbolLibrary::open(&self.project.dir, symbol_path)?;
        for id in &refs.symbols {
            self.collect_symbol(id, &mut symbols)?;
        }

        let footprint_path = self.local_path(LibraryKind::Footprint);
        let mut footprints = LocalFootprintLibrary::open(&self.project.dir, footprint_path)?;
        let mut model_refs = refs.models.clone();
        for id in &refs.footprints {
            self.collect_footprint(id, &mut footprints, &mut model_refs)?;
        }

        let mut models = ModelStore::open(&self.project.dir);
        for template in model_refs.iter().filter(|t| !is_local_model(t)) {
            self.collect_model(template, &mut models);
        }

        symbols.rewrite_added(|symbol| rewriter::rewrite_footprint_properties(symbol, &self.map));
        footprints.rewrite_added(|footprint| rewriter::rewrite_models(footprint, &self.map));

        tracing::info!(
            "Collected {} symbols, {} footprints and {} 3D model files into '{}'",
            symbols.len(),
            footprints.len(),
            models.len(),
            self.nickname
        );

        Ok(Collection {
            nickname: self.nickname,
            symbols,
            footprints,
            models,
            map: self.map,
            warnings: self.warnings,
        })
    }

    /// Where the local library of `kind` lives, relative to the project
    ///
    /// A project-local table entry that already uses the nickname wins over
    /// the default `<nickname>.kicad_sym` / `<nickname>.pretty`.
    fn local_path(&self, kind: LibraryKind) -> PathBuf {
        let default = match kind {
            LibraryKind::Symbol => format!("{}.{}", self.nickname, SYMBOL_LIB_EXT),
            LibraryKind::Footprint => format!("{}.pretty", self.nickname),
        };
        self.tables
            .get(kind, &self.nickname)
            .filter(|lib| lib.project_local)
            .and_then(|lib| lib.path.strip_prefix(&self.project.dir).ok())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(default))
    }

    fn resolve(
        &self,
        kind: LibraryKind,
        id: &LibId,
    ) -> std::result::Result<&'a ResolvedLibrary, LiberateError> {
        let nickname = id.nickname.clone().unwrap_or_default();
        let tables: &'a LibraryTables = self.tables;
        let lib = tables
            .get(kind, &nickname)
            .ok_or_else(|| LiberateError::UnknownLibrary {
                kind: kind.item_kind(),
                nickname: nickname.clone(),
                item: id.item.clone(),
            })?;
        if lib.entry.disabled {
            return Err(LiberateError::DisabledLibrary {
                kind: kind.item_kind(),
                nickname,
            });
        }
        if !lib.is_readable() {
            return Err(LiberateError::UnsupportedLibrary {
                kind: kind.item_kind(),
                nickname,
                plugin: lib.entry.plugin.clone(),
            });
        }
        Ok(lib)
    }

    fn warn(&mut self, warning: LiberateError) {
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }

    fn collect_symbol(&mut self, id: &LibId, local: &mut LocalSymbolLibrary) -> Result<()> {
        let Some(nickname) = id.nickname.clone() else {
            return Ok(());
        };

        let chain = match self.resolve(LibraryKind::Symbol, id) {
            Ok(lib) => match self.symbol_chain(lib, &id.item)? {
                Some(found) => Ok(found),
                None => Err(LiberateError::ItemNotFound {
                    kind: ItemKind::Symbol,
                    nickname: nickname.clone(),
                    item: id.item.clone(),
                }),
            },
            Err(warning) => Err(warning),
        };

        let local_name = match chain {
            Ok((chain, header)) => self.import_chain(&nickname, chain, &header, local),
            Err(warning) => match self.embedded_symbol(id) {
                Some(mut symbol) => {
                    let name = local.unique_name(&id.item);
                    symbols::rename_symbol(&mut symbol, &id.item, &name);
                    local.add(name.clone(), symbol, None);
                    tracing::info!("Recovered symbol {} from the schematic cache", id);
                    self.imported.insert(id.clone(), name.clone());
                    name
                }
                None => {
                    self.warn(warning);
                    return Ok(());
                }
            },
        };

        tracing::debug!("Symbol {} -> {}:{}", id, self.nickname, local_name);
        self.map
            .symbols
            .insert(id.clone(), LibId::new(self.nickname.clone(), local_name));
        Ok(())
    }

    /// The symbol and its `extends` ancestors, nearest first, plus the
    /// header of the library they came from
    fn symbol_chain(
        &mut self,
        lib: &ResolvedLibrary,
        item: &str,
    ) -> Result<Option<(Vec<List>, SourceHeader)>> {
        if !self.symbol_libs.contains_key(&lib.path) {
            let doc = if lib.path.is_file() {
                tracing::debug!("Reading symbol library {}", lib.path.display());
                Some(io::read_document(&lib.path)?)
            } else {
                None
            };
            self.symbol_libs.insert(lib.path.clone(), doc);
        }
        let Some(Some(doc)) = self.symbol_libs.get(&lib.path) else {
            return Ok(None);
        };
        let Some(first) = symbols::find_symbol(doc.root(), item) else {
            return Ok(None);
        };

        let mut chain = vec![first.clone()];
        let mut seen = BTreeSet::from([item.to_string()]);
        while let Some(parent) = chain.last().and_then(|s| s.value_of("extends")) {
            if !seen.insert(parent.to_string()) {
                break;
            }
            match symbols::find_symbol(doc.root(), parent) {
                Some(symbol) => chain.push(symbol.clone()),
                None => {
                    tracing::warn!(
                        "Parent symbol '{}' of '{}' missing from {}",
                        parent,
                        item,
                        lib.path.display()
                    );
                    break;
                }
            }
        }

        Ok(Some((chain, SourceHeader::of(doc.root()))))
    }

    /// Add a symbol chain, root ancestor first; returns the local name of
    /// the referenced symbol
    fn import_chain(
        &mut self,
        nickname: &str,
        chain: Vec<List>,
        header: &SourceHeader,
        local: &mut LocalSymbolLibrary,
    ) -> String {
        let mut name = String::new();
        for mut symbol in chain.into_iter().rev() {
            let source_name = symbol.atom(1).unwrap_or_default().to_string();
            let key = LibId::new(nickname, source_name.clone());
            if let Some(existing) = self.imported.get(&key) {
                name = existing.clone();
                continue;
            }

            if let Some(parent) = symbol.value_of("extends").map(str::to_string) {
                if let Some(new_parent) = self.imported.get(&LibId::new(nickname, parent)) {
                    if let Some(atom) = symbol.find_mut("extends").and_then(|l| l.atom_mut(1)) {
                        atom.set_value(new_parent.clone());
                    }
                }
            }

            name = local.unique_name(&source_name);
            symbols::rename_symbol(&mut symbol, &source_name, &name);
            local.add(name.clone(), symbol, Some(header));
            self.imported.insert(key, name.clone());
        }
        name
    }

    fn embedded_symbol(&self, id: &LibId) -> Option<List> {
        if !self.from_embedded {
            return None;
        }
        embedded::cached_symbol(self.project, id)
    }

    fn collect_footprint(
        &mut self,
        id: &LibId,
        local: &mut LocalFootprintLibrary,
        models: &mut BTreeSet<String>,
    ) -> Result<()> {
        if id.nickname.is_none() {
            return Ok(());
        }

        let found = match self.resolve(LibraryKind::Footprint, id) {
            Ok(lib) => {
                let file = lib.path.join(format!("{}.{}", id.item, FOOTPRINT_EXT));
                if file.is_file() {
                    tracing::debug!("Reading footprint {}", file.display());
                    Ok(io::read_document(&file)?)
                } else {
                    Err(LiberateError::ItemNotFound {
                        kind: ItemKind::Footprint,
                        nickname: lib.entry.nickname.clone(),
                        item: id.item.clone(),
                    })
                }
            }
            Err(warning) => Err(warning),
        };

        let mut doc = match found {
            Ok(doc) => doc,
            Err(warning) => match self.embedded_footprint(id) {
                Some(doc) => {
                    tracing::info!("Recovered footprint {} from the board", id);
                    doc
                }
                None => {
                    self.warn(warning);
                    return Ok(());
                }
            },
        };

        let name = local.unique_name(&id.item);
        if let Some(atom) = doc.root_mut().atom_mut(1) {
            atom.set_value(name.clone());
        }
        scan_models(doc.root(), models);
        local.add(name.clone(), doc);

        tracing::debug!("Footprint {} -> {}:{}", id, self.nickname, name);
        self.map
            .footprints
            .insert(id.clone(), LibId::new(self.nickname.clone(), name));
        Ok(())
    }

    fn embedded_footprint(&self, id: &LibId) -> Option<Document> {
        if !self.from_embedded {
            return None;
        }
        embedded::board_footprint(self.project, id)
    }

    fn collect_model(&mut self, template: &str, store: &mut ModelStore) {
        let resolved = match self.bindings.resolve(template) {
            Ok(path) => PathBuf::from(path),
            Err(warning) => {
                self.warn(warning);
                return;
            }
        };
        let path = if resolved.is_relative() {
            self.project.dir.join(resolved)
        } else {
            resolved
        };

        if !path.is_file() {
            self.warn(LiberateError::ModelNotFound { path });
            return;
        }

        let file_name = store.add(&path);
        let new_template = format!(
            "${{{}}}/{}/{}",
            PROJECT_DIR_VAR,
            models::MODELS_DIR,
            file_name
        );
        tracing::debug!("3D model {} -> {}", template, new_template);
        self.map.models.insert(template.to_string(), new_template);
    }
}

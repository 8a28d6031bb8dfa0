//! Project-local symbol library

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::unique_name;
use crate::error::Result;
use crate::io;
use crate::reference::rewriter;
use crate::sexpr::{Atom, Document, List, Sexpr};

/// Root keyword of symbol library files
pub const SYMBOL_LIB_KEYWORD: &str = "kicad_symbol_lib";

/// Generator name written into new libraries
pub const GENERATOR: &str = "kicad_liberator";

/// File format version of KiCad 6, used when no source version is known
const DEFAULT_VERSION: u64 = 20211014;

/// Top-level symbol named `name` in a library root
pub fn find_symbol<'a>(root: &'a List, name: &str) -> Option<&'a List> {
    root.find_all("symbol").find(|s| s.atom(1) == Some(name))
}

/// Give a symbol definition the bare local name `new_name`, renaming its
/// unit sub-symbols when the item name changes
pub fn rename_symbol(symbol: &mut List, old_item: &str, new_name: &str) {
    rewriter::rename_symbol(symbol, new_name, old_item, new_name);
}

/// Version information of a library the symbols were copied from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceHeader {
    pub version: Option<u64>,
    pub generator_version: Option<String>,
}

impl SourceHeader {
    pub fn of(root: &List) -> Self {
        Self {
            version: root.value_of("version").and_then(|v| v.parse().ok()),
            generator_version: root.value_of("generator_version").map(str::to_string),
        }
    }
}

/// The `<nickname>.kicad_sym` being built
#[derive(Debug, Clone)]
pub struct LocalSymbolLibrary {
    relative: PathBuf,
    /// Library already present in the project, appended to
    existing: Option<Document>,
    taken: BTreeSet<String>,
    added: Vec<(String, List)>,
    header: SourceHeader,
}

impl LocalSymbolLibrary {
    /// Open the local library at `relative` below the project, loading it
    /// if it already exists
    pub fn open(project_dir: &Path, relative: impl Into<PathBuf>) -> Result<Self> {
        let relative = relative.into();
        let path = project_dir.join(&relative);

        let existing = if path.is_file() {
            Some(io::read_document(&path)?)
        } else {
            None
        };
        let taken: BTreeSet<String> = existing
            .iter()
            .flat_map(|doc| doc.root().find_all("symbol"))
            .filter_map(|s| s.atom(1))
            .map(str::to_string)
            .collect();
        let header = existing
            .as_ref()
            .map(|doc| SourceHeader::of(doc.root()))
            .unwrap_or_default();

        if existing.is_some() {
            tracing::debug!(
                "Appending to existing symbol library {} ({} symbols)",
                relative.display(),
                taken.len()
            );
        }

        Ok(Self {
            relative,
            existing,
            taken,
            added: Vec::new(),
            header,
        })
    }

    pub fn relative(&self) -> &Path {
        &self.relative
    }

    /// Name that is free in this library
    pub fn unique_name(&self, base: &str) -> String {
        unique_name(base, &self.taken)
    }

    /// Add a symbol under `name`; `source` is the header of its library
    pub fn add(&mut self, name: String, symbol: List, source: Option<&SourceHeader>) {
        if let Some(source) = source {
            if source.version > self.header.version {
                self.header.version = source.version;
                if self.existing.is_none() {
                    self.header.generator_version = source.generator_version.clone();
                }
            }
        }
        self.taken.insert(name.clone());
        self.added.push((name, symbol));
    }

    /// Names added during this run
    pub fn added(&self) -> impl Iterator<Item = &str> {
        self.added.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.added.len()
    }

    /// Nothing was added
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
    }

    /// Apply `edit` to every added symbol; returns the summed edit count
    pub fn rewrite_added(&mut self, mut edit: impl FnMut(&mut List) -> usize) -> usize {
        self.added.iter_mut().map(|(_, symbol)| edit(symbol)).sum()
    }

    /// The library file: the existing library with the new symbols
    /// appended, or a new library
    pub fn to_document(&self) -> Document {
        let mut doc = match &self.existing {
            Some(existing) => {
                let mut doc = existing.clone();
                if let Some(version) = self.header.version {
                    let atom = doc.root_mut().find_mut("version").and_then(|v| v.atom_mut(1));
                    if let Some(atom) = atom {
                        if atom.value().parse::<u64>().is_ok_and(|old| old < version) {
                            atom.set_value(version.to_string());
                        }
                    }
                }
                doc
            }
            None => Document::new(self.new_root()),
        };

        let root = doc.root_mut();
        for (_, symbol) in &self.added {
            root.items.push(Sexpr::List(symbol.clone()));
        }
        doc
    }

    fn new_root(&self) -> List {
        let version = self.header.version.unwrap_or(DEFAULT_VERSION);
        let mut root = List::new(SYMBOL_LIB_KEYWORD)
            .with(List::new("version").with(Atom::symbol(version.to_string())))
            .with_string("generator", GENERATOR);
        if let Some(generator_version) = &self.header.generator_version {
            root = root.with_string("generator_version", generator_version.clone());
        }
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    const LIBRARY: &str = r#"(kicad_symbol_lib (version 20231120) (generator "kicad_symbol_editor") (generator_version "8.0")
  (symbol "R" (pin_numbers hide)
    (property "Reference" "R" (at 2.032 0 90))
    (property "Footprint" "" (at -1.778 0 90))
    (symbol "R_0_1"
      (rectangle (start -1.016 -2.54) (end 1.016 2.54)))
    (symbol "R_1_1"
      (pin passive line (at 0 3.81 270) (length 1.27)))
  )
)
"#;

    fn resistor() -> List {
        let doc = Document::parse(LIBRARY).unwrap();
        find_symbol(doc.root(), "R").unwrap().clone()
    }

    #[test]
    fn test_find_symbol_ignores_units() {
        let doc = Document::parse(LIBRARY).unwrap();
        assert!(find_symbol(doc.root(), "R").is_some());
        assert!(find_symbol(doc.root(), "R_0_1").is_none());
    }

    #[test]
    fn test_new_library() {
        let dir = TempDir::new().unwrap();
        let mut lib = LocalSymbolLibrary::open(dir.path(), "demo.kicad_sym").unwrap();
        let header = SourceHeader::of(Document::parse(LIBRARY).unwrap().root());
        lib.add("R".to_string(), resistor(), Some(&header));

        let text = lib.to_document().to_string();
        assert!(text.starts_with(
            "(kicad_symbol_lib\n  (version 20231120)\n  (generator \"kicad_liberator\")\n  (generator_version \"8.0\")\n  (symbol \"R\" (pin_numbers hide)"
        ));
        assert!(text.ends_with("  )\n)\n"));

        let reparsed = Document::parse(&text).unwrap();
        assert_eq!(reparsed.root().find_all("symbol").count(), 1);
    }

    #[test]
    fn test_renamed_symbol_units() {
        let mut symbol = resistor();
        rename_symbol(&mut symbol, "R", "R_01");

        let units: Vec<&str> = symbol
            .find_all("symbol")
            .filter_map(|s| s.atom(1))
            .collect();
        assert_eq!(symbol.atom(1), Some("R_01"));
        assert_eq!(units, vec!["R_01_0_1", "R_01_1_1"]);
    }

    #[test]
    fn test_append_to_existing_library() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("demo.kicad_sym"), LIBRARY).unwrap();

        let mut lib = LocalSymbolLibrary::open(dir.path(), "demo.kicad_sym").unwrap();
        assert_eq!(lib.unique_name("R"), "R_01");

        let mut symbol = resistor();
        rename_symbol(&mut symbol, "R", "R_01");
        lib.add("R_01".to_string(), symbol, None);

        let text = lib.to_document().to_string();
        let expected_prefix = LIBRARY.trim_end().strip_suffix(')').unwrap();
        assert!(text.starts_with(expected_prefix));
        let reparsed = Document::parse(&text).unwrap();
        let names: Vec<&str> = reparsed
            .root()
            .find_all("symbol")
            .filter_map(|s| s.atom(1))
            .collect();
        assert_eq!(names, vec!["R", "R_01"]);
    }

    #[test]
    fn test_empty_library() {
        let dir = TempDir::new().unwrap();
        let lib = LocalSymbolLibrary::open(dir.path(), "demo.kicad_sym").unwrap();
        assert!(lib.is_empty());
        assert_eq!(lib.added().count(), 0);
    }
}

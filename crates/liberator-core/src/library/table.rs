//! Library table files

use std::collections::BTreeSet;
use std::path::Path;

use super::{LibraryKind, KICAD_PLUGIN};
use crate::error::{LiberateError, Result};
use crate::io;
use crate::sexpr::{Atom, Document, List, Sexpr};

/// Table format version written into newly created tables
const TABLE_VERSION: &str = "7";

/// One `(lib ...)` entry of a library table
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryEntry {
    pub nickname: String,
    /// Plugin type, `KiCad` for the native format
    pub plugin: String,
    /// Storage location, possibly with `${VAR}` placeholders
    pub uri: String,
    pub options: String,
    pub descr: String,
    pub disabled: bool,
}

impl LibraryEntry {
    /// A native-format entry
    pub fn new(nickname: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            plugin: KICAD_PLUGIN.to_string(),
            uri: uri.into(),
            options: String::new(),
            descr: String::new(),
            disabled: false,
        }
    }

    fn from_list(lib: &List) -> std::result::Result<Self, String> {
        let nickname = lib.value_of("name").ok_or("library entry without a name")?;
        let uri = lib
            .value_of("uri")
            .ok_or_else(|| format!("library '{}' has no uri", nickname))?;

        Ok(Self {
            nickname: nickname.to_string(),
            plugin: lib.value_of("type").unwrap_or(KICAD_PLUGIN).to_string(),
            uri: uri.to_string(),
            options: lib.value_of("options").unwrap_or_default().to_string(),
            descr: lib.value_of("descr").unwrap_or_default().to_string(),
            disabled: lib.find("disabled").is_some(),
        })
    }

    /// The entry on one line, as KiCad writes it
    pub fn to_list(&self) -> List {
        let field = |keyword: &str, value: &str, leading: &str| {
            let mut list = List::new(keyword).with(Atom::string(value));
            list.set_leading(Some(leading.to_string()));
            list
        };

        let mut lib = List::new("lib")
            .with(field("name", &self.nickname, " "))
            .with(field("type", &self.plugin, ""))
            .with(field("uri", &self.uri, ""))
            .with(field("options", &self.options, ""))
            .with(field("descr", &self.descr, ""));
        if self.disabled {
            let mut disabled = List::new("disabled");
            disabled.set_leading(Some(String::new()));
            lib.push(disabled);
        }
        lib.set_trailing(Some(String::new()));
        lib
    }
}

/// Entries of one table file, in file order
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryTable {
    pub kind: LibraryKind,
    pub entries: Vec<LibraryEntry>,
}

impl LibraryTable {
    /// Read the entries of a parsed table
    ///
    /// Nicknames must be unique within one table.
    pub fn from_document(kind: LibraryKind, doc: &Document) -> std::result::Result<Self, String> {
        let root = doc.root();
        if root.keyword() != Some(kind.table_keyword()) {
            return Err(format!(
                "expected a {} table, found '{}'",
                kind.table_keyword(),
                root.keyword().unwrap_or_default()
            ));
        }

        let mut seen = BTreeSet::new();
        let mut entries = Vec::new();
        for lib in root.find_all("lib") {
            let entry = LibraryEntry::from_list(lib)?;
            if !seen.insert(entry.nickname.clone()) {
                return Err(format!("duplicate library nickname '{}'", entry.nickname));
            }
            entries.push(entry);
        }

        Ok(Self { kind, entries })
    }

    pub fn load(kind: LibraryKind, path: &Path) -> Result<Self> {
        let doc = io::read_document(path)?;
        Self::from_document(kind, &doc).map_err(|message| {
            LiberateError::Configuration(format!("{}: {}", path.display(), message))
        })
    }

    pub fn get(&self, nickname: &str) -> Option<&LibraryEntry> {
        self.entries.iter().find(|e| e.nickname == nickname)
    }

    /// An empty table document of the given kind
    pub fn empty_document(kind: LibraryKind) -> Document {
        let version = List::new("version").with(Atom::symbol(TABLE_VERSION));
        Document::new(List::new(kind.table_keyword()).with(version))
    }
}

/// Add `entry` to a table document, replacing an entry with the same
/// nickname in place; all other entries keep their text
pub fn set_entry(doc: &mut Document, entry: &LibraryEntry) {
    let root = doc.root_mut();
    let existing = root.lists_mut().find(|lib| {
        lib.keyword() == Some("lib") && lib.value_of("name") == Some(entry.nickname.as_str())
    });

    match existing {
        Some(lib) => {
            let leading = lib.leading().map(str::to_string);
            *lib = entry.to_list();
            lib.set_leading(leading);
        }
        None => root.items.push(Sexpr::List(entry.to_list())),
    }
}

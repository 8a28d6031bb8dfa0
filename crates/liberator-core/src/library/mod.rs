//! Library tables
//!
//! KiCad finds libraries through two tables per kind: a global one in the
//! configuration directory and an optional one next to the project. Entries
//! of the project table replace global entries with the same nickname.
//!
//! ```text
//! (sym_lib_table
//!   (version 7)
//!   (lib (name "Device")(type "KiCad")(uri "${KICAD8_SYMBOL_DIR}/Device.kicad_sym")(options "")(descr ""))
//! )
//! ```

mod table;

pub use table::{set_entry, LibraryEntry, LibraryTable};

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{EnvBindings, HostConfig, FOOTPRINT_TABLE, PROJECT_DIR_VAR, SYMBOL_TABLE};
use crate::error::{LiberateError, Result};
use crate::reference::ItemKind;

/// Plugin type of libraries in KiCad's own S-expression format
pub const KICAD_PLUGIN: &str = "KiCad";

/// Kind of library a table lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LibraryKind {
    Symbol,
    Footprint,
}

impl LibraryKind {
    pub const ALL: [LibraryKind; 2] = [LibraryKind::Symbol, LibraryKind::Footprint];

    /// Root keyword of the table file
    pub fn table_keyword(self) -> &'static str {
        match self {
            LibraryKind::Symbol => "sym_lib_table",
            LibraryKind::Footprint => "fp_lib_table",
        }
    }

    /// File name of the table, globally and in a project
    pub fn table_file(self) -> &'static str {
        match self {
            LibraryKind::Symbol => SYMBOL_TABLE,
            LibraryKind::Footprint => FOOTPRINT_TABLE,
        }
    }

    pub fn item_kind(self) -> ItemKind {
        match self {
            LibraryKind::Symbol => ItemKind::Symbol,
            LibraryKind::Footprint => ItemKind::Footprint,
        }
    }
}

impl fmt::Display for LibraryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LibraryKind::Symbol => "symbol",
            LibraryKind::Footprint => "footprint",
        })
    }
}

/// A table entry whose URI has been resolved to a path
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLibrary {
    pub entry: LibraryEntry,
    pub path: PathBuf,
    /// The library already lives inside the project
    pub project_local: bool,
}

impl ResolvedLibrary {
    /// Whether the library is stored in a format this crate reads
    pub fn is_readable(&self) -> bool {
        self.entry.plugin.eq_ignore_ascii_case(KICAD_PLUGIN)
    }
}

/// Merged global and project tables of both kinds
#[derive(Debug, Clone, Default)]
pub struct LibraryTables {
    symbols: BTreeMap<String, ResolvedLibrary>,
    footprints: BTreeMap<String, ResolvedLibrary>,
}

impl LibraryTables {
    /// Load the global tables from the configuration directory and overlay
    /// the project tables found in `project_dir`
    ///
    /// A missing global table is a configuration error; a missing project
    /// table counts as empty.
    pub fn load(config: &HostConfig, bindings: &EnvBindings, project_dir: &Path) -> Result<Self> {
        let mut tables = LibraryTables::default();

        for kind in LibraryKind::ALL {
            let global_path = config.config_dir.join(kind.table_file());
            if !global_path.is_file() {
                return Err(LiberateError::Configuration(format!(
                    "global {} library table not found: {}",
                    kind,
                    global_path.display()
                )));
            }
            let global = LibraryTable::load(kind, &global_path)?;

            let project_path = project_dir.join(kind.table_file());
            let project = if project_path.is_file() {
                Some(LibraryTable::load(kind, &project_path)?)
            } else {
                None
            };

            let merged = tables.map_mut(kind);
            for entry in global.entries.iter().chain(project.iter().flat_map(|t| &t.entries)) {
                let resolved = resolve_entry(entry, bindings, project_dir)?;
                merged.insert(entry.nickname.clone(), resolved);
            }

            tracing::debug!(
                "{} library table: {} global, {} project entries",
                kind,
                global.entries.len(),
                project.as_ref().map_or(0, |t| t.entries.len())
            );
        }

        Ok(tables)
    }

    pub fn symbol(&self, nickname: &str) -> Option<&ResolvedLibrary> {
        self.symbols.get(nickname)
    }

    pub fn footprint(&self, nickname: &str) -> Option<&ResolvedLibrary> {
        self.footprints.get(nickname)
    }

    pub fn get(&self, kind: LibraryKind, nickname: &str) -> Option<&ResolvedLibrary> {
        match kind {
            LibraryKind::Symbol => self.symbol(nickname),
            LibraryKind::Footprint => self.footprint(nickname),
        }
    }

    pub fn len(&self, kind: LibraryKind) -> usize {
        match kind {
            LibraryKind::Symbol => self.symbols.len(),
            LibraryKind::Footprint => self.footprints.len(),
        }
    }

    fn map_mut(&mut self, kind: LibraryKind) -> &mut BTreeMap<String, ResolvedLibrary> {
        match kind {
            LibraryKind::Symbol => &mut self.symbols,
            LibraryKind::Footprint => &mut self.footprints,
        }
    }
}

fn resolve_entry(
    entry: &LibraryEntry,
    bindings: &EnvBindings,
    project_dir: &Path,
) -> Result<ResolvedLibrary> {
    let resolved = PathBuf::from(bindings.resolve(&entry.uri)?);
    let path = if resolved.is_relative() {
        project_dir.join(resolved)
    } else {
        resolved
    };

    let project_local =
        EnvBindings::starts_with_var(&entry.uri, PROJECT_DIR_VAR) || path.starts_with(project_dir);

    Ok(ResolvedLibrary {
        entry: entry.clone(),
        path,
        project_local,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::COMMON_JSON;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        config: TempDir,
        project: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let config = TempDir::new().unwrap();
            fs::write(
                config.path().join(COMMON_JSON),
                r#"{"environment": {"vars": {"LIBS": "/opt/kicad"}}}"#,
            )
            .unwrap();
            fs::write(
                config.path().join(SYMBOL_TABLE),
                r#"(sym_lib_table
  (version 7)
  (lib (name "Device")(type "KiCad")(uri "${LIBS}/Device.kicad_sym")(options "")(descr "Generic"))
  (lib (name "Shared")(type "KiCad")(uri "${LIBS}/Shared.kicad_sym")(options "")(descr ""))
)
"#,
            )
            .unwrap();
            fs::write(
                config.path().join(FOOTPRINT_TABLE),
                r#"(fp_lib_table
  (version 7)
  (lib (name "Resistor_SMD")(type "KiCad")(uri "${LIBS}/Resistor_SMD.pretty")(options "")(descr ""))
  (lib (name "Old")(type "Legacy")(uri "${LIBS}/old.mod")(options "")(descr ""))
)
"#,
            )
            .unwrap();

            Self {
                config,
                project: TempDir::new().unwrap(),
            }
        }

        fn load(&self) -> Result<LibraryTables> {
            let config = HostConfig::new(self.config.path());
            let bindings = config.bindings(self.project.path())?;
            LibraryTables::load(&config, &bindings, self.project.path())
        }
    }

    #[test]
    fn test_global_tables() {
        let fixture = Fixture::new();
        let tables = fixture.load().unwrap();

        let device = tables.symbol("Device").unwrap();
        assert_eq!(device.path, PathBuf::from("/opt/kicad/Device.kicad_sym"));
        assert_eq!(device.entry.descr, "Generic");
        assert!(!device.project_local);
        assert!(device.is_readable());

        assert!(!tables.footprint("Old").unwrap().is_readable());
        assert!(tables.symbol("Resistor_SMD").is_none());
        assert_eq!(tables.len(LibraryKind::Footprint), 2);
    }

    #[test]
    fn test_project_table_overrides_global() {
        let fixture = Fixture::new();
        fs::write(
            fixture.project.path().join(SYMBOL_TABLE),
            r#"(sym_lib_table
  (lib (name "Shared")(type "KiCad")(uri "${KIPRJMOD}/shared.kicad_sym")(options "")(descr ""))
  (lib (name "Mine")(type "KiCad")(uri "libs/mine.kicad_sym")(options "")(descr ""))
)"#,
        )
        .unwrap();

        let tables = fixture.load().unwrap();
        let shared = tables.symbol("Shared").unwrap();
        assert_eq!(shared.path, fixture.project.path().join("shared.kicad_sym"));
        assert!(shared.project_local);

        let mine = tables.symbol("Mine").unwrap();
        assert_eq!(mine.path, fixture.project.path().join("libs/mine.kicad_sym"));
        assert!(mine.project_local);
        assert_eq!(tables.len(LibraryKind::Symbol), 3);
    }

    #[test]
    fn test_missing_global_table() {
        let fixture = Fixture::new();
        fs::remove_file(fixture.config.path().join(FOOTPRINT_TABLE)).unwrap();
        assert!(matches!(
            fixture.load().unwrap_err(),
            LiberateError::Configuration(_)
        ));
    }

    #[test]
    fn test_plugin_manager_entries_resolve() {
        let fixture = Fixture::new();
        fs::write(
            fixture.config.path().join(SYMBOL_TABLE),
            r#"(sym_lib_table
  (version 7)
  (lib (name "Device")(type "KiCad")(uri "${LIBS}/Device.kicad_sym")(options "")(descr ""))
  (lib (name "PCM_Espressif")(type "KiCad")(uri "${KICAD8_3RD_PARTY}/symbols/com_github_espressif/Espressif.kicad_sym")(options "")(descr ""))
)
"#,
        )
        .unwrap();

        let config = HostConfig::new(fixture.config.path()).with_documents_dir("/home/me/kicad");
        let bindings = config.bindings(fixture.project.path()).unwrap();
        let tables = LibraryTables::load(&config, &bindings, fixture.project.path()).unwrap();

        let espressif = tables.symbol("PCM_Espressif").unwrap();
        assert_eq!(
            espressif.path,
            Path::new("/home/me/kicad")
                .join("8.0")
                .join("3rdparty")
                .join("symbols/com_github_espressif/Espressif.kicad_sym")
        );
        assert!(!espressif.project_local);
    }

    #[test]
    fn test_unresolved_uri_is_fatal() {
        let fixture = Fixture::new();
        fs::write(
            fixture.project.path().join(FOOTPRINT_TABLE),
            r#"(fp_lib_table (lib (name "X")(type "KiCad")(uri "${NOWHERE}/X.pretty")(options "")(descr "")))"#,
        )
        .unwrap();

        match fixture.load().unwrap_err() {
            LiberateError::UnresolvedVariable { name, .. } => assert_eq!(name, "NOWHERE"),
            other => panic!("Expected unresolved variable, got {other}"),
        }
    }
}

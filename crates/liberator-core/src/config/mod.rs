//! Host configuration
//!
//! Everything the pipeline needs to know about the KiCad installation on this
//! machine (where the global configuration lives, where the stock libraries
//! are installed, what the process environment looks like) is gathered once
//! into a [`HostConfig`] and passed in explicitly. Discovery of the
//! platform-specific locations lives in [`discovery`] and is only used by
//! front ends; tests build a `HostConfig` by hand.

pub mod discovery;
mod env;
mod legacy;

pub use env::EnvBindings;

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{LiberateError, Result};

/// Name of the KiCad 6+ global settings file
pub const COMMON_JSON: &str = "kicad_common.json";

/// Name of the KiCad 5 global settings file
pub const COMMON_LEGACY: &str = "kicad_common";

/// Global symbol library table file name
pub const SYMBOL_TABLE: &str = "sym-lib-table";

/// Global footprint library table file name
pub const FOOTPRINT_TABLE: &str = "fp-lib-table";

/// Project directory variable, always bound to the source project
pub const PROJECT_DIR_VAR: &str = "KIPRJMOD";

/// KiCad versions whose versioned path variables get installation defaults
const DEFAULT_VAR_VERSIONS: &[&str] = &["6", "7", "8", "9", "10"];

/// Explicit description of the host KiCad setup
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Directory holding `kicad_common.json` and the global library tables
    pub config_dir: PathBuf,

    /// Shared data directory of the KiCad installation
    /// (the one containing `symbols/`, `footprints/` and `3dmodels/`)
    pub install_dir: Option<PathBuf>,

    /// Per-user KiCad data directory holding one `<version>.0/` directory
    /// per major version, where the Plugin and Content Manager installs
    /// into `3rdparty/`
    pub documents_dir: Option<PathBuf>,

    /// Snapshot of the process environment
    pub environment: BTreeMap<String, String>,
}

/// The parts of the global settings file the liberator uses
#[derive(Debug, Clone, Default)]
pub struct CommonSettings {
    /// User-defined path variables
    pub env_vars: BTreeMap<String, String>,

    /// File the settings were read from
    pub source: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct CommonJson {
    #[serde(default)]
    environment: EnvironmentJson,
}

#[derive(Debug, Default, Deserialize)]
struct EnvironmentJson {
    #[serde(default)]
    vars: Option<BTreeMap<String, String>>,
}

impl HostConfig {
    /// Configuration rooted at `config_dir`, with no installation and an
    /// empty environment
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            install_dir: None,
            documents_dir: None,
            environment: BTreeMap::new(),
        }
    }

    pub fn with_install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_dir = Some(dir.into());
        self
    }

    pub fn with_documents_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.documents_dir = Some(dir.into());
        self
    }

    pub fn with_environment<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.environment = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Version of the configuration directory, e.g. `8.0` for
    /// `~/.config/kicad/8.0`
    pub fn config_version(&self) -> Option<&str> {
        let name = self.config_dir.file_name()?.to_str()?;
        let major = name.split('.').next()?;
        major.parse::<u32>().ok().map(|_| name)
    }

    pub fn symbol_table_path(&self) -> PathBuf {
        self.config_dir.join(SYMBOL_TABLE)
    }

    pub fn footprint_table_path(&self) -> PathBuf {
        self.config_dir.join(FOOTPRINT_TABLE)
    }

    /// Load the global settings file
    ///
    /// `kicad_common.json` is preferred; the KiCad 5 INI-style `kicad_common`
    /// is read when no JSON file exists. Having neither is an error.
    pub fn common_settings(&self) -> Result<CommonSettings> {
        let json_path = self.config_dir.join(COMMON_JSON);
        if json_path.is_file() {
            let content =
                fs::read_to_string(&json_path).map_err(|e| LiberateError::io(&json_path, e))?;
            let parsed: CommonJson = serde_json::from_str(&content).map_err(|e| {
                LiberateError::Configuration(format!(
                    "cannot parse {}: {}",
                    json_path.display(),
                    e
                ))
            })?;
            return Ok(CommonSettings {
                env_vars: parsed.environment.vars.unwrap_or_default(),
                source: json_path,
            });
        }

        let legacy_path = self.config_dir.join(COMMON_LEGACY);
        if legacy_path.is_file() {
            let content = fs::read_to_string(&legacy_path)
                .map_err(|e| LiberateError::io(&legacy_path, e))?;
            let parsed = legacy::LegacyCommon::parse(&content);
            return Ok(CommonSettings {
                env_vars: parsed.section("EnvironmentVariables"),
                source: legacy_path,
            });
        }

        Err(LiberateError::Configuration(format!(
            "no KiCad configuration ({} or {}) in {}",
            COMMON_JSON,
            COMMON_LEGACY,
            self.config_dir.display()
        )))
    }

    /// Path variable bindings for a project in `project_dir`
    ///
    /// Precedence from lowest to highest: installation and per-user
    /// defaults, variables from the global settings, the process
    /// environment, and `KIPRJMOD`.
    pub fn bindings(&self, project_dir: &Path) -> Result<EnvBindings> {
        let settings = self.common_settings()?;
        let mut bindings = EnvBindings::new();

        if let Some(install) = &self.install_dir {
            for (name, value) in installation_defaults(install) {
                bindings.set(name, value);
            }
        }
        if let Some(documents) = &self.documents_dir {
            for (name, value) in user_defaults(documents, self.config_version()) {
                bindings.set(name, value);
            }
        }
        for (name, value) in &settings.env_vars {
            bindings.set(name.clone(), value.clone());
        }
        for (name, value) in &self.environment {
            bindings.set(name.clone(), value.clone());
        }
        bindings.set(PROJECT_DIR_VAR, project_dir.to_string_lossy().into_owned());

        tracing::debug!(
            "Loaded {} path variables ({} from {})",
            bindings.len(),
            settings.env_vars.len(),
            settings.source.display()
        );
        Ok(bindings)
    }
}

/// Variables KiCad defines implicitly from its installation directory
fn installation_defaults(install: &Path) -> Vec<(String, String)> {
    let dir = |sub: &str| install.join(sub).to_string_lossy().into_owned();

    let mut vars = vec![
        ("KICAD_SYMBOL_DIR".to_string(), dir("library")),
        ("KISYSMOD".to_string(), dir("modules")),
        ("KISYS3DMOD".to_string(), dir("modules/packages3d")),
        ("KICAD_TEMPLATE_DIR".to_string(), dir("template")),
    ];
    for version in DEFAULT_VAR_VERSIONS {
        vars.push((format!("KICAD{}_SYMBOL_DIR", version), dir("symbols")));
        vars.push((format!("KICAD{}_FOOTPRINT_DIR", version), dir("footprints")));
        vars.push((format!("KICAD{}_3DMODEL_DIR", version), dir("3dmodels")));
        vars.push((format!("KICAD{}_TEMPLATE_DIR", version), dir("template")));
    }
    vars
}

/// Variables KiCad defines implicitly from the per-user data directory
fn user_defaults(documents: &Path, current: Option<&str>) -> Vec<(String, String)> {
    let dir = |path: PathBuf| path.to_string_lossy().into_owned();

    let mut vars: Vec<(String, String)> = DEFAULT_VAR_VERSIONS
        .iter()
        .map(|version| {
            (
                format!("KICAD{}_3RD_PARTY", version),
                dir(documents.join(format!("{}.0", version)).join("3rdparty")),
            )
        })
        .collect();
    if let Some(current) = current {
        vars.push((
            "KICAD_USER_TEMPLATE_DIR".to_string(),
            dir(documents.join(current).join("template")),
        ));
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_json_settings() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(COMMON_JSON),
            r#"{"environment": {"show_warning_dialog": false, "vars": {"MY_LIBS": "/opt/libs"}}}"#,
        )
        .unwrap();

        let settings = HostConfig::new(dir.path()).common_settings().unwrap();
        assert_eq!(settings.env_vars.get("MY_LIBS").map(String::as_str), Some("/opt/libs"));
    }

    #[test]
    fn test_null_vars() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(COMMON_JSON), r#"{"environment": {"vars": null}}"#).unwrap();

        let settings = HostConfig::new(dir.path()).common_settings().unwrap();
        assert!(settings.env_vars.is_empty());
    }

    #[test]
    fn test_corrupt_settings_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(COMMON_JSON), "{ not json").unwrap();

        let err = HostConfig::new(dir.path()).common_settings().unwrap_err();
        assert!(matches!(err, LiberateError::Configuration(_)));
    }

    #[test]
    fn test_missing_settings_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let err = HostConfig::new(dir.path()).common_settings().unwrap_err();
        assert!(matches!(err, LiberateError::Configuration(_)));
    }

    #[test]
    fn test_legacy_settings() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(COMMON_LEGACY),
            "Editor=\nWorkingDir=/home/user\n[EnvironmentVariables]\nKISYSMOD=/usr/share/kicad/modules\n",
        )
        .unwrap();

        let settings = HostConfig::new(dir.path()).common_settings().unwrap();
        assert_eq!(
            settings.env_vars.get("KISYSMOD").map(String::as_str),
            Some("/usr/share/kicad/modules")
        );
    }

    #[test]
    fn test_binding_precedence() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(COMMON_JSON),
            r#"{"environment": {"vars": {"KICAD8_SYMBOL_DIR": "/from/settings", "SHARED": "/settings"}}}"#,
        )
        .unwrap();

        let config = HostConfig::new(dir.path())
            .with_install_dir("/usr/share/kicad")
            .with_environment([("SHARED", "/env"), ("KIPRJMOD", "/ignored")]);
        let bindings = config.bindings(Path::new("/work/board")).unwrap();

        assert_eq!(bindings.get("KICAD8_SYMBOL_DIR"), Some("/from/settings"));
        assert_eq!(bindings.get("SHARED"), Some("/env"));
        assert_eq!(bindings.get("KIPRJMOD"), Some("/work/board"));
        assert_eq!(
            bindings.get("KICAD7_FOOTPRINT_DIR").map(PathBuf::from),
            Some(PathBuf::from("/usr/share/kicad").join("footprints"))
        );
    }

    #[test]
    fn test_third_party_defaults() {
        let dir = TempDir::new().unwrap();
        let config_dir = dir.path().join("8.0");
        fs::create_dir(&config_dir).unwrap();
        fs::write(
            config_dir.join(COMMON_JSON),
            r#"{"environment": {"vars": {"KICAD7_3RD_PARTY": "/settings/3rdparty"}}}"#,
        )
        .unwrap();

        let documents = dir.path().join("share");
        let config = HostConfig::new(&config_dir)
            .with_documents_dir(&documents)
            .with_environment([("KICAD9_3RD_PARTY", "/env/3rdparty")]);
        let bindings = config.bindings(Path::new("/work/board")).unwrap();

        assert_eq!(config.config_version(), Some("8.0"));
        assert_eq!(
            bindings.get("KICAD8_3RD_PARTY").map(PathBuf::from),
            Some(documents.join("8.0").join("3rdparty"))
        );
        assert_eq!(bindings.get("KICAD7_3RD_PARTY"), Some("/settings/3rdparty"));
        assert_eq!(bindings.get("KICAD9_3RD_PARTY"), Some("/env/3rdparty"));
        assert_eq!(
            bindings.get("KICAD_USER_TEMPLATE_DIR").map(PathBuf::from),
            Some(documents.join("8.0").join("template"))
        );
    }

    #[test]
    fn test_unversioned_config_has_no_user_template_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(COMMON_LEGACY), "").unwrap();

        let config = HostConfig::new(dir.path()).with_documents_dir("/home/me/kicad");
        let bindings = config.bindings(Path::new("/work/board")).unwrap();

        assert!(bindings.get("KICAD6_3RD_PARTY").is_some());
        assert_eq!(bindings.get("KICAD_USER_TEMPLATE_DIR"), None);
    }
}

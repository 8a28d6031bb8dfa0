//! Platform-specific discovery of the KiCad configuration and installation
//!
//! KiCad keeps one configuration directory per major version below a
//! platform base directory:
//!
//! ```text
//! Linux    ~/.config/kicad/8.0/
//! macOS    ~/Library/Preferences/kicad/8.0/
//! Windows  %APPDATA%\kicad\8.0\
//! ```
//!
//! KiCad 5 used the base directory itself. `KICAD_CONFIG_HOME` replaces the
//! base directory, exactly as it does for KiCad.
//!
//! Per-user data such as Plugin and Content Manager packages lives in a
//! separate tree (`~/.local/share/kicad/8.0/3rdparty` on Linux,
//! `Documents/KiCad/8.0/3rdparty` elsewhere), moved by `KICAD_DOCUMENTS_HOME`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::{HostConfig, COMMON_JSON, COMMON_LEGACY};
use crate::error::{LiberateError, Result};

/// Environment variable overriding the configuration base directory
pub const CONFIG_HOME_VAR: &str = "KICAD_CONFIG_HOME";

/// Environment variable pointing at the shared data directory of an installation
pub const INSTALL_DIR_VAR: &str = "KICAD_INSTALL_DIR";

/// Environment variable replacing the per-user data directory
pub const DOCUMENTS_HOME_VAR: &str = "KICAD_DOCUMENTS_HOME";

impl HostConfig {
    /// Discover the configuration of the current host
    ///
    /// Reads the process environment once; the resulting object is the only
    /// place the pipeline looks for host state.
    pub fn discover() -> Result<Self> {
        Self::discover_with(None, None)
    }

    /// Discovery with explicit directories taking the place of the
    /// configuration directory and the installation
    pub fn discover_with(
        config_dir: Option<PathBuf>,
        install_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let environment: BTreeMap<String, String> = std::env::vars().collect();

        let config_dir = match config_dir {
            Some(dir) => dir,
            None => {
                let base = match environment.get(CONFIG_HOME_VAR) {
                    Some(dir) => PathBuf::from(dir),
                    None => default_config_base()?,
                };
                select_version_dir(&base)
            }
        };

        let install_dir = install_dir
            .or_else(|| environment.get(INSTALL_DIR_VAR).map(PathBuf::from))
            .or_else(|| default_install_dir(&environment));

        let documents_dir = environment
            .get(DOCUMENTS_HOME_VAR)
            .map(PathBuf::from)
            .or_else(default_documents_dir);

        tracing::debug!(
            "KiCad configuration: {}, installation: {}",
            config_dir.display(),
            install_dir
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );

        Ok(HostConfig {
            config_dir,
            install_dir,
            documents_dir,
            environment,
        })
    }
}

fn default_config_base() -> Result<PathBuf> {
    let base = dirs::preference_dir()
        .or_else(dirs::config_dir)
        .map(|dir| dir.join("kicad"))
        .ok_or_else(|| {
            LiberateError::Configuration(
                "could not determine the user configuration directory".to_string(),
            )
        })?;

    // Flatpak builds keep their settings inside the sandbox
    if cfg!(target_os = "linux") && !has_settings_below(&base) {
        if let Some(home) = dirs::home_dir() {
            let flatpak = home.join(".var/app/org.kicad.KiCad/config/kicad");
            if has_settings_below(&flatpak) {
                return Ok(flatpak);
            }
        }
    }

    Ok(base)
}

fn has_settings(dir: &Path) -> bool {
    dir.join(COMMON_JSON).is_file() || dir.join(COMMON_LEGACY).is_file()
}

fn has_settings_below(base: &Path) -> bool {
    has_settings(base) || versioned_dirs(base).iter().any(|(_, dir)| has_settings(dir))
}

fn parse_version(name: &str) -> Option<Vec<u32>> {
    name.split('.').map(|part| part.parse().ok()).collect()
}

fn versioned_dirs(base: &Path) -> Vec<(Vec<u32>, PathBuf)> {
    let Ok(entries) = fs::read_dir(base) else {
        return Vec::new();
    };

    let mut found: Vec<(Vec<u32>, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let version = parse_version(&entry.file_name().to_string_lossy())?;
            Some((version, entry.path()))
        })
        .collect();
    found.sort();
    found
}

/// Pick the newest versioned configuration directory below `base` that
/// holds a settings file, or `base` itself when there is none
pub fn select_version_dir(base: &Path) -> PathBuf {
    versioned_dirs(base)
        .into_iter()
        .rev()
        .map(|(_, dir)| dir)
        .find(|dir| dir.join(COMMON_JSON).is_file())
        .unwrap_or_else(|| base.to_path_buf())
}

fn default_documents_dir() -> Option<PathBuf> {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir().map(|dir| dir.join("kicad"))
    } else {
        dirs::document_dir().map(|dir| dir.join("KiCad"))
    }
}

fn default_install_dir(environment: &BTreeMap<String, String>) -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = if cfg!(target_os = "windows") {
        let program_files = environment
            .get("ProgramFiles")
            .cloned()
            .unwrap_or_else(|| r"C:\Program Files".to_string());
        versioned_dirs(&Path::new(&program_files).join("KiCad"))
            .into_iter()
            .rev()
            .map(|(_, dir)| dir.join("share").join("kicad"))
            .collect()
    } else if cfg!(target_os = "macos") {
        vec![PathBuf::from(
            "/Applications/KiCad/KiCad.app/Contents/SharedSupport",
        )]
    } else {
        vec![
            PathBuf::from("/usr/share/kicad"),
            PathBuf::from("/usr/local/share/kicad"),
        ]
    };

    candidates.into_iter().find(|dir| dir.is_dir())
}

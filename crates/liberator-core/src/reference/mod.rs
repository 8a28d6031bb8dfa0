//! Library references
//!
//! KiCad refers to library items by `nickname:item` identifiers (symbols and
//! footprints) and to 3D models by path templates such as
//! `${KICAD8_3DMODEL_DIR}/Resistor_SMD.3dshapes/R_0603_1608Metric.wrl`.
//! [`scanner`] collects them from schematics and boards and [`rewriter`]
//! points them at the project-local copies.

pub mod rewriter;
pub mod scanner;

pub use rewriter::RewriteMap;
pub use scanner::ReferenceSet;

use std::fmt;
use std::path::Path;

use crate::config::{EnvBindings, PROJECT_DIR_VAR};

/// What a reference points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ItemKind {
    Symbol,
    Footprint,
    Model,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItemKind::Symbol => "Symbol",
            ItemKind::Footprint => "Footprint",
            ItemKind::Model => "3D model",
        })
    }
}

/// A `nickname:item` library identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LibId {
    /// Library nickname; `None` for bare item names
    pub nickname: Option<String>,
    pub item: String,
}

impl LibId {
    pub fn new(nickname: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            nickname: Some(nickname.into()),
            item: item.into(),
        }
    }

    /// Split at the first `:`; an empty nickname counts as none
    pub fn parse(text: &str) -> Self {
        match text.split_once(':') {
            Some((nickname, item)) if !nickname.is_empty() => Self {
                nickname: Some(nickname.to_string()),
                item: item.to_string(),
            },
            Some((_, item)) => Self {
                nickname: None,
                item: item.to_string(),
            },
            None => Self {
                nickname: None,
                item: text.to_string(),
            },
        }
    }
}

impl fmt::Display for LibId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.nickname {
            Some(nickname) => write!(f, "{}:{}", nickname, self.item),
            None => f.write_str(&self.item),
        }
    }
}

/// Whether a 3D-model path template already lives inside the project
pub fn is_local_model(template: &str) -> bool {
    EnvBindings::starts_with_var(template, PROJECT_DIR_VAR)
        || (EnvBindings::placeholders(template).is_empty() && Path::new(template).is_relative())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lib_id() {
        assert_eq!(LibId::parse("Device:R"), LibId::new("Device", "R"));
        assert_eq!(
            LibId::parse("R_Small"),
            LibId {
                nickname: None,
                item: "R_Small".to_string()
            }
        );
        assert_eq!(LibId::parse(":R").nickname, None);
        assert_eq!(LibId::parse("Lib:Name:With:Colons").item, "Name:With:Colons");
    }

    #[test]
    fn test_lib_id_display() {
        assert_eq!(LibId::new("Device", "R").to_string(), "Device:R");
        assert_eq!(LibId::parse("R").to_string(), "R");
    }

    #[test]
    fn test_local_models() {
        assert!(is_local_model("${KIPRJMOD}/models/R.wrl"));
        assert!(is_local_model("models/R.wrl"));
        assert!(!is_local_model("${KICAD8_3DMODEL_DIR}/Resistor_SMD.3dshapes/R.wrl"));
        assert!(!is_local_model("/usr/share/kicad/3dmodels/R.wrl"));
    }
}

//! Path variable bindings and `${VAR}` substitution

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::error::{LiberateError, Result};

/// Matches `${NAME}` and `$(NAME)`
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]*)\}|\$\(([^)]*)\)").unwrap());

/// Mapping from variable name to value used to resolve library URIs and
/// 3D-model paths
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvBindings {
    vars: BTreeMap<String, String>,
}

impl EnvBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, replacing any earlier value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Substitute every placeholder in `template`
    pub fn resolve(&self, template: &str) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(template) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();

            let value = self.get(name).ok_or_else(|| LiberateError::UnresolvedVariable {
                name: name.to_string(),
                template: template.to_string(),
            })?;

            out.push_str(&template[last..whole.start()]);
            out.push_str(value);
            last = whole.end();
        }
        out.push_str(&template[last..]);

        Ok(out)
    }

    /// Names of all placeholders used in `template`, in order
    pub fn placeholders(template: &str) -> Vec<&str> {
        PLACEHOLDER
            .captures_iter(template)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str())
            .collect()
    }

    /// Whether `template` starts with the given variable
    pub fn starts_with_var(template: &str, name: &str) -> bool {
        template.starts_with(&format!("${{{}}}", name))
            || template.starts_with(&format!("$({})", name))
    }
}

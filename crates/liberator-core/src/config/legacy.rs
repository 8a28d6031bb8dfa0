//! KiCad 5 `kicad_common` reader
//!
//! The legacy settings file is INI-like but starts without a section header:
//! `key=value` lines, `[Section]` headers, blank lines. Lines starting with
//! `#` or `;` are comments.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct LegacyCommon {
    /// Section name -> key -> value; keys before the first header go under ""
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl LegacyCommon {
    pub fn parse(content: &str) -> Self {
        let mut common = LegacyCommon::default();
        let mut section = String::new();

        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            if let Some(name) = trimmed
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
            {
                section = name.trim().to_string();
                continue;
            }

            // Keys keep their case; KiCad variable names are case sensitive
            if let Some((key, value)) = trimmed.split_once('=') {
                common
                    .sections
                    .entry(section.clone())
                    .or_default()
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        common
    }

    /// Copy of a section's entries, empty if the section is absent
    pub fn section(&self, name: &str) -> BTreeMap<String, String> {
        self.sections.get(name).cloned().unwrap_or_default()
    }

    #[cfg(test)]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }
}

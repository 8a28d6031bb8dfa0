//! Reference rewriting
//!
//! Replaces liberated references in parsed schematics, boards and copied
//! library items. Only atoms whose value is a key of the [`RewriteMap`] are
//! touched, so every other byte of the file survives unchanged.

use std::collections::BTreeMap;

use super::LibId;
use crate::sexpr::{Document, List};

/// Old reference to new reference, for every liberated item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewriteMap {
    pub symbols: BTreeMap<LibId, LibId>,
    pub footprints: BTreeMap<LibId, LibId>,
    /// Old path template to new path template
    pub models: BTreeMap<String, String>,
}

impl RewriteMap {
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.footprints.is_empty() && self.models.is_empty()
    }

    pub fn len(&self) -> usize {
        self.symbols.len() + self.footprints.len() + self.models.len()
    }
}

/// Symbol `lib_id`s, the embedded `lib_symbols` cache, and `Footprint`
/// properties
///
/// A `lib_name` carrying the nickname of a rewritten `lib_id` names a
/// modified cache entry; it and that entry move to the new nickname.
pub fn rewrite_schematic(doc: &mut Document, map: &RewriteMap) -> usize {
    let root = doc.root_mut();
    let mut count = 0;
    let mut cache_keys: BTreeMap<String, String> = BTreeMap::new();

    for instance in root.find_all_mut("symbol") {
        let Some(atom) = instance.find_mut("lib_id").and_then(|l| l.atom_mut(1)) else {
            continue;
        };
        let old = LibId::parse(atom.value());
        let Some(new) = map.symbols.get(&old) else {
            continue;
        };
        atom.set_value(new.to_string());
        count += 1;

        let Some(atom) = instance.find_mut("lib_name").and_then(|l| l.atom_mut(1)) else {
            continue;
        };
        let key = LibId::parse(atom.value());
        if key.nickname.is_some() && key.nickname == old.nickname {
            let renamed = LibId {
                nickname: new.nickname.clone(),
                item: key.item,
            }
            .to_string();
            cache_keys.insert(atom.value().to_string(), renamed.clone());
            atom.set_value(renamed);
            count += 1;
        }
    }

    if let Some(cache) = root.find_mut("lib_symbols") {
        for symbol in cache.find_all_mut("symbol") {
            let Some(name) = symbol.atom(1) else {
                continue;
            };
            let old = LibId::parse(name);
            if let Some(new) = map.symbols.get(&old) {
                rename_symbol(symbol, &new.to_string(), &old.item, &new.item);
                count += 1;
            } else if let Some(renamed) = cache_keys.get(name).cloned() {
                if let Some(atom) = symbol.atom_mut(1) {
                    atom.set_value(renamed);
                    count += 1;
                }
            }
        }
    }

    count + rewrite_footprint_properties(root, map)
}

/// Footprint instance names, their `Footprint` properties and 3D models
pub fn rewrite_board(doc: &mut Document, map: &RewriteMap) -> usize {
    let root = doc.root_mut();
    let mut count = 0;

    let instances = root
        .lists_mut()
        .filter(|l| matches!(l.keyword(), Some("footprint") | Some("module")));
    for instance in instances {
        if let Some(atom) = instance.atom_mut(1) {
            if let Some(new) = map.footprints.get(&LibId::parse(atom.value())) {
                atom.set_value(new.to_string());
                count += 1;
            }
        }
        count += rewrite_models(instance, map);
    }

    count + rewrite_footprint_properties(root, map)
}

/// `(property "Footprint" ...)` anywhere below `list`
pub fn rewrite_footprint_properties(list: &mut List, map: &RewriteMap) -> usize {
    let mut count = 0;
    for child in list.lists_mut() {
        if child.keyword() == Some("property") && child.atom(1) == Some("Footprint") {
            if let Some(atom) = child.atom_mut(2) {
                if let Some(new) = map.footprints.get(&LibId::parse(atom.value())) {
                    atom.set_value(new.to_string());
                    count += 1;
                }
            }
        } else {
            count += rewrite_footprint_properties(child, map);
        }
    }
    count
}

/// `model` children of a footprint
pub fn rewrite_models(footprint: &mut List, map: &RewriteMap) -> usize {
    let mut count = 0;
    for model in footprint.find_all_mut("model") {
        if let Some(atom) = model.atom_mut(1) {
            if let Some(new) = map.models.get(atom.value()) {
                atom.set_value(new.clone());
                count += 1;
            }
        }
    }
    count
}

/// Rename a symbol definition to `full_name` and carry a change of item
/// name from `old_item` to `new_item` over to its unit sub-symbols
/// (`<item>_<unit>_<style>`)
pub fn rename_symbol(symbol: &mut List, full_name: &str, old_item: &str, new_item: &str) {
    if let Some(atom) = symbol.atom_mut(1) {
        atom.set_value(full_name);
    }
    if old_item == new_item {
        return;
    }

    let prefix = format!("{}_", old_item);
    for unit in symbol.find_all_mut("symbol") {
        if let Some(atom) = unit.atom_mut(1) {
            if let Some(suffix) = atom.value().strip_prefix(&prefix) {
                let renamed = format!("{}_{}", new_item, suffix);
                atom.set_value(renamed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn map() -> RewriteMap {
        let mut map = RewriteMap::default();
        map.symbols
            .insert(LibId::new("Device", "R"), LibId::new("Board", "R"));
        map.symbols
            .insert(LibId::new("Other", "R"), LibId::new("Board", "R_01"));
        map.footprints.insert(
            LibId::new("Resistor_SMD", "R_0603"),
            LibId::new("Board", "R_0603"),
        );
        map.models.insert(
            "${KICAD8_3DMODEL_DIR}/Resistor_SMD.3dshapes/R_0603.wrl".to_string(),
            "${KIPRJMOD}/models/R_0603.wrl".to_string(),
        );
        map
    }

    #[test]
    fn test_rewrite_schematic() {
        let text = r#"(kicad_sch
  (lib_symbols
    (symbol "Device:R" (property "Footprint" "Resistor_SMD:R_0603")
      (symbol "R_0_1"))
    (symbol "Other:R"
      (symbol "R_0_1") (symbol "R_1_1")))
  (symbol (lib_id "Device:R") (property "Footprint" "Resistor_SMD:R_0603"))
  (symbol (lib_id "Other:R") (property "Footprint" "Unknown:X"))
  (symbol (lib_id "power:GND"))
)"#;
        let mut doc = Document::parse(text).unwrap();
        let count = rewrite_schematic(&mut doc, &map());

        let expected = r#"(kicad_sch
  (lib_symbols
    (symbol "Board:R" (property "Footprint" "Board:R_0603")
      (symbol "R_0_1"))
    (symbol "Board:R_01"
      (symbol "R_01_0_1") (symbol "R_01_1_1")))
  (symbol (lib_id "Board:R") (property "Footprint" "Board:R_0603"))
  (symbol (lib_id "Board:R_01") (property "Footprint" "Unknown:X"))
  (symbol (lib_id "power:GND"))
)"#;
        assert_eq!(doc.to_string(), expected);
        assert_eq!(count, 6);
    }

    #[test]
    fn test_modified_cache_entry_follows_lib_id() {
        let text = r#"(kicad_sch
  (lib_symbols
    (symbol "Device:R_1"
      (symbol "R_1_0_1")))
  (symbol (lib_name "Device:R_1") (lib_id "Device:R"))
  (symbol (lib_name "GND_1") (lib_id "Device:R"))
  (symbol (lib_name "power:GND_1") (lib_id "power:GND"))
)"#;
        let mut doc = Document::parse(text).unwrap();
        let count = rewrite_schematic(&mut doc, &map());

        let expected = r#"(kicad_sch
  (lib_symbols
    (symbol "Board:R_1"
      (symbol "R_1_0_1")))
  (symbol (lib_name "Board:R_1") (lib_id "Board:R"))
  (symbol (lib_name "GND_1") (lib_id "Board:R"))
  (symbol (lib_name "power:GND_1") (lib_id "power:GND"))
)"#;
        assert_eq!(doc.to_string(), expected);
        assert_eq!(count, 4);
    }

    #[test]
    fn test_rewrite_board() {
        let text = r#"(kicad_pcb
	(footprint "Resistor_SMD:R_0603"
		(layer "F.Cu")
		(property "Footprint" "Resistor_SMD:R_0603")
		(model "${KICAD8_3DMODEL_DIR}/Resistor_SMD.3dshapes/R_0603.wrl"
			(offset (xyz 0 0 0)))
	)
	(footprint "Connector:TP" (layer "F.Cu"))
)"#;
        let mut doc = Document::parse(text).unwrap();
        let count = rewrite_board(&mut doc, &map());

        let expected = text
            .replace("\"Resistor_SMD:R_0603\"", "\"Board:R_0603\"")
            .replace(
                "${KICAD8_3DMODEL_DIR}/Resistor_SMD.3dshapes/R_0603.wrl",
                "${KIPRJMOD}/models/R_0603.wrl",
            );
        assert_eq!(doc.to_string(), expected);
        assert_eq!(count, 3);
    }

    #[test]
    fn test_unmapped_documents_untouched() {
        let text = "(kicad_pcb (footprint \"A:B\" (model \"/abs/b.wrl\")))";
        let mut doc = Document::parse(text).unwrap();
        assert_eq!(rewrite_board(&mut doc, &map()), 0);
        assert_eq!(doc.to_string(), text);
    }
}

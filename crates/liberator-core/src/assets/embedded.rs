//! Recovery of library items from the copies embedded in project files
//!
//! Schematics cache every symbol they use in `lib_symbols`, and boards carry
//! a full copy of every placed footprint. When the library itself is gone
//! these copies are the best remaining source.

use crate::project::Project;
use crate::reference::scanner::footprint_instances;
use crate::reference::LibId;
use crate::sexpr::{Atom, Document, List, Sexpr};

/// Board-only data of a placed footprint
const INSTANCE_FIELDS: &[&str] = &[
    "at", "path", "tstamp", "uuid", "sheetname", "sheetfile", "locked",
];

/// Flags that only make sense on a placed footprint
const INSTANCE_FLAGS: &[&str] = &["locked", "placed"];

/// Layer of footprints placed on the back of the board
const BACK_LAYER: &str = "B.Cu";

/// The cached definition of `id` from any schematic of the project
pub fn cached_symbol(project: &Project, id: &LibId) -> Option<List> {
    let name = id.to_string();
    project
        .schematics
        .iter()
        .filter_map(|sheet| sheet.document.root().find("lib_symbols"))
        .flat_map(|cache| cache.find_all("symbol"))
        .find(|symbol| symbol.atom(1) == Some(name.as_str()))
        .map(|symbol| {
            let mut symbol = symbol.clone();
            symbol.set_leading(None);
            symbol
        })
}

/// A library footprint rebuilt from the first front-side board instance
/// of `id`
pub fn board_footprint(project: &Project, id: &LibId) -> Option<Document> {
    let name = id.to_string();
    let board = project.board.as_ref()?;
    let instance = footprint_instances(board.document.root())
        .filter(|fp| fp.atom(1) == Some(name.as_str()))
        .find(|fp| fp.value_of("layer") != Some(BACK_LAYER))?;
    Some(Document::new(to_library_footprint(instance, &id.item)))
}

/// Strip placement and instance data from a board footprint
pub fn to_library_footprint(instance: &List, item: &str) -> List {
    let mut footprint = instance.clone();
    footprint.set_leading(None);

    let rotation = footprint
        .find("at")
        .and_then(|at| at.atom(3))
        .and_then(|angle| angle.parse::<f64>().ok())
        .unwrap_or(0.0);

    footprint.remove_where(|node| match node {
        Sexpr::List(list) => list
            .keyword()
            .is_some_and(|keyword| INSTANCE_FIELDS.contains(&keyword)),
        Sexpr::Atom(atom) => !atom.is_quoted() && INSTANCE_FLAGS.contains(&atom.value()),
    });

    if rotation != 0.0 {
        for child in footprint.lists_mut() {
            cancel_rotation(child, rotation);
        }
    }

    reset_texts(&mut footprint, item);
    for pad in footprint.find_all_mut("pad") {
        pad.remove_where(|node| node.as_list().and_then(List::keyword) == Some("net"));
    }

    if let Some(name) = footprint.atom_mut(1) {
        name.set_value(item);
    }
    footprint
}

/// Board coordinates include the footprint rotation in every child angle;
/// library footprints are stored unrotated. `model` rotations are already
/// relative to the footprint.
fn cancel_rotation(node: &mut List, rotation: f64) {
    if node.keyword() == Some("model") {
        return;
    }

    if let Some(at) = node.find_mut("at") {
        let angle = at
            .atom(3)
            .and_then(|a| a.parse::<f64>().ok())
            .unwrap_or(0.0);
        let corrected = format_angle(angle - rotation);
        match at.atom_mut(3) {
            Some(atom) => atom.set_value(corrected),
            None => at.push(Atom::symbol(corrected)),
        }
    }

    for child in node.lists_mut() {
        if child.keyword() != Some("at") {
            cancel_rotation(child, rotation);
        }
    }
}

/// Angle in [0, 360), without trailing zeros
fn format_angle(angle: f64) -> String {
    let normalized = angle.rem_euclid(360.0);
    let rounded = (normalized * 1e6).round() / 1e6;
    let rounded = if rounded >= 360.0 { 0.0 } else { rounded + 0.0 };

    let text = format!("{:.6}", rounded);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    text.to_string()
}

fn reset_texts(footprint: &mut List, item: &str) {
    if let Some(reference) = footprint.property_mut("Reference") {
        reference.set_value("REF**");
    }
    if let Some(value) = footprint.property_mut("Value") {
        value.set_value(item);
    }

    // KiCad 6 and 7 spell them as fp_text
    for text in footprint.find_all_mut("fp_text") {
        let replacement = match text.atom(1) {
            Some("reference") => "REF**",
            Some("value") => item,
            _ => continue,
        };
        if let Some(atom) = text.atom_mut(2) {
            atom.set_value(replacement);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PLACED: &str = r#"(footprint "Resistor_SMD:R_0603" locked (layer "F.Cu")
  (uuid "0f1e2d3c-0000-4000-8000-000000000003")
  (at 120.5 80 90)
  (property "Reference" "R7" (at 0 -1.43 90) (layer "F.SilkS"))
  (property "Value" "10k" (at 0 1.43 90) (layer "F.Fab"))
  (path "/6f1b2c1e-0000-4000-8000-000000000002")
  (fp_line (start -0.8 0.4) (end 0.8 0.4) (layer "F.Fab"))
  (pad "1" smd roundrect (at -0.825 0 90) (size 0.8 0.95) (layers "F.Cu") (net 1 "VCC"))
  (pad "2" smd roundrect (at 0.825 0 180) (size 0.8 0.95) (layers "F.Cu") (net 2 "GND"))
  (model "${KICAD8_3DMODEL_DIR}/Resistor_SMD.3dshapes/R_0603.wrl"
    (offset (xyz 0 0 0)) (rotate (xyz 0 0 0)))
)"#;

    #[test]
    fn test_to_library_footprint() {
        let doc = Document::parse(PLACED).unwrap();
        let footprint = to_library_footprint(doc.root(), "R_0603");

        let expected = r#"(footprint "R_0603" (layer "F.Cu")
  (property "Reference" "REF**" (at 0 -1.43 0) (layer "F.SilkS"))
  (property "Value" "R_0603" (at 0 1.43 0) (layer "F.Fab"))
  (fp_line (start -0.8 0.4) (end 0.8 0.4) (layer "F.Fab"))
  (pad "1" smd roundrect (at -0.825 0 0) (size 0.8 0.95) (layers "F.Cu"))
  (pad "2" smd roundrect (at 0.825 0 90) (size 0.8 0.95) (layers "F.Cu"))
  (model "${KICAD8_3DMODEL_DIR}/Resistor_SMD.3dshapes/R_0603.wrl"
    (offset (xyz 0 0 0)) (rotate (xyz 0 0 0)))
)"#;
        assert_eq!(footprint.to_string(), expected);
    }

    #[test]
    fn test_format_angle() {
        assert_eq!(format_angle(90.0), "90");
        assert_eq!(format_angle(-90.0), "270");
        assert_eq!(format_angle(360.0), "0");
        assert_eq!(format_angle(45.5 - 90.0), "315.5");
        assert_eq!(format_angle(-0.0000001), "0");
    }

    #[test]
    fn test_unrotated_footprint_keeps_angles() {
        let doc = Document::parse(
            r#"(footprint "Lib:TP" (layer "F.Cu") (at 1 2) (pad "1" smd circle (at 0 0)))"#,
        )
        .unwrap();
        let footprint = to_library_footprint(doc.root(), "TP");
        assert_eq!(
            footprint.to_string(),
            r#"(footprint "TP" (layer "F.Cu") (pad "1" smd circle (at 0 0)))"#
        );
    }
}

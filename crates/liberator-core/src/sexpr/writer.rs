//! Serialization of S-expression trees
//!
//! Parsed nodes are written with their recorded whitespace and spelling.
//! Nodes built in memory get KiCad's layout.

use super::{Atom, List, Sexpr};

const INDENT: &str = "  ";

pub(super) fn write_list(list: &List, out: &mut String, depth: usize) {
    match &list.leading {
        Some(leading) => out.push_str(leading),
        None if depth > 0 => {
            out.push('\n');
            push_indent(out, depth);
        }
        None => {}
    }

    out.push('(');
    for (index, item) in list.items.iter().enumerate() {
        match item {
            Sexpr::List(child) => write_list(child, out, depth + 1),
            Sexpr::Atom(atom) => write_atom(atom, out, index == 0),
        }
    }

    match &list.trailing {
        Some(trailing) => out.push_str(trailing),
        None if list.lists().next().is_some() => {
            out.push('\n');
            push_indent(out, depth);
        }
        None => {}
    }
    out.push(')');
}

fn write_atom(atom: &Atom, out: &mut String, first: bool) {
    match &atom.leading {
        Some(leading) => out.push_str(leading),
        None if !first => out.push(' '),
        None => {}
    }

    match &atom.raw {
        Some(raw) => out.push_str(raw),
        None if atom.quoted || needs_quotes(&atom.value) => quote(&atom.value, out),
        None => out.push_str(&atom.value),
    }
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn needs_quotes(value: &str) -> bool {
    value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '"' | '\\'))
}

fn quote(value: &str, out: &mut String) {
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
}

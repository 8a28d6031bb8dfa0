//! Lossless S-expression trees
//!
//! KiCad stores schematics, boards, symbol and footprint libraries, and
//! library tables as nested parenthesised lists of atoms. This module parses
//! them into a concrete syntax tree that remembers the exact spelling of
//! every atom and the whitespace in front of every node, so that writing an
//! unmodified tree back reproduces the input byte for byte and an edited
//! tree differs only at the edited atoms.
//!
//! Nodes built in memory carry no layout; the writer lays them out the way
//! KiCad does (nested lists on their own line, two-space indentation).

mod parser;
mod writer;

pub use parser::ParseError;

use std::fmt;

/// A single node: either an atom or a parenthesised list
#[derive(Debug, Clone, PartialEq)]
pub enum Sexpr {
    Atom(Atom),
    List(List),
}

impl Sexpr {
    /// The node as a list, if it is one
    pub fn as_list(&self) -> Option<&List> {
        match self {
            Sexpr::List(list) => Some(list),
            Sexpr::Atom(_) => None,
        }
    }

    /// The node as a mutable list, if it is one
    pub fn as_list_mut(&mut self) -> Option<&mut List> {
        match self {
            Sexpr::List(list) => Some(list),
            Sexpr::Atom(_) => None,
        }
    }

    /// The node as an atom, if it is one
    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Sexpr::Atom(atom) => Some(atom),
            Sexpr::List(_) => None,
        }
    }

    /// The node as a mutable atom, if it is one
    pub fn as_atom_mut(&mut self) -> Option<&mut Atom> {
        match self {
            Sexpr::Atom(atom) => Some(atom),
            Sexpr::List(_) => None,
        }
    }

    /// Whitespace written before this node, `None` for nodes built in memory
    pub fn leading(&self) -> Option<&str> {
        match self {
            Sexpr::Atom(atom) => atom.leading.as_deref(),
            Sexpr::List(list) => list.leading.as_deref(),
        }
    }
}

impl From<Atom> for Sexpr {
    fn from(atom: Atom) -> Self {
        Sexpr::Atom(atom)
    }
}

impl From<List> for Sexpr {
    fn from(list: List) -> Self {
        Sexpr::List(list)
    }
}

/// A symbol or quoted string
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    leading: Option<String>,
    value: String,
    quoted: bool,
    /// Source spelling, dropped as soon as the value changes
    raw: Option<String>,
}

impl Atom {
    /// An unquoted atom such as a keyword or number
    pub fn symbol(value: impl Into<String>) -> Self {
        Self {
            leading: None,
            value: value.into(),
            quoted: false,
            raw: None,
        }
    }

    /// A quoted string atom
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            leading: None,
            value: value.into(),
            quoted: true,
            raw: None,
        }
    }

    /// Decoded value (escapes resolved, quotes stripped)
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether the atom is written as a quoted string
    pub fn is_quoted(&self) -> bool {
        self.quoted
    }

    /// Replace the value; the atom is re-spelled on output, keeping its
    /// quoting style and the whitespace in front of it.
    pub fn set_value(&mut self, value: impl Into<String>) {
        let value = value.into();
        if value != self.value {
            self.value = value;
            self.raw = None;
        }
    }
}

/// A parenthesised list; the first item is conventionally the keyword
#[derive(Debug, Clone, PartialEq)]
pub struct List {
    leading: Option<String>,
    /// Child nodes in source order
    pub items: Vec<Sexpr>,
    /// Whitespace between the last item and the closing parenthesis
    trailing: Option<String>,
}

impl List {
    /// New list holding only its keyword
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            leading: None,
            items: vec![Sexpr::Atom(Atom::symbol(keyword))],
            trailing: None,
        }
    }

    /// Builder-style push
    pub fn with(mut self, node: impl Into<Sexpr>) -> Self {
        self.push(node);
        self
    }

    /// Builder for the common `(keyword "value")` shape
    pub fn with_string(self, keyword: &str, value: impl Into<String>) -> Self {
        self.with(List::new(keyword).with(Atom::string(value)))
    }

    /// Append a node
    pub fn push(&mut self, node: impl Into<Sexpr>) {
        self.items.push(node.into());
    }

    /// Keyword of the list (its first atom)
    pub fn keyword(&self) -> Option<&str> {
        self.atom(0)
    }

    /// Value of the item at `index` if that item is an atom
    pub fn atom(&self, index: usize) -> Option<&str> {
        self.items.get(index).and_then(Sexpr::as_atom).map(Atom::value)
    }

    /// Mutable atom at `index`
    pub fn atom_mut(&mut self, index: usize) -> Option<&mut Atom> {
        self.items.get_mut(index).and_then(Sexpr::as_atom_mut)
    }

    /// Child lists in order
    pub fn lists(&self) -> impl Iterator<Item = &List> {
        self.items.iter().filter_map(Sexpr::as_list)
    }

    /// Mutable child lists in order
    pub fn lists_mut(&mut self) -> impl Iterator<Item = &mut List> {
        self.items.iter_mut().filter_map(Sexpr::as_list_mut)
    }

    /// First child list with the given keyword
    pub fn find(&self, keyword: &str) -> Option<&List> {
        self.lists().find(|l| l.keyword() == Some(keyword))
    }

    /// First mutable child list with the given keyword
    pub fn find_mut(&mut self, keyword: &str) -> Option<&mut List> {
        self.lists_mut().find(|l| l.keyword() == Some(keyword))
    }

    /// All child lists with the given keyword
    pub fn find_all<'a>(&'a self, keyword: &'a str) -> impl Iterator<Item = &'a List> + 'a {
        self.lists().filter(move |l| l.keyword() == Some(keyword))
    }

    /// All mutable child lists with the given keyword
    pub fn find_all_mut<'a>(
        &'a mut self,
        keyword: &'a str,
    ) -> impl Iterator<Item = &'a mut List> + 'a {
        self.lists_mut().filter(move |l| l.keyword() == Some(keyword))
    }

    /// Value of the first atom of the `(keyword value ...)` child
    pub fn value_of(&self, keyword: &str) -> Option<&str> {
        self.find(keyword).and_then(|l| l.atom(1))
    }

    /// Value of a `(property "name" "value" ...)` child
    pub fn property(&self, name: &str) -> Option<&str> {
        self.find_all("property")
            .find(|p| p.atom(1) == Some(name))
            .and_then(|p| p.atom(2))
    }

    /// Mutable value atom of a `(property "name" "value" ...)` child
    pub fn property_mut(&mut self, name: &str) -> Option<&mut Atom> {
        self.find_all_mut("property")
            .find(|p| p.atom(1) == Some(name))
            .and_then(|p| p.atom_mut(2))
    }

    /// Remove every child for which `pred` returns true, returning how many went
    pub fn remove_where(&mut self, mut pred: impl FnMut(&Sexpr) -> bool) -> usize {
        let before = self.items.len();
        self.items.retain(|item| !pred(item));
        before - self.items.len()
    }

    /// Whitespace written before this list, `None` for lists built in memory
    pub fn leading(&self) -> Option<&str> {
        self.leading.as_deref()
    }

    /// Override the whitespace written before this list
    pub fn set_leading(&mut self, leading: Option<String>) {
        self.leading = leading;
    }

    /// Override the whitespace written before the closing parenthesis
    pub fn set_trailing(&mut self, trailing: Option<String>) {
        self.trailing = trailing;
    }
}

/// A whole file: one root list plus whatever whitespace follows it
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: List,
    trailing: String,
}

impl Document {
    /// Wrap a list built in memory; the file ends with a newline
    pub fn new(root: List) -> Self {
        Self {
            root,
            trailing: "\n".to_string(),
        }
    }

    /// Parse a complete file
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        parser::parse_document(text)
    }

    pub fn root(&self) -> &List {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut List {
        &mut self.root
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        writer::write_list(&self.root, &mut out, 0);
        out.push_str(&self.trailing);
        f.write_str(&out)
    }
}

impl fmt::Display for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        writer::write_list(self, &mut out, 0);
        f.write_str(&out)
    }
}

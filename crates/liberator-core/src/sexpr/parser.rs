//! Tokenizer and tree builder for S-expression files

use super::{Atom, Document, List, Sexpr};
use thiserror::Error;

/// Malformed S-expression input
#[derive(Error, Debug, Clone, PartialEq)]
#[error("line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    column: usize,
}

/// Parse a file holding exactly one root list
pub fn parse_document(text: &str) -> Result<Document, ParseError> {
    let mut parser = Parser {
        src: text,
        pos: 0,
        line: 1,
        column: 1,
    };

    let mut leading = String::new();
    if parser.peek() == Some('\u{feff}') {
        parser.bump();
        leading.push('\u{feff}');
    }
    leading.push_str(&parser.skip_whitespace());

    match parser.peek() {
        Some('(') => {}
        Some(c) => return Err(parser.error(format!("expected '(' but found '{}'", c))),
        None => return Err(parser.error("empty document")),
    }

    let mut root = parser.parse_list()?;
    root.leading = Some(leading);

    let trailing = parser.skip_whitespace();
    if let Some(c) = parser.peek() {
        return Err(parser.error(format!("unexpected '{}' after the root list", c)));
    }

    Ok(Document { root, trailing })
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            line: self.line,
            column: self.column,
            message: message.into(),
        }
    }

    fn skip_whitespace(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
        self.src[start..self.pos].to_string()
    }

    fn parse_list(&mut self) -> Result<List, ParseError> {
        let (open_line, open_column) = (self.line, self.column);
        self.bump();

        let mut items = Vec::new();
        loop {
            let whitespace = self.skip_whitespace();
            match self.peek() {
                None => {
                    return Err(ParseError {
                        line: open_line,
                        column: open_column,
                        message: "unbalanced '(': list is never closed".to_string(),
                    })
                }
                Some(')') => {
                    self.bump();
                    return Ok(List {
                        leading: None,
                        items,
                        trailing: Some(whitespace),
                    });
                }
                Some('(') => {
                    let mut list = self.parse_list()?;
                    list.leading = Some(whitespace);
                    items.push(Sexpr::List(list));
                }
                Some('"') => {
                    let mut atom = self.parse_string()?;
                    atom.leading = Some(whitespace);
                    items.push(Sexpr::Atom(atom));
                }
                Some(_) => {
                    let mut atom = self.parse_symbol();
                    atom.leading = Some(whitespace);
                    items.push(Sexpr::Atom(atom));
                }
            }
        }
    }

    fn parse_string(&mut self) -> Result<Atom, ParseError> {
        let start = self.pos;
        let (open_line, open_column) = (self.line, self.column);
        self.bump();

        let mut value = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(ParseError {
                        line: open_line,
                        column: open_column,
                        message: "unterminated string".to_string(),
                    })
                }
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('"') => value.push('"'),
                    Some('\\') => value.push('\\'),
                    Some(other) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => {
                        return Err(ParseError {
                            line: open_line,
                            column: open_column,
                            message: "unterminated string".to_string(),
                        })
                    }
                },
                Some(c) => value.push(c),
            }
        }

        Ok(Atom {
            leading: None,
            value,
            quoted: true,
            raw: Some(self.src[start..self.pos].to_string()),
        })
    }

    fn parse_symbol(&mut self) -> Atom {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
                break;
            }
            self.bump();
        }

        let raw = &self.src[start..self.pos];
        Atom {
            leading: None,
            value: raw.to_string(),
            quoted: false,
            raw: Some(raw.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document() {
        let err = parse_document("   \n").unwrap_err();
        assert_eq!(err.message, "empty document");
    }

    #[test]
    fn test_unbalanced_reports_opening_position() {
        let err = parse_document("(kicad_pcb\n  (footprint \"X\"\n").unwrap_err();
        assert_eq!((err.line, err.column), (2, 3));
        assert!(err.message.contains("unbalanced"));
    }

    #[test]
    fn test_unterminated_string() {
        let err = parse_document("(lib (name \"Device))").unwrap_err();
        assert_eq!(err.message, "unterminated string");
        assert_eq!((err.line, err.column), (1, 12));
    }

    #[test]
    fn test_stray_close_paren() {
        let err = parse_document("(a b))").unwrap_err();
        assert!(err.message.contains("after the root list"));
    }

    #[test]
    fn test_top_level_atom_rejected() {
        assert!(parse_document("kicad_sch").is_err());
    }

    #[test]
    fn test_adjacent_lists_without_space() {
        let doc = parse_document("(lib (name \"A\")(type \"KiCad\"))").unwrap();
        let lib = doc.root();
        assert_eq!(lib.value_of("name"), Some("A"));
        assert_eq!(lib.value_of("type"), Some("KiCad"));
        assert_eq!(doc.to_string(), "(lib (name \"A\")(type \"KiCad\"))");
    }

    #[test]
    fn test_byte_order_mark_preserved() {
        let text = "\u{feff}(kicad_symbol_lib (version 20220914))\n";
        let doc = parse_document(text).unwrap();
        assert_eq!(doc.root().keyword(), Some("kicad_symbol_lib"));
        assert_eq!(doc.to_string(), text);
    }

    #[test]
    fn test_non_ascii_content() {
        let text = "(property \"Value\" \"10kΩ\" (at 0 0 0))";
        let doc = parse_document(text).unwrap();
        assert_eq!(doc.root().atom(2), Some("10kΩ"));
        assert_eq!(doc.to_string(), text);
    }
}

//! Rule script reader.
//!
//! Turns source text into a [`NodeKind::Root`] tree:
//!
//! | Syntax | Node |
//! |--------|------|
//! | `( … )` | list |
//! | `"text"` (escapes `\n` `\t` `\"` `\\`) | string |
//! | `42`, `-7` | int |
//! | `1.5`, `-2.`, `1e3` | float |
//! | anything else (`+`, `time:minute`, `set`) | symbol |
//!
//! `;` starts a comment that runs to the end of the line.

use crate::error::SyntaxError;

use super::ast::{FileSet, Node, NodeKind, Pos, Position};

/// Parse `src`, registering it in `files` under `name`.
pub fn parse(files: &mut FileSet, name: &str, src: &str) -> Result<Node, SyntaxError> {
    let base = files.add_file(name, src);
    let mut reader = Reader { src, pos: 0, base };
    reader.read_root().map_err(|(offset, message)| SyntaxError {
        position: files
            .position(Pos(base + offset as u32))
            .unwrap_or_else(|| Position { file: name.to_owned(), line: 1, column: 1 }),
        message,
    })
}

/// Byte offset within the source and a message.
type ReadError = (usize, String);

struct Reader<'a> {
    src: &'a str,
    pos: usize,
    base: u32,
}

impl<'a> Reader<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn node_pos(&self, offset: usize) -> Pos {
        Pos(self.base + offset as u32)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == ';' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn read_root(&mut self) -> Result<Node, ReadError> {
        let start = self.pos;
        let mut nodes = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None => break,
                Some(')') => return Err((self.pos, "unexpected ')'".into())),
                Some(_) => nodes.push(self.read_form()?),
            }
        }
        Ok(Node::new(self.node_pos(start), NodeKind::Root(nodes)))
    }

    fn read_form(&mut self) -> Result<Node, ReadError> {
        let start = self.pos;
        match self.peek() {
            Some('(') => {
                self.bump();
                let mut nodes = Vec::new();
                loop {
                    self.skip_trivia();
                    match self.peek() {
                        None => return Err((start, "unclosed '('".into())),
                        Some(')') => {
                            self.bump();
                            break;
                        }
                        Some(_) => nodes.push(self.read_form()?),
                    }
                }
                Ok(Node::new(self.node_pos(start), NodeKind::List(nodes)))
            }
            Some('"') => {
                self.bump();
                let s = self.read_string(start)?;
                Ok(Node::new(self.node_pos(start), NodeKind::Str(s)))
            }
            _ => {
                while let Some(c) = self.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';') {
                        break;
                    }
                    self.bump();
                }
                let atom = &self.src[start..self.pos];
                Ok(Node::new(self.node_pos(start), classify(atom)))
            }
        }
    }

    /// Read the rest of a string literal; the opening quote is consumed.
    fn read_string(&mut self, start: usize) -> Result<String, ReadError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err((start, "unterminated string".into())),
                Some('"') => return Ok(out),
                Some('\\') => {
                    let at = self.pos;
                    match self.bump() {
                        Some('n') => out.push('\n'),
                        Some('t') => out.push('\t'),
                        Some('"') => out.push('"'),
                        Some('\\') => out.push('\\'),
                        Some(c) => return Err((at, format!("unknown escape '\\{c}'"))),
                        None => return Err((start, "unterminated string".into())),
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }
}

/// Decide whether an atom is a number or a symbol.
fn classify(atom: &str) -> NodeKind {
    let digits = atom.strip_prefix(['-', '+']).unwrap_or(atom);
    let numeric = digits.starts_with(|c: char| c.is_ascii_digit())
        || (digits.starts_with('.') && digits[1..].starts_with(|c: char| c.is_ascii_digit()));
    if numeric {
        if let Ok(n) = atom.parse::<i64>() {
            return NodeKind::Int(n);
        }
        if let Ok(x) = atom.parse::<f64>() {
            return NodeKind::Float(x);
        }
    }
    NodeKind::Symbol(atom.to_owned())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn read(src: &str) -> Vec<Node> {
        let mut fs = FileSet::new();
        match parse(&mut fs, "test", src).unwrap().kind {
            NodeKind::Root(nodes) => nodes,
            other => panic!("expected root, got {other:?}"),
        }
    }

    fn kinds(src: &str) -> Vec<NodeKind> {
        read(src).into_iter().map(|n| n.kind).collect()
    }

    #[test]
    fn atoms() {
        assert_eq!(
            kinds("42 -7 1.5 -2. 1e3 + - time:minute"),
            vec![
                NodeKind::Int(42),
                NodeKind::Int(-7),
                NodeKind::Float(1.5),
                NodeKind::Float(-2.0),
                NodeKind::Float(1000.0),
                NodeKind::Symbol("+".into()),
                NodeKind::Symbol("-".into()),
                NodeKind::Symbol("time:minute".into()),
            ]
        );
    }

    #[test]
    fn digit_led_garbage_is_a_symbol() {
        assert_eq!(kinds("1abc"), vec![NodeKind::Symbol("1abc".into())]);
    }

    #[test]
    fn nested_lists() {
        let nodes = read("(when (> x 1) (set y \"hi\"))");
        assert_eq!(nodes.len(), 1);
        let items = nodes[0].children();
        assert_eq!(items[0].as_symbol(), Some("when"));
        assert_eq!(items[1].children().len(), 3);
        assert_eq!(items[2].children()[2].kind, NodeKind::Str("hi".into()));
    }

    #[test]
    fn empty_list() {
        assert_eq!(kinds("()"), vec![NodeKind::List(vec![])]);
    }

    #[test]
    fn comments_and_whitespace_ignored() {
        assert_eq!(
            kinds("; header\n  1 ; trailing\n\t2"),
            vec![NodeKind::Int(1), NodeKind::Int(2)]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#""a\n\"b\"\\""#),
            vec![NodeKind::Str("a\n\"b\"\\".into())]
        );
    }

    #[test]
    fn unclosed_list_reports_opening_position() {
        let mut fs = FileSet::new();
        let err = parse(&mut fs, "bad.rule", "1\n  (set x").unwrap_err();
        assert_eq!((err.position.line, err.position.column), (2, 3));
        assert!(err.message.contains("unclosed"));
    }

    #[test]
    fn stray_close_paren() {
        let mut fs = FileSet::new();
        let err = parse(&mut fs, "bad.rule", "(x))").unwrap_err();
        assert_eq!(err.position.column, 4);
    }

    #[test]
    fn unterminated_string() {
        let mut fs = FileSet::new();
        assert!(parse(&mut fs, "bad.rule", "(log \"oops)").is_err());
    }

    #[test]
    fn node_positions_resolve() {
        let mut fs = FileSet::new();
        let root = parse(&mut fs, "p.rule", "(a\n b)").unwrap();
        let b = &root.children()[0].children()[1];
        let p = fs.position(b.pos).unwrap();
        assert_eq!(p.to_string(), "p.rule:2:2");
    }
}

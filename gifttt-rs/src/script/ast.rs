//! Parsed rule programs.
//!
//! A program is a closed tree of [`Node`]s.  Each node remembers the offset
//! it was read from; the [`FileSet`] that parsed it turns that offset back
//! into `file:line:column` for error messages.

use std::fmt;

// ── Node ──────────────────────────────────────────────────────────────────────

/// Offset of a node inside a [`FileSet`].  Ranges of different files never
/// overlap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pos(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Symbol(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// `( ... )`
    List(Vec<Node>),
    /// The sequence of top-level forms of one source file.
    Root(Vec<Node>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub pos: Pos,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(pos: Pos, kind: NodeKind) -> Self {
        Self { pos, kind }
    }

    /// The symbol name, if this node is a symbol.
    pub fn as_symbol(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Symbol(name) => Some(name),
            _ => None,
        }
    }

    /// Child nodes of a list or root; empty for atoms.
    pub fn children(&self) -> &[Node] {
        match &self.kind {
            NodeKind::List(nodes) | NodeKind::Root(nodes) => nodes,
            _ => &[],
        }
    }
}

// ── Positions ─────────────────────────────────────────────────────────────────

/// Human-readable source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Debug)]
struct SourceFile {
    name: String,
    base: u32,
    len: u32,
    /// Byte offsets (relative to the file) where each line begins.
    line_starts: Vec<u32>,
}

/// Registry of parsed sources, used to resolve a [`Pos`] to a [`Position`].
#[derive(Debug, Default)]
pub struct FileSet {
    files: Vec<SourceFile>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `src` under `name` and return the base offset of its first
    /// byte.
    pub fn add_file(&mut self, name: &str, src: &str) -> u32 {
        let base = self
            .files
            .last()
            .map(|f| f.base + f.len + 1)
            .unwrap_or(1);
        let line_starts = std::iter::once(0)
            .chain(
                src.bytes()
                    .enumerate()
                    .filter(|&(_, b)| b == b'\n')
                    .map(|(i, _)| i as u32 + 1),
            )
            .collect();
        self.files.push(SourceFile {
            name: name.to_owned(),
            base,
            len: src.len() as u32,
            line_starts,
        });
        base
    }

    /// Resolve `pos`, or `None` if it belongs to no registered file.
    pub fn position(&self, pos: Pos) -> Option<Position> {
        let file = self
            .files
            .iter()
            .find(|f| pos.0 >= f.base && pos.0 <= f.base + f.len)?;
        let offset = pos.0 - file.base;
        let line = file.line_starts.partition_point(|&start| start <= offset);
        let column = offset - file.line_starts[line - 1] + 1;
        Some(Position {
            file: file.name.clone(),
            line,
            column: column as usize,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

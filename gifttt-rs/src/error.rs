//! Error types.
//!
//! Evaluation errors are plain data (no runtime values inside) so that they
//! can leave the evaluator thread and be logged or reported by the dispatch
//! tasks.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::script::ast::Position;

// ── Evaluation ────────────────────────────────────────────────────────────────

/// What went wrong while evaluating a rule program.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    #[error("undefined symbol: {0}")]
    Undefined(String),
    #[error("symbol already defined in current scope: {0}")]
    AlreadyDefined(String),
    #[error("cannot set undefined symbol: {0}")]
    SetUndefined(String),
    /// Wrong number of arguments; the message names the function.
    #[error("{0}")]
    Arity(String),
    /// Operand of the wrong kind.
    #[error("{0}")]
    Type(String),
    #[error("index out of bounds")]
    IndexOutOfBounds,
    #[error("division by zero")]
    DivisionByZero,
    #[error("cannot use {0} as a function")]
    NotCallable(String),
    /// Raised by the script itself through `error`.
    #[error("{0}")]
    Raised(String),
    /// A closure was called after the execution that created it finished.
    #[error("function {0} is no longer available")]
    Released(String),
    /// The variable store refused a read or write.
    #[error("store: {0}")]
    Store(String),
    /// The evaluation task died before returning.
    #[error("execution aborted: {0}")]
    Aborted(String),
}

/// An [`ErrorKind`] plus the source position where it was first raised.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub kind: ErrorKind,
    pub position: Option<Position>,
}

impl EvalError {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, position: None }
    }

    /// Attach `position` unless one is attached already.
    pub fn at(mut self, position: Option<Position>) -> Self {
        if self.position.is_none() {
            self.position = position;
        }
        self
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.position {
            Some(pos) => write!(f, "{pos} {}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for EvalError {}

impl From<ErrorKind> for EvalError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<StoreError> for EvalError {
    fn from(e: StoreError) -> Self {
        Self::new(ErrorKind::Store(e.to_string()))
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Malformed script text.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{position}: {message}")]
pub struct SyntaxError {
    pub position: Position,
    pub message: String,
}

/// A rule file that could not be turned into a rule.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
}

// ── Storage ───────────────────────────────────────────────────────────────────

/// Durable storage failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("value cannot be stored: {0}")]
    Unsupported(String),
}

// ── Variable access API ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("variable {0} is read-only")]
    Forbidden(String),
    #[error("variable {0} not found")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ── Tests ─────────────────────────────────────────────────────────────────────

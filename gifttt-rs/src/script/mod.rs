//! The rule scripting language.
//!
//! A tiny lisp: every form is a literal, a symbol, or a parenthesised call.
//! This module implements:
//!
//! - the reader ([`parse`]) producing [`ast::Node`] trees with positions
//! - lexically chained [`Scope`]s and the tree-walking evaluator
//! - the builtin library (arithmetic, comparison, `if`/`when`/`unless`,
//!   `and`/`or`, `var`/`set`/`do`, `func`, `for`/`range`, `split`/`nth`/`length`)
//! - a non-evaluating dependency scan ([`deps`])
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use gifttt::script::{parse, FileSet, Scope, Value};
//!
//! let mut files = FileSet::new();
//! let program = parse(&mut files, "demo", "(var x 6) (* x 7)").unwrap();
//! let scope = Scope::with_builtins(Arc::new(files));
//! assert_eq!(scope.eval(&program).unwrap(), Value::Int(42));
//! ```

pub mod ast;
pub mod builtins;
pub mod deps;
pub mod parse;
pub mod scope;
pub mod value;

// Re-exports for convenience.
pub use ast::{FileSet, Node, NodeKind};
pub use parse::parse;
pub use scope::{Globals, Parent, Scope};
pub use value::{EvalResult, Function, Value};

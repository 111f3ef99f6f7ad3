//! gifttt: a reactive rule engine.
//!
//! Rules are small lisp programs.  Each one is re-run whenever a variable it
//! mentions changes value; variables live in a persistent [`var::VarStore`]
//! and are written by rules, by the synthetic [`clock`] and by external
//! callers through [`api`].
//!
//! Start-up order: store, then rules and the [`dispatch::DependencyIndex`],
//! then the [`dispatch::Engine`].

pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod rule;
pub mod script;
pub mod store;
pub mod var;

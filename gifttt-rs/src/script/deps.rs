//! Static dependency extraction.
//!
//! Walks a program without evaluating anything and reports every symbol
//! that is neither a builtin nor one of the caller's helper names.  The scan
//! is deliberately conservative: unreached branches count, and so does a
//! symbol in call position (a user function's name is reported like any
//! other variable).
//!
//! [`scan`] hands each name to a callback as soon as the walk reaches it,
//! on the caller's thread.  There is no separate stream to close: the scan
//! is complete when `scan` returns, and the consumer has seen every name by
//! then.  [`dependencies`] is the usual consumer and collects the set.

use std::collections::BTreeSet;

use super::ast::{Node, NodeKind};
use super::builtins;

/// Report each dependency of `node` to `report`, in source order.  Names
/// may be reported more than once.
pub fn scan(node: &Node, helpers: &[&str], report: &mut impl FnMut(&str)) {
    match &node.kind {
        NodeKind::Symbol(name) => {
            if !builtins::is_builtin(name) && !helpers.contains(&name.as_str()) {
                report(name);
            }
        }
        NodeKind::List(nodes) | NodeKind::Root(nodes) => {
            for child in nodes {
                scan(child, helpers, report);
            }
        }
        NodeKind::Int(_) | NodeKind::Float(_) | NodeKind::Str(_) => {}
    }
}

/// The deduplicated dependency set of `node`.
pub fn dependencies(node: &Node, helpers: &[&str]) -> BTreeSet<String> {
    let mut deps = BTreeSet::new();
    scan(node, helpers, &mut |name| {
        if !deps.contains(name) {
            deps.insert(name.to_owned());
        }
    });
    deps
}

// ── Tests ─────────────────────────────────────────────────────────────────────

use std::sync::Arc;

use proptest::prelude::*;
use gifttt::error::ErrorKind;
use gifttt::script::deps::dependencies;
use gifttt::script::{parse, FileSet, Scope, Value};

fn eval(src: &str) -> Result<Value, ErrorKind> {
    let mut files = FileSet::new();
    let root = parse(&mut files, "prop", src).map_err(|e| ErrorKind::Raised(e.to_string()))?;
    let scope = Scope::with_builtins(Arc::new(files));
    let result = scope.eval(&root).map_err(|e| e.kind);
    scope.release();
    result
}

proptest! {
    /// The reader returns Ok or Err on arbitrary text; it never panics.
    #[test]
    fn reader_does_not_panic(s in "\\PC*") {
        let mut files = FileSet::new();
        let _ = parse(&mut files, "fuzz", &s);
    }

    /// Same for text built from the language's own punctuation.
    #[test]
    fn reader_survives_unbalanced_forms(s in "[()\";a-z0-9 .\\\\\n-]{0,64}") {
        let mut files = FileSet::new();
        let _ = parse(&mut files, "fuzz", &s);
    }
}

proptest! {
    /// Integer literals evaluate to themselves.
    #[test]
    fn int_literal_is_itself(n in any::<i64>()) {
        prop_assert_eq!(eval(&n.to_string()), Ok(Value::Int(n)));
    }

    /// String literals without escapes evaluate to themselves.
    #[test]
    fn string_literal_is_itself(s in "[a-zA-Z0-9 :,.]{0,32}") {
        prop_assert_eq!(eval(&format!("\"{s}\"")), Ok(Value::Str(s)));
    }

    /// Int op int stays int; mixing in a float promotes.
    #[test]
    fn addition_promotes(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
        prop_assert_eq!(eval(&format!("(+ {a} {b})")), Ok(Value::Int(a + b)));
        prop_assert_eq!(eval(&format!("(+ {a} {b}.0)")), Ok(Value::Float((a + b) as f64)));
        prop_assert_eq!(eval(&format!("(* {a} {b})")), Ok(Value::Int(a * b)));
    }

    /// Integer division truncates like Rust's.
    #[test]
    fn integer_division_truncates(a in -10_000i64..10_000, b in 1i64..100) {
        prop_assert_eq!(eval(&format!("(/ {a} {b})")), Ok(Value::Int(a / b)));
        prop_assert_eq!(eval(&format!("(/ {a} -{b})")), Ok(Value::Int(a / -b)));
    }

    /// Only `false` is falsy; every number is truthy.
    #[test]
    fn numbers_are_truthy(n in any::<i32>()) {
        prop_assert_eq!(eval(&format!("(if {n} 1 2)")), Ok(Value::Int(1)));
    }

    /// Comparisons agree with Rust on integers.
    #[test]
    fn comparisons_match(a in any::<i32>(), b in any::<i32>()) {
        prop_assert_eq!(eval(&format!("(< {a} {b})")), Ok(Value::Bool(a < b)));
        prop_assert_eq!(eval(&format!("(>= {a} {b})")), Ok(Value::Bool(a >= b)));
        prop_assert_eq!(eval(&format!("(== {a} {b})")), Ok(Value::Bool(a == b)));
    }

    /// A child frame shadows without touching the parent.
    #[test]
    fn shadowing_leaves_outer_binding(outer in any::<i32>(), inner in any::<i32>()) {
        let src = format!("(var x {outer}) (do (var x {inner}) x) x");
        prop_assert_eq!(eval(&src), Ok(Value::Int(i64::from(outer))));
        let src = format!("(var x {outer}) (do (var x {inner}) x)");
        prop_assert_eq!(eval(&src), Ok(Value::Int(i64::from(inner))));
    }

    /// `set` in a child frame reaches the declaring ancestor.
    #[test]
    fn set_reaches_the_ancestor(v in any::<i32>()) {
        let src = format!("(var x 0) (do (do (set x {v}))) x");
        prop_assert_eq!(eval(&src), Ok(Value::Int(i64::from(v))));
    }

    /// `range` over n visits 0..n in order.
    #[test]
    fn range_sums_indices(n in 0i64..200) {
        let src = format!("(var sum 0) (range i {n} (set sum (+ sum i))) sum");
        prop_assert_eq!(eval(&src), Ok(Value::Int((0..n).sum())));
    }

    /// Every free variable of a generated program is a dependency, and
    /// nothing else is.
    #[test]
    fn dependencies_are_the_free_names(names in prop::collection::btree_set("q_[a-z]{1,6}", 1..6)) {
        let body: Vec<String> = names.iter().map(|n| format!("(log {n})")).collect();
        let first = names.iter().next().unwrap();
        let src = format!("(when (> {first} 0) {})", body.join(" "));
        let mut files = FileSet::new();
        let root = parse(&mut files, "deps", &src).unwrap();
        let found = dependencies(&root, &["run", "log"]);
        prop_assert_eq!(found, names);
    }
}

//! Lexical scopes and the tree-walking evaluator.
//!
//! A [`Scope`] is a cheap handle to one frame.  Frames form a chain towards
//! the root; the outermost link may be a [`Globals`] implementation, which
//! answers `get`/`set` for names no frame declares (rules use this to read
//! and write the variable store).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::error::{ErrorKind, EvalError};

use super::ast::{FileSet, Node, NodeKind};
use super::builtins;
use super::value::{Closure, EvalResult, Function, Value};

// ── Globals ───────────────────────────────────────────────────────────────────

/// Resolution of free names beyond the outermost frame.
///
/// Only reading and writing are delegated: globals cannot be declared into,
/// branched from or re-parented.
pub trait Globals {
    fn get(&self, name: &str) -> EvalResult;
    fn set(&self, name: &str, value: Value) -> EvalResult<()>;
}

/// The outer link of a frame.
#[derive(Clone)]
pub enum Parent {
    Scope(Scope),
    Globals(Rc<dyn Globals>),
}

// ── Scope ─────────────────────────────────────────────────────────────────────

struct Frame {
    vars: RefCell<HashMap<String, Value>>,
    parent: RefCell<Option<Parent>>,
    files: Arc<FileSet>,
    /// Closures created anywhere below the root, shared by the whole chain.
    closures: Rc<RefCell<Vec<Weak<Closure>>>>,
}

#[derive(Clone)]
pub struct Scope(Rc<Frame>);

impl Scope {
    /// An empty root frame.  `files` resolves node positions in errors.
    pub fn new(files: Arc<FileSet>) -> Self {
        Scope(Rc::new(Frame {
            vars: RefCell::new(HashMap::new()),
            parent: RefCell::new(None),
            files,
            closures: Rc::new(RefCell::new(Vec::new())),
        }))
    }

    /// A root frame with the builtin library installed.
    pub fn with_builtins(files: Arc<FileSet>) -> Self {
        let scope = Self::new(files);
        builtins::install(&scope);
        scope
    }

    /// Declare `name` in this frame.  Redeclaring in the same frame fails.
    pub fn create(&self, name: &str, value: Value) -> EvalResult<()> {
        let mut vars = self.0.vars.borrow_mut();
        if vars.contains_key(name) {
            return Err(ErrorKind::AlreadyDefined(name.to_owned()).into());
        }
        vars.insert(name.to_owned(), value);
        Ok(())
    }

    /// Assign to the nearest frame declaring `name`.
    pub fn set(&self, name: &str, value: Value) -> EvalResult<()> {
        if let Some(slot) = self.0.vars.borrow_mut().get_mut(name) {
            *slot = value;
            return Ok(());
        }
        match &*self.0.parent.borrow() {
            Some(Parent::Scope(parent)) => parent.set(name, value),
            Some(Parent::Globals(globals)) => globals.set(name, value),
            None => Err(ErrorKind::SetUndefined(name.to_owned()).into()),
        }
    }

    /// Look `name` up in this frame, then outwards.
    pub fn get(&self, name: &str) -> EvalResult {
        if let Some(value) = self.0.vars.borrow().get(name) {
            return Ok(value.clone());
        }
        match &*self.0.parent.borrow() {
            Some(Parent::Scope(parent)) => parent.get(name),
            Some(Parent::Globals(globals)) => globals.get(name),
            None => Err(ErrorKind::Undefined(name.to_owned()).into()),
        }
    }

    /// A new child frame.
    pub fn branch(&self) -> Scope {
        Scope(Rc::new(Frame {
            vars: RefCell::new(HashMap::new()),
            parent: RefCell::new(Some(Parent::Scope(self.clone()))),
            files: Arc::clone(&self.0.files),
            closures: Rc::clone(&self.0.closures),
        }))
    }

    /// Replace this frame's outer link.
    pub fn enclose(&self, parent: Parent) {
        *self.0.parent.borrow_mut() = Some(parent);
    }

    /// Remember a closure so [`Scope::release`] can break its cycle.
    pub(crate) fn track(&self, closure: &Rc<Closure>) {
        self.0.closures.borrow_mut().push(Rc::downgrade(closure));
    }

    /// Drop the scopes captured by every closure created in this chain.
    /// Closures that escape afterwards fail when called.
    pub fn release(&self) {
        for closure in self.0.closures.borrow_mut().drain(..) {
            if let Some(closure) = closure.upgrade() {
                closure.release();
            }
        }
    }

    fn error_at(&self, node: &Node, err: EvalError) -> EvalError {
        if err.position.is_some() {
            return err;
        }
        err.at(self.0.files.position(node.pos))
    }

    /// Evaluate `node` in this scope.
    pub fn eval(&self, node: &Node) -> EvalResult {
        match &node.kind {
            NodeKind::Symbol(name) => self.get(name).map_err(|e| self.error_at(node, e)),
            NodeKind::Int(n) => Ok(Value::Int(*n)),
            NodeKind::Float(x) => Ok(Value::Float(*x)),
            NodeKind::Str(s) => Ok(Value::Str(s.clone())),
            NodeKind::List(nodes) => {
                let Some((head, args)) = nodes.split_first() else {
                    return Ok(Value::List(Vec::new()));
                };
                let func = self.eval(head).map_err(|e| self.error_at(head, e))?;
                self.call(func, args).map_err(|e| self.error_at(head, e))
            }
            NodeKind::Root(nodes) => {
                let mut value = Value::Nil;
                for child in nodes {
                    value = self.eval(child).map_err(|e| self.error_at(child, e))?;
                }
                Ok(value)
            }
        }
    }

    fn call(&self, func: Value, args: &[Node]) -> EvalResult {
        match func {
            Value::Function(Function::Special(form)) => form(self, args),
            Value::Function(Function::Plain(plain)) => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<EvalResult<Vec<_>>>()?;
                plain.call(values)
            }
            other => Err(ErrorKind::NotCallable(other.to_string()).into()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ast::Pos;
    use crate::script::parse::parse;

    fn empty() -> Scope {
        Scope::new(Arc::new(FileSet::new()))
    }

    fn run(src: &str) -> EvalResult {
        let mut files = FileSet::new();
        let root = parse(&mut files, "test", src).unwrap();
        let scope = Scope::with_builtins(Arc::new(files));
        let result = scope.eval(&root);
        scope.release();
        result
    }

    struct MapGlobals(RefCell<HashMap<String, Value>>);

    impl Globals for MapGlobals {
        fn get(&self, name: &str) -> EvalResult {
            Ok(self.0.borrow().get(name).cloned().unwrap_or_default())
        }

        fn set(&self, name: &str, value: Value) -> EvalResult<()> {
            self.0.borrow_mut().insert(name.to_owned(), value);
            Ok(())
        }
    }

    #[test]
    fn literals_evaluate_to_themselves() {
        let s = empty();
        for (kind, want) in [
            (NodeKind::Int(7), Value::Int(7)),
            (NodeKind::Float(2.5), Value::Float(2.5)),
            (NodeKind::Str("x".into()), Value::Str("x".into())),
        ] {
            assert_eq!(s.eval(&Node::new(Pos(0), kind)).unwrap(), want);
        }
    }

    #[test]
    fn empty_list_is_empty_sequence() {
        assert_eq!(run("()").unwrap(), Value::List(vec![]));
    }

    #[test]
    fn empty_root_is_nil() {
        assert_eq!(run("").unwrap(), Value::Nil);
    }

    #[test]
    fn create_twice_in_same_frame_fails() {
        let s = empty();
        s.create("x", Value::Int(1)).unwrap();
        let err = s.create("x", Value::Int(2)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::AlreadyDefined("x".into()));
    }

    #[test]
    fn child_frame_shadows() {
        let s = empty();
        s.create("x", Value::Int(1)).unwrap();
        let child = s.branch();
        child.create("x", Value::Int(2)).unwrap();
        assert_eq!(child.get("x").unwrap(), Value::Int(2));
        assert_eq!(s.get("x").unwrap(), Value::Int(1));
    }

    #[test]
    fn set_mutates_the_declaring_ancestor() {
        let s = empty();
        s.create("x", Value::Int(1)).unwrap();
        let grandchild = s.branch().branch();
        grandchild.set("x", Value::Int(5)).unwrap();
        assert_eq!(s.get("x").unwrap(), Value::Int(5));
        // Not declared locally.
        assert!(grandchild.0.vars.borrow().is_empty());
    }

    #[test]
    fn set_and_get_undefined_fail() {
        let s = empty().branch();
        assert_eq!(
            s.set("nope", Value::Int(1)).unwrap_err().kind,
            ErrorKind::SetUndefined("nope".into())
        );
        assert_eq!(s.get("nope").unwrap_err().kind, ErrorKind::Undefined("nope".into()));
    }

    #[test]
    fn enclosed_globals_answer_free_names() {
        let globals = Rc::new(MapGlobals(RefCell::new(HashMap::new())));
        let root = empty();
        root.enclose(Parent::Globals(globals.clone()));
        let child = root.branch();
        child.set("door", "open".into()).unwrap();
        assert_eq!(globals.0.borrow()["door"], Value::Str("open".into()));
        assert_eq!(child.get("door").unwrap(), Value::Str("open".into()));
        assert_eq!(child.get("never").unwrap(), Value::Nil);
    }

    #[test]
    fn enclose_splices_parent_scope() {
        let outer = empty();
        outer.create("x", Value::Int(9)).unwrap();
        let inner = empty();
        inner.enclose(Parent::Scope(outer));
        assert_eq!(inner.get("x").unwrap(), Value::Int(9));
    }

    #[test]
    fn root_yields_last_value() {
        assert_eq!(run("1 2 \"three\"").unwrap(), Value::Str("three".into()));
    }

    #[test]
    fn error_aborts_root_and_carries_position() {
        let err = run("(var x 1)\n(set y 2)\n(set x 3)").unwrap_err();
        assert_eq!(err.kind, ErrorKind::SetUndefined("y".into()));
        let pos = err.position.unwrap();
        assert_eq!((pos.line, pos.column), (2, 2));
    }

    #[test]
    fn undefined_symbol_position_is_the_symbol() {
        let err = run("(+ 1\n   missing)").unwrap_err();
        let pos = err.position.unwrap();
        assert_eq!((pos.line, pos.column), (2, 4));
    }

    #[test]
    fn calling_a_non_function_fails() {
        let err = run("(1 2)").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotCallable("1".into()));
    }

    #[test]
    fn plain_arguments_evaluate_left_to_right_and_stop_at_first_error() {
        let err = run("(var n 0) (+ (set n 1) (error \"first\") (set n 2))").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Raised("first".into()));
    }

    #[test]
    fn released_closure_fails_when_called() {
        let mut files = FileSet::new();
        let root = parse(&mut files, "t", "(func f () 1)").unwrap();
        let scope = Scope::with_builtins(Arc::new(files));
        let f = scope.eval(&root).unwrap();
        scope.release();
        let Value::Function(Function::Plain(plain)) = f else { panic!("not a function") };
        assert!(matches!(plain.call(vec![]).unwrap_err().kind, ErrorKind::Released(_)));
    }
}

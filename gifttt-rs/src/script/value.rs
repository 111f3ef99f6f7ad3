//! Runtime values of the rule language.
//!
//! Unlike the stored form of a variable (plain JSON), a runtime value may
//! also be a function.  Functions come in two calling conventions:
//! [`Function::Plain`] receives evaluated arguments, [`Function::Special`]
//! receives the calling [`Scope`] and the raw argument nodes.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{ErrorKind, EvalError, StoreError};

use super::ast::Node;
use super::scope::Scope;

pub type EvalResult<T = Value> = Result<T, EvalError>;

/// Signature of a special form.
pub type SpecialFn = fn(&Scope, &[Node]) -> EvalResult;

/// Signature of a plain function.
pub type NativeFn = dyn Fn(Vec<Value>) -> EvalResult;

// ── Value ─────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Function(Function),
}

impl Value {
    /// Only `false` is falsy; `0`, `""` and `()` are all true.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Function(_) => "function",
        }
    }

    /// The stored (JSON) form of this value.  Functions cannot be stored.
    pub fn to_json(&self) -> Result<serde_json::Value, StoreError> {
        Ok(match self {
            Value::Nil => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(x) => serde_json::Number::from_f64(*x)
                .map(serde_json::Value::Number)
                .ok_or_else(|| StoreError::Unsupported(format!("non-finite float {x}")))?,
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(
                items.iter().map(Value::to_json).collect::<Result<_, _>>()?,
            ),
            Value::Function(f) => return Err(StoreError::Unsupported(format!("{f:?}"))),
        })
    }

    /// Runtime form of a stored value.  Integral JSON numbers become
    /// [`Value::Int`]; objects have no runtime counterpart and read as nil.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null | serde_json::Value::Object(_) => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
        }
    }
}

impl PartialEq for Value {
    /// Structural equality per kind.  `1` and `1.0` differ; functions are
    /// never equal to anything.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => {
                if x.fract() == 0.0 && x.abs() < 1e15 {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Value::Function(func) => write!(f, "{func:?}"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

// ── Function ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum Function {
    Plain(Plain),
    Special(SpecialFn),
}

/// A function that receives already-evaluated arguments.
#[derive(Clone)]
pub enum Plain {
    Native(Rc<NativeFn>),
    Closure(Rc<Closure>),
}

impl Function {
    /// Wrap a native plain function.
    pub fn native(f: impl Fn(Vec<Value>) -> EvalResult + 'static) -> Self {
        Function::Plain(Plain::Native(Rc::new(f)))
    }
}

impl Plain {
    pub fn call(&self, args: Vec<Value>) -> EvalResult {
        match self {
            Plain::Native(f) => f(args),
            Plain::Closure(c) => c.call(args),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Special(_) => write!(f, "<special form>"),
            Function::Plain(Plain::Native(_)) => write!(f, "<builtin function>"),
            Function::Plain(Plain::Closure(c)) => write!(f, "<{}>", c.describe()),
        }
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

// ── Closure ───────────────────────────────────────────────────────────────────

/// A user function created by `func`.
pub struct Closure {
    name: Option<String>,
    params: Vec<String>,
    body: Vec<Node>,
    /// Defining scope.  Taken by [`Closure::release`] to break the
    /// closure ↔ scope cycle of named functions.
    scope: RefCell<Option<Scope>>,
}

impl Closure {
    pub fn new(name: Option<String>, params: Vec<String>, body: Vec<Node>, scope: Scope) -> Self {
        Self { name, params, body, scope: RefCell::new(Some(scope)) }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn describe(&self) -> String {
        match &self.name {
            Some(name) => format!("function {name:?}"),
            None => "anonymous function".to_owned(),
        }
    }

    /// Bind `args` to the parameters in a fresh child of the defining scope
    /// and evaluate the body.
    pub fn call(&self, args: Vec<Value>) -> EvalResult {
        if args.len() != self.params.len() {
            let msg = match self.params.len() {
                0 => format!("{} takes no arguments", self.describe()),
                1 => format!("{} takes one argument", self.describe()),
                n => format!("{} takes {n} arguments", self.describe()),
            };
            return Err(ErrorKind::Arity(msg).into());
        }
        let defining = self
            .scope
            .borrow()
            .clone()
            .ok_or_else(|| ErrorKind::Released(self.describe()))?;
        let scope = defining.branch();
        for (param, arg) in self.params.iter().zip(args) {
            scope.create(param, arg)?;
        }
        let mut value = Value::Nil;
        for node in &self.body {
            value = scope.eval(node)?;
        }
        Ok(value)
    }

    /// Drop the captured scope.
    pub fn release(&self) {
        self.scope.borrow_mut().take();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! The builtin library installed into every root scope.
//!
//! Plain functions receive evaluated arguments; special forms receive the
//! calling scope and the raw argument nodes and decide themselves what to
//! evaluate, and in which frame.

use std::rc::Rc;

use crate::error::ErrorKind;

use super::ast::{Node, NodeKind};
use super::scope::Scope;
use super::value::{Closure, EvalResult, Function, NativeFn, Plain, SpecialFn, Value};

enum Builtin {
    Const(fn() -> Value),
    Plain(fn(Vec<Value>) -> EvalResult),
    Special(SpecialFn),
}

const BUILTINS: &[(&str, Builtin)] = &[
    ("true", Builtin::Const(|| Value::Bool(true))),
    ("false", Builtin::Const(|| Value::Bool(false))),
    ("nil", Builtin::Const(|| Value::Nil)),
    ("error", Builtin::Plain(error_fn)),
    ("==", Builtin::Plain(eq_fn)),
    ("!=", Builtin::Plain(ne_fn)),
    ("+", Builtin::Plain(plus_fn)),
    ("-", Builtin::Plain(minus_fn)),
    ("*", Builtin::Plain(mul_fn)),
    ("/", Builtin::Plain(div_fn)),
    (">", Builtin::Plain(gt_fn)),
    (">=", Builtin::Plain(gte_fn)),
    ("<", Builtin::Plain(lt_fn)),
    ("<=", Builtin::Plain(lte_fn)),
    ("or", Builtin::Special(or_fn)),
    ("and", Builtin::Special(and_fn)),
    ("if", Builtin::Special(if_fn)),
    ("when", Builtin::Special(when_fn)),
    ("unless", Builtin::Special(unless_fn)),
    ("var", Builtin::Special(var_fn)),
    ("set", Builtin::Special(set_fn)),
    ("do", Builtin::Special(do_fn)),
    ("func", Builtin::Special(func_fn)),
    ("for", Builtin::Special(for_fn)),
    ("range", Builtin::Special(range_fn)),
    ("split", Builtin::Plain(split_fn)),
    ("nth", Builtin::Plain(nth_fn)),
    ("length", Builtin::Plain(length_fn)),
];

/// Names bound by [`install`].
pub fn names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|(name, _)| *name)
}

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.iter().any(|(n, _)| *n == name)
}

/// Declare every builtin in `scope`.
pub fn install(scope: &Scope) {
    for (name, builtin) in BUILTINS {
        let value = match builtin {
            Builtin::Const(make) => make(),
            Builtin::Plain(f) => {
                let f: Rc<NativeFn> = Rc::new(*f);
                Value::Function(Function::Plain(Plain::Native(f)))
            }
            Builtin::Special(f) => Value::Function(Function::Special(*f)),
        };
        // A scope handed to install is fresh, so no name can collide.
        let _ = scope.create(name, value);
    }
}

fn arity(msg: impl Into<String>) -> ErrorKind {
    ErrorKind::Arity(msg.into())
}

fn type_error(msg: impl Into<String>) -> ErrorKind {
    ErrorKind::Type(msg.into())
}

/// Evaluate `nodes` in order in `scope`, returning the last value (or
/// `initial` when there are none).
fn eval_body(scope: &Scope, nodes: &[Node], initial: Value) -> EvalResult {
    let mut value = initial;
    for node in nodes {
        value = scope.eval(node)?;
    }
    Ok(value)
}

// ── Plain functions ───────────────────────────────────────────────────────────

fn error_fn(args: Vec<Value>) -> EvalResult {
    match args.as_slice() {
        [Value::Str(msg)] => Err(ErrorKind::Raised(msg.clone()).into()),
        _ => Err(type_error("error function takes a single string argument").into()),
    }
}

fn eq_fn(args: Vec<Value>) -> EvalResult {
    match args.as_slice() {
        [a, b] => Ok(Value::Bool(a == b)),
        _ => Err(arity("== takes two values").into()),
    }
}

fn ne_fn(args: Vec<Value>) -> EvalResult {
    match args.as_slice() {
        [a, b] => Ok(Value::Bool(a != b)),
        _ => Err(arity("!= takes two values").into()),
    }
}

/// Numeric operand as (integer part, float part); `None` for non-numbers.
fn numeric(v: &Value) -> Option<(i64, f64, bool)> {
    match v {
        Value::Int(n) => Some((*n, *n as f64, false)),
        Value::Float(x) => Some((0, *x, true)),
        _ => None,
    }
}

/// Shared accumulator for `+ - * /`: tracks both an integer and a float
/// result and reports whichever the operand kinds call for.
struct Accum {
    int: i64,
    float: f64,
    is_float: bool,
}

impl Accum {
    fn new(start: i64) -> Self {
        Self { int: start, float: start as f64, is_float: false }
    }

    fn result(self) -> Value {
        if self.is_float {
            Value::Float(self.float)
        } else {
            Value::Int(self.int)
        }
    }
}

fn plus_fn(args: Vec<Value>) -> EvalResult {
    let mut acc = Accum::new(0);
    for arg in &args {
        let (i, f, is_float) = numeric(arg).ok_or_else(|| type_error(format!("cannot sum {arg}")))?;
        acc.int = acc.int.wrapping_add(i);
        acc.float += f;
        acc.is_float |= is_float;
    }
    Ok(acc.result())
}

fn minus_fn(args: Vec<Value>) -> EvalResult {
    if args.is_empty() {
        return Err(arity(r#"function "-" takes one or more arguments"#).into());
    }
    let mut acc = Accum::new(0);
    let negate = args.len() == 1;
    for (idx, arg) in args.iter().enumerate() {
        let (i, f, is_float) =
            numeric(arg).ok_or_else(|| type_error(format!("cannot subtract {arg}")))?;
        if idx == 0 && !negate {
            acc.int = i;
            acc.float = f;
        } else {
            acc.int = acc.int.wrapping_sub(i);
            acc.float -= f;
        }
        acc.is_float |= is_float;
    }
    Ok(acc.result())
}

fn mul_fn(args: Vec<Value>) -> EvalResult {
    let mut acc = Accum::new(1);
    for arg in &args {
        let (i, f, is_float) =
            numeric(arg).ok_or_else(|| type_error(format!("cannot multiply {arg}")))?;
        acc.int = acc.int.wrapping_mul(i);
        acc.float *= f;
        acc.is_float |= is_float;
    }
    Ok(acc.result())
}

fn div_fn(args: Vec<Value>) -> EvalResult {
    if args.len() < 2 {
        return Err(arity(r#"function "/" takes two or more arguments"#).into());
    }
    let mut acc = Accum::new(0);
    let mut int_by_zero = false;
    for (idx, arg) in args.iter().enumerate() {
        let (i, f, is_float) =
            numeric(arg).ok_or_else(|| type_error(format!("cannot divide with {arg}")))?;
        if idx == 0 {
            acc.int = i;
            acc.float = f;
        } else {
            if !is_float {
                match acc.int.checked_div(i) {
                    Some(q) => acc.int = q,
                    None if i == 0 => int_by_zero = true,
                    None => acc.int = acc.int.wrapping_div(i),
                }
            }
            acc.float /= f;
        }
        acc.is_float |= is_float;
    }
    if int_by_zero && !acc.is_float {
        return Err(ErrorKind::DivisionByZero.into());
    }
    Ok(acc.result())
}

/// Signed difference of exactly two numbers, as `first - second`.
fn difference(op: &str, args: &[Value]) -> EvalResult<f64> {
    let [a, b] = args else {
        return Err(arity(format!(r#"function "{op}" takes two arguments"#)).into());
    };
    let mut diff = 0.0;
    for (arg, factor) in [(a, 1.0), (b, -1.0)] {
        let (_, f, _) = numeric(arg).ok_or_else(|| type_error(format!("cannot compare {arg}")))?;
        diff += f * factor;
    }
    Ok(diff)
}

fn gt_fn(args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(difference(">", &args)? > 0.0))
}

fn gte_fn(args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(difference(">=", &args)? >= 0.0))
}

fn lt_fn(args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(difference("<", &args)? < 0.0))
}

fn lte_fn(args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(difference("<=", &args)? <= 0.0))
}

fn split_fn(args: Vec<Value>) -> EvalResult {
    let (Some(Value::Str(text)), Some(Value::Str(sep))) = (args.first(), args.get(1)) else {
        return Err(type_error("split function takes two string arguments").into());
    };
    let parts: Vec<Value> = if sep.is_empty() {
        text.chars().map(|c| Value::Str(c.to_string())).collect()
    } else {
        text.split(sep.as_str()).map(Value::from).collect()
    };
    Ok(Value::List(parts))
}

fn nth_fn(args: Vec<Value>) -> EvalResult {
    let [Value::List(items), Value::Int(n)] = args.as_slice() else {
        return Err(type_error("nth function takes a list and integer argument").into());
    };
    usize::try_from(*n)
        .ok()
        .and_then(|i| items.get(i))
        .cloned()
        .ok_or_else(|| ErrorKind::IndexOutOfBounds.into())
}

fn length_fn(args: Vec<Value>) -> EvalResult {
    match args.as_slice() {
        [Value::List(items)] => Ok(Value::Int(items.len() as i64)),
        _ => Err(type_error("length function takes a list as argument").into()),
    }
}

// ── Special forms ─────────────────────────────────────────────────────────────

fn and_fn(scope: &Scope, args: &[Node]) -> EvalResult {
    let mut value = Value::Bool(true);
    for arg in args {
        value = scope.eval(arg)?;
        if !value.is_truthy() {
            return Ok(Value::Bool(false));
        }
    }
    Ok(value)
}

fn or_fn(scope: &Scope, args: &[Node]) -> EvalResult {
    let mut value = Value::Bool(false);
    for arg in args {
        value = scope.eval(arg)?;
        if value.is_truthy() {
            return Ok(value);
        }
    }
    Ok(value)
}

fn if_fn(scope: &Scope, args: &[Node]) -> EvalResult {
    let [cond, then, otherwise] = args else {
        return Err(arity(r#"function "if" takes three arguments"#).into());
    };
    if scope.eval(cond)?.is_truthy() {
        scope.eval(then)
    } else {
        scope.eval(otherwise)
    }
}

fn when_fn(scope: &Scope, args: &[Node]) -> EvalResult {
    let [cond, body] = args else {
        return Err(arity(r#"function "when" takes two arguments"#).into());
    };
    if scope.eval(cond)?.is_truthy() {
        scope.eval(body)
    } else {
        Ok(Value::Bool(false))
    }
}

fn unless_fn(scope: &Scope, args: &[Node]) -> EvalResult {
    let [cond, body] = args else {
        return Err(arity(r#"function "unless" takes two arguments"#).into());
    };
    if scope.eval(cond)?.is_truthy() {
        Ok(Value::Bool(false))
    } else {
        scope.eval(body)
    }
}

fn var_fn(scope: &Scope, args: &[Node]) -> EvalResult {
    if args.is_empty() || args.len() > 2 {
        return Err(arity("var takes one or two arguments").into());
    }
    let name = args[0]
        .as_symbol()
        .ok_or_else(|| type_error("var takes a symbol as first argument"))?;
    let value = match args.get(1) {
        Some(init) => scope.eval(init)?,
        None => Value::Nil,
    };
    scope.create(name, value)?;
    Ok(Value::Nil)
}

fn set_fn(scope: &Scope, args: &[Node]) -> EvalResult {
    let [target, expr] = args else {
        return Err(arity(r#"function "set" takes two arguments"#).into());
    };
    let name = target
        .as_symbol()
        .ok_or_else(|| type_error(r#"function "set" takes a symbol as first argument"#))?;
    let value = scope.eval(expr)?;
    scope.set(name, value)?;
    Ok(Value::Nil)
}

fn do_fn(scope: &Scope, args: &[Node]) -> EvalResult {
    eval_body(&scope.branch(), args, Value::Nil)
}

fn func_fn(scope: &Scope, args: &[Node]) -> EvalResult {
    if args.len() < 2 {
        return Err(arity("func takes three or more arguments").into());
    }
    let name = args[0].as_symbol().map(str::to_owned);
    let rest = if name.is_some() { &args[1..] } else { args };
    let Some((NodeKind::List(params), body)) = rest.split_first().map(|(p, b)| (&p.kind, b)) else {
        return Err(type_error("func takes a list of parameters").into());
    };
    let params = params
        .iter()
        .map(|p| p.as_symbol().map(str::to_owned))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| type_error("func's list of parameters must be a list of symbols"))?;
    if body.is_empty() {
        return Err(arity("func takes a body sequence").into());
    }

    let closure = Rc::new(Closure::new(name.clone(), params, body.to_vec(), scope.clone()));
    scope.track(&closure);
    let value = Value::Function(Function::Plain(Plain::Closure(closure)));
    if let Some(name) = name {
        scope.create(&name, value.clone())?;
    }
    Ok(value)
}

fn for_fn(scope: &Scope, args: &[Node]) -> EvalResult {
    let [init, test, step, body @ ..] = args else {
        return Err(arity("for takes four or more arguments").into());
    };
    if body.is_empty() {
        return Err(arity("for takes four or more arguments").into());
    }
    let scope = scope.branch();
    scope.eval(init)?;
    let mut value = Value::Nil;
    while scope.eval(test)?.is_truthy() {
        value = eval_body(&scope, body, value)?;
        scope.eval(step)?;
    }
    Ok(value)
}

fn range_fn(scope: &Scope, args: &[Node]) -> EvalResult {
    if args.len() < 3 {
        return Err(arity("range takes three or more arguments").into());
    }
    let names = match &args[0].kind {
        NodeKind::Symbol(index) => Some((index.as_str(), None)),
        NodeKind::List(pair) => match pair.as_slice() {
            [i, e] => i.as_symbol().zip(e.as_symbol()).map(|(i, e)| (i, Some(e))),
            _ => None,
        },
        _ => None,
    };
    let Some((index, element)) = names else {
        return Err(type_error("range takes var name or (i elem) var name pair as first argument").into());
    };

    let scope = scope.branch();
    let collection = scope.eval(&args[1])?;
    let body = &args[2..];
    let mut value = collection.clone();
    match collection {
        Value::Int(n) => {
            scope.create(index, Value::Int(0))?;
            for i in 0..n {
                scope.set(index, Value::Int(i))?;
                value = eval_body(&scope, body, value)?;
            }
        }
        Value::List(items) => {
            scope.create(index, Value::Int(0))?;
            if let Some(element) = element {
                scope.create(element, Value::Nil)?;
            }
            for (i, item) in items.into_iter().enumerate() {
                scope.set(index, Value::Int(i as i64))?;
                if let Some(element) = element {
                    scope.set(element, item)?;
                }
                value = eval_body(&scope, body, value)?;
            }
        }
        _ => return Err(type_error("range takes an integer or a list as second argument").into()),
    }
    Ok(value)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Rules: named, compiled programs re-run when their inputs change.
//!
//! A rule evaluates in a fresh frame whose free names resolve through the
//! [`VarStore`], so reading or `set`ting an undeclared symbol reads or
//! writes process state.  Two helpers are installed per execution:
//!
//! | helper | effect |
//! |--------|--------|
//! | `(run "cmd" "arg"…)` | spawn a process and wait for it; failures are only logged |
//! | `(log "text")` | write a line to the operational log |

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;
use std::process::Command;
use std::rc::Rc;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, EvalError, LoadError};
use crate::script::ast::{FileSet, Node};
use crate::script::deps;
use crate::script::scope::{Globals, Parent, Scope};
use crate::script::value::{EvalResult, Function, Value};
use crate::script::parse;
use crate::var::VarStore;

/// Names injected into every rule execution.
pub const HELPERS: &[&str] = &["run", "log"];

/// Log target of the `log` helper.
pub const RULE_LOG_TARGET: &str = "gifttt::rule";

pub struct Rule {
    name: String,
    program: Node,
    files: Arc<FileSet>,
    /// Held for the whole of one execution.
    guard: Mutex<()>,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Rule {
    /// Compile `source` into a rule called `name`.
    pub fn parse(name: &str, source: &str) -> Result<Self, LoadError> {
        let mut files = FileSet::new();
        let program = parse(&mut files, name, source)?;
        Ok(Self {
            name: name.to_owned(),
            program,
            files: Arc::new(files),
            guard: Mutex::new(()),
        })
    }

    /// Load a rule file; the rule is named after the file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let source = fs::read_to_string(path)
            .map_err(|source| LoadError::Read { path: path.to_owned(), source })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(&name, &source)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &Node {
        &self.program
    }

    /// Variables this rule reads or writes, as far as a static scan can tell.
    pub fn dependencies(&self) -> BTreeSet<String> {
        deps::dependencies(&self.program, HELPERS)
    }

    /// Evaluate the program once, synchronously.  Variable writes block
    /// until the dispatcher has taken them, so this belongs on a blocking
    /// thread.
    pub fn execute(&self, store: &Arc<VarStore>) -> Result<(), EvalError> {
        let root = Scope::with_builtins(Arc::clone(&self.files));
        root.enclose(Parent::Globals(Rc::new(StoreGlobals { store: Arc::clone(store) })));
        let frame = root.branch();
        frame.create("run", Function::native(run_fn).into())?;
        let rule = self.name.clone();
        frame.create("log", Function::native(move |args| log_fn(&rule, args)).into())?;

        let result = frame.eval(&self.program);
        frame.release();
        result.map(|_| ())
    }

    /// Execute under this rule's guard: overlapping triggers of the same rule
    /// run one after another.
    pub async fn run(self: Arc<Self>, store: Arc<VarStore>) -> Result<(), EvalError> {
        let _guard = self.guard.lock().await;
        let rule = Arc::clone(&self);
        tokio::task::spawn_blocking(move || rule.execute(&store))
            .await
            .map_err(|e| EvalError::new(ErrorKind::Aborted(e.to_string())))?
    }
}

/// Load every file in `dir` ending in `.{suffix}`, in file-name order.
///
/// Files that cannot be read or parsed are logged and skipped; only an
/// unreadable directory is an error.
pub fn discover(dir: &Path, suffix: &str) -> io::Result<Vec<Rule>> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|x| x == suffix))
        .collect();
    paths.sort();

    let mut rules = Vec::with_capacity(paths.len());
    for path in paths {
        match Rule::load(&path) {
            Ok(rule) => {
                debug!(rule = rule.name(), "loaded rule");
                rules.push(rule);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping rule"),
        }
    }
    Ok(rules)
}

// ── Store-backed globals ──────────────────────────────────────────────────────

struct StoreGlobals {
    store: Arc<VarStore>,
}

impl Globals for StoreGlobals {
    fn get(&self, name: &str) -> EvalResult {
        Ok(self.store.get(name)?)
    }

    fn set(&self, name: &str, value: Value) -> EvalResult<()> {
        self.store.set_blocking(name, value.to_json()?)?;
        Ok(())
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn run_fn(args: Vec<Value>) -> EvalResult {
    let argv = args
        .into_iter()
        .map(|a| match a {
            Value::Str(s) => Ok(s),
            _ => Err(ErrorKind::Type("run only takes string arguments".into())),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let Some((program, rest)) = argv.split_first() else {
        return Err(ErrorKind::Arity("run takes at least one argument".into()).into());
    };
    match Command::new(program).args(rest).status() {
        Ok(status) if status.success() => debug!(program, "process finished"),
        Ok(status) => warn!(program, %status, "process failed"),
        Err(e) => warn!(program, error = %e, "cannot start process"),
    }
    Ok(Value::Nil)
}

fn log_fn(rule: &str, args: Vec<Value>) -> EvalResult {
    match args.as_slice() {
        [Value::Str(line)] => {
            info!(target: RULE_LOG_TARGET, rule, "{line}");
            Ok(Value::Nil)
        }
        _ => Err(ErrorKind::Type("log takes a single string argument".into()).into()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use crate::var::ChangeQueue;
    use serde_json::json;

    /// A store whose change queue is drained in the background.
    fn store() -> Arc<VarStore> {
        let (store, mut queue): (VarStore, ChangeQueue) = VarStore::new(Arc::new(MemoryBackend::new()));
        tokio::spawn(async move { while queue.recv().await.is_some() {} });
        Arc::new(store)
    }

    async fn exec(rule: Rule, store: &Arc<VarStore>) -> Result<(), EvalError> {
        Arc::new(rule).run(Arc::clone(store)).await
    }

    #[test]
    fn parse_names_the_rule() {
        let r = Rule::parse("door.rule", "(set x 1)").unwrap();
        assert_eq!(r.name(), "door.rule");
        assert_eq!(r.program().children().len(), 1);
    }

    #[test]
    fn syntax_error_is_a_load_error() {
        assert!(matches!(Rule::parse("bad", "(set x"), Err(LoadError::Syntax(_))));
    }

    #[test]
    fn dependencies_skip_helpers() {
        let r = Rule::parse("r", "(when door (run \"beep\") (log \"door\"))").unwrap();
        assert_eq!(r.dependencies().into_iter().collect::<Vec<_>>(), vec!["door"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn free_variables_go_through_the_store() {
        let store = store();
        store.set("temp", json!(25)).await.unwrap();
        let rule = Rule::parse("fan", "(set fan (> temp 20))").unwrap();
        exec(rule, &store).await.unwrap();
        assert_eq!(store.get("fan").unwrap(), Value::Bool(true));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unset_variable_reads_as_nil() {
        let store = store();
        let rule = Rule::parse("r", "(set seen (== missing nil))").unwrap();
        exec(rule, &store).await.unwrap();
        assert_eq!(store.get("seen").unwrap(), Value::Bool(true));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn top_level_var_does_not_collide_across_runs() {
        let store = store();
        let rule = Arc::new(Rule::parse("r", "(var n 1) (set count (+ n 1))").unwrap());
        rule.clone().run(store.clone()).await.unwrap();
        rule.run(store.clone()).await.unwrap();
        assert_eq!(store.get("count").unwrap(), Value::Int(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn errors_carry_rule_positions() {
        let store = store();
        let rule = Rule::parse("oops.rule", "(log \"a\")\n(nth (split \"a\" \",\") 3)").unwrap();
        let err = exec(rule, &store).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::IndexOutOfBounds);
        assert_eq!(err.to_string(), "oops.rule:2:2 index out of bounds");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn storing_a_function_fails() {
        let store = store();
        let rule = Rule::parse("r", "(set f (func () 1))").unwrap();
        let err = exec(rule, &store).await.unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Store(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn run_failures_are_swallowed() {
        let store = store();
        let rule = Rule::parse("r", "(run \"/definitely/not/here\") (set done true)").unwrap();
        exec(rule, &store).await.unwrap();
        assert_eq!(store.get("done").unwrap(), Value::Bool(true));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn run_checks_its_arguments() {
        let store = store();
        let err = exec(Rule::parse("r", "(run 1)").unwrap(), &store).await.unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Type(_)));
        let err = exec(Rule::parse("r", "(run)").unwrap(), &store).await.unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Arity(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn log_takes_one_string() {
        let store = store();
        exec(Rule::parse("r", "(log \"hello\")").unwrap(), &store).await.unwrap();
        let err = exec(Rule::parse("r", "(log 1 2)").unwrap(), &store).await.unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Type(_)));
    }

    #[test]
    fn discover_loads_matching_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.rule"), "(set b 1)").unwrap();
        fs::write(dir.path().join("a.rule"), "(set a 1)").unwrap();
        fs::write(dir.path().join("broken.rule"), "(set").unwrap();
        fs::write(dir.path().join("notes.txt"), "(set c 1)").unwrap();
        fs::create_dir(dir.path().join("sub.rule")).unwrap();

        let rules = discover(dir.path(), "rule").unwrap();
        let names: Vec<_> = rules.iter().map(Rule::name).collect();
        assert_eq!(names, vec!["a.rule", "b.rule"]);
    }

    #[test]
    fn discover_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover(&dir.path().join("gone"), "rule").is_err());
    }
}

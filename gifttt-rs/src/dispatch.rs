//! Rule dispatch.
//!
//! ## Architecture
//!
//! The [`Dispatcher`] is the single consumer of the store's
//! [`ChangeQueue`].  Every change starts a *wave*: a spawned task, tagged
//! with a fresh ULID, that runs each rule depending on the changed variable.
//! Executions of one wave run concurrently; each one holds its rule's guard,
//! so only executions of the *same* rule are serialized.
//!
//! ```text
//!   Clock ──┐
//!   API ────┼─► VarStore::set ─► ChangeQueue ─► Dispatcher::run
//!   rules ──┘     (rendezvous)                      │ spawn per change
//!                                                   ▼
//!                                      wave ─► rule A ─┐ (JoinSet)
//!                                           ─► rule B ─┤
//!                                           ─► …      ─┘─► summary
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{self, JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};
use ulid::Ulid;

use crate::clock::Clock;
use crate::error::EvalError;
use crate::rule::Rule;
use crate::var::{Change, ChangeQueue, VarStore};

// ── Dependency index ──────────────────────────────────────────────────────────

/// Variable name → rules that reference it.  Built before dispatch starts,
/// read-only afterwards.
#[derive(Debug, Default)]
pub struct DependencyIndex {
    map: HashMap<String, Vec<Arc<Rule>>>,
    rules: usize,
}

impl DependencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(rules: impl IntoIterator<Item = Rule>) -> Self {
        let mut index = Self::new();
        for rule in rules {
            index.insert(Arc::new(rule));
        }
        index
    }

    /// Register `rule` under each of its dependencies.  A rule with the same
    /// name is only listed once per variable.
    pub fn insert(&mut self, rule: Arc<Rule>) {
        for var in rule.dependencies() {
            let dependents = self.map.entry(var).or_default();
            if !dependents.iter().any(|r| r.name() == rule.name()) {
                dependents.push(Arc::clone(&rule));
            }
        }
        self.rules += 1;
    }

    pub fn dependents(&self, var: &str) -> &[Arc<Rule>] {
        self.map.get(var).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of distinct variables with at least one dependent.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Number of rules inserted.
    pub fn rule_count(&self) -> usize {
        self.rules
    }
}

// ── Reports ───────────────────────────────────────────────────────────────────

/// Outcome records mirrored from the log for embedders and tests.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// One rule execution finished.
    Executed { wave: Ulid, rule: String, error: Option<String> },
    /// Every execution of a wave finished.
    Wave { wave: Ulid, variable: String, rules: usize, failed: usize },
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

pub struct Dispatcher {
    index: Arc<DependencyIndex>,
    store: Arc<VarStore>,
    reports: Option<mpsc::UnboundedSender<Report>>,
}

impl Dispatcher {
    pub fn new(index: DependencyIndex, store: Arc<VarStore>) -> Self {
        Self { index: Arc::new(index), store, reports: None }
    }

    /// Also forward [`Report`]s to the returned receiver.
    pub fn with_reports(mut self) -> (Self, mpsc::UnboundedReceiver<Report>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.reports = Some(tx);
        (self, rx)
    }

    pub fn index(&self) -> &DependencyIndex {
        &self.index
    }

    /// Consume changes until every store handle is gone.
    pub async fn run(self: Arc<Self>, mut queue: ChangeQueue) {
        info!(rules = self.index.rule_count(), variables = self.index.len(), "dispatcher started");
        while let Some(change) = queue.recv().await {
            let wave = Ulid::new();
            let span = info_span!("wave", wave = %wave, var = %change.name);
            tokio::spawn(Arc::clone(&self).wave(wave, change).instrument(span));
        }
        debug!("change queue closed, dispatcher stopped");
    }

    fn report(&self, report: Report) {
        if let Some(tx) = &self.reports {
            let _ = tx.send(report);
        }
    }

    async fn wave(self: Arc<Self>, wave: Ulid, change: Change) {
        let dependents = self.index.dependents(&change.name);
        if dependents.is_empty() {
            debug!("no dependent rules");
            self.report(Report::Wave { wave, variable: change.name, rules: 0, failed: 0 });
            return;
        }

        let mut set = JoinSet::new();
        let mut names = HashMap::new();
        for rule in dependents {
            let rule = Arc::clone(rule);
            let store = Arc::clone(&self.store);
            let span = info_span!("rule", rule = rule.name());
            let name = rule.name().to_owned();
            let handle = set.spawn(
                async move {
                    let name = rule.name().to_owned();
                    let result = rule.run(store).await;
                    (name, result)
                }
                .instrument(span),
            );
            names.insert(handle.id(), name);
        }

        let rules = dependents.len();
        let mut failed = 0;
        while let Some(joined) = set.join_next_with_id().await {
            let (rule, error) = outcome(joined, &names);
            failed += usize::from(error.is_some());
            self.report(Report::Executed { wave, rule, error });
        }
        info!(rules, failed, "wave finished");
        self.report(Report::Wave { wave, variable: change.name, rules, failed });
    }
}

/// Rule name and error message of one finished execution.  A task that
/// died is attributed through `names`.
fn outcome(
    joined: Result<(task::Id, Execution), JoinError>,
    names: &HashMap<task::Id, String>,
) -> (String, Option<String>) {
    match joined {
        Ok((_, (rule, Ok(())))) => {
            debug!(rule, "rule executed");
            (rule, None)
        }
        Ok((_, (rule, Err(e)))) => {
            warn!(rule, error = %e, "rule failed");
            (rule, Some(e.to_string()))
        }
        Err(e) => {
            let rule = names.get(&e.id()).cloned().unwrap_or_default();
            error!(rule, error = %e, "rule task died");
            (rule, Some(e.to_string()))
        }
    }
}

type Execution = (String, Result<(), EvalError>);

// ── Engine ────────────────────────────────────────────────────────────────────

/// The long-lived tasks of a running system.
pub struct Engine {
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Start the dispatch loop and, if given, the clock.
    pub fn start(dispatcher: Arc<Dispatcher>, queue: ChangeQueue, clock: Option<Clock>) -> Self {
        let mut tasks = vec![tokio::spawn(dispatcher.run(queue))];
        if let Some(clock) = clock {
            tasks.push(tokio::spawn(clock.run()));
        }
        Self { tasks }
    }

    /// Stop the clock and the dispatch loop.  Waves already running finish
    /// on their own.
    pub async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!(error = %e, "engine task failed");
                }
            }
        }
        info!("engine stopped");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

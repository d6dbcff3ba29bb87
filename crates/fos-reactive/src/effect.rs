//! Effects
//!
//! Side-effecting callbacks re-run when their tracked dependency values
//! change. Registration returns an [`EffectHandle`] that owns the effect's
//! cleanup slot and can dispose it.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::expr::Interpreter;
use crate::pattern::{MatchRule, dependency_matches};
use crate::{Environment, EvalError, Path, ReactiveError, ReactiveResult, Scope, Store, Value};

/// What an effect body sees
pub struct EffectContext<'a> {
    pub store: &'a mut Store,
    pub env: &'a Environment,
}

impl EffectContext<'_> {
    pub fn interpreter(&mut self, scope: Scope) -> Interpreter<'_> {
        Interpreter::new(self.store, self.env, scope)
    }
}

/// Runs before the next run and on disposal
pub type Cleanup = Box<dyn FnOnce(&mut EffectContext<'_>)>;

pub type EffectBody = Box<dyn FnMut(&mut EffectContext<'_>) -> Result<Option<Cleanup>, EvalError>>;

/// One tracked dependency
pub enum EffectDep {
    Path(Path),
    /// Monitored function result
    Computed(Box<dyn Fn(&mut Store, &Environment) -> Value>),
}

impl fmt::Debug for EffectDep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectDep::Path(p) => write!(f, "Path({p})"),
            EffectDep::Computed(_) => write!(f, "Computed"),
        }
    }
}

/// Dependency list of an effect
#[derive(Debug)]
pub enum EffectDeps {
    /// Runs once, at registration
    Static,
    Tracked(Vec<EffectDep>),
}

impl EffectDeps {
    pub fn paths<I: IntoIterator<Item = Path>>(paths: I) -> Self {
        EffectDeps::Tracked(paths.into_iter().map(EffectDep::Path).collect())
    }
}

/// Runaway-loop guard budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardConfig {
    pub max_runs: u32,
    pub window: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_runs: 100,
            window: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Default)]
struct RunGuard {
    window_start: Option<Instant>,
    runs: u32,
}

impl RunGuard {
    fn check(&mut self, id: EffectId, config: GuardConfig) -> ReactiveResult<()> {
        let now = Instant::now();
        match self.window_start {
            Some(start) if now.duration_since(start) <= config.window => {}
            _ => {
                self.window_start = Some(now);
                self.runs = 0;
            }
        }
        self.runs += 1;
        if self.runs > config.max_runs {
            tracing::error!("effect {} exceeded {} runs", id.0, config.max_runs);
            return Err(ReactiveError::RunawayEffect {
                id: id.0,
                runs: self.runs,
            });
        }
        Ok(())
    }
}

#[derive(Default)]
struct EffectShared {
    disposed: bool,
    cleanup: Option<Cleanup>,
}

/// Effect identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u32);

struct EffectEntry {
    deps: EffectDeps,
    body: EffectBody,
    last: Vec<Value>,
    guard: RunGuard,
    shared: Rc<RefCell<EffectShared>>,
}

/// Handle returned by registration
#[derive(Clone)]
pub struct EffectHandle {
    id: EffectId,
    shared: Rc<RefCell<EffectShared>>,
}

impl EffectHandle {
    pub fn id(&self) -> EffectId {
        self.id
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.borrow().disposed
    }

    /// Run the pending cleanup and stop the effect
    pub fn dispose(&self, reactive: &mut crate::Reactive) {
        reactive.dispose_effect(self.id);
        self.shared.borrow_mut().disposed = true;
    }
}

impl fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectHandle")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

fn snapshot(deps: &EffectDeps, store: &mut Store, env: &Environment) -> Vec<Value> {
    match deps {
        EffectDeps::Static => Vec::new(),
        EffectDeps::Tracked(deps) => deps
            .iter()
            .map(|dep| match dep {
                EffectDep::Path(p) => store.get(p),
                EffectDep::Computed(f) => f(&mut *store, env),
            })
            .collect(),
    }
}

fn run_entry(
    id: EffectId,
    entry: &mut EffectEntry,
    ctx: &mut EffectContext<'_>,
    config: GuardConfig,
) -> ReactiveResult<()> {
    entry.guard.check(id, config)?;
    let pending = entry.shared.borrow_mut().cleanup.take();
    if let Some(cleanup) = pending {
        cleanup(ctx);
    }
    match (entry.body)(ctx) {
        Ok(cleanup) => entry.shared.borrow_mut().cleanup = cleanup,
        Err(err) => tracing::warn!("effect {} failed: {}", id.0, err),
    }
    Ok(())
}

/// Registered effects
#[derive(Default)]
pub struct EffectTable {
    entries: BTreeMap<EffectId, EffectEntry>,
    next_id: u32,
}

impl EffectTable {
    /// Register and run once
    pub fn register(
        &mut self,
        store: &mut Store,
        env: &Environment,
        deps: EffectDeps,
        body: EffectBody,
        config: GuardConfig,
    ) -> ReactiveResult<EffectHandle> {
        let id = EffectId(self.next_id);
        self.next_id += 1;

        let shared = Rc::new(RefCell::new(EffectShared::default()));
        let mut entry = EffectEntry {
            last: snapshot(&deps, store, env),
            deps,
            body,
            guard: RunGuard::default(),
            shared: Rc::clone(&shared),
        };
        let mut ctx = EffectContext { store, env };
        run_entry(id, &mut entry, &mut ctx, config)?;

        // static effects are kept for disposal
        self.entries.insert(id, entry);
        Ok(EffectHandle { id, shared })
    }

    /// Re-run tracked effects whose dependency values changed
    pub fn run_due(
        &mut self,
        store: &mut Store,
        env: &Environment,
        dirty: &BTreeSet<Path>,
        config: GuardConfig,
    ) -> ReactiveResult<usize> {
        if dirty.is_empty() {
            return Ok(0);
        }
        let mut ran = 0;
        for (&id, entry) in self.entries.iter_mut() {
            if entry.shared.borrow().disposed {
                continue;
            }
            let EffectDeps::Tracked(deps) = &entry.deps else {
                continue;
            };
            let touched = deps.iter().any(|dep| match dep {
                EffectDep::Path(pattern) => dirty
                    .iter()
                    .any(|changed| dependency_matches(changed, pattern, MatchRule::Effect)),
                EffectDep::Computed(_) => true,
            });
            if !touched {
                continue;
            }
            let values = snapshot(&entry.deps, store, env);
            if values == entry.last {
                continue;
            }
            entry.last = values;
            let mut ctx = EffectContext {
                store: &mut *store,
                env,
            };
            run_entry(id, entry, &mut ctx, config)?;
            ran += 1;
        }
        Ok(ran)
    }

    /// Drop an effect, running its pending cleanup
    pub fn dispose(&mut self, id: EffectId, store: &mut Store, env: &Environment) {
        if let Some(entry) = self.entries.remove(&id) {
            let pending = {
                let mut shared = entry.shared.borrow_mut();
                shared.disposed = true;
                shared.cleanup.take()
            };
            if let Some(cleanup) = pending {
                cleanup(&mut EffectContext { store, env });
            }
        }
    }

    /// Dispose every effect
    pub fn dispose_all(&mut self, store: &mut Store, env: &Environment) {
        let ids: Vec<EffectId> = self.entries.keys().copied().collect();
        for id in ids {
            self.dispose(id, store, env);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for EffectTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectTable")
            .field("effects", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_effect_runs_once() {
        let mut store = Store::new();
        let env = Environment::default();
        let mut table = EffectTable::default();
        let runs = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&runs);
        table
            .register(
                &mut store,
                &env,
                EffectDeps::Tracked(Vec::new()),
                Box::new(
                    move |_: &mut EffectContext<'_>| -> Result<Option<Cleanup>, EvalError> {
                        *counter.borrow_mut() += 1;
                        Ok(None)
                    },
                ),
                GuardConfig::default(),
            )
            .unwrap();
        assert_eq!(*runs.borrow(), 1);

        let dirty: BTreeSet<Path> = [Path::parse("app.anything")].into_iter().collect();
        let ran = table
            .run_due(&mut store, &env, &dirty, GuardConfig::default())
            .unwrap();
        assert_eq!(ran, 0);
        assert_eq!(*runs.borrow(), 1);
    }

    #[test]
    fn test_guard_trips_after_budget() {
        let mut guard = RunGuard::default();
        let config = GuardConfig {
            max_runs: 3,
            window: Duration::from_secs(60),
        };
        for _ in 0..3 {
            guard.check(EffectId(7), config).unwrap();
        }
        assert_eq!(
            guard.check(EffectId(7), config),
            Err(ReactiveError::RunawayEffect { id: 7, runs: 4 })
        );
    }

    #[test]
    fn test_guard_window_resets() {
        let mut guard = RunGuard::default();
        let config = GuardConfig {
            max_runs: 1,
            window: Duration::ZERO,
        };
        guard.check(EffectId(0), config).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        guard.check(EffectId(0), config).unwrap();
    }
}

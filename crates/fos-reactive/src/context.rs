//! Reactive context
//!
//! One [`Reactive`] value owns the store, the registries and the effects
//! of a page. It is passed explicitly to whatever needs it and can be
//! reset as a whole.

use std::collections::BTreeSet;
use std::rc::Rc;

use crate::effect::{EffectBody, EffectDeps, EffectHandle, EffectId, EffectTable, GuardConfig};
use crate::expr::{Expression, Interpreter, Program, scoped_dependencies};
use crate::registry::{SharedEntry, StateHandle, check_key};
use crate::{Environment, EvalError, Hierarchy, Path, ReactiveResult, Scope, Store, Value};

/// Store, environment and effects of one runtime instance
#[derive(Debug, Default)]
pub struct Reactive {
    pub store: Store,
    pub env: Environment,
    effects: EffectTable,
    guard: GuardConfig,
}

impl Reactive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_guard(mut self, guard: GuardConfig) -> Self {
        self.guard = guard;
        self
    }

    pub fn guard(&self) -> GuardConfig {
        self.guard
    }

    /// Dispose every effect, keeping state
    pub fn dispose_effects(&mut self) {
        self.effects.dispose_all(&mut self.store, &self.env);
        self.effects = EffectTable::default();
    }

    /// Dispose effects and drop all state and registrations
    pub fn reset(&mut self) {
        self.dispose_effects();
        self.store.reset();
        self.env.reset();
        tracing::debug!("reactive context reset");
    }

    /// Declare state `name` at `hierarchy`; the initial value is only
    /// written when nothing is stored there yet
    pub fn state(
        &mut self,
        hierarchy: &Hierarchy,
        name: &str,
        initial: Value,
    ) -> ReactiveResult<StateHandle> {
        check_key(name)?;
        let key = self.env.states.declare(hierarchy, name);
        if !self.store.contains(&key) {
            self.store.write(&key, initial)?;
        }
        Ok(StateHandle::new(key))
    }

    /// Declare shared state; an existing key keeps its value
    pub fn share(&mut self, key: &str, initial: Value) -> ReactiveResult<SharedEntry> {
        check_key(key)?;
        let path = self.env.shared.path(key);
        if self.env.shared.declare(key) && !self.store.contains(&path) {
            self.store.write(&path, initial)?;
        }
        Ok(SharedEntry::new(key, path))
    }

    pub fn interpreter(&mut self, scope: Scope) -> Interpreter<'_> {
        Interpreter::new(&mut self.store, &self.env, scope)
    }

    pub fn eval(&mut self, expr: &Expression, scope: &Scope) -> Result<Value, EvalError> {
        self.interpreter(scope.clone()).eval(expr)
    }

    pub fn run(&mut self, program: &Rc<Program>, scope: &Scope) -> Result<Value, EvalError> {
        self.interpreter(scope.clone()).run(program)
    }

    /// Scoped keys `expr` reads from `scope`
    pub fn dependencies(&self, expr: &Expression, scope: &Scope) -> BTreeSet<Path> {
        scoped_dependencies(expr, scope, &self.store, &self.env)
    }

    /// Register an effect and run it once
    pub fn effect(&mut self, deps: EffectDeps, body: EffectBody) -> ReactiveResult<EffectHandle> {
        self.effects
            .register(&mut self.store, &self.env, deps, body, self.guard)
    }

    /// Re-run effects affected by `dirty`; runaway effects are fatal
    pub fn run_effects(&mut self, dirty: &BTreeSet<Path>) -> ReactiveResult<usize> {
        self.effects
            .run_due(&mut self.store, &self.env, dirty, self.guard)
    }

    pub fn dispose_effect(&mut self, id: EffectId) {
        self.effects.dispose(id, &mut self.store, &self.env);
    }

    pub fn effect_count(&self) -> usize {
        self.effects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReactiveError;
    use crate::effect::{Cleanup, EffectContext};
    use crate::expr::parse_expression;

    #[test]
    fn test_state_initializes_once() {
        let mut rx = Reactive::new();
        let h = Hierarchy::root();
        let count = rx.state(&h, "count", Value::from(1.0)).unwrap();
        count.set(&mut rx.store, Value::from(5.0)).unwrap();
        let again = rx.state(&h, "count", Value::from(1.0)).unwrap();
        assert_eq!(again.get(&rx.store), Value::from(5.0));
    }

    #[test]
    fn test_state_object_marks_nested() {
        let mut rx = Reactive::new();
        let user = rx.state(&Hierarchy::root(), "user", Value::Null).unwrap();
        rx.store.take_dirty();
        user.set(
            &mut rx.store,
            Value::object([("name", Value::from("Ann")), ("age", Value::from(3.0))]),
        )
        .unwrap();
        let dirty: Vec<String> = rx.store.dirty().iter().map(ToString::to_string).collect();
        assert_eq!(dirty, vec!["app.user", "app.user.age", "app.user.name"]);
    }

    #[test]
    fn test_share_returns_existing() {
        let mut rx = Reactive::new();
        let a = rx.share("theme", Value::from("dark")).unwrap();
        let b = rx.share("theme", Value::from("light")).unwrap();
        assert_eq!(a, b);
        assert_eq!(b.get(&rx.store), Value::from("dark"));
        let scope = Scope::new(Hierarchy::root().child("Deep"));
        let expr = parse_expression("theme").unwrap();
        assert_eq!(rx.eval(&expr, &scope).unwrap(), Value::from("dark"));
    }

    #[test]
    fn test_reserved_state_names() {
        let mut rx = Reactive::new();
        assert_eq!(
            rx.state(&Hierarchy::root(), "JSON", Value::Null),
            Err(ReactiveError::ReservedKey("JSON".into()))
        );
        assert!(rx.share("this", Value::Null).is_err());
    }

    #[test]
    fn test_reset_runs_cleanups() {
        let mut rx = Reactive::new();
        let cleaned = Rc::new(std::cell::Cell::new(false));
        let flag = Rc::clone(&cleaned);
        rx.effect(
            EffectDeps::Static,
            Box::new(
                move |_: &mut EffectContext<'_>| -> Result<Option<Cleanup>, EvalError> {
                    let flag = Rc::clone(&flag);
                    let cleanup: Cleanup = Box::new(move |_: &mut EffectContext<'_>| flag.set(true));
                    Ok(Some(cleanup))
                },
            ),
        )
        .unwrap();
        rx.state(&Hierarchy::root(), "x", Value::from(1.0)).unwrap();
        rx.reset();
        assert!(cleaned.get());
        assert_eq!(rx.effect_count(), 0);
        assert!(rx.env.states.is_empty());
        assert_eq!(rx.store.get(&Path::parse("app.x")), Value::Undefined);
    }
}

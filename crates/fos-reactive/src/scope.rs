//! Scoped Context Resolver
//!
//! Name lookup for expressions evaluated at a document position: local
//! overrides first, then the component hierarchy walked outward (scoped
//! functions before state at each level), then synthetic setters, shared
//! state and finally the global environment.

use crate::{Environment, Function, Hierarchy, Path, Store, Value};

/// Local binding visible to an evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Local {
    Value(Value),
    /// Alias of a store path (loop items alias `array.N`)
    Alias(Path),
}

/// Evaluation scope: owning hierarchy plus shadowing locals
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    hierarchy: Hierarchy,
    locals: Vec<(String, Local)>,
}

/// What a name denotes
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Local(Value),
    /// Store-backed state or shared entry
    State(Path),
    Function(Function),
    Global(Value),
    Missing,
}

impl Scope {
    pub fn new(hierarchy: Hierarchy) -> Self {
        Self {
            hierarchy,
            locals: Vec::new(),
        }
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// Builder form of [`Scope::bind`]
    pub fn with_local(mut self, name: impl Into<String>, local: Local) -> Self {
        self.bind(name, local);
        self
    }

    /// Add a local; later bindings shadow earlier ones
    pub fn bind(&mut self, name: impl Into<String>, local: Local) {
        self.locals.push((name.into(), local));
    }

    pub fn local(&self, name: &str) -> Option<&Local> {
        self.locals
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, l)| l)
    }

    pub fn local_mut(&mut self, name: &str) -> Option<&mut Local> {
        self.locals
            .iter_mut()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, l)| l)
    }

    pub fn locals(&self) -> impl Iterator<Item = (&str, &Local)> {
        self.locals.iter().map(|(n, l)| (n.as_str(), l))
    }

    /// Number of locals, for block-scoped truncation
    pub fn depth(&self) -> usize {
        self.locals.len()
    }

    pub fn truncate(&mut self, depth: usize) {
        self.locals.truncate(depth);
    }

    /// Resolve `name` following the lookup order
    pub fn resolve(&self, name: &str, store: &Store, env: &Environment) -> Resolved {
        match self.local(name) {
            Some(Local::Value(v)) => return Resolved::Local(v.clone()),
            Some(Local::Alias(path)) => return Resolved::State(path.clone()),
            None => {}
        }

        for level in self.hierarchy.levels() {
            if let Some(f) = env.functions.get(&level, name) {
                return Resolved::Function(f.clone());
            }
            let key = level.key(name);
            if is_declared(&key, store, env) {
                return Resolved::State(key);
            }
        }

        if let Some(path) = self.setter_target(name, store, env) {
            return Resolved::Function(Function::Setter(path));
        }

        if env.shared.contains(name) {
            return Resolved::State(env.shared.path(name));
        }

        match env.globals.get(name) {
            Some(v) => Resolved::Global(v.clone()),
            None => Resolved::Missing,
        }
    }

    /// Scoped key of the state `foo` when `name` is `setFoo`
    pub fn setter_target(&self, name: &str, store: &Store, env: &Environment) -> Option<Path> {
        let state = setter_state_name(name)?;
        self.hierarchy
            .levels()
            .map(|level| level.key(&state))
            .find(|key| is_declared(key, store, env))
            .or_else(|| env.shared.contains(&state).then(|| env.shared.path(&state)))
    }
}

pub(crate) fn is_declared(key: &Path, store: &Store, env: &Environment) -> bool {
    env.states.contains(key) || store.contains(key)
}

/// `setFooBar` -> `fooBar`
pub fn setter_state_name(name: &str) -> Option<String> {
    let rest = name.strip_prefix("set")?;
    let mut chars = rest.chars();
    let first = chars.next()?;
    if !first.is_uppercase() {
        return None;
    }
    Some(first.to_lowercase().chain(chars).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested() -> (Store, Environment, Hierarchy, Hierarchy) {
        let mut store = Store::new();
        let mut env = Environment::default();
        let a = Hierarchy::root().child("A");
        let b = a.child("B");
        store.write(&a.key("count"), Value::from(1.0)).unwrap();
        store.write(&b.key("count"), Value::from(2.0)).unwrap();
        env.states.declare(&a, "count");
        env.states.declare(&b, "count");
        (store, env, a, b)
    }

    #[test]
    fn test_inner_scope_shadows_outer() {
        let (store, env, a, b) = nested();
        assert_eq!(
            Scope::new(b.clone()).resolve("count", &store, &env),
            Resolved::State(b.key("count"))
        );
        assert_eq!(
            Scope::new(a.clone()).resolve("count", &store, &env),
            Resolved::State(a.key("count"))
        );
    }

    #[test]
    fn test_outward_walk() {
        let (mut store, env, a, b) = nested();
        store.write(&a.key("title"), Value::from("hi")).unwrap();
        assert_eq!(
            Scope::new(b.child("C")).resolve("title", &store, &env),
            Resolved::State(a.key("title"))
        );
    }

    #[test]
    fn test_local_shadows_state() {
        let (store, env, _, b) = nested();
        let scope = Scope::new(b).with_local("count", Local::Value(Value::from(9.0)));
        assert_eq!(
            scope.resolve("count", &store, &env),
            Resolved::Local(Value::from(9.0))
        );
    }

    #[test]
    fn test_synthetic_setter() {
        let (store, env, a, _) = nested();
        assert_eq!(
            Scope::new(a.child("X")).resolve("setCount", &store, &env),
            Resolved::Function(Function::Setter(a.key("count")))
        );
        assert_eq!(setter_state_name("settle"), None);
        assert_eq!(setter_state_name("setUserName").as_deref(), Some("userName"));
    }

    #[test]
    fn test_globals_last() {
        let (store, env, a, _) = nested();
        assert!(matches!(
            Scope::new(a.clone()).resolve("Math", &store, &env),
            Resolved::Global(Value::Object(_))
        ));
        assert_eq!(
            Scope::new(a).resolve("nothing", &store, &env),
            Resolved::Missing
        );
    }
}

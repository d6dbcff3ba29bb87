//! State, function and shared-state registries
//!
//! Together with the global environment these form the [`Environment`]
//! every evaluation resolves names against.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::globals::Globals;
use crate::{Function, Hierarchy, Path, ReactiveError, ReactiveResult, Store, Value};

/// Root segment for shared state, outside every hierarchy
pub const SHARED_ROOT: &str = "$shared";

/// Names that can never be state or shared keys
pub const RESERVED_NAMES: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "export", "extends", "false", "finally", "for", "function", "if", "import", "in",
    "instanceof", "let", "new", "null", "return", "super", "switch", "this", "throw", "true",
    "try", "typeof", "undefined", "var", "void", "while", "with", "yield", "await", "async",
    "event", "NaN", "Infinity", "Math", "JSON", "Number", "String", "Boolean", "Object",
    "Array", "Date", "RegExp", "Promise", "console", "window", "document",
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Declared state entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateInfo {
    pub name: String,
    pub hierarchy: Hierarchy,
}

/// Scoped keys of every declared state, with their owning hierarchy
#[derive(Debug, Default)]
pub struct StateRegistry {
    entries: BTreeMap<Path, StateInfo>,
}

impl StateRegistry {
    /// Record `name` as declared at `hierarchy`, returning its scoped key
    pub fn declare(&mut self, hierarchy: &Hierarchy, name: &str) -> Path {
        let key = hierarchy.key(name);
        self.entries.entry(key.clone()).or_insert_with(|| StateInfo {
            name: name.to_string(),
            hierarchy: hierarchy.clone(),
        });
        key
    }

    pub fn contains(&self, key: &Path) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &Path) -> Option<&StateInfo> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &StateInfo)> {
        self.entries.iter()
    }

    /// Names declared exactly at `hierarchy`
    pub fn declared_in<'a>(&'a self, hierarchy: &'a Hierarchy) -> impl Iterator<Item = &'a str> {
        self.entries
            .values()
            .filter(move |info| &info.hierarchy == hierarchy)
            .map(|info| info.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Functions declared by inline logic, per hierarchy
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    scopes: HashMap<Hierarchy, HashMap<String, Function>>,
}

impl FunctionRegistry {
    pub fn register(&mut self, hierarchy: &Hierarchy, name: impl Into<String>, func: Function) {
        self.scopes
            .entry(hierarchy.clone())
            .or_default()
            .insert(name.into(), func);
    }

    /// Function registered for exactly this hierarchy
    pub fn get(&self, hierarchy: &Hierarchy, name: &str) -> Option<&Function> {
        self.scopes.get(hierarchy)?.get(name)
    }

    pub fn names(&self, hierarchy: &Hierarchy) -> Vec<&str> {
        self.scopes
            .get(hierarchy)
            .map(|fns| fns.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.scopes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.scopes.clear();
    }
}

/// Keys of shared state
#[derive(Debug, Default)]
pub struct SharedRegistry {
    keys: BTreeSet<String>,
}

impl SharedRegistry {
    /// Store path of a shared key
    pub fn path(&self, key: &str) -> Path {
        Path::from_segments([SHARED_ROOT, key])
    }

    /// Returns `false` when the key already existed
    pub fn declare(&mut self, key: &str) -> bool {
        self.keys.insert(key.to_string())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

/// Everything names resolve against besides the store
#[derive(Debug, Default)]
pub struct Environment {
    pub states: StateRegistry,
    pub functions: FunctionRegistry,
    pub shared: SharedRegistry,
    pub globals: Globals,
}

impl Environment {
    /// Forget declared state and functions; globals stay
    pub fn reset(&mut self) {
        self.states.clear();
        self.functions.clear();
        self.shared.clear();
    }
}

/// Accessor for one declared state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateHandle {
    path: Path,
}

impl StateHandle {
    pub(crate) fn new(path: Path) -> Self {
        Self { path }
    }

    /// Scoped key
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, store: &Store) -> Value {
        store.get(&self.path)
    }

    /// Write the value; object values also mark every nested path
    pub fn set(&self, store: &mut Store, value: Value) -> ReactiveResult<()> {
        store.write(&self.path, value)
    }

    pub fn update(&self, store: &mut Store, f: impl FnOnce(Value) -> Value) -> ReactiveResult<()> {
        store.update(&self.path, f)
    }
}

/// Getter/setter pair for one shared key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedEntry {
    key: String,
    path: Path,
}

impl SharedEntry {
    pub(crate) fn new(key: &str, path: Path) -> Self {
        Self {
            key: key.to_string(),
            path,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, store: &Store) -> Value {
        store.get(&self.path)
    }

    pub fn set(&self, store: &mut Store, value: Value) -> ReactiveResult<()> {
        store.write(&self.path, value)
    }

    pub fn update(&self, store: &mut Store, f: impl FnOnce(Value) -> Value) -> ReactiveResult<()> {
        store.update(&self.path, f)
    }
}

/// Reject reserved names
pub fn check_key(name: &str) -> ReactiveResult<()> {
    if is_reserved(name) {
        return Err(ReactiveError::ReservedKey(name.to_string()));
    }
    Ok(())
}

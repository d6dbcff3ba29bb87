//! Reactive Store (arena-based containers)
//!
//! Objects and arrays live in an arena of containers addressed by
//! [`ContainerId`]; primitives sit in container slots as leaves. Reading a
//! nested container always yields the same id until that container is
//! replaced, so identity of unchanged substructure stays stable. Every
//! write goes through [`Store::write`] or [`Store::mutate_array`], which
//! record dirty paths and request a flush.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::path::WILDCARD;
use crate::{Path, ReactiveError, ReactiveResult, Value};

/// Container identifier (index into arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(u32);

#[derive(Debug, Clone)]
enum Slot {
    Leaf(Value),
    Node(ContainerId),
}

#[derive(Debug)]
enum Container {
    Object(BTreeMap<String, Slot>),
    Array(Vec<Slot>),
}

/// Handle to a wrapped object or array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    pub id: ContainerId,
    pub path: Path,
}

/// Result of wrapping a value
#[derive(Debug, Clone, PartialEq)]
pub enum Wrapped {
    /// Primitives and special values are never wrapped
    Primitive(Value),
    Container(ContainerRef),
}

/// Mutating array methods, applied as one write
pub enum ArrayOp {
    Push(Vec<Value>),
    Pop,
    Shift,
    Unshift(Vec<Value>),
    Splice {
        start: i64,
        delete: Option<usize>,
        items: Vec<Value>,
    },
    Sort(Option<Box<dyn FnMut(&Value, &Value) -> Ordering>>),
    Reverse,
    Fill {
        value: Value,
        start: i64,
        end: Option<i64>,
    },
    CopyWithin {
        target: i64,
        start: i64,
        end: Option<i64>,
    },
}

impl ArrayOp {
    /// Method names intercepted as array mutators
    pub const NAMES: &'static [&'static str] = &[
        "push",
        "pop",
        "shift",
        "unshift",
        "splice",
        "sort",
        "reverse",
        "copyWithin",
        "fill",
    ];

    pub fn is_mutator(name: &str) -> bool {
        Self::NAMES.contains(&name)
    }

    fn name(&self) -> &'static str {
        match self {
            ArrayOp::Push(_) => "push",
            ArrayOp::Pop => "pop",
            ArrayOp::Shift => "shift",
            ArrayOp::Unshift(_) => "unshift",
            ArrayOp::Splice { .. } => "splice",
            ArrayOp::Sort(_) => "sort",
            ArrayOp::Reverse => "reverse",
            ArrayOp::Fill { .. } => "fill",
            ArrayOp::CopyWithin { .. } => "copyWithin",
        }
    }
}

impl fmt::Debug for ArrayOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArrayOp::{}", self.name())
    }
}

/// Relative index as used by splice/fill/copyWithin
fn relative_index(i: i64, len: usize) -> usize {
    if i < 0 {
        len.saturating_sub(i.unsigned_abs() as usize)
    } else {
        (i as usize).min(len)
    }
}

/// Default sort order: string comparison, undefined last
fn default_order(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Undefined, Value::Undefined) => Ordering::Equal,
        (Value::Undefined, _) => Ordering::Greater,
        (_, Value::Undefined) => Ordering::Less,
        _ => a.to_display().cmp(&b.to_display()),
    }
}

/// Arena store with dirty-path tracking
#[derive(Debug)]
pub struct Store {
    arena: Vec<Option<Container>>,
    free: Vec<u32>,
    root: ContainerId,
    dirty: BTreeSet<Path>,
    flush_requested: bool,
    flush_requests: u64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            arena: vec![Some(Container::Object(BTreeMap::new()))],
            free: Vec::new(),
            root: ContainerId(0),
            dirty: BTreeSet::new(),
            flush_requested: false,
            flush_requests: 0,
        }
    }

    /// Drop all state, dirty paths included
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    // === Arena ===

    fn alloc(&mut self, container: Container) -> ContainerId {
        match self.free.pop() {
            Some(idx) => {
                self.arena[idx as usize] = Some(container);
                ContainerId(idx)
            }
            None => {
                self.arena.push(Some(container));
                ContainerId(self.arena.len() as u32 - 1)
            }
        }
    }

    fn container(&self, id: ContainerId) -> Option<&Container> {
        self.arena.get(id.0 as usize).and_then(Option::as_ref)
    }

    fn container_mut(&mut self, id: ContainerId) -> Option<&mut Container> {
        self.arena.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    fn into_slot(&mut self, value: Value) -> Slot {
        match value {
            Value::Object(map) => {
                let fields = map
                    .into_iter()
                    .map(|(k, v)| (k, self.into_slot(v)))
                    .collect();
                Slot::Node(self.alloc(Container::Object(fields)))
            }
            Value::Array(items) => {
                let slots = items.into_iter().map(|v| self.into_slot(v)).collect();
                Slot::Node(self.alloc(Container::Array(slots)))
            }
            other => Slot::Leaf(other),
        }
    }

    fn release(&mut self, slot: Slot) {
        let Slot::Node(id) = slot else {
            return;
        };
        let Some(container) = self.arena.get_mut(id.0 as usize).and_then(Option::take) else {
            return;
        };
        self.free.push(id.0);
        let children: Vec<Slot> = match container {
            Container::Object(map) => map.into_values().collect(),
            Container::Array(items) => items,
        };
        for child in children {
            self.release(child);
        }
    }

    fn clone_slot(&mut self, slot: &Slot) -> Slot {
        let value = self.slot_value(slot);
        self.into_slot(value)
    }

    fn slot_value(&self, slot: &Slot) -> Value {
        match slot {
            Slot::Leaf(v) => v.clone(),
            Slot::Node(id) => self.snapshot(*id),
        }
    }

    fn child_slot<'a>(&'a self, slot: &'a Slot, key: &str) -> Option<&'a Slot> {
        let Slot::Node(id) = slot else {
            return None;
        };
        match self.container(*id)? {
            Container::Object(map) => map.get(key),
            Container::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        }
    }

    fn lookup(&self, path: &Path) -> Option<Slot> {
        let mut current = Slot::Node(self.root);
        for seg in path.segments() {
            current = self.child_slot(&current, seg)?.clone();
        }
        Some(current)
    }

    // === Reads ===

    /// Plain value of a container
    pub fn snapshot(&self, id: ContainerId) -> Value {
        match self.container(id) {
            Some(Container::Object(map)) => Value::Object(
                map.iter()
                    .map(|(k, s)| (k.clone(), self.slot_value(s)))
                    .collect(),
            ),
            Some(Container::Array(items)) => {
                Value::Array(items.iter().map(|s| self.slot_value(s)).collect())
            }
            None => Value::Undefined,
        }
    }

    /// Value at a path, `Undefined` when missing
    pub fn get(&self, path: &Path) -> Value {
        self.lookup(path)
            .map(|slot| self.slot_value(&slot))
            .unwrap_or_default()
    }

    /// Path exists and holds something other than `undefined`
    pub fn contains(&self, path: &Path) -> bool {
        !matches!(self.lookup(path), None | Some(Slot::Leaf(Value::Undefined)))
    }

    /// A slot exists at the path, even one holding `undefined`
    pub fn exists(&self, path: &Path) -> bool {
        self.lookup(path).is_some()
    }

    /// Length of the array at a path
    pub fn array_len(&self, path: &Path) -> Option<usize> {
        let Some(Slot::Node(id)) = self.lookup(path) else {
            return None;
        };
        match self.container(id)? {
            Container::Array(items) => Some(items.len()),
            Container::Object(_) => None,
        }
    }

    /// Container handle at a path; stable until the container is replaced
    pub fn handle(&self, path: &Path) -> Option<ContainerRef> {
        match self.lookup(path)? {
            Slot::Node(id) => Some(ContainerRef {
                id,
                path: path.clone(),
            }),
            Slot::Leaf(_) => None,
        }
    }

    /// Keys of the container at a path
    pub fn keys(&self, path: &Path) -> Vec<String> {
        let Some(Slot::Node(id)) = self.lookup(path) else {
            return Vec::new();
        };
        match self.container(id) {
            Some(Container::Object(map)) => map.keys().cloned().collect(),
            Some(Container::Array(items)) => (0..items.len()).map(|i| i.to_string()).collect(),
            None => Vec::new(),
        }
    }

    // === Writes ===

    /// Install `value` at `path` without marking anything dirty.
    ///
    /// Wrapping the value already stored there returns the existing handle.
    pub fn wrap(&mut self, value: Value, path: &Path) -> ReactiveResult<Wrapped> {
        if !value.is_container() {
            return Ok(Wrapped::Primitive(value));
        }
        if let Some(existing) = self.handle(path) {
            if self.snapshot(existing.id) == value {
                return Ok(Wrapped::Container(existing));
            }
        }
        self.replace_slot(path, value)?;
        self.handle(path)
            .map(Wrapped::Container)
            .ok_or_else(|| ReactiveError::NotAContainer(path.clone()))
    }

    /// Walk to the container holding the last segment of `path`
    fn parent_container(&mut self, path: &Path, create: bool) -> ReactiveResult<Option<ContainerId>> {
        let Some(parent_len) = path.len().checked_sub(1) else {
            return Err(ReactiveError::NotAContainer(path.clone()));
        };
        let mut current = self.root;
        for (depth, seg) in path.segments()[..parent_len].iter().enumerate() {
            let next = match self.container(current) {
                Some(Container::Object(map)) => map.get(seg).cloned(),
                Some(Container::Array(items)) => {
                    seg.parse::<usize>().ok().and_then(|i| items.get(i).cloned())
                }
                None => None,
            };
            current = match next {
                Some(Slot::Node(id)) => id,
                Some(Slot::Leaf(v)) if !v.is_nullish() => {
                    return Err(ReactiveError::NotAContainer(path.prefix(depth + 1)));
                }
                _ if !create => return Ok(None),
                _ => {
                    let id = self.alloc(Container::Object(BTreeMap::new()));
                    self.put(current, seg, Slot::Node(id));
                    id
                }
            };
        }
        Ok(Some(current))
    }

    fn put(&mut self, parent: ContainerId, key: &str, slot: Slot) -> Option<Slot> {
        match self.container_mut(parent)? {
            Container::Object(map) => map.insert(key.to_string(), slot),
            Container::Array(items) => {
                let i = key.parse::<usize>().ok()?;
                if i >= items.len() {
                    items.resize(i + 1, Slot::Leaf(Value::Undefined));
                }
                Some(std::mem::replace(&mut items[i], slot))
            }
        }
    }

    fn replace_slot(&mut self, path: &Path, value: Value) -> ReactiveResult<Option<Slot>> {
        let parent = self
            .parent_container(path, true)?
            .ok_or_else(|| ReactiveError::NotAContainer(path.clone()))?;
        let Some(key) = path.last() else {
            return Err(ReactiveError::NotAContainer(path.clone()));
        };
        let slot = self.into_slot(value);
        Ok(self.put(parent, key, slot))
    }

    /// Write a value at a path, recording dirty paths and requesting a flush
    pub fn write(&mut self, path: &Path, value: Value) -> ReactiveResult<()> {
        let mut nested = Vec::new();
        if let Some(old) = self.lookup(path) {
            self.collect_nested(&old, path, &mut nested);
        }
        collect_value_paths(&value, path, &mut nested);

        let marker = value.clone();
        if let Some(old) = self.replace_slot(path, value)? {
            self.release(old);
        }
        tracing::trace!("store write {}", path);
        self.record_write(path, &marker);
        for p in nested {
            self.dirty.insert(p);
        }
        Ok(())
    }

    /// Setter form: compute the new value from the previous one
    pub fn update(&mut self, path: &Path, f: impl FnOnce(Value) -> Value) -> ReactiveResult<()> {
        let next = f(self.get(path));
        self.write(path, next)
    }

    /// Remove a key, marking it dirty when it existed
    pub fn remove(&mut self, path: &Path) -> ReactiveResult<bool> {
        let Some(parent) = self.parent_container(path, false)? else {
            return Ok(false);
        };
        let Some(key) = path.last() else {
            return Ok(false);
        };
        let removed = match self.container_mut(parent) {
            Some(Container::Object(map)) => map.remove(key),
            Some(Container::Array(items)) => key
                .parse::<usize>()
                .ok()
                .filter(|i| *i < items.len())
                .map(|i| std::mem::replace(&mut items[i], Slot::Leaf(Value::Undefined))),
            None => None,
        };
        match removed {
            Some(slot) => {
                self.release(slot);
                self.mark_dirty(path.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Create missing containers along `path` and an `undefined` leaf at
    /// its end, never overwriting what exists. Nothing is marked dirty.
    pub fn materialize(&mut self, path: &Path) -> bool {
        if path.is_empty() || self.lookup(path).is_some() {
            return false;
        }
        let Ok(Some(parent)) = self.parent_container(path, true) else {
            return false;
        };
        let Some(key) = path.last() else {
            return false;
        };
        self.put(parent, key, Slot::Leaf(Value::Undefined));
        true
    }

    /// Apply a mutating array method as a single write
    pub fn mutate_array(&mut self, path: &Path, op: ArrayOp) -> ReactiveResult<Value> {
        let id = match self.lookup(path) {
            Some(Slot::Node(id)) if matches!(self.container(id), Some(Container::Array(_))) => id,
            _ => return Err(ReactiveError::NotAContainer(path.clone())),
        };
        let Some(Container::Array(mut items)) = self.arena[id.0 as usize].take() else {
            return Err(ReactiveError::NotAContainer(path.clone()));
        };
        let result = self.apply_array_op(&mut items, op);
        self.arena[id.0 as usize] = Some(Container::Array(items));

        tracing::trace!("array mutation at {}", path);
        self.dirty.insert(path.clone());
        self.dirty.insert(path.child(WILDCARD));
        self.schedule();
        Ok(result)
    }

    fn apply_array_op(&mut self, items: &mut Vec<Slot>, op: ArrayOp) -> Value {
        match op {
            ArrayOp::Push(values) => {
                for v in values {
                    let slot = self.into_slot(v);
                    items.push(slot);
                }
                Value::Number(items.len() as f64)
            }
            ArrayOp::Unshift(values) => {
                let slots: Vec<Slot> = values.into_iter().map(|v| self.into_slot(v)).collect();
                items.splice(0..0, slots);
                Value::Number(items.len() as f64)
            }
            ArrayOp::Pop => self.take_value(items.pop()),
            ArrayOp::Shift => {
                let first = (!items.is_empty()).then(|| items.remove(0));
                self.take_value(first)
            }
            ArrayOp::Splice {
                start,
                delete,
                items: inserted,
            } => {
                let start = relative_index(start, items.len());
                let count = delete
                    .unwrap_or(items.len() - start)
                    .min(items.len() - start);
                let slots: Vec<Slot> = inserted.into_iter().map(|v| self.into_slot(v)).collect();
                let removed: Vec<Slot> = items.splice(start..start + count, slots).collect();
                let values = removed
                    .into_iter()
                    .map(|s| self.take_value(Some(s)))
                    .collect();
                Value::Array(values)
            }
            ArrayOp::Sort(comparator) => {
                let mut keyed: Vec<(Value, Slot)> = items
                    .drain(..)
                    .map(|s| (self.slot_value(&s), s))
                    .collect();
                match comparator {
                    Some(mut cmp) => keyed.sort_by(|a, b| cmp(&a.0, &b.0)),
                    None => keyed.sort_by(|a, b| default_order(&a.0, &b.0)),
                }
                items.extend(keyed.into_iter().map(|(_, s)| s));
                self.slots_value(items)
            }
            ArrayOp::Reverse => {
                items.reverse();
                self.slots_value(items)
            }
            ArrayOp::Fill { value, start, end } => {
                let len = items.len();
                let from = relative_index(start, len);
                let to = end.map_or(len, |e| relative_index(e, len));
                for i in from..to.max(from) {
                    let slot = self.into_slot(value.clone());
                    let old = std::mem::replace(&mut items[i], slot);
                    self.release(old);
                }
                self.slots_value(items)
            }
            ArrayOp::CopyWithin { target, start, end } => {
                let len = items.len();
                let target = relative_index(target, len);
                let from = relative_index(start, len);
                let to = end.map_or(len, |e| relative_index(e, len));
                let count = to.saturating_sub(from).min(len - target);
                let copies: Vec<Slot> = items[from..from + count]
                    .to_vec()
                    .iter()
                    .map(|s| self.clone_slot(s))
                    .collect();
                for (offset, slot) in copies.into_iter().enumerate() {
                    let old = std::mem::replace(&mut items[target + offset], slot);
                    self.release(old);
                }
                self.slots_value(items)
            }
        }
    }

    fn take_value(&mut self, slot: Option<Slot>) -> Value {
        let Some(slot) = slot else {
            return Value::Undefined;
        };
        let value = self.slot_value(&slot);
        self.release(slot);
        value
    }

    fn slots_value(&self, items: &[Slot]) -> Value {
        Value::Array(items.iter().map(|s| self.slot_value(s)).collect())
    }

    fn collect_nested(&self, slot: &Slot, base: &Path, out: &mut Vec<Path>) {
        let Slot::Node(id) = slot else {
            return;
        };
        let children: Vec<(String, Slot)> = match self.container(*id) {
            Some(Container::Object(map)) => {
                map.iter().map(|(k, s)| (k.clone(), s.clone())).collect()
            }
            Some(Container::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, s)| (i.to_string(), s.clone()))
                .collect(),
            None => return,
        };
        for (key, child) in children {
            let p = base.child(key);
            self.collect_nested(&child, &p, out);
            out.push(p);
        }
    }

    // === Dirty tracking ===

    fn record_write(&mut self, path: &Path, value: &Value) {
        self.dirty.insert(path.clone());
        let segs = path.segments();
        if path.ends_with_index() {
            if let Some(array) = path.parent() {
                let wildcard = array.child(WILDCARD);
                if let Value::Object(fields) = value {
                    for field in fields.keys() {
                        self.dirty.insert(wildcard.child(field.as_str()));
                    }
                }
                self.dirty.insert(wildcard);
            }
        } else if segs.len() >= 3 && crate::path::is_index(&segs[segs.len() - 2]) {
            let array = path.prefix(segs.len() - 2);
            self.dirty
                .insert(array.child(WILDCARD).child(segs[segs.len() - 1].as_str()));
        }
        self.schedule();
    }

    /// Record a path as changed without writing
    pub fn mark_dirty(&mut self, path: Path) {
        self.dirty.insert(path);
        self.schedule();
    }

    fn schedule(&mut self) {
        if !self.flush_requested {
            self.flush_requested = true;
            self.flush_requests += 1;
        }
    }

    /// A flush has been requested since the last `take_dirty`
    pub fn is_flush_requested(&self) -> bool {
        self.flush_requested
    }

    /// Number of flush requests made over the store's lifetime
    pub fn flush_requests(&self) -> u64 {
        self.flush_requests
    }

    pub fn dirty(&self) -> &BTreeSet<Path> {
        &self.dirty
    }

    /// Drain the dirty set and clear the pending flush request
    pub fn take_dirty(&mut self) -> BTreeSet<Path> {
        self.flush_requested = false;
        std::mem::take(&mut self.dirty)
    }
}

fn collect_value_paths(value: &Value, base: &Path, out: &mut Vec<Path>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let p = base.child(k.as_str());
                collect_value_paths(v, &p, out);
                out.push(p);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                let p = base.child(i.to_string());
                collect_value_paths(v, &p, out);
                out.push(p);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(text: &str) -> Value {
        Value::from_json_str(text).unwrap()
    }

    fn p(s: &str) -> Path {
        Path::parse(s)
    }

    fn dirty(store: &Store) -> Vec<String> {
        store.dirty().iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_wrap_round_trip() {
        let mut store = Store::new();
        let original = json(r#"{"user": {"name": "ada", "tags": ["a", "b"]}}"#);
        let Wrapped::Container(handle) = store.wrap(original.clone(), &p("app.data")).unwrap()
        else {
            panic!("object should be wrapped");
        };
        assert_eq!(store.snapshot(handle.id), original);
        assert_eq!(store.get(&p("app.data.user.tags.1")), Value::from("b"));
        assert!(store.dirty().is_empty());
    }

    #[test]
    fn test_primitives_not_wrapped() {
        let mut store = Store::new();
        assert_eq!(
            store.wrap(Value::from(3.0), &p("app.n")).unwrap(),
            Wrapped::Primitive(Value::from(3.0))
        );
    }

    #[test]
    fn test_repeated_wrap_same_identity() {
        let mut store = Store::new();
        let v = json(r#"{"a": {"b": 1}}"#);
        let first = store.wrap(v.clone(), &p("app.x")).unwrap();
        let second = store.wrap(v, &p("app.x")).unwrap();
        assert_eq!(first, second);

        let nested = store.handle(&p("app.x.a")).unwrap();
        store.write(&p("app.y"), Value::from(1.0)).unwrap();
        assert_eq!(store.handle(&p("app.x.a")).unwrap(), nested);
    }

    #[test]
    fn test_write_records_path_and_requests_flush() {
        let mut store = Store::new();
        store.write(&p("app.count"), Value::from(1.0)).unwrap();
        store.write(&p("app.count"), Value::from(2.0)).unwrap();
        assert_eq!(dirty(&store), vec!["app.count"]);
        assert_eq!(store.flush_requests(), 1);
        assert!(store.is_flush_requested());

        let drained = store.take_dirty();
        assert_eq!(drained.len(), 1);
        assert!(!store.is_flush_requested());
    }

    #[test]
    fn test_index_write_adds_wildcards() {
        let mut store = Store::new();
        store
            .wrap(json(r#"[{"id": 1, "done": false}]"#), &p("app.todos"))
            .unwrap();
        store
            .write(&p("app.todos.0"), json(r#"{"id": 1, "done": true}"#))
            .unwrap();
        let d = dirty(&store);
        assert!(d.contains(&"app.todos.0".to_string()));
        assert!(d.contains(&"app.todos.*".to_string()));
        assert!(d.contains(&"app.todos.*.done".to_string()));
        assert!(d.contains(&"app.todos.*.id".to_string()));
    }

    #[test]
    fn test_item_field_write_adds_field_wildcard() {
        let mut store = Store::new();
        store
            .wrap(json(r#"[{"done": false}]"#), &p("app.todos"))
            .unwrap();
        store.write(&p("app.todos.0.done"), Value::Bool(true)).unwrap();
        assert!(dirty(&store).contains(&"app.todos.*.done".to_string()));
    }

    #[test]
    fn test_object_write_marks_nested_paths() {
        let mut store = Store::new();
        store
            .wrap(json(r#"{"name": "a", "age": 1}"#), &p("app.user"))
            .unwrap();
        store.write(&p("app.user"), Value::Null).unwrap();
        let d = dirty(&store);
        assert!(d.contains(&"app.user.name".to_string()));
        assert!(d.contains(&"app.user.age".to_string()));
    }

    #[test]
    fn test_write_creates_intermediate_objects() {
        let mut store = Store::new();
        store.write(&p("app.a.b.c"), Value::from(1.0)).unwrap();
        assert_eq!(store.get(&p("app.a")), json(r#"{"b": {"c": 1}}"#));
    }

    #[test]
    fn test_write_below_primitive_fails() {
        let mut store = Store::new();
        store.write(&p("app.n"), Value::from(1.0)).unwrap();
        assert!(matches!(
            store.write(&p("app.n.x"), Value::from(1.0)),
            Err(ReactiveError::NotAContainer(_))
        ));
    }

    #[test]
    fn test_array_mutators_single_write() {
        let mut store = Store::new();
        store.wrap(json("[3, 1, 2]"), &p("app.list")).unwrap();

        let len = store
            .mutate_array(&p("app.list"), ArrayOp::Push(vec![Value::from(4.0)]))
            .unwrap();
        assert_eq!(len, Value::from(4.0));
        assert_eq!(dirty(&store), vec!["app.list", "app.list.*"]);

        store.mutate_array(&p("app.list"), ArrayOp::Sort(None)).unwrap();
        assert_eq!(store.get(&p("app.list")), json("[1, 2, 3, 4]"));

        let removed = store
            .mutate_array(
                &p("app.list"),
                ArrayOp::Splice {
                    start: 1,
                    delete: Some(2),
                    items: vec![Value::from(9.0)],
                },
            )
            .unwrap();
        assert_eq!(removed, json("[2, 3]"));
        assert_eq!(store.get(&p("app.list")), json("[1, 9, 4]"));

        assert_eq!(
            store.mutate_array(&p("app.list"), ArrayOp::Shift).unwrap(),
            Value::from(1.0)
        );
        store.mutate_array(&p("app.list"), ArrayOp::Reverse).unwrap();
        assert_eq!(store.get(&p("app.list")), json("[4, 9]"));
    }

    #[test]
    fn test_sort_keeps_item_identity() {
        let mut store = Store::new();
        store
            .wrap(json(r#"[{"n": 2}, {"n": 1}]"#), &p("app.items"))
            .unwrap();
        let second = store.handle(&p("app.items.1")).unwrap();
        store
            .mutate_array(
                &p("app.items"),
                ArrayOp::Sort(Some(Box::new(|a: &Value, b: &Value| {
                    a.get("n").to_number().total_cmp(&b.get("n").to_number())
                }))),
            )
            .unwrap();
        assert_eq!(store.handle(&p("app.items.0")).unwrap().id, second.id);
    }

    #[test]
    fn test_fill_and_copy_within() {
        let mut store = Store::new();
        store.wrap(json("[1, 2, 3, 4]"), &p("app.a")).unwrap();
        store
            .mutate_array(
                &p("app.a"),
                ArrayOp::Fill {
                    value: Value::from(0.0),
                    start: -2,
                    end: None,
                },
            )
            .unwrap();
        assert_eq!(store.get(&p("app.a")), json("[1, 2, 0, 0]"));
        store
            .mutate_array(
                &p("app.a"),
                ArrayOp::CopyWithin {
                    target: 2,
                    start: 0,
                    end: Some(2),
                },
            )
            .unwrap();
        assert_eq!(store.get(&p("app.a")), json("[1, 2, 1, 2]"));
    }

    #[test]
    fn test_mutate_non_array_fails() {
        let mut store = Store::new();
        assert!(store.mutate_array(&p("app.none"), ArrayOp::Pop).is_err());
    }

    #[test]
    fn test_materialize_never_overwrites() {
        let mut store = Store::new();
        store.write(&p("app.user.name"), Value::from("a")).unwrap();
        store.take_dirty();

        assert!(!store.materialize(&p("app.user.name")));
        assert!(store.materialize(&p("app.user.email")));
        assert!(store.materialize(&p("app.settings.theme")));
        assert_eq!(store.get(&p("app.user.name")), Value::from("a"));
        assert!(store.dirty().is_empty());
        assert!(!store.contains(&p("app.settings.theme")));
        assert!(store.handle(&p("app.settings")).is_some());
    }

    #[test]
    fn test_released_slots_are_reused() {
        let mut store = Store::new();
        store.write(&p("app.a"), json(r#"{"x": {"y": 1}}"#)).unwrap();
        store.write(&p("app.a"), json(r#"{"x": {"y": 2}}"#)).unwrap();
        let before = store.arena.len();
        store.write(&p("app.a"), json(r#"{"x": {"y": 3}}"#)).unwrap();
        assert_eq!(store.arena.len(), before);
    }
}

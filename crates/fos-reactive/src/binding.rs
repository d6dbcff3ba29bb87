//! Binding table
//!
//! Live associations between dependency patterns and an update action.
//! The action type is left to the caller (the hydration layer stores its
//! DOM updaters here).

use std::collections::{BTreeMap, BTreeSet};

use crate::pattern::{MatchRule, dependency_matches};
use crate::Path;

/// Binding identifier, increasing in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u32);

impl BindingId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// What a binding drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Text,
    Attribute,
    Loop,
    Conditional,
    Effect,
}

impl BindingKind {
    pub fn rule(self) -> MatchRule {
        match self {
            BindingKind::Loop => MatchRule::Loop,
            BindingKind::Effect => MatchRule::Effect,
            BindingKind::Text | BindingKind::Attribute | BindingKind::Conditional => {
                MatchRule::Binding
            }
        }
    }
}

#[derive(Debug)]
pub struct BindingRecord<U> {
    pub deps: BTreeSet<Path>,
    pub kind: BindingKind,
    pub update: U,
}

impl<U> BindingRecord<U> {
    /// Some dirty path matches some dependency under this kind's rule
    pub fn is_due(&self, dirty: &BTreeSet<Path>) -> bool {
        let rule = self.kind.rule();
        self.deps
            .iter()
            .any(|pattern| dirty.iter().any(|changed| dependency_matches(changed, pattern, rule)))
    }
}

/// Registered bindings
#[derive(Debug)]
pub struct BindingTable<U> {
    records: BTreeMap<BindingId, BindingRecord<U>>,
    next_id: u32,
}

impl<U> Default for BindingTable<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> BindingTable<U> {
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn register(&mut self, kind: BindingKind, deps: BTreeSet<Path>, update: U) -> BindingId {
        let id = BindingId(self.next_id);
        self.next_id += 1;
        tracing::trace!("binding {:?} registered with {} deps", kind, deps.len());
        self.records.insert(id, BindingRecord { deps, kind, update });
        id
    }

    pub fn remove(&mut self, id: BindingId) -> Option<BindingRecord<U>> {
        self.records.remove(&id)
    }

    /// Remove every binding whose update satisfies `pred`
    pub fn remove_where(&mut self, mut pred: impl FnMut(&U) -> bool) -> Vec<BindingId> {
        let doomed: Vec<BindingId> = self
            .records
            .iter()
            .filter(|(_, rec)| pred(&rec.update))
            .map(|(id, _)| *id)
            .collect();
        for id in &doomed {
            self.records.remove(id);
        }
        doomed
    }

    pub fn get(&self, id: BindingId) -> Option<&BindingRecord<U>> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: BindingId) -> Option<&mut BindingRecord<U>> {
        self.records.get_mut(&id)
    }

    pub fn contains(&self, id: BindingId) -> bool {
        self.records.contains_key(&id)
    }

    /// Registration order
    pub fn iter(&self) -> impl Iterator<Item = (BindingId, &BindingRecord<U>)> {
        self.records.iter().map(|(id, rec)| (*id, rec))
    }

    pub fn ids(&self) -> Vec<BindingId> {
        self.records.keys().copied().collect()
    }

    /// Bindings the dirty set re-triggers, in registration order
    pub fn due(&self, dirty: &BTreeSet<Path>) -> Vec<BindingId> {
        if dirty.is_empty() {
            return Vec::new();
        }
        self.records
            .iter()
            .filter(|(_, rec)| rec.is_due(dirty))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(paths: &[&str]) -> BTreeSet<Path> {
        paths.iter().map(|p| Path::parse(p)).collect()
    }

    #[test]
    fn test_due_uses_kind_rule() {
        let mut table = BindingTable::new();
        let text = table.register(BindingKind::Text, deps(&["app.user"]), "text");
        let list = table.register(BindingKind::Loop, deps(&["app.todos"]), "loop");
        let fx = table.register(BindingKind::Effect, deps(&["app.user"]), "effect");

        let dirty = deps(&["app.user.address.city"]);
        assert_eq!(table.due(&dirty), vec![text]);

        let dirty = deps(&["app.todos.4.title.text"]);
        assert_eq!(table.due(&dirty), vec![list]);

        let dirty = deps(&["app.user.name"]);
        assert_eq!(table.due(&dirty), vec![text, fx]);
    }

    #[test]
    fn test_multiple_matching_deps_due_once() {
        let mut table = BindingTable::new();
        let id = table.register(BindingKind::Text, deps(&["app.a", "app.b"]), ());
        assert_eq!(table.due(&deps(&["app.a", "app.b"])), vec![id]);
        assert!(table.due(&BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_remove_where() {
        let mut table = BindingTable::new();
        table.register(BindingKind::Text, deps(&["app.a"]), 1u32);
        let keep = table.register(BindingKind::Text, deps(&["app.a"]), 2u32);
        table.register(BindingKind::Attribute, deps(&["app.a"]), 1u32);
        assert_eq!(table.remove_where(|owner| *owner == 1).len(), 2);
        assert_eq!(table.ids(), vec![keep]);
    }
}

//! Keyed list diffing

use std::collections::{HashMap, HashSet};
use std::fmt;

use fos_reactive::{Value, format_number};

/// Stable identity of a rendered list item
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemKey {
    Field(String),
    Index(usize),
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKey::Field(k) => write!(f, "{k}"),
            ItemKey::Index(i) => write!(f, "#{i}"),
        }
    }
}

fn scalar_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(format_number(*n)),
        _ => None,
    }
}

/// `id`, `key`, `_id`, then any id-looking field
fn identity(item: &Value) -> Option<String> {
    let fields = item.as_object()?;
    ["id", "key", "_id"]
        .iter()
        .find_map(|name| fields.get(*name).and_then(scalar_key))
        .or_else(|| {
            fields.iter().find_map(|(name, value)| {
                let lower = name.to_ascii_lowercase();
                if lower.contains("id") || lower.contains("uuid") {
                    scalar_key(value)
                } else {
                    None
                }
            })
        })
}

/// Key per item; items without identity, or repeating one, fall back to
/// their position
pub fn item_keys(items: &[Value]) -> Vec<ItemKey> {
    let mut seen = HashSet::new();
    items
        .iter()
        .enumerate()
        .map(|(index, item)| match identity(item) {
            Some(key) if seen.insert(key.clone()) => ItemKey::Field(key),
            Some(key) => {
                tracing::warn!("duplicate list key {:?}, using position {}", key, index);
                ItemKey::Index(index)
            }
            None => ItemKey::Index(index),
        })
        .collect()
}

/// Classification of a new key list against the previous one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyDiff {
    /// Keys gone from the new list, in previous order
    pub delete: Vec<ItemKey>,
    /// New keys with their target index, ascending
    pub insert: Vec<(usize, ItemKey)>,
    /// Kept keys whose position changed
    pub update: Vec<(usize, ItemKey)>,
    /// Kept keys at the same position
    pub keep: Vec<(usize, ItemKey)>,
}

impl KeyDiff {
    pub fn is_noop(&self) -> bool {
        self.delete.is_empty() && self.insert.is_empty() && self.update.is_empty()
    }
}

pub fn diff_keys(previous: &[ItemKey], next: &[ItemKey]) -> KeyDiff {
    let old_pos: HashMap<&ItemKey, usize> =
        previous.iter().enumerate().map(|(i, k)| (k, i)).collect();
    let new_keys: HashSet<&ItemKey> = next.iter().collect();

    let mut diff = KeyDiff {
        delete: previous
            .iter()
            .filter(|k| !new_keys.contains(k))
            .cloned()
            .collect(),
        ..KeyDiff::default()
    };
    for (index, key) in next.iter().enumerate() {
        match old_pos.get(key) {
            None => diff.insert.push((index, key.clone())),
            Some(&old) if old != index => diff.update.push((index, key.clone())),
            Some(_) => diff.keep.push((index, key.clone())),
        }
    }
    diff
}

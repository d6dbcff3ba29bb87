//! Dependency pattern matching
//!
//! Decides whether a dirty path should re-trigger a binding, using a
//! different rule per binding kind.

use crate::expr::is_array_intrinsic;
use crate::path::{WILDCARD, is_index};
use crate::Path;

/// Matching rule selected by binding kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchRule {
    /// Exact path or a direct child
    Effect,
    /// Ancestor or descendant at any depth
    Loop,
    /// Exact path or up to two segments deeper
    Binding,
}

/// Segment equality; a wildcard on either side matches one index segment
fn segment_generalized(changed: &str, pattern: &str) -> bool {
    changed == pattern
        || (changed == WILDCARD && (pattern == WILDCARD || is_index(pattern)))
        || (pattern == WILDCARD && is_index(changed))
}

fn prefix_matches(changed: &[String], pattern: &[String], n: usize) -> bool {
    changed
        .iter()
        .zip(pattern)
        .take(n)
        .all(|(c, p)| segment_generalized(c, p))
}

/// Does `changed` re-trigger `pattern` under `rule`?
pub fn dependency_matches(changed: &Path, pattern: &Path, rule: MatchRule) -> bool {
    if changed == pattern {
        return true;
    }
    let c = changed.segments();
    let p = pattern.segments();

    // `todos.length` / `todos.filter` follow the owning array
    if let Some(last) = p.last() {
        if p.len() > 1 && is_array_intrinsic(last) {
            let array = &p[..p.len() - 1];
            let n = c.len().min(array.len());
            return prefix_matches(c, array, n);
        }
    }

    match rule {
        MatchRule::Effect => {
            (c.len() == p.len() || c.len() == p.len() + 1) && prefix_matches(c, p, p.len())
        }
        MatchRule::Loop => {
            let n = c.len().min(p.len());
            prefix_matches(c, p, n)
        }
        MatchRule::Binding => {
            c.len() >= p.len() && c.len() <= p.len() + 2 && prefix_matches(c, p, p.len())
        }
    }
}

/// Any dirty path matches any of the patterns
pub fn any_matches<'a>(
    dirty: impl IntoIterator<Item = &'a Path> + Clone,
    patterns: impl IntoIterator<Item = &'a Path>,
    rule: MatchRule,
) -> bool {
    patterns.into_iter().any(|pattern| {
        dirty
            .clone()
            .into_iter()
            .any(|changed| dependency_matches(changed, pattern, rule))
    })
}

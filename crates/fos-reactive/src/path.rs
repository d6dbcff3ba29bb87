//! Typed state paths
//!
//! A [`Path`] is an ordered list of segments (`app.todos.3.title`). Numeric
//! segments address array items and `*` is the wildcard used in dirty-path
//! patterns. A [`Hierarchy`] is the component chain that prefixes every
//! scoped key.

use std::fmt;

/// Wildcard segment
pub const WILDCARD: &str = "*";

/// Implicit root component
pub const ROOT_COMPONENT: &str = "app";

/// Check whether a segment addresses an array index
pub fn is_index(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Ordered list of path segments
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(Vec<String>);

impl Path {
    /// Empty path
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a dotted path, empty segments are dropped
    pub fn parse(dotted: &str) -> Self {
        Self(
            dotted
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Path extended by one segment
    pub fn child(&self, segment: impl Into<String>) -> Path {
        let mut out = self.0.clone();
        out.push(segment.into());
        Path(out)
    }

    /// Path extended by every segment of `tail`
    pub fn join(&self, tail: &[String]) -> Path {
        let mut out = self.0.clone();
        out.extend(tail.iter().cloned());
        Path(out)
    }

    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            return None;
        }
        Some(Path(self.0[..self.0.len() - 1].to_vec()))
    }

    /// First `n` segments
    pub fn prefix(&self, n: usize) -> Path {
        Path(self.0[..n.min(self.0.len())].to_vec())
    }

    /// Segment-wise prefix test
    pub fn starts_with(&self, head: &Path) -> bool {
        self.0.starts_with(&head.0)
    }

    /// Segments after `head`, if `head` is a prefix
    pub fn strip_prefix(&self, head: &Path) -> Option<&[String]> {
        self.0.strip_prefix(head.0.as_slice())
    }

    /// Last segment is an array index
    pub fn ends_with_index(&self) -> bool {
        self.last().is_some_and(is_index)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl From<&str> for Path {
    fn from(dotted: &str) -> Self {
        Path::parse(dotted)
    }
}

/// Component chain from root to the owning component
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hierarchy(Vec<String>);

impl Default for Hierarchy {
    fn default() -> Self {
        Self::root()
    }
}

impl Hierarchy {
    /// The implicit root component
    pub fn root() -> Self {
        Self(vec![ROOT_COMPONENT.to_string()])
    }

    pub fn from_components<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Self::root();
        }
        Self(ids)
    }

    /// Nested component below this one
    pub fn child(&self, component: &str) -> Hierarchy {
        let mut out = self.0.clone();
        out.push(component.to_string());
        Hierarchy(out)
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Enclosing hierarchy, `None` at the root
    pub fn parent(&self) -> Option<Hierarchy> {
        (self.0.len() > 1).then(|| Hierarchy(self.0[..self.0.len() - 1].to_vec()))
    }

    /// This hierarchy followed by each enclosing one, innermost first
    pub fn levels(&self) -> impl Iterator<Item = Hierarchy> + '_ {
        (1..=self.0.len())
            .rev()
            .map(|n| Hierarchy(self.0[..n].to_vec()))
    }

    /// The hierarchy as a path prefix
    pub fn as_path(&self) -> Path {
        Path(self.0.clone())
    }

    /// Scoped key for a name path declared at this level
    pub fn scoped(&self, name: &[String]) -> Path {
        self.as_path().join(name)
    }

    /// Scoped key of a single name
    pub fn key(&self, name: &str) -> Path {
        self.as_path().child(name)
    }
}

impl fmt::Display for Hierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let p = Path::parse("app.todos.3.title");
        assert_eq!(p.len(), 4);
        assert_eq!(p.to_string(), "app.todos.3.title");
        assert_eq!(Path::parse("a..b").len(), 2);
    }

    #[test]
    fn test_prefix_helpers() {
        let p = Path::parse("app.todos.3");
        assert!(p.ends_with_index());
        assert!(p.starts_with(&Path::parse("app.todos")));
        assert!(!p.starts_with(&Path::parse("app.todo")));
        assert_eq!(
            p.strip_prefix(&Path::parse("app")).map(|s| s.len()),
            Some(2)
        );
        assert_eq!(p.parent(), Some(Path::parse("app.todos")));
    }

    #[test]
    fn test_hierarchy_levels_innermost_first() {
        let h = Hierarchy::root().child("Page").child("Card");
        let levels: Vec<String> = h.levels().map(|l| l.to_string()).collect();
        assert_eq!(levels, vec!["app.Page.Card", "app.Page", "app"]);
        assert_eq!(h.key("count").to_string(), "app.Page.Card.count");
    }

    #[test]
    fn test_empty_hierarchy_is_root() {
        let h = Hierarchy::from_components(Vec::<String>::new());
        assert_eq!(h, Hierarchy::root());
        assert_eq!(h.parent(), None);
    }
}

//! `{{ expr }}` templates in text and attribute values

use std::collections::BTreeSet;

use fos_reactive::expr::Expression;
use fos_reactive::{Path, Reactive, Scope};

/// Piece of a template
#[derive(Debug, Clone)]
pub enum Segment {
    Text(String),
    Expr(Expression),
}

/// Compiled mustache template
#[derive(Debug, Clone)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Compile `text`; `None` when it has no expression tokens. Tokens that
    /// do not parse stay literal, plain assignments render nothing.
    pub fn parse(text: &str) -> Option<Self> {
        if !text.contains("{{") {
            return None;
        }
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = text;
        while let Some(open) = rest.find("{{") {
            let Some(close) = rest[open + 2..].find("}}") else {
                break;
            };
            literal.push_str(&rest[..open]);
            let token = &rest[open..open + 2 + close + 2];
            let source = rest[open + 2..open + 2 + close].trim();
            rest = &rest[open + 2 + close + 2..];

            match Expression::parse(source) {
                Ok(expr) if expr.is_assignment() => {
                    tracing::warn!("skipping assignment in template: {}", source);
                }
                Ok(expr) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Expr(expr));
                }
                Err(err) => {
                    tracing::warn!("template token {:?} left as text: {}", token, err);
                    literal.push_str(token);
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Text(literal));
        }
        if !segments.iter().any(|s| matches!(s, Segment::Expr(_))) {
            return None;
        }
        Some(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn expressions(&self) -> impl Iterator<Item = &Expression> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Expr(e) => Some(e),
            Segment::Text(_) => None,
        })
    }

    /// Sole expression of a template like `{{ x }}`
    pub fn single(&self) -> Option<&Expression> {
        match self.segments.as_slice() {
            [Segment::Expr(e)] => Some(e),
            _ => None,
        }
    }

    /// Render every token; failing tokens render empty
    pub fn render(&self, reactive: &mut Reactive, scope: &Scope) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => out.push_str(t),
                Segment::Expr(expr) => match reactive.eval(expr, scope) {
                    Ok(value) => out.push_str(&value.to_text()),
                    Err(err) => tracing::warn!("{{{{ {} }}}}: {}", expr.source(), err),
                },
            }
        }
        out
    }

    /// Union of the scoped dependencies of every token
    pub fn dependencies(&self, reactive: &Reactive, scope: &Scope) -> BTreeSet<Path> {
        self.expressions()
            .flat_map(|e| reactive.dependencies(e, scope))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fos_reactive::{Hierarchy, Value};

    #[test]
    fn test_parse_segments() {
        let t = Template::parse("Hello {{ name }}, you have {{ count + 1 }} items").unwrap();
        assert_eq!(t.segments().len(), 5);
        assert_eq!(t.expressions().count(), 2);
        assert!(Template::parse("plain text").is_none());
        assert!(Template::parse("{{ x }}").unwrap().single().is_some());
    }

    #[test]
    fn test_bad_token_stays_literal() {
        assert!(Template::parse("{{ a + }}").is_none());
        let t = Template::parse("{{ a + }} and {{ b }}").unwrap();
        match &t.segments()[0] {
            Segment::Text(text) => assert_eq!(text, "{{ a + }} and "),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_assignment_renders_nothing() {
        let mut rx = Reactive::new();
        rx.state(&Hierarchy::root(), "count", Value::from(1.0)).unwrap();
        let t = Template::parse("[{{ count = 5 }}] {{ count }}").unwrap();
        let scope = Scope::new(Hierarchy::root());
        assert_eq!(t.render(&mut rx, &scope), "[] 1");
    }

    #[test]
    fn test_render_and_dependencies() {
        let mut rx = Reactive::new();
        let h = Hierarchy::root();
        rx.state(&h, "user", Value::object([("name", Value::from("Ada"))]))
            .unwrap();
        let t = Template::parse("Hi {{ user.name }}{{ missing }}!").unwrap();
        let scope = Scope::new(h);
        assert_eq!(t.render(&mut rx, &scope), "Hi Ada!");
        let deps = t.dependencies(&rx, &scope);
        assert!(deps.contains(&Path::parse("app.user.name")));
        assert!(deps.contains(&Path::parse("app.missing")));
    }
}

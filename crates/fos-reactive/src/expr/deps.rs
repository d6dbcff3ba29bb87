//! Dependency extraction
//!
//! Collects the member chains of free identifiers an expression reads
//! (`user.name`, `todos.filter`) and maps each to the scoped key it
//! denotes, walking the hierarchy the same way name resolution does.

use std::collections::{BTreeSet, HashSet};

use super::ast::{AstId, AstKind, Literal};
use super::interp::CALLBACK_FN;
use super::intrinsics::is_array_intrinsic;
use super::{Closure, Expression, Program};
use crate::scope::{Local, is_declared, setter_state_name};
use crate::value::format_number;
use crate::{Environment, Function, Path, Scope, Store, Value};

/// Roots that never denote state
const IGNORED_ROOTS: &[&str] = &[
    "event", "this", "window", "document", "console", "Math", "JSON", "Date", "Number", "String",
    "Boolean", "Object", "Array", "NaN", "Infinity", "parseInt", "parseFloat", "isNaN", "state",
    "share", "effect", CALLBACK_FN,
];

pub fn is_ignored_root(name: &str) -> bool {
    IGNORED_ROOTS.contains(&name)
}

struct Walker<'p> {
    program: &'p Program,
    bound: Vec<String>,
    out: Vec<Vec<String>>,
}

impl Walker<'_> {
    fn record(&mut self, chain: Vec<String>) {
        let Some(root) = chain.first() else {
            return;
        };
        if self.bound.iter().any(|b| b == root) || is_ignored_root(root) {
            return;
        }
        if !self.out.contains(&chain) {
            self.out.push(chain);
        }
    }

    /// Static member chain rooted at an identifier. `stopped` is set once
    /// a computed index ends the chain; `computed` collects index nodes
    /// still to be visited.
    fn chain(&self, id: AstId, computed: &mut Vec<AstId>, stopped: &mut bool) -> Option<Vec<String>> {
        match self.program.ast().kind(id) {
            AstKind::Ident { name } => Some(vec![name.to_string()]),
            AstKind::Member {
                object, property, ..
            } => {
                let mut chain = self.chain(*object, computed, stopped)?;
                if !*stopped {
                    chain.push(property.to_string());
                }
                Some(chain)
            }
            AstKind::Index { object, index, .. } => {
                let mut chain = self.chain(*object, computed, stopped)?;
                if *stopped {
                    computed.push(*index);
                    return Some(chain);
                }
                match self.program.ast().kind(*index) {
                    AstKind::Literal {
                        value: Literal::String(s),
                    } => chain.push(s.to_string()),
                    AstKind::Literal {
                        value: Literal::Number(n),
                    } => chain.push(format_number(*n)),
                    _ => {
                        computed.push(*index);
                        *stopped = true;
                    }
                }
                Some(chain)
            }
            _ => None,
        }
    }

    fn visit(&mut self, id: AstId) {
        let program = self.program;
        match program.ast().kind(id) {
            AstKind::Ident { name } => self.record(vec![name.to_string()]),
            AstKind::Member { object, .. } | AstKind::Index { object, .. } => {
                let mut computed = Vec::new();
                let mut stopped = false;
                match self.chain(id, &mut computed, &mut stopped) {
                    Some(chain) => {
                        self.record(chain);
                        for index in computed {
                            self.visit(index);
                        }
                    }
                    None => {
                        self.visit(*object);
                        if let AstKind::Index { index, .. } = program.ast().kind(id) {
                            self.visit(*index);
                        }
                    }
                }
            }
            AstKind::Arrow { params, body, .. } => {
                let mark = self.bound.len();
                self.bound.extend(params.iter().map(|p| p.to_string()));
                self.visit(*body);
                self.bound.truncate(mark);
            }
            AstKind::FunctionDecl { name, params, body } => {
                self.bound.push(name.to_string());
                let mark = self.bound.len();
                self.bound.extend(params.iter().map(|p| p.to_string()));
                self.visit(*body);
                self.bound.truncate(mark);
            }
            AstKind::VarDecl { target, init, .. } => {
                if let Some(init) = init {
                    self.visit(*init);
                }
                self.bound
                    .extend(target.names().into_iter().map(str::to_string));
            }
            AstKind::Object { props } => {
                for (_, value) in props {
                    self.visit(*value);
                }
            }
            AstKind::Literal { .. } | AstKind::Empty => {}
            AstKind::Program { body } | AstKind::Block { body } => {
                for &stmt in body {
                    self.visit(stmt);
                }
            }
            AstKind::Template { exprs, .. } => {
                for &e in exprs {
                    self.visit(e);
                }
            }
            AstKind::Array { elements } => {
                for &e in elements {
                    self.visit(e);
                }
            }
            AstKind::Call { callee, args, .. } => {
                let mut computed = Vec::new();
                let mut stopped = false;
                let chain = match program.ast().kind(*callee) {
                    AstKind::Member { .. } => self.chain(*callee, &mut computed, &mut stopped),
                    _ => None,
                };
                match chain {
                    Some(mut chain) => {
                        // a method name is not data, unless it is an array member
                        let is_method = chain
                            .last()
                            .is_some_and(|m| !is_array_intrinsic(m));
                        if !stopped && chain.len() > 1 && is_method {
                            chain.pop();
                        }
                        self.record(chain);
                        for index in computed {
                            self.visit(index);
                        }
                    }
                    None => self.visit(*callee),
                }
                for &a in args {
                    self.visit(a);
                }
            }
            AstKind::ExprStmt { expr: argument }
            | AstKind::Spread { argument }
            | AstKind::Unary { argument, .. }
            | AstKind::Update { argument, .. } => self.visit(*argument),
            AstKind::Return { argument } => {
                if let Some(argument) = argument {
                    self.visit(*argument);
                }
            }
            AstKind::If {
                test,
                consequent,
                alternate,
            } => {
                self.visit(*test);
                self.visit(*consequent);
                if let Some(alt) = alternate {
                    self.visit(*alt);
                }
            }
            AstKind::Binary { left, right, .. } | AstKind::Logical { left, right, .. } => {
                self.visit(*left);
                self.visit(*right);
            }
            AstKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.visit(*test);
                self.visit(*consequent);
                self.visit(*alternate);
            }
            AstKind::Assign { target, value, .. } => {
                self.visit(*target);
                self.visit(*value);
            }
        }
    }
}

fn chains_in(program: &Program, root: AstId, bound: &[String]) -> Vec<Vec<String>> {
    let mut walker = Walker {
        program,
        bound: bound.to_vec(),
        out: Vec::new(),
    };
    walker.visit(root);
    walker.out
}

/// Free identifier chains read by an expression, in source order
pub fn extract_dependencies(expr: &Expression) -> Vec<Vec<String>> {
    chains_in(expr.program(), expr.root(), &[])
}

struct Collector<'a> {
    store: &'a Store,
    env: &'a Environment,
    out: BTreeSet<Path>,
    visited: HashSet<*const Closure>,
}

impl Collector<'_> {
    fn add_chains(&mut self, chains: Vec<Vec<String>>, scope: &Scope) {
        for chain in chains {
            let Some((root, rest)) = chain.split_first() else {
                continue;
            };

            match scope.local(root) {
                Some(Local::Alias(path)) => {
                    self.out.insert(path.join(rest));
                    continue;
                }
                Some(Local::Value(Value::Function(Function::Closure(c)))) => {
                    self.add_closure(c);
                    continue;
                }
                Some(Local::Value(_)) => continue,
                None => {}
            }

            let mut resolved = false;
            for level in scope.hierarchy().levels() {
                if let Some(func) = self.env.functions.get(&level, root) {
                    if let Function::Closure(c) = func {
                        self.add_closure(c);
                    }
                    resolved = true;
                    break;
                }
                if is_declared(&level.key(root), self.store, self.env) {
                    self.out.insert(level.scoped(&chain));
                    resolved = true;
                    break;
                }
            }
            if resolved {
                continue;
            }

            if setter_state_name(root).is_some()
                && scope.setter_target(root, self.store, self.env).is_some()
            {
                continue;
            }
            if self.env.shared.contains(root) {
                self.out.insert(self.env.shared.path(root).join(rest));
                continue;
            }
            if self.env.globals.contains(root) {
                continue;
            }
            // not declared yet: assume the current scope
            self.out.insert(scope.hierarchy().scoped(&chain));
        }
    }

    fn add_closure(&mut self, closure: &std::rc::Rc<Closure>) {
        if !self.visited.insert(std::rc::Rc::as_ptr(closure)) {
            return;
        }
        let chains = chains_in(&closure.program, closure.body, &closure.params);
        self.add_chains(chains, &closure.scope);
    }
}

/// Scoped keys an expression depends on, including those read by the
/// scoped functions it calls
pub fn scoped_dependencies(
    expr: &Expression,
    scope: &Scope,
    store: &Store,
    env: &Environment,
) -> BTreeSet<Path> {
    scoped_node_dependencies(expr.program(), expr.root(), scope, store, env)
}

/// [`scoped_dependencies`] for any node of a parsed program
pub fn scoped_node_dependencies(
    program: &Program,
    root: AstId,
    scope: &Scope,
    store: &Store,
    env: &Environment,
) -> BTreeSet<Path> {
    let mut collector = Collector {
        store,
        env,
        out: BTreeSet::new(),
        visited: HashSet::new(),
    };
    collector.add_chains(chains_in(program, root, &[]), scope);
    collector.out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Interpreter, parse_expression, parse_program};
    use crate::Hierarchy;

    fn chains(src: &str) -> Vec<String> {
        extract_dependencies(&parse_expression(src).unwrap())
            .into_iter()
            .map(|c| c.join("."))
            .collect()
    }

    #[test]
    fn test_member_chains() {
        assert_eq!(chains("user.name + ' ' + user.email"), vec!["user.name", "user.email"]);
        assert_eq!(chains("user?.profile?.avatar"), vec!["user.profile.avatar"]);
    }

    #[test]
    fn test_strings_and_keys_ignored() {
        assert_eq!(chains("'count' + total"), vec!["total"]);
        assert_eq!(chains("({ label: title, count })"), vec!["title", "count"]);
    }

    #[test]
    fn test_template_interpolations_are_code() {
        assert_eq!(chains("`${first} ${last}`"), vec!["first", "last"]);
    }

    #[test]
    fn test_arrow_params_bound() {
        assert_eq!(
            chains("todos.filter(t => t.done && t.owner === me).length"),
            vec!["todos.filter", "me"]
        );
    }

    #[test]
    fn test_computed_index_stops_chain() {
        assert_eq!(chains("rows[i].name"), vec!["rows", "i"]);
        assert_eq!(chains("rows[0].name"), vec!["rows.0.name"]);
    }

    #[test]
    fn test_reserved_roots_skipped() {
        assert_eq!(chains("Math.max(a, event.target.value)"), vec!["a"]);
    }

    #[test]
    fn test_scoped_mapping() {
        let mut store = Store::new();
        let mut env = Environment::default();
        let a = Hierarchy::root().child("A");
        let b = a.child("B");
        env.states.declare(&a, "user");
        env.states.declare(&b, "count");
        env.shared.declare("theme");

        let expr = parse_expression("count + user.name + theme + later").unwrap();
        let deps = scoped_dependencies(&expr, &Scope::new(b.clone()), &store, &env);
        let deps: Vec<String> = deps.iter().map(ToString::to_string).collect();
        assert_eq!(
            deps,
            vec!["$shared.theme", "app.A.B.count", "app.A.B.later", "app.A.user.name"]
        );

        // functions contribute what their bodies read
        let program = parse_program("function label() { return user.name.toUpperCase() }").unwrap();
        let f = Interpreter::new(&mut store, &env, Scope::new(a.clone()))
            .closure(&program, program.statements()[0])
            .unwrap();
        env.functions.register(&a, "label", f);
        let expr = parse_expression("label()").unwrap();
        let deps = scoped_dependencies(&expr, &Scope::new(b), &store, &env);
        assert!(deps.contains(&Path::parse("app.A.user.name")));
    }

    #[test]
    fn test_alias_locals_map_to_store_paths() {
        let store = Store::new();
        let env = Environment::default();
        let scope = Scope::default()
            .with_local("todo", Local::Alias(Path::parse("app.todos.2")))
            .with_local("idx", Local::Value(Value::from(2.0)));
        let expr = parse_expression("todo.title + idx").unwrap();
        let deps = scoped_dependencies(&expr, &scope, &store, &env);
        assert_eq!(deps.into_iter().collect::<Vec<_>>(), vec![Path::parse("app.todos.2.title")]);
    }
}

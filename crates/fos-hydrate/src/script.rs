//! Inline component logic
//!
//! Script blocks of the configured type declare state, shared state,
//! scoped functions and effects for the component that contains them.
//! Statements run once, top to bottom; `state`, `share` and `effect`
//! calls at the top level are intercepted and routed to the reactive
//! context instead of being evaluated.

use std::rc::Rc;

use fos_dom::NodeId;
use fos_reactive::expr::{
    AstId, AstKind, Expression, Interpreter, Literal, Pattern, Program, parse_program,
    scoped_node_dependencies,
};
use fos_reactive::{
    Cleanup, EffectContext, EffectDep, EffectDeps, Function, Hierarchy, Local, Scope, Value,
};

use crate::{HydrateError, HydrateResult, Page};

/// Top-level statement forms with reactive meaning
enum Declaration<'a> {
    /// `const [x, setX] = state(init)` or `state("x", init)`
    State { name: String, init: Option<AstId> },
    /// `const [x, setX] = share("key", init)`
    Share {
        key: String,
        names: &'a [Option<Box<str>>],
        init: Option<AstId>,
    },
    /// `effect(fn, [deps])`
    Effect { body: AstId, deps: Option<AstId> },
    Other,
}

fn string_literal(program: &Program, id: AstId) -> Option<String> {
    match program.ast().kind(id) {
        AstKind::Literal {
            value: Literal::String(s),
        } => Some(s.to_string()),
        _ => None,
    }
}

/// `name(args…)` with a bare identifier callee
fn call_of<'p>(program: &'p Program, id: AstId) -> Option<(&'p str, &'p [AstId])> {
    let AstKind::Call { callee, args, .. } = program.ast().kind(id) else {
        return None;
    };
    match program.ast().kind(*callee) {
        AstKind::Ident { name } => Some((&**name, args.as_slice())),
        _ => None,
    }
}

fn classify(program: &Program, stmt: AstId) -> Declaration<'_> {
    match program.ast().kind(stmt) {
        AstKind::VarDecl {
            target: Pattern::Array(names),
            init: Some(init),
            ..
        } => match call_of(program, *init) {
            Some(("state", args)) => {
                let Some(Some(name)) = names.first() else {
                    return Declaration::Other;
                };
                let init = match args {
                    [key, value] if string_literal(program, *key).is_some() => Some(*value),
                    _ => args.first().copied(),
                };
                Declaration::State {
                    name: name.to_string(),
                    init,
                }
            }
            Some(("share", [key, rest @ ..])) => match string_literal(program, *key) {
                Some(key) => Declaration::Share {
                    key,
                    names,
                    init: rest.first().copied(),
                },
                None => Declaration::Other,
            },
            _ => Declaration::Other,
        },
        AstKind::ExprStmt { expr } => match call_of(program, *expr) {
            Some(("state", [key, rest @ ..])) => match string_literal(program, *key) {
                Some(name) => Declaration::State {
                    name,
                    init: rest.first().copied(),
                },
                None => Declaration::Other,
            },
            Some(("effect", [body, rest @ ..])) => Declaration::Effect {
                body: *body,
                deps: rest.first().copied(),
            },
            _ => Declaration::Other,
        },
        _ => Declaration::Other,
    }
}

impl Page {
    /// Run every inline logic block under `nodes`, outermost component
    /// first; returns how many loaded
    pub(crate) fn load_scripts(&mut self, nodes: &[NodeId]) -> HydrateResult<usize> {
        let kind = self.config().inline_script_type.clone();
        let tree = self.document.tree();
        let mut scripts: Vec<(Hierarchy, String)> = nodes
            .iter()
            .filter(|&&node| {
                tree.is_tag(node, "script") && tree.attr(node, "type") == Some(kind.as_str())
            })
            .map(|&node| (self.names.hierarchy_of(tree, node), tree.text_content(node)))
            .collect();
        scripts.sort_by_key(|(hierarchy, _)| hierarchy.depth());

        let mut loaded = 0;
        for (hierarchy, source) in scripts {
            match self.load_script(&hierarchy, &source) {
                Ok(()) => loaded += 1,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => tracing::warn!("skipping inline logic in {}: {}", hierarchy, err),
            }
        }
        Ok(loaded)
    }

    /// Run one inline logic block in `hierarchy`
    pub fn load_script(&mut self, hierarchy: &Hierarchy, source: &str) -> HydrateResult<()> {
        let program = parse_program(source).map_err(|e| HydrateError::Script(e.to_string()))?;

        let functions: Vec<AstId> = program
            .statements()
            .iter()
            .copied()
            .filter(|&stmt| matches!(program.ast().kind(stmt), AstKind::FunctionDecl { .. }))
            .collect();
        let mut scope = Scope::new(hierarchy.clone());
        self.register_functions(&program, &functions, &scope);

        for &stmt in program.statements() {
            match classify(&program, stmt) {
                Declaration::State { name, init } => {
                    let value = self.eval_node(&program, init, &scope);
                    self.reactive.state(hierarchy, &name, value)?;
                }
                Declaration::Share { key, names, init } => {
                    let value = self.eval_node(&program, init, &scope);
                    let entry = self.reactive.share(&key, value)?;
                    if let Some(Some(name)) = names.first() {
                        scope.bind(name.to_string(), Local::Alias(entry.path().clone()));
                    }
                    if let Some(Some(setter)) = names.get(1) {
                        let set = Function::Setter(entry.path().clone());
                        scope.bind(setter.to_string(), Local::Value(Value::Function(set)));
                    }
                }
                Declaration::Effect { body, deps } => {
                    self.register_effect(&program, body, deps, &scope)?;
                }
                Declaration::Other => {
                    let mut interp = self.reactive.interpreter(scope.clone());
                    if let Err(err) = interp.exec_statement(&program, stmt) {
                        tracing::warn!("{} in {}: {}", program.text(stmt).trim(), hierarchy, err);
                    }
                    scope = interp.scope().clone();
                    if matches!(program.ast().kind(stmt), AstKind::Return { .. }) {
                        break;
                    }
                }
            }
        }

        // rebind so declared functions see the script's top-level locals
        self.register_functions(&program, &functions, &scope);
        tracing::debug!("loaded inline logic for {}", hierarchy);
        Ok(())
    }

    fn register_functions(&mut self, program: &Rc<Program>, decls: &[AstId], scope: &Scope) {
        for &decl in decls {
            let AstKind::FunctionDecl { name, .. } = program.ast().kind(decl) else {
                continue;
            };
            let closure = self.reactive.interpreter(scope.clone()).closure(program, decl);
            if let Some(func) = closure {
                self.reactive
                    .env
                    .functions
                    .register(scope.hierarchy(), name.to_string(), func);
            }
        }
    }

    fn eval_node(&mut self, program: &Rc<Program>, id: Option<AstId>, scope: &Scope) -> Value {
        let Some(id) = id else {
            return Value::Undefined;
        };
        let result = Expression::parse(program.text(id))
            .and_then(|expr| self.reactive.interpreter(scope.clone()).eval(&expr));
        result.unwrap_or_else(|err| {
            tracing::warn!("initial value `{}`: {}", program.text(id), err);
            Value::Undefined
        })
    }

    fn register_effect(
        &mut self,
        program: &Rc<Program>,
        body: AstId,
        deps: Option<AstId>,
        scope: &Scope,
    ) -> HydrateResult<()> {
        let func = {
            let mut interp = self.reactive.interpreter(scope.clone());
            match interp.closure(program, body) {
                Some(func) => func,
                None => match Expression::parse(program.text(body))
                    .and_then(|expr| interp.eval(&expr))
                {
                    Ok(Value::Function(func)) => func,
                    Ok(other) => {
                        return Err(HydrateError::Script(format!(
                            "effect needs a function, got {}",
                            other.type_of()
                        )));
                    }
                    Err(err) => return Err(HydrateError::Script(err.to_string())),
                },
            }
        };

        let deps = match deps.map(|id| program.ast().kind(id)) {
            Some(AstKind::Array { elements }) => {
                let mut tracked = Vec::new();
                for &element in elements {
                    if call_of(program, element).is_some()
                        || matches!(program.ast().kind(element), AstKind::Call { .. })
                    {
                        let expr = Expression::parse(program.text(element))
                            .map_err(|e| HydrateError::Script(e.to_string()))?;
                        tracked.push(computed_dep(expr, scope.clone()));
                    } else {
                        let paths = scoped_node_dependencies(
                            program,
                            element,
                            scope,
                            &self.reactive.store,
                            &self.reactive.env,
                        );
                        tracked.extend(paths.into_iter().map(EffectDep::Path));
                    }
                }
                EffectDeps::Tracked(tracked)
            }
            Some(_) => {
                return Err(HydrateError::Script(
                    "effect dependencies must be an array literal".into(),
                ));
            }
            None => EffectDeps::Static,
        };

        let scope = scope.clone();
        self.reactive.effect(
            deps,
            Box::new(move |ctx: &mut EffectContext<'_>| {
                let returned = ctx.interpreter(scope.clone()).call(&func, Vec::new())?;
                let Value::Function(cleanup) = returned else {
                    return Ok(None);
                };
                let scope = scope.clone();
                let cleanup: Cleanup = Box::new(move |ctx: &mut EffectContext<'_>| {
                    if let Err(err) = ctx.interpreter(scope).call(&cleanup, Vec::new()) {
                        tracing::warn!("effect cleanup failed: {}", err);
                    }
                });
                Ok(Some(cleanup))
            }),
        )?;
        Ok(())
    }
}

/// Dependency on the current result of a call such as `total()`
fn computed_dep(expr: Expression, scope: Scope) -> EffectDep {
    EffectDep::Computed(Box::new(move |store, env| {
        Interpreter::new(store, env, scope.clone())
            .eval(&expr)
            .unwrap_or_default()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeConfig;
    use fos_reactive::Path;

    fn page() -> Page {
        Page::from_html("<body></body>", RuntimeConfig::default())
    }

    #[test]
    fn test_state_and_function_declarations() {
        let mut p = page();
        let h = Hierarchy::from_components(["app", "Counter"]);
        p.load_script(
            &h,
            r#"
            const [count, setCount] = state(2);
            state("label", "clicks");
            function bump() { setCount(count + 1); }
            "#,
        )
        .unwrap();
        let store = &p.reactive.store;
        assert_eq!(store.get(&Path::parse("app.Counter.count")), Value::from(2.0));
        assert_eq!(
            store.get(&Path::parse("app.Counter.label")),
            Value::from("clicks")
        );
        assert!(p.reactive.env.functions.get(&h, "bump").is_some());

        let expr = Expression::parse("bump()").unwrap();
        p.reactive.eval(&expr, &Scope::new(h)).unwrap();
        assert_eq!(
            p.reactive.store.get(&Path::parse("app.Counter.count")),
            Value::from(3.0)
        );
    }

    #[test]
    fn test_share_declares_global_entry() {
        let mut p = page();
        p.load_script(
            &Hierarchy::root(),
            r#"const [theme, setTheme] = share("theme", "dark");"#,
        )
        .unwrap();
        assert!(p.reactive.env.shared.contains("theme"));
        let expr = Expression::parse("theme").unwrap();
        let scope = Scope::new(Hierarchy::from_components(["app", "Deep"]));
        assert_eq!(p.reactive.eval(&expr, &scope).unwrap(), Value::from("dark"));
    }

    #[test]
    fn test_effect_with_dependencies() {
        let mut p = page();
        let h = Hierarchy::root();
        p.load_script(
            &h,
            r#"
            const [total, setTotal] = state(0);
            const [runs, setRuns] = state(0);
            const [other, setOther] = state(0);
            effect(() => { setRuns(runs + 1); }, [total]);
            "#,
        )
        .unwrap();
        let runs = Path::parse("app.runs");
        assert_eq!(p.reactive.store.get(&runs), Value::from(1.0));

        p.reactive.store.write(&Path::parse("app.other"), Value::from(1.0)).unwrap();
        p.flush_all().unwrap();
        assert_eq!(p.reactive.store.get(&runs), Value::from(1.0));

        p.reactive.store.write(&Path::parse("app.total"), Value::from(3.0)).unwrap();
        p.reactive.store.write(&Path::parse("app.total"), Value::from(5.0)).unwrap();
        p.flush_all().unwrap();
        assert_eq!(p.reactive.store.get(&runs), Value::from(2.0));
    }

    #[test]
    fn test_bad_script_is_an_error() {
        let mut p = page();
        let err = p.load_script(&Hierarchy::root(), "const = ;").unwrap_err();
        assert!(matches!(err, HydrateError::Script(_)));
    }

    #[test]
    fn test_failing_statement_does_not_stop_the_block() {
        let mut p = page();
        p.load_script(
            &Hierarchy::root(),
            r#"
            undefinedThing();
            const [after, setAfter] = state("ok");
            "#,
        )
        .unwrap();
        assert_eq!(p.reactive.store.get(&Path::parse("app.after")), Value::from("ok"));
    }

    #[test]
    fn test_top_level_return_ends_the_block() {
        let mut p = page();
        p.load_script(
            &Hierarchy::root(),
            r#"
            const [a, setA] = state(1);
            return;
            const [b, setB] = state(2);
            "#,
        )
        .unwrap();
        assert_eq!(p.reactive.store.get(&Path::parse("app.a")), Value::from(1.0));
        assert!(!p.reactive.store.contains(&Path::parse("app.b")));
    }
}

//! Integration tests for fos-reactive
//!
//! Store writes, scoped resolution, binding matching and effects driven
//! through whole flush passes.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Duration;

use fos_reactive::expr::parse_expression;
use fos_reactive::*;

fn paths(list: &[&str]) -> BTreeSet<Path> {
    list.iter().map(|p| Path::parse(p)).collect()
}

fn counting_effect(runs: &Rc<Cell<u32>>) -> EffectBody {
    let runs = Rc::clone(runs);
    Box::new(
        move |_: &mut EffectContext<'_>| -> Result<Option<Cleanup>, EvalError> {
            runs.set(runs.get() + 1);
            Ok(None)
        },
    )
}

fn settle(rx: &mut Reactive) {
    let mut table: BindingTable<()> = BindingTable::new();
    flush(rx, &mut table, |_, _, _| Ok(())).unwrap();
}

// ============================================================================
// SCOPE TESTS
// ============================================================================

#[test]
fn test_nested_components_shadow_state() {
    let mut rx = Reactive::new();
    let a = Hierarchy::root().child("A");
    let b = a.child("B");
    rx.state(&a, "count", Value::from(1.0)).unwrap();
    rx.state(&b, "count", Value::from(2.0)).unwrap();

    let expr = parse_expression("count").unwrap();
    assert_eq!(rx.eval(&expr, &Scope::new(b.clone())).unwrap(), Value::from(2.0));
    assert_eq!(rx.eval(&expr, &Scope::new(a.clone())).unwrap(), Value::from(1.0));

    let keys = rx.dependencies(&expr, &Scope::new(b));
    assert_eq!(keys, paths(&["app.A.B.count"]));
}

#[test]
fn test_synthetic_setter_writes_enclosing_state() {
    let mut rx = Reactive::new();
    let a = Hierarchy::root().child("A");
    rx.state(&a, "open", Value::from(false)).unwrap();
    rx.store.take_dirty();

    let scope = Scope::new(a.child("Inner"));
    let expr = parse_expression("setOpen(!open)").unwrap();
    rx.eval(&expr, &scope).unwrap();
    assert_eq!(rx.store.get(&Path::parse("app.A.open")), Value::from(true));
    assert!(rx.store.dirty().contains(&Path::parse("app.A.open")));
}

#[test]
fn test_forward_reference_uses_current_scope() {
    let rx = Reactive::new();
    let scope = Scope::new(Hierarchy::root().child("Form"));
    let expr = parse_expression("later.value + 1").unwrap();
    assert_eq!(rx.dependencies(&expr, &scope), paths(&["app.Form.later.value"]));
}

// ============================================================================
// FLUSH TESTS
// ============================================================================

#[test]
fn test_writes_in_one_tick_coalesce() {
    let mut rx = Reactive::new();
    let count = rx.state(&Hierarchy::root(), "count", Value::from(0.0)).unwrap();
    settle(&mut rx);
    let before = rx.store.flush_requests();

    for n in 1..=10 {
        count.set(&mut rx.store, Value::from(n as f64)).unwrap();
    }
    assert_eq!(rx.store.flush_requests(), before + 1);

    let mut table: BindingTable<&str> = BindingTable::new();
    table.register(BindingKind::Text, paths(&["app.count"]), "label");
    table.register(BindingKind::Attribute, paths(&["app.other"]), "title");
    let mut updated = Vec::new();
    flush(&mut rx, &mut table, |_, table, id| {
        updated.push(table.get(id).map(|r| r.update).unwrap_or_default());
        Ok(())
    })
    .unwrap();
    assert_eq!(updated, vec!["label"]);
    assert!(!rx.store.is_flush_requested());
}

#[test]
fn test_array_mutator_is_single_write() {
    let mut rx = Reactive::new();
    let items = rx
        .state(&Hierarchy::root(), "items", Value::Array(vec![]))
        .unwrap();
    settle(&mut rx);

    let expr = parse_expression("items.push(1, 2, 3)").unwrap();
    rx.eval(&expr, &Scope::default()).unwrap();
    assert_eq!(rx.store.dirty(), &paths(&["app.items", "app.items.*"]));
    assert_eq!(
        items.get(&rx.store),
        Value::Array(vec![Value::from(1.0), Value::from(2.0), Value::from(3.0)])
    );
}

#[test]
fn test_matching_rules_by_kind() {
    let changed = Path::parse("app.todos.3.title");
    let items = Path::parse("app.todos");
    assert!(dependency_matches(&changed, &items, MatchRule::Loop));
    assert!(dependency_matches(&changed, &items, MatchRule::Binding));
    assert!(!dependency_matches(&changed, &items, MatchRule::Effect));

    let field = Path::parse("app.todos.*.title");
    assert!(dependency_matches(&changed, &field, MatchRule::Effect));

    let length = Path::parse("app.todos.length");
    assert!(dependency_matches(&Path::parse("app.todos.*"), &length, MatchRule::Binding));

    let deep = Path::parse("app.user.address.city.zip");
    assert!(!dependency_matches(&deep, &Path::parse("app.user"), MatchRule::Binding));
    assert!(dependency_matches(&deep, &Path::parse("app.user"), MatchRule::Loop));
}

// ============================================================================
// EFFECT TESTS
// ============================================================================

#[test]
fn test_effect_reruns_once_per_changed_tick() {
    let mut rx = Reactive::new();
    let h = Hierarchy::root();
    let total = rx.state(&h, "total", Value::from(0.0)).unwrap();
    let sibling = rx.state(&h, "sibling", Value::from(0.0)).unwrap();
    settle(&mut rx);

    let runs = Rc::new(Cell::new(0));
    rx.effect(EffectDeps::paths([total.path().clone()]), counting_effect(&runs))
        .unwrap();
    assert_eq!(runs.get(), 1);

    sibling.set(&mut rx.store, Value::from(9.0)).unwrap();
    settle(&mut rx);
    assert_eq!(runs.get(), 1);

    total.set(&mut rx.store, Value::from(3.0)).unwrap();
    total.set(&mut rx.store, Value::from(5.0)).unwrap();
    settle(&mut rx);
    assert_eq!(runs.get(), 2);

    // same value written back
    total.set(&mut rx.store, Value::from(5.0)).unwrap();
    settle(&mut rx);
    assert_eq!(runs.get(), 2);
}

#[test]
fn test_effect_cleanup_before_rerun_and_dispose() {
    let mut rx = Reactive::new();
    let n = rx.state(&Hierarchy::root(), "n", Value::from(0.0)).unwrap();
    settle(&mut rx);

    let cleanups = Rc::new(Cell::new(0));
    let counter = Rc::clone(&cleanups);
    let handle = rx
        .effect(
            EffectDeps::paths([n.path().clone()]),
            Box::new(
                move |_: &mut EffectContext<'_>| -> Result<Option<Cleanup>, EvalError> {
                    let counter = Rc::clone(&counter);
                    let cleanup: Cleanup =
                        Box::new(move |_: &mut EffectContext<'_>| counter.set(counter.get() + 1));
                    Ok(Some(cleanup))
                },
            ),
        )
        .unwrap();

    n.set(&mut rx.store, Value::from(1.0)).unwrap();
    settle(&mut rx);
    assert_eq!(cleanups.get(), 1);

    handle.dispose(&mut rx);
    assert!(handle.is_disposed());
    assert_eq!(cleanups.get(), 2);
    assert_eq!(rx.effect_count(), 0);
}

#[test]
fn test_computed_dependency_tracks_result() {
    let mut rx = Reactive::new();
    let items = rx
        .state(&Hierarchy::root(), "items", Value::Array(vec![]))
        .unwrap();
    settle(&mut rx);

    let runs = Rc::new(Cell::new(0));
    let key = items.path().clone();
    let size = EffectDep::Computed(Box::new(move |store: &mut Store, _: &Environment| {
        Value::from(store.array_len(&key).unwrap_or(0) as f64)
    }));
    rx.effect(EffectDeps::Tracked(vec![size]), counting_effect(&runs))
        .unwrap();

    let expr = parse_expression("items.push('a')").unwrap();
    rx.eval(&expr, &Scope::default()).unwrap();
    settle(&mut rx);
    assert_eq!(runs.get(), 2);
}

#[test]
fn test_self_triggering_effect_is_fatal() {
    let mut rx = Reactive::new().with_guard(GuardConfig {
        max_runs: 5,
        window: Duration::from_secs(60),
    });
    let n = rx.state(&Hierarchy::root(), "n", Value::from(0.0)).unwrap();
    settle(&mut rx);

    let key = n.path().clone();
    rx.effect(
        EffectDeps::paths([key.clone()]),
        Box::new(
            move |ctx: &mut EffectContext<'_>| -> Result<Option<Cleanup>, EvalError> {
                ctx.store
                    .update(&key, |v| Value::from(v.to_number() + 1.0))
                    .map_err(|e| EvalError::Type(e.to_string()))?;
                Ok(None)
            },
        ),
    )
    .unwrap();

    let mut table: BindingTable<()> = BindingTable::new();
    let mut outcome = Ok(FlushStats::default());
    for _ in 0..20 {
        outcome = flush(&mut rx, &mut table, |_, _, _| Ok(()));
        if outcome.is_err() {
            break;
        }
    }
    assert!(matches!(outcome, Err(ReactiveError::RunawayEffect { runs: 6, .. })));
}

//! Staged hydration
//!
//! Brings a subtree to life one phase at a time, yielding to the executor
//! between phases and between binding chunks so a long document does not
//! hold the thread. Whatever happens, the document is revealed at the end.

use std::cell::RefCell;
use std::fmt;

use fos_dom::NodeId;

use crate::{HydrateResult, Page};

/// Hydration state machine, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum HydrationPhase {
    #[default]
    Pending,
    RefsCollected,
    DeclarativeStateBootstrapped,
    InlineLogicLoaded,
    ReferencedPathsMaterialized,
    AttributeBindingsRegistered,
    ConditionalsCompiled,
    LoopsCompiled,
    HandlersWired,
    BindingsFlushed,
    Hydrated,
}

impl HydrationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            HydrationPhase::Pending => "pending",
            HydrationPhase::RefsCollected => "refs-collected",
            HydrationPhase::DeclarativeStateBootstrapped => "declarative-state-bootstrapped",
            HydrationPhase::InlineLogicLoaded => "inline-logic-loaded",
            HydrationPhase::ReferencedPathsMaterialized => "referenced-paths-materialized",
            HydrationPhase::AttributeBindingsRegistered => "attribute-bindings-registered",
            HydrationPhase::ConditionalsCompiled => "conditionals-compiled",
            HydrationPhase::LoopsCompiled => "loops-compiled",
            HydrationPhase::HandlersWired => "handlers-wired",
            HydrationPhase::BindingsFlushed => "bindings-flushed",
            HydrationPhase::Hydrated => "hydrated",
        }
    }

    pub fn is_complete(&self) -> bool {
        *self == HydrationPhase::Hydrated
    }
}

impl fmt::Display for HydrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run one phase against the page, then yield
async fn advance(
    page: &RefCell<Page>,
    next: HydrationPhase,
    step: impl FnOnce(&mut Page) -> HydrateResult<()>,
) -> HydrateResult<()> {
    {
        let mut page = page.borrow_mut();
        step(&mut page)?;
        page.phase = next;
    }
    tracing::debug!("hydration phase: {}", next);
    smol::future::yield_now().await;
    Ok(())
}

async fn run_phases(page: &RefCell<Page>, root: NodeId) -> HydrateResult<()> {
    let nodes = {
        let mut p = page.borrow_mut();
        p.pending.clear();
        p.phase = HydrationPhase::Pending;
        p.names.live_nodes(p.document.tree(), root)
    };

    advance(page, HydrationPhase::RefsCollected, |p| {
        p.collect_refs(&nodes);
        Ok(())
    })
    .await?;
    advance(page, HydrationPhase::DeclarativeStateBootstrapped, |p| {
        p.bootstrap_state(&nodes);
        Ok(())
    })
    .await?;
    advance(page, HydrationPhase::InlineLogicLoaded, |p| {
        p.load_scripts(&nodes).map(|_| ())
    })
    .await?;
    advance(page, HydrationPhase::ReferencedPathsMaterialized, |p| {
        let created = p.materialize_paths(&nodes);
        tracing::debug!("materialized {} referenced paths", created);
        Ok(())
    })
    .await?;
    advance(page, HydrationPhase::AttributeBindingsRegistered, |p| {
        let ids = p.register_bindings(&nodes, None);
        p.pending.extend(ids);
        Ok(())
    })
    .await?;
    advance(page, HydrationPhase::ConditionalsCompiled, |p| {
        let ids = p.compile_conditionals(&nodes, None);
        p.pending.extend(ids);
        Ok(())
    })
    .await?;
    advance(page, HydrationPhase::LoopsCompiled, |p| {
        let ids = p.compile_loops(&nodes, None);
        p.pending.extend(ids);
        Ok(())
    })
    .await?;
    advance(page, HydrationPhase::HandlersWired, |p| {
        p.wire_handlers(&nodes, None);
        p.schedule_style_hints(&nodes);
        p.fill_params_from_url(&nodes);
        Ok(())
    })
    .await?;

    let chunk = page.borrow().config().flush_chunk.max(1);
    loop {
        let left = page.borrow_mut().apply_pending(chunk)?;
        if left == 0 {
            break;
        }
        smol::future::yield_now().await;
    }
    advance(page, HydrationPhase::BindingsFlushed, |p| {
        let stats = p.flush_all()?;
        tracing::debug!(
            "initial flush: {} bindings, {} effects",
            stats.bindings_updated,
            stats.effects_run
        );
        Ok(())
    })
    .await?;

    let mut p = page.borrow_mut();
    p.apply_autofocus();
    p.phase = HydrationPhase::Hydrated;
    Ok(())
}

/// Hydrate the subtree at `root`. Phase failures are logged and stop the
/// pipeline; runaway effects are returned as errors. The document is
/// revealed either way.
pub async fn hydrate(page: &RefCell<Page>, root: NodeId) -> HydrateResult<HydrationPhase> {
    let result = run_phases(page, root).await;
    let mut page = page.borrow_mut();
    page.reveal();
    match result {
        Ok(()) => {
            tracing::debug!(
                "hydrated: {} bindings, {} loops, {} handlers",
                page.binding_count(),
                page.loop_count(),
                page.handler_count()
            );
            Ok(page.phase)
        }
        Err(err) if err.is_fatal() => {
            tracing::error!("hydration aborted after {}: {}", page.phase, err);
            Err(err)
        }
        Err(err) => {
            tracing::error!("hydration stopped after {}: {}", page.phase, err);
            Ok(page.phase)
        }
    }
}

/// Hydrate the whole document
pub async fn hydrate_document(page: &RefCell<Page>) -> HydrateResult<HydrationPhase> {
    let root = page.borrow().document.root();
    hydrate(page, root).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HydrateError, RuntimeConfig};
    use fos_dom::Selector;

    fn text_of(page: &Page, selector: &str) -> String {
        let node = Selector::parse(selector)
            .and_then(|s| s.query(page.document.tree(), page.document.root()))
            .unwrap();
        page.document.tree().text_content(node)
    }

    #[test]
    fn test_phase_order() {
        assert!(HydrationPhase::Pending < HydrationPhase::RefsCollected);
        assert!(HydrationPhase::HandlersWired < HydrationPhase::BindingsFlushed);
        assert_eq!(HydrationPhase::InlineLogicLoaded.to_string(), "inline-logic-loaded");
    }

    #[test]
    fn test_full_pipeline_reveals_document() {
        let page = RefCell::new(Page::from_html(
            r#"<body hidden><div pp-component="Greeter"><script type="text/php">
                const [name, setName] = state("Ada");
            </script><p id="out">Hello {{ name }}</p></div></body>"#,
            RuntimeConfig::default(),
        ));
        let phase = smol::block_on(hydrate_document(&page)).unwrap();
        assert!(phase.is_complete());

        let page = page.into_inner();
        assert_eq!(text_of(&page, "#out"), "Hello Ada");
        let body = page.document.body().unwrap();
        assert!(!page.document.is_hidden(body));
    }

    #[test]
    fn test_small_chunks_hydrate_everything() {
        let items: String = (0..20).map(|i| format!("<i>{{{{ n + {i} }}}}</i>")).collect();
        let markup = format!(r#"<body pp-init-state='{{"n": 1}}'>{items}</body>"#);
        let page = RefCell::new(Page::from_html(
            &markup,
            RuntimeConfig::default().with_flush_chunk(3),
        ));
        smol::block_on(hydrate_document(&page)).unwrap();
        let page = page.into_inner();
        assert_eq!(page.binding_count(), 20);
        assert_eq!(text_of(&page, "i"), "1");
    }

    #[test]
    fn test_runaway_effect_is_fatal_but_reveals() {
        let page = RefCell::new(Page::from_html(
            r#"<body hidden><script type="text/php">
                const [n, setN] = state(0);
                effect(() => { setN(n + 1); }, [n]);
            </script></body>"#,
            RuntimeConfig::default().with_effect_budget(3, 60_000),
        ));
        let err = smol::block_on(hydrate_document(&page)).unwrap_err();
        assert!(matches!(
            err,
            HydrateError::Reactive(fos_reactive::ReactiveError::RunawayEffect { .. })
        ));
        let page = page.into_inner();
        assert!(!page.document.is_hidden(page.document.body().unwrap()));
    }

    #[test]
    fn test_self_triggering_effect_fails_hydration_with_default_budget() {
        let page = RefCell::new(Page::from_html(
            r#"<body hidden><script type="text/php">
                const [n, setN] = state(0);
                effect(() => { setN(n + 1); }, [n]);
            </script><p>{{ n }}</p></body>"#,
            RuntimeConfig::default(),
        ));
        let err = smol::block_on(hydrate_document(&page)).unwrap_err();
        assert!(err.is_fatal());
        let page = page.into_inner();
        assert_ne!(page.phase(), HydrationPhase::Hydrated);
        assert!(!page.document.is_hidden(page.document.body().unwrap()));
    }
}

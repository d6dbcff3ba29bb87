//! fOS Hydrate
//!
//! Brings a server-rendered document to life: directive compilation,
//! staged hydration, reconciliation against fresh markup and the runtime
//! that ties them to the network.
//!
//! # Example
//! ```rust,ignore
//! use fos_hydrate::{Page, RuntimeConfig, hydrate_document};
//!
//! let page = Page::from_html(markup, RuntimeConfig::default());
//! let page = std::cell::RefCell::new(page);
//! smol::block_on(hydrate_document(&page))?;
//! ```

mod compile;
mod config;
mod directive;
mod hints;
mod hydrate;
mod loops;
mod page;
mod reconcile;
mod runtime;
mod script;
mod suspense;

pub use config::RuntimeConfig;
pub use directive::{
    AfterRequest, DirectiveNames, Handler, ItemKey, KeyDiff, LoopSpec, RequestHooks, Segment,
    Template, diff_keys, item_keys, normalize_handler, parse_duration,
};
pub use hints::{StyleChange, StyleHint, plan_style_hint};
pub use hydrate::{HydrationPhase, hydrate, hydrate_document};
pub use page::{DomEvent, ItemRef, LoopId, Page, ScopeRef, Updater};
pub use reconcile::{
    ScrollSnapshot, TEMPLATE_VALUE_ATTRS, morph_body, morph_children, reconcile_head,
    scrub_template_values,
};
pub use runtime::{CALLBACK_SLOT_ID, LOADING_CONTAINER_ID, Runtime};
pub use suspense::Suspense;

// Re-export sub-crates for advanced usage
pub use fos_dom as dom;
pub use fos_html as html;
pub use fos_net as net;
pub use fos_reactive as reactive;

/// Runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Hydration error
#[derive(Debug, thiserror::Error)]
pub enum HydrateError {
    #[error("Parse error: {0}")]
    Parse(#[from] fos_html::ParseError),

    #[error("DOM error: {0}")]
    Dom(#[from] fos_dom::DomError),

    #[error("Reactive error: {0}")]
    Reactive(#[from] fos_reactive::ReactiveError),

    #[error("Network error: {0}")]
    Net(#[from] fos_net::NetError),

    #[error("Invalid {attr} directive: {message}")]
    Directive { attr: String, message: String },

    #[error("Inline logic error: {0}")]
    Script(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl HydrateError {
    /// Runaway effects and unsettled write cycles are never recovered
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HydrateError::Reactive(
                fos_reactive::ReactiveError::RunawayEffect { .. }
                    | fos_reactive::ReactiveError::Unsettled { .. }
            )
        )
    }
}

pub type HydrateResult<T> = Result<T, HydrateError>;

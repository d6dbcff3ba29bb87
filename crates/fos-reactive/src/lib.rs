//! fOS Reactive - state store and binding scheduler
//!
//! Path-addressed reactive state for the hydration runtime:
//! - [`Store`]: arena of containers with explicit dirty-path recording
//! - [`Scope`]: component hierarchy walk with local overrides
//! - [`expr`]: the small expression language directives are written in
//! - [`BindingTable`] / [`FlushPass`]: dependency matching and batched updates
//! - [`Reactive`]: the context object tying store, registries and effects together

mod binding;
mod context;
mod effect;
mod error;
pub mod expr;
mod globals;
mod path;
mod pattern;
mod registry;
mod scheduler;
mod scope;
mod store;
mod value;

pub use binding::{BindingId, BindingKind, BindingRecord, BindingTable};
pub use context::Reactive;
pub use effect::{
    Cleanup, EffectBody, EffectContext, EffectDep, EffectDeps, EffectHandle, EffectId, EffectTable,
    GuardConfig,
};
pub use error::{EvalError, ReactiveError, ReactiveResult};
pub use globals::Globals;
pub use path::{Hierarchy, Path, ROOT_COMPONENT, WILDCARD, is_index};
pub use pattern::{MatchRule, any_matches, dependency_matches};
pub use registry::{
    Environment, FunctionRegistry, RESERVED_NAMES, SHARED_ROOT, SharedEntry, SharedRegistry,
    StateHandle, StateInfo, StateRegistry, check_key, is_reserved,
};
pub use scheduler::{FlushPass, FlushStats, flush};
pub use scope::{Local, Resolved, Scope, setter_state_name};
pub use store::{ArrayOp, ContainerId, ContainerRef, Store, Wrapped};
pub use value::{Function, NativeFn, Object, Special, SpecialKind, Value, format_number};

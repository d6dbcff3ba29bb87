//! Flush scheduling
//!
//! Writes only record dirty paths and raise a flush request on the store.
//! A [`FlushPass`] drains the dirty set once, hands the due bindings to the
//! caller one at a time and then re-runs effects. Writes made while the
//! pass runs land in a fresh dirty set and are picked up by the next pass.

use std::collections::BTreeSet;

use crate::binding::{BindingId, BindingTable};
use crate::context::Reactive;
use crate::{EvalError, Path, ReactiveResult};

/// Counters for one completed pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub bindings_updated: usize,
    pub binding_errors: usize,
    pub effects_run: usize,
}

impl FlushStats {
    pub fn is_empty(&self) -> bool {
        self.bindings_updated == 0 && self.effects_run == 0
    }
}

/// One drain of the dirty set
#[derive(Debug)]
pub struct FlushPass {
    dirty: BTreeSet<Path>,
    due: Vec<BindingId>,
    cursor: usize,
    /// Bindings already brought up to date by another update in this pass
    settled: BTreeSet<BindingId>,
    stats: FlushStats,
}

impl FlushPass {
    /// Take the dirty set and compute the bindings it affects. Each binding
    /// appears once no matter how many of its patterns match.
    pub fn begin<U>(reactive: &mut Reactive, table: &BindingTable<U>) -> Self {
        let dirty = reactive.store.take_dirty();
        let due = if dirty.is_empty() {
            Vec::new()
        } else {
            table.due(&dirty)
        };
        tracing::debug!("flush: {} dirty paths, {} bindings due", dirty.len(), due.len());
        Self {
            dirty,
            due,
            cursor: 0,
            settled: BTreeSet::new(),
            stats: FlushStats::default(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.dirty.is_empty()
    }

    pub fn dirty(&self) -> &BTreeSet<Path> {
        &self.dirty
    }

    /// Record bindings applied as a side effect of another update; they are
    /// not handed out again by this pass
    pub fn mark_applied(&mut self, ids: impl IntoIterator<Item = BindingId>) {
        self.settled.extend(ids);
    }

    /// Next due binding still present in `table`. Bindings removed or
    /// already applied by an earlier update in the same pass are skipped.
    pub fn next_binding<U>(&mut self, table: &BindingTable<U>) -> Option<BindingId> {
        while let Some(&id) = self.due.get(self.cursor) {
            self.cursor += 1;
            if table.contains(id) && self.settled.insert(id) {
                self.stats.bindings_updated += 1;
                return Some(id);
            }
        }
        None
    }

    /// Count a failed update; the pass carries on
    pub fn report_error(&mut self, id: BindingId, err: &dyn std::fmt::Display) {
        self.stats.binding_errors += 1;
        tracing::warn!("binding {} failed: {}", id.index(), err);
    }

    /// Run effects against the drained dirty set
    pub fn finish(mut self, reactive: &mut Reactive) -> ReactiveResult<FlushStats> {
        self.stats.effects_run = reactive.run_effects(&self.dirty)?;
        Ok(self.stats)
    }
}

/// Run a whole pass, calling `apply` for every due binding
pub fn flush<U>(
    reactive: &mut Reactive,
    table: &mut BindingTable<U>,
    mut apply: impl FnMut(&mut Reactive, &mut BindingTable<U>, BindingId) -> Result<(), EvalError>,
) -> ReactiveResult<FlushStats> {
    let mut pass = FlushPass::begin(reactive, table);
    if pass.is_idle() {
        return Ok(FlushStats::default());
    }
    while let Some(id) = pass.next_binding(table) {
        if let Err(err) = apply(reactive, table, id) {
            pass.report_error(id, &err);
        }
    }
    pass.finish(reactive)
}

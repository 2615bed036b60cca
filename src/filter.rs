//! Tournament filter with a pending edit buffer and an applied selection.
//!
//! Only [`FilterStateMachine::commit`] moves `pending` into `applied`, and
//! only `applied` feeds the match query key, so toggling checkboxes in an open
//! filter sheet never changes what the list shows.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSelection {
    pub pending: BTreeSet<u64>,
    pub applied: BTreeSet<u64>,
}

impl FilterSelection {
    pub fn is_active(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Result of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub previous: BTreeSet<u64>,
    pub applied: BTreeSet<u64>,
}

impl CommitOutcome {
    /// False when the commit left `applied` as it was.
    pub fn changed(&self) -> bool {
        self.previous != self.applied
    }
}

#[derive(Debug, Default)]
pub struct FilterStateMachine {
    selection: FilterSelection,
}

impl FilterStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> &BTreeSet<u64> {
        &self.selection.pending
    }

    pub fn applied(&self) -> &BTreeSet<u64> {
        &self.selection.applied
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    pub fn is_active(&self) -> bool {
        self.selection.is_active()
    }

    /// Start (or restart) editing: `pending` becomes a copy of `applied`.
    pub fn begin_edit(&mut self) {
        self.selection.pending = self.selection.applied.clone();
    }

    /// Start editing from an explicit seed instead of `applied`.
    pub fn begin_edit_with<I: IntoIterator<Item = u64>>(&mut self, seed: I) {
        self.selection.pending = seed.into_iter().collect();
    }

    pub fn toggle(&mut self, tournament_id: u64) {
        if !self.selection.pending.remove(&tournament_id) {
            self.selection.pending.insert(tournament_id);
        }
    }

    pub fn set_pending<I: IntoIterator<Item = u64>>(&mut self, ids: I) {
        self.selection.pending = ids.into_iter().collect();
    }

    pub fn commit(&mut self) -> CommitOutcome {
        let previous = std::mem::replace(&mut self.selection.applied, self.selection.pending.clone());
        CommitOutcome { previous, applied: self.selection.applied.clone() }
    }

    pub fn reset(&mut self) {
        self.selection.pending.clear();
        self.selection.applied.clear();
    }
}

/// Shared, observable wrapper around a [`FilterStateMachine`].
///
/// Created once and handed to consumers by reference; subscribers receive a
/// fresh [`FilterSelection`] after every mutation.
#[derive(Clone)]
pub struct FilterStore {
    machine: Arc<Mutex<FilterStateMachine>>,
    updates: watch::Sender<FilterSelection>,
}

impl Default for FilterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterStore {
    pub fn new() -> Self {
        let (updates, _) = watch::channel(FilterSelection::default());
        Self { machine: Arc::new(Mutex::new(FilterStateMachine::new())), updates }
    }

    pub fn subscribe(&self) -> watch::Receiver<FilterSelection> {
        self.updates.subscribe()
    }

    pub fn snapshot(&self) -> FilterSelection {
        self.machine.lock().selection().clone()
    }

    pub fn is_active(&self) -> bool {
        self.machine.lock().is_active()
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut FilterStateMachine) -> R) -> R {
        let (result, selection) = {
            let mut machine = self.machine.lock();
            let result = f(&mut *machine);
            (result, machine.selection().clone())
        };
        self.updates.send_replace(selection);
        result
    }

    pub fn begin_edit(&self) {
        self.mutate(FilterStateMachine::begin_edit);
    }

    pub fn begin_edit_with<I: IntoIterator<Item = u64>>(&self, seed: I) {
        self.mutate(|m| m.begin_edit_with(seed));
    }

    pub fn toggle(&self, tournament_id: u64) {
        self.mutate(|m| m.toggle(tournament_id));
    }

    pub fn set_pending<I: IntoIterator<Item = u64>>(&self, ids: I) {
        self.mutate(|m| m.set_pending(ids));
    }

    pub fn commit(&self) -> CommitOutcome {
        let outcome = self.mutate(FilterStateMachine::commit);
        if outcome.changed() {
            info!(applied = ?outcome.applied, "Applied tournament filter");
        } else {
            debug!("Filter commit left selection unchanged");
        }
        outcome
    }

    pub fn reset(&self) {
        self.mutate(FilterStateMachine::reset);
    }
}

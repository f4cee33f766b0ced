//! Optimistic reconciliation.
//!
//! [`OptimisticReconciler`] merges periodically refreshed server truth with
//! local overrides installed by in-flight mutations. While a mutation is
//! pending its entity's authoritative record is frozen, so a snapshot taken
//! before the server applied the change cannot undo what the operator sees.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use tracing::{debug, trace};

use super::entity::Entity;

/// Handle for settling one optimistic mutation.
///
/// A ticket goes stale when a later mutation on the same entity replaces its
/// override; settling a stale ticket has no effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationTicket<Id> {
    id: Id,
    generation: u64,
}

impl<Id> MutationTicket<Id> {
    /// Returns the entity the mutation targets.
    #[must_use]
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Returns the mutation's generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

struct Override<T: Entity> {
    patch: T::Patch,
    rollback: T::Patch,
    generation: u64,
}

impl<T: Entity> fmt::Debug for Override<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Override")
            .field("patch", &self.patch)
            .field("rollback", &self.rollback)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Merged view of authoritative records and optimistic overrides.
pub struct OptimisticReconciler<T: Entity> {
    authoritative: BTreeMap<T::Id, T>,
    overrides: HashMap<T::Id, Override<T>>,
    pending: HashSet<T::Id>,
    next_generation: u64,
}

impl<T: Entity> Default for OptimisticReconciler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> fmt::Debug for OptimisticReconciler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimisticReconciler")
            .field("records", &self.authoritative.len())
            .field("overrides", &self.overrides)
            .field("pending", &self.pending)
            .finish()
    }
}

impl<T: Entity> OptimisticReconciler<T> {
    /// Creates an empty reconciler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            authoritative: BTreeMap::new(),
            overrides: HashMap::new(),
            pending: HashSet::new(),
            next_generation: 0,
        }
    }

    /// Creates a reconciler seeded with `records`.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = T>) -> Self {
        let mut reconciler = Self::new();
        reconciler.merge_snapshot(records);
        reconciler
    }

    /// Installs an override for `id` and marks it pending.
    ///
    /// Replaces any override already installed for `id`, together with its
    /// rollback values.
    pub fn apply_optimistic(
        &mut self,
        id: T::Id,
        patch: T::Patch,
        rollback: T::Patch,
    ) -> MutationTicket<T::Id> {
        self.next_generation = self.next_generation.wrapping_add(1);
        let generation = self.next_generation;

        if self.overrides.contains_key(&id) {
            debug!(?id, generation, "replacing override");
        }

        self.overrides.insert(
            id.clone(),
            Override {
                patch,
                rollback,
                generation,
            },
        );
        self.pending.insert(id.clone());
        trace!(?id, generation, "override applied");

        MutationTicket { id, generation }
    }

    /// Installs an override whose rollback values are captured from the
    /// current view.
    ///
    /// Returns `None` if `id` has no authoritative record.
    pub fn apply_patch(&mut self, id: T::Id, patch: T::Patch) -> Option<MutationTicket<T::Id>> {
        let rollback = self.get(&id)?.capture(&patch);
        Some(self.apply_optimistic(id, patch, rollback))
    }

    fn current(&self, ticket: &MutationTicket<T::Id>) -> bool {
        self.pending.contains(&ticket.id)
            && self
                .overrides
                .get(&ticket.id)
                .is_some_and(|o| o.generation == ticket.generation)
    }

    /// Settles a successful mutation.
    ///
    /// The entity leaves the pending set. Its override stays visible until
    /// fresh server truth for it arrives. Returns false for a stale ticket.
    pub fn commit(&mut self, ticket: &MutationTicket<T::Id>) -> bool {
        if !self.current(ticket) {
            debug!(id = ?ticket.id, generation = ticket.generation, "ignoring stale commit");
            return false;
        }
        self.pending.remove(&ticket.id);
        trace!(id = ?ticket.id, "mutation committed");
        true
    }

    /// Settles a failed mutation, restoring the pre-mutation values.
    ///
    /// Returns false for a stale ticket.
    pub fn rollback(&mut self, ticket: &MutationTicket<T::Id>) -> bool {
        if !self.current(ticket) {
            debug!(id = ?ticket.id, generation = ticket.generation, "ignoring stale rollback");
            return false;
        }
        if let Some(o) = self.overrides.get_mut(&ticket.id) {
            o.patch = o.rollback.clone();
        }
        self.pending.remove(&ticket.id);
        trace!(id = ?ticket.id, "mutation rolled back");
        true
    }

    /// Replaces the authoritative records with a fresh snapshot.
    ///
    /// Pending entities keep their previous record. Overrides of settled
    /// entities are dropped.
    pub fn merge_snapshot(&mut self, fresh: impl IntoIterator<Item = T>) {
        let mut next: BTreeMap<T::Id, T> = fresh.into_iter().map(|e| (e.id(), e)).collect();

        for id in &self.pending {
            match self.authoritative.remove(id) {
                Some(previous) => {
                    next.insert(id.clone(), previous);
                }
                None => {
                    next.remove(id);
                }
            }
        }

        let pending = &self.pending;
        self.overrides.retain(|id, _| pending.contains(id));
        self.authoritative = next;
        trace!(
            records = self.authoritative.len(),
            pending = self.pending.len(),
            "snapshot merged"
        );
    }

    /// Replaces a single authoritative record.
    ///
    /// Ignored while the entity is pending. Returns true if applied.
    pub fn upsert(&mut self, record: T) -> bool {
        let id = record.id();
        if self.pending.contains(&id) {
            trace!(?id, "upsert deferred, mutation pending");
            return false;
        }
        self.overrides.remove(&id);
        self.authoritative.insert(id, record);
        true
    }

    /// Removes a single authoritative record.
    ///
    /// Ignored while the entity is pending. Returns true if a record was
    /// removed.
    pub fn remove(&mut self, id: &T::Id) -> bool {
        if self.pending.contains(id) {
            return false;
        }
        self.overrides.remove(id);
        self.authoritative.remove(id).is_some()
    }

    fn merged(&self, id: &T::Id, record: &T) -> T {
        let mut view = record.clone();
        if let Some(o) = self.overrides.get(id) {
            view.apply(&o.patch);
        }
        view
    }

    /// Returns the reconciled view, ordered by ID.
    ///
    /// Overrides without an authoritative record are not shown.
    #[must_use]
    pub fn view(&self) -> Vec<T> {
        self.authoritative
            .iter()
            .map(|(id, record)| self.merged(id, record))
            .collect()
    }

    /// Returns the reconciled view of one entity.
    #[must_use]
    pub fn get(&self, id: &T::Id) -> Option<T> {
        self.authoritative
            .get(id)
            .map(|record| self.merged(id, record))
    }

    /// Returns the authoritative record, without overrides.
    #[must_use]
    pub fn authoritative(&self, id: &T::Id) -> Option<&T> {
        self.authoritative.get(id)
    }

    /// Returns true while a mutation on `id` is unsettled.
    #[must_use]
    pub fn is_pending(&self, id: &T::Id) -> bool {
        self.pending.contains(id)
    }

    /// Returns true if an override is installed for `id`.
    #[must_use]
    pub fn has_override(&self, id: &T::Id) -> bool {
        self.overrides.contains_key(id)
    }

    /// Returns the number of unsettled mutations.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns the number of authoritative records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.authoritative.len()
    }

    /// Returns true if there are no authoritative records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.authoritative.is_empty()
    }
}

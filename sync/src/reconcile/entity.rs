//! Entity abstraction for reconciled collections.

use std::fmt::Debug;
use std::hash::Hash;

/// A server-owned record that can be patched field by field.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Record identifier.
    type Id: Clone + Eq + Hash + Ord + Debug + Send + Sync + 'static;

    /// A partial record; `None` fields are left untouched.
    type Patch: Clone + Debug + Send + Sync + 'static;

    /// Returns the record identifier.
    fn id(&self) -> Self::Id;

    /// Shallow-merges a patch on top of this record.
    fn apply(&mut self, patch: &Self::Patch);

    /// Captures this record's current values for every field `patch` touches.
    ///
    /// Applying the result undoes `patch`.
    fn capture(&self, patch: &Self::Patch) -> Self::Patch;
}

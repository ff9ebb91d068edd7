//! Per-call mutable state threaded through recursive codec calls.
//!
//! A [`SerializeCtx`] and a [`DeserializeCtx`] are created fresh per
//! top-level call (or deliberately shared across *sequential* calls for
//! cross-call reference deduplication). They are never ambient or global,
//! which keeps independent calls fully isolated.
//!
//! Under a shared context, identity is cumulative: the serialize side
//! remembers which reference ids were already flushed into earlier
//! payloads' tables, and the deserialize side keeps every id it has
//! resolved so far, so a later payload can point into an earlier one.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{RefcodeError, Result};
use crate::value::{ArrayRef, ObjectRef, Tagged, Value};

/// Rebuild half of a derived subprotocol, shared with pending slots so a
/// deferred projection can be rebuilt once its reference resolves.
pub type RebuildFn = dyn Fn(Value) -> Result<Value>;

/// Serialize-side state: the identity map from already-seen composite
/// values to their assigned reference ids.
///
/// Ids are assigned in first-seen order, 0-based and monotonically
/// increasing. Interned values are pinned in assignment order, which both
/// keeps their `Rc` allocations (and therefore their identity addresses)
/// alive for the duration of the context and lets the reference-table
/// writer drain the table by scanning ids upward until no unwritten
/// identity remains. The flushed watermark records how many ids earlier
/// payloads' tables already carried, so a shared context never re-writes
/// a body.
#[derive(Debug, Default)]
pub struct SerializeCtx {
    ids: HashMap<*const (), u32>,
    pinned: Vec<Value>,
    flushed: usize,
    table_active: bool,
}

impl SerializeCtx {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if no composite identity has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of identities interned so far.
    pub fn len(&self) -> usize {
        self.pinned.len()
    }

    /// Interns a composite value, assigning the next reference id if it
    /// has not been seen before. Returns the value's id, or `None` for
    /// values without identity (non-composites).
    pub fn intern(&mut self, value: &Value) -> Option<u32> {
        let identity = value.identity()?;
        if let Some(id) = self.ids.get(&identity) {
            return Some(*id);
        }
        let id = self.pinned.len() as u32;
        self.ids.insert(identity, id);
        self.pinned.push(value.clone());
        Some(id)
    }

    /// Returns the wire stand-in for a nested value: composites become
    /// [`Value::Ref`] placeholders (interning them if new), everything
    /// else passes through unchanged.
    pub fn ref_for(&mut self, value: &Value) -> Value {
        match self.intern(value) {
            Some(id) => Value::Ref(id),
            None => value.clone(),
        }
    }

    /// The pinned value for reference id `id`, if assigned.
    pub(crate) fn pinned(&self, id: u32) -> Option<&Value> {
        self.pinned.get(id as usize)
    }

    /// True while the root reference table of the current top-level call
    /// is being written. Composites entered in that window are nested.
    pub(crate) fn table_active(&self) -> bool {
        self.table_active
    }

    pub(crate) fn set_table_active(&mut self, active: bool) {
        self.table_active = active;
    }

    /// Number of ids whose bodies earlier tables already carry.
    pub(crate) fn flushed(&self) -> usize {
        self.flushed
    }

    pub(crate) fn set_flushed(&mut self, flushed: usize) {
        self.flushed = flushed;
    }
}

/// The exact position a pending substitution must overwrite.
///
/// Recorded when a decoded field holds a [`Value::Ref`] placeholder;
/// filled in place once the reference table has produced the real object
/// for that id.
#[derive(Clone)]
pub enum PendingSlot {
    /// Element `index` of a decoded array.
    ArrayElem(ArrayRef, usize),
    /// Entry `key` of a decoded object.
    ObjectEntry(ObjectRef, String),
    /// The state of a tagged value whose derived projection was deferred
    /// through the reference table: once the projection resolves, the
    /// rebuild function runs and its result is adopted into the already
    /// embedded wrapper.
    TaggedState {
        /// The wrapper awaiting its state.
        cell: Rc<Tagged>,
        /// The derived subprotocol's rebuild function.
        rebuild: Rc<RebuildFn>,
    },
}

impl PendingSlot {
    /// Overwrites the slot with the resolved value.
    pub fn fill(&self, value: Value) -> Result<()> {
        match self {
            PendingSlot::ArrayElem(rc, index) => {
                let mut items = rc.borrow_mut();
                let slot = items.get_mut(*index).ok_or_else(|| {
                    RefcodeError::Internal(format!(
                        "pending array slot {index} out of bounds"
                    ))
                })?;
                *slot = value;
                Ok(())
            }
            PendingSlot::ObjectEntry(rc, key) => {
                let mut entries = rc.borrow_mut();
                let slot = entries.get_mut(key).ok_or_else(|| {
                    RefcodeError::Internal(format!(
                        "pending object slot {key:?} missing from container"
                    ))
                })?;
                *slot = value;
                Ok(())
            }
            PendingSlot::TaggedState { cell, rebuild } => {
                let rebuilt = (rebuild)(value)?;
                // A rebuilt tagged value contributes its state; anything
                // else becomes the state directly. The wrapper itself is
                // already embedded in its container and cannot be swapped.
                let state = match rebuilt {
                    Value::Tagged(t) => t.state.borrow().clone(),
                    other => other,
                };
                *cell.state.borrow_mut() = state;
                Ok(())
            }
        }
    }
}

// Containers are elided: printing them could recurse through a cyclic
// graph mid-decode.
impl fmt::Debug for PendingSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArrayElem(_, index) => f.debug_tuple("ArrayElem").field(index).finish(),
            Self::ObjectEntry(_, key) => f.debug_tuple("ObjectEntry").field(key).finish(),
            Self::TaggedState { .. } => f.debug_struct("TaggedState").finish_non_exhaustive(),
        }
    }
}

/// Deserialize-side state: the set of pending deref requests plus every
/// reference id resolved so far.
///
/// The resolved map outlives individual payloads on purpose: under a
/// shared context, a later payload's placeholders may point at objects an
/// earlier payload's table produced.
#[derive(Debug, Default)]
pub struct DeserializeCtx {
    pending: Vec<(u32, PendingSlot)>,
    resolved: HashMap<u32, Value>,
}

impl DeserializeCtx {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending substitution for reference id `id`.
    pub fn push_pending(&mut self, id: u32, slot: PendingSlot) {
        self.pending.push((id, slot));
    }

    /// True if no substitutions are outstanding.
    pub fn is_resolved(&self) -> bool {
        self.pending.is_empty()
    }

    /// Takes all accumulated substitutions, leaving the context empty.
    pub fn take_pending(&mut self) -> Vec<(u32, PendingSlot)> {
        std::mem::take(&mut self.pending)
    }

    /// The id of the first outstanding substitution, if any.
    pub fn first_pending_id(&self) -> Option<u32> {
        self.pending.first().map(|(id, _)| *id)
    }

    /// Records the reconstructed object for reference id `id`, returning
    /// the previous occupant if the id was already resolved.
    pub(crate) fn insert_resolved(&mut self, id: u32, value: Value) -> Option<Value> {
        self.resolved.insert(id, value)
    }

    /// The reconstructed object for reference id `id`, if any payload
    /// decoded through this context has produced it.
    pub(crate) fn resolved(&self, id: u32) -> Option<&Value> {
        self.resolved.get(&id)
    }
}

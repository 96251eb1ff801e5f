//! Dirty-state tracking for synchronizable nodes.
//!
//! Every node of the mirrored object graph embeds a [`Model`] header. The
//! header records the node's [`ModelState`], a weak link to the node that
//! owns it, the [`Slot`] it occupies there, and its last list position.
//! Ownership stays with the object graph; the parent link is only used to
//! notify ancestors that something below them changed.

mod state;

pub use state::ModelState;

use std::any::TypeId;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Identity of the place a node occupies inside its parent: the owning
/// structure type and the index of the resolved field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    owner: TypeId,
    field: usize,
}

impl Slot {
    pub fn new(owner: TypeId, field: usize) -> Self {
        Self { owner, field }
    }
}

#[derive(Default)]
struct Link {
    parent: Option<Weak<ModelCell>>,
    slot: Option<Slot>,
}

struct ModelCell {
    state: AtomicU8,
    position: AtomicUsize,
    link: Mutex<Link>,
}

impl ModelCell {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(ModelState::New as u8),
            position: AtomicUsize::new(0),
            link: Mutex::new(Link::default()),
        }
    }

    fn state(&self) -> ModelState {
        ModelState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn store(&self, state: ModelState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: ModelState, to: ModelState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn parent(&self) -> Option<Arc<ModelCell>> {
        self.link().parent.as_ref().and_then(Weak::upgrade)
    }

    fn mark_child_dirty(&self) {
        if self.transition(ModelState::Synced, ModelState::ChildDirty) {
            if let Some(parent) = self.parent() {
                parent.mark_child_dirty();
            }
        }
    }
}

/// Synchronization header embedded in every node.
///
/// A fresh header starts in [`ModelState::New`]. Cloning a header yields a
/// fresh header as well, so a cloned node is sent as a new insertion rather
/// than sharing the source node's identity.
pub struct Model {
    cell: Arc<ModelCell>,
}

impl Model {
    pub fn new() -> Self {
        Self {
            cell: Arc::new(ModelCell::new()),
        }
    }

    /// Current synchronization state.
    pub fn state(&self) -> ModelState {
        self.cell.state()
    }

    /// Record that this node's own fields changed.
    ///
    /// A synced node becomes dirty and its ancestors learn that a child
    /// changed. Any other state is left alone.
    pub fn mark_dirty(&self) {
        if self.cell.transition(ModelState::Synced, ModelState::Dirty) {
            if let Some(parent) = self.cell.parent() {
                parent.mark_child_dirty();
            }
        }
    }

    /// Record that a descendant changed. Only affects synced nodes.
    pub fn mark_child_dirty(&self) {
        self.cell.mark_child_dirty();
    }

    /// Mark this node as matching the client. Ancestors and descendants are
    /// not touched.
    pub fn mark_synced(&self) {
        self.cell.store(ModelState::Synced);
    }

    pub(crate) fn mark_new(&self) {
        self.cell.store(ModelState::New);
    }

    /// Compare the recorded owner and slot with where the node is found now.
    ///
    /// A node found somewhere else than where it was last sent is forced back
    /// to [`ModelState::New`]. A new node simply adopts the new location.
    /// Returns the resulting state.
    pub fn test_and_reparent(&self, parent: Option<&Model>, slot: Option<Slot>) -> ModelState {
        let mut link = self.cell.link();
        let state = self.cell.state();
        let same_parent = match (&link.parent, parent) {
            (None, None) => true,
            (Some(current), Some(parent)) => {
                std::ptr::eq(current.as_ptr(), Arc::as_ptr(&parent.cell))
            }
            _ => false,
        };
        if state != ModelState::New && same_parent && link.slot == slot {
            return state;
        }
        link.parent = parent.map(|p| Arc::downgrade(&p.cell));
        link.slot = slot;
        if state != ModelState::New {
            self.cell.store(ModelState::New);
        }
        ModelState::New
    }

    /// Record the node's position inside its list and return the previous one.
    pub fn swap_position(&self, position: usize) -> usize {
        self.cell.position.swap(position, Ordering::AcqRel)
    }

    /// Whether the node currently has a live parent.
    pub fn has_parent(&self) -> bool {
        self.cell.parent().is_some()
    }

    /// Address of the shared cell, stable for the node's lifetime.
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.cell) as usize
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Model {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("state", &self.state())
            .field("position", &self.cell.position.load(Ordering::Acquire))
            .finish()
    }
}

/// A type that carries a [`Model`] header.
pub trait Node {
    fn model(&self) -> &Model;

    fn mark_dirty(&self) {
        self.model().mark_dirty();
    }

    fn model_state(&self) -> ModelState {
        self.model().state()
    }
}

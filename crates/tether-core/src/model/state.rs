//! Synchronization states of a node.

/// Synchronization state of one node.
///
/// - NEW: never sent, or moved since it was last sent
/// - DIRTY: own fields changed since the last sync
/// - CHILD_DIRTY: only descendants changed
/// - SYNCED: the client mirror matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ModelState {
    New = 0,
    Dirty = 1,
    ChildDirty = 2,
    Synced = 3,
}

impl ModelState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ModelState::New,
            1 => ModelState::Dirty,
            2 => ModelState::ChildDirty,
            _ => ModelState::Synced,
        }
    }

    /// Whether the node's own fields need to be sent.
    pub fn has_own_changes(&self) -> bool {
        matches!(self, ModelState::New | ModelState::Dirty)
    }
}

impl std::fmt::Display for ModelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelState::New => write!(f, "NEW"),
            ModelState::Dirty => write!(f, "DIRTY"),
            ModelState::ChildDirty => write!(f, "CHILD_DIRTY"),
            ModelState::Synced => write!(f, "SYNCED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip_through_u8() {
        for state in [
            ModelState::New,
            ModelState::Dirty,
            ModelState::ChildDirty,
            ModelState::Synced,
        ] {
            assert_eq!(ModelState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ModelState::ChildDirty.to_string(), "CHILD_DIRTY");
    }
}

//! Entity handles and handle allocation.
//!
//! An [`EntityHandle`] is an opaque integer naming an object held by a
//! worker (a star, a particle, a grid cell) within one worker session. The
//! worker allocates handles; the controller only ever stores and echoes them.

use serde::{Deserialize, Serialize};

/// An opaque identifier for a worker-held entity.
///
/// Handles are the `index_of_the_particle` / `index_of_the_star` values of
/// the worker protocol and travel as int32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityHandle(pub i32);

impl EntityHandle {
    /// Create a handle from a raw identifier.
    #[must_use]
    pub const fn from_raw(id: i32) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn id(self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Allocates monotonically increasing handles, starting at 1.
///
/// Used on the worker side. Deleted handles are never reissued within a
/// session, so a stale handle can always be told apart from a live one.
#[derive(Debug)]
pub struct HandleAllocator {
    next_id: i32,
}

impl HandleAllocator {
    /// Creates a new allocator.
    #[must_use]
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Allocates a fresh handle.
    pub fn allocate(&mut self) -> EntityHandle {
        let id = self.next_id;
        self.next_id += 1;
        EntityHandle(id)
    }

    /// Returns the number of handles allocated so far.
    #[must_use]
    pub fn count(&self) -> usize {
        (self.next_id - 1) as usize
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_starts_at_one() {
        let mut alloc = HandleAllocator::new();
        let handles: Vec<i32> = (0..3).map(|_| alloc.allocate().id()).collect();
        assert_eq!(handles, vec![1, 2, 3]);
        assert_eq!(alloc.count(), 3);
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(EntityHandle::from_raw(7).to_string(), "#7");
    }

    #[test]
    fn test_handle_serialization_roundtrip() {
        let handle = EntityHandle::from_raw(42);
        let bytes = rmp_serde::to_vec(&handle).unwrap();
        let restored: EntityHandle = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(handle, restored);
    }
}

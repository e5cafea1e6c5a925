//! Debug-only reentrancy guard.
//!
//! The digest, equality, and allocation capabilities run while the map
//! may be mid-mutation, and the contract forbids them from calling back
//! into the same map. In debug builds this guard turns a violation into
//! an immediate panic at the public entry point; in release builds it
//! compiles away entirely.

#[cfg(debug_assertions)]
use core::cell::Cell;
use core::marker::PhantomData;
#[cfg(debug_assertions)]
use std::rc::Rc;

/// Per-map reentry flag. Public entry points take
/// `let _g = self.reentrancy.enter();` before running any capability.
///
/// The flag is shared by `Rc` rather than borrowed, so the returned
/// guard carries no borrow of the map: entry points stay free to call
/// `&mut self` helpers while the guard is live.
#[derive(Debug, Default)]
pub(crate) struct DebugReentrancy {
    #[cfg(debug_assertions)]
    busy: Rc<Cell<bool>>,
    // Marker keeping the guard (and anything embedding it) !Send + !Sync,
    // matching the crate's single-threaded contract.
    _single_thread: PhantomData<*mut ()>,
}

impl DebugReentrancy {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Mark the map busy for the duration of the returned guard. Panics in
    /// debug builds if the map is already inside a public operation.
    #[inline]
    pub(crate) fn enter(&self) -> ReentrancyGuard {
        #[cfg(debug_assertions)]
        {
            assert!(
                !self.busy.replace(true),
                "capability re-entered the map during an operation"
            );
            return ReentrancyGuard {
                busy: Rc::clone(&self.busy),
            };
        }

        #[cfg(not(debug_assertions))]
        {
            return ReentrancyGuard {
                _single_thread: PhantomData,
            };
        }
    }
}

/// RAII guard; clears the busy flag on drop (including unwind).
pub(crate) struct ReentrancyGuard {
    #[cfg(debug_assertions)]
    busy: Rc<Cell<bool>>,
    #[cfg(not(debug_assertions))]
    _single_thread: PhantomData<*mut ()>,
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.busy.set(false);
    }
}

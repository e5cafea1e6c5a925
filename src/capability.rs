//! Per-instance capability bundle: digest, equality, and allocation.
//!
//! A map stores one `Capabilities` value fixed at construction. All three
//! slots default to the bundled behavior (`city64`, raw byte equality,
//! the host heap) and can be overridden builder-style. Capabilities are
//! shared `Rc` trait objects so a deep copy of a map reuses the source's
//! bundle, the same way the C-style ancestor shared function pointers;
//! this also keeps the whole crate `!Send`/`!Sync`.
//!
//! Capabilities run synchronously on the caller's thread, possibly while
//! the map is mid-mutation, and must not re-enter the map (enforced by a
//! debug-only guard at the map's entry points).

use crate::digest::city64;
use std::rc::Rc;

/// Digest capability: full key bytes in, 64-bit digest out.
pub type DigestFn = Rc<dyn Fn(&[u8]) -> u64>;

/// Equality capability, called as `(stored, probe)`. Applied to keys
/// during probing and to stored values by `contains_value`; both sides
/// always have the corresponding declared length.
pub type EqFn = Rc<dyn Fn(&[u8], &[u8]) -> bool>;

/// Allocation capability. The map requests every owned buffer and every
/// bucket-array growth through this trait; refusal surfaces to the caller
/// as `MapError::AllocationFailure` with the map untouched. Release is
/// `Drop` on the returned buffers.
pub trait Allocator {
    /// Produce an owned buffer of exactly `len` bytes (contents are
    /// overwritten by the map before use). `None` refuses the allocation.
    fn alloc_bytes(&self, len: usize) -> Option<Box<[u8]>>;

    /// Approve a bucket array of `buckets` chain heads. `false` refuses,
    /// which aborts the construction or resize before any state changes.
    fn alloc_table(&self, buckets: usize) -> bool;
}

/// Default allocator: ordinary host heap, never refuses.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAlloc;

impl Allocator for HeapAlloc {
    fn alloc_bytes(&self, len: usize) -> Option<Box<[u8]>> {
        Some(vec![0u8; len].into_boxed_slice())
    }

    fn alloc_table(&self, _buckets: usize) -> bool {
        true
    }
}

/// The bundle handed to `RawHashMap::with_capabilities`. Cloning shares
/// the underlying capabilities (Rc clones), it does not duplicate them.
#[derive(Clone)]
pub struct Capabilities {
    pub(crate) digest: DigestFn,
    pub(crate) eq: EqFn,
    pub(crate) alloc: Rc<dyn Allocator>,
}

impl Capabilities {
    /// All defaults: `city64`, byte equality, host heap.
    pub fn new() -> Self {
        Self {
            digest: Rc::new(city64),
            eq: Rc::new(|stored: &[u8], probe: &[u8]| stored == probe),
            alloc: Rc::new(HeapAlloc),
        }
    }

    /// Override the digest function (e.g. `djb2_64`, or a caller-specific
    /// digest over a composite key layout).
    pub fn with_digest(mut self, f: impl Fn(&[u8]) -> u64 + 'static) -> Self {
        self.digest = Rc::new(f);
        self
    }

    /// Override equality. Receives `(stored, probe)`.
    pub fn with_equality(mut self, f: impl Fn(&[u8], &[u8]) -> bool + 'static) -> Self {
        self.eq = Rc::new(f);
        self
    }

    /// Override the allocator.
    pub fn with_allocator(mut self, a: impl Allocator + 'static) -> Self {
        self.alloc = Rc::new(a);
        self
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // Trait objects have no useful Debug; identity is what matters.
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}

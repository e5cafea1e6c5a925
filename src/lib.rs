//! raw-hashmap: a single-threaded, separate-chaining hash map over
//! fixed-length opaque byte keys and values, with pluggable digest,
//! equality, and allocation capabilities.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: an embeddable byte-oriented map usable where the element types
//!   are only known as "N key bytes, M value bytes", built in small,
//!   independently verifiable layers.
//! - Layers:
//!   - digest: the bundled 64-bit digest functions, `city64` (the
//!     CityHash64-compatible default, fixed test vector on empty input)
//!     and `djb2_64` (trivial multiplicative fallback).
//!   - capability: the per-instance bundle of digest, equality, and
//!     allocation overrides. Defaults are `city64`, raw byte equality,
//!     and the host heap.
//!   - BucketTable: structural layer. An entry arena (slotmap) plus a
//!     power-of-two array of chain heads; find/prepend/unlink/rehash
//!     with no growth or equality policy of its own.
//!   - RawHashMap: policy layer. Load-factor doubling, the "no key"
//!     slot, length validation, error taxonomy, iteration, deep copy.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync` by design (capabilities are
//!   `Rc<dyn Fn>` trait objects, no atomics anywhere).
//! - Keys and values are copied in as opaque byte blocks of the declared
//!   lengths; keys are never rewritten after insertion, values are
//!   overwritten in place on re-assignment.
//! - Capacity is always a power of two and at least 8; buckets are
//!   selected by `digest & (capacity - 1)`.
//! - Every fallible operation returns `Result<_, MapError>`; failures
//!   leave the map in its last good state, never partially applied.
//!
//! Why this split?
//! - Localize invariants: BucketTable guarantees chain consistency and a
//!   relink-only rehash; RawHashMap alone decides when to grow and what
//!   counts as an error; neither layer reaches into the other's state.
//! - Clear failure boundaries: every allocation is approved by the
//!   allocation capability before any structure is touched, so a refused
//!   resize or entry allocation is a strict no-op.
//!
//! Reentrancy policy
//! - The digest, equality, and allocation capabilities run synchronously
//!   during probing and resizing, while internal state may be transiently
//!   inconsistent. They must not re-enter the map. A debug-only guard at
//!   each public entry point panics on nested entry; in release builds it
//!   compiles to nothing.
//!
//! Digest invariants
//! - Each entry caches the `u64` digest of its key at insertion time and
//!   every rehash indexes by the cached value; the digest capability is
//!   never re-invoked for stored keys, so a resize runs no user code
//!   beyond the table-allocation gate.
//!
//! Notes and non-goals
//! - No persistence, no concurrent mutation, no cryptographic strength,
//!   no variable-length keys, no eviction.
//! - Iteration order (no-key slot first, then bucket index, then chain)
//!   is unspecified and changes across resizes; callers must not depend
//!   on insertion order.

mod bucket_table;
pub mod capability;
pub mod digest;
mod raw_hash_map;
mod raw_hash_map_proptest;
mod reentrancy;

// Public surface
pub use capability::{Allocator, Capabilities, DigestFn, EqFn, HeapAlloc};
pub use digest::{city64, djb2_64};
pub use raw_hash_map::{
    Iter, Keys, MapError, RawHashMap, Values, ValuesMut, MAX_CAPACITY, MIN_CAPACITY,
};

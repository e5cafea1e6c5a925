//! RawHashMap: policy layer over BucketTable, owning growth, the no-key
//! slot, length validation, error taxonomy, iteration, and deep copy.

use crate::bucket_table::{BucketTable, TableIter, TableValuesMut};
use crate::capability::Capabilities;
use crate::reentrancy::DebugReentrancy;
use core::fmt;

/// Smallest capacity a map ever has; initial requests are clamped up.
pub const MIN_CAPACITY: usize = 8;
/// Doubling into this bound (or reserving up to half of it) fails with
/// `CapacityOverflow`.
pub const MAX_CAPACITY: usize = usize::MAX / 2 + 1;

const LOAD_THRESHOLD: f64 = 0.75;

/// Failure taxonomy. Resource errors (`AllocationFailure`,
/// `CapacityOverflow`) are recoverable; usage errors (`NotFound`,
/// `InvalidOperation`) indicate caller misuse. Either way the map is left
/// in its last good state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// The allocation capability refused a buffer or bucket-array request.
    AllocationFailure,
    /// Growth (doubling or reserve) would exceed the representable maximum.
    CapacityOverflow,
    /// No entry matches the queried key.
    NotFound,
    /// Reserve to a non-larger capacity, zero-length configuration, or a
    /// probe whose length differs from the declared length.
    InvalidOperation,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            MapError::AllocationFailure => "allocation capability refused the request",
            MapError::CapacityOverflow => "growth would exceed the maximum capacity",
            MapError::NotFound => "no entry matches the key",
            MapError::InvalidOperation => "invalid operation for the current state",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for MapError {}

/// Separate-chaining hash map from fixed-length opaque byte keys (plus one
/// distinguished no-key slot) to fixed-length opaque byte values.
///
/// Keys are addressed by `digest & (capacity - 1)` with the digest cached
/// per entry; collision chains are scanned linearly under the equality
/// capability. Capacity doubles when the load factor reaches 0.75, by
/// relinking entries, never by copying them.
pub struct RawHashMap {
    table: BucketTable,
    nil_value: Option<Box<[u8]>>,
    key_len: usize,
    value_len: usize,
    caps: Capabilities,
    reentrancy: DebugReentrancy,
}

impl RawHashMap {
    /// Map with default capabilities (`city64`, byte equality, host heap).
    ///
    /// `capacity` is clamped to at least [`MIN_CAPACITY`] and rounded up to
    /// a power of two. Zero `key_len` or `value_len` is an invalid
    /// configuration.
    pub fn new(capacity: usize, key_len: usize, value_len: usize) -> Result<Self, MapError> {
        Self::with_capabilities(capacity, key_len, value_len, Capabilities::default())
    }

    /// Map with an explicit capability bundle.
    pub fn with_capabilities(
        capacity: usize,
        key_len: usize,
        value_len: usize,
        caps: Capabilities,
    ) -> Result<Self, MapError> {
        if key_len == 0 || value_len == 0 {
            return Err(MapError::InvalidOperation);
        }
        if capacity >= MAX_CAPACITY {
            return Err(MapError::CapacityOverflow);
        }
        let capacity = if capacity <= MIN_CAPACITY {
            MIN_CAPACITY
        } else {
            capacity.next_power_of_two()
        };
        if capacity >= MAX_CAPACITY {
            return Err(MapError::CapacityOverflow);
        }
        if !caps.alloc.alloc_table(capacity) {
            return Err(MapError::AllocationFailure);
        }
        Ok(Self {
            table: BucketTable::with_buckets(capacity),
            nil_value: None,
            key_len,
            value_len,
            caps,
            reentrancy: DebugReentrancy::new(),
        })
    }

    /// Live entries, counting the no-key slot.
    pub fn len(&self) -> usize {
        self.table.len() + usize::from(self.nil_value.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bucket count; always a power of two ≥ [`MIN_CAPACITY`].
    pub fn capacity(&self) -> usize {
        self.table.buckets()
    }

    /// Current load factor, `len / capacity`.
    pub fn load(&self) -> f64 {
        self.len() as f64 / self.capacity() as f64
    }

    /// Declared key length in bytes.
    pub fn key_len(&self) -> usize {
        self.key_len
    }

    /// Declared value length in bytes.
    pub fn value_len(&self) -> usize {
        self.value_len
    }

    fn check_key(&self, key: &[u8]) -> Result<(), MapError> {
        if key.len() != self.key_len {
            return Err(MapError::InvalidOperation);
        }
        Ok(())
    }

    fn check_value(&self, value: &[u8]) -> Result<(), MapError> {
        if value.len() != self.value_len {
            return Err(MapError::InvalidOperation);
        }
        Ok(())
    }

    fn alloc_exact(&self, len: usize) -> Result<Box<[u8]>, MapError> {
        match self.caps.alloc.alloc_bytes(len) {
            Some(buf) if buf.len() == len => Ok(buf),
            _ => Err(MapError::AllocationFailure),
        }
    }

    /// Gate the new bucket array through the allocation capability, then
    /// relink. Split this way so a refused grow is a strict no-op.
    fn grow_to(&mut self, new_capacity: usize) -> Result<(), MapError> {
        if !self.caps.alloc.alloc_table(new_capacity) {
            return Err(MapError::AllocationFailure);
        }
        self.table.rehash(new_capacity);
        Ok(())
    }

    /// Insert or update a mapping. `None` addresses the no-key slot.
    ///
    /// If the load factor has reached 0.75 the capacity doubles first
    /// (`CapacityOverflow` if doubling reaches the maximum,
    /// `AllocationFailure` if the bucket array is refused; the map is
    /// unchanged in both cases). A matching key has its value overwritten
    /// in place; the stored key bytes are never touched and `len` does
    /// not change. A new key is copied in and prepended to its chain,
    /// newest-first.
    pub fn assign(&mut self, key: Option<&[u8]>, value: &[u8]) -> Result<(), MapError> {
        let _g = self.reentrancy.enter();
        self.check_value(value)?;
        if let Some(key) = key {
            self.check_key(key)?;
        }
        if self.load() >= LOAD_THRESHOLD {
            let doubled = self.capacity() << 1;
            if doubled >= MAX_CAPACITY {
                return Err(MapError::CapacityOverflow);
            }
            self.grow_to(doubled)?;
        }
        match key {
            None => self.assign_nil(value),
            Some(key) => self.assign_keyed(key, value),
        }
    }

    fn assign_nil(&mut self, value: &[u8]) -> Result<(), MapError> {
        if let Some(slot) = self.nil_value.as_mut() {
            slot.copy_from_slice(value);
            return Ok(());
        }
        let mut buf = self.alloc_exact(self.value_len)?;
        buf.copy_from_slice(value);
        self.nil_value = Some(buf);
        Ok(())
    }

    fn assign_keyed(&mut self, key: &[u8], value: &[u8]) -> Result<(), MapError> {
        let digest = (self.caps.digest)(key);
        if let Some(slot) = self.table.find(digest, key, self.caps.eq.as_ref()) {
            self.table.value_mut(slot).copy_from_slice(value);
            return Ok(());
        }
        // New entry: secure both buffers before touching the table so a
        // refused allocation leaves the map unchanged.
        let mut key_buf = self.alloc_exact(self.key_len)?;
        key_buf.copy_from_slice(key);
        let mut value_buf = self.alloc_exact(self.value_len)?;
        value_buf.copy_from_slice(value);
        self.table.push_front(digest, key_buf, value_buf);
        Ok(())
    }

    /// Borrow the value mapped to `key`; `NotFound` if absent.
    pub fn query(&self, key: Option<&[u8]>) -> Result<&[u8], MapError> {
        let _g = self.reentrancy.enter();
        match key {
            None => self.nil_value.as_deref().ok_or(MapError::NotFound),
            Some(key) => {
                self.check_key(key)?;
                let digest = (self.caps.digest)(key);
                let slot = self
                    .table
                    .find(digest, key, self.caps.eq.as_ref())
                    .ok_or(MapError::NotFound)?;
                Ok(self.table.value(slot))
            }
        }
    }

    /// Remove the mapping for `key` and return its owned value buffer;
    /// `NotFound` if absent.
    pub fn remove(&mut self, key: Option<&[u8]>) -> Result<Box<[u8]>, MapError> {
        let _g = self.reentrancy.enter();
        match key {
            None => self.nil_value.take().ok_or(MapError::NotFound),
            Some(key) => {
                self.check_key(key)?;
                let digest = (self.caps.digest)(key);
                self.table
                    .unlink(digest, key, self.caps.eq.as_ref())
                    .ok_or(MapError::NotFound)
            }
        }
    }

    /// Whether `key` (or the no-key slot, for `None`) is present. A probe
    /// of the wrong length cannot be present.
    pub fn contains_key(&self, key: Option<&[u8]>) -> bool {
        let _g = self.reentrancy.enter();
        match key {
            None => self.nil_value.is_some(),
            Some(key) => {
                key.len() == self.key_len && {
                    let digest = (self.caps.digest)(key);
                    self.table.find(digest, key, self.caps.eq.as_ref()).is_some()
                }
            }
        }
    }

    /// Count how many live entries (the no-key slot included) store a
    /// value equal to `value` under the equality capability. A full
    /// O(len) scan; note the count return, not a boolean.
    pub fn contains_value(&self, value: &[u8]) -> usize {
        let _g = self.reentrancy.enter();
        if value.len() != self.value_len {
            return 0;
        }
        let eq = self.caps.eq.as_ref();
        let mut count = usize::from(self.nil_value.as_deref().is_some_and(|v| eq(v, value)));
        for (_, stored) in self.table.iter() {
            if eq(stored, value) {
                count += 1;
            }
        }
        count
    }

    /// Grow-only reservation. Rounds `capacity` up to the next power of
    /// two and rehashes, preserving every pair. `InvalidOperation` if
    /// `capacity` is not larger than the current capacity.
    pub fn reserve(&mut self, capacity: usize) -> Result<(), MapError> {
        let _g = self.reentrancy.enter();
        if capacity <= self.capacity() {
            return Err(MapError::InvalidOperation);
        }
        if capacity >= MAX_CAPACITY >> 1 {
            return Err(MapError::CapacityOverflow);
        }
        let new_capacity = capacity.next_power_of_two();
        self.grow_to(new_capacity)
    }

    /// Deep copy: a fresh map with this map's capacity, lengths, and
    /// capability bundle, every key and value byte sequence duplicated.
    /// The two maps never alias entries or buffers afterwards.
    ///
    /// Named `try_clone` because the copy allocates through the
    /// allocation capability and must be able to report
    /// `AllocationFailure`, which `Clone::clone` cannot.
    pub fn try_clone(&self) -> Result<Self, MapError> {
        let _g = self.reentrancy.enter();
        let mut dst =
            Self::with_capabilities(self.capacity(), self.key_len, self.value_len, self.caps.clone())?;
        if let Some(v) = self.nil_value.as_deref() {
            dst.assign(None, v)?;
        }
        for (k, v) in self.table.iter() {
            dst.assign(Some(k), v)?;
        }
        Ok(dst)
    }

    /// Drop every entry and the no-key slot. Capacity and bucket array
    /// are unchanged.
    pub fn clear(&mut self) {
        let _g = self.reentrancy.enter();
        self.nil_value = None;
        self.table.clear();
    }

    /// Visit every live pair exactly once: the no-key slot first (key
    /// `None`), then bucket-index order, then chain order. The order is
    /// unspecified and changes across resizes.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            nil: self.nil_value.as_deref(),
            table: self.table.iter(),
        }
    }

    /// Keys in iteration order; the no-key slot appears as `None`.
    pub fn keys(&self) -> Keys<'_> {
        Keys(self.iter())
    }

    /// Values in iteration order.
    pub fn values(&self) -> Values<'_> {
        Values(self.iter())
    }

    /// Mutable access to every stored value, no-key slot included. The
    /// yielded slices have the declared value length and cannot be
    /// resized; iteration order is unspecified.
    pub fn values_mut(&mut self) -> ValuesMut<'_> {
        ValuesMut {
            nil: self.nil_value.as_deref_mut(),
            table: self.table.values_mut(),
        }
    }
}

impl fmt::Debug for RawHashMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawHashMap")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("key_len", &self.key_len)
            .field("value_len", &self.value_len)
            .finish_non_exhaustive()
    }
}

/// Iterator over `(key, value)` pairs; the no-key slot yields `None`.
pub struct Iter<'a> {
    nil: Option<&'a [u8]>,
    table: TableIter<'a>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (Option<&'a [u8]>, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(v) = self.nil.take() {
            return Some((None, v));
        }
        self.table.next().map(|(k, v)| (Some(k), v))
    }
}

/// Iterator over keys.
pub struct Keys<'a>(Iter<'a>);

impl<'a> Iterator for Keys<'a> {
    type Item = Option<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(k, _)| k)
    }
}

/// Iterator over values.
pub struct Values<'a>(Iter<'a>);

impl<'a> Iterator for Values<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(_, v)| v)
    }
}

/// Iterator over mutable value slices.
pub struct ValuesMut<'a> {
    nil: Option<&'a mut [u8]>,
    table: TableValuesMut<'a>,
}

impl<'a> Iterator for ValuesMut<'a> {
    type Item = &'a mut [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(v) = self.nil.take() {
            return Some(v);
        }
        self.table.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Allocator, Capabilities};
    use crate::digest::djb2_64;
    use std::cell::Cell;

    fn key4(i: u32) -> [u8; 4] {
        i.to_le_bytes()
    }

    fn val4(i: u32) -> [u8; 4] {
        i.to_le_bytes()
    }

    /// Invariant: query returns the value of the most recent assign for a
    /// key; re-assigning overwrites in place without changing len.
    #[test]
    fn assign_query_overwrite() {
        let mut m = RawHashMap::new(8, 4, 4).unwrap();
        m.assign(Some(&key4(1)), &val4(10)).unwrap();
        m.assign(Some(&key4(2)), &val4(20)).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.query(Some(&key4(1))), Ok(&val4(10)[..]));

        m.assign(Some(&key4(1)), &val4(99)).unwrap();
        assert_eq!(m.len(), 2, "re-assign must not grow the map");
        assert_eq!(m.query(Some(&key4(1))), Ok(&val4(99)[..]));
        assert_eq!(m.query(Some(&key4(2))), Ok(&val4(20)[..]));
    }

    /// Invariant: capacity is clamped to 8, stays a power of two, and the
    /// load factor never exceeds 0.75 after an assign completes.
    #[test]
    fn capacity_clamp_and_load_bound() {
        let m = RawHashMap::new(0, 4, 4).unwrap();
        assert_eq!(m.capacity(), 8);
        let m = RawHashMap::new(9, 4, 4).unwrap();
        assert_eq!(m.capacity(), 16);

        let mut m = RawHashMap::new(8, 4, 4).unwrap();
        for i in 0..100 {
            m.assign(Some(&key4(i)), &val4(i * 10)).unwrap();
            assert!(m.capacity().is_power_of_two());
            assert!(m.load() <= 0.75, "load {} after {} inserts", m.load(), i + 1);
        }
    }

    /// Invariant: remove returns the stored value, decrements len, and a
    /// subsequent query/remove reports NotFound.
    #[test]
    fn remove_then_not_found() {
        let mut m = RawHashMap::new(8, 4, 4).unwrap();
        for i in 0..10 {
            m.assign(Some(&key4(i)), &val4(i + 100)).unwrap();
        }
        let out = m.remove(Some(&key4(3))).unwrap();
        assert_eq!(&out[..], &val4(103));
        assert_eq!(m.len(), 9);
        assert_eq!(m.query(Some(&key4(3))), Err(MapError::NotFound));
        assert_eq!(m.remove(Some(&key4(3))).unwrap_err(), MapError::NotFound);
        assert!(!m.contains_key(Some(&key4(3))));
        // The rest are untouched.
        assert_eq!(m.query(Some(&key4(4))), Ok(&val4(104)[..]));
    }

    /// Invariant: the no-key slot is a single slot, independent of every
    /// ordinary key, even ones forced into bucket 0 by a constant digest.
    #[test]
    fn nil_slot_independent_of_bucket_zero() {
        let caps = Capabilities::new().with_digest(|_| 0);
        let mut m = RawHashMap::with_capabilities(8, 4, 4, caps).unwrap();

        m.assign(None, &val4(1)).unwrap();
        m.assign(Some(&key4(7)), &val4(2)).unwrap();
        m.assign(Some(&key4(8)), &val4(3)).unwrap();
        assert_eq!(m.len(), 3);
        assert_eq!(m.query(None), Ok(&val4(1)[..]));
        assert_eq!(m.query(Some(&key4(7))), Ok(&val4(2)[..]));

        // Overwriting the slot does not disturb bucket-0 entries.
        m.assign(None, &val4(9)).unwrap();
        assert_eq!(m.len(), 3);
        assert_eq!(m.query(None), Ok(&val4(9)[..]));

        // Removing the slot leaves the colliding keys alone.
        assert_eq!(&m.remove(None).unwrap()[..], &val4(9));
        assert_eq!(m.query(None), Err(MapError::NotFound));
        assert!(!m.contains_key(None));
        assert_eq!(m.query(Some(&key4(7))), Ok(&val4(2)[..]));
        assert_eq!(m.query(Some(&key4(8))), Ok(&val4(3)[..]));
    }

    /// Invariant: zero-length key or value configuration is rejected at
    /// construction.
    #[test]
    fn zero_length_config_rejected() {
        assert_eq!(
            RawHashMap::new(8, 0, 4).unwrap_err(),
            MapError::InvalidOperation
        );
        assert_eq!(
            RawHashMap::new(8, 4, 0).unwrap_err(),
            MapError::InvalidOperation
        );
    }

    /// Invariant: probes with the wrong declared length are usage errors
    /// (or trivially absent) and never touch the map.
    #[test]
    fn wrong_length_probes() {
        let mut m = RawHashMap::new(8, 4, 4).unwrap();
        m.assign(Some(&key4(1)), &val4(1)).unwrap();

        assert_eq!(
            m.assign(Some(&[1, 2, 3]), &val4(1)).unwrap_err(),
            MapError::InvalidOperation
        );
        assert_eq!(
            m.assign(Some(&key4(2)), &[1, 2, 3]).unwrap_err(),
            MapError::InvalidOperation
        );
        assert_eq!(
            m.query(Some(&[1, 2, 3])).unwrap_err(),
            MapError::InvalidOperation
        );
        assert!(!m.contains_key(Some(&[1, 2, 3])));
        assert_eq!(m.contains_value(&[1, 2, 3]), 0);
        assert_eq!(m.len(), 1);
    }

    /// Invariant: contains_value returns a count of matches across all
    /// chains and the no-key slot, not a boolean.
    #[test]
    fn contains_value_counts() {
        let mut m = RawHashMap::new(8, 4, 4).unwrap();
        m.assign(Some(&key4(1)), &val4(50)).unwrap();
        m.assign(Some(&key4(2)), &val4(50)).unwrap();
        m.assign(Some(&key4(3)), &val4(60)).unwrap();
        m.assign(None, &val4(50)).unwrap();

        assert_eq!(m.contains_value(&val4(50)), 3);
        assert_eq!(m.contains_value(&val4(60)), 1);
        assert_eq!(m.contains_value(&val4(61)), 0);
    }

    /// Invariant: reserve is grow-only, preserves every pair, and reports
    /// CapacityOverflow for requests at the representable ceiling.
    #[test]
    fn reserve_semantics() {
        let mut m = RawHashMap::new(8, 4, 4).unwrap();
        for i in 0..5 {
            m.assign(Some(&key4(i)), &val4(i)).unwrap();
        }
        assert_eq!(m.reserve(8).unwrap_err(), MapError::InvalidOperation);
        assert_eq!(m.reserve(4).unwrap_err(), MapError::InvalidOperation);
        assert_eq!(m.capacity(), 8);

        m.reserve(100).unwrap();
        assert_eq!(m.capacity(), 128);
        assert_eq!(m.len(), 5);
        for i in 0..5 {
            assert_eq!(m.query(Some(&key4(i))), Ok(&val4(i)[..]));
        }

        assert_eq!(
            m.reserve(MAX_CAPACITY >> 1).unwrap_err(),
            MapError::CapacityOverflow
        );
        assert_eq!(m.capacity(), 128);
    }

    // Allocator that approves a fixed number of requests, then refuses.
    struct BudgetAlloc {
        remaining: Cell<usize>,
    }

    impl BudgetAlloc {
        fn new(requests: usize) -> Self {
            Self {
                remaining: Cell::new(requests),
            }
        }

        fn take(&self) -> bool {
            let r = self.remaining.get();
            if r == 0 {
                return false;
            }
            self.remaining.set(r - 1);
            true
        }
    }

    impl Allocator for BudgetAlloc {
        fn alloc_bytes(&self, len: usize) -> Option<Box<[u8]>> {
            self.take().then(|| vec![0u8; len].into_boxed_slice())
        }

        fn alloc_table(&self, _buckets: usize) -> bool {
            self.take()
        }
    }

    /// Invariant: a refused entry allocation fails the assign and leaves
    /// the map exactly as it was (strong exception safety).
    #[test]
    fn refused_entry_allocation_is_noop() {
        // 1 request for the initial table + 2 for the first entry's
        // key/value buffers; the next assign's key buffer is refused.
        let caps = Capabilities::new().with_allocator(BudgetAlloc::new(3));
        let mut m = RawHashMap::with_capabilities(8, 4, 4, caps).unwrap();
        m.assign(Some(&key4(1)), &val4(1)).unwrap();

        assert_eq!(
            m.assign(Some(&key4(2)), &val4(2)).unwrap_err(),
            MapError::AllocationFailure
        );
        assert_eq!(m.len(), 1);
        assert_eq!(m.query(Some(&key4(1))), Ok(&val4(1)[..]));
        assert!(!m.contains_key(Some(&key4(2))));

        // Overwrites need no allocation and still succeed.
        m.assign(Some(&key4(1)), &val4(7)).unwrap();
        assert_eq!(m.query(Some(&key4(1))), Ok(&val4(7)[..]));
    }

    /// Invariant: a refused resize fails the triggering assign and leaves
    /// capacity, len, and every pair untouched.
    #[test]
    fn refused_resize_is_noop() {
        // Initial table + 6 entries * 2 buffers = 13 approvals; the grow
        // triggered at load 6/8 is refused.
        let caps = Capabilities::new().with_allocator(BudgetAlloc::new(13));
        let mut m = RawHashMap::with_capabilities(8, 4, 4, caps).unwrap();
        for i in 0..6 {
            m.assign(Some(&key4(i)), &val4(i)).unwrap();
        }
        assert_eq!(m.capacity(), 8);
        assert_eq!(
            m.assign(Some(&key4(6)), &val4(6)).unwrap_err(),
            MapError::AllocationFailure
        );
        assert_eq!(m.capacity(), 8);
        assert_eq!(m.len(), 6);
        for i in 0..6 {
            assert_eq!(m.query(Some(&key4(i))), Ok(&val4(i)[..]));
        }
    }

    /// Invariant: clear drops everything but keeps the capacity, and the
    /// map remains fully usable.
    #[test]
    fn clear_keeps_capacity() {
        let mut m = RawHashMap::new(8, 4, 4).unwrap();
        for i in 0..50 {
            m.assign(Some(&key4(i)), &val4(i)).unwrap();
        }
        m.assign(None, &val4(0)).unwrap();
        let cap = m.capacity();
        m.clear();
        assert_eq!(m.len(), 0);
        assert!(m.is_empty());
        assert_eq!(m.capacity(), cap);
        assert!(!m.contains_key(None));
        m.assign(Some(&key4(1)), &val4(1)).unwrap();
        assert_eq!(m.len(), 1);
    }

    /// Invariant: try_clone deep-copies; subsequent mutation of either map
    /// never affects the other.
    #[test]
    fn try_clone_is_deeply_isolated() {
        let mut a = RawHashMap::new(8, 4, 4).unwrap();
        for i in 0..20 {
            a.assign(Some(&key4(i)), &val4(i)).unwrap();
        }
        a.assign(None, &val4(999)).unwrap();

        let mut b = a.try_clone().unwrap();
        assert_eq!(b.len(), a.len());
        assert_eq!(b.capacity(), a.capacity());

        b.assign(Some(&key4(0)), &val4(1000)).unwrap();
        b.remove(Some(&key4(1))).unwrap();
        b.assign(Some(&key4(100)), &val4(100)).unwrap();

        assert_eq!(a.query(Some(&key4(0))), Ok(&val4(0)[..]));
        assert_eq!(a.query(Some(&key4(1))), Ok(&val4(1)[..]));
        assert!(!a.contains_key(Some(&key4(100))));

        a.remove(None).unwrap();
        assert_eq!(b.query(None), Ok(&val4(999)[..]));
    }

    /// Invariant: iteration visits each live pair exactly once, no-key
    /// slot first; keys/values project the same sequence.
    #[test]
    fn iteration_visits_each_pair_once() {
        let mut m = RawHashMap::new(8, 4, 4).unwrap();
        for i in 0..30 {
            m.assign(Some(&key4(i)), &val4(i + 1)).unwrap();
        }
        m.assign(None, &val4(0)).unwrap();

        let pairs: Vec<(Option<Vec<u8>>, Vec<u8>)> = m
            .iter()
            .map(|(k, v)| (k.map(<[u8]>::to_vec), v.to_vec()))
            .collect();
        assert_eq!(pairs.len(), 31);
        assert_eq!(pairs[0].0, None, "no-key slot leads the iteration");
        let mut keys: Vec<_> = pairs.iter().filter_map(|(k, _)| k.clone()).collect();
        keys.sort();
        let mut expect: Vec<_> = (0..30).map(|i| key4(i).to_vec()).collect();
        expect.sort();
        assert_eq!(keys, expect);

        assert_eq!(m.keys().count(), 31);
        assert_eq!(m.values().count(), 31);
    }

    /// Invariant: values_mut mutates stored values in place (the no-key
    /// slot included) without touching keys or len.
    #[test]
    fn values_mut_updates_in_place() {
        let mut m = RawHashMap::new(8, 4, 4).unwrap();
        m.assign(Some(&key4(1)), &val4(10)).unwrap();
        m.assign(None, &val4(20)).unwrap();

        for v in m.values_mut() {
            v[0] ^= 0xff;
        }
        assert_eq!(m.len(), 2);
        let mut expected_keyed = val4(10);
        expected_keyed[0] ^= 0xff;
        let mut expected_nil = val4(20);
        expected_nil[0] ^= 0xff;
        assert_eq!(m.query(Some(&key4(1))), Ok(&expected_keyed[..]));
        assert_eq!(m.query(None), Ok(&expected_nil[..]));
    }

    /// Invariant: a custom digest/equality pair drives probing end to end
    /// (here: case-insensitive ASCII keys digested after folding).
    #[test]
    fn custom_digest_and_equality() {
        let caps = Capabilities::new()
            .with_digest(|k| djb2_64(&k.to_ascii_lowercase()))
            .with_equality(|stored, probe| stored.eq_ignore_ascii_case(probe));
        let mut m = RawHashMap::with_capabilities(8, 3, 4, caps).unwrap();

        m.assign(Some(b"KEY"), &val4(1)).unwrap();
        assert!(m.contains_key(Some(b"key")));
        assert_eq!(m.query(Some(b"kEy")), Ok(&val4(1)[..]));

        m.assign(Some(b"key"), &val4(2)).unwrap();
        assert_eq!(m.len(), 1, "case-variant assign must overwrite");
        assert_eq!(m.query(Some(b"KEY")), Ok(&val4(2)[..]));
        // The stored key keeps its original spelling: keys are never
        // rewritten on re-assignment.
        let stored: Vec<_> = m.keys().flatten().map(<[u8]>::to_vec).collect();
        assert_eq!(stored, vec![b"KEY".to_vec()]);
    }

    /// Invariant (debug-only): an equality capability that re-enters the
    /// map during probing panics via the reentrancy guard.
    #[cfg(debug_assertions)]
    #[test]
    fn reentrant_equality_panics() {
        use std::rc::Rc;

        let target: Rc<Cell<*const RawHashMap>> = Rc::new(Cell::new(std::ptr::null()));
        let hook = Rc::clone(&target);
        let caps = Capabilities::new()
            .with_digest(|_| 0) // everything in one chain
            .with_equality(move |stored, probe| {
                let p = hook.get();
                if !p.is_null() {
                    // Re-enter the same map mid-probe.
                    unsafe {
                        let _ = (*p).contains_key(Some(probe));
                    }
                }
                stored == probe
            });
        let mut m = RawHashMap::with_capabilities(8, 4, 4, caps).unwrap();
        // Chain is empty here, so no equality runs during this insert.
        m.assign(Some(&key4(1)), &val4(1)).unwrap();
        target.set(&m as *const _);

        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = m.query(Some(&key4(2)));
        }));
        assert!(res.is_err(), "expected reentrancy to panic in debug builds");

        // The unwind cleared the busy flag; the map works again once the
        // capability stops re-entering.
        target.set(std::ptr::null());
        assert_eq!(m.query(Some(&key4(1))), Ok(&val4(1)[..]));
        m.assign(Some(&key4(3)), &val4(3)).unwrap();
        assert_eq!(m.len(), 2);
    }

    /// Invariant: MapError displays stable human-readable messages and
    /// composes as a std error.
    #[test]
    fn map_error_display() {
        let e: Box<dyn std::error::Error> = Box::new(MapError::NotFound);
        assert_eq!(e.to_string(), "no entry matches the key");
        assert!(MapError::AllocationFailure.to_string().contains("allocation"));
    }
}

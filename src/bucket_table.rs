//! BucketTable: the structural layer, chains of entries behind masked
//! bucket heads, with a relink-only rehash.
//!
//! Entries live in a slotmap arena and chains link slots by `DefaultKey`
//! instead of owned pointers, so relinking during a rehash rewrites
//! `next` links only: the entry allocations and their key/value buffers
//! are never copied or re-derived. This layer has no growth policy and
//! no equality of its own; the policy layer passes equality in per call
//! and decides when (and whether) to resize.

use slotmap::{DefaultKey, SlotMap};

/// One key/value pair with its cached digest and chain link. The digest
/// is computed once at insertion; every rehash indexes by the cache.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    next: Option<DefaultKey>,
    digest: u64,
    key: Box<[u8]>,
    value: Box<[u8]>,
}

#[derive(Debug, Clone)]
pub(crate) struct BucketTable {
    heads: Vec<Option<DefaultKey>>, // length is the capacity, a power of two
    slots: SlotMap<DefaultKey, Entry>,
}

impl BucketTable {
    /// `buckets` must be a power of two (policy layer's invariant).
    pub(crate) fn with_buckets(buckets: usize) -> Self {
        debug_assert!(buckets.is_power_of_two());
        Self {
            heads: vec![None; buckets],
            slots: SlotMap::with_key(),
        }
    }

    pub(crate) fn buckets(&self) -> usize {
        self.heads.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn bucket_of(&self, digest: u64) -> usize {
        (digest & (self.heads.len() as u64 - 1)) as usize
    }

    /// Linear chain scan in the bucket selected by `digest`, matching with
    /// the supplied equality called as `(stored, probe)`.
    pub(crate) fn find(
        &self,
        digest: u64,
        key: &[u8],
        eq: &dyn Fn(&[u8], &[u8]) -> bool,
    ) -> Option<DefaultKey> {
        let mut cur = self.heads[self.bucket_of(digest)];
        while let Some(k) = cur {
            let e = self.slots.get(k)?; // chains only reference live slots
            if eq(&e.key, key) {
                return Some(k);
            }
            cur = e.next;
        }
        None
    }

    /// Value of a live slot. Callers only hold keys returned by `find`
    /// within the same borrow, so the slot is always live; a stale key is
    /// a logic error and panics via the arena index.
    pub(crate) fn value(&self, k: DefaultKey) -> &[u8] {
        &self.slots[k].value
    }

    pub(crate) fn value_mut(&mut self, k: DefaultKey) -> &mut [u8] {
        &mut self.slots[k].value
    }

    /// Prepend a new entry to its chain (newest-first). The caller has
    /// already established that no equal key exists in the chain.
    pub(crate) fn push_front(&mut self, digest: u64, key: Box<[u8]>, value: Box<[u8]>) {
        let b = self.bucket_of(digest);
        let next = self.heads[b];
        let k = self.slots.insert(Entry {
            next,
            digest,
            key,
            value,
        });
        self.heads[b] = Some(k);
    }

    /// Trailing-pointer unlink: walk the chain keeping the predecessor,
    /// splice the match out, and return its owned value buffer.
    pub(crate) fn unlink(
        &mut self,
        digest: u64,
        key: &[u8],
        eq: &dyn Fn(&[u8], &[u8]) -> bool,
    ) -> Option<Box<[u8]>> {
        let b = self.bucket_of(digest);
        let mut prev: Option<DefaultKey> = None;
        let mut cur = self.heads[b];
        while let Some(k) = cur {
            let (next, matched) = {
                let e = self.slots.get(k)?;
                (e.next, eq(&e.key, key))
            };
            if matched {
                match prev {
                    Some(p) => {
                        if let Some(pe) = self.slots.get_mut(p) {
                            pe.next = next;
                        }
                    }
                    None => self.heads[b] = next,
                }
                return self.slots.remove(k).map(|e| e.value);
            }
            prev = Some(k);
            cur = next;
        }
        None
    }

    /// Relink every live entry under a fresh head array of `new_buckets`
    /// chain heads, indexing by each entry's cached digest. Infallible by
    /// construction: the policy layer gates the allocation first, so a
    /// refused resize never reaches this point.
    pub(crate) fn rehash(&mut self, new_buckets: usize) {
        debug_assert!(new_buckets.is_power_of_two());
        let mask = new_buckets as u64 - 1;
        let mut heads: Vec<Option<DefaultKey>> = vec![None; new_buckets];
        for (k, e) in self.slots.iter_mut() {
            let b = (e.digest & mask) as usize;
            e.next = heads[b];
            heads[b] = Some(k);
        }
        self.heads = heads;
    }

    /// Drop every entry; bucket count unchanged.
    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        for h in &mut self.heads {
            *h = None;
        }
    }

    /// Read iteration in bucket-index order, then chain order.
    pub(crate) fn iter(&self) -> TableIter<'_> {
        TableIter {
            table: self,
            bucket: 0,
            cur: None,
            started: false,
        }
    }

    /// Mutable value iteration in arena order (iteration order is
    /// unspecified at the public surface).
    pub(crate) fn values_mut(&mut self) -> TableValuesMut<'_> {
        TableValuesMut {
            it: self.slots.values_mut(),
        }
    }
}

pub(crate) struct TableValuesMut<'a> {
    it: slotmap::basic::ValuesMut<'a, DefaultKey, Entry>,
}

impl<'a> Iterator for TableValuesMut<'a> {
    type Item = &'a mut [u8];

    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|e| &mut *e.value)
    }
}

pub(crate) struct TableIter<'a> {
    table: &'a BucketTable,
    bucket: usize,
    cur: Option<DefaultKey>,
    started: bool,
}

impl<'a> Iterator for TableIter<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(k) = self.cur {
                let e = self.table.slots.get(k)?;
                self.cur = e.next;
                return Some((&e.key, &e.value));
            }
            if self.started {
                self.bucket += 1;
            }
            self.started = true;
            if self.bucket >= self.table.heads.len() {
                return None;
            }
            self.cur = self.table.heads[self.bucket];
        }
    }
}

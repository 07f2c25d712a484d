//! Computed table for memoising diagram operations.
//!
//! The table is a fixed-size, direct-mapped array: a new result simply
//! overwrites whatever occupied its slot, so memory stays bounded no matter
//! how many operations a solve performs. Results are only valid as long as
//! the nodes they mention are alive, so the manager clears the cache whenever
//! garbage is collected.

use crate::reference::Ref;
use crate::utils::{pairing3, MyHash};

/// Key of a memoised operation.
///
/// Quantifier keys carry the cube of the variables still to be eliminated, so
/// two calls with different variable sets never share an entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OpKey {
    Ite(Ref, Ref, Ref),
    Constrain(Ref, Ref),
    Exists(Ref, Ref),
    AndExists(Ref, Ref, Ref),
}

impl MyHash for OpKey {
    fn hash(&self) -> u64 {
        let (tag, a, b, c) = match *self {
            OpKey::Ite(f, g, h) => (0, f, g, h.raw()),
            OpKey::Constrain(f, g) => (1, f, g, 0),
            OpKey::Exists(f, cube) => (2, f, cube, 0),
            OpKey::AndExists(f, g, cube) => (3, f, g, cube.raw()),
        };
        pairing3(a.raw() as u64, b.raw() as u64, ((c as u64) << 2) | tag)
    }
}

struct Entry<K, V> {
    key: K,
    value: V,
}

pub struct Cache<K, V> {
    data: Vec<Option<Entry<K, V>>>,
    bitmask: u64,
    hits: usize,
    misses: usize,
}

impl<K, V> Cache<K, V> {
    /// Create a new cache with `2^bits` slots.
    pub fn new(bits: u32) -> Self {
        assert!(bits <= 31, "Bits should be in the range 0..=31");

        let size = 1usize << bits;
        Self {
            data: std::iter::repeat_with(|| None).take(size).collect(),
            bitmask: (size - 1) as u64,
            hits: 0,
            misses: 0,
        }
    }

    /// Number of slots, the most entries the cache ever holds.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }
    pub fn misses(&self) -> usize {
        self.misses
    }

    /// Drop all entries. Statistics are kept.
    pub fn clear(&mut self) {
        self.data.fill_with(|| None);
    }

    fn index(&self, hash: u64) -> usize {
        (hash & self.bitmask) as usize
    }
}

impl<K, V> Cache<K, V>
where
    K: MyHash + Eq,
    V: Copy,
{
    #[inline]
    pub fn get(&mut self, key: &K) -> Option<V> {
        let index = self.index(key.hash());
        match &self.data[index] {
            Some(entry) if entry.key == *key => {
                self.hits += 1;
                Some(entry.value)
            }
            _ => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store a result, evicting the previous occupant of its slot.
    #[inline]
    pub fn insert(&mut self, key: K, value: V) {
        let index = self.index(key.hash());
        self.data[index] = Some(Entry { key, value });
    }
}

use crate::utils::MyHash;

#[derive(Clone)]
struct Entry<T> {
    value: T,
    next: usize,
    occupied: bool,
}

impl<T> Entry<T> {
    /// Create a new cell with the given value.
    pub fn new(value: T) -> Self {
        Self {
            value,
            next: 0,
            occupied: false,
        }
    }
}

impl<T> Default for Entry<T>
where
    T: Default,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// The table is full: no cell can be allocated without exceeding the limit.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TableFull {
    pub limit: usize,
}

/// Hash-consing table with separate chaining.
///
/// Cells are addressed by index; index 0 is a permanently occupied sentry, so
/// `next == 0` terminates a bucket chain. The table grows on demand up to
/// `limit` cells, after which allocation fails with [`TableFull`].
pub struct Table<T> {
    data: Vec<Entry<T>>,

    buckets: Vec<usize>,
    bitmask: u64,

    /// Maximum number of usable cells.
    limit: usize,
    /// Index of the first *possibly* free (non-occupied) cell.
    min_free: usize,
    /// Index of the last occupied cell.
    last_index: usize,
    /// Number of occupied cells.
    real_size: usize,
}

impl<T> Table<T>
where
    T: Default,
{
    /// Create a new table holding at most `limit` values.
    pub fn new(limit: usize) -> Self {
        assert!(limit > 0, "Table limit should be positive");
        assert!(limit < (u32::MAX >> 1) as usize, "Table limit is too large");

        let mut data: Vec<Entry<T>> = Vec::with_capacity((limit + 1).min(1 << 16));
        data.push(Entry::default());
        data[0].occupied = true; // Set 0th cell as occupied (sentry).

        let buckets_bits = (usize::BITS - limit.leading_zeros()).clamp(4, 20);
        let buckets_size = 1usize << buckets_bits;
        let buckets = vec![0; buckets_size];
        let bitmask = (buckets_size - 1) as u64;

        Self {
            data,
            buckets,
            bitmask,
            limit,
            min_free: 1,
            last_index: 0,
            real_size: 0,
        }
    }
}

impl<T> Table<T> {
    /// Get the maximum number of cells.
    pub fn limit(&self) -> usize {
        self.limit
    }
    /// Get the index of the last occupied cell.
    pub fn size(&self) -> usize {
        self.last_index
    }
    /// Get the number of occupied cells.
    pub fn real_size(&self) -> usize {
        self.real_size
    }

    /// Get the reference to the value at the given index.
    pub fn value(&self, index: usize) -> &T {
        assert_ne!(index, 0, "Index is 0");
        &self.data[index].value
    }

    /// Check if the cell at the given index is occupied.
    pub fn is_occupied(&self, index: usize) -> bool {
        assert_ne!(index, 0, "Index is 0");
        index < self.data.len() && self.data[index].occupied
    }
    /// Get the index of the next cell.
    pub fn next(&self, index: usize) -> usize {
        assert_ne!(index, 0, "Index is 0");
        self.data[index].next
    }
    /// Set the index of the next cell.
    pub fn set_next(&mut self, index: usize, next: usize) {
        assert_ne!(index, 0, "Index is 0");
        self.data[index].next = next;
    }

    /// Iterate over the indices of all occupied cells.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        (1..=self.last_index).filter(|&i| self.data[i].occupied)
    }
}

impl<T> Table<T>
where
    T: Default,
{
    /// Allocate a new cell in the table and return its index.
    pub(crate) fn alloc(&mut self) -> Result<usize, TableFull> {
        let index = (self.min_free..=self.last_index)
            .find(|&i| !self.is_occupied(i))
            .unwrap_or(self.last_index + 1);

        if index > self.limit {
            return Err(TableFull { limit: self.limit });
        }
        if index == self.data.len() {
            self.data.push(Entry::default());
        }
        if index > self.last_index {
            self.last_index = index;
        }

        self.data[index].occupied = true;
        self.min_free = index + 1;
        self.real_size += 1;

        Ok(index)
    }

    /// Drop the value at the given index.
    pub fn drop(&mut self, index: usize) {
        assert_ne!(index, 0, "Index is 0");
        assert!(self.is_occupied(index), "Index {} is not occupied", index);

        self.data[index].occupied = false;
        self.data[index].value = T::default();
        self.data[index].next = 0;
        self.min_free = self.min_free.min(index);
        self.real_size -= 1;
    }

    /// Add a new value to the table and return its index.
    pub fn add(&mut self, value: T) -> Result<usize, TableFull> {
        let index = self.alloc()?;

        self.data[index].value = value;
        self.data[index].next = 0;

        Ok(index)
    }
}

impl<T> Table<T>
where
    T: MyHash + Default,
{
    fn bucket_index(&self, value: &T) -> usize {
        (value.hash() & self.bitmask) as usize
    }

    /// Put a value into the table and return its index.
    ///
    /// Equal values always get the same index.
    pub fn put(&mut self, value: T) -> Result<usize, TableFull>
    where
        T: Eq,
    {
        let bucket_index = self.bucket_index(&value);
        let mut index = self.buckets[bucket_index];

        if index == 0 {
            // Create new node and put it into the bucket.
            let i = self.add(value)?;
            self.buckets[bucket_index] = i;
            return Ok(i);
        }

        loop {
            assert!(index > 0);

            if &value == self.value(index) {
                // The node already exists.
                return Ok(index);
            }

            let next = self.next(index);

            if next == 0 {
                // Create new node and append it to the bucket.
                let i = self.add(value)?;
                self.set_next(index, i);
                return Ok(i);
            } else {
                // Go to the next node in the bucket.
                index = next;
            }
        }
    }

    /// Drop every hashed cell for which `keep` returns false and relink the
    /// bucket chains of the survivors. Returns the number of dropped cells.
    ///
    /// Cells that were never hashed (allocated with [`Table::alloc`]) are kept
    /// unconditionally.
    pub fn retain(&mut self, mut keep: impl FnMut(usize, &T) -> bool) -> usize {
        let mut hashed = Vec::new();
        for bucket in 0..self.buckets.len() {
            let mut index = self.buckets[bucket];
            while index != 0 {
                hashed.push(index);
                index = self.next(index);
            }
        }
        self.buckets.fill(0);

        let mut dropped = 0;
        for index in hashed {
            if keep(index, self.value(index)) {
                let bucket_index = self.bucket_index(self.value(index));
                let head = self.buckets[bucket_index];
                self.set_next(index, head);
                self.buckets[bucket_index] = index;
            } else {
                self.drop(index);
                dropped += 1;
            }
        }
        while self.last_index > 0 && !self.data[self.last_index].occupied {
            self.last_index -= 1;
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
    struct Item(i32);

    impl MyHash for Item {
        fn hash(&self) -> u64 {
            self.0.unsigned_abs() as u64
        }
    }

    #[test]
    fn test_alloc() {
        let mut table = Table::<()>::new(3);
        assert_eq!(table.alloc(), Ok(1));
        assert_eq!(table.alloc(), Ok(2));
        assert_eq!(table.alloc(), Ok(3));
    }

    #[test]
    fn test_alloc_too_much() {
        let mut table = Table::<()>::new(3);
        assert_eq!(table.alloc(), Ok(1));
        assert_eq!(table.alloc(), Ok(2));
        assert_eq!(table.alloc(), Ok(3));
        assert_eq!(table.alloc(), Err(TableFull { limit: 3 }));
    }

    #[test]
    fn test_drop_and_reuse() {
        let mut table = Table::new(4);
        let a = table.add(Item(10)).unwrap();
        let b = table.add(Item(20)).unwrap();
        table.drop(a);
        assert!(!table.is_occupied(a));
        assert!(table.is_occupied(b));
        assert_eq!(table.add(Item(30)), Ok(a));
        assert_eq!(table.real_size(), 2);
    }

    #[test]
    fn test_put() {
        let mut table = Table::new(4);
        let index1 = table.put(Item(5)).unwrap();
        let index2 = table.put(Item(-5)).unwrap();
        assert_ne!(index1, index2);
        assert_eq!(table.value(index1), &Item(5));
        assert_eq!(table.value(index2), &Item(-5));
        assert_eq!(table.next(index1), index2);
        assert_eq!(table.put(Item(-5)), Ok(index2));
        assert_eq!(table.put(Item(5)), Ok(index1));
        assert_eq!(table.real_size(), 2);
    }

    #[test]
    fn test_retain_relinks_chains() {
        let mut table = Table::new(8);
        let a = table.put(Item(5)).unwrap();
        let b = table.put(Item(-5)).unwrap();
        let c = table.put(Item(7)).unwrap();

        let dropped = table.retain(|i, _| i != a);
        assert_eq!(dropped, 1);
        assert!(!table.is_occupied(a));
        assert_eq!(table.real_size(), 2);

        // Survivors are still found through their chains, the dropped value is
        // stored afresh.
        assert_eq!(table.put(Item(-5)), Ok(b));
        assert_eq!(table.put(Item(7)), Ok(c));
        assert_eq!(table.put(Item(5)), Ok(a));
        assert_eq!(table.real_size(), 3);
    }
}

use std::cmp::Ordering;

/// A Comparator object provides a total order over the byte strings that
/// are used as keys in a memtable or in the key ranges of a table. A
/// Comparator implementation must be thread-safe since it may be invoked
/// concurrently from multiple threads.
pub trait Comparator: Sync + Send + Clone {
    /// Three-way comparison. Returns value:
    /// Ordering::Less iff a < b
    /// Ordering::Equal iff a == b
    /// Ordering::Greater iff a > b
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// The name of comparator. Used to check for comparator
    /// mismatches (i.e., a DB created with one comparator is
    /// accessed using a different comparator.)
    fn name(&self) -> &str;
}

/// `BytewiseComparator` uses lexicographic byte-wise ordering.
#[derive(Default, Clone, Copy, Debug)]
pub struct BytewiseComparator {}

impl Comparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn name(&self) -> &str {
        "leveldb.BytewiseComparator"
    }
}

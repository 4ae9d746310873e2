use std::cmp::Ordering;

use crate::db::format::{InternalKey, InternalKeyComparator};
use crate::util::comparator::Comparator;

/// Metadata of one persisted sorted table. Immutable once created; the
/// number alone identifies the table across all levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub level: usize,
    pub number: u64,
    /// Approximate file size in bytes.
    pub size: u64,
    pub smallest: InternalKey,
    pub largest: InternalKey,
}

impl TableDescriptor {
    pub fn new(
        level: usize,
        number: u64,
        size: u64,
        smallest: InternalKey,
        largest: InternalKey,
    ) -> Self {
        Self {
            level,
            number,
            size,
            smallest,
            largest,
        }
    }

    /// Returns true if `smallest <= largest` under `icmp`.
    pub fn is_well_formed<C: Comparator>(&self, icmp: &InternalKeyComparator<C>) -> bool {
        icmp.compare_keys(&self.smallest, &self.largest) != Ordering::Greater
    }

    /// Returns true if the table's user key range intersects `[smallest, largest]`.
    pub fn overlaps<C: Comparator>(&self, ucmp: &C, smallest: &[u8], largest: &[u8]) -> bool {
        ucmp.compare(self.largest.user_key(), smallest) != Ordering::Less
            && ucmp.compare(self.smallest.user_key(), largest) != Ordering::Greater
    }
}

/// Calculate the total size of given tables.
#[inline]
pub fn total_size<'a, I>(tables: I) -> u64
where
    I: IntoIterator<Item = &'a TableDescriptor>,
{
    tables.into_iter().fold(0, |acc, t| acc + t.size)
}

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::session::SessionCore;
use crate::util::comparator::Comparator;

mod record;
mod staging;
mod table;

pub use record::SessionRecord;
pub use staging::Staging;
pub use table::{total_size, TableDescriptor};

/// An immutable snapshot of the table layout of every level.
///
/// Level 0 is ordered by descending table number (newest first); every
/// other level is ordered by ascending smallest key with disjoint ranges.
/// A `Version` never changes once built. It keeps its tables alive in the
/// owning session for as long as it is current or held by a `VersionRef`.
pub struct Version {
    id: u64,
    base: u64,
    levels: Vec<Vec<Arc<TableDescriptor>>>,
    // The session counts as one holder while the version is current.
    refs: AtomicUsize,
    core: Arc<SessionCore>,
}

impl Version {
    pub(crate) fn new(
        core: Arc<SessionCore>,
        base: Option<u64>,
        levels: Vec<Vec<Arc<TableDescriptor>>>,
    ) -> Self {
        let id = core.next_version_id();
        Version {
            id,
            base: base.unwrap_or(id),
            levels,
            refs: AtomicUsize::new(0),
            core,
        }
    }

    /// Session-unique id of this version.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Id of the version this one was staged from.
    pub fn base_id(&self) -> u64 {
        self.base
    }

    pub(crate) fn core(&self) -> &Arc<SessionCore> {
        &self.core
    }

    pub fn levels(&self) -> &[Vec<Arc<TableDescriptor>>] {
        &self.levels
    }

    /// Tables of `level`; empty for levels past the last populated one.
    pub fn level(&self, level: usize) -> &[Arc<TableDescriptor>] {
        self.levels.get(level).map(Vec::as_slice).unwrap_or(&[])
    }

    /// One more than the highest populated level.
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn num_files(&self, level: usize) -> usize {
        self.level(level).len()
    }

    pub fn total_files(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn level_size(&self, level: usize) -> u64 {
        total_size(self.level(level).iter().map(Arc::as_ref))
    }

    pub fn contains(&self, level: usize, number: u64) -> bool {
        self.level(level).iter().any(|t| t.number == number)
    }

    /// Every table of every level.
    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableDescriptor>> {
        self.levels.iter().flatten()
    }

    /// Returns the tables of `level` whose user key range intersects
    /// `[smallest, largest]`, in level order.
    pub fn overlapping<C: Comparator>(
        &self,
        ucmp: &C,
        level: usize,
        smallest: &[u8],
        largest: &[u8],
    ) -> Vec<Arc<TableDescriptor>> {
        let tables = self.level(level);
        if level == 0 {
            return tables
                .iter()
                .filter(|t| t.overlaps(ucmp, smallest, largest))
                .cloned()
                .collect();
        }
        // Ranges are disjoint and sorted: skip every table ending before `smallest`.
        let start = match tables.binary_search_by(|t| {
            match ucmp.compare(t.largest.user_key(), smallest) {
                CmpOrdering::Less => CmpOrdering::Less,
                _ => CmpOrdering::Greater,
            }
        }) {
            Ok(i) | Err(i) => i,
        };
        tables[start..]
            .iter()
            .take_while(|t| ucmp.compare(t.smallest.user_key(), largest) != CmpOrdering::Greater)
            .cloned()
            .collect()
    }

    /// Table numbers per level, for diagnostics and tests.
    pub fn table_numbers(&self) -> Vec<Vec<u64>> {
        self.levels
            .iter()
            .map(|tables| tables.iter().map(|t| t.number).collect())
            .collect()
    }

    pub(crate) fn incref(&self) {
        self.refs.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn decref(&self) {
        let prev = self.refs.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "version #{} released more often than acquired", self.id);
        if prev == 1 {
            self.core.unref_tables(self);
        }
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Version")
            .field("id", &self.id)
            .field("base", &self.base)
            .field("levels", &self.table_numbers())
            .finish()
    }
}

/// A counted handle on a `Version`. Every table the version lists is kept
/// from deletion until the handle is released or dropped.
pub struct VersionRef {
    version: Arc<Version>,
}

impl VersionRef {
    /// Wraps a version whose count the caller already raised.
    pub(crate) fn adopt(version: Arc<Version>) -> Self {
        VersionRef { version }
    }

    pub fn version(&self) -> &Arc<Version> {
        &self.version
    }

    /// Gives up this handle. Equivalent to dropping it.
    pub fn release(self) {}
}

impl Deref for VersionRef {
    type Target = Version;

    fn deref(&self) -> &Version {
        &self.version
    }
}

impl Clone for VersionRef {
    fn clone(&self) -> Self {
        self.version.incref();
        VersionRef::adopt(Arc::clone(&self.version))
    }
}

impl Drop for VersionRef {
    fn drop(&mut self) {
        self.version.decref();
    }
}

impl fmt::Debug for VersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.version.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::new_session;
    use crate::storage::Storage;
    use crate::util::comparator::BytewiseComparator;
    use crate::util::testutil::ikey;

    fn key_range(level: usize, number: u64, lo: u64, hi: u64) -> (usize, u64, u64, u64) {
        (level, number, lo, hi)
    }

    #[test]
    fn test_accessors_and_overlapping() {
        let (_, session) = new_session();
        let mut rec = SessionRecord::new();
        for &(level, number, lo, hi) in &[
            key_range(0, 9, 10, 50),
            key_range(0, 8, 40, 90),
            key_range(1, 1, 0, 9),
            key_range(1, 2, 10, 19),
            key_range(1, 3, 20, 29),
            key_range(1, 4, 30, 39),
            key_range(3, 5, 0, 100),
        ] {
            rec.add_table(level, number, number * 10, ikey(lo), ikey(hi));
        }
        session.apply(&rec).unwrap();
        let v = session.current();

        assert_eq!(v.num_levels(), 4);
        assert_eq!(v.table_numbers(), vec![vec![9, 8], vec![1, 2, 3, 4], vec![], vec![5]]);
        assert_eq!(v.num_files(1), 4);
        assert_eq!(v.num_files(2), 0);
        assert_eq!(v.num_files(7), 0);
        assert_eq!(v.total_files(), 7);
        assert_eq!(v.level_size(1), 100);
        assert!(v.contains(1, 3));
        assert!(!v.contains(0, 3));
        assert_eq!(v.tables().count(), 7);

        let ucmp = BytewiseComparator::default();
        let numbers = |tables: Vec<Arc<TableDescriptor>>| -> Vec<u64> {
            tables.iter().map(|t| t.number).collect()
        };
        let k = |i: u64| (i as u32).to_be_bytes();
        assert_eq!(numbers(v.overlapping(&ucmp, 1, &k(15), &k(25))), vec![2, 3]);
        assert_eq!(numbers(v.overlapping(&ucmp, 1, &k(19), &k(20))), vec![2, 3]);
        assert_eq!(numbers(v.overlapping(&ucmp, 1, &k(40), &k(99))), Vec::<u64>::new());
        assert_eq!(numbers(v.overlapping(&ucmp, 1, &k(0), &k(0))), vec![1]);
        assert_eq!(numbers(v.overlapping(&ucmp, 0, &k(45), &k(45))), vec![9, 8]);
        assert_eq!(numbers(v.overlapping(&ucmp, 0, &k(60), &k(70))), vec![8]);
        assert_eq!(numbers(v.overlapping(&ucmp, 2, &k(0), &k(100))), Vec::<u64>::new());
    }

    #[test]
    fn test_clone_counts_as_holder() {
        let (storage, session) = new_session();
        let mut rec = SessionRecord::new();
        storage.create(1);
        rec.add_table(0, 1, 1, ikey(1), ikey(1));
        session.apply(&rec).unwrap();

        let held = session.current();
        let copy = held.clone();
        drop(held);

        let mut rec = SessionRecord::new();
        rec.del_table(0, 1);
        session.apply(&rec).unwrap();
        session.wait_for_deletions();
        assert!(storage.exists(1));
        assert_eq!(copy.table_numbers(), vec![vec![1]]);

        copy.release();
        session.wait_for_deletions();
        assert!(!storage.exists(1));
    }
}

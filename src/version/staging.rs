use std::cmp::Ordering;
use std::sync::Arc;

use fxhash::{FxHashMap, FxHashSet};
use log::{debug, error};

use crate::db::format::InternalKeyComparator;
use crate::error::Error;
use crate::util::comparator::Comparator;
use crate::version::{SessionRecord, TableDescriptor, Version};
use crate::IResult;

/// Net change to one level accumulated over all committed edits.
#[derive(Default)]
struct LevelDelta {
    added: FxHashMap<u64, Arc<TableDescriptor>>,
    // Only numbers present in the base version.
    deleted: FxHashSet<u64>,
}

impl LevelDelta {
    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }
}

/// Single-use builder that applies edits to a base `Version` and produces
/// the next one. Never touches the base itself, so readers of the base are
/// unaffected while a staging is in progress.
pub struct Staging<C: Comparator> {
    base: Arc<Version>,
    icmp: InternalKeyComparator<C>,
    levels: Vec<LevelDelta>,
    // Lazily built number sets of the base levels.
    base_numbers: Vec<Option<FxHashSet<u64>>>,
    finished: bool,
}

fn violation(e: Error) -> Error {
    error!("version staging: {}", e);
    e
}

impl<C: Comparator> Staging<C> {
    pub fn new(base: Arc<Version>, icmp: InternalKeyComparator<C>) -> Self {
        let base_levels = base.num_levels();
        Staging {
            base,
            icmp,
            levels: vec![],
            base_numbers: (0..base_levels).map(|_| None).collect(),
            finished: false,
        }
    }

    fn base_contains(&mut self, level: usize, number: u64) -> bool {
        let base = &self.base;
        match self.base_numbers.get_mut(level) {
            Some(slot) => slot
                .get_or_insert_with(|| base.level(level).iter().map(|t| t.number).collect())
                .contains(&number),
            None => false,
        }
    }

    fn delta(&self, level: usize) -> Option<&LevelDelta> {
        self.levels.get(level)
    }

    fn delta_mut(&mut self, level: usize) -> &mut LevelDelta {
        if self.levels.len() <= level {
            self.levels.resize_with(level + 1, LevelDelta::default);
        }
        &mut self.levels[level]
    }

    /// Accumulates `edit`. Within one edit deletions apply before additions;
    /// adding a number already present at that level replaces the old entry,
    /// and deleting a table added by an earlier commit cancels the addition.
    /// The edit is validated as a whole first, so an `Err` leaves the staging
    /// unchanged.
    pub fn commit(&mut self, edit: &SessionRecord) -> IResult<()> {
        if self.finished {
            return Err(violation(Error::StagingFinished));
        }

        let mut seen = FxHashSet::default();
        for &(level, number) in edit.deleted_tables() {
            let staged = self
                .delta(level)
                .map_or(false, |d| d.added.contains_key(&number));
            let already_deleted = self
                .delta(level)
                .map_or(false, |d| d.deleted.contains(&number));
            let in_base = !already_deleted && self.base_contains(level, number);
            if !(staged || in_base) || !seen.insert((level, number)) {
                return Err(violation(Error::MissingTable { level, number }));
            }
        }
        for table in edit.added_tables() {
            if !table.is_well_formed(&self.icmp) {
                return Err(violation(Error::InvertedRange {
                    number: table.number,
                }));
            }
        }

        for &(level, number) in edit.deleted_tables() {
            let in_base = self.base_contains(level, number);
            let delta = self.delta_mut(level);
            delta.added.remove(&number);
            if in_base {
                delta.deleted.insert(number);
            }
        }
        for table in edit.added_tables() {
            let delta = self.delta_mut(table.level);
            delta.deleted.remove(&table.number);
            delta.added.insert(table.number, Arc::new(table.clone()));
        }
        Ok(())
    }

    fn by_smallest(&self, a: &TableDescriptor, b: &TableDescriptor) -> Ordering {
        self.icmp
            .compare_keys(&a.smallest, &b.smallest)
            .then(a.number.cmp(&b.number))
    }

    /// Returns where `added` (sorted, level >= 1) can be spliced into
    /// `survivors` as one block, if it can: the added tables must be disjoint
    /// from each other and fit in a single gap between survivors. The splice
    /// then yields exactly the order a full sort would.
    fn trivial_slot(
        &self,
        survivors: &[Arc<TableDescriptor>],
        added: &[Arc<TableDescriptor>],
    ) -> Option<usize> {
        let icmp = &self.icmp;
        if added
            .windows(2)
            .any(|w| icmp.compare_keys(&w[0].largest, &w[1].smallest) != Ordering::Less)
        {
            return None;
        }
        let (first, last) = (added.first()?, added.last()?);
        let at = match survivors.binary_search_by(|t| self.by_smallest(t, first)) {
            Ok(_) => return None,
            Err(at) => at,
        };
        if at > 0 && icmp.compare_keys(&survivors[at - 1].largest, &first.smallest) != Ordering::Less
        {
            return None;
        }
        if at < survivors.len()
            && icmp.compare_keys(&last.largest, &survivors[at].smallest) != Ordering::Less
        {
            return None;
        }
        Some(at)
    }

    fn check_disjoint(&self, level: usize, tables: &[Arc<TableDescriptor>]) -> IResult<()> {
        for w in tables.windows(2) {
            if self.icmp.compare_keys(&w[0].largest, &w[1].smallest) != Ordering::Less {
                return Err(violation(Error::OverlappingTables {
                    level,
                    left: w[0].number,
                    right: w[1].number,
                }));
            }
        }
        Ok(())
    }

    /// Builds the new version. Level 0 is always re-sorted by descending
    /// number. Higher levels are patched in place when `trivial` is set and
    /// the additions fit one gap, and fully re-sorted otherwise; both ways
    /// produce the same order. Trailing empty levels are dropped.
    pub fn finish(&mut self, trivial: bool) -> IResult<Version> {
        if self.finished {
            return Err(violation(Error::StagingFinished));
        }
        self.finished = true;

        let num_levels = self.base.num_levels().max(self.levels.len());
        let mut levels = Vec::with_capacity(num_levels);
        for level in 0..num_levels {
            let base_tables = self.base.level(level);
            let delta = match self.delta(level) {
                Some(delta) if !delta.is_empty() => delta,
                _ => {
                    levels.push(base_tables.to_vec());
                    continue;
                }
            };

            let mut tables: Vec<Arc<TableDescriptor>> = base_tables
                .iter()
                .filter(|t| {
                    !delta.deleted.contains(&t.number) && !delta.added.contains_key(&t.number)
                })
                .cloned()
                .collect();
            if delta.added.is_empty() {
                levels.push(tables);
                continue;
            }

            let mut added: Vec<Arc<TableDescriptor>> = delta.added.values().cloned().collect();
            if level == 0 {
                tables.append(&mut added);
                tables.sort_by(|a, b| b.number.cmp(&a.number));
                levels.push(tables);
                continue;
            }

            added.sort_by(|a, b| self.by_smallest(a, b));
            let slot = if trivial {
                self.trivial_slot(&tables, &added)
            } else {
                None
            };
            match slot {
                Some(at) => {
                    tables.splice(at..at, added);
                }
                None => {
                    if trivial {
                        debug!("level {}: additions do not fit one gap, re-sorting", level);
                    }
                    tables.append(&mut added);
                    tables.sort_by(|a, b| self.by_smallest(a, b));
                }
            }
            self.check_disjoint(level, &tables)?;
            levels.push(tables);
        }

        while levels.last().map_or(false, Vec::is_empty) {
            levels.pop();
        }
        Ok(Version::new(
            Arc::clone(self.base.core()),
            Some(self.base.id()),
            levels,
        ))
    }
}

use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

use fxhash::FxHashSet;

use crate::storage::Storage;
use crate::IResult;

#[derive(Default)]
struct Tables {
    live: FxHashSet<u64>,
    removed: Vec<u64>,
}

/// Table "files" that exist only as numbers in memory. Removal order is
/// recorded so callers can inspect what was reclaimed.
#[derive(Default)]
pub struct MemStorage {
    tables: Mutex<Tables>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a table as present.
    pub fn create(&self, number: u64) {
        self.tables().live.insert(number);
    }

    /// Numbers removed so far, in removal order.
    pub fn removed(&self) -> Vec<u64> {
        self.tables().removed.clone()
    }
}

impl Storage for MemStorage {
    fn remove(&self, number: u64) -> IResult<()> {
        let mut tables = self.tables();
        if !tables.live.remove(&number) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("table #{} does not exist", number),
            )
            .into());
        }
        tables.removed.push(number);
        Ok(())
    }

    fn exists(&self, number: u64) -> bool {
        self.tables().live.contains(&number)
    }

    fn list(&self) -> IResult<Vec<u64>> {
        let mut numbers: Vec<u64> = self.tables().live.iter().copied().collect();
        numbers.sort_unstable();
        Ok(numbers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_mem_storage() {
        let storage = MemStorage::new();
        storage.create(2);
        storage.create(1);
        assert_eq!(storage.list().unwrap(), vec![1, 2]);
        storage.remove(2).unwrap();
        assert!(!storage.exists(2));
        assert!(storage.exists(1));
        assert_eq!(storage.removed(), vec![2]);
        match storage.remove(2) {
            Err(Error::IO(e)) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected {:?}", other),
        }
    }
}

use std::fs::{create_dir_all, read_dir, remove_file, File as SysFile, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::Error;
use crate::storage::{parse_table_file_name, table_file_name, Storage};
use crate::IResult;

const LOCK_FILE: &str = "LOCK";

/// Table files in a local directory. The directory's `LOCK` file is held
/// exclusively for as long as the storage is open, so two processes never
/// reclaim tables in the same directory.
pub struct FileStorage {
    dir: PathBuf,
    lock: SysFile,
}

impl FileStorage {
    /// Opens (creating if missing) the directory `dir` and takes its lock.
    pub fn open<P: AsRef<Path>>(dir: P) -> IResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        create_dir_all(&dir)?;
        let lock = OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .open(dir.join(LOCK_FILE))?;
        if let Err(e) = lock.try_lock_exclusive() {
            return Err(Error::Locked(format!("{}: {}", dir.display(), e)));
        }
        Ok(FileStorage { dir, lock })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates an empty table file, returning its path.
    pub fn create(&self, number: u64) -> IResult<PathBuf> {
        let path = table_file_name(&self.dir, number);
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(path)
    }
}

impl Storage for FileStorage {
    fn remove(&self, number: u64) -> IResult<()> {
        remove_file(table_file_name(&self.dir, number))?;
        Ok(())
    }

    fn exists(&self, number: u64) -> bool {
        table_file_name(&self.dir, number).exists()
    }

    fn list(&self) -> IResult<Vec<u64>> {
        let mut numbers = vec![];
        for entry in read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(number) = entry.file_name().to_str().and_then(parse_table_file_name) {
                numbers.push(number);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }
}

impl Drop for FileStorage {
    fn drop(&mut self) {
        if let Err(e) = self.lock.unlock() {
            log::warn!("failed to unlock {}: {}", self.dir.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn temp_dir(name: &str) -> PathBuf {
        static SEQ: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "lsmcore-{}-{}-{}",
            name,
            std::process::id(),
            SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_create_list_remove() {
        let dir = temp_dir("file-storage");
        let storage = FileStorage::open(&dir).unwrap();
        for n in &[3, 1, 20] {
            storage.create(*n).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();
        assert_eq!(storage.list().unwrap(), vec![1, 3, 20]);
        assert!(storage.exists(3));

        storage.remove(3).unwrap();
        assert!(!storage.exists(3));
        assert_eq!(storage.list().unwrap(), vec![1, 20]);
        assert!(matches!(storage.remove(3), Err(Error::IO(_))));

        drop(storage);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_directory_lock() {
        let dir = temp_dir("file-lock");
        let storage = FileStorage::open(&dir).unwrap();
        assert!(matches!(FileStorage::open(&dir), Err(Error::Locked(_))));
        drop(storage);
        let again = FileStorage::open(&dir).unwrap();
        assert_eq!(again.dir(), dir.as_path());
        drop(again);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}

use std::path::{Path, PathBuf};

use crate::IResult;

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemStorage;

/// Where table files live. The version core only ever needs to find out
/// which tables exist and to remove the ones no version references any more.
pub trait Storage: Sync + Send {
    /// Delete the table file with the given number.
    fn remove(&self, number: u64) -> IResult<()>;

    /// Returns true iff the table file exists.
    fn exists(&self, number: u64) -> bool;

    /// Returns the numbers of all table files, in ascending order.
    fn list(&self) -> IResult<Vec<u64>>;
}

const TABLE_EXT: &str = "ldb";

/// Returns the name of the table file `number` inside `dir`.
pub fn table_file_name<P: AsRef<Path>>(dir: P, number: u64) -> PathBuf {
    dir.as_ref().join(format!("{:06}.{}", number, TABLE_EXT))
}

/// Parses a file name produced by `table_file_name`.
pub fn parse_table_file_name(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(TABLE_EXT)?.strip_suffix('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_file_name() {
        let name = table_file_name("/db", 7);
        assert_eq!(name, PathBuf::from("/db/000007.ldb"));
        assert_eq!(parse_table_file_name("000007.ldb"), Some(7));
        assert_eq!(parse_table_file_name("12345678.ldb"), Some(12345678));
        let cases = vec!["", ".ldb", "7.log", "LOCK", "x7.ldb", "000007.ldb.tmp", "-1.ldb"];
        for name in cases {
            assert_eq!(parse_table_file_name(name), None, "{}", name);
        }
    }
}

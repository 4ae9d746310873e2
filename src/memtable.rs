use bytes::Bytes;

use crate::db::format::{
    parse_internal_key, InternalKey, InternalKeyComparator, KeyKind, LookupKey,
};
use crate::error::Error;
use crate::memtable::memdb::{MemDb, MemDbIterator};
use crate::opt::Options;
use crate::util::comparator::Comparator;
use crate::IResult;

pub mod memdb;

/// The write buffer of the engine: a `MemDb` keyed by internal keys, so
/// every write is a new entry and deletions are markers rather than
/// removals.
pub struct MemTable<C: Comparator> {
    table: MemDb<InternalKeyComparator<C>>,
}

impl<C: Comparator> MemTable<C> {
    pub fn new(user_comparator: C, options: &Options) -> Self {
        Self {
            table: MemDb::new(
                InternalKeyComparator::new(user_comparator),
                options.memtable_capacity,
            ),
        }
    }

    /// Add an entry into memtable that maps key to value at the
    /// specified sequence number and with the specified kind.
    /// Typically value will be empty if kind == `KeyKind::Deletion`.
    pub fn add(&self, sequence_number: u64, kind: KeyKind, key: &[u8], value: &[u8]) {
        let ikey = InternalKey::new(key, sequence_number, kind);
        self.table
            .put(Bytes::copy_from_slice(ikey.data()), Bytes::copy_from_slice(value));
    }

    /// If memtable contains a value for key, returns `Some(Ok(value))`.
    /// If memtable contains a deletion for key, returns `Some(Err(Error::NotFound))`.
    /// Otherwise returns `None`.
    pub fn get(&self, key: &LookupKey) -> Option<IResult<Bytes>> {
        let (ikey, value) = self.table.find_ge(key.internal_key())?;
        let parsed = parse_internal_key(&ikey)?;
        let ucmp = self.table.comparator().user_comparator();
        if ucmp.compare(parsed.user_key, key.user_key()) != std::cmp::Ordering::Equal {
            return None;
        }
        match parsed.kind {
            KeyKind::Value => Some(Ok(value)),
            KeyKind::Deletion => Some(Err(Error::NotFound)),
        }
    }

    /// Iterates internal keys in comparator order.
    pub fn iter(&self) -> MemDbIterator<InternalKeyComparator<C>> {
        self.table.iter()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns an estimate of the number of bytes of data in use by this
    /// data structure. It is safe to call when MemTable is being modified.
    pub fn approx_memory_usage(&self) -> usize {
        self.table.approx_memory_usage()
    }

    /// Reports whether the table has outgrown the configured write buffer.
    /// Writes are never refused; freezing and flushing is up to the caller.
    pub fn should_flush(&self, options: &Options) -> bool {
        self.approx_memory_usage() >= options.write_buffer_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::format::extract_user_key;
    use crate::iterator::Iter;
    use crate::util::comparator::BytewiseComparator;

    fn new_table() -> MemTable<BytewiseComparator> {
        MemTable::new(BytewiseComparator::default(), &Options::default())
    }

    #[test]
    fn test_get_sees_newest_visible_entry() {
        let mem = new_table();
        mem.add(1, KeyKind::Value, b"k", b"v1");
        mem.add(3, KeyKind::Value, b"k", b"v3");
        mem.add(5, KeyKind::Deletion, b"k", b"");
        mem.add(2, KeyKind::Value, b"other", b"o");

        assert!(mem.get(&LookupKey::new(b"k", 0)).is_none());
        assert_eq!(mem.get(&LookupKey::new(b"k", 1)).unwrap().unwrap(), "v1");
        assert_eq!(mem.get(&LookupKey::new(b"k", 2)).unwrap().unwrap(), "v1");
        assert_eq!(mem.get(&LookupKey::new(b"k", 4)).unwrap().unwrap(), "v3");
        assert!(matches!(
            mem.get(&LookupKey::new(b"k", 5)),
            Some(Err(Error::NotFound))
        ));
        assert!(mem.get(&LookupKey::new(b"missing", 10)).is_none());
        assert!(mem.get(&LookupKey::new(b"j", 10)).is_none());
        assert_eq!(mem.len(), 4);
    }

    #[test]
    fn test_iter_orders_by_user_key_then_newest() {
        let mem = new_table();
        mem.add(1, KeyKind::Value, b"b", b"");
        mem.add(2, KeyKind::Value, b"a", b"");
        mem.add(3, KeyKind::Deletion, b"b", b"");
        let mut iter = mem.iter();
        iter.seek_to_first();
        let mut got = vec![];
        while iter.valid() {
            let p = parse_internal_key(iter.key()).unwrap();
            got.push((extract_user_key(iter.key()).to_vec(), p.sequence));
            iter.next();
        }
        assert_eq!(got, vec![(b"a".to_vec(), 2), (b"b".to_vec(), 3), (b"b".to_vec(), 1)]);
    }

    #[test]
    fn test_should_flush() {
        let options = Options {
            write_buffer_size: 1024,
            ..Options::default()
        };
        let mem = MemTable::new(BytewiseComparator::default(), &options);
        let mut seq = 0;
        while !mem.should_flush(&options) {
            seq += 1;
            mem.add(seq, KeyKind::Value, format!("key{}", seq).as_bytes(), &[0u8; 64]);
        }
        assert!(mem.approx_memory_usage() >= 1024);
        // Still accepts writes past the budget.
        mem.add(seq + 1, KeyKind::Value, b"late", b"write");
        assert!(mem.get(&LookupKey::new(b"late", seq + 1)).is_some());
    }
}

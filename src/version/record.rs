use crate::db::format::InternalKey;
use crate::version::table::TableDescriptor;

/// A batch of structural changes to the table layout: tables added by a
/// flush or a compaction and tables those operations made obsolete. Entries
/// carry no ordering among themselves.
#[derive(Debug, Clone, Default)]
pub struct SessionRecord {
    added: Vec<TableDescriptor>,
    deleted: Vec<(usize, u64)>,
    next_file_number: Option<u64>,
}

impl SessionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(
        &mut self,
        level: usize,
        number: u64,
        size: u64,
        smallest: InternalKey,
        largest: InternalKey,
    ) {
        self.added
            .push(TableDescriptor::new(level, number, size, smallest, largest));
    }

    pub fn del_table(&mut self, level: usize, number: u64) {
        self.deleted.push((level, number));
    }

    /// Records the next unused file number at the time the edit was made.
    pub fn set_next_file_number(&mut self, number: u64) {
        self.next_file_number = Some(number);
    }

    pub fn added_tables(&self) -> &[TableDescriptor] {
        &self.added
    }

    pub fn deleted_tables(&self) -> &[(usize, u64)] {
        &self.deleted
    }

    pub fn next_file_number(&self) -> Option<u64> {
        self.next_file_number
    }

    /// True if the edit changes no table, whatever file number it records.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }
}

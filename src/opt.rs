#[derive(Debug, Clone)]
pub struct Options {
    /// Approximate size of the memtable, in bytes, past which it should be
    /// frozen and flushed.
    pub write_buffer_size: usize,
    /// Number of entries the memtable arena reserves up front.
    pub memtable_capacity: usize,
    /// When false, unreferenced table files are only logged, never removed.
    pub delete_obsolete_files: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            write_buffer_size: 4 << 20,
            memtable_capacity: 4096,
            delete_obsolete_files: true,
        }
    }
}

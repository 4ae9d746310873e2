#[macro_use]
extern crate num_derive;

mod error;
pub mod db;
pub mod iterator;
pub mod memtable;
pub mod opt;
pub mod session;
pub mod storage;
mod util;
pub mod version;

pub use error::{Error, IResult};
pub use memtable::memdb::{MemDb, MemDbIterator};
pub use memtable::MemTable;
pub use session::Session;
pub use util::comparator::{BytewiseComparator, Comparator};
pub use version::{SessionRecord, Staging, TableDescriptor, Version, VersionRef};

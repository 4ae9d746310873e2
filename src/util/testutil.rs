use bytes::Bytes;

use crate::db::format::{InternalKey, KeyKind};

/// Routes `log` records to the test writer so a failing test shows them.
pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}

/// Internal key whose user key is the big-endian encoding of `i`, so numeric
/// order equals byte order.
pub fn ikey(i: u64) -> InternalKey {
    InternalKey::new(&(i as u32).to_be_bytes(), 0, KeyKind::Value)
}

pub fn key_with_ts(key: &str, ts: u64) -> Bytes {
    Bytes::from(format!("{}{:08}", key, ts))
}

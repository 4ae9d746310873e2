use std::cmp::Ordering;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use num_traits::FromPrimitive;

use crate::util::comparator::Comparator;

/// The max key sequence number. The value is 2^56 -1 because the sequence number
/// only takes 56 bits when it is serialized to `InternalKey`.
pub const MAX_KEY_SEQUENCE: u64 = (1u64 << 56) - 1;

/// The tail bytes length of an internal key
/// 7bytes sequence number + 1byte type number
pub const INTERNAL_KEY_TAIL: usize = 8;

/// Operation kind stored in the low byte of an internal key tag. The numeric
/// values order the kinds for ties on sequence number, so they must not change.
#[derive(Debug, Clone, Copy, Eq, PartialEq, FromPrimitive)]
pub enum KeyKind {
    Deletion = 0x0,
    Value = 0x1,
}

/// Kind used when building seek keys: sorts before every other kind carrying
/// the same sequence number.
pub const KIND_FOR_SEEK: KeyKind = KeyKind::Value;

/// Compose the sequence number and value type into a single u64.
fn pack_tag(seq_number: u64, kind: KeyKind) -> u64 {
    assert!(
        seq_number <= MAX_KEY_SEQUENCE,
        "key sequence number should be less than {}, but got {}",
        MAX_KEY_SEQUENCE,
        seq_number
    );
    seq_number << 8 | kind as u64
}

/// Splits `key` into its user key and packed tag. Keys shorter than the tail
/// are treated as bare user keys with a zero tag.
fn split_tag(key: &[u8]) -> (&[u8], u64) {
    if key.len() < INTERNAL_KEY_TAIL {
        return (key, 0);
    }
    let (user_key, tail) = key.split_at(key.len() - INTERNAL_KEY_TAIL);
    let mut tag = [0u8; INTERNAL_KEY_TAIL];
    tag.copy_from_slice(tail);
    (user_key, u64::from_le_bytes(tag))
}

/// Returns the user key part of an encoded internal key.
pub fn extract_user_key(key: &[u8]) -> &[u8] {
    split_tag(key).0
}

/// A decoded view over an encoded internal key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInternalKey<'a> {
    pub user_key: &'a [u8],
    pub sequence: u64,
    pub kind: KeyKind,
}

/// Parses an encoded internal key, returning `None` if it is too short or
/// carries an unknown kind byte.
pub fn parse_internal_key(key: &[u8]) -> Option<ParsedInternalKey<'_>> {
    if key.len() < INTERNAL_KEY_TAIL {
        return None;
    }
    let (user_key, tag) = split_tag(key);
    let kind = KeyKind::from_u64(tag & 0xff)?;
    Some(ParsedInternalKey {
        user_key,
        sequence: tag >> 8,
        kind,
    })
}

/// A user key augmented with a sequence number and an operation kind.
///
/// ```text
///   +---------------------------------+
///   | user key bytes                  |
///   +---------------------------------+
///   | sequence (7)        |  type (1) |   little-endian u64
///   +---------------------------------+
/// ```
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct InternalKey {
    data: Bytes,
}

impl InternalKey {
    pub fn new(user_key: &[u8], seq_number: u64, kind: KeyKind) -> Self {
        let mut buf = BytesMut::with_capacity(user_key.len() + INTERNAL_KEY_TAIL);
        buf.put_slice(user_key);
        buf.put_u64_le(pack_tag(seq_number, kind));
        InternalKey { data: buf.freeze() }
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn user_key(&self) -> &[u8] {
        extract_user_key(&self.data)
    }

    pub fn parse(&self) -> Option<ParsedInternalKey<'_>> {
        parse_internal_key(&self.data)
    }
}

impl fmt::Debug for InternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parse() {
            Some(p) => write!(f, "{:?} @ {} : {:?}", p.user_key, p.sequence, p.kind),
            None => write!(f, "(bad){:?}", self.data.as_ref()),
        }
    }
}

/// A `LookupKey` represents a 'Get' request from the user by the given key
/// with a specific sequence number to perform an MVCC style query. It seeks
/// to the newest entry for the user key that is visible at `sequence_number`.
pub struct LookupKey {
    key: InternalKey,
}

impl LookupKey {
    pub fn new(user_key: &[u8], sequence_number: u64) -> Self {
        LookupKey {
            key: InternalKey::new(user_key, sequence_number, KIND_FOR_SEEK),
        }
    }

    /// Return an internal key suitable for seeking in a MemTable.
    pub fn internal_key(&self) -> &[u8] {
        self.key.data()
    }

    /// Return the user key.
    pub fn user_key(&self) -> &[u8] {
        self.key.user_key()
    }
}

/// Orders internal keys by user key ascending (through the wrapped user
/// comparator), then by tag descending so newer entries come first.
#[derive(Clone, Default, Debug)]
pub struct InternalKeyComparator<C> {
    user_comparator: C,
}

impl<C: Comparator> InternalKeyComparator<C> {
    pub fn new(user_comparator: C) -> Self {
        Self { user_comparator }
    }

    pub fn user_comparator(&self) -> &C {
        &self.user_comparator
    }

    #[inline]
    pub fn compare_keys(&self, a: &InternalKey, b: &InternalKey) -> Ordering {
        self.compare(a.data(), b.data())
    }
}

impl<C: Comparator> Comparator for InternalKeyComparator<C> {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let (ua, ta) = split_tag(a);
        let (ub, tb) = split_tag(b);
        self.user_comparator
            .compare(ua, ub)
            .then_with(|| tb.cmp(&ta))
    }

    fn name(&self) -> &str {
        "leveldb.InternalKeyComparator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::comparator::BytewiseComparator;

    #[test]
    fn test_internal_key_round_trip() {
        let k = InternalKey::new(b"foo", 100, KeyKind::Deletion);
        assert_eq!(k.user_key(), b"foo");
        let p = k.parse().unwrap();
        assert_eq!(p.user_key, b"foo");
        assert_eq!(p.sequence, 100);
        assert_eq!(p.kind, KeyKind::Deletion);
        assert_eq!(k.data().len(), 3 + INTERNAL_KEY_TAIL);
    }

    #[test]
    fn test_parse_rejects_bad_keys() {
        assert!(parse_internal_key(b"short").is_none());
        let mut bad = b"k".to_vec();
        bad.extend_from_slice(&((7u64 << 8) | 0x7f).to_le_bytes());
        assert!(parse_internal_key(&bad).is_none());
    }

    #[test]
    #[should_panic]
    fn test_sequence_overflow() {
        InternalKey::new(b"k", MAX_KEY_SEQUENCE + 1, KeyKind::Value);
    }

    #[test]
    fn test_internal_key_order() {
        let icmp = InternalKeyComparator::new(BytewiseComparator::default());
        let cases = vec![
            // user key ascending
            (("a", 1, KeyKind::Value), ("b", 1, KeyKind::Value), Ordering::Less),
            (("b", 9, KeyKind::Value), ("a", 1, KeyKind::Value), Ordering::Greater),
            // sequence descending
            (("a", 9, KeyKind::Value), ("a", 1, KeyKind::Value), Ordering::Less),
            (("a", 1, KeyKind::Value), ("a", 9, KeyKind::Value), Ordering::Greater),
            // kind descending
            (("a", 5, KeyKind::Value), ("a", 5, KeyKind::Deletion), Ordering::Less),
            (("a", 5, KeyKind::Value), ("a", 5, KeyKind::Value), Ordering::Equal),
        ];
        for (i, ((ua, sa, ka), (ub, sb, kb), expect)) in cases.into_iter().enumerate() {
            let a = InternalKey::new(ua.as_bytes(), sa, ka);
            let b = InternalKey::new(ub.as_bytes(), sb, kb);
            assert_eq!(icmp.compare_keys(&a, &b), expect, "case {}", i);
        }
    }

    #[test]
    fn test_lookup_key() {
        let lk = LookupKey::new(b"user", 42);
        assert_eq!(lk.user_key(), b"user");
        let p = parse_internal_key(lk.internal_key()).unwrap();
        assert_eq!(p.sequence, 42);
        assert_eq!(p.kind, KIND_FOR_SEEK);
    }
}

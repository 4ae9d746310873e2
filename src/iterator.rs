use crate::IResult;

/// A cursor over an ordered sequence of key/value entries.
///
/// A freshly created cursor is not positioned; call one of the `seek*`
/// methods before reading. `key` and `value` may only be called while
/// `valid()` returns true.
pub trait Iter {
    /// An iterator is either positioned at a key/value pair, or
    /// not valid. This method returns true iff the iterator is valid.
    fn valid(&self) -> bool;

    /// Position at the first key in the source. The iterator is valid
    /// after this call iff the source is not empty.
    fn seek_to_first(&mut self);

    /// Position at the last key in the source. The iterator is
    /// valid after this call iff the source is not empty.
    fn seek_to_last(&mut self);

    /// Position at the first key in the source that is at or past target.
    /// The iterator is valid after this call iff the source contains
    /// an entry that comes at or past target.
    fn seek(&mut self, target: &[u8]);

    /// Moves to the next entry in the source. After this call, the iterator is
    /// valid iff the iterator was not positioned at the last entry in the source.
    /// REQUIRES: `valid()`
    fn next(&mut self);

    /// Moves to the previous entry in the source. After this call, the iterator
    /// is valid iff the iterator was not positioned at the first entry in source.
    /// REQUIRES: `valid()`
    fn prev(&mut self);

    /// Return the key for the current entry.
    /// REQUIRES: `valid()`
    fn key(&self) -> &[u8];

    /// Return the value for the current entry.
    /// REQUIRES: `valid()`
    fn value(&self) -> &[u8];

    /// If an error has occurred, return it. Else return an ok status.
    fn status(&mut self) -> IResult<()>;
}

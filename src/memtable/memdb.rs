use std::cmp::Ordering;
use std::mem;
use std::sync::{Arc, PoisonError};

use bytes::Bytes;
use crossbeam_utils::sync::{ShardedLock, ShardedLockReadGuard, ShardedLockWriteGuard};
use rand::Rng;

use crate::iterator::Iter;
use crate::util::comparator::Comparator;
use crate::{Error, IResult};

const MAX_HEIGHT: usize = 20;
const BRANCHING: u32 = 4;

/// Arena index of the sentinel head. The head is never a successor, so the
/// same index doubles as the nil link.
const HEAD: u32 = 0;
const NIL: u32 = 0;

#[derive(Debug)]
struct Node {
    key: Bytes,
    value: Bytes,
    // The length is the height the node was allocated with.
    next: Vec<u32>,
}

/// Bytes charged for a node on top of its key and value.
#[inline]
fn node_overhead(height: usize) -> usize {
    mem::size_of::<Node>() + height * mem::size_of::<u32>()
}

fn random_height() -> usize {
    let mut rng = rand::thread_rng();
    let mut height = 1;
    while height < MAX_HEIGHT && rng.gen_ratio(1, BRANCHING) {
        height += 1;
    }
    height
}

/// The skip-list proper. Nodes live in an arena and link to each other by
/// index. Slots of unlinked nodes are emptied and handed out again by `put`;
/// iterators never follow a stale index because any unlink bumps the
/// generation first.
struct SkiplistCore {
    nodes: Vec<Node>,
    free: Vec<u32>,
    height: usize,
    len: usize,
    usage: usize,
    // Bumped by every mutation.
    generation: u64,
}

impl SkiplistCore {
    fn with_capacity(capacity: usize) -> Self {
        let mut nodes = Vec::with_capacity(capacity + 1);
        nodes.push(Node {
            key: Bytes::new(),
            value: Bytes::new(),
            next: vec![NIL; MAX_HEIGHT],
        });
        SkiplistCore {
            nodes,
            free: vec![],
            height: 1,
            len: 0,
            usage: 0,
            generation: 0,
        }
    }

    #[inline]
    fn next(&self, node: u32, level: usize) -> u32 {
        self.nodes[node as usize].next[level]
    }

    #[inline]
    fn node(&self, node: u32) -> &Node {
        &self.nodes[node as usize]
    }

    /// Finds the first node whose key is >= `key`, returning it (NIL at the
    /// end of the list) and whether its key equals `key`. If `prev` is given it
    /// receives, for every level in use, the rightmost node whose key < `key`.
    fn find_ge<C: Comparator>(
        &self,
        c: &C,
        key: &[u8],
        mut prev: Option<&mut [u32; MAX_HEIGHT]>,
    ) -> (u32, bool) {
        let mut cursor = HEAD;
        let mut level = self.height - 1;
        loop {
            let next = self.next(cursor, level);
            let cmp = if next == NIL {
                Ordering::Greater
            } else {
                c.compare(&self.node(next).key, key)
            };
            if cmp == Ordering::Less {
                cursor = next;
                continue;
            }
            match prev.as_mut() {
                Some(p) => p[level] = cursor,
                None if cmp == Ordering::Equal => return (next, true),
                None => {}
            }
            if level == 0 {
                return (next, cmp == Ordering::Equal);
            }
            level -= 1;
        }
    }

    /// Returns the last node whose key < `key`, or NIL if there is none.
    fn find_lt<C: Comparator>(&self, c: &C, key: &[u8]) -> u32 {
        let mut cursor = HEAD;
        let mut level = self.height - 1;
        loop {
            let next = self.next(cursor, level);
            if next != NIL && c.compare(&self.node(next).key, key) == Ordering::Less {
                cursor = next;
                continue;
            }
            if level == 0 {
                return cursor;
            }
            level -= 1;
        }
    }

    /// Returns the last node of the list, or NIL if it is empty.
    fn find_last(&self) -> u32 {
        let mut cursor = HEAD;
        let mut level = self.height - 1;
        loop {
            let next = self.next(cursor, level);
            if next != NIL {
                cursor = next;
                continue;
            }
            if level == 0 {
                return cursor;
            }
            level -= 1;
        }
    }

    fn put<C: Comparator>(&mut self, c: &C, key: Bytes, value: Bytes, height: usize) {
        let mut prev = [HEAD; MAX_HEIGHT];
        let (node, exact) = self.find_ge(c, &key, Some(&mut prev));
        self.generation += 1;
        if exact {
            let slot = &mut self.nodes[node as usize];
            let old = mem::replace(&mut slot.value, value);
            self.usage = self.usage + slot.value.len() - old.len();
            return;
        }

        // Levels above the current height already point at the head in `prev`.
        if height > self.height {
            self.height = height;
        }
        let next = (0..height).map(|level| self.next(prev[level], level)).collect();
        self.usage += key.len() + value.len() + node_overhead(height);
        let node = Node { key, value, next };
        let index = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot as usize] = node;
                slot
            }
            None => {
                assert!(self.nodes.len() < u32::MAX as usize, "memdb arena exhausted");
                self.nodes.push(node);
                (self.nodes.len() - 1) as u32
            }
        };
        for (level, p) in prev.iter().enumerate().take(height) {
            self.nodes[*p as usize].next[level] = index;
        }
        self.len += 1;
    }

    fn remove<C: Comparator>(&mut self, c: &C, key: &[u8]) -> Option<Bytes> {
        let mut prev = [HEAD; MAX_HEIGHT];
        let (node, exact) = self.find_ge(c, key, Some(&mut prev));
        if !exact {
            return None;
        }
        let height = self.node(node).next.len();
        for (level, p) in prev.iter().enumerate().take(height) {
            let successor = self.next(node, level);
            self.nodes[*p as usize].next[level] = successor;
        }
        while self.height > 1 && self.next(HEAD, self.height - 1) == NIL {
            self.height -= 1;
        }
        let removed = mem::replace(
            &mut self.nodes[node as usize],
            Node {
                key: Bytes::new(),
                value: Bytes::new(),
                next: vec![],
            },
        );
        self.usage -= removed.key.len() + removed.value.len() + node_overhead(height);
        self.free.push(node);
        self.len -= 1;
        self.generation += 1;
        Some(removed.value)
    }

    fn reset(&mut self) {
        self.nodes.truncate(1);
        self.free.clear();
        for link in self.nodes[HEAD as usize].next.iter_mut() {
            *link = NIL;
        }
        self.height = 1;
        self.len = 0;
        self.usage = 0;
        self.generation += 1;
    }
}

/// An in-memory sorted key/value table backed by a probabilistic skip-list.
///
/// All ordering decisions go through the injected comparator. A single writer
/// and any number of readers may use the table concurrently: readers share a
/// lock for the duration of one traversal, the writer holds it exclusively for
/// one splice. Cloning a `MemDb` yields another handle to the same table.
#[derive(Clone)]
pub struct MemDb<C> {
    core: Arc<ShardedLock<SkiplistCore>>,
    c: C,
}

impl<C: Comparator> MemDb<C> {
    /// Creates an empty table with room for `capacity` entries before the
    /// arena has to grow.
    pub fn new(c: C, capacity: usize) -> Self {
        MemDb {
            core: Arc::new(ShardedLock::new(SkiplistCore::with_capacity(capacity))),
            c,
        }
    }

    fn read(&self) -> ShardedLockReadGuard<'_, SkiplistCore> {
        self.core.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> ShardedLockWriteGuard<'_, SkiplistCore> {
        self.core.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn comparator(&self) -> &C {
        &self.c
    }

    /// Inserts `key` with `value`, overwriting the value if an equal key is
    /// already present.
    pub fn put(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) {
        let height = random_height();
        self.write().put(&self.c, key.into(), value.into(), height);
    }

    /// Returns the value stored under exactly `key`. A zero-length value is
    /// returned as-is; interpreting it is up to the caller.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        let core = self.read();
        match core.find_ge(&self.c, key, None) {
            (node, true) => Some(core.node(node).value.clone()),
            _ => None,
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.read().find_ge(&self.c, key, None).1
    }

    /// Returns the first entry whose key is at or past `key`.
    pub fn find_ge(&self, key: &[u8]) -> Option<(Bytes, Bytes)> {
        let core = self.read();
        let (node, _) = core.find_ge(&self.c, key, None);
        if node == NIL {
            return None;
        }
        let n = core.node(node);
        Some((n.key.clone(), n.value.clone()))
    }

    /// Unlinks the entry for `key`, returning its value.
    pub fn remove(&self, key: &[u8]) -> Option<Bytes> {
        self.write().remove(&self.c, key)
    }

    /// Drops every entry.
    pub fn reset(&self) {
        self.write().reset()
    }

    pub fn len(&self) -> usize {
        self.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Key and value bytes of the live entries plus a fixed per-node charge.
    pub fn approx_memory_usage(&self) -> usize {
        self.read().usage
    }

    /// Returns an unpositioned iterator over the table.
    pub fn iter(&self) -> MemDbIterator<C> {
        MemDbIterator {
            db: self.clone(),
            cursor: Cursor::default(),
        }
    }
}

#[derive(Default)]
struct Cursor {
    node: u32,
    generation: u64,
    key: Bytes,
    value: Bytes,
    invalidated: bool,
}

impl Cursor {
    fn restart(&mut self, core: &SkiplistCore, node: u32) {
        self.generation = core.generation;
        self.invalidated = false;
        self.land(core, node);
    }

    fn land(&mut self, core: &SkiplistCore, node: u32) {
        self.node = node;
        if node == NIL {
            self.key = Bytes::new();
            self.value = Bytes::new();
        } else {
            let n = core.node(node);
            self.key = n.key.clone();
            self.value = n.value.clone();
        }
    }

    /// Returns false, and drops the position, if the table changed since
    /// the cursor was positioned.
    fn still_current(&mut self, core: &SkiplistCore) -> bool {
        if core.generation == self.generation {
            return true;
        }
        self.invalidated = true;
        self.land(core, NIL);
        false
    }
}

/// Ordered iterator over a `MemDb`.
///
/// Every `seek*` call snapshots the table's modification generation. A
/// `next` or `prev` that finds the table modified since then leaves the
/// iterator invalid and `status` reports `Error::IteratorInvalidated`;
/// seeking again restarts it. Keys and values handed out are cheap `Bytes`
/// clones and stay readable regardless.
pub struct MemDbIterator<C> {
    db: MemDb<C>,
    cursor: Cursor,
}

impl<C: Comparator> Iter for MemDbIterator<C> {
    fn valid(&self) -> bool {
        self.cursor.node != NIL
    }

    fn seek_to_first(&mut self) {
        let core = self.db.read();
        let first = core.next(HEAD, 0);
        self.cursor.restart(&core, first);
    }

    fn seek_to_last(&mut self) {
        let core = self.db.read();
        let last = core.find_last();
        self.cursor.restart(&core, last);
    }

    fn seek(&mut self, target: &[u8]) {
        let core = self.db.read();
        let (node, _) = core.find_ge(&self.db.c, target, None);
        self.cursor.restart(&core, node);
    }

    fn next(&mut self) {
        assert!(self.valid());
        let core = self.db.read();
        if self.cursor.still_current(&core) {
            let next = core.next(self.cursor.node, 0);
            self.cursor.land(&core, next);
        }
    }

    fn prev(&mut self) {
        assert!(self.valid());
        let core = self.db.read();
        if self.cursor.still_current(&core) {
            let prev = core.find_lt(&self.db.c, &self.cursor.key);
            self.cursor.land(&core, prev);
        }
    }

    fn key(&self) -> &[u8] {
        assert!(self.valid());
        &self.cursor.key
    }

    fn value(&self) -> &[u8] {
        assert!(self.valid());
        &self.cursor.value
    }

    fn status(&mut self) -> IResult<()> {
        if self.cursor.invalidated {
            return Err(Error::IteratorInvalidated);
        }
        Ok(())
    }
}

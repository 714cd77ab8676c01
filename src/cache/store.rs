//! Time-ordered record cache: arena-backed linked sequence plus key index.
//!
//! Records live in a growable arena and are threaded into a doubly linked
//! sequence between two permanent sentinel nodes, ordered by ascending
//! timestamp with ties in arrival order. A secondary index maps each
//! distinct timestamp to the *first* node carrying it, so an index-seeded
//! range scan never skips same-key nodes. Links and index values are stable
//! arena handles, never references.
//!
//! Every operation serializes on one reentrant lock over the whole
//! structure. Reentrancy matters: bulk operations such as [`FileCache::
//! init_cache`] hold the lock while invoking `insert` on the same thread.
//! Cache sizes are bounded by on-disk file counts, so whole-structure
//! locking is simpler than node-level locking and fast enough.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDateTime;
use parking_lot::ReentrantMutex;
use regex::{Regex, RegexBuilder};
use walkdir::WalkDir;

use super::error::CacheError;
use super::record::MsdRecord;

const HEAD: usize = 0;
const TAIL: usize = 1;
const NIL: usize = usize::MAX;

struct Node {
    /// `None` only for the two sentinels.
    record: Option<MsdRecord>,
    prev: usize,
    next: usize,
}

struct CacheState {
    nodes: Vec<Node>,
    free: Vec<usize>,
    /// timestamp -> first node in sequence order carrying that timestamp.
    index: HashMap<NaiveDateTime, usize>,
    len: usize,
}

impl CacheState {
    fn new() -> Self {
        Self {
            nodes: vec![
                Node {
                    record: None,
                    prev: NIL,
                    next: TAIL,
                },
                Node {
                    record: None,
                    prev: HEAD,
                    next: NIL,
                },
            ],
            free: Vec::new(),
            index: HashMap::new(),
            len: 0,
        }
    }

    fn key_of(&self, id: usize) -> Option<NaiveDateTime> {
        self.nodes[id].record.as_ref().map(MsdRecord::timestamp)
    }

    fn alloc(&mut self, node: Node) -> usize {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    /// First data node matching `record` by path and key, in sequence order.
    fn find(&self, record: &MsdRecord) -> Option<usize> {
        let mut id = self.nodes[HEAD].next;
        while id != TAIL {
            if let Some(current) = self.nodes[id].record.as_ref() {
                if current.path() == record.path() && current.timestamp() == record.timestamp() {
                    return Some(id);
                }
            }
            id = self.nodes[id].next;
        }
        None
    }

    /// Detach `id` from the index: repoint the entry to the next node
    /// sharing the key, or drop the entry when `id` was the last one.
    fn unindex(&mut self, id: usize, key: NaiveDateTime) {
        if self.index.get(&key) != Some(&id) {
            return;
        }
        let next = self.nodes[id].next;
        if self.key_of(next) == Some(key) {
            self.index.insert(key, next);
        } else {
            self.index.remove(&key);
        }
    }

    fn unlink(&mut self, id: usize) {
        let prev = self.nodes[id].prev;
        let next = self.nodes[id].next;
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
        self.nodes[id] = Node {
            record: None,
            prev: NIL,
            next: NIL,
        };
        self.free.push(id);
        self.len -= 1;
    }
}

/// How [`FileCache::query_by_path`] matches records.
pub enum PathQuery<'a> {
    /// Absolute path, compared for equality.
    Exact(&'a Path),
    /// Pattern matched against each record's path. Build prefix patterns
    /// with [`prefix_pattern`] for case-insensitive anchored matching.
    Pattern(&'a Regex),
}

/// Anchored, escaped, case-insensitive pattern matching every path that
/// starts with `path`. Used to purge a deleted directory's records, since
/// directory deletions do not enumerate children.
pub fn prefix_pattern(path: &Path) -> Result<Regex, CacheError> {
    RegexBuilder::new(&format!("^{}", regex::escape(&path.to_string_lossy())))
        .case_insensitive(true)
        .build()
        .map_err(|e| CacheError::InvalidArgument {
            argument: "pattern",
            reason: e.to_string(),
        })
}

/// Thread-safe, time-ordered index of recognized MSD files.
///
/// Queries return owned snapshots; internal nodes are never exposed.
pub struct FileCache {
    state: ReentrantMutex<RefCell<CacheState>>,
}

impl FileCache {
    pub fn new() -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(CacheState::new())),
        }
    }

    /// Insert in key order. The record lands before the first node with a
    /// strictly greater key, so arrivals sharing a key keep arrival order.
    pub fn insert(&self, record: MsdRecord) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();

        let key = record.timestamp();
        let mut pos = state.nodes[HEAD].next;
        while pos != TAIL {
            match state.key_of(pos) {
                Some(current) if current <= key => pos = state.nodes[pos].next,
                _ => break,
            }
        }

        let prev = state.nodes[pos].prev;
        let id = state.alloc(Node {
            record: Some(record),
            prev,
            next: pos,
        });
        state.nodes[prev].next = id;
        state.nodes[pos].prev = id;
        state.index.entry(key).or_insert(id);
        state.len += 1;
    }

    /// Unlink the node matching `record` (path and key). Returns whether a
    /// node was removed.
    pub fn delete(&self, record: &MsdRecord) -> bool {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();

        let Some(id) = state.find(record) else {
            return false;
        };
        if let Some(key) = state.key_of(id) {
            state.unindex(id, key);
        }
        state.unlink(id);
        true
    }

    /// Splice `new` into `old`'s exact sequence position, adjusting the
    /// index as a delete-then-insert-at-the-same-slot would.
    ///
    /// The sequence is *not* re-sorted: callers replacing a record with one
    /// whose key differs from its neighbors' keep the old structural
    /// position and accept the resulting ordering. Returns whether a node
    /// matching `old` was found.
    pub fn replace(&self, old: &MsdRecord, new: MsdRecord) -> bool {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();

        let Some(id) = state.find(old) else {
            return false;
        };
        let old_key = old.timestamp();
        let new_key = new.timestamp();
        if old_key != new_key {
            state.unindex(id, old_key);
        }
        state.nodes[id].record = Some(new);
        if old_key != new_key {
            state.index.entry(new_key).or_insert(id);
        }
        true
    }

    /// Linear scan by path. `Exact` requires an absolute path; `Pattern`
    /// matches the supplied pattern against each record's path.
    pub fn query_by_path(&self, query: PathQuery<'_>) -> Result<Vec<MsdRecord>, CacheError> {
        if let PathQuery::Exact(path) = &query {
            if !path.is_absolute() {
                return Err(CacheError::InvalidArgument {
                    argument: "path",
                    reason: format!("{} is not an absolute path", path.display()),
                });
            }
        }

        let guard = self.state.lock();
        let state = guard.borrow();

        let mut matches = Vec::new();
        let mut id = state.nodes[HEAD].next;
        while id != TAIL {
            if let Some(record) = state.nodes[id].record.as_ref() {
                let hit = match &query {
                    PathQuery::Exact(path) => record.path() == *path,
                    PathQuery::Pattern(pattern) => {
                        pattern.is_match(&record.path().to_string_lossy())
                    }
                };
                if hit {
                    matches.push(record.clone());
                }
            }
            id = state.nodes[id].next;
        }
        Ok(matches)
    }

    /// Ordered range query over keys, inclusive on both bounds. At least
    /// one bound is required. When `from` is indexed the scan starts at the
    /// indexed node; otherwise it walks from the head to the first key that
    /// is not below `from`.
    pub fn query_by_range(
        &self,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> Result<Vec<MsdRecord>, CacheError> {
        if from.is_none() && to.is_none() {
            return Err(CacheError::InvalidArgument {
                argument: "range",
                reason: "at least one bound is required".to_string(),
            });
        }

        let guard = self.state.lock();
        let state = guard.borrow();

        let mut id = match from {
            Some(from_key) => match state.index.get(&from_key) {
                Some(&indexed) => indexed,
                None => {
                    let mut id = state.nodes[HEAD].next;
                    while id != TAIL {
                        match state.key_of(id) {
                            Some(key) if key < from_key => id = state.nodes[id].next,
                            _ => break,
                        }
                    }
                    id
                }
            },
            None => state.nodes[HEAD].next,
        };

        let mut matches = Vec::new();
        while id != TAIL {
            let Some(record) = state.nodes[id].record.as_ref() else {
                break;
            };
            if let Some(to_key) = to {
                if record.timestamp() > to_key {
                    break;
                }
            }
            matches.push(record.clone());
            id = state.nodes[id].next;
        }
        Ok(matches)
    }

    /// Bulk-populate from a directory tree: every file under `path` that
    /// validates is inserted; non-conforming names are skipped. Returns the
    /// number of records inserted. Holds the cache lock for the whole walk
    /// so readers never observe a half-built cache.
    pub fn init_cache(&self, path: &Path) -> usize {
        let _guard = self.state.lock();

        let mut inserted = 0;
        for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            match MsdRecord::from_path(entry.path()) {
                Ok(record) => {
                    self.insert(record);
                    inserted += 1;
                }
                Err(_) => {
                    crate::debug_event!("cache", "skipped", "{}", entry.path().display());
                }
            }
        }
        crate::log_event!("cache", "initialized", "{inserted} records from {}", path.display());
        inserted
    }

    /// Remove every record, back to the two empty sentinels.
    pub fn clear_cache(&self) {
        let guard = self.state.lock();
        *guard.borrow_mut() = CacheState::new();
    }

    /// Full snapshot in sequence order.
    pub fn records(&self) -> Vec<MsdRecord> {
        let guard = self.state.lock();
        let state = guard.borrow();

        let mut records = Vec::with_capacity(state.len);
        let mut id = state.nodes[HEAD].next;
        while id != TAIL {
            if let Some(record) = state.nodes[id].record.as_ref() {
                records.push(record.clone());
            }
            id = state.nodes[id].next;
        }
        records
    }

    pub fn len(&self) -> usize {
        self.state.lock().borrow().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new()
    }
}

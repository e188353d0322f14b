//! Content-hash cache used to drop saves that did not change a document.

use indexmap::IndexMap;

/// Last seen content of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedContent {
    /// Hex MD5 of the full text.
    pub hash: String,
    /// Host document revision.
    pub revision: i64,
}

/// LRU map from absolute path to [`CachedContent`].
#[derive(Debug)]
pub struct DocumentContentCache {
    entries: IndexMap<String, CachedContent>,
    capacity: usize,
}

/// Hex MD5 of `text`.
pub fn content_hash(text: &str) -> String {
    format!("{:x}", md5::compute(text.as_bytes()))
}

impl DocumentContentCache {
    /// Cache holding at most `capacity` documents (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record a save; returns true when the content differs from the cached one.
    ///
    /// Unknown paths count as changed. The entry is refreshed either way.
    pub fn observe(&mut self, path: &str, text: &str, revision: i64) -> bool {
        let hash = content_hash(text);
        let changed = self
            .entries
            .get(path)
            .is_none_or(|cached| cached.hash != hash);
        self.put(path, CachedContent { hash, revision });
        changed
    }

    /// Seed an entry without reporting a change.
    pub fn prime(&mut self, path: &str, text: &str, revision: i64) {
        self.put(
            path,
            CachedContent {
                hash: content_hash(text),
                revision,
            },
        );
    }

    /// Drop a path, e.g. after a delete.
    pub fn forget(&mut self, path: &str) {
        self.entries.shift_remove(path);
    }

    /// Cached content for `path`.
    pub fn get(&self, path: &str) -> Option<&CachedContent> {
        self.entries.get(path)
    }

    /// Cached documents.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Change the bound, evicting the oldest entries if needed.
    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.evict();
    }

    fn put(&mut self, path: &str, content: CachedContent) {
        self.entries.shift_remove(path);
        self.entries.insert(path.to_owned(), content);
        self.evict();
    }

    fn evict(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.shift_remove_index(0);
        }
    }
}

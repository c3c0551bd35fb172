//! In-memory journal index with LRU ordering and size accounting

use std::collections::BTreeMap;

use hashbrown::HashMap;

/// A committed generation of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub generation: u64,
    pub lengths: Vec<u64>,
}

impl Committed {
    pub fn size(&self) -> u64 {
        self.lengths
            .iter()
            .fold(0, |total, &length| total.saturating_add(length))
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndexEntry {
    /// Readable generation, if any
    pub committed: Option<Committed>,
    /// Generation being written by an open editor
    pub editing: Option<u64>,
    recency: u64,
}

/// Key → entry map plus an access-ordered view used for eviction.
///
/// `order` maps a monotonically increasing access tick to the key, so the
/// first element is always the least recently used entry.
#[derive(Debug, Default)]
pub struct Index {
    entries: HashMap<String, IndexEntry>,
    order: BTreeMap<u64, String>,
    tick: u64,
    size: u64,
    committed_count: usize,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total size of every committed generation.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of keys with a committed generation.
    pub fn len(&self) -> usize {
        self.committed_count
    }

    pub fn is_empty(&self) -> bool {
        self.committed_count == 0
    }

    pub fn get(&self, key: &str) -> Option<&IndexEntry> {
        self.entries.get(key)
    }

    pub fn committed(&self, key: &str) -> Option<&Committed> {
        self.entries.get(key).and_then(|entry| entry.committed.as_ref())
    }

    /// Marks `key` as most recently used. Returns false for unknown keys.
    pub fn touch(&mut self, key: &str) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        self.order.remove(&entry.recency);
        self.tick += 1;
        entry.recency = self.tick;
        self.order.insert(self.tick, key.to_string());
        true
    }

    /// Records an editor for `key`, creating the entry if needed.
    ///
    /// Returns false when an editor is already registered.
    pub fn begin_edit(&mut self, key: &str, generation: u64) -> bool {
        if let Some(entry) = self.entries.get_mut(key) {
            if entry.editing.is_some() {
                return false;
            }
            entry.editing = Some(generation);
            return true;
        }
        self.tick += 1;
        self.entries.insert(
            key.to_string(),
            IndexEntry {
                committed: None,
                editing: Some(generation),
                recency: self.tick,
            },
        );
        self.order.insert(self.tick, key.to_string());
        true
    }

    /// Clears the editor of `key`, dropping the entry if nothing was committed.
    pub fn end_edit(&mut self, key: &str) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        entry.editing = None;
        if entry.committed.is_none() {
            self.drop_entry(key);
        }
    }

    /// Installs a committed generation, ends any edit and bumps recency.
    ///
    /// Returns the generation it replaced.
    pub fn commit(&mut self, key: &str, committed: Committed) -> Option<Committed> {
        let size = committed.size();
        let entry = self.entries.entry(key.to_string()).or_default();
        entry.editing = None;
        let previous = entry.committed.replace(committed);
        match &previous {
            Some(old) => self.size = self.size.saturating_sub(old.size()),
            None => self.committed_count += 1,
        }
        self.size = self.size.saturating_add(size);
        self.touch(key);
        previous
    }

    /// Removes the committed generation of `key`, keeping the entry alive
    /// while an editor is open.
    pub fn take_committed(&mut self, key: &str) -> Option<Committed> {
        let entry = self.entries.get_mut(key)?;
        let committed = entry.committed.take()?;
        self.size = self.size.saturating_sub(committed.size());
        self.committed_count -= 1;
        if entry.editing.is_none() {
            self.drop_entry(key);
        }
        Some(committed)
    }

    /// Forgets `key` entirely, as a `REMOVE` record does.
    pub fn remove(&mut self, key: &str) -> Option<IndexEntry> {
        let entry = self.drop_entry(key)?;
        if let Some(committed) = &entry.committed {
            self.size = self.size.saturating_sub(committed.size());
            self.committed_count -= 1;
        }
        Some(entry)
    }

    /// Least recently used key that has a committed generation.
    pub fn oldest_committed(&self) -> Option<&str> {
        self.order
            .values()
            .find(|key| self.committed(key).is_some())
            .map(String::as_str)
    }

    /// Entries from least to most recently used.
    pub fn iter_lru(&self) -> impl Iterator<Item = (&str, &IndexEntry)> {
        self.order
            .values()
            .filter_map(|key| self.entries.get(key).map(|entry| (key.as_str(), entry)))
    }

    /// Drops every pending editor, as happens when a journal is replayed.
    pub fn discard_edits(&mut self) {
        let pending: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.editing.is_some())
            .map(|(key, _)| key.clone())
            .collect();
        for key in pending {
            self.end_edit(&key);
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn drop_entry(&mut self, key: &str) -> Option<IndexEntry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.recency);
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committed(generation: u64, lengths: &[u64]) -> Committed {
        Committed {
            generation,
            lengths: lengths.to_vec(),
        }
    }

    #[test]
    fn commit_tracks_size_and_replacement() {
        let mut index = Index::new();
        assert!(index.commit("a", committed(1, &[10, 2])).is_none());
        assert!(index.commit("b", committed(2, &[5, 1])).is_none());
        assert_eq!(index.size(), 18);
        assert_eq!(index.len(), 2);

        let old = index.commit("a", committed(3, &[1, 1])).unwrap();
        assert_eq!(old.generation, 1);
        assert_eq!(index.size(), 8);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn touch_moves_entry_to_most_recent() {
        let mut index = Index::new();
        index.commit("a", committed(1, &[1]));
        index.commit("b", committed(2, &[1]));
        index.commit("c", committed(3, &[1]));
        assert_eq!(index.oldest_committed(), Some("a"));

        assert!(index.touch("a"));
        assert_eq!(index.oldest_committed(), Some("b"));
        let order: Vec<&str> = index.iter_lru().map(|(key, _)| key).collect();
        assert_eq!(order, ["b", "c", "a"]);
        assert!(!index.touch("missing"));
    }

    #[test]
    fn only_one_editor_per_key() {
        let mut index = Index::new();
        assert!(index.begin_edit("a", 1));
        assert!(!index.begin_edit("a", 2));
        assert!(index.committed("a").is_none());
        assert_eq!(index.oldest_committed(), None);

        index.end_edit("a");
        assert!(index.get("a").is_none());
        assert!(index.begin_edit("a", 3));
    }

    #[test]
    fn take_committed_keeps_entry_under_edit() {
        let mut index = Index::new();
        index.commit("a", committed(1, &[4, 4]));
        assert!(index.begin_edit("a", 2));

        let taken = index.take_committed("a").unwrap();
        assert_eq!(taken.generation, 1);
        assert_eq!(index.size(), 0);
        assert_eq!(index.get("a").and_then(|entry| entry.editing), Some(2));

        index.end_edit("a");
        assert!(index.get("a").is_none());
    }

    #[test]
    fn discard_edits_keeps_committed_generations() {
        let mut index = Index::new();
        index.commit("a", committed(1, &[1]));
        index.begin_edit("a", 2);
        index.begin_edit("b", 3);

        index.discard_edits();
        assert_eq!(index.committed("a").map(|c| c.generation), Some(1));
        assert!(index.get("a").unwrap().editing.is_none());
        assert!(index.get("b").is_none());
    }

    #[test]
    fn size_accounting_saturates() {
        let mut index = Index::new();
        index.commit("k1", committed(1, &[u64::MAX, 0]));
        index.commit("k2", committed(2, &[7, 0]));
        assert_eq!(index.size(), u64::MAX);

        index.remove("k1");
        index.remove("k2");
        assert_eq!(index.size(), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn remove_frees_size() {
        let mut index = Index::new();
        index.commit("a", committed(1, &[7]));
        assert!(index.remove("a").is_some());
        assert_eq!(index.size(), 0);
        assert!(index.is_empty());
        assert!(index.remove("a").is_none());
    }
}

//! Sequential read of a committed tree.

use arbor_store::{EntryCursor, PartRef, PartStore, StoreResult, TreePartitionSequence, TreeStore};
use arbor_types::{Entry, EntryPath, TreeId};

use crate::error::TreeResult;

/// Reads every entry of a tree in path order, opening parts lazily.
pub struct TreeCursor<'a> {
    store: &'a dyn PartStore,
    parts: Vec<PartRef>,
    next_part: usize,
    current: Option<Box<dyn EntryCursor + 'a>>,
    after: Option<EntryPath>,
}

impl<'a> TreeCursor<'a> {
    /// Cursor over `tree`, starting strictly after `after` when given.
    ///
    /// Parts entirely at or before `after` are never opened.
    pub fn new(store: &'a dyn PartStore, tree: TreePartitionSequence, after: Option<&EntryPath>) -> Self {
        let next_part = after.map_or(0, |a| tree.parts().partition_point(|p| p.max_path <= *a));
        Self {
            store,
            parts: tree.into_parts(),
            next_part,
            current: None,
            after: after.cloned(),
        }
    }

    /// Load `tree` from `trees` and open a cursor over it.
    pub fn open(
        store: &'a dyn PartStore,
        trees: &dyn TreeStore,
        tree: &TreeId,
        after: Option<&EntryPath>,
    ) -> TreeResult<Self> {
        let sequence = trees.load_tree(tree)?;
        Ok(Self::new(store, sequence, after))
    }

    /// Number of parts not yet opened.
    pub fn parts_remaining(&self) -> usize {
        self.parts.len() - self.next_part
    }
}

impl EntryCursor for TreeCursor<'_> {
    fn next_entry(&mut self) -> StoreResult<Option<Entry>> {
        loop {
            if let Some(cursor) = self.current.as_mut() {
                match cursor.next_entry()? {
                    Some(entry) => {
                        if self.after.as_ref().is_some_and(|a| entry.path <= *a) {
                            continue;
                        }
                        self.after = None;
                        return Ok(Some(entry));
                    }
                    None => self.current = None,
                }
            }
            let Some(part) = self.parts.get(self.next_part) else {
                return Ok(None);
            };
            let from = self.after.clone().unwrap_or_else(EntryPath::minimal);
            self.current = Some(self.store.open_part_cursor(&part.name, &from)?);
            self.next_part += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_store::{collect_entries, InMemoryPartStore, StoreError};

    fn tree(store: &InMemoryPartStore, groups: &[&[&str]]) -> TreePartitionSequence {
        let parts = groups
            .iter()
            .map(|paths| {
                let entries: Vec<Entry> = paths.iter().map(|p| Entry::tombstone(*p)).collect();
                store.write_part(&entries).unwrap()
            })
            .collect();
        TreePartitionSequence::new(parts).unwrap()
    }

    fn paths(cursor: &mut TreeCursor<'_>) -> Vec<String> {
        collect_entries(cursor)
            .unwrap()
            .into_iter()
            .map(|e| e.path.into_string())
            .collect()
    }

    #[test]
    fn reads_all_parts_in_order() {
        let store = InMemoryPartStore::new();
        let seq = tree(&store, &[&["a", "b"], &["c"], &["d", "e"]]);
        let mut cursor = TreeCursor::new(&store, seq, None);
        assert_eq!(paths(&mut cursor), vec!["a", "b", "c", "d", "e"]);
        assert!(cursor.next_entry().unwrap().is_none());
    }

    #[test]
    fn resumes_strictly_after() {
        let store = InMemoryPartStore::new();
        let seq = tree(&store, &[&["a", "b"], &["c"], &["d", "e"]]);
        let mut cursor = TreeCursor::new(&store, seq.clone(), Some(&"c".into()));
        assert_eq!(cursor.parts_remaining(), 1);
        assert_eq!(paths(&mut cursor), vec!["d", "e"]);

        let mut cursor = TreeCursor::new(&store, seq, Some(&"bb".into()));
        assert_eq!(paths(&mut cursor), vec!["c", "d", "e"]);
    }

    #[test]
    fn after_last_path_is_empty() {
        let store = InMemoryPartStore::new();
        let seq = tree(&store, &[&["a"]]);
        let mut cursor = TreeCursor::new(&store, seq, Some(&"z".into()));
        assert!(cursor.next_entry().unwrap().is_none());
    }

    #[test]
    fn empty_tree_id_reads_nothing() {
        let store = InMemoryPartStore::new();
        let mut cursor = TreeCursor::open(&store, &store, &TreeId::empty(), None).unwrap();
        assert!(cursor.next_entry().unwrap().is_none());
    }

    #[test]
    fn missing_part_surfaces_on_read() {
        let store = InMemoryPartStore::new();
        let ghost = PartRef::new(arbor_types::PartName::from_hash([1; 32]), "m");
        let seq = TreePartitionSequence::new(vec![ghost]).unwrap();
        let mut cursor = TreeCursor::new(&store, seq, None);
        assert!(matches!(cursor.next_entry(), Err(StoreError::PartNotFound(_))));
    }
}

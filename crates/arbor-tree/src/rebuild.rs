//! Copy-on-write rebuild of a partitioned tree.
//!
//! A rebuild walks a path-ordered stream of mutations alongside the base
//! tree. Base parts no mutation falls into are carried over by reference.
//! Each part a mutation falls into is opened and merged with the mutations,
//! and the merged entries are re-cut into new parts of at most
//! [`RebuildOptions::target_part_entries`] entries.
//!
//! Written parts never span a reused part: whenever the walk skips over a
//! reused part, pending output is flushed first.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use arbor_store::{EntryCursor, PartRef, PartStore, TreePartitionSequence, TreeStore};
use arbor_types::{Entry, EntryPath, PartName, TreeId};

use crate::error::{TreeError, TreeResult};
use crate::manager::{BasePart, BaseTreeManager};
use crate::pushback::PushbackCursor;

/// Part size used when no options are given.
pub const DEFAULT_TARGET_PART_ENTRIES: usize = 1024;

/// One change to apply to a tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    /// Insert or replace the entry at its path. Tombstones are stored like
    /// any other entry, so they keep shadowing ancestor content.
    Put(Entry),
    /// Remove the path if present.
    Remove(EntryPath),
}

impl Mutation {
    pub fn path(&self) -> &EntryPath {
        match self {
            Self::Put(entry) => &entry.path,
            Self::Remove(path) => path,
        }
    }

    fn into_entry(self) -> Option<Entry> {
        match self {
            Self::Put(entry) => Some(entry),
            Self::Remove(_) => None,
        }
    }
}

impl From<Entry> for Mutation {
    fn from(entry: Entry) -> Self {
        Self::Put(entry)
    }
}

/// Tuning for [`TreeRebuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebuildOptions {
    /// Maximum number of entries per written part.
    pub target_part_entries: usize,
    /// Merge entries beyond the end of the base into its final part rather
    /// than starting a new trailing part.
    pub extend_last_part: bool,
}

impl Default for RebuildOptions {
    fn default() -> Self {
        Self {
            target_part_entries: DEFAULT_TARGET_PART_ENTRIES,
            extend_last_part: true,
        }
    }
}

/// Result of one rebuild.
#[derive(Clone, Debug)]
pub struct RebuildOutcome {
    pub tree: TreePartitionSequence,
    pub tree_id: TreeId,
    /// Base parts carried over by reference.
    pub reused: usize,
    /// New parts written.
    pub written: usize,
    /// Base parts opened and rewritten.
    pub opened: usize,
}

/// Applies mutations to a base tree and saves the resulting tree.
pub struct TreeRebuilder<'a> {
    parts: &'a dyn PartStore,
    trees: &'a dyn TreeStore,
    options: RebuildOptions,
}

impl<'a> TreeRebuilder<'a> {
    pub fn new(parts: &'a dyn PartStore, trees: &'a dyn TreeStore) -> Self {
        Self::with_options(parts, trees, RebuildOptions::default())
    }

    pub fn with_options(
        parts: &'a dyn PartStore,
        trees: &'a dyn TreeStore,
        options: RebuildOptions,
    ) -> Self {
        Self {
            parts,
            trees,
            options,
        }
    }

    pub fn options(&self) -> &RebuildOptions {
        &self.options
    }

    /// Apply `mutations`, which must be strictly increasing by path, to the
    /// tree `base` and save the result.
    ///
    /// Nothing is saved if any step fails; parts already written stay in
    /// the store unreferenced.
    pub fn apply<I>(&self, base: &TreeId, mutations: I) -> TreeResult<RebuildOutcome>
    where
        I: IntoIterator<Item = Mutation>,
    {
        let mut manager = BaseTreeManager::load(self.parts, self.trees, base)?;
        let mut writer = PartWriter::new(self.parts, self.options.target_part_entries);
        let mut active: Option<ActivePart<'a>> = None;
        let mut previous: Option<EntryPath> = None;

        for mutation in mutations {
            let path = mutation.path().clone();
            if let Some(prev) = &previous {
                if *prev >= path {
                    return Err(TreeError::UnorderedMutations {
                        previous: prev.clone(),
                        next: path,
                    });
                }
            }

            if !manager.is_path_covered(&path) {
                if let Some(done) = active.take() {
                    done.drain_into(&mut writer)?;
                }
                let reused_before = manager.reused_count();
                let extend = self.options.extend_last_part
                    && !manager.was_last_part_processed()
                    && manager.base_max_path().is_some_and(|max| path > *max);
                let next = if extend {
                    manager.last_part_cursor()?
                } else {
                    manager.part_for_path(&path)?
                };
                if manager.reused_count() > reused_before {
                    writer.flush()?;
                }
                active = ActivePart::from_base(next);
            }

            if let Some(part) = active.as_mut() {
                part.copy_below(&path, &mut writer)?;
            }
            if let Some(entry) = mutation.into_entry() {
                writer.push(entry)?;
            }
            previous = Some(path);
        }

        if let Some(done) = active.take() {
            done.drain_into(&mut writer)?;
        }
        let written = writer.finish()?;
        let opened = manager.opened_parts().len();
        let reused = manager.into_reusable_parts();

        let tree = assemble(&reused, &written)?;
        let tree_id = self.trees.save_tree(&tree)?;
        debug!(
            base = %base.short_hex(),
            tree = %tree_id.short_hex(),
            reused = reused.len(),
            written = written.len(),
            opened,
            "rebuilt tree"
        );
        Ok(RebuildOutcome {
            tree,
            tree_id,
            reused: reused.len(),
            written: written.len(),
            opened,
        })
    }
}

/// Merge reused and written parts into one sequence, checking that no
/// written part reaches back into the range of the part before it.
fn assemble(reused: &[PartRef], written: &[WrittenPart]) -> TreeResult<TreePartitionSequence> {
    let mut slots: Vec<(Option<&EntryPath>, &PartRef)> = reused
        .iter()
        .map(|part| (None, part))
        .chain(written.iter().map(|w| (Some(&w.first_path), &w.part)))
        .collect();
    slots.sort_by(|a, b| a.1.max_path.cmp(&b.1.max_path));

    for pair in slots.windows(2) {
        let previous = &pair[0].1.max_path;
        let lower = pair[1].0.unwrap_or(&pair[1].1.max_path);
        if lower <= previous {
            return Err(TreeError::BoundaryViolation {
                previous: previous.clone(),
                next: lower.clone(),
            });
        }
    }
    let parts = slots.into_iter().map(|(_, part)| part.clone()).collect();
    Ok(TreePartitionSequence::new(parts)?)
}

/// The base part currently being merged.
struct ActivePart<'a> {
    name: PartName,
    cursor: PushbackCursor<'a>,
}

impl<'a> ActivePart<'a> {
    fn from_base(part: BasePart<'a>) -> Option<Self> {
        match part {
            BasePart::Opened { part, cursor } => Some(Self {
                name: part.name,
                cursor,
            }),
            BasePart::Exhausted => None,
        }
    }

    fn next(&mut self) -> TreeResult<Option<Entry>> {
        self.cursor
            .next_entry()
            .map_err(|source| TreeError::PartCursor {
                part: self.name,
                source,
            })
    }

    /// Copy base entries ordering before `path`. A base entry at `path`
    /// itself is consumed and dropped: the mutation replaces it.
    fn copy_below(&mut self, path: &EntryPath, writer: &mut PartWriter<'_>) -> TreeResult<()> {
        loop {
            let next = match self.cursor.peek() {
                Ok(Some(entry)) => entry.path.cmp(path),
                Ok(None) => break,
                Err(source) => {
                    return Err(TreeError::PartCursor {
                        part: self.name,
                        source,
                    })
                }
            };
            match next {
                Ordering::Less => {
                    if let Some(entry) = self.next()? {
                        writer.push(entry)?;
                    }
                }
                Ordering::Equal => {
                    self.next()?;
                    break;
                }
                Ordering::Greater => break,
            }
        }
        Ok(())
    }

    fn drain_into(mut self, writer: &mut PartWriter<'_>) -> TreeResult<()> {
        while let Some(entry) = self.next()? {
            writer.push(entry)?;
        }
        Ok(())
    }
}

struct WrittenPart {
    first_path: EntryPath,
    part: PartRef,
}

/// Buffers output entries and cuts them into parts.
struct PartWriter<'a> {
    store: &'a dyn PartStore,
    target: usize,
    pending: Vec<Entry>,
    written: Vec<WrittenPart>,
}

impl<'a> PartWriter<'a> {
    fn new(store: &'a dyn PartStore, target: usize) -> Self {
        let target = target.max(1);
        Self {
            store,
            target,
            pending: Vec::with_capacity(target),
            written: Vec::new(),
        }
    }

    fn push(&mut self, entry: Entry) -> TreeResult<()> {
        self.pending.push(entry);
        if self.pending.len() >= self.target {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> TreeResult<()> {
        let Some(first) = self.pending.first() else {
            return Ok(());
        };
        let first_path = first.path.clone();
        let part = self.store.write_part(&self.pending)?;
        debug!(
            part = %part.name.short_hex(),
            entries = self.pending.len(),
            max_path = %part.max_path,
            "wrote part"
        );
        self.pending.clear();
        self.written.push(WrittenPart { first_path, part });
        Ok(())
    }

    fn finish(mut self) -> TreeResult<Vec<WrittenPart>> {
        self.flush()?;
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree_cursor::TreeCursor;
    use arbor_store::{collect_entries, FsPartStore, InMemoryPartStore};
    use arbor_types::EntryValue;
    use proptest::prelude::*;
    use std::collections::{BTreeMap, HashSet};

    fn put(path: &str, tag: &str) -> Mutation {
        Mutation::Put(Entry::new(path, EntryValue::new(format!("s3://bucket/{tag}"), tag, 1)))
    }

    fn options(target: usize, extend: bool) -> RebuildOptions {
        RebuildOptions {
            target_part_entries: target,
            extend_last_part: extend,
        }
    }

    fn read_all(store: &InMemoryPartStore, tree: &TreeId) -> Vec<(String, String)> {
        let mut cursor = TreeCursor::open(store, store, tree, None).unwrap();
        collect_entries(&mut cursor)
            .unwrap()
            .into_iter()
            .map(|e| {
                let checksum = e.value().map(|v| v.checksum.clone()).unwrap_or_default();
                (e.path.into_string(), checksum)
            })
            .collect()
    }

    /// a..i in parts {a,b,c} {d,e,f} {g,h,i}
    fn nine_entry_base(store: &InMemoryPartStore) -> RebuildOutcome {
        let rebuilder = TreeRebuilder::with_options(store, store, options(3, false));
        let puts = "abcdefghi".chars().map(|c| put(&c.to_string(), "v1"));
        rebuilder.apply(&TreeId::empty(), puts).unwrap()
    }

    #[test]
    fn fresh_tree_is_cut_at_target_size() {
        let store = InMemoryPartStore::new();
        let rebuilder = TreeRebuilder::with_options(&store, &store, options(3, true));
        let out = rebuilder
            .apply(&TreeId::empty(), "abcdefg".chars().map(|c| put(&c.to_string(), "v")))
            .unwrap();
        assert_eq!(out.written, 3);
        assert_eq!(out.reused, 0);
        assert_eq!(out.opened, 0);
        let bounds: Vec<&str> = out.tree.parts().iter().map(|p| p.max_path.as_str()).collect();
        assert_eq!(bounds, vec!["c", "f", "g"]);
        assert_eq!(read_all(&store, &out.tree_id).len(), 7);
    }

    #[test]
    fn untouched_parts_are_reused_by_reference() {
        let store = InMemoryPartStore::new();
        let base = nine_entry_base(&store);
        let rebuilder = TreeRebuilder::with_options(&store, &store, options(3, false));
        let out = rebuilder.apply(&base.tree_id, vec![put("e", "v2")]).unwrap();

        assert_eq!(out.reused, 2);
        assert_eq!(out.opened, 1);
        assert_eq!(out.written, 1);
        assert_eq!(out.tree.parts()[0], base.tree.parts()[0]);
        assert_eq!(out.tree.parts()[2], base.tree.parts()[2]);
        assert_ne!(out.tree.parts()[1], base.tree.parts()[1]);

        let entries = read_all(&store, &out.tree_id);
        assert_eq!(entries[4], ("e".to_string(), "v2".to_string()));
        assert_eq!(entries.len(), 9);
    }

    #[test]
    fn touching_both_parts_opens_both_and_keeps_boundaries_disjoint() {
        let store = InMemoryPartStore::new();
        let rebuilder = TreeRebuilder::with_options(&store, &store, options(3, false));
        let base = rebuilder
            .apply(&TreeId::empty(), ["a", "f", "m", "n", "t", "z"].map(|p| put(p, "v1")))
            .unwrap();
        let bounds: Vec<&str> = base.tree.parts().iter().map(|p| p.max_path.as_str()).collect();
        assert_eq!(bounds, vec!["m", "z"]);

        let out = rebuilder
            .apply(&base.tree_id, vec![put("a", "v2"), put("t", "v2")])
            .unwrap();
        // "a" lies inside the first part, so it cannot be reused as-is.
        assert_eq!(out.opened, 2);
        assert_eq!(out.reused, 0);
        out.tree.validate().unwrap();

        let entries = read_all(&store, &out.tree_id);
        let paths: Vec<&str> = entries.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["a", "f", "m", "n", "t", "z"]);
        assert_eq!(entries[0].1, "v2");
        assert_eq!(entries[4].1, "v2");
        assert_eq!(entries[5].1, "v1");
    }

    #[test]
    fn touching_only_second_part_reuses_first() {
        let store = InMemoryPartStore::new();
        let rebuilder = TreeRebuilder::with_options(&store, &store, options(3, false));
        let base = rebuilder
            .apply(&TreeId::empty(), ["a", "f", "m", "n", "t", "z"].map(|p| put(p, "v1")))
            .unwrap();
        let out = rebuilder.apply(&base.tree_id, vec![put("t", "v2")]).unwrap();
        assert_eq!(out.reused, 1);
        assert_eq!(out.opened, 1);
        assert_eq!(out.tree.parts()[0], base.tree.parts()[0]);
    }

    #[test]
    fn base_entries_around_a_mutation_are_kept_in_order() {
        let store = InMemoryPartStore::new();
        let rebuilder = TreeRebuilder::new(&store, &store);
        let base = rebuilder
            .apply(&TreeId::empty(), ["a", "c", "e"].map(|p| put(p, "v1")))
            .unwrap();
        let out = rebuilder
            .apply(&base.tree_id, vec![put("b", "v2"), put("c", "v2"), put("d", "v2")])
            .unwrap();
        let entries = read_all(&store, &out.tree_id);
        let rendered: Vec<String> = entries.iter().map(|(p, c)| format!("{p}:{c}")).collect();
        assert_eq!(rendered, vec!["a:v1", "b:v2", "c:v2", "d:v2", "e:v1"]);
    }

    #[test]
    fn no_mutations_keeps_the_tree() {
        let store = InMemoryPartStore::new();
        let base = nine_entry_base(&store);
        let rebuilder = TreeRebuilder::new(&store, &store);
        let out = rebuilder.apply(&base.tree_id, Vec::new()).unwrap();
        assert_eq!(out.tree_id, base.tree_id);
        assert_eq!(out.reused, 3);
        assert_eq!(out.written, 0);
    }

    #[test]
    fn remove_drops_the_entry() {
        let store = InMemoryPartStore::new();
        let base = nine_entry_base(&store);
        let rebuilder = TreeRebuilder::with_options(&store, &store, options(3, false));
        let out = rebuilder
            .apply(&base.tree_id, vec![Mutation::Remove("a".into()), Mutation::Remove("h".into())])
            .unwrap();
        let paths: Vec<String> = read_all(&store, &out.tree_id).into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["b", "c", "d", "e", "f", "g", "i"]);
        assert_eq!(out.reused, 1);
        assert_eq!(out.tree.parts()[1], base.tree.parts()[1]);
    }

    #[test]
    fn tombstone_put_is_stored() {
        let store = InMemoryPartStore::new();
        let base = nine_entry_base(&store);
        let rebuilder = TreeRebuilder::new(&store, &store);
        let out = rebuilder
            .apply(&base.tree_id, vec![Mutation::Put(Entry::tombstone("d"))])
            .unwrap();
        let mut cursor = TreeCursor::open(&store, &store, &out.tree_id, None).unwrap();
        let entries = collect_entries(&mut cursor).unwrap();
        assert_eq!(entries.len(), 9);
        assert!(entries[3].is_tombstone());
    }

    #[test]
    fn removing_everything_yields_empty_tree() {
        let store = InMemoryPartStore::new();
        let rebuilder = TreeRebuilder::new(&store, &store);
        let base = rebuilder.apply(&TreeId::empty(), vec![put("only", "v")]).unwrap();
        let out = rebuilder
            .apply(&base.tree_id, vec![Mutation::Remove("only".into())])
            .unwrap();
        assert!(out.tree_id.is_empty());
        assert!(out.tree.is_empty());
    }

    #[test]
    fn insert_between_parts_rewrites_following_part() {
        let store = InMemoryPartStore::new();
        let base = nine_entry_base(&store);
        let rebuilder = TreeRebuilder::with_options(&store, &store, options(3, false));
        let out = rebuilder.apply(&base.tree_id, vec![put("cc", "new")]).unwrap();
        assert_eq!(out.tree.parts()[0], base.tree.parts()[0]);
        assert_eq!(out.opened, 1);
        let paths: Vec<String> = read_all(&store, &out.tree_id).into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths[3], "cc");
        assert_eq!(paths.len(), 10);
    }

    #[test]
    fn skipped_part_is_never_spanned() {
        let store = InMemoryPartStore::new();
        let base = nine_entry_base(&store);
        let rebuilder = TreeRebuilder::with_options(&store, &store, options(100, false));
        let out = rebuilder
            .apply(&base.tree_id, vec![put("b", "x"), put("h", "x")])
            .unwrap();
        assert_eq!(out.reused, 1);
        assert_eq!(out.written, 2);
        assert_eq!(out.tree.parts()[1], base.tree.parts()[1]);
        assert_eq!(read_all(&store, &out.tree_id).len(), 9);
    }

    #[test]
    fn append_extends_last_part() {
        let store = InMemoryPartStore::new();
        let rebuilder = TreeRebuilder::with_options(&store, &store, options(4, true));
        let base = rebuilder
            .apply(&TreeId::empty(), vec![put("a", "v"), put("b", "v"), put("c", "v")])
            .unwrap();
        let out = rebuilder.apply(&base.tree_id, vec![put("d", "v")]).unwrap();
        assert_eq!(out.tree.len(), 1);
        assert_eq!(out.reused, 0);
        assert_eq!(out.opened, 1);
        assert_eq!(out.tree.max_path().map(|p| p.as_str()), Some("d"));
    }

    #[test]
    fn append_without_extension_adds_trailing_part() {
        let store = InMemoryPartStore::new();
        let rebuilder = TreeRebuilder::with_options(&store, &store, options(4, false));
        let base = rebuilder
            .apply(&TreeId::empty(), vec![put("a", "v"), put("b", "v"), put("c", "v")])
            .unwrap();
        let out = rebuilder.apply(&base.tree_id, vec![put("d", "v")]).unwrap();
        assert_eq!(out.tree.len(), 2);
        assert_eq!(out.reused, 1);
        assert_eq!(out.tree.parts()[0], base.tree.parts()[0]);
    }

    #[test]
    fn unordered_mutations_are_rejected() {
        let store = InMemoryPartStore::new();
        let rebuilder = TreeRebuilder::new(&store, &store);
        let err = rebuilder
            .apply(&TreeId::empty(), vec![put("b", "v"), put("a", "v")])
            .unwrap_err();
        assert!(matches!(err, TreeError::UnorderedMutations { .. }));

        let err = rebuilder
            .apply(&TreeId::empty(), vec![put("a", "v"), Mutation::Remove("a".into())])
            .unwrap_err();
        assert!(matches!(err, TreeError::UnorderedMutations { .. }));
        assert_eq!(store.tree_count().unwrap(), 0);
    }

    #[test]
    fn unknown_base_tree_fails() {
        let store = InMemoryPartStore::new();
        let rebuilder = TreeRebuilder::new(&store, &store);
        let missing = TreeId::from_hash([3; 32]);
        assert!(matches!(
            rebuilder.apply(&missing, Vec::new()),
            Err(TreeError::Store(_))
        ));
    }

    #[test]
    fn rebuild_on_filesystem_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPartStore::open(dir.path()).unwrap();
        let rebuilder = TreeRebuilder::with_options(&store, &store, options(2, true));
        let base = rebuilder
            .apply(&TreeId::empty(), vec![put("a", "v"), put("b", "v"), put("c", "v")])
            .unwrap();
        let out = rebuilder.apply(&base.tree_id, vec![put("c", "v2")]).unwrap();
        assert_eq!(out.reused, 1);

        let reopened = FsPartStore::open(dir.path()).unwrap();
        let mut cursor = TreeCursor::open(&reopened, &reopened, &out.tree_id, None).unwrap();
        let entries = collect_entries(&mut cursor).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].value().unwrap().checksum, "v2");
    }

    #[test]
    fn mutation_path() {
        assert_eq!(Mutation::Remove("x".into()).path().as_str(), "x");
        assert_eq!(Mutation::from(Entry::tombstone("y")).path().as_str(), "y");
    }

    proptest! {
        #[test]
        fn rebuild_matches_model(
            base in prop::collection::btree_set("[a-h]{1,2}", 0..30),
            changes in prop::collection::btree_map("[a-h]{1,2}", any::<bool>(), 0..15),
            target in 1usize..6,
            extend in any::<bool>(),
        ) {
            let store = InMemoryPartStore::new();
            let rebuilder = TreeRebuilder::with_options(&store, &store, options(target, extend));
            let first = rebuilder
                .apply(&TreeId::empty(), base.iter().map(|p| put(p, "base")))
                .unwrap();

            let mut model: BTreeMap<String, String> =
                base.iter().map(|p| (p.clone(), "base".to_string())).collect();
            let mutations: Vec<Mutation> = changes
                .iter()
                .map(|(path, keep)| {
                    if *keep {
                        model.insert(path.clone(), "new".to_string());
                        put(path, "new")
                    } else {
                        model.remove(path);
                        Mutation::Remove(path.as_str().into())
                    }
                })
                .collect();

            let out = rebuilder.apply(&first.tree_id, mutations).unwrap();
            let expected: Vec<(String, String)> = model.into_iter().collect();
            prop_assert_eq!(read_all(&store, &out.tree_id), expected);

            prop_assert_eq!(out.reused + out.opened, first.tree.len());
            let base_names: HashSet<_> = first.tree.parts().iter().map(|p| p.name).collect();
            let carried = out.tree.parts().iter().filter(|p| base_names.contains(&p.name)).count();
            prop_assert!(carried >= out.reused);
            prop_assert!(out.tree.validate().is_ok());
        }
    }
}

//! The lineage merge reader.
//!
//! Cursor slots are indexed by lineage priority: slot 0 is the branch
//! itself, slots 1..=N its ancestors from nearest to farthest. Each slot
//! holds the next entry its branch would deliver, or `None` once the branch
//! is exhausted.
//!
//! # Invariants
//!
//! - Output paths are strictly increasing; no path is emitted twice.
//! - For a path defined by several branches, the lowest slot index wins.
//! - Once the end of the stream is reached it is reported forever.

use tracing::debug;

use arbor_store::EntryCursor;
use arbor_types::{BranchId, CommitId, Entry, EntryPath};

use crate::error::{LineageError, LineageResult};
use crate::source::{BranchCursorSource, LineageResolver};

/// Read-ahead hint passed to branch cursors when none is configured.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Where a read starts and how much each branch cursor reads ahead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadOptions {
    /// Resume strictly after this path.
    pub after: Option<EntryPath>,
    /// Read-ahead hint for branch cursors.
    pub buffer_size: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            after: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl ReadOptions {
    pub fn after(mut self, path: impl Into<EntryPath>) -> Self {
        self.after = Some(path.into());
        self
    }

    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }
}

struct BranchSlot<'a> {
    branch: BranchId,
    cursor: Box<dyn EntryCursor + 'a>,
    pending: Option<Entry>,
}

impl BranchSlot<'_> {
    fn advance(&mut self) -> LineageResult<()> {
        let next = self
            .cursor
            .next_entry()
            .map_err(|source| LineageError::Cursor {
                branch: self.branch,
                source,
            })?;
        debug_assert!(
            match (&self.pending, &next) {
                (Some(prev), Some(next)) => prev.path < next.path,
                _ => true,
            },
            "branch cursor for {} went backwards",
            self.branch
        );
        self.pending = next;
        Ok(())
    }
}

enum ReaderState<'a> {
    /// Cursors not opened yet.
    Unopened,
    Active(Vec<BranchSlot<'a>>),
    Exhausted,
    Poisoned,
}

/// Merges a branch and its ancestors into one path-ordered entry stream.
///
/// The lineage is resolved and the cursors opened lazily on the first call
/// to [`next_entry`](Self::next_entry). Any failure, during opening or while
/// advancing, is returned once and leaves the reader poisoned; build a new
/// reader to retry. Tombstones are returned like any other entry so that
/// callers can tell a deleted path from one that never existed.
pub struct LineageMergeReader<'a> {
    resolver: &'a dyn LineageResolver,
    source: &'a dyn BranchCursorSource,
    branch: BranchId,
    commit: CommitId,
    options: ReadOptions,
    state: ReaderState<'a>,
    returned: u64,
}

impl<'a> LineageMergeReader<'a> {
    pub fn new(
        resolver: &'a dyn LineageResolver,
        source: &'a dyn BranchCursorSource,
        branch: BranchId,
        commit: CommitId,
        options: ReadOptions,
    ) -> Self {
        Self {
            resolver,
            source,
            branch,
            commit,
            options,
            state: ReaderState::Unopened,
            returned: 0,
        }
    }

    /// Number of entries returned so far.
    pub fn entries_read(&self) -> u64 {
        self.returned
    }

    /// Returns `true` once the end of the stream has been reached.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, ReaderState::Exhausted)
    }

    fn open(&self) -> LineageResult<Vec<BranchSlot<'a>>> {
        let lineage = self.resolver.resolve_lineage(self.branch, self.commit)?;
        debug!(
            branch = %self.branch,
            commit = %self.commit,
            ancestors = lineage.len(),
            "opening lineage reader"
        );

        let after = self.options.after.as_ref();
        let targets = std::iter::once((self.branch, self.commit))
            .chain(lineage.iter().map(|e| (e.branch, e.commit)));

        let mut slots = Vec::with_capacity(lineage.len() + 1);
        for (branch, commit) in targets {
            let cursor = self
                .source
                .open_branch_cursor(branch, commit, after, self.options.buffer_size)
                .map_err(|source| LineageError::Cursor { branch, source })?;
            let mut slot = BranchSlot {
                branch,
                cursor,
                pending: None,
            };
            slot.advance()?;
            slots.push(slot);
        }
        Ok(slots)
    }

    /// The next visible entry, or `Ok(None)` at the end of the stream.
    pub fn next_entry(&mut self) -> LineageResult<Option<Entry>> {
        if let ReaderState::Unopened = self.state {
            match self.open() {
                Ok(slots) => self.state = ReaderState::Active(slots),
                Err(e) => {
                    self.state = ReaderState::Poisoned;
                    return Err(e);
                }
            }
        }

        let slots = match &mut self.state {
            ReaderState::Active(slots) => slots,
            ReaderState::Exhausted => return Ok(None),
            ReaderState::Poisoned => return Err(LineageError::ReaderPoisoned),
            ReaderState::Unopened => unreachable!("lineage reader opened above"),
        };

        let Some(winner) = select_lowest(slots) else {
            debug!(branch = %self.branch, returned = self.returned, "lineage reader exhausted");
            self.state = ReaderState::Exhausted;
            return Ok(None);
        };
        let Some(selected) = slots[winner].pending.take() else {
            self.state = ReaderState::Exhausted;
            return Ok(None);
        };

        // Every branch defining the selected path moves past it, so shadowed
        // duplicates are dropped here and never surface later.
        let advanced = slots.iter_mut().enumerate().try_for_each(|(i, slot)| {
            let shares_path = slot
                .pending
                .as_ref()
                .is_some_and(|e| e.path == selected.path);
            if i == winner || shares_path {
                slot.advance()
            } else {
                Ok(())
            }
        });
        if let Err(e) = advanced {
            self.state = ReaderState::Poisoned;
            return Err(e);
        }

        self.returned += 1;
        Ok(Some(selected))
    }

    /// Read up to `limit` entries that are not tombstones.
    pub fn collect_visible(&mut self, limit: usize) -> LineageResult<Vec<Entry>> {
        let mut out = Vec::new();
        while out.len() < limit {
            match self.next_entry()? {
                Some(entry) if entry.is_tombstone() => continue,
                Some(entry) => out.push(entry),
                None => break,
            }
        }
        Ok(out)
    }
}

/// Index of the slot holding the smallest pending path.
///
/// Scans left to right and only replaces the current best on a strictly
/// smaller path, so ties go to the lowest index (the nearest branch).
fn select_lowest(slots: &[BranchSlot<'_>]) -> Option<usize> {
    let mut best: Option<(usize, &EntryPath)> = None;
    for (i, slot) in slots.iter().enumerate() {
        let Some(entry) = &slot.pending else { continue };
        match best {
            Some((_, path)) if entry.path >= *path => {}
            _ => best = Some((i, &entry.path)),
        }
    }
    best.map(|(i, _)| i)
}

impl Iterator for LineageMergeReader<'_> {
    type Item = LineageResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::StaticLineage;
    use arbor_store::{SliceCursor, StoreError, StoreResult};
    use arbor_types::{EntryValue, Lineage, LineageElement};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    const SELF_BRANCH: BranchId = BranchId(1);
    const NEAR: BranchId = BranchId(2);
    const FAR: BranchId = BranchId(3);

    fn entry(path: &str, value: &str) -> Entry {
        Entry::new(path, EntryValue::new(value, "", 0))
    }

    fn rendered(entries: &[Entry]) -> Vec<String> {
        entries
            .iter()
            .map(|e| match e.value() {
                Some(v) => format!("{}:{}", e.path, v.physical_address),
                None => format!("{}:-", e.path),
            })
            .collect()
    }

    fn read_all(src: &StaticLineage, branch: BranchId, options: ReadOptions) -> Vec<Entry> {
        LineageMergeReader::new(src, src, branch, CommitId::COMMITTED, options)
            .collect::<LineageResult<Vec<_>>>()
            .unwrap()
    }

    fn lineage(elements: &[BranchId]) -> Lineage {
        Lineage::new(
            elements
                .iter()
                .map(|b| LineageElement::new(*b, CommitId(1)))
                .collect(),
        )
    }

    /// self {a:1}, near {a:2, b:5}, far {a:3, b:6, c:7}
    fn three_generations() -> StaticLineage {
        StaticLineage::new()
            .with_branch(FAR, Lineage::root(), vec![entry("a", "3"), entry("b", "6"), entry("c", "7")])
            .with_branch(NEAR, lineage(&[FAR]), vec![entry("a", "2"), entry("b", "5")])
            .with_branch(SELF_BRANCH, lineage(&[NEAR, FAR]), vec![entry("a", "1")])
    }

    #[test]
    fn nearer_branches_shadow_farther_ones() {
        let out = read_all(&three_generations(), SELF_BRANCH, ReadOptions::default());
        assert_eq!(rendered(&out), vec!["a:1", "b:5", "c:7"]);
    }

    #[test]
    fn reading_an_ancestor_sees_only_its_own_lineage() {
        let out = read_all(&three_generations(), NEAR, ReadOptions::default());
        assert_eq!(rendered(&out), vec!["a:2", "b:5", "c:7"]);
    }

    #[test]
    fn tombstone_hides_inherited_path() {
        let src = StaticLineage::new()
            .with_branch(FAR, Lineage::root(), vec![entry("a", "3"), entry("b", "6")])
            .with_branch(SELF_BRANCH, lineage(&[FAR]), vec![Entry::tombstone("a")]);

        let out = read_all(&src, SELF_BRANCH, ReadOptions::default());
        assert_eq!(rendered(&out), vec!["a:-", "b:6"]);

        let mut reader =
            LineageMergeReader::new(&src, &src, SELF_BRANCH, CommitId::COMMITTED, ReadOptions::default());
        assert_eq!(rendered(&reader.collect_visible(10).unwrap()), vec!["b:6"]);
    }

    #[test]
    fn resumes_after_path() {
        let out = read_all(&three_generations(), SELF_BRANCH, ReadOptions::default().after("a"));
        assert_eq!(rendered(&out), vec!["b:5", "c:7"]);
        let out = read_all(&three_generations(), SELF_BRANCH, ReadOptions::default().after("c"));
        assert!(out.is_empty());
    }

    #[test]
    fn end_of_stream_is_sticky() {
        let src = three_generations();
        let mut reader =
            LineageMergeReader::new(&src, &src, SELF_BRANCH, CommitId::COMMITTED, ReadOptions::default());
        for _ in 0..3 {
            assert!(reader.next_entry().unwrap().is_some());
        }
        assert!(!reader.is_exhausted());
        for _ in 0..3 {
            assert!(reader.next_entry().unwrap().is_none());
        }
        assert!(reader.is_exhausted());
        assert_eq!(reader.entries_read(), 3);
    }

    #[test]
    fn empty_lineage_is_immediately_exhausted() {
        let src = StaticLineage::new().with_branch(SELF_BRANCH, Lineage::root(), vec![]);
        let mut reader =
            LineageMergeReader::new(&src, &src, SELF_BRANCH, CommitId::COMMITTED, ReadOptions::default());
        assert!(reader.next_entry().unwrap().is_none());
        assert!(reader.is_exhausted());
    }

    #[test]
    fn resolution_failure_poisons_reader() {
        let src = StaticLineage::new();
        let mut reader =
            LineageMergeReader::new(&src, &src, SELF_BRANCH, CommitId::COMMITTED, ReadOptions::default());
        assert!(matches!(reader.next_entry(), Err(LineageError::Resolution { .. })));
        assert!(matches!(reader.next_entry(), Err(LineageError::ReaderPoisoned)));
    }

    /// A source whose cursor for one branch fails after `fail_after` entries.
    struct FlakySource {
        inner: StaticLineage,
        flaky: BranchId,
        fail_after: usize,
    }

    struct FlakyCursor {
        inner: SliceCursor,
        remaining: usize,
    }

    impl EntryCursor for FlakyCursor {
        fn next_entry(&mut self) -> StoreResult<Option<Entry>> {
            if self.remaining == 0 {
                return Err(StoreError::Unavailable("connection reset".into()));
            }
            self.remaining -= 1;
            self.inner.next_entry()
        }
    }

    impl LineageResolver for FlakySource {
        fn resolve_lineage(&self, branch: BranchId, commit: CommitId) -> LineageResult<Lineage> {
            self.inner.resolve_lineage(branch, commit)
        }
    }

    impl BranchCursorSource for FlakySource {
        fn open_branch_cursor(
            &self,
            branch: BranchId,
            commit: CommitId,
            after: Option<&EntryPath>,
            buffer_size: usize,
        ) -> StoreResult<Box<dyn EntryCursor + '_>> {
            if branch != self.flaky {
                return self.inner.open_branch_cursor(branch, commit, after, buffer_size);
            }
            let entries: Vec<Entry> = vec![entry("a", "x"), entry("b", "y"), entry("c", "z")];
            Ok(Box::new(FlakyCursor {
                inner: SliceCursor::new(entries.into()),
                remaining: self.fail_after,
            }))
        }
    }

    #[test]
    fn first_fetch_failure_fails_open() {
        let src = FlakySource {
            inner: three_generations(),
            flaky: FAR,
            fail_after: 0,
        };
        let mut reader =
            LineageMergeReader::new(&src, &src, SELF_BRANCH, CommitId::COMMITTED, ReadOptions::default());
        match reader.next_entry() {
            Err(LineageError::Cursor { branch, .. }) => assert_eq!(branch, FAR),
            other => panic!("expected cursor failure, got {other:?}"),
        }
        assert!(matches!(reader.next_entry(), Err(LineageError::ReaderPoisoned)));
    }

    #[test]
    fn advance_failure_names_branch_and_poisons() {
        let src = FlakySource {
            inner: three_generations(),
            flaky: NEAR,
            fail_after: 1,
        };
        let mut reader =
            LineageMergeReader::new(&src, &src, SELF_BRANCH, CommitId::COMMITTED, ReadOptions::default());
        // Path "a" is shared with the flaky branch, which must advance and fails.
        match reader.next_entry() {
            Err(LineageError::Cursor { branch, source }) => {
                assert_eq!(branch, NEAR);
                assert!(source.to_string().contains("connection reset"));
            }
            other => panic!("expected cursor failure, got {other:?}"),
        }
        assert!(matches!(reader.next_entry(), Err(LineageError::ReaderPoisoned)));
    }

    #[test]
    fn select_lowest_prefers_first_on_ties() {
        let slots: Vec<BranchSlot<'static>> = [Some("b"), Some("a"), None, Some("a")]
            .iter()
            .enumerate()
            .map(|(i, p)| BranchSlot {
                branch: BranchId(i as u64),
                cursor: Box::new(SliceCursor::new(Vec::<Entry>::new().into())),
                pending: p.map(Entry::tombstone),
            })
            .collect();
        assert_eq!(select_lowest(&slots), Some(1));
        assert_eq!(select_lowest(&slots[2..3]), None);
    }

    fn branch_contents() -> impl Strategy<Value = BTreeMap<String, u8>> {
        prop::collection::btree_map("[a-e]{1,3}", any::<u8>(), 0..20)
    }

    proptest! {
        #[test]
        fn output_is_strictly_increasing_and_shadowed(
            branches in prop::collection::vec(branch_contents(), 1..6)
        ) {
            let ids: Vec<BranchId> = (0..branches.len() as u64).map(BranchId).collect();
            let mut src = StaticLineage::new();
            for (i, contents) in branches.iter().enumerate() {
                let entries = contents
                    .iter()
                    .map(|(p, v)| entry(p, &format!("{i}-{v}")))
                    .collect();
                src = src.with_branch(ids[i], lineage(&ids[i + 1..]), entries);
            }

            let out = read_all(&src, ids[0], ReadOptions::default());

            for pair in out.windows(2) {
                prop_assert!(pair[0].path < pair[1].path);
            }

            // Reference model: nearest branch defining a path wins.
            let mut expected: BTreeMap<String, String> = BTreeMap::new();
            for (i, contents) in branches.iter().enumerate().rev() {
                for (p, v) in contents {
                    expected.insert(p.clone(), format!("{i}-{v}"));
                }
            }
            let got: BTreeMap<String, String> = out
                .iter()
                .map(|e| (e.path.to_string(), e.value().map(|v| v.physical_address.clone()).unwrap_or_default()))
                .collect();
            prop_assert_eq!(got, expected);
        }
    }
}

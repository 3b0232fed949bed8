//! The in-memory MVCC catalog.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{debug, info};

use arbor_lineage::{
    BranchCursorSource, LineageError, LineageMergeReader, LineageResolver, LineageResult,
    ReadOptions, DEFAULT_BUFFER_SIZE,
};
use arbor_store::{
    CachedTreeStore, EntryCursor, FsPartStore, InMemoryPartStore, PartStore, StoreError,
    StoreResult, TreeStore,
};
use arbor_tree::{Mutation, RebuildOptions, TreeRebuilder};
use arbor_types::{BranchId, CommitId, Entry, EntryPath, Lineage, TreeId};

use crate::config::ArborConfig;
use crate::error::{CatalogError, CatalogResult};
use crate::export::{ExportConfiguration, ExportState};
use crate::forest::ForestCursorSource;
use crate::model::{Branch, CommitLog, ListOptions, Listing, Repository};
use crate::mvcc::{BranchRows, MvccBranchCursor, RowBatch};
use crate::names::{validate_branch_name, validate_repository_name};

/// Part and tree storage behind a catalog.
pub trait ForestStore: Send + Sync {
    fn parts(&self) -> &dyn PartStore;
    fn trees(&self) -> &dyn TreeStore;
}

impl<T: PartStore + TreeStore> ForestStore for T {
    fn parts(&self) -> &dyn PartStore {
        self
    }

    fn trees(&self) -> &dyn TreeStore {
        self
    }
}

pub(crate) struct BranchRecord {
    pub id: BranchId,
    pub repository: String,
    pub name: String,
    pub head: CommitId,
    /// Lineages in effect, each from the commit it was recorded at.
    lineage: Vec<(CommitId, Lineage)>,
    commits: BTreeMap<CommitId, CommitLog>,
    pub rows: BranchRows,
}

impl BranchRecord {
    fn new(id: BranchId, repository: &str, name: &str, lineage: Lineage) -> Self {
        Self {
            id,
            repository: repository.to_string(),
            name: name.to_string(),
            head: CommitId::ZERO,
            lineage: vec![(CommitId::ZERO, lineage)],
            commits: BTreeMap::new(),
            rows: BranchRows::default(),
        }
    }

    fn resolve(&self, commit: CommitId) -> CommitId {
        if commit == CommitId::COMMITTED {
            self.head
        } else {
            commit
        }
    }

    fn check_commit(&self, commit: CommitId) -> CatalogResult<()> {
        if commit.is_concrete() && commit > self.head {
            return Err(CatalogError::CommitNotFound {
                branch: self.id,
                commit,
            });
        }
        Ok(())
    }

    fn lineage_at(&self, commit: CommitId) -> Lineage {
        let at = self.resolve(commit);
        self.lineage
            .iter()
            .rev()
            .find(|(from, _)| *from <= at)
            .map(|(_, lineage)| lineage.clone())
            .unwrap_or_default()
    }

    /// The branch's own tree as of `commit`.
    fn tree_at(&self, commit: CommitId) -> TreeId {
        let at = self.resolve(commit);
        self.commits
            .range(..=at)
            .next_back()
            .map(|(_, log)| log.tree_id)
            .unwrap_or_else(TreeId::empty)
    }

    fn view(&self) -> Branch {
        Branch {
            id: self.id,
            repository: self.repository.clone(),
            name: self.name.clone(),
            head: self.head,
            lineage: self.lineage_at(CommitId::UNCOMMITTED),
        }
    }

    fn record_commit(&mut self, log: CommitLog) {
        self.head = log.commit;
        self.commits.insert(log.commit, log);
    }
}

struct RepositoryRecord {
    repository: Repository,
    branches: BTreeMap<String, BranchId>,
}

#[derive(Default)]
pub(crate) struct CatalogState {
    repositories: BTreeMap<String, RepositoryRecord>,
    branches: HashMap<BranchId, BranchRecord>,
    next_branch: u64,
    pub exports: HashMap<BranchId, ExportConfiguration>,
    pub export_states: HashMap<BranchId, ExportState>,
}

impl CatalogState {
    pub fn branch_id(&self, repository: &str, branch: &str) -> CatalogResult<BranchId> {
        let repo = self.repository(repository)?;
        repo.branches
            .get(branch)
            .copied()
            .ok_or_else(|| CatalogError::BranchNotFound {
                repository: repository.to_string(),
                branch: branch.to_string(),
            })
    }

    fn repository(&self, name: &str) -> CatalogResult<&RepositoryRecord> {
        self.repositories
            .get(name)
            .ok_or_else(|| CatalogError::RepositoryNotFound {
                name: name.to_string(),
            })
    }

    pub fn branch(&self, id: BranchId) -> CatalogResult<&BranchRecord> {
        self.branches.get(&id).ok_or(CatalogError::UnknownBranch(id))
    }

    fn branch_mut(&mut self, id: BranchId) -> CatalogResult<&mut BranchRecord> {
        self.branches
            .get_mut(&id)
            .ok_or(CatalogError::UnknownBranch(id))
    }

    pub fn branch_record(&self, repository: &str, branch: &str) -> CatalogResult<&BranchRecord> {
        self.branch(self.branch_id(repository, branch)?)
    }

    fn allocate_branch(&mut self) -> BranchId {
        self.next_branch += 1;
        BranchId(self.next_branch)
    }

    /// Point lookup through the lineage: the branch's own row first, then
    /// each ancestor at its fixed commit. Tombstones are returned.
    fn lookup(&self, id: BranchId, commit: CommitId, path: &EntryPath) -> CatalogResult<Option<Entry>> {
        let record = self.branch(id)?;
        if let Some(entry) = record.rows.visible(path, record.resolve(commit)) {
            return Ok(Some(entry.clone()));
        }
        for ancestor in &record.lineage_at(commit) {
            let parent = self.branch(ancestor.branch)?;
            if let Some(entry) = parent.rows.visible(path, ancestor.commit) {
                return Ok(Some(entry.clone()));
            }
        }
        Ok(None)
    }
}

/// A catalog holding its metadata in memory and its trees in a
/// [`ForestStore`].
///
/// All operations are safe to call concurrently. Commits and other writes
/// take the catalog's write lock for their whole duration, so commits are
/// serialized per catalog.
pub struct InMemoryCatalog {
    store: Arc<dyn ForestStore>,
    rebuild: RebuildOptions,
    buffer_size: usize,
    pub(crate) state: RwLock<CatalogState>,
}

impl InMemoryCatalog {
    /// A catalog over a fresh [`InMemoryPartStore`].
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryPartStore::new()))
    }

    pub fn with_store(store: Arc<dyn ForestStore>) -> Self {
        Self {
            store,
            rebuild: RebuildOptions::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            state: RwLock::new(CatalogState::default()),
        }
    }

    /// Build a catalog from configuration. With a storage root, trees live
    /// on disk behind a layout cache; otherwise everything is in memory.
    pub fn from_config(config: &ArborConfig) -> CatalogResult<Self> {
        let store: Arc<dyn ForestStore> = match &config.storage.root {
            Some(root) => Arc::new(CachedTreeStore::new(
                FsPartStore::open(root)?,
                config.storage.tree_cache_capacity,
            )),
            None => Arc::new(InMemoryPartStore::new()),
        };
        Ok(Self::with_store(store)
            .with_rebuild_options(config.rebuild.clone())
            .with_buffer_size(config.reader.buffer_size))
    }

    pub fn with_rebuild_options(mut self, options: RebuildOptions) -> Self {
        self.rebuild = options;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    pub fn store(&self) -> &dyn ForestStore {
        self.store.as_ref()
    }

    pub(crate) fn read(&self) -> CatalogResult<RwLockReadGuard<'_, CatalogState>> {
        self.state
            .read()
            .map_err(|e| CatalogError::LockPoisoned(e.to_string()))
    }

    pub(crate) fn write(&self) -> CatalogResult<RwLockWriteGuard<'_, CatalogState>> {
        self.state
            .write()
            .map_err(|e| CatalogError::LockPoisoned(e.to_string()))
    }

    // -- repositories -----------------------------------------------------

    /// Create a repository with an empty root branch named `default_branch`.
    pub fn create_repository(
        &self,
        name: &str,
        storage_namespace: &str,
        default_branch: &str,
    ) -> CatalogResult<Repository> {
        validate_repository_name(name)?;
        validate_branch_name(default_branch)?;

        let mut state = self.write()?;
        if state.repositories.contains_key(name) {
            return Err(CatalogError::RepositoryExists {
                name: name.to_string(),
            });
        }
        let id = state.allocate_branch();
        state
            .branches
            .insert(id, BranchRecord::new(id, name, default_branch, Lineage::root()));

        let repository = Repository {
            name: name.to_string(),
            storage_namespace: storage_namespace.to_string(),
            default_branch: default_branch.to_string(),
            creation_date: Utc::now(),
        };
        state.repositories.insert(
            name.to_string(),
            RepositoryRecord {
                repository: repository.clone(),
                branches: BTreeMap::from([(default_branch.to_string(), id)]),
            },
        );
        info!(repository = name, branch = default_branch, "created repository");
        Ok(repository)
    }

    pub fn get_repository(&self, name: &str) -> CatalogResult<Repository> {
        Ok(self.read()?.repository(name)?.repository.clone())
    }

    pub fn list_repositories(&self) -> CatalogResult<Vec<Repository>> {
        let state = self.read()?;
        Ok(state
            .repositories
            .values()
            .map(|r| r.repository.clone())
            .collect())
    }

    /// Remove a repository with all its branches and export bookkeeping.
    pub fn delete_repository(&self, name: &str) -> CatalogResult<()> {
        let mut state = self.write()?;
        let record = state
            .repositories
            .remove(name)
            .ok_or_else(|| CatalogError::RepositoryNotFound {
                name: name.to_string(),
            })?;
        for id in record.branches.values() {
            state.branches.remove(id);
            state.exports.remove(id);
            state.export_states.remove(id);
        }
        info!(repository = name, branches = record.branches.len(), "deleted repository");
        Ok(())
    }

    // -- branches ---------------------------------------------------------

    /// Create `branch` from the latest commit of `source`.
    ///
    /// The new branch's lineage is `source` at its head, followed by the
    /// lineage `source` had at that commit.
    pub fn create_branch(&self, repository: &str, branch: &str, source: &str) -> CatalogResult<Branch> {
        validate_branch_name(branch)?;
        let mut state = self.write()?;
        if state.repository(repository)?.branches.contains_key(branch) {
            return Err(CatalogError::BranchExists {
                repository: repository.to_string(),
                branch: branch.to_string(),
            });
        }
        let source_record = state.branch_record(repository, source)?;
        let lineage = Lineage::child_of(
            source_record.id,
            source_record.head,
            &source_record.lineage_at(source_record.head),
        );

        let id = state.allocate_branch();
        let record = BranchRecord::new(id, repository, branch, lineage);
        let view = record.view();
        state.branches.insert(id, record);
        if let Some(repo) = state.repositories.get_mut(repository) {
            repo.branches.insert(branch.to_string(), id);
        }
        info!(
            repository,
            branch,
            source,
            depth = view.lineage.len(),
            "created branch"
        );
        Ok(view)
    }

    pub fn get_branch(&self, repository: &str, branch: &str) -> CatalogResult<Branch> {
        Ok(self.read()?.branch_record(repository, branch)?.view())
    }

    pub fn list_branches(&self, repository: &str) -> CatalogResult<Vec<Branch>> {
        let state = self.read()?;
        state
            .repository(repository)?
            .branches
            .values()
            .map(|id| state.branch(*id).map(BranchRecord::view))
            .collect()
    }

    // -- staged writes ----------------------------------------------------

    /// Stage `entry` on `branch`, replacing any staged version of its path.
    pub fn put_entry(&self, repository: &str, branch: &str, entry: Entry) -> CatalogResult<()> {
        let mut state = self.write()?;
        let id = state.branch_id(repository, branch)?;
        debug!(repository, branch, path = %entry.path, "staging entry");
        state.branch_mut(id)?.rows.stage(entry);
        Ok(())
    }

    /// Stage the deletion of `path`.
    ///
    /// If the path only exists as a staged entry, the staged entry is
    /// dropped. Otherwise a tombstone is staged so the deletion also hides
    /// inherited content.
    pub fn delete_entry(&self, repository: &str, branch: &str, path: &EntryPath) -> CatalogResult<()> {
        let mut state = self.write()?;
        let id = state.branch_id(repository, branch)?;
        let committed = state
            .lookup(id, CommitId::COMMITTED, path)?
            .filter(|e| !e.is_tombstone());
        let record = state.branch_mut(id)?;
        let staged_tombstone = record.rows.staged_entry(path).map(Entry::is_tombstone);

        match (staged_tombstone, committed.is_some()) {
            (Some(true), _) | (None, false) => {
                return Err(CatalogError::EntryNotFound { path: path.clone() })
            }
            (_, true) => record.rows.stage(Entry::tombstone(path.clone())),
            (Some(false), false) => {
                record.rows.unstage(path);
            }
        }
        debug!(repository, branch, %path, "staged deletion");
        Ok(())
    }

    /// Drop every staged change on `branch`. Returns how many were dropped.
    pub fn reset_branch(&self, repository: &str, branch: &str) -> CatalogResult<usize> {
        let mut state = self.write()?;
        let id = state.branch_id(repository, branch)?;
        let dropped = state.branch_mut(id)?.rows.clear_staged();
        info!(repository, branch, dropped, "reset branch");
        Ok(dropped)
    }

    // -- commits ----------------------------------------------------------

    /// Commit the staged changes of `branch`.
    ///
    /// The staged entries are applied, in path order, to the branch's
    /// previous tree; the resulting tree id is recorded on the commit.
    pub fn commit(
        &self,
        repository: &str,
        branch: &str,
        message: &str,
        committer: &str,
    ) -> CatalogResult<CommitLog> {
        let mut state = self.write()?;
        let id = state.branch_id(repository, branch)?;
        let record = state.branch_mut(id)?;

        let mutations: Vec<Mutation> = record.rows.staged().cloned().map(Mutation::Put).collect();
        if mutations.is_empty() {
            return Err(CatalogError::NothingToCommit {
                repository: repository.to_string(),
                branch: branch.to_string(),
            });
        }

        let previous = record.head;
        let commit = previous.next();
        let base = record.tree_at(previous);
        let rebuilder =
            TreeRebuilder::with_options(self.store.parts(), self.store.trees(), self.rebuild.clone());
        let outcome = rebuilder.apply(&base, mutations)?;
        let changes = record.rows.stamp(previous, commit);

        let log = CommitLog {
            branch: id,
            commit,
            message: message.to_string(),
            committer: committer.to_string(),
            creation_date: Utc::now(),
            tree_id: outcome.tree_id,
            metadata: BTreeMap::new(),
        };
        record.record_commit(log.clone());
        info!(
            repository,
            branch,
            commit = %commit,
            changes,
            tree = %outcome.tree_id.short_hex(),
            reused = outcome.reused,
            written = outcome.written,
            "committed"
        );
        Ok(log)
    }

    pub fn get_commit(&self, repository: &str, branch: &str, commit: CommitId) -> CatalogResult<CommitLog> {
        let state = self.read()?;
        let record = state.branch_record(repository, branch)?;
        let at = record.resolve(commit);
        record
            .commits
            .get(&at)
            .cloned()
            .ok_or(CatalogError::CommitNotFound {
                branch: record.id,
                commit,
            })
    }

    /// Commits of `branch`, newest first.
    pub fn list_commits(&self, repository: &str, branch: &str) -> CatalogResult<Vec<CommitLog>> {
        let state = self.read()?;
        let record = state.branch_record(repository, branch)?;
        Ok(record.commits.values().rev().cloned().collect())
    }

    /// Move `branch`'s lineage to the latest commit of its parent.
    ///
    /// Records a commit carrying the new lineage; the branch's own tree is
    /// unchanged. The branch must have no staged changes.
    pub fn update_from_parent(
        &self,
        repository: &str,
        branch: &str,
        committer: &str,
    ) -> CatalogResult<CommitLog> {
        let mut state = self.write()?;
        let id = state.branch_id(repository, branch)?;
        let record = state.branch(id)?;
        if record.rows.has_staged() {
            return Err(CatalogError::UncommittedChanges {
                repository: repository.to_string(),
                branch: branch.to_string(),
            });
        }
        let parent = record
            .lineage_at(CommitId::UNCOMMITTED)
            .parent()
            .copied()
            .ok_or_else(|| CatalogError::NoParent {
                repository: repository.to_string(),
                branch: branch.to_string(),
            })?;
        let previous = record.head;
        let tree_id = record.tree_at(previous);

        let parent_record = state.branch(parent.branch)?;
        let parent_head = parent_record.head;
        let lineage = Lineage::child_of(
            parent.branch,
            parent_head,
            &parent_record.lineage_at(parent_head),
        );

        let commit = previous.next();
        let log = CommitLog {
            branch: id,
            commit,
            message: format!("update {branch} from parent"),
            committer: committer.to_string(),
            creation_date: Utc::now(),
            tree_id,
            metadata: BTreeMap::from([(
                "parent_commit".to_string(),
                parent_head.to_string(),
            )]),
        };
        let record = state.branch_mut(id)?;
        record.lineage.push((commit, lineage));
        record.record_commit(log.clone());
        info!(
            repository,
            branch,
            commit = %commit,
            parent = %parent.branch,
            from = %parent.commit,
            to = %parent_head,
            "updated lineage from parent"
        );
        Ok(log)
    }

    // -- reads ------------------------------------------------------------

    /// The entry at `path` as seen by `branch` at `commit`.
    pub fn get_entry(
        &self,
        repository: &str,
        branch: &str,
        commit: CommitId,
        path: &EntryPath,
    ) -> CatalogResult<Entry> {
        let state = self.read()?;
        let id = state.branch_id(repository, branch)?;
        state.branch(id)?.check_commit(commit)?;
        match state.lookup(id, commit, path)? {
            Some(entry) if !entry.is_tombstone() => Ok(entry),
            _ => Err(CatalogError::EntryNotFound { path: path.clone() }),
        }
    }

    /// List the entries `branch` sees at `commit`, merged across its
    /// lineage from the catalog rows. Tombstones are hidden.
    pub fn list_entries(
        &self,
        repository: &str,
        branch: &str,
        commit: CommitId,
        options: &ListOptions,
    ) -> CatalogResult<Listing> {
        let id = self.readable_branch(repository, branch, commit)?;
        self.list_with(self, id, commit, options)
    }

    /// Like [`list_entries`](Self::list_entries), reading every branch from
    /// its committed tree instead of the catalog rows.
    pub fn list_committed_entries(
        &self,
        repository: &str,
        branch: &str,
        commit: CommitId,
        options: &ListOptions,
    ) -> CatalogResult<Listing> {
        if commit == CommitId::UNCOMMITTED {
            return Err(CatalogError::UncommittedTreeRead);
        }
        let id = self.readable_branch(repository, branch, commit)?;
        let forest = ForestCursorSource::new(self);
        self.list_with(&forest, id, commit, options)
    }

    fn readable_branch(&self, repository: &str, branch: &str, commit: CommitId) -> CatalogResult<BranchId> {
        let state = self.read()?;
        let id = state.branch_id(repository, branch)?;
        state.branch(id)?.check_commit(commit)?;
        Ok(id)
    }

    fn list_with(
        &self,
        source: &dyn BranchCursorSource,
        branch: BranchId,
        commit: CommitId,
        options: &ListOptions,
    ) -> CatalogResult<Listing> {
        let mut read = ReadOptions::default().buffer_size(self.buffer_size);
        if let Some(after) = &options.after {
            read = read.after(after.clone());
        }
        let mut reader = LineageMergeReader::new(self, source, branch, commit, read);
        let limit = options.limit.unwrap_or(usize::MAX);

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry()? {
            if let Some(prefix) = &options.prefix {
                if !entry.path.has_prefix(prefix) {
                    if entry.path.as_str() > prefix.as_str() {
                        break;
                    }
                    continue;
                }
            }
            if entry.is_tombstone() {
                continue;
            }
            if entries.len() == limit {
                return Ok(Listing {
                    entries,
                    has_more: true,
                });
            }
            entries.push(entry);
        }
        Ok(Listing {
            entries,
            has_more: false,
        })
    }

    // -- cursor plumbing --------------------------------------------------

    pub(crate) fn scan_rows(
        &self,
        branch: BranchId,
        commit: CommitId,
        after: Option<&EntryPath>,
        limit: usize,
    ) -> StoreResult<RowBatch> {
        let state = self
            .state
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        let record = state
            .branches
            .get(&branch)
            .ok_or_else(|| StoreError::Unavailable(format!("{branch} does not exist")))?;
        Ok(record.rows.scan(after, commit, limit))
    }

    /// The tree holding `branch`'s own content at `commit`.
    pub(crate) fn tree_at(&self, branch: BranchId, commit: CommitId) -> StoreResult<TreeId> {
        let state = self
            .state
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        let record = state
            .branches
            .get(&branch)
            .ok_or_else(|| StoreError::Unavailable(format!("{branch} does not exist")))?;
        Ok(record.tree_at(commit))
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCatalog")
            .field("rebuild", &self.rebuild)
            .field("buffer_size", &self.buffer_size)
            .finish_non_exhaustive()
    }
}

impl LineageResolver for InMemoryCatalog {
    fn resolve_lineage(&self, branch: BranchId, commit: CommitId) -> LineageResult<Lineage> {
        let resolution = |reason: String| LineageError::Resolution {
            branch,
            commit,
            reason,
        };
        let state = self.state.read().map_err(|e| resolution(e.to_string()))?;
        let record = state
            .branches
            .get(&branch)
            .ok_or_else(|| resolution("branch does not exist".into()))?;
        Ok(record.lineage_at(commit))
    }
}

impl BranchCursorSource for InMemoryCatalog {
    fn open_branch_cursor(
        &self,
        branch: BranchId,
        commit: CommitId,
        after: Option<&EntryPath>,
        buffer_size: usize,
    ) -> StoreResult<Box<dyn EntryCursor + '_>> {
        let commit = {
            let state = self
                .state
                .read()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            let record = state
                .branches
                .get(&branch)
                .ok_or_else(|| StoreError::Unavailable(format!("{branch} does not exist")))?;
            record.resolve(commit)
        };
        Ok(Box::new(MvccBranchCursor::new(
            self,
            branch,
            commit,
            after,
            buffer_size,
        )))
    }
}

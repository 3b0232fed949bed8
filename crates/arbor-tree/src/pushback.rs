use arbor_store::{EntryCursor, StoreResult};
use arbor_types::Entry;

use crate::error::{TreeError, TreeResult};

/// Wraps a cursor so that one read entry can be handed back.
///
/// A consumer that reads an entry to find a boundary, and finds the entry
/// belongs to a later step, pushes it back; the next read returns it again.
/// Exactly one entry of lookahead is supported.
pub struct PushbackCursor<'a> {
    inner: Box<dyn EntryCursor + 'a>,
    pushed: Option<Entry>,
}

impl<'a> PushbackCursor<'a> {
    pub fn new(inner: Box<dyn EntryCursor + 'a>) -> Self {
        Self {
            inner,
            pushed: None,
        }
    }

    /// Return `entry` to the cursor; the next read yields it.
    ///
    /// Fails if an entry is already pushed back and has not been re-read.
    pub fn push_back(&mut self, entry: Entry) -> TreeResult<()> {
        if let Some(pending) = &self.pushed {
            return Err(TreeError::PushbackOccupied {
                pending: pending.path.clone(),
                pushed: entry.path,
            });
        }
        self.pushed = Some(entry);
        Ok(())
    }

    /// Look at the next entry without consuming it.
    pub fn peek(&mut self) -> StoreResult<Option<&Entry>> {
        if self.pushed.is_none() {
            self.pushed = self.inner.next_entry()?;
        }
        Ok(self.pushed.as_ref())
    }
}

impl EntryCursor for PushbackCursor<'_> {
    fn next_entry(&mut self) -> StoreResult<Option<Entry>> {
        match self.pushed.take() {
            Some(entry) => Ok(Some(entry)),
            None => self.inner.next_entry(),
        }
    }
}

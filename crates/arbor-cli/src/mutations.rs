//! JSON-lines mutation files for `arbor tree apply`.

use std::collections::BTreeMap;
use std::io::BufRead;

use anyhow::Context;
use serde::Deserialize;

use arbor_tree::Mutation;
use arbor_types::{Entry, EntryPath, EntryValue};

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum MutationRecord {
    /// Store a value.
    Put {
        path: String,
        physical_address: String,
        checksum: String,
        size: u64,
        #[serde(default)]
        metadata: BTreeMap<String, String>,
    },
    /// Store a tombstone.
    Delete { path: String },
    /// Drop the path from the tree.
    Remove { path: String },
}

impl From<MutationRecord> for Mutation {
    fn from(record: MutationRecord) -> Self {
        match record {
            MutationRecord::Put {
                path,
                physical_address,
                checksum,
                size,
                metadata,
            } => {
                let mut value = EntryValue::new(physical_address, checksum, size);
                value.metadata = metadata;
                Mutation::Put(Entry::new(path, value))
            }
            MutationRecord::Delete { path } => Mutation::Put(Entry::tombstone(path)),
            MutationRecord::Remove { path } => Mutation::Remove(EntryPath::new(path)),
        }
    }
}

/// Read mutations, one JSON object per non-blank line, sorted by path.
///
/// The sort is stable, so a path given twice stays twice and the rebuild
/// rejects it.
pub fn read_mutations(reader: impl BufRead) -> anyhow::Result<Vec<Mutation>> {
    let mut mutations = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: MutationRecord = serde_json::from_str(&line)
            .with_context(|| format!("line {}: invalid mutation", index + 1))?;
        mutations.push(Mutation::from(record));
    }
    mutations.sort_by(|a, b| a.path().cmp(b.path()));
    Ok(mutations)
}

use std::collections::BTreeMap;

use super::filter::Document;

// ============================================================================
// Write Set - Writes staged by a session transaction
// ============================================================================
//
// Each key keeps only its final state (full document or tombstone). Reads
// issued through the owning session see the staged state first, so a unit
// of work observes its own writes before commit.
//
// ============================================================================

/// Final staged state of one document.
#[derive(Debug, Clone, PartialEq)]
pub enum StagedWrite {
    Put(Document),
    Delete,
}

#[derive(Debug, Clone)]
struct Staged {
    write: StagedWrite,
    // The key was absent when the transaction first touched it.
    must_be_absent: bool,
}

/// One write to apply on commit.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub collection: String,
    pub id: String,
    pub write: StagedWrite,
    /// Commit must fail with a duplicate key if the id appeared meanwhile.
    pub must_be_absent: bool,
}

#[derive(Debug, Default)]
pub struct WriteSet {
    entries: BTreeMap<(String, String), Staged>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Staged state for one document, `None` when untouched.
    pub fn get(&self, collection: &str, id: &str) -> Option<&StagedWrite> {
        self.entries
            .get(&(collection.to_string(), id.to_string()))
            .map(|staged| &staged.write)
    }

    /// Stage an insert of a key the caller saw as absent.
    pub fn stage_create(&mut self, collection: &str, id: &str, document: Document) {
        self.stage(collection, id, StagedWrite::Put(document), true);
    }

    /// Stage a full replacement of an existing document.
    pub fn stage_replace(&mut self, collection: &str, id: &str, document: Document) {
        self.stage(collection, id, StagedWrite::Put(document), false);
    }

    pub fn stage_delete(&mut self, collection: &str, id: &str) {
        self.stage(collection, id, StagedWrite::Delete, false);
    }

    fn stage(&mut self, collection: &str, id: &str, write: StagedWrite, absent_on_first_touch: bool) {
        self.entries
            .entry((collection.to_string(), id.to_string()))
            .and_modify(|staged| staged.write = write.clone())
            .or_insert(Staged {
                write,
                must_be_absent: absent_on_first_touch,
            });
    }

    /// Overlay staged writes of `collection` onto committed documents keyed by id.
    pub fn apply_to(&self, collection: &str, documents: &mut BTreeMap<String, Document>) {
        for ((staged_collection, id), staged) in &self.entries {
            if staged_collection != collection {
                continue;
            }
            match &staged.write {
                StagedWrite::Put(document) => {
                    documents.insert(id.clone(), document.clone());
                }
                StagedWrite::Delete => {
                    documents.remove(id);
                }
            }
        }
    }

    /// Take every staged write, leaving the set empty.
    pub fn drain(&mut self) -> Vec<PendingWrite> {
        std::mem::take(&mut self.entries)
            .into_iter()
            .map(|((collection, id), staged)| PendingWrite {
                collection,
                id,
                write: staged.write,
                must_be_absent: staged.must_be_absent,
            })
            .collect()
    }

    /// Copy of the staged writes, leaving the set intact.
    pub fn pending(&self) -> Vec<PendingWrite> {
        self.entries
            .iter()
            .map(|((collection, id), staged)| PendingWrite {
                collection: collection.clone(),
                id: id.clone(),
                write: staged.write.clone(),
                must_be_absent: staged.must_be_absent,
            })
            .collect()
    }
}

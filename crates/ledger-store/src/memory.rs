use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    DocumentQuery, Result, SortOrder, StoreError, StoredDocument, Version,
    store::{DocumentWrite, LedgerStore, WriteBatch},
};

#[derive(Default)]
struct State {
    docs: HashMap<(String, Uuid), StoredDocument>,
    next_seq: i64,
}

impl State {
    fn current_version(&self, kind: &str, id: Uuid) -> Version {
        self.docs
            .get(&(kind.to_string(), id))
            .map(|doc| doc.version)
            .unwrap_or_default()
    }

    fn check(&self, write: &DocumentWrite) -> Result<()> {
        match write {
            DocumentWrite::Insert { kind, id, .. } => {
                if self.docs.contains_key(&(kind.clone(), *id)) {
                    return Err(StoreError::AlreadyExists {
                        kind: kind.clone(),
                        id: *id,
                    });
                }
            }
            DocumentWrite::Update {
                kind, id, expected, ..
            }
            | DocumentWrite::Delete { kind, id, expected } => {
                let actual = self.current_version(kind, *id);
                if actual.is_initial() {
                    return Err(StoreError::DocumentNotFound {
                        kind: kind.clone(),
                        id: *id,
                    });
                }
                if actual != *expected {
                    return Err(StoreError::ConcurrencyConflict {
                        kind: kind.clone(),
                        id: *id,
                        expected: *expected,
                        actual,
                    });
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, write: DocumentWrite) -> Version {
        let now = Utc::now();
        match write {
            DocumentWrite::Insert {
                kind,
                id,
                body,
                lookup,
            } => {
                self.next_seq += 1;
                let doc = StoredDocument {
                    kind: kind.clone(),
                    id,
                    version: Version::first(),
                    sequence: self.next_seq,
                    body,
                    lookup,
                    created_at: now,
                    updated_at: now,
                };
                self.docs.insert((kind, id), doc);
                Version::first()
            }
            DocumentWrite::Update {
                kind,
                id,
                expected,
                body,
                lookup,
            } => {
                let version = expected.next();
                if let Some(doc) = self.docs.get_mut(&(kind, id)) {
                    doc.version = version;
                    doc.body = body;
                    doc.lookup = lookup;
                    doc.updated_at = now;
                }
                version
            }
            DocumentWrite::Delete { kind, id, .. } => {
                self.docs.remove(&(kind, id));
                Version::initial()
            }
        }
    }

    fn matching(&self, query: &DocumentQuery) -> Vec<&StoredDocument> {
        let mut docs: Vec<_> = self
            .docs
            .values()
            .filter(|doc| doc.kind == query.kind && doc.matches(&query.fields))
            .collect();
        docs.sort_by_key(|doc| doc.sequence);
        if query.order == SortOrder::NewestFirst {
            docs.reverse();
        }
        docs
    }
}

/// In-memory ledger store implementation for testing.
///
/// This implementation keeps every document in memory and provides
/// the same interface as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryLedgerStore {
    /// Creates a new empty in-memory ledger store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of documents stored.
    pub async fn document_count(&self) -> usize {
        self.state.read().await.docs.len()
    }

    /// Removes every document.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.docs.clear();
        state.next_seq = 0;
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn get(&self, kind: &str, id: Uuid) -> Result<Option<StoredDocument>> {
        let state = self.state.read().await;
        Ok(state.docs.get(&(kind.to_string(), id)).cloned())
    }

    async fn find(&self, query: DocumentQuery) -> Result<Vec<StoredDocument>> {
        let state = self.state.read().await;
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(state
            .matching(&query)
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self, query: DocumentQuery) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state.matching(&query).len() as u64)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<Vec<Version>> {
        batch.validate()?;

        let mut state = self.state.write().await;

        // Nothing is applied until every write has been checked.
        for write in batch.writes() {
            state.check(write)?;
        }

        Ok(batch
            .into_writes()
            .into_iter()
            .map(|write| state.apply(write))
            .collect())
    }
}

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{DocumentQuery, Result, StoreError, StoredDocument, Version};

/// A single write inside a [`WriteBatch`].
#[derive(Debug, Clone)]
pub enum DocumentWrite {
    /// Creates a document; fails if one with the same kind and id exists.
    Insert {
        kind: String,
        id: Uuid,
        body: serde_json::Value,
        lookup: BTreeMap<String, String>,
    },

    /// Replaces a document that must currently be at `expected`.
    Update {
        kind: String,
        id: Uuid,
        expected: Version,
        body: serde_json::Value,
        lookup: BTreeMap<String, String>,
    },

    /// Removes a document that must currently be at `expected`.
    Delete {
        kind: String,
        id: Uuid,
        expected: Version,
    },
}

impl DocumentWrite {
    pub fn kind(&self) -> &str {
        match self {
            DocumentWrite::Insert { kind, .. }
            | DocumentWrite::Update { kind, .. }
            | DocumentWrite::Delete { kind, .. } => kind,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            DocumentWrite::Insert { id, .. }
            | DocumentWrite::Update { id, .. }
            | DocumentWrite::Delete { id, .. } => *id,
        }
    }

    /// Returns the version the document will have once the write commits.
    ///
    /// Deleted documents report [`Version::initial`].
    pub fn resulting_version(&self) -> Version {
        match self {
            DocumentWrite::Insert { .. } => Version::first(),
            DocumentWrite::Update { expected, .. } => expected.next(),
            DocumentWrite::Delete { .. } => Version::initial(),
        }
    }
}

/// An ordered set of writes applied atomically.
///
/// Either every write succeeds or none is visible.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<DocumentWrite>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: DocumentWrite) -> &mut Self {
        self.writes.push(write);
        self
    }

    pub fn writes(&self) -> &[DocumentWrite] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<DocumentWrite> {
        self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Validates the batch before it reaches a backend.
    ///
    /// A batch must be non-empty and touch each document at most once.
    pub fn validate(&self) -> Result<()> {
        if self.writes.is_empty() {
            return Err(StoreError::InvalidBatch(
                "Cannot commit an empty batch".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for write in &self.writes {
            if !seen.insert((write.kind().to_string(), write.id())) {
                return Err(StoreError::InvalidBatch(format!(
                    "{} {} appears more than once in the batch",
                    write.kind(),
                    write.id()
                )));
            }
            if let DocumentWrite::Update { expected, .. } | DocumentWrite::Delete { expected, .. } =
                write
                && expected.is_initial()
            {
                return Err(StoreError::InvalidBatch(format!(
                    "{} {} must be inserted before it can be modified",
                    write.kind(),
                    write.id()
                )));
            }
        }

        Ok(())
    }
}

/// Core trait for ledger store implementations.
///
/// All implementations must be thread-safe and give the same guarantees:
/// versions are checked per document and a batch commits atomically.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Loads a document by kind and id.
    async fn get(&self, kind: &str, id: Uuid) -> Result<Option<StoredDocument>>;

    /// Returns documents matching the query.
    async fn find(&self, query: DocumentQuery) -> Result<Vec<StoredDocument>>;

    /// Counts documents matching the query, ignoring pagination.
    async fn count(&self, query: DocumentQuery) -> Result<u64>;

    /// Applies every write in the batch, or none of them.
    ///
    /// Returns the resulting version of each write, in batch order.
    async fn commit(&self, batch: WriteBatch) -> Result<Vec<Version>>;
}

/// Extension trait providing convenience methods for ledger stores.
#[async_trait]
pub trait LedgerStoreExt: LedgerStore {
    /// Returns the first document matching the query.
    async fn find_one(&self, query: DocumentQuery) -> Result<Option<StoredDocument>> {
        Ok(self.find(query.limit(1)).await?.into_iter().next())
    }

    /// Returns true if any document matches the query.
    async fn exists(&self, query: DocumentQuery) -> Result<bool> {
        Ok(self.find_one(query).await?.is_some())
    }

    /// Commits a single write.
    async fn write_one(&self, write: DocumentWrite) -> Result<Version> {
        let mut batch = WriteBatch::new();
        batch.push(write);
        let versions = self.commit(batch).await?;
        Ok(versions.into_iter().next().unwrap_or_default())
    }
}

impl<T: LedgerStore + ?Sized> LedgerStoreExt for T {}

//! Typed access to the ledger store.

use std::collections::BTreeMap;

use ledger_store::{
    DocumentQuery, DocumentWrite, LedgerStore, StoredDocument, Version, WriteBatch,
};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::error::DomainError;

/// A value persisted as one document in the ledger store.
///
/// The version is owned by the store: it is read back on load and must be
/// bumped by the caller after a successful commit.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    /// Document kind used as the store namespace.
    const KIND: &'static str;

    /// Returns the document's id within its kind.
    fn document_id(&self) -> Uuid;

    /// Returns the version the document was read at.
    fn version(&self) -> Version;

    /// Sets the document version.
    fn set_version(&mut self, version: Version);

    /// Returns the indexed fields used by query-by-field lookups.
    fn lookup(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Records that a write of this document was committed.
    fn bump_version(&mut self) {
        let next = self.version().next();
        self.set_version(next);
    }
}

/// Builds a lookup map from `(field, value)` pairs.
pub(crate) fn lookup_fields<const N: usize>(pairs: [(&str, String); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(field, value)| (field.to_string(), value))
        .collect()
}

/// Collects document writes that must commit together.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    batch: WriteBatch,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new document.
    pub fn insert<D: Document>(&mut self, doc: &D) -> Result<&mut Self, DomainError> {
        self.batch.push(DocumentWrite::Insert {
            kind: D::KIND.to_string(),
            id: doc.document_id(),
            body: serde_json::to_value(doc)?,
            lookup: doc.lookup(),
        });
        Ok(self)
    }

    /// Replaces a document that must still be at the version it was read at.
    pub fn update<D: Document>(&mut self, doc: &D) -> Result<&mut Self, DomainError> {
        self.batch.push(DocumentWrite::Update {
            kind: D::KIND.to_string(),
            id: doc.document_id(),
            expected: doc.version(),
            body: serde_json::to_value(doc)?,
            lookup: doc.lookup(),
        });
        Ok(self)
    }

    /// Deletes a document that must still be at the version it was read at.
    pub fn delete<D: Document>(&mut self, doc: &D) -> &mut Self {
        self.batch.push(DocumentWrite::Delete {
            kind: D::KIND.to_string(),
            id: doc.document_id(),
            expected: doc.version(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn into_batch(self) -> WriteBatch {
        self.batch
    }
}

/// Typed repository over a [`LedgerStore`].
#[derive(Clone)]
pub struct Repository<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> Repository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads a document, returning None if it doesn't exist.
    pub async fn load<D: Document>(&self, id: Uuid) -> Result<Option<D>, DomainError> {
        match self.store.get(D::KIND, id).await? {
            Some(stored) => Ok(Some(decode(&stored)?)),
            None => Ok(None),
        }
    }

    /// Loads a document that must exist.
    pub async fn require<D: Document>(&self, id: Uuid) -> Result<D, DomainError> {
        self.load(id)
            .await?
            .ok_or_else(|| DomainError::not_found(D::KIND, id))
    }

    /// Returns documents of kind `D` matching the query's field filters.
    pub async fn find<D: Document>(&self, query: DocumentQuery) -> Result<Vec<D>, DomainError> {
        self.store
            .find(query)
            .await?
            .iter()
            .map(decode::<D>)
            .collect()
    }

    /// Returns the first matching document.
    pub async fn find_one<D: Document>(
        &self,
        query: DocumentQuery,
    ) -> Result<Option<D>, DomainError> {
        Ok(self.find(query.limit(1)).await?.into_iter().next())
    }

    /// Counts documents matching the query.
    pub async fn count(&self, query: DocumentQuery) -> Result<u64, DomainError> {
        Ok(self.store.count(query).await?)
    }

    /// Commits every write in the unit of work atomically.
    pub async fn commit(&self, work: UnitOfWork) -> Result<Vec<Version>, DomainError> {
        Ok(self.store.commit(work.into_batch()).await?)
    }
}

/// Starts a query over documents of kind `D`.
pub fn query<D: Document>() -> DocumentQuery {
    DocumentQuery::for_kind(D::KIND)
}

fn decode<D: Document>(stored: &StoredDocument) -> Result<D, DomainError> {
    let mut doc: D = stored.decode()?;
    doc.set_version(stored.version);
    Ok(doc)
}

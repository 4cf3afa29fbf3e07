use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgPoolOptions, postgres::PgRow};
use uuid::Uuid;

use crate::{
    DocumentQuery, Result, SortOrder, StoreError, StoredDocument, Version,
    store::{DocumentWrite, LedgerStore, WriteBatch},
};

const SELECT_COLUMNS: &str =
    "SELECT seq, kind, id, version, body, lookup, created_at, updated_at FROM documents";

/// PostgreSQL-backed ledger store implementation.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Creates a new PostgreSQL ledger store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool for the given database URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_document(row: PgRow) -> Result<StoredDocument> {
        let lookup_json: serde_json::Value = row.try_get("lookup")?;
        let lookup: BTreeMap<String, String> = serde_json::from_value(lookup_json)?;

        Ok(StoredDocument {
            kind: row.try_get("kind")?,
            id: row.try_get::<Uuid, _>("id")?,
            version: Version::new(row.try_get("version")?),
            sequence: row.try_get("seq")?,
            body: row.try_get("body")?,
            lookup,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Explains why a versioned write matched no row.
    async fn missed_write(
        tx: &mut Transaction<'_, Postgres>,
        kind: &str,
        id: Uuid,
        expected: Version,
    ) -> Result<StoreError> {
        let actual: Option<i64> =
            sqlx::query_scalar("SELECT version FROM documents WHERE kind = $1 AND id = $2")
                .bind(kind)
                .bind(id)
                .fetch_optional(&mut **tx)
                .await?;

        Ok(match actual {
            None => StoreError::DocumentNotFound {
                kind: kind.to_string(),
                id,
            },
            Some(actual) => StoreError::ConcurrencyConflict {
                kind: kind.to_string(),
                id,
                expected,
                actual: Version::new(actual),
            },
        })
    }

    async fn apply(tx: &mut Transaction<'_, Postgres>, write: &DocumentWrite) -> Result<Version> {
        match write {
            DocumentWrite::Insert {
                kind,
                id,
                body,
                lookup,
            } => {
                let inserted: Option<i64> = sqlx::query_scalar(
                    r#"
                    INSERT INTO documents (kind, id, version, body, lookup)
                    VALUES ($1, $2, 1, $3, $4)
                    ON CONFLICT (kind, id) DO NOTHING
                    RETURNING version
                    "#,
                )
                .bind(kind)
                .bind(id)
                .bind(body)
                .bind(serde_json::to_value(lookup)?)
                .fetch_optional(&mut **tx)
                .await?;

                match inserted {
                    Some(version) => Ok(Version::new(version)),
                    None => Err(StoreError::AlreadyExists {
                        kind: kind.clone(),
                        id: *id,
                    }),
                }
            }
            DocumentWrite::Update {
                kind,
                id,
                expected,
                body,
                lookup,
            } => {
                let updated: Option<i64> = sqlx::query_scalar(
                    r#"
                    UPDATE documents
                    SET version = version + 1, body = $4, lookup = $5, updated_at = NOW()
                    WHERE kind = $1 AND id = $2 AND version = $3
                    RETURNING version
                    "#,
                )
                .bind(kind)
                .bind(id)
                .bind(expected.as_i64())
                .bind(body)
                .bind(serde_json::to_value(lookup)?)
                .fetch_optional(&mut **tx)
                .await?;

                match updated {
                    Some(version) => Ok(Version::new(version)),
                    None => Err(Self::missed_write(tx, kind, *id, *expected).await?),
                }
            }
            DocumentWrite::Delete { kind, id, expected } => {
                let deleted = sqlx::query(
                    "DELETE FROM documents WHERE kind = $1 AND id = $2 AND version = $3",
                )
                .bind(kind)
                .bind(id)
                .bind(expected.as_i64())
                .execute(&mut **tx)
                .await?;

                if deleted.rows_affected() == 0 {
                    return Err(Self::missed_write(tx, kind, *id, *expected).await?);
                }
                Ok(Version::initial())
            }
        }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn get(&self, kind: &str, id: Uuid) -> Result<Option<StoredDocument>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE kind = $1 AND id = $2"))
            .bind(kind)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_document).transpose()
    }

    async fn find(&self, query: DocumentQuery) -> Result<Vec<StoredDocument>> {
        let mut sql = format!("{SELECT_COLUMNS} WHERE kind = $1 AND lookup @> $2");
        let mut param_count = 2;

        match query.order {
            SortOrder::OldestFirst => sql.push_str(" ORDER BY seq ASC"),
            SortOrder::NewestFirst => sql.push_str(" ORDER BY seq DESC"),
        }
        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql)
            .bind(&query.kind)
            .bind(serde_json::to_value(&query.fields)?);
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_document).collect()
    }

    async fn count(&self, query: DocumentQuery) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE kind = $1 AND lookup @> $2")
                .bind(&query.kind)
                .bind(serde_json::to_value(&query.fields)?)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.max(0) as u64)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<Vec<Version>> {
        batch.validate()?;

        let mut tx = self.pool.begin().await?;
        let mut versions = Vec::with_capacity(batch.len());

        for write in batch.writes() {
            match Self::apply(&mut tx, write).await {
                Ok(version) => versions.push(version),
                Err(e) => {
                    if e.is_conflict() {
                        metrics::counter!("ledger_store_conflicts_total").increment(1);
                    }
                    tracing::debug!(
                        kind = write.kind(),
                        id = %write.id(),
                        error = %e,
                        "Rolling back write batch"
                    );
                    // Dropping the transaction rolls it back.
                    return Err(e);
                }
            }
        }

        tx.commit().await?;
        Ok(versions)
    }
}

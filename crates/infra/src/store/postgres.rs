//! Postgres-backed document store.
//!
//! One JSONB table keyed by `(collection, id)`. Field lookups use the `->`
//! operator on the top-level object, so `find_by_field` only matches
//! top-level fields (same as the in-memory backend).
//!
//! ## Error Mapping
//!
//! Every SQLx error maps to `StoreError::Backend` with the operation name
//! prefixed. Unique violations on `create` are reported as `Ok(false)` via
//! `ON CONFLICT DO NOTHING` rather than as errors.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use tracing::instrument;

use super::{DocumentStore, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    body JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (collection, id)
)
"#;

#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: Arc<PgPool>,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and make sure the `documents` table exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("{operation}: {err}"))
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    #[instrument(skip(self), err)]
    async fn get(&self, collection: &str, id: &str) -> Result<Option<JsonValue>, StoreError> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?;

        row.map(|r| r.try_get::<JsonValue, _>("body"))
            .transpose()
            .map_err(|e| map_sqlx_error("get", e))
    }

    #[instrument(skip(self, body), err)]
    async fn put(&self, collection: &str, id: &str, body: JsonValue) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id)
            DO UPDATE SET body = EXCLUDED.body, updated_at = now()
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(body)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("put", e))?;
        Ok(())
    }

    #[instrument(skip(self, body), err)]
    async fn create(&self, collection: &str, id: &str, body: JsonValue) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO NOTHING
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(body)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create", e))?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, value), err)]
    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &JsonValue,
    ) -> Result<Vec<(String, JsonValue)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, body FROM documents
            WHERE collection = $1 AND body -> $2 = $3
            ORDER BY id ASC
            "#,
        )
        .bind(collection)
        .bind(field)
        .bind(value)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_field", e))?;

        rows.into_iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(|e| map_sqlx_error("find_by_field", e))?;
                let body: JsonValue = row
                    .try_get("body")
                    .map_err(|e| map_sqlx_error("find_by_field", e))?;
                Ok((id, body))
            })
            .collect()
    }

    #[instrument(skip(self, expected, new), err)]
    async fn compare_and_swap(
        &self,
        collection: &str,
        id: &str,
        expected: &JsonValue,
        new: JsonValue,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE documents SET body = $4, updated_at = now()
            WHERE collection = $1 AND id = $2 AND body = $3
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(expected)
        .bind(new)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("compare_and_swap", e))?;
        Ok(result.rows_affected() == 1)
    }
}

//! Document store: the opaque persistence the portal runs on.
//!
//! Collections of JSON documents addressed by string ids. Two backends:
//! `InMemoryDocumentStore` for tests/dev and `PostgresDocumentStore` (JSONB).
//! Typed access goes through [`Documents`].

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use qrportal_core::Entity;

pub use in_memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("document (de)serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<StoreError> for qrportal_core::PortalError {
    fn from(err: StoreError) -> Self {
        qrportal_core::PortalError::server(err.to_string())
    }
}

/// Raw document store contract.
///
/// No cross-document transactions; `create` and `compare_and_swap` are the
/// only single-document atomic primitives.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<JsonValue>, StoreError>;

    /// Insert or overwrite.
    async fn put(&self, collection: &str, id: &str, body: JsonValue) -> Result<(), StoreError>;

    /// Insert only if absent. Returns `false` when the id is taken.
    async fn create(&self, collection: &str, id: &str, body: JsonValue) -> Result<bool, StoreError>;

    /// Returns whether a document was removed. Deleting a missing id is not an error.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    /// All documents whose top-level `field` equals `value`.
    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &JsonValue,
    ) -> Result<Vec<(String, JsonValue)>, StoreError>;

    /// Replace the document only if it currently equals `expected`.
    async fn compare_and_swap(
        &self,
        collection: &str,
        id: &str,
        expected: &JsonValue,
        new: JsonValue,
    ) -> Result<bool, StoreError>;
}

/// Typed façade over a shared [`DocumentStore`].
#[derive(Clone)]
pub struct Documents {
    inner: Arc<dyn DocumentStore>,
}

impl Documents {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self { inner }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryDocumentStore::new()))
    }

    pub fn raw(&self) -> &dyn DocumentStore {
        self.inner.as_ref()
    }

    pub async fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>, StoreError> {
        match self.inner.get(collection, id).await? {
            Some(body) => Ok(Some(serde_json::from_value(body)?)),
            None => Ok(None),
        }
    }

    pub async fn put<T: Serialize>(&self, collection: &str, id: &str, value: &T) -> Result<(), StoreError> {
        self.inner.put(collection, id, serde_json::to_value(value)?).await
    }

    pub async fn create<T: Serialize>(&self, collection: &str, id: &str, value: &T) -> Result<bool, StoreError> {
        self.inner.create(collection, id, serde_json::to_value(value)?).await
    }

    pub async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.inner.delete(collection, id).await
    }

    pub async fn find_by_field<T: DeserializeOwned>(
        &self,
        collection: &str,
        field: &str,
        value: impl Serialize,
    ) -> Result<Vec<(String, T)>, StoreError> {
        let value = serde_json::to_value(value)?;
        self.inner
            .find_by_field(collection, field, &value)
            .await?
            .into_iter()
            .map(|(id, body)| Ok((id, serde_json::from_value(body)?)))
            .collect()
    }

    pub async fn compare_and_swap<T: Serialize>(
        &self,
        collection: &str,
        id: &str,
        expected: &T,
        new: &T,
    ) -> Result<bool, StoreError> {
        let expected = serde_json::to_value(expected)?;
        self.inner
            .compare_and_swap(collection, id, &expected, serde_json::to_value(new)?)
            .await
    }

    pub async fn load<E: Entity + DeserializeOwned>(&self, id: &E::Id) -> Result<Option<E>, StoreError> {
        self.get(E::COLLECTION, id.as_ref()).await
    }

    pub async fn save<E: Entity + Serialize>(&self, entity: &E) -> Result<(), StoreError> {
        self.put(E::COLLECTION, entity.id().as_ref(), entity).await
    }

    /// Insert an entity whose id must not exist yet.
    pub async fn insert<E: Entity + Serialize>(&self, entity: &E) -> Result<bool, StoreError> {
        self.create(E::COLLECTION, entity.id().as_ref(), entity).await
    }
}

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::{DocumentStore, StoreError};

type Collection = BTreeMap<String, JsonValue>;

/// In-memory document store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    inner: RwLock<HashMap<String, Collection>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.inner
            .read()
            .map(|m| m.get(collection).map_or(0, |c| c.len()))
            .unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<JsonValue>, StoreError> {
        let map = self.inner.read().map_err(poisoned)?;
        Ok(map.get(collection).and_then(|c| c.get(id)).cloned())
    }

    async fn put(&self, collection: &str, id: &str, body: JsonValue) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(poisoned)?;
        map.entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), body);
        Ok(())
    }

    async fn create(&self, collection: &str, id: &str, body: JsonValue) -> Result<bool, StoreError> {
        let mut map = self.inner.write().map_err(poisoned)?;
        let docs = map.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Ok(false);
        }
        docs.insert(id.to_string(), body);
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let mut map = self.inner.write().map_err(poisoned)?;
        Ok(map
            .get_mut(collection)
            .and_then(|c| c.remove(id))
            .is_some())
    }

    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &JsonValue,
    ) -> Result<Vec<(String, JsonValue)>, StoreError> {
        let map = self.inner.read().map_err(poisoned)?;
        let Some(docs) = map.get(collection) else {
            return Ok(vec![]);
        };
        Ok(docs
            .iter()
            .filter(|(_, body)| body.get(field) == Some(value))
            .map(|(id, body)| (id.clone(), body.clone()))
            .collect())
    }

    async fn compare_and_swap(
        &self,
        collection: &str,
        id: &str,
        expected: &JsonValue,
        new: JsonValue,
    ) -> Result<bool, StoreError> {
        let mut map = self.inner.write().map_err(poisoned)?;
        match map.get_mut(collection).and_then(|c| c.get_mut(id)) {
            Some(current) if current == expected => {
                *current = new;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_refuses_existing_ids() {
        let store = InMemoryDocumentStore::new();
        assert!(store.create("c", "1", json!({"a": 1})).await.unwrap());
        assert!(!store.create("c", "1", json!({"a": 2})).await.unwrap());
        assert_eq!(store.get("c", "1").await.unwrap(), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemoryDocumentStore::new();
        store.put("c", "1", json!({})).await.unwrap();
        assert!(store.delete("c", "1").await.unwrap());
        assert!(!store.delete("c", "1").await.unwrap());
        assert!(!store.delete("missing", "1").await.unwrap());
    }

    #[tokio::test]
    async fn find_by_field_matches_top_level_values() {
        let store = InMemoryDocumentStore::new();
        store.put("s", "a", json!({"principalId": "p1"})).await.unwrap();
        store.put("s", "b", json!({"principalId": "p2"})).await.unwrap();
        store.put("s", "c", json!({"principalId": "p1"})).await.unwrap();
        let hits = store.find_by_field("s", "principalId", &json!("p1")).await.unwrap();
        let ids: Vec<_> = hits.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn compare_and_swap_only_applies_to_expected_state() {
        let store = InMemoryDocumentStore::new();
        store.put("i", "t", json!({"used": false})).await.unwrap();
        assert!(store
            .compare_and_swap("i", "t", &json!({"used": false}), json!({"used": true}))
            .await
            .unwrap());
        assert!(!store
            .compare_and_swap("i", "t", &json!({"used": false}), json!({"used": true}))
            .await
            .unwrap());
        assert!(!store
            .compare_and_swap("i", "missing", &json!({}), json!({}))
            .await
            .unwrap());
    }
}

use crate::error::StoreError;
use crate::model::Subscription;

use super::{SharedBlobStore, keys, read_json, write_json};

/// Podcast id → subscription, published as one keyed collection.
///
/// Every mutation is a read-modify-write of the whole collection; concurrent
/// writers resolve last-write-wins.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    store: SharedBlobStore,
}

impl SubscriptionRegistry {
    pub fn new(store: SharedBlobStore) -> Self {
        Self { store }
    }

    /// All subscriptions in the order they were first added
    pub async fn list(&self) -> Result<Vec<Subscription>, StoreError> {
        match read_json(self.store.as_ref(), keys::SUBSCRIPTIONS).await {
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            other => other,
        }
    }

    pub async fn get(&self, podcast_id: &str) -> Result<Subscription, StoreError> {
        self.list()
            .await?
            .into_iter()
            .find(|subscription| subscription.id == podcast_id)
            .ok_or_else(|| StoreError::NotFound {
                key: format!("{}#{podcast_id}", keys::SUBSCRIPTIONS),
            })
    }

    pub async fn exists(&self, podcast_id: &str) -> Result<bool, StoreError> {
        Ok(self.list().await?.iter().any(|s| s.id == podcast_id))
    }

    /// Insert or fully replace the subscription with the same id
    pub async fn put(&self, subscription: Subscription) -> Result<(), StoreError> {
        let mut subscriptions = self.list().await?;
        match subscriptions.iter_mut().find(|s| s.id == subscription.id) {
            Some(existing) => *existing = subscription,
            None => subscriptions.push(subscription),
        }
        write_json(self.store.as_ref(), keys::SUBSCRIPTIONS, &subscriptions).await
    }

    /// Replace the subscription with the same id if there still is one.
    ///
    /// Returns `false`, writing nothing, when the id is not subscribed.
    pub async fn update(&self, subscription: Subscription) -> Result<bool, StoreError> {
        let mut subscriptions = self.list().await?;
        let Some(existing) = subscriptions.iter_mut().find(|s| s.id == subscription.id) else {
            return Ok(false);
        };
        *existing = subscription;
        write_json(self.store.as_ref(), keys::SUBSCRIPTIONS, &subscriptions).await?;
        Ok(true)
    }

    /// Remove a subscription, returning it if it was present
    pub async fn remove(&self, podcast_id: &str) -> Result<Option<Subscription>, StoreError> {
        let mut subscriptions = self.list().await?;
        let Some(index) = subscriptions.iter().position(|s| s.id == podcast_id) else {
            return Ok(None);
        };
        let removed = subscriptions.remove(index);
        write_json(self.store.as_ref(), keys::SUBSCRIPTIONS, &subscriptions).await?;
        Ok(Some(removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use std::sync::Arc;

    fn subscription(id: &str, title: &str) -> Subscription {
        Subscription {
            id: id.to_string(),
            title: title.to_string(),
            author: String::new(),
            feed_url: format!("https://example.com/{id}.xml"),
            image_url: String::new(),
            description: String::new(),
            episode_count: 0,
            last_updated: Utc::now(),
            subscribed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn empty_registry_lists_nothing() {
        let registry = SubscriptionRegistry::new(Arc::new(MemoryStore::new()));
        assert!(registry.list().await.unwrap().is_empty());
        assert!(!registry.exists("p1").await.unwrap());
        assert!(registry.get("p1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn put_replaces_in_place() {
        let registry = SubscriptionRegistry::new(Arc::new(MemoryStore::new()));
        registry.put(subscription("p1", "One")).await.unwrap();
        registry.put(subscription("p2", "Two")).await.unwrap();
        registry.put(subscription("p1", "One, renamed")).await.unwrap();

        let all = registry.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "p1");
        assert_eq!(all[0].title, "One, renamed");
        assert_eq!(registry.get("p2").await.unwrap().title, "Two");
    }

    #[tokio::test]
    async fn remove_returns_removed_record() {
        let registry = SubscriptionRegistry::new(Arc::new(MemoryStore::new()));
        registry.put(subscription("p1", "One")).await.unwrap();

        let removed = registry.remove("p1").await.unwrap();
        assert_eq!(removed.map(|s| s.title), Some("One".to_string()));
        assert!(!registry.exists("p1").await.unwrap());
        assert!(registry.remove("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_never_inserts() {
        let memory = MemoryStore::new();
        let registry = SubscriptionRegistry::new(Arc::new(memory.clone()));

        assert!(!registry.update(subscription("p1", "One")).await.unwrap());
        assert!(memory.keys().is_empty());

        registry.put(subscription("p1", "One")).await.unwrap();
        assert!(registry.update(subscription("p1", "Renamed")).await.unwrap());
        assert_eq!(registry.get("p1").await.unwrap().title, "Renamed");
    }
}

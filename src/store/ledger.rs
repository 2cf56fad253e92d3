use crate::error::StoreError;
use crate::model::{Episode, FeedSnapshot};

use super::{SharedBlobStore, keys, read_json, write_json};

/// Podcast id → episode list and latest feed snapshot
#[derive(Clone)]
pub struct EpisodeLedger {
    store: SharedBlobStore,
}

impl EpisodeLedger {
    pub fn new(store: SharedBlobStore) -> Self {
        Self { store }
    }

    pub async fn episodes(&self, podcast_id: &str) -> Result<Vec<Episode>, StoreError> {
        read_json(self.store.as_ref(), &keys::episodes(podcast_id)?).await
    }

    /// The recorded episode list, or an empty one for a podcast never synced
    pub async fn episodes_or_empty(&self, podcast_id: &str) -> Result<Vec<Episode>, StoreError> {
        match self.episodes(podcast_id).await {
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            other => other,
        }
    }

    pub async fn put_episodes(
        &self,
        podcast_id: &str,
        episodes: &[Episode],
    ) -> Result<(), StoreError> {
        write_json(self.store.as_ref(), &keys::episodes(podcast_id)?, &episodes).await
    }

    pub async fn exists(&self, podcast_id: &str) -> Result<bool, StoreError> {
        self.store.exists(&keys::episodes(podcast_id)?).await
    }

    pub async fn snapshot(&self, podcast_id: &str) -> Result<FeedSnapshot, StoreError> {
        read_json(self.store.as_ref(), &keys::snapshot(podcast_id)?).await
    }

    pub async fn put_snapshot(&self, snapshot: &FeedSnapshot) -> Result<(), StoreError> {
        write_json(
            self.store.as_ref(),
            &keys::snapshot(&snapshot.podcast_id)?,
            snapshot,
        )
        .await
    }
}

//! Durable key/blob storage and the typed record stores built on it.
//!
//! Every record lives at its own key so a reader can fetch exactly what it
//! needs. Writes are last-write-wins per key and may become visible to other
//! readers only after a delay.

mod charts;
mod fs;
mod http;
mod ledger;
mod lookups;
mod memory;
mod registry;
mod results;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;

pub use charts::ChartStore;
pub use fs::FsStore;
pub use http::HttpStore;
pub use ledger::EpisodeLedger;
pub use lookups::LookupStore;
pub use memory::MemoryStore;
pub use registry::SubscriptionRegistry;
pub use results::ResultStore;

/// A durable mapping from string keys to opaque blobs
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read a blob; `Ok(None)` means nothing has been written at `key` yet
    async fn read(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Overwrite the blob at `key`
    async fn write(&self, key: &str, data: Bytes) -> Result<(), StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.read(key).await?.is_some())
    }
}

/// A shared reference to a blob store
pub type SharedBlobStore = Arc<dyn BlobStore>;

/// Layout of the records inside the blob store
pub mod keys {
    use crate::error::StoreError;
    use crate::model::RequestId;

    pub const SUBSCRIPTIONS: &str = "data/subscriptions.json";
    pub const ALL_LOOKUPS: &str = "data/all_lookups.json";

    pub fn result(request_id: &RequestId) -> Result<String, StoreError> {
        Ok(format!("data/requests/{}.json", segment(request_id.as_str())?))
    }

    pub fn episodes(podcast_id: &str) -> Result<String, StoreError> {
        Ok(format!("data/episodes/{}/list.json", segment(podcast_id)?))
    }

    pub fn snapshot(podcast_id: &str) -> Result<String, StoreError> {
        Ok(format!("data/episodes/{}/feed.json", segment(podcast_id)?))
    }

    pub fn top_chart(country: &str) -> Result<String, StoreError> {
        Ok(format!("data/top_{}.json", segment(country)?))
    }

    pub fn lookup(itunes_id: &str) -> Result<String, StoreError> {
        Ok(format!("data/lookups/{}.json", segment(itunes_id)?))
    }

    /// Client-supplied ids become path segments and must not escape their directory
    fn segment(value: &str) -> Result<&str, StoreError> {
        let valid = !value.is_empty()
            && value != "."
            && value != ".."
            && !value.contains(['/', '\\'])
            && !value.chars().any(char::is_control);
        if valid {
            Ok(value)
        } else {
            Err(StoreError::InvalidKey(value.to_string()))
        }
    }
}

/// Read and decode a JSON record, mapping absence to [`StoreError::NotFound`]
pub(crate) async fn read_json<T: DeserializeOwned>(
    store: &dyn BlobStore,
    key: &str,
) -> Result<T, StoreError> {
    let bytes = store.read(key).await?.ok_or_else(|| StoreError::NotFound {
        key: key.to_string(),
    })?;

    serde_json::from_slice(&bytes).map_err(|e| StoreError::JsonParseFailed {
        key: key.to_string(),
        source: e,
    })
}

/// Encode a record as pretty JSON and write it
pub(crate) async fn write_json<T: Serialize>(
    store: &dyn BlobStore,
    key: &str,
    record: &T,
) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(record)?;
    store.write(key, Bytes::from(json)).await
}

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use url::Url;

use crate::error::{FetchError, StoreError};
use crate::http::{HttpClient, fetch_following_redirects};

use super::BlobStore;

/// Read-only view of the published store, addressed by URL.
///
/// A 404 is the "not written yet" signal; every other failure (network error,
/// 5xx, truncated body) is reported as [`StoreError::Unavailable`].
#[derive(Clone)]
pub struct HttpStore {
    base_url: Url,
    client: Arc<dyn HttpClient>,
}

impl HttpStore {
    pub fn new(base_url: Url, client: Arc<dyn HttpClient>) -> Self {
        // Without a trailing slash, joining would replace the last path segment
        let base_url = if base_url.path().ends_with('/') {
            base_url
        } else {
            let mut with_slash = base_url;
            with_slash.set_path(&format!("{}/", with_slash.path()));
            with_slash
        };
        Self { base_url, client }
    }

    fn url_for(&self, key: &str) -> Result<Url, StoreError> {
        self.base_url
            .join(key)
            .map_err(|_| StoreError::InvalidKey(key.to_string()))
    }
}

#[async_trait]
impl BlobStore for HttpStore {
    async fn read(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let url = self.url_for(key)?;
        let unavailable = |reason: String| StoreError::Unavailable {
            key: key.to_string(),
            reason,
        };

        let fetched = match fetch_following_redirects(self.client.as_ref(), url.as_str()).await {
            Ok(fetched) => fetched,
            Err(FetchError::Status { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(unavailable(e.to_string())),
        };

        let mut body = Vec::new();
        let mut stream = fetched.response.body;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| unavailable(e.to_string()))?;
            body.extend_from_slice(&chunk);
        }

        Ok(Some(Bytes::from(body)))
    }

    async fn write(&self, key: &str, _data: Bytes) -> Result<(), StoreError> {
        Err(StoreError::ReadOnly {
            key: key.to_string(),
        })
    }
}

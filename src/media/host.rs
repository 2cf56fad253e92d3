use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::{FetchError, MediaError};
use crate::http::ByteStream;

/// Where and how much was stored for one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    /// Bytes written
    pub size: u64,
    /// Location the content host serves the object from
    pub storage: String,
    /// "sha256:<hex>" digest of the stored bytes
    pub content_hash: String,
}

/// Destination for downloaded episode audio
#[async_trait]
pub trait ContentHost: Send + Sync {
    /// Stream `body` into the object `name`, replacing any previous object.
    ///
    /// `source_url` is only used to attribute stream errors.
    async fn upload(
        &self,
        name: &str,
        source_url: &str,
        body: ByteStream,
    ) -> Result<StoredMedia, MediaError>;
}

/// Content host backed by a local directory
#[derive(Debug, Clone)]
pub struct FsContentHost {
    root: PathBuf,
}

impl FsContentHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ContentHost for FsContentHost {
    /// Streams to a `.partial` file which is renamed once complete. The
    /// partial file is removed again on any failure.
    async fn upload(
        &self,
        name: &str,
        source_url: &str,
        body: ByteStream,
    ) -> Result<StoredMedia, MediaError> {
        let output_path = self.root.join(name);
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MediaError::FileCreateFailed {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let mut partial = output_path.clone().into_os_string();
        partial.push(".partial");
        let partial_path = PathBuf::from(partial);

        let file = File::create(&partial_path)
            .await
            .map_err(|e| MediaError::FileCreateFailed {
                path: partial_path.clone(),
                source: e,
            })?;

        let written = match write_hashed(file, body, source_url, &partial_path).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial_path).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&partial_path, &output_path).await {
            let _ = tokio::fs::remove_file(&partial_path).await;
            return Err(MediaError::FileWriteFailed {
                path: output_path,
                source: e,
            });
        }

        Ok(StoredMedia {
            size: written.size,
            storage: output_path.display().to_string(),
            content_hash: written.content_hash,
        })
    }
}

struct Written {
    size: u64,
    content_hash: String,
}

/// Copy `body` into `file`, hashing it on the way
async fn write_hashed(
    mut file: File,
    mut body: ByteStream,
    source_url: &str,
    path: &Path,
) -> Result<Written, MediaError> {
    let write_failed = |e| MediaError::FileWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let mut hasher = Sha256::new();
    let mut size: u64 = 0;

    while let Some(chunk_result) = body.next().await {
        let chunk = chunk_result.map_err(|e| {
            MediaError::Fetch(FetchError::Stream {
                url: source_url.to_string(),
                source: e,
            })
        })?;

        hasher.update(&chunk);
        file.write_all(&chunk).await.map_err(write_failed)?;
        size += chunk.len() as u64;
    }

    // Ensure all data is flushed to disk
    file.flush().await.map_err(write_failed)?;

    Ok(Written {
        size,
        content_hash: format!("sha256:{:x}", hasher.finalize()),
    })
}

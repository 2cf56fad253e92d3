// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod host;
mod naming;

use tracing::{debug, info};

use crate::error::MediaError;
use crate::http::{HttpClient, fetch_following_redirects};

pub use host::{ContentHost, FsContentHost, StoredMedia};
pub use naming::{audio_extension, media_object_name};

/// Identifies the episode being downloaded
#[derive(Debug, Clone, Copy)]
pub struct MediaRequest<'a> {
    pub podcast_id: &'a str,
    pub episode_id: &'a str,
    pub url: &'a str,
    /// Enclosure MIME type recorded for the episode, if known
    pub mime_type: Option<&'a str>,
}

/// Download an episode and stream it into the content host
///
/// Redirects are followed up to the usual bound. Nothing is stored when the
/// fetch fails; a failure mid-stream leaves no object behind.
pub async fn download_episode(
    client: &dyn HttpClient,
    host: &dyn ContentHost,
    request: MediaRequest<'_>,
) -> Result<StoredMedia, MediaError> {
    let fetched = fetch_following_redirects(client, request.url).await?;
    let name = media_object_name(
        request.podcast_id,
        request.episode_id,
        fetched.url.as_str(),
        request.mime_type,
    );
    debug!(
        url = %fetched.url,
        name,
        content_length = ?fetched.response.content_length,
        "Streaming episode to content host"
    );

    let stored = host
        .upload(&name, fetched.url.as_str(), fetched.response.body)
        .await?;

    info!(
        podcast_id = request.podcast_id,
        episode_id = request.episode_id,
        size = stored.size,
        "Episode stored"
    );
    Ok(stored)
}

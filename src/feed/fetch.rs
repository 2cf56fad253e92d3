// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use tracing::debug;

use crate::error::FeedError;
use crate::http::{HttpClient, fetch_bytes};

use super::parse::{ExtractedFeed, FeedExtractor};

/// Fetch a feed (following redirects) and extract it
pub async fn fetch_feed(
    client: &dyn HttpClient,
    extractor: &dyn FeedExtractor,
    url: &str,
) -> Result<ExtractedFeed, FeedError> {
    let bytes = fetch_bytes(client, url).await?;
    debug!(url, bytes = bytes.len(), "Fetched feed");
    extractor.extract(&bytes)
}

/// Determine if a string is an absolute http(s) URL
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod merge;

use chrono::Utc;
use tracing::{debug, info};

use crate::error::{FeedError, StoreError};
use crate::feed::{FeedExtractor, fetch_feed};
use crate::http::HttpClient;
use crate::model::{ChannelSummary, Episode, FeedSnapshot};
use crate::store::EpisodeLedger;

pub use merge::{MergeOutcome, merge_episodes};

/// Caller-supplied values that take precedence over what the feed says
#[derive(Debug, Clone, Default)]
pub struct SyncOverrides {
    pub title: Option<String>,
}

/// Result of one feed synchronization, not yet persisted
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub snapshot: FeedSnapshot,
    pub episodes: Vec<Episode>,
    pub new_count: usize,
}

impl SyncOutcome {
    pub fn channel(&self) -> &ChannelSummary {
        &self.snapshot.channel
    }
}

/// Synchronize a podcast feed against its recorded episode list
///
/// This is shared by the subscribe and refresh paths. It:
/// 1. Fetches the feed (redirects followed, bounded)
/// 2. Extracts channel metadata and items
/// 3. Merges new items in front of the prior list
/// 4. Builds a fresh snapshot of the channel
///
/// Nothing is written; a fetch or extraction failure leaves every store as it
/// was.
pub async fn sync_feed(
    client: &dyn HttpClient,
    extractor: &dyn FeedExtractor,
    podcast_id: &str,
    feed_url: &str,
    prior: Vec<Episode>,
    overrides: &SyncOverrides,
) -> Result<SyncOutcome, FeedError> {
    debug!(podcast_id, feed_url, prior = prior.len(), "Syncing feed");

    let feed = fetch_feed(client, extractor, feed_url).await?;
    let fetched = feed.items.len();
    let mut channel = feed.channel;
    if let Some(title) = overrides.title.as_ref().filter(|t| !t.trim().is_empty()) {
        channel.title = title.clone();
    }

    let merged = merge_episodes(podcast_id, prior, feed.items);

    info!(
        podcast_id,
        fetched,
        new = merged.new_count,
        total = merged.episodes.len(),
        "Feed synced"
    );

    Ok(SyncOutcome {
        snapshot: FeedSnapshot {
            podcast_id: podcast_id.to_string(),
            channel,
            episode_count: merged.episodes.len(),
            last_updated: Utc::now(),
        },
        episodes: merged.episodes,
        new_count: merged.new_count,
    })
}

/// Persist a sync outcome: the episode list first, then the snapshot
pub async fn persist_sync(ledger: &EpisodeLedger, outcome: &SyncOutcome) -> Result<(), StoreError> {
    ledger
        .put_episodes(&outcome.snapshot.podcast_id, &outcome.episodes)
        .await?;
    ledger.put_snapshot(&outcome.snapshot).await
}

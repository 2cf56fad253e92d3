// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One worker invocation: route a request to its handler, then record the
//! outcome.

mod payload;
mod refresh;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::directory::PodcastDirectory;
use crate::error::{HandlerError, WorkerError};
use crate::feed::{FeedExtractor, is_url};
use crate::http::HttpClient;
use crate::media::{ContentHost, MediaRequest, download_episode};
use crate::model::{
    Action, DirectoryEntry, Lookup, RequestRecord, ResultRecord, Subscription, TopChart,
    derive_podcast_id,
};
use crate::progress::{NoopReporter, SharedProgressReporter};
use crate::store::{
    ChartStore, EpisodeLedger, LookupStore, ResultStore, SharedBlobStore, SubscriptionRegistry,
    keys,
};
use crate::sync::{SyncOutcome, SyncOverrides, persist_sync, sync_feed};

pub use payload::{
    DownloadOutput, DownloadPayload, SearchOutput, SearchPayload, SubscribeOutput,
    SubscribePayload, UnsubscribeOutput, UnsubscribePayload, UpdateFeedsOutput,
    UpdateFeedsPayload, UpdateTopOutput, UpdateTopPayload,
};

/// Tunables for a worker
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Pause between two feeds of a batch refresh
    pub feed_delay: Duration,
    /// Top chart length when the request does not name one
    pub top_limit: usize,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            feed_delay: Duration::from_millis(1000),
            top_limit: 50,
        }
    }
}

/// What a handler produced; serialized flat into the result record
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ActionOutput {
    Search(SearchOutput),
    Subscribe(SubscribeOutput),
    Unsubscribe(UnsubscribeOutput),
    Download(DownloadOutput),
    UpdateTop(UpdateTopOutput),
    UpdateFeeds(UpdateFeedsOutput),
}

/// Everything a worker talks to
pub struct Collaborators {
    pub client: Arc<dyn HttpClient>,
    pub extractor: Arc<dyn FeedExtractor>,
    pub directory: Arc<dyn PodcastDirectory>,
    pub content_host: Arc<dyn ContentHost>,
    pub store: SharedBlobStore,
}

/// A stateless worker. Each [`Worker::handle`] call is one request end to end.
pub struct Worker {
    client: Arc<dyn HttpClient>,
    extractor: Arc<dyn FeedExtractor>,
    directory: Arc<dyn PodcastDirectory>,
    content_host: Arc<dyn ContentHost>,
    results: ResultStore,
    registry: SubscriptionRegistry,
    ledger: EpisodeLedger,
    charts: ChartStore,
    lookups: LookupStore,
    options: WorkerOptions,
    reporter: SharedProgressReporter,
}

impl Worker {
    pub fn new(collaborators: Collaborators, options: WorkerOptions) -> Self {
        let store = collaborators.store;
        Self {
            client: collaborators.client,
            extractor: collaborators.extractor,
            directory: collaborators.directory,
            content_host: collaborators.content_host,
            results: ResultStore::new(store.clone()),
            registry: SubscriptionRegistry::new(store.clone()),
            ledger: EpisodeLedger::new(store.clone()),
            charts: ChartStore::new(store.clone()),
            lookups: LookupStore::new(store),
            options,
            reporter: NoopReporter::shared(),
        }
    }

    pub fn with_reporter(mut self, reporter: SharedProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Handle one request.
    ///
    /// When the request carries an id, exactly one result record is written,
    /// after every other store mutation of the handler, and returned. A
    /// handler failure becomes a failure record rather than an error. Without
    /// an id (scheduled batch runs) nothing is recorded and a handler failure
    /// is returned as an error.
    #[instrument(skip_all, fields(action = %request.action, request_id = ?request.request_id))]
    pub async fn handle(&self, request: RequestRecord) -> Result<Option<ResultRecord>, WorkerError> {
        let RequestRecord {
            request_id,
            action,
            payload,
        } = request;

        match &request_id {
            None if !action.is_batch() => {
                return Err(WorkerError::MissingRequestId(action.to_string()));
            }
            // Nothing may change if the result could not be recorded afterwards
            Some(id) => {
                keys::result(id).map_err(|e| WorkerError::InvalidRequestId {
                    request_id: id.to_string(),
                    source: e,
                })?;
            }
            None => {}
        }

        let outcome = self.run(action, &payload).await;

        let Some(request_id) = request_id else {
            let output = outcome?;
            info!(output = ?output, "Finished unrecorded run");
            return Ok(None);
        };

        let record = match outcome {
            Ok(output) => ResultRecord::success(request_id, &output),
            Err(e) => {
                warn!(error = %e, "Action failed");
                ResultRecord::failure(request_id, e.to_string())
            }
        };

        self.results
            .put(&record)
            .await
            .map_err(|e| WorkerError::ResultWriteFailed {
                request_id: record.request_id.to_string(),
                source: e,
            })?;

        info!(success = record.success, "Result recorded");
        Ok(Some(record))
    }

    async fn run(&self, action: Action, payload: &Value) -> Result<ActionOutput, HandlerError> {
        match action {
            Action::Search => self
                .search(payload::decode(action, payload)?)
                .await
                .map(ActionOutput::Search),
            Action::Subscribe => self
                .subscribe(payload::decode(action, payload)?)
                .await
                .map(ActionOutput::Subscribe),
            Action::Unsubscribe => self
                .unsubscribe(payload::decode(action, payload)?)
                .await
                .map(ActionOutput::Unsubscribe),
            Action::Download => self
                .download(payload::decode(action, payload)?)
                .await
                .map(ActionOutput::Download),
            Action::UpdateTop => self
                .update_top(payload::decode(action, payload)?)
                .await
                .map(ActionOutput::UpdateTop),
            Action::UpdateFeeds => {
                let _: UpdateFeedsPayload = payload::decode(action, payload)?;
                self.update_feeds().await.map(ActionOutput::UpdateFeeds)
            }
        }
    }

    async fn search(&self, payload: SearchPayload) -> Result<SearchOutput, HandlerError> {
        let results = self.directory.search(&payload.query, payload.limit).await?;
        debug!(query = %payload.query, hits = results.len(), "Search finished");
        Ok(SearchOutput {
            query: payload.query,
            results,
        })
    }

    async fn subscribe(&self, payload: SubscribePayload) -> Result<SubscribeOutput, HandlerError> {
        let feed_url = payload.feed_url.trim().to_string();
        if !is_url(&feed_url) {
            return Err(HandlerError::UnsupportedFeedUrl(feed_url));
        }

        let podcast_id = payload
            .podcast_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| derive_podcast_id(&feed_url));

        let existing = match self.registry.get(&podcast_id).await {
            Ok(subscription) => Some(subscription),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };
        let prior = self.ledger.episodes_or_empty(&podcast_id).await?;

        let overrides = SyncOverrides {
            title: payload.podcast_title,
        };
        let outcome = sync_feed(
            self.client.as_ref(),
            self.extractor.as_ref(),
            &podcast_id,
            &feed_url,
            prior,
            &overrides,
        )
        .await?;

        persist_sync(&self.ledger, &outcome).await?;
        let subscription = subscription_from(&outcome, &feed_url, existing.as_ref());
        let title = subscription.title.clone();
        self.registry.put(subscription).await?;

        info!(podcast_id = %podcast_id, new = outcome.new_count, "Subscribed");
        Ok(SubscribeOutput {
            podcast_id,
            title,
            episode_count: outcome.episodes.len(),
            new_episodes: outcome.new_count,
        })
    }

    /// Removes the subscription only; the episode list and snapshot stay so a
    /// later re-subscribe continues where this one left off.
    async fn unsubscribe(
        &self,
        payload: UnsubscribePayload,
    ) -> Result<UnsubscribeOutput, HandlerError> {
        let removed = self
            .registry
            .remove(&payload.podcast_id)
            .await?
            .ok_or_else(|| HandlerError::NotSubscribed {
                podcast_id: payload.podcast_id.clone(),
            })?;

        info!(podcast_id = %removed.id, "Unsubscribed");
        Ok(UnsubscribeOutput {
            podcast_id: removed.id,
            title: removed.title,
            episode_count: removed.episode_count,
        })
    }

    async fn download(&self, payload: DownloadPayload) -> Result<DownloadOutput, HandlerError> {
        let mime_type = self
            .recorded_mime_type(&payload.podcast_id, &payload.episode_id)
            .await;

        let stored = download_episode(
            self.client.as_ref(),
            self.content_host.as_ref(),
            MediaRequest {
                podcast_id: &payload.podcast_id,
                episode_id: &payload.episode_id,
                url: &payload.episode_url,
                mime_type: mime_type.as_deref(),
            },
        )
        .await?;

        Ok(DownloadOutput {
            podcast_id: payload.podcast_id,
            episode_id: payload.episode_id,
            size: stored.size,
            storage: stored.storage,
            content_hash: stored.content_hash,
        })
    }

    /// The enclosure type recorded for an episode, used to pick a file
    /// extension. A download does not depend on the ledger being readable.
    async fn recorded_mime_type(&self, podcast_id: &str, episode_id: &str) -> Option<String> {
        match self.ledger.episodes_or_empty(podcast_id).await {
            Ok(episodes) => episodes
                .into_iter()
                .find(|episode| episode.id == episode_id)
                .map(|episode| episode.mime_type)
                .filter(|mime| !mime.is_empty()),
            Err(e) => {
                debug!(podcast_id, error = %e, "Episode list unreadable, guessing media type");
                None
            }
        }
    }

    async fn update_top(&self, payload: UpdateTopPayload) -> Result<UpdateTopOutput, HandlerError> {
        let country = payload.country.trim().to_lowercase();
        let limit = payload.limit.unwrap_or(self.options.top_limit);

        let mut podcasts = self.directory.top(&country, limit).await?;
        let new_lookups = self.resolve_feeds(&mut podcasts).await?;
        self.lookups.put_all(&new_lookups).await?;

        let chart = TopChart {
            country: country.clone(),
            updated: Utc::now(),
            podcasts,
        };
        self.charts.put(&chart).await?;

        let resolved = chart
            .podcasts
            .iter()
            .filter(|entry| entry.feed_url.is_some())
            .count();
        info!(country = %country, count = chart.podcasts.len(), resolved, "Top chart updated");
        Ok(UpdateTopOutput {
            country,
            count: chart.podcasts.len(),
            resolved,
        })
    }

    /// Fill in feed URLs of chart rows that lack one, from recorded lookups
    /// first and the directory otherwise. Returns the lookups that are new.
    ///
    /// A row that cannot be resolved keeps no feed URL; that does not fail
    /// the chart.
    async fn resolve_feeds(&self, entries: &mut [DirectoryEntry]) -> Result<Vec<Lookup>, HandlerError> {
        let known = self.lookups.all().await?;
        let mut resolved = Vec::new();

        for entry in entries.iter_mut().filter(|entry| entry.feed_url.is_none()) {
            if let Some(lookup) = known.get(&entry.id) {
                entry.feed_url = Some(lookup.feed_url.clone());
                continue;
            }

            match self.directory.lookup(&entry.id).await {
                Ok(Some(found)) => {
                    if let Some(lookup) = Lookup::from_entry(found, Utc::now()) {
                        entry.feed_url = Some(lookup.feed_url.clone());
                        resolved.push(lookup);
                    }
                }
                Ok(None) => debug!(itunes_id = %entry.id, "Directory knows no feed"),
                Err(e) => warn!(itunes_id = %entry.id, error = %e, "Lookup failed"),
            }
        }

        Ok(resolved)
    }

    /// Refresh one subscription against its recorded episode list
    async fn refresh_subscription(&self, subscription: &Subscription) -> Result<usize, HandlerError> {
        let prior = self.ledger.episodes_or_empty(&subscription.id).await?;
        let outcome = sync_feed(
            self.client.as_ref(),
            self.extractor.as_ref(),
            &subscription.id,
            &subscription.feed_url,
            prior,
            &SyncOverrides::default(),
        )
        .await?;

        persist_sync(&self.ledger, &outcome).await?;
        let still_subscribed = self
            .registry
            .update(subscription_from(
                &outcome,
                &subscription.feed_url,
                Some(subscription),
            ))
            .await?;
        if !still_subscribed {
            debug!(podcast_id = %subscription.id, "Unsubscribed during refresh, not re-adding");
        }
        Ok(outcome.new_count)
    }
}

/// Build the subscription record after a successful sync.
///
/// `subscribedAt` survives from an earlier record; everything else is taken
/// from this sync. An empty feed title falls back to the earlier title, then
/// to the feed URL.
fn subscription_from(
    outcome: &SyncOutcome,
    feed_url: &str,
    existing: Option<&Subscription>,
) -> Subscription {
    let channel = outcome.channel();
    let last_updated = outcome.snapshot.last_updated;
    let title = Some(channel.title.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| existing.map(|s| s.title.clone()))
        .unwrap_or_else(|| feed_url.to_string());

    Subscription {
        id: outcome.snapshot.podcast_id.clone(),
        title,
        author: channel.author.clone(),
        feed_url: feed_url.to_string(),
        image_url: channel.image_url.clone(),
        description: channel.description.clone(),
        episode_count: outcome.episodes.len(),
        last_updated,
        subscribed_at: existing.map_or(last_updated, |s| s.subscribed_at),
    }
}

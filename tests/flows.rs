//! End-to-end flows through the public API: a client dispatches, an in-process
//! worker handles the request against a shared store, the client polls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tempfile::TempDir;

use podrelay::error::{DirectoryError, DispatchError};
use podrelay::store::{ChartStore, EpisodeLedger, LookupStore, SubscriptionRegistry};
use podrelay::{
    Action, Client, Collaborators, DirectoryEntry, FsContentHost, HttpClient, HttpResponse,
    MemoryStore, PodcastDirectory, PollOptions, RequestId, RequestRecord, RssExtractor,
    SharedBlobStore, Trigger, Worker, WorkerOptions, derive_podcast_id,
};

const FEED_URL: &str = "https://example.com/feed.xml";

/// Serves configured bodies by URL, 404 for everything else
#[derive(Default)]
struct MockHttpClient {
    bodies: Mutex<HashMap<String, String>>,
}

impl MockHttpClient {
    fn serve(&self, url: &str, body: &str) {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        Ok(match self.bodies.lock().unwrap().get(url) {
            Some(body) => HttpResponse::buffered(200, body.clone()),
            None => HttpResponse::buffered(404, "not found"),
        })
    }
}

/// One chart row whose feed is only known through a lookup
struct ChartDirectory;

#[async_trait]
impl PodcastDirectory for ChartDirectory {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        Ok(Vec::new())
    }

    async fn top(&self, _country: &str, _limit: usize) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        Ok(vec![chart_row(None)])
    }

    async fn lookup(&self, id: &str) -> Result<Option<DirectoryEntry>, DirectoryError> {
        Ok((id == "42").then(|| chart_row(Some(FEED_URL.to_string()))))
    }
}

fn chart_row(feed_url: Option<String>) -> DirectoryEntry {
    DirectoryEntry {
        id: "42".to_string(),
        title: "Show".to_string(),
        author: "Host".to_string(),
        feed_url,
        image_url: None,
        genre: None,
    }
}

/// Runs the worker as soon as a request is dispatched, the way a CI job
/// would, just without the delay
struct InlineTrigger {
    worker: Worker,
}

#[async_trait]
impl Trigger for InlineTrigger {
    async fn trigger(
        &self,
        action: Action,
        mut payload: Map<String, Value>,
        request_id: &RequestId,
    ) -> Result<(), DispatchError> {
        payload.insert("request_id".to_string(), json!(request_id.as_str()));
        let event = json!({"event_type": action.as_str(), "client_payload": payload});
        let request = RequestRecord::from_dispatch_event(event.to_string().as_bytes())
            .expect("event decodes");
        self.worker.handle(request).await.expect("worker records a result");
        Ok(())
    }
}

fn feed_with(title: &str, guids: &[&str]) -> String {
    let items: String = guids
        .iter()
        .map(|guid| {
            format!(
                r#"<item><title>{guid}</title><guid>{guid}</guid><enclosure url="https://example.com/{guid}.mp3" type="audio/mpeg" length="100"/></item>"#
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>{title}</title><link>https://example.com</link><description>About</description>{items}</channel></rss>"#
    )
}

struct System {
    client: Client,
    http: Arc<MockHttpClient>,
    store: SharedBlobStore,
    _media: TempDir,
}

fn system() -> System {
    let http = Arc::new(MockHttpClient::default());
    let store: SharedBlobStore = Arc::new(MemoryStore::new());
    let media = tempfile::tempdir().unwrap();

    let worker = Worker::new(
        Collaborators {
            client: http.clone(),
            extractor: Arc::new(RssExtractor),
            directory: Arc::new(ChartDirectory),
            content_host: Arc::new(FsContentHost::new(media.path())),
            store: store.clone(),
        },
        WorkerOptions {
            feed_delay: Duration::ZERO,
            top_limit: 10,
        },
    );
    let client = Client::new(
        Arc::new(InlineTrigger { worker }),
        store.clone(),
        PollOptions {
            max_attempts: 3,
            interval: Duration::from_secs(2),
        },
    );

    System {
        client,
        http,
        store,
        _media: media,
    }
}

#[tokio::test(start_paused = true)]
async fn subscribe_then_refresh_prepends_new_episode() {
    let sys = system();
    sys.http.serve(FEED_URL, &feed_with("Show", &["g1", "g2", "g3"]));

    let subscribed = sys
        .client
        .request(Action::Subscribe, json!({"feed_url": FEED_URL}))
        .await
        .unwrap();
    assert!(subscribed.success, "{:?}", subscribed.error);
    assert_eq!(subscribed.field("newEpisodes"), Some(&json!(3)));

    sys.http.serve(FEED_URL, &feed_with("Show", &["g0", "g1", "g2", "g3"]));
    let refreshed = sys.client.request(Action::UpdateFeeds, Value::Null).await.unwrap();

    assert_eq!(refreshed.field("updated"), Some(&json!(1)));
    assert_eq!(refreshed.field("failed"), Some(&json!(0)));
    assert_eq!(refreshed.field("newEpisodes"), Some(&json!(1)));

    let podcast_id = derive_podcast_id(FEED_URL);
    let episodes = EpisodeLedger::new(sys.store.clone())
        .episodes(&podcast_id)
        .await
        .unwrap();
    let ids: Vec<&str> = episodes.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["g0", "g1", "g2", "g3"]);
    assert!(episodes[0].is_new);
    assert!(episodes[1..].iter().all(|e| !e.is_new));

    let subscription = SubscriptionRegistry::new(sys.store.clone())
        .get(&podcast_id)
        .await
        .unwrap();
    assert_eq!(subscription.episode_count, 4);
}

#[tokio::test(start_paused = true)]
async fn repeated_refresh_is_idempotent() {
    let sys = system();
    sys.http.serve(FEED_URL, &feed_with("Show", &["g1", "g2"]));
    sys.client
        .request(Action::Subscribe, json!({"feed_url": FEED_URL}))
        .await
        .unwrap();

    let ledger = EpisodeLedger::new(sys.store.clone());
    let podcast_id = derive_podcast_id(FEED_URL);

    sys.client.request(Action::UpdateFeeds, Value::Null).await.unwrap();
    let after_first = ledger.episodes(&podcast_id).await.unwrap();
    let second = sys.client.request(Action::UpdateFeeds, Value::Null).await.unwrap();
    let after_second = ledger.episodes(&podcast_id).await.unwrap();

    assert_eq!(second.field("newEpisodes"), Some(&json!(0)));
    assert_eq!(after_first, after_second);
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_then_resubscribe_keeps_history() {
    let sys = system();
    sys.http.serve(FEED_URL, &feed_with("Show", &["g1", "g2"]));

    sys.client
        .request(Action::Subscribe, json!({"feed_url": FEED_URL}))
        .await
        .unwrap();
    let registry = SubscriptionRegistry::new(sys.store.clone());
    let podcast_id = derive_podcast_id(FEED_URL);
    let first = registry.get(&podcast_id).await.unwrap();

    let unsubscribed = sys
        .client
        .request(Action::Unsubscribe, json!({"podcast_id": podcast_id}))
        .await
        .unwrap();
    assert!(unsubscribed.success);
    assert_eq!(unsubscribed.field("episodeCount"), Some(&json!(2)));
    assert!(!registry.exists(&podcast_id).await.unwrap());

    let ledger = EpisodeLedger::new(sys.store.clone());
    assert_eq!(ledger.episodes(&podcast_id).await.unwrap().len(), 2);
    assert!(ledger.snapshot(&podcast_id).await.is_ok());

    // The feed moved on while nobody was subscribed
    sys.http.serve(FEED_URL, &feed_with("Show", &["g3", "g1", "g2"]));

    let resubscribed = sys
        .client
        .request(Action::Subscribe, json!({"feed_url": FEED_URL}))
        .await
        .unwrap();
    assert_eq!(resubscribed.field("podcastId"), Some(&json!(podcast_id)));
    assert_eq!(resubscribed.field("newEpisodes"), Some(&json!(1)));
    assert_eq!(resubscribed.field("episodeCount"), Some(&json!(3)));

    let second = registry.get(&podcast_id).await.unwrap();
    assert_eq!(second.episode_count, 3);
    assert!(second.subscribed_at >= first.subscribed_at);
    let ids: Vec<String> = ledger
        .episodes(&podcast_id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec!["g3", "g1", "g2"]);
}

#[tokio::test(start_paused = true)]
async fn resubscribe_while_subscribed_preserves_subscribed_at() {
    let sys = system();
    sys.http.serve(FEED_URL, &feed_with("Show", &["g1"]));
    let registry = SubscriptionRegistry::new(sys.store.clone());
    let podcast_id = derive_podcast_id(FEED_URL);

    sys.client
        .request(Action::Subscribe, json!({"feed_url": FEED_URL}))
        .await
        .unwrap();
    let first = registry.get(&podcast_id).await.unwrap();

    sys.client
        .request(Action::Subscribe, json!({"feed_url": FEED_URL}))
        .await
        .unwrap();
    let second = registry.get(&podcast_id).await.unwrap();

    assert_eq!(second.subscribed_at, first.subscribed_at);
    assert_eq!(registry.list().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn every_failure_path_records_a_failure_result() {
    let sys = system();

    let cases = [
        (Action::Search, json!({})),
        (Action::Subscribe, json!({"feed_url": "ftp://example.com/feed"})),
        (Action::Subscribe, json!({"feed_url": "https://example.com/missing.xml"})),
        (Action::Unsubscribe, json!({"podcast_id": "unknown"})),
        (
            Action::Download,
            json!({"episode_url": "https://example.com/gone.mp3", "episode_id": "g1", "podcast_id": "p1"}),
        ),
    ];

    for (action, payload) in cases {
        let record = sys.client.request(action, payload.clone()).await.unwrap();
        assert!(!record.success, "{action} with {payload} should fail");
        assert!(record.error.is_some());
    }
}

#[tokio::test(start_paused = true)]
async fn download_reports_stored_media() {
    let sys = system();
    sys.http.serve("https://example.com/g1.mp3", "0123456789");

    let record = sys
        .client
        .request(
            Action::Download,
            json!({"episode_url": "https://example.com/g1.mp3", "episode_id": "g1", "podcast_id": "p1"}),
        )
        .await
        .unwrap();

    assert!(record.success, "{:?}", record.error);
    assert_eq!(record.field("size"), Some(&json!(10)));
    assert_eq!(record.field("podcastId"), Some(&json!("p1")));
}

#[tokio::test(start_paused = true)]
async fn chart_row_can_be_subscribed_after_update_top() {
    let sys = system();
    sys.http.serve(FEED_URL, &feed_with("Show", &["g1"]));

    let updated = sys
        .client
        .request(Action::UpdateTop, json!({"country": "us"}))
        .await
        .unwrap();
    assert_eq!(updated.field("resolved"), Some(&json!(1)));

    let chart = ChartStore::new(sys.store.clone()).get("us").await.unwrap();
    let feed_url = chart.podcasts[0].feed_url.clone().unwrap();
    assert_eq!(
        LookupStore::new(sys.store.clone()).get("42").await.unwrap().feed_url,
        feed_url
    );

    let subscribed = sys
        .client
        .request(Action::Subscribe, json!({"feed_url": feed_url}))
        .await
        .unwrap();
    assert!(subscribed.success, "{:?}", subscribed.error);
    assert_eq!(subscribed.field("podcastId"), Some(&json!(derive_podcast_id(FEED_URL))));
}

//! Podcast directory queries: keyword search, per-country top charts, and
//! resolving a directory id to its feed.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{DirectoryError, FetchError};
use crate::http::{HttpClient, fetch_bytes};
use crate::model::DirectoryEntry;

const SEARCH_URL: &str = "https://itunes.apple.com/search";
const LOOKUP_URL: &str = "https://itunes.apple.com/lookup";
const TOP_CHART_BASE: &str = "https://rss.applemarketingtools.com/api/v2";

/// Source of search results and top charts
#[async_trait]
pub trait PodcastDirectory: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<DirectoryEntry>, DirectoryError>;

    async fn top(&self, country: &str, limit: usize) -> Result<Vec<DirectoryEntry>, DirectoryError>;

    /// Resolve a directory id; `Ok(None)` when the directory knows no feed for it
    async fn lookup(&self, id: &str) -> Result<Option<DirectoryEntry>, DirectoryError>;
}

/// Directory backed by the public iTunes Search API and Apple's chart feeds
#[derive(Clone)]
pub struct ItunesDirectory {
    client: Arc<dyn HttpClient>,
}

impl ItunesDirectory {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, DirectoryError> {
        let bytes = fetch_bytes(self.client.as_ref(), url.as_str()).await?;
        serde_json::from_slice(&bytes).map_err(|e| DirectoryError::JsonParseFailed {
            url: url.to_string(),
            source: e,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    collection_id: Option<u64>,
    collection_name: Option<String>,
    artist_name: Option<String>,
    feed_url: Option<String>,
    artwork_url600: Option<String>,
    artwork_url100: Option<String>,
    primary_genre_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    feed: ChartFeed,
}

#[derive(Debug, Deserialize)]
struct ChartFeed {
    #[serde(default)]
    results: Vec<ChartResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartResult {
    id: String,
    name: String,
    artist_name: Option<String>,
    artwork_url100: Option<String>,
    #[serde(default)]
    genres: Vec<ChartGenre>,
}

#[derive(Debug, Deserialize)]
struct ChartGenre {
    name: String,
}

impl From<ChartResult> for DirectoryEntry {
    fn from(result: ChartResult) -> Self {
        DirectoryEntry {
            id: result.id,
            title: result.name,
            author: result.artist_name.unwrap_or_default(),
            feed_url: None,
            image_url: result.artwork_url100,
            genre: result.genres.into_iter().next().map(|g| g.name),
        }
    }
}

/// Search hits without a collection id or name cannot be subscribed to
fn search_entry(result: SearchResult) -> Option<DirectoryEntry> {
    Some(DirectoryEntry {
        id: result.collection_id?.to_string(),
        title: result.collection_name?,
        author: result.artist_name.unwrap_or_default(),
        feed_url: result.feed_url,
        image_url: result.artwork_url600.or(result.artwork_url100),
        genre: result.primary_genre_name,
    })
}

fn invalid_url(url: &str, source: url::ParseError) -> DirectoryError {
    DirectoryError::Fetch(FetchError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}

#[async_trait]
impl PodcastDirectory for ItunesDirectory {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let limit_param = limit.to_string();
        let url = Url::parse_with_params(
            SEARCH_URL,
            &[
                ("term", query),
                ("media", "podcast"),
                ("entity", "podcast"),
                ("limit", limit_param.as_str()),
            ],
        )
        .map_err(|e| invalid_url(SEARCH_URL, e))?;

        let response: SearchResponse = self.get_json(&url).await?;
        Ok(response
            .results
            .into_iter()
            .filter_map(search_entry)
            .take(limit)
            .collect())
    }

    async fn top(&self, country: &str, limit: usize) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let raw = format!("{TOP_CHART_BASE}/{country}/podcasts/top/{limit}/podcasts.json");
        let url = Url::parse(&raw).map_err(|e| invalid_url(&raw, e))?;

        let response: ChartResponse = self.get_json(&url).await?;
        Ok(response
            .feed
            .results
            .into_iter()
            .map(DirectoryEntry::from)
            .take(limit)
            .collect())
    }

    async fn lookup(&self, id: &str) -> Result<Option<DirectoryEntry>, DirectoryError> {
        let url = Url::parse_with_params(LOOKUP_URL, &[("id", id), ("entity", "podcast")])
            .map_err(|e| invalid_url(LOOKUP_URL, e))?;

        let response: SearchResponse = self.get_json(&url).await?;
        Ok(response
            .results
            .into_iter()
            .filter_map(search_entry)
            .find(|entry| entry.feed_url.is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;
    use std::sync::Mutex;

    struct CannedClient {
        body: &'static str,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpClient for CannedClient {
        async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
            self.requested.lock().unwrap().push(url.to_string());
            Ok(HttpResponse::buffered(200, self.body))
        }
    }

    fn directory(body: &'static str) -> (ItunesDirectory, Arc<CannedClient>) {
        let client = Arc::new(CannedClient {
            body,
            requested: Mutex::new(Vec::new()),
        });
        (ItunesDirectory::new(client.clone()), client)
    }

    #[tokio::test]
    async fn search_maps_results_and_skips_incomplete_hits() {
        let (directory, client) = directory(
            r#"{"resultCount": 2, "results": [
                {"collectionId": 42, "collectionName": "Rust Radio", "artistName": "Ferris",
                 "feedUrl": "https://example.com/rust.xml", "artworkUrl600": "https://example.com/600.jpg",
                 "primaryGenreName": "Technology"},
                {"artistName": "Nameless"}
            ]}"#,
        );

        let hits = directory.search("rust lang", 25).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "42");
        assert_eq!(hits[0].title, "Rust Radio");
        assert_eq!(hits[0].feed_url.as_deref(), Some("https://example.com/rust.xml"));
        assert_eq!(hits[0].genre.as_deref(), Some("Technology"));

        let requested = client.requested.lock().unwrap()[0].clone();
        assert!(requested.starts_with(SEARCH_URL));
        assert!(requested.contains("term=rust+lang"));
        assert!(requested.contains("limit=25"));
    }

    #[tokio::test]
    async fn top_maps_chart_rows() {
        let (directory, client) = directory(
            r#"{"feed": {"results": [
                {"id": "7", "name": "Daily", "artistName": "News Co", "artworkUrl100": "https://example.com/100.jpg",
                 "genres": [{"genreId": "1", "name": "News"}]}
            ]}}"#,
        );

        let chart = directory.top("de", 10).await.unwrap();

        assert_eq!(chart.len(), 1);
        assert_eq!(chart[0].title, "Daily");
        assert_eq!(chart[0].genre.as_deref(), Some("News"));
        assert!(chart[0].feed_url.is_none());
        assert!(client.requested.lock().unwrap()[0].contains("/de/podcasts/top/10/"));
    }

    #[tokio::test]
    async fn lookup_resolves_feed_url() {
        let (directory, client) = directory(
            r#"{"resultCount": 1, "results": [
                {"collectionId": 7, "collectionName": "Daily", "artistName": "News Co",
                 "feedUrl": "https://example.com/daily.xml"}
            ]}"#,
        );

        let entry = directory.lookup("7").await.unwrap().unwrap();

        assert_eq!(entry.id, "7");
        assert_eq!(entry.feed_url.as_deref(), Some("https://example.com/daily.xml"));
        let requested = client.requested.lock().unwrap()[0].clone();
        assert!(requested.starts_with(LOOKUP_URL));
        assert!(requested.contains("id=7"));
    }

    #[tokio::test]
    async fn lookup_without_feed_is_none() {
        let (private, _) = directory(
            r#"{"resultCount": 1, "results": [{"collectionId": 7, "collectionName": "Private"}]}"#,
        );
        let (unknown, _) = directory(r#"{"resultCount": 0, "results": []}"#);

        assert!(private.lookup("7").await.unwrap().is_none());
        assert!(unknown.lookup("8").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_response_is_reported() {
        let (directory, _) = directory("<html>rate limited</html>");
        assert!(matches!(
            directory.search("x", 5).await,
            Err(DirectoryError::JsonParseFailed { .. })
        ));
    }
}

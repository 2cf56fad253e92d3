use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::WorkerError;

/// Number of hex characters kept from the feed URL hash in a derived podcast id
const PODCAST_ID_LENGTH: usize = 12;

/// The kinds of work a worker can be asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Search,
    Subscribe,
    Unsubscribe,
    Download,
    UpdateTop,
    UpdateFeeds,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Search,
        Action::Subscribe,
        Action::Unsubscribe,
        Action::Download,
        Action::UpdateTop,
        Action::UpdateFeeds,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Search => "search",
            Action::Subscribe => "subscribe",
            Action::Unsubscribe => "unsubscribe",
            Action::Download => "download",
            Action::UpdateTop => "update-top",
            Action::UpdateFeeds => "update-feeds",
        }
    }

    /// Batch actions can run from a schedule without anyone waiting on them
    pub fn is_batch(&self) -> bool {
        matches!(self, Action::UpdateTop | Action::UpdateFeeds)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| WorkerError::UnknownAction(s.to_string()))
    }
}

/// Client-chosen token correlating a dispatched action with its result
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id: eight random hex characters plus the current unix
    /// time in milliseconds.
    ///
    /// Uniqueness is assumed, not checked.
    pub fn generate() -> Self {
        let random = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", &random[..8], Utc::now().timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of work handed to a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    pub action: Action,
    #[serde(default)]
    pub payload: Value,
}

/// Shape of a `repository_dispatch` event as delivered to the worker
#[derive(Debug, Deserialize)]
struct DispatchEvent {
    #[serde(alias = "event_type")]
    action: String,
    #[serde(default)]
    client_payload: Map<String, Value>,
}

impl RequestRecord {
    pub fn new(request_id: Option<RequestId>, action: Action, payload: Value) -> Self {
        Self {
            request_id,
            action,
            payload,
        }
    }

    /// Decode a dispatch event document.
    ///
    /// The request id travels inside the client payload as `request_id`.
    pub fn from_dispatch_event(json: &[u8]) -> Result<Self, WorkerError> {
        let mut event: DispatchEvent =
            serde_json::from_slice(json).map_err(WorkerError::InvalidEvent)?;
        let action: Action = event.action.parse()?;
        let request_id = match event.client_payload.remove("request_id") {
            Some(Value::String(id)) if !id.is_empty() => Some(RequestId::new(id)),
            _ => None,
        };

        Ok(Self {
            request_id,
            action,
            payload: Value::Object(event.client_payload),
        })
    }
}

/// The one terminal record a worker writes per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub success: bool,
    pub request_id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Action-specific fields of a successful result
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl ResultRecord {
    /// Build a success record from any serializable action output
    pub fn success(request_id: RequestId, output: &impl Serialize) -> Self {
        let fields = match serde_json::to_value(output) {
            Ok(Value::Object(map)) => map,
            Ok(Value::Null) => Map::new(),
            Ok(other) => Map::from_iter([("result".to_string(), other)]),
            Err(e) => return Self::failure(request_id, format!("Failed to encode result: {e}")),
        };

        Self {
            success: true,
            request_id,
            error: None,
            fields,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(request_id: RequestId, error: impl Into<String>) -> Self {
        Self {
            success: false,
            request_id,
            error: Some(error.into()),
            fields: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Look up an action-specific field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// A subscribed podcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    pub feed_url: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub description: String,
    pub episode_count: usize,
    pub last_updated: DateTime<Utc>,
    pub subscribed_at: DateTime<Utc>,
}

/// Derive the podcast id used when a subscriber does not supply one
pub fn derive_podcast_id(feed_url: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(feed_url.as_bytes()));
    digest[..PODCAST_ID_LENGTH].to_string()
}

/// One episode as recorded in a podcast's episode list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(rename = "type", default)]
    pub mime_type: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub podcast_id: String,
    #[serde(default)]
    pub is_new: bool,
}

impl Episode {
    /// Deduplication key: the guid when present, else the enclosure URL.
    ///
    /// A feed that later adds a guid to a guid-less item changes the key and
    /// the item is recorded a second time.
    pub fn identity(&self) -> &str {
        self.guid.as_deref().unwrap_or(&self.url)
    }
}

/// Channel-level metadata of a feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub description: String,
}

/// Channel state captured by the latest successful refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub podcast_id: String,
    pub channel: ChannelSummary,
    pub episode_count: usize,
    pub last_updated: DateTime<Utc>,
}

/// One row of a search result or top chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
}

/// Published top chart for one country
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopChart {
    pub country: String,
    pub updated: DateTime<Utc>,
    pub podcasts: Vec<DirectoryEntry>,
}

/// What an iTunes id resolved to; lets a top-chart row be subscribed to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lookup {
    pub itunes_id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    pub feed_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    pub resolved_at: DateTime<Utc>,
}

impl Lookup {
    /// `None` when the entry carries no feed URL
    pub fn from_entry(entry: DirectoryEntry, resolved_at: DateTime<Utc>) -> Option<Self> {
        Some(Self {
            feed_url: entry.feed_url?,
            itunes_id: entry.id,
            title: entry.title,
            author: entry.author,
            image_url: entry.image_url,
            genre: entry.genre,
            resolved_at,
        })
    }
}

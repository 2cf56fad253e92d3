use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when fetching a remote resource
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed for {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Too many redirects fetching {url} (limit {limit})")]
    TooManyRedirects { url: String, limit: usize },

    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Stream error while reading {url}: {source}")]
    Stream {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Errors that can occur when fetching or extracting RSS feeds
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to parse RSS feed: {0}")]
    ParseFailed(#[from] rss::Error),
}

/// Errors raised by the durable blob stores and the typed stores on top of them
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No record stored at {key}")]
    NotFound { key: String },

    #[error("Store unavailable while accessing {key}: {reason}")]
    Unavailable { key: String, reason: String },

    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON stored at {key}: {source}")]
    JsonParseFailed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize record: {0}")]
    JsonSerializeFailed(#[from] serde_json::Error),

    #[error("Store is read-only, refusing to write {key}")]
    ReadOnly { key: String },

    #[error("Invalid store key: {0}")]
    InvalidKey(String),
}

impl StoreError {
    /// Whether this error is the store's "not yet written" signal
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Errors from the podcast directory (search and top charts)
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Directory request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to parse directory response from {url}: {source}")]
    JsonParseFailed {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that can occur while storing downloaded media
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Download failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors a single action handler can fail with.
///
/// Every variant ends up as the `error` string of a failure result record.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Invalid payload for {action}: {source}")]
    InvalidPayload {
        action: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Feed URL must be an http(s) URL: {0}")]
    UnsupportedFeedUrl(String),

    #[error("Podcast {podcast_id} is not subscribed")]
    NotSubscribed { podcast_id: String },

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

/// Errors that escape a worker invocation
///
/// A handler failure is not one of these: it is recorded as a failure result.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Action '{0}' requires a request id")]
    MissingRequestId(String),

    #[error("Request id {request_id} cannot be recorded: {source}")]
    InvalidRequestId {
        request_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    #[error("Invalid dispatch event: {0}")]
    InvalidEvent(#[source] serde_json::Error),

    #[error("Failed to record result for request {request_id}: {source}")]
    ResultWriteFailed {
        request_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Action failed: {0}")]
    Handler(#[from] HandlerError),
}

/// Errors raised while handing a request to the trigger transport
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Dispatch token not configured")]
    MissingToken,

    #[error("Payload for {action} must be a JSON object")]
    PayloadNotObject { action: String },

    #[error("Dispatch transport failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Dispatch rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Failed to encode dispatch body: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Non-result outcomes of polling for a request
#[derive(Error, Debug)]
pub enum PollError {
    #[error("Timed out waiting for request {request_id} after {attempts} attempts")]
    Timeout { request_id: String, attempts: u32 },

    #[error("Stopped waiting for request {request_id} after {attempts} attempts")]
    Cancelled { request_id: String, attempts: u32 },

    #[error("Request id {request_id} can never have a result: {source}")]
    InvalidRequestId {
        request_id: String,
        #[source]
        source: StoreError,
    },
}

/// Errors from the combined dispatch-then-poll client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Poll(#[from] PollError),
}

/// Errors loading configuration from the environment
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod feed;
pub mod http;
pub mod media;
pub mod model;
pub mod progress;
pub mod store;
pub mod sync;
pub mod worker;

// Re-export main types for convenience
pub use client::{Client, Dispatcher, GitHubDispatchTrigger, PollOptions, PollState, Poller, Trigger};
pub use config::{ClientConfig, WorkerConfig};
pub use directory::{ItunesDirectory, PodcastDirectory};
pub use error::{
    ClientError, ConfigError, DirectoryError, DispatchError, FeedError, FetchError, HandlerError,
    MediaError, PollError, StoreError, WorkerError,
};
pub use feed::{FeedExtractor, RssExtractor, fetch_feed, is_url, parse_feed};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use media::{ContentHost, FsContentHost, StoredMedia};
pub use model::{
    Action, ChannelSummary, DirectoryEntry, Episode, FeedSnapshot, Lookup, RequestId,
    RequestRecord, ResultRecord, Subscription, TopChart, derive_podcast_id,
};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use store::{BlobStore, FsStore, HttpStore, MemoryStore, SharedBlobStore};
pub use sync::{SyncOutcome, SyncOverrides, merge_episodes, persist_sync, sync_feed};
pub use worker::{Collaborators, Worker, WorkerOptions};

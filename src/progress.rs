use std::sync::Arc;

/// Events emitted while dispatching, polling, and refreshing feeds
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A request was accepted by the trigger transport
    Dispatched { request_id: String, action: String },

    /// The result store is about to be read for a request
    PollAttempt {
        request_id: String,
        /// 1-based attempt number
        attempt: u32,
        max_attempts: u32,
    },

    /// A result record was found
    ResultReceived {
        request_id: String,
        success: bool,
        attempts: u32,
    },

    /// Polling gave up; the request may still complete later
    PollTimedOut { request_id: String, attempts: u32 },

    /// A subscription is about to be refreshed in a batch run
    FeedRefreshStarting {
        podcast_id: String,
        title: String,
        /// Index of this subscription in the batch
        index: usize,
        total: usize,
    },

    /// A subscription was refreshed successfully
    FeedRefreshed {
        podcast_id: String,
        title: String,
        new_episodes: usize,
    },

    /// A subscription could not be refreshed; the batch continues
    FeedRefreshFailed {
        podcast_id: String,
        title: String,
        error: String,
    },

    /// A batch refresh finished
    RefreshCompleted {
        updated: usize,
        failed: usize,
        new_episodes: usize,
    },
}

/// Trait for reporting progress events.
///
/// Implementations can use this to display spinners, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {
        // Intentionally empty
    }
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

/// Reporter that keeps every event, for asserting on what was reported
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: std::sync::Mutex<Vec<ProgressEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

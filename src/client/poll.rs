use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::PollError;
use crate::model::{RequestId, ResultRecord};
use crate::progress::{NoopReporter, ProgressEvent, SharedProgressReporter};
use crate::store::{ResultStore, keys};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// How long to keep looking for a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Number of reads before giving up; at least one read always happens
    pub max_attempts: u32,
    /// Pause between two reads
    pub interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl PollOptions {
    /// Upper bound on time spent waiting, reads themselves not included
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts.max(1).saturating_sub(1)
    }
}

/// Where a poll stands after some number of reads
#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Pending { attempts: u32 },
    Succeeded(ResultRecord),
    Failed(ResultRecord),
    TimedOut { attempts: u32 },
}

impl PollState {
    pub fn start() -> Self {
        PollState::Pending { attempts: 0 }
    }

    /// Advance by one read.
    ///
    /// `observed` is the record found by that read, `None` when the read
    /// found nothing or could not be completed. Terminal states do not move.
    pub fn observe(self, observed: Option<ResultRecord>, max_attempts: u32) -> Self {
        let PollState::Pending { attempts } = self else {
            return self;
        };
        let attempts = attempts + 1;

        match observed {
            Some(record) if record.success => PollState::Succeeded(record),
            Some(record) => PollState::Failed(record),
            None if attempts >= max_attempts.max(1) => PollState::TimedOut { attempts },
            None => PollState::Pending { attempts },
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Pending { .. })
    }
}

/// Reads the result store until a request's record shows up
#[derive(Clone)]
pub struct Poller {
    results: ResultStore,
    options: PollOptions,
    reporter: SharedProgressReporter,
}

impl Poller {
    pub fn new(results: ResultStore, options: PollOptions) -> Self {
        Self {
            results,
            options,
            reporter: NoopReporter::shared(),
        }
    }

    pub fn with_reporter(mut self, reporter: SharedProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Wait for the result of `request_id`.
    ///
    /// A failure record is a result like any other and returned as `Ok`.
    pub async fn wait(&self, request_id: &RequestId) -> Result<ResultRecord, PollError> {
        self.wait_until(request_id, std::future::pending::<()>())
            .await
    }

    /// Like [`Poller::wait`], giving up with [`PollError::Cancelled`] as soon
    /// as `cancel` completes.
    ///
    /// Exactly `max_attempts` reads happen before a timeout, with `interval`
    /// between them and no pause after the last one. Read errors count as
    /// "not there yet". An id that no result could ever be stored under is
    /// refused before the first read.
    pub async fn wait_until<F>(
        &self,
        request_id: &RequestId,
        cancel: F,
    ) -> Result<ResultRecord, PollError>
    where
        F: Future<Output = ()>,
    {
        keys::result(request_id).map_err(|e| PollError::InvalidRequestId {
            request_id: request_id.to_string(),
            source: e,
        })?;

        let max_attempts = self.options.max_attempts.max(1);
        let mut cancel = std::pin::pin!(cancel);
        let mut state = PollState::start();
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.reporter.report(ProgressEvent::PollAttempt {
                request_id: request_id.to_string(),
                attempt,
                max_attempts,
            });

            let observed = tokio::select! {
                biased;
                _ = &mut cancel => return Err(self.cancelled(request_id, attempt - 1)),
                read = self.results.get(request_id) => match read {
                    Ok(record) => Some(record),
                    Err(e) => {
                        if !e.is_not_found() {
                            debug!(%request_id, attempt, error = %e, "Result read failed, retrying");
                        }
                        None
                    }
                },
            };

            state = match state.observe(observed, max_attempts) {
                PollState::Succeeded(record) | PollState::Failed(record) => {
                    self.reporter.report(ProgressEvent::ResultReceived {
                        request_id: request_id.to_string(),
                        success: record.success,
                        attempts: attempt,
                    });
                    return Ok(record);
                }
                PollState::TimedOut { attempts } => {
                    self.reporter.report(ProgressEvent::PollTimedOut {
                        request_id: request_id.to_string(),
                        attempts,
                    });
                    return Err(PollError::Timeout {
                        request_id: request_id.to_string(),
                        attempts,
                    });
                }
                pending => pending,
            };

            tokio::select! {
                biased;
                _ = &mut cancel => return Err(self.cancelled(request_id, attempt)),
                _ = tokio::time::sleep(self.options.interval) => {}
            }
        }
    }

    fn cancelled(&self, request_id: &RequestId, attempts: u32) -> PollError {
        debug!(%request_id, attempts, "Polling cancelled");
        PollError::Cancelled {
            request_id: request_id.to_string(),
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::progress::RecordingReporter;
    use crate::store::{BlobStore, MemoryStore, keys};
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    /// Result store that reveals its content only from the n-th read on and
    /// fails the reads listed in `failing`
    struct CountingStore {
        inner: MemoryStore,
        visible_from: u32,
        failing: Vec<u32>,
        reads: AtomicU32,
    }

    impl CountingStore {
        fn new(visible_from: u32) -> Self {
            Self {
                inner: MemoryStore::new(),
                visible_from,
                failing: Vec::new(),
                reads: AtomicU32::new(0),
            }
        }

        fn reads(&self) -> u32 {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BlobStore for CountingStore {
        async fn read(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
            let read = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing.contains(&read) {
                return Err(StoreError::Unavailable {
                    key: key.to_string(),
                    reason: "HTTP 503".to_string(),
                });
            }
            if read < self.visible_from {
                return Ok(None);
            }
            self.inner.read(key).await
        }

        async fn write(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
            self.inner.write(key, data).await
        }
    }

    async fn store_with(record: &ResultRecord, visible_from: u32) -> Arc<CountingStore> {
        let store = Arc::new(CountingStore::new(visible_from));
        let key = keys::result(&record.request_id).unwrap();
        store
            .inner
            .write(&key, Bytes::from(serde_json::to_vec(record).unwrap()))
            .await
            .unwrap();
        store
    }

    fn poller(store: Arc<CountingStore>, max_attempts: u32) -> Poller {
        Poller::new(
            ResultStore::new(store),
            PollOptions {
                max_attempts,
                interval: Duration::from_secs(2),
            },
        )
    }

    #[test]
    fn state_machine_transitions() {
        let ok = ResultRecord::success(RequestId::new("r"), &json!({}));
        let failed = ResultRecord::failure(RequestId::new("r"), "boom");

        let state = PollState::start().observe(None, 3);
        assert_eq!(state, PollState::Pending { attempts: 1 });
        assert!(!state.is_terminal());

        let state = state.observe(None, 3).observe(None, 3);
        assert_eq!(state, PollState::TimedOut { attempts: 3 });
        assert!(state.is_terminal());
        assert_eq!(state.clone().observe(Some(ok.clone()), 3), state);

        assert!(matches!(
            PollState::start().observe(Some(ok), 3),
            PollState::Succeeded(_)
        ));
        assert!(matches!(
            PollState::start().observe(Some(failed), 3),
            PollState::Failed(_)
        ));
    }

    #[test]
    fn budget_excludes_trailing_pause() {
        assert_eq!(PollOptions::default().budget(), Duration::from_secs(118));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_exactly_max_attempts() {
        let store = Arc::new(CountingStore::new(u32::MAX));
        let poller = poller(store.clone(), 60);
        let started = Instant::now();

        let result = poller.wait(&RequestId::new("never")).await;

        assert!(matches!(result, Err(PollError::Timeout { attempts: 60, .. })));
        assert_eq!(store.reads(), 60);
        assert_eq!(started.elapsed(), Duration::from_secs(118));
    }

    #[tokio::test(start_paused = true)]
    async fn unstorable_id_fails_without_reading() {
        let store = Arc::new(CountingStore::new(u32::MAX));
        let poller = poller(store.clone(), 60);
        let started = Instant::now();

        let result = poller.wait(&RequestId::new("a/b")).await;

        assert!(matches!(result, Err(PollError::InvalidRequestId { .. })));
        assert_eq!(store.reads(), 0);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_as_soon_as_record_appears() {
        let record = ResultRecord::success(RequestId::new("r1"), &json!({"count": 3}));
        let store = store_with(&record, 3).await;
        let reporter = RecordingReporter::new();
        let poller = poller(store.clone(), 60).with_reporter(reporter.clone());
        let started = Instant::now();

        let found = poller.wait(&RequestId::new("r1")).await.unwrap();

        assert_eq!(found, record);
        assert_eq!(store.reads(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
        assert!(matches!(
            reporter.events().last(),
            Some(ProgressEvent::ResultReceived { success: true, attempts: 3, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_record_is_a_result() {
        let record = ResultRecord::failure(RequestId::new("r1"), "feed unreachable");
        let store = store_with(&record, 1).await;

        let found = poller(store, 5).wait(&RequestId::new("r1")).await.unwrap();

        assert!(!found.success);
        assert_eq!(found.error.as_deref(), Some("feed unreachable"));
    }

    #[tokio::test(start_paused = true)]
    async fn read_errors_are_retried() {
        let record = ResultRecord::success(RequestId::new("r1"), &json!({}));
        let store = store_with(&record, 1).await;
        let store = Arc::new(CountingStore {
            failing: vec![1, 2],
            inner: store.inner.clone(),
            visible_from: 1,
            reads: AtomicU32::new(0),
        });

        let found = poller(store.clone(), 5).wait(&RequestId::new("r1")).await.unwrap();

        assert!(found.success);
        assert_eq!(store.reads(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_between_reads() {
        let store = Arc::new(CountingStore::new(u32::MAX));
        let poller = poller(store.clone(), 60);

        let result = poller
            .wait_until(
                &RequestId::new("r1"),
                tokio::time::sleep(Duration::from_secs(5)),
            )
            .await;

        // Reads at 0s, 2s and 4s; cancelled during the following pause
        assert!(matches!(result, Err(PollError::Cancelled { attempts: 3, .. })));
        assert_eq!(store.reads(), 3);
    }
}

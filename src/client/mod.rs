//! The disconnected side of the protocol: hand a request to the trigger
//! transport, then watch the published store for its result.

mod poll;
mod trigger;

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::info;

use crate::error::{ClientError, DispatchError};
use crate::model::{Action, RequestId, ResultRecord};
use crate::progress::{NoopReporter, ProgressEvent, SharedProgressReporter};
use crate::store::{ResultStore, SharedBlobStore};

pub use poll::{DEFAULT_INTERVAL, DEFAULT_MAX_ATTEMPTS, PollOptions, PollState, Poller};
pub use trigger::{DEFAULT_GITHUB_API, GitHubDispatchTrigger, Repository, Trigger, dispatch_body};

/// Assigns request ids and hands requests to the trigger transport
#[derive(Clone)]
pub struct Dispatcher {
    trigger: Arc<dyn Trigger>,
    reporter: SharedProgressReporter,
}

impl Dispatcher {
    pub fn new(trigger: Arc<dyn Trigger>) -> Self {
        Self {
            trigger,
            reporter: NoopReporter::shared(),
        }
    }

    pub fn with_reporter(mut self, reporter: SharedProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Start `action` and return the id to poll for. Does not wait.
    ///
    /// `payload` must be a JSON object or null.
    pub async fn dispatch(&self, action: Action, payload: Value) -> Result<RequestId, DispatchError> {
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(DispatchError::PayloadNotObject {
                    action: action.to_string(),
                });
            }
        };

        let request_id = RequestId::generate();
        self.trigger.trigger(action, payload, &request_id).await?;

        info!(%action, %request_id, "Request dispatched");
        self.reporter.report(ProgressEvent::Dispatched {
            request_id: request_id.to_string(),
            action: action.to_string(),
        });
        Ok(request_id)
    }
}

/// Dispatch a request and wait for its result
#[derive(Clone)]
pub struct Client {
    dispatcher: Dispatcher,
    poller: Poller,
}

impl Client {
    pub fn new(trigger: Arc<dyn Trigger>, store: SharedBlobStore, options: PollOptions) -> Self {
        Self {
            dispatcher: Dispatcher::new(trigger),
            poller: Poller::new(ResultStore::new(store), options),
        }
    }

    pub fn with_reporter(self, reporter: SharedProgressReporter) -> Self {
        Self {
            dispatcher: self.dispatcher.with_reporter(reporter.clone()),
            poller: self.poller.with_reporter(reporter),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Dispatch `action` and wait for its result record
    pub async fn request(&self, action: Action, payload: Value) -> Result<ResultRecord, ClientError> {
        let request_id = self.dispatcher.dispatch(action, payload).await?;
        Ok(self.poller.wait(&request_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PollError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Accepts every request and writes a canned result straight away
    struct InstantTrigger {
        results: ResultStore,
        seen: Mutex<Vec<(Action, Map<String, Value>, RequestId)>>,
        respond: bool,
    }

    #[async_trait]
    impl Trigger for InstantTrigger {
        async fn trigger(
            &self,
            action: Action,
            payload: Map<String, Value>,
            request_id: &RequestId,
        ) -> Result<(), DispatchError> {
            self.seen
                .lock()
                .unwrap()
                .push((action, payload, request_id.clone()));
            if self.respond {
                let record = ResultRecord::success(request_id.clone(), &json!({"count": 1}));
                self.results.put(&record).await.unwrap();
            }
            Ok(())
        }
    }

    struct RejectingTrigger;

    #[async_trait]
    impl Trigger for RejectingTrigger {
        async fn trigger(
            &self,
            _action: Action,
            _payload: Map<String, Value>,
            _request_id: &RequestId,
        ) -> Result<(), DispatchError> {
            Err(DispatchError::Rejected {
                status: 401,
                body: "Bad credentials".to_string(),
            })
        }
    }

    fn client_with(respond: bool) -> (Client, Arc<InstantTrigger>) {
        let store: SharedBlobStore = Arc::new(MemoryStore::new());
        let trigger = Arc::new(InstantTrigger {
            results: ResultStore::new(store.clone()),
            seen: Mutex::new(Vec::new()),
            respond,
        });
        let options = PollOptions {
            max_attempts: 3,
            interval: Duration::from_secs(2),
        };
        (Client::new(trigger.clone(), store, options), trigger)
    }

    #[tokio::test(start_paused = true)]
    async fn request_dispatches_then_returns_result() {
        let (client, trigger) = client_with(true);

        let record = client
            .request(Action::UpdateTop, json!({"country": "us"}))
            .await
            .unwrap();

        let seen = trigger.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, Action::UpdateTop);
        assert_eq!(seen[0].1.get("country"), Some(&json!("us")));
        assert_eq!(record.request_id, seen[0].2);
        assert_eq!(record.field("count"), Some(&json!(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out() {
        let (client, _) = client_with(false);

        let result = client.request(Action::UpdateFeeds, Value::Null).await;

        assert!(matches!(
            result,
            Err(ClientError::Poll(PollError::Timeout { attempts: 3, .. }))
        ));
    }

    #[tokio::test]
    async fn transport_failure_is_not_a_timeout() {
        let client = Client::new(
            Arc::new(RejectingTrigger),
            Arc::new(MemoryStore::new()),
            PollOptions::default(),
        );

        let result = client.request(Action::Search, json!({"query": "x"})).await;

        assert!(matches!(
            result,
            Err(ClientError::Dispatch(DispatchError::Rejected { status: 401, .. }))
        ));
    }

    #[tokio::test]
    async fn non_object_payload_is_refused() {
        let (client, trigger) = client_with(true);

        let result = client.dispatcher().dispatch(Action::Search, json!([1, 2])).await;

        assert!(matches!(result, Err(DispatchError::PayloadNotObject { .. })));
        assert!(trigger.seen.lock().unwrap().is_empty());
    }
}

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::error::DispatchError;
use crate::model::{Action, RequestId};

pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Transport that starts a worker for a request.
///
/// Accepting a request says nothing about whether a worker will run; only a
/// result record does.
#[async_trait]
pub trait Trigger: Send + Sync {
    async fn trigger(
        &self,
        action: Action,
        payload: Map<String, Value>,
        request_id: &RequestId,
    ) -> Result<(), DispatchError>;
}

/// A GitHub repository in `owner/name` form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl FromStr for Repository {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err("expected owner/repo".to_string()),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Starts workers through the `repository_dispatch` REST endpoint
pub struct GitHubDispatchTrigger {
    client: reqwest::Client,
    api_base: String,
    repository: Repository,
    token: Option<String>,
}

impl GitHubDispatchTrigger {
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        repository: Repository,
        token: Option<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            repository,
            token,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/repos/{}/{}/dispatches",
            self.api_base, self.repository.owner, self.repository.name
        )
    }
}

/// Body of a dispatch call: the action is the event type, the request id
/// rides along in the client payload
pub fn dispatch_body(action: Action, mut payload: Map<String, Value>, request_id: &RequestId) -> Value {
    payload.insert(
        "request_id".to_string(),
        Value::String(request_id.to_string()),
    );
    json!({
        "event_type": action.as_str(),
        "client_payload": payload,
    })
}

#[async_trait]
impl Trigger for GitHubDispatchTrigger {
    async fn trigger(
        &self,
        action: Action,
        payload: Map<String, Value>,
        request_id: &RequestId,
    ) -> Result<(), DispatchError> {
        let token = self
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(DispatchError::MissingToken)?;
        let body = serde_json::to_vec(&dispatch_body(action, payload, request_id))?;
        let url = self.endpoint();
        debug!(url = %url, %action, %request_id, "Dispatching");

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(DispatchError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(%action, %request_id, repository = %self.repository, "Dispatch accepted");
        Ok(())
    }
}

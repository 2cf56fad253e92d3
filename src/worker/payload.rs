use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HandlerError;
use crate::model::{Action, DirectoryEntry};

const DEFAULT_SEARCH_LIMIT: usize = 25;
const DEFAULT_COUNTRY: &str = "us";

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

fn default_country() -> String {
    DEFAULT_COUNTRY.to_string()
}

/// Decode an action's payload, treating a missing payload as an empty object
pub(crate) fn decode<T: DeserializeOwned>(action: Action, payload: &Value) -> Result<T, HandlerError> {
    let payload = match payload {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(payload).map_err(|e| HandlerError::InvalidPayload {
        action: action.to_string(),
        source: e,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchPayload {
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribePayload {
    pub feed_url: String,
    #[serde(default)]
    pub podcast_id: Option<String>,
    #[serde(default)]
    pub podcast_title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnsubscribePayload {
    pub podcast_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadPayload {
    pub episode_url: String,
    pub episode_id: String,
    pub podcast_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTopPayload {
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateFeedsPayload {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutput {
    pub query: String,
    pub results: Vec<DirectoryEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeOutput {
    pub podcast_id: String,
    pub title: String,
    pub episode_count: usize,
    pub new_episodes: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeOutput {
    pub podcast_id: String,
    pub title: String,
    pub episode_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOutput {
    pub podcast_id: String,
    pub episode_id: String,
    pub size: u64,
    pub storage: String,
    pub content_hash: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTopOutput {
    pub country: String,
    pub count: usize,
    /// Chart rows that carry a feed URL
    pub resolved: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFeedsOutput {
    pub updated: usize,
    pub failed: usize,
    pub new_episodes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_limit_defaults() {
        let payload: SearchPayload = decode(Action::Search, &json!({"query": "rust"})).unwrap();
        assert_eq!(payload.limit, 25);
    }

    #[test]
    fn missing_payload_is_empty_object() {
        let payload: UpdateTopPayload = decode(Action::UpdateTop, &Value::Null).unwrap();
        assert_eq!(payload.country, "us");
        assert!(payload.limit.is_none());
    }

    #[test]
    fn missing_required_field_names_the_action() {
        let err = decode::<SubscribePayload>(Action::Subscribe, &json!({"podcast_id": "p1"}))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("subscribe"));
        assert!(message.contains("feed_url"));
    }

    #[test]
    fn outputs_use_camel_case() {
        let output = serde_json::to_value(SubscribeOutput {
            podcast_id: "p1".to_string(),
            title: "Show".to_string(),
            episode_count: 3,
            new_episodes: 3,
        })
        .unwrap();
        assert_eq!(
            output,
            json!({"podcastId": "p1", "title": "Show", "episodeCount": 3, "newEpisodes": 3})
        );
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue, LOCATION};
use std::pin::Pin;
use tracing::debug;
use url::Url;

use crate::error::FetchError;

/// Maximum number of redirects followed before a fetch is abandoned
pub const MAX_REDIRECTS: usize = 10;

/// A streaming response body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// HTTP response with status, redirect target, content length, and body stream
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Location header value, if present
    pub location: Option<String>,
    /// Content-Length header value, if present
    pub content_length: Option<u64>,
    /// Response body as a stream of bytes
    pub body: ByteStream,
}

impl HttpResponse {
    /// Build a response whose whole body is already in memory
    pub fn buffered(status: u16, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        let content_length = Some(body.len() as u64);
        Self {
            status,
            location: None,
            content_length,
            body: Box::pin(futures::stream::once(async move {
                Ok::<Bytes, reqwest::Error>(body)
            })),
        }
    }

    /// Build an empty-bodied redirect response
    pub fn redirect(status: u16, location: &str) -> Self {
        Self {
            location: Some(location.to_string()),
            ..Self::buffered(status, Bytes::new())
        }
    }

    fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status) && self.location.is_some()
    }

    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction for testability.
///
/// Implementations must NOT follow redirects themselves; that is done by
/// [`fetch_following_redirects`] so the hop bound holds for every client.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issue a single GET request
    async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error>;
}

/// A successful response together with the URL it was finally served from
pub struct Fetched {
    pub url: Url,
    pub response: HttpResponse,
}

/// GET a URL, following up to [`MAX_REDIRECTS`] redirects.
///
/// A 3xx response with a `Location` header is a redirect; relative locations
/// resolve against the URL that produced them. Any other non-2xx status fails.
pub async fn fetch_following_redirects(
    client: &dyn HttpClient,
    url: &str,
) -> Result<Fetched, FetchError> {
    let mut current = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        source: e,
    })?;
    let mut redirects = 0;

    loop {
        let response = client
            .get(current.as_str())
            .await
            .map_err(|e| FetchError::Http {
                url: current.to_string(),
                source: e,
            })?;

        if response.is_success() {
            return Ok(Fetched {
                url: current,
                response,
            });
        }

        if !response.is_redirect() {
            return Err(FetchError::Status {
                url: current.to_string(),
                status: response.status,
            });
        }

        if redirects == MAX_REDIRECTS {
            return Err(FetchError::TooManyRedirects {
                url: url.to_string(),
                limit: MAX_REDIRECTS,
            });
        }
        redirects += 1;

        let location = response.location.unwrap_or_default();
        let next = current
            .join(&location)
            .map_err(|e| FetchError::InvalidUrl {
                url: location.clone(),
                source: e,
            })?;
        debug!(from = %current, to = %next, hop = redirects, "Following redirect");
        current = next;
    }
}

/// Fetch a URL (following redirects) and collect the whole body
pub async fn fetch_bytes(client: &dyn HttpClient, url: &str) -> Result<Bytes, FetchError> {
    let fetched = fetch_following_redirects(client, url).await?;
    let mut body = Vec::new();
    let mut stream = fetched.response.body;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::Stream {
            url: fetched.url.to_string(),
            source: e,
        })?;
        body.extend_from_slice(&chunk);
    }

    Ok(Bytes::from(body))
}

/// Default HTTP client implementation using reqwest
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a client that identifies itself with the given user agent
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        Self::build(user_agent, HeaderMap::new())
    }

    /// Create a client that asks intermediaries not to serve cached copies.
    ///
    /// Used for reading the published store, where a cached 404 would hide a
    /// freshly written result.
    pub fn uncached(user_agent: &str) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        Self::build(user_agent, headers)
    }

    fn build(user_agent: &str, headers: HeaderMap) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let content_length = response.content_length();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(String::from);

        let body: ByteStream = Box::pin(response.bytes_stream());

        Ok(HttpResponse {
            status,
            location,
            content_length,
            body,
        })
    }
}

//! HTTP client for the local backend service
//!
//! A thin request/response adapter: one persistent [`reqwest::Client`] reused
//! across calls, an enforced per-call timeout, typed error mapping, and JSON
//! decoding. No domain semantics about friends or messages live here.

use chatlink_core::{
    Backend, EngineError, ErrorBody, FriendRecord, MessageRecord, StatusRecord, Timestamp,
    TransportConfig, TransportError, Username,
};
use core::time::Duration;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;
use url::Url;

// ----------------------------------------------------------------------------
// Request Bodies
// ----------------------------------------------------------------------------

#[derive(Serialize)]
struct AddFriendBody<'a> {
    username: &'a str,
}

#[derive(Serialize)]
struct SendMessageBody<'a> {
    to: &'a str,
    text: &'a str,
}

// ----------------------------------------------------------------------------
// HTTP Backend
// ----------------------------------------------------------------------------

/// `reqwest`-backed implementation of the backend protocol.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpBackend {
    /// Build an adapter from the transport configuration.
    pub fn new(config: &TransportConfig) -> Result<Self, EngineError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            EngineError::config_error(format!("invalid backend base URL: {e}"))
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EngineError::config_error(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            timeout: config.request_timeout,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url.join(path).map_err(|e| TransportError::Decode {
            reason: format!("invalid endpoint {path}: {e}"),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, TransportError> {
        let url = self.endpoint(path)?;
        trace!(%url, "GET");
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.classify_error(e))?;
        Self::decode_response(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, TransportError> {
        let url = self.endpoint(path)?;
        trace!(%url, "POST");
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify_error(e))?;
        Self::decode_response(response).await
    }

    async fn decode_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &body));
        }

        response.json().await.map_err(|e| TransportError::Decode {
            reason: e.to_string(),
        })
    }

    fn classify_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else if err.is_decode() {
            TransportError::Decode {
                reason: err.to_string(),
            }
        } else {
            // Connect failures and the remaining IO-level errors all mean the
            // local service is unreachable.
            TransportError::ConnectionRefused
        }
    }
}

/// Map a non-success response to a status error, extracting the structured
/// error body when one is present.
fn status_error(code: u16, body: &str) -> TransportError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.trim().to_string());
    TransportError::Status { code, detail }
}

#[async_trait::async_trait]
impl Backend for HttpBackend {
    async fn status(&self) -> Result<StatusRecord, TransportError> {
        self.get_json("/status", &[]).await
    }

    async fn list_friends(&self) -> Result<Vec<FriendRecord>, TransportError> {
        self.get_json("/friends", &[]).await
    }

    async fn add_friend(&self, username: &Username) -> Result<FriendRecord, TransportError> {
        self.post_json(
            "/friends",
            &AddFriendBody {
                username: username.as_str(),
            },
        )
        .await
    }

    async fn fetch_messages(
        &self,
        peer: &Username,
        limit: usize,
        before: Option<Timestamp>,
    ) -> Result<Vec<MessageRecord>, TransportError> {
        let mut query = vec![
            ("peer", peer.as_str().to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(before) = before {
            query.push(("before", before.as_millis().to_string()));
        }
        self.get_json("/messages", &query).await
    }

    async fn send_message(
        &self,
        to: &Username,
        text: &str,
    ) -> Result<MessageRecord, TransportError> {
        self.post_json(
            "/messages",
            &SendMessageBody {
                to: to.as_str(),
                text,
            },
        )
        .await
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

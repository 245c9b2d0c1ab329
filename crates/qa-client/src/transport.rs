use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::{Method, Url};
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::TransportError;

/// Status and body of one HTTP round trip, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }
}

/// A single HTTP round trip. Implementations report connection-level
/// problems as [`TransportError::Network`] and leave status handling to
/// [`Transport`].
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<RawResponse, TransportError>;
}

/// `reqwest`-backed exchange. Responses are never served from a cache.
#[derive(Clone)]
pub struct ReqwestExchange {
    http: reqwest::Client,
}

impl ReqwestExchange {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::Network(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Exchange for ReqwestExchange {
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<RawResponse, TransportError> {
        let path = url.path().to_string();
        let mut request = self
            .http
            .request(method, url)
            .header(CACHE_CONTROL, "no-store")
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| TransportError::Network(format!("Failed to fetch from {path}: {err}")))?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|err| {
            TransportError::Network(format!("Failed to read body from {path}: {err}"))
        })?;
        Ok(RawResponse::new(status, body.to_vec()))
    }
}

/// Runs requests through an [`Exchange`] with bounded, linear-backoff retry.
pub struct Transport<E> {
    exchange: E,
    base_url: Url,
    max_attempts: u32,
    base_delay: Duration,
}

impl Transport<ReqwestExchange> {
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        Self::new(ReqwestExchange::new(config.timeout())?, config)
    }
}

impl<E: Exchange> Transport<E> {
    pub fn new(exchange: E, config: &ClientConfig) -> Result<Self, TransportError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|err| TransportError::InvalidUrl(format!("{}: {err}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(config.base_url.clone()));
        }
        Ok(Self {
            exchange,
            base_url,
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait before attempt `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Joins percent-encoded `segments` onto the base url.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| TransportError::InvalidUrl(self.base_url.to_string()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    /// Issues `method` against `segments` until it succeeds, fails terminally,
    /// or runs out of attempts. The last failure is returned.
    pub async fn request(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        let url = self.endpoint(segments)?;
        let endpoint = url.path().to_string();
        let mut attempt = 1;

        loop {
            let outcome = match self.exchange.send(method.clone(), url.clone(), body).await {
                Ok(raw) => classify(raw),
                Err(err) => Err(err),
            };

            match outcome {
                Ok(value) => {
                    tracing::debug!(%method, endpoint = %endpoint, attempt, "request succeeded");
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        %method,
                        endpoint = %endpoint,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        %method,
                        endpoint = %endpoint,
                        attempt,
                        retryable = err.is_retryable(),
                        error = %err,
                        "request failed"
                    );
                    return Err(err);
                }
            }
        }
    }
}

/// Maps a raw response onto success, a terminal client failure, or a
/// retryable server failure.
pub fn classify(raw: RawResponse) -> Result<Value, TransportError> {
    let trimmed = raw.body.trim_ascii();
    let parsed = if trimmed.is_empty() {
        None
    } else {
        serde_json::from_slice::<Value>(trimmed).ok()
    };
    let detail = parsed.as_ref().and_then(detail_message);
    let message = |status: u16| {
        detail
            .clone()
            .unwrap_or_else(|| format!("HTTP error {status}"))
    };

    if let Some(status) = parsed.as_ref().and_then(embedded_client_status) {
        return Err(TransportError::Client {
            status,
            message: message(status),
        });
    }

    match raw.status {
        200..=299 => match parsed {
            Some(value) => Ok(value),
            None if trimmed.is_empty() => Ok(Value::Null),
            None => Err(TransportError::Malformed(format!(
                "response body is not JSON (status {})",
                raw.status
            ))),
        },
        400..=499 => Err(TransportError::Client {
            status: raw.status,
            message: message(raw.status),
        }),
        500..=599 => Err(TransportError::Server {
            status: raw.status,
            message: message(raw.status),
        }),
        other => Err(TransportError::Malformed(format!(
            "unexpected HTTP status {other}"
        ))),
    }
}

fn detail_message(body: &Value) -> Option<String> {
    match body.get("detail")? {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// `{detail, status|status_code: 4xx}` marks a client failure whatever the
/// HTTP status was.
fn embedded_client_status(body: &Value) -> Option<u16> {
    body.get("detail")?;
    let status = body
        .get("status")
        .or_else(|| body.get("status_code"))?
        .as_u64()?;
    (400..500)
        .contains(&status)
        .then_some(status as u16)
}

//! HTTP delivery of parsed messages to the receiving service.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bibrelay_model::ParsedMessage;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Route appended to the configured endpoint.
pub const INGEST_ROUTE: &str = "WinlinkMessage";

/// Upper bound for a single POST.
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to serialize message: {0}")]
    Format(#[from] serde_json::Error),

    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport failure: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("service responded with {0}")]
    Status(StatusCode),
}

impl ForwardError {
    /// Short label used in logs.
    pub fn category(&self) -> &'static str {
        match self {
            ForwardError::Format(_) => "format",
            ForwardError::InvalidEndpoint { .. } => "invalid-endpoint",
            ForwardError::Timeout(_) => "timeout",
            ForwardError::Transport(_) => "transport",
            ForwardError::Status(_) => "status",
        }
    }
}

/// Anything able to deliver a parsed message.
#[async_trait]
pub trait MessageForwarder: Send + Sync {
    /// Returns true only when the message was accepted downstream.
    async fn forward(&self, message: &ParsedMessage) -> bool;
}

/// Single-attempt JSON POST client.
#[derive(Clone)]
pub struct Forwarder {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

impl fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forwarder")
            .field("endpoint", &self.endpoint.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Forwarder {
    /// Build a forwarder posting to `<base>/WinlinkMessage`.
    pub fn new(base: &str) -> Result<Self, ForwardError> {
        Self::with_timeout(base, FORWARD_TIMEOUT)
    }

    pub fn with_timeout(
        base: &str,
        timeout: Duration,
    ) -> Result<Self, ForwardError> {
        let endpoint = Self::resolve_endpoint(base)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ForwardError::Transport)?;
        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn resolve_endpoint(base: &str) -> Result<Url, ForwardError> {
        let invalid = |reason: String| ForwardError::InvalidEndpoint {
            endpoint: base.to_string(),
            reason,
        };

        let trimmed = base.trim();
        let with_slash = if trimmed.ends_with('/') {
            trimmed.to_string()
        } else {
            format!("{trimmed}/")
        };
        let base_url =
            Url::parse(&with_slash).map_err(|err| invalid(err.to_string()))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(invalid(format!(
                "unsupported scheme {}",
                base_url.scheme()
            )));
        }
        base_url
            .join(INGEST_ROUTE)
            .map_err(|err| invalid(err.to_string()))
    }

    /// Post once and surface the failure cause.
    pub async fn try_forward(
        &self,
        message: &ParsedMessage,
    ) -> Result<StatusCode, ForwardError> {
        let body = serde_json::to_vec(message)?;
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ForwardError::Timeout(self.timeout)
                } else {
                    ForwardError::Transport(err)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(status)
        } else {
            Err(ForwardError::Status(status))
        }
    }
}

#[async_trait]
impl MessageForwarder for Forwarder {
    async fn forward(&self, message: &ParsedMessage) -> bool {
        match self.try_forward(message).await {
            Ok(status) => {
                debug!(
                    message_id = %message.message_id,
                    %status,
                    "message forwarded"
                );
                true
            }
            Err(err) => {
                let cause = std::error::Error::source(&err)
                    .map(|source| source.to_string());
                warn!(
                    message_id = %message.message_id,
                    endpoint = %self.endpoint,
                    category = err.category(),
                    error = %err,
                    cause = cause.as_deref().unwrap_or("none"),
                    "failed to forward message"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{Router, http::StatusCode as AxumStatus, routing::post};
    use bibrelay_model::BibRecord;
    use chrono::Utc;
    use tokio::net::TcpListener;

    use super::*;

    fn message() -> ParsedMessage {
        ParsedMessage {
            message_id: "0K3K2DET73LU".into(),
            message_timestamp: Utc::now(),
            origin_host: "aid-3".into(),
            file_created: Utc::now(),
            bib_records: vec![BibRecord::from_tokens(
                ["115", "OUT", "1723", "19", "WR"],
                false,
            )],
        }
    }

    async fn serve(status: AxumStatus) -> String {
        let app = Router::new()
            .route("/WinlinkMessage", post(move || async move { status }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn endpoint_joins_route_with_or_without_trailing_slash() {
        let a = Forwarder::new("http://example.net/api").unwrap();
        let b = Forwarder::new("http://example.net/api/").unwrap();
        assert_eq!(a.endpoint().as_str(), "http://example.net/api/WinlinkMessage");
        assert_eq!(a.endpoint(), b.endpoint());
    }

    #[test]
    fn rejects_invalid_endpoints() {
        for endpoint in ["not a url", "ftp://example.net"] {
            let err = Forwarder::new(endpoint).unwrap_err();
            assert_eq!(err.category(), "invalid-endpoint");
        }
    }

    #[tokio::test]
    async fn success_status_returns_true() {
        let base = serve(AxumStatus::OK).await;
        let forwarder = Forwarder::new(&base).unwrap();
        assert!(forwarder.forward(&message()).await);
    }

    #[tokio::test]
    async fn error_status_returns_false() {
        let base = serve(AxumStatus::INTERNAL_SERVER_ERROR).await;
        let forwarder = Forwarder::new(&base).unwrap();
        let err = forwarder.try_forward(&message()).await.unwrap_err();
        assert_eq!(err.category(), "status");
        assert!(!forwarder.forward(&message()).await);
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let forwarder = Forwarder::new(&format!("http://{addr}")).unwrap();
        let err = forwarder.try_forward(&message()).await.unwrap_err();
        assert_eq!(err.category(), "transport");
    }
}

//! ==============================================================================
//! fetcher.rs - remote sensor api client
//! ==============================================================================
//!
//! purpose:
//!     issues one GET against the remote wind sensor api and turns the body
//!     into a json value. the document shape is opaque to us.
//!
//! relationships:
//!     - used by: poller.rs (one call per slot per fetch cycle)
//!     - implemented for tests by: poller.rs / server.rs test doubles
//!
//! failure model:
//!     every failure comes back as a FetchError. nothing is retried here,
//!     the next poll tick is the retry.
//!
//! ==============================================================================

use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// request timeout for a single poll
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to poll \"{url}\" [status={status}]")]
    Status { url: String, status: StatusCode },

    #[error("failed to poll \"{url}\": {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to parse \"{payload}\" because of {source}")]
    MalformedPayload {
        payload: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

/// something that can load a json document from a url
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Value, FetchError>> + Send;
}

/// production fetcher backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
        let transport = |source| FetchError::Transport { url: url.to_string(), source };

        let response = self.client.get(url).send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { url: url.to_string(), status });
        }

        // accumulate the whole body before parsing
        let payload = response.text().await.map_err(transport)?;

        serde_json::from_str(&payload)
            .map_err(|source| FetchError::MalformedPayload { payload, source })
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_parses_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/windsensor/12345"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"speed": 12.5, "direction": 270})))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let value = fetcher.fetch(&format!("{}/windsensor/12345", server.uri())).await.unwrap();

        assert_eq!(value, json!({"speed": 12.5, "direction": 270}));
    }

    #[tokio::test]
    async fn test_fetch_reports_bad_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher.fetch(&format!("{}/windsensor/12345", server.uri())).await.unwrap_err();

        let message = err.to_string();
        assert!(message.starts_with("failed to poll \""), "{}", message);
        assert_eq!(message.matches("failed to poll").count(), 1);
        match err {
            FetchError::Status { status, .. } => assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE),
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_reports_malformed_payload_with_raw_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher.fetch(&format!("{}/windsensor/history/12345", server.uri())).await.unwrap_err();

        match &err {
            FetchError::MalformedPayload { payload, .. } => assert_eq!(payload, "{not json"),
            other => panic!("expected parse error, got {:?}", other),
        }
        assert!(err.to_string().contains("{not json"));
    }

    #[tokio::test]
    async fn test_fetch_reports_transport_error() {
        // nothing listens on port 9 of localhost
        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher.fetch("http://127.0.0.1:9/windsensor/12345").await.unwrap_err();

        assert!(matches!(err, FetchError::Transport { .. }), "got {:?}", err);
    }
}

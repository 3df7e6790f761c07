//! HTTP transport for a signalpost collector
//!
//! GET delivery encodes a single payload as url-encoded query parameters;
//! POST delivery sends the envelope body as JSON. A cycle's requests are
//! dispatched concurrently, each under its own timeout; a timeout counts as
//! a transport failure for that request only.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use tokio::task::JoinSet;

use crate::config::NetworkConfig;
use crate::error::{Error, Result};

use super::{
    HttpMethod, Request, RequestResult, Transport, GET_PATH, POST_CONTENT_TYPE, POST_PATH,
};

/// reqwest-backed collector transport
#[derive(Clone)]
pub struct HttpConnection {
    inner: Arc<HttpInner>,
}

struct HttpInner {
    client: reqwest::Client,
    base_url: String,
    method: HttpMethod,
    request_timeout: Duration,
}

impl HttpConnection {
    /// Create a transport from configuration
    ///
    /// Returns an error if the configuration is invalid or missing required
    /// fields.
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config
            .endpoint
            .clone()
            .ok_or_else(|| Error::Config("network.endpoint is required".to_string()))?
            .trim_end_matches('/')
            .to_string();

        // Build default headers
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(POST_CONTENT_TYPE));

        if let Some(api_key) = &config.api_key {
            let auth_value = format!("Bearer {}", api_key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value)
                    .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?,
            );
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            inner: Arc::new(HttpInner {
                client,
                base_url,
                method: config.method,
                request_timeout: config.request_timeout(),
            }),
        })
    }

    /// Check whether the collector is reachable
    ///
    /// Usable as the emitter's connectivity probe via a blocking wrapper,
    /// or directly from async hosts.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.inner.base_url);

        match self.inner.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

impl HttpInner {
    /// One wire call; `None` means the transport itself failed
    async fn dispatch(&self, request: &Request) -> Option<u16> {
        let outcome = match self.method {
            HttpMethod::Post => {
                let url = format!("{}{}", self.base_url, POST_PATH);
                self.client.post(&url).json(&request.payload).send().await
            }
            HttpMethod::Get => {
                let url = format!(
                    "{}{}?{}",
                    self.base_url,
                    GET_PATH,
                    query_string(&request.payload)
                );
                self.client.get(&url).send().await
            }
        };

        match outcome {
            Ok(response) => Some(response.status().as_u16()),
            Err(e) => {
                tracing::debug!(error = %e, "HTTP request failed");
                None
            }
        }
    }
}

/// Flatten a payload object into an url-encoded query string
fn query_string(payload: &Value) -> String {
    let Some(object) = payload.as_object() else {
        return String::new();
    };

    object
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(&value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[async_trait]
impl Transport for HttpConnection {
    async fn send(&self, requests: Vec<Request>) -> Vec<RequestResult> {
        let mut tasks = JoinSet::new();

        for request in requests {
            let inner = Arc::clone(&self.inner);
            tasks.spawn(async move {
                let status =
                    match tokio::time::timeout(inner.request_timeout, inner.dispatch(&request))
                        .await
                    {
                        Ok(status) => status,
                        Err(_) => {
                            tracing::warn!(
                                events = request.event_ids.len(),
                                "request timed out"
                            );
                            None
                        }
                    };
                RequestResult::new(status, &request)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!(error = %e, "request dispatch task failed"),
            }
        }
        results
    }

    fn http_method(&self) -> HttpMethod {
        self.inner.method
    }

    fn endpoint_uri(&self) -> String {
        match self.inner.method {
            HttpMethod::Post => format!("{}{}", self.inner.base_url, POST_PATH),
            HttpMethod::Get => format!("{}{}", self.inner.base_url, GET_PATH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connection_requires_endpoint() {
        let config = NetworkConfig::default();
        assert!(HttpConnection::new(&config).is_err());
    }

    #[test]
    fn test_connection_with_valid_config() {
        let config = NetworkConfig {
            endpoint: Some("https://collector.example.com/".to_string()),
            api_key: Some("sp_live_test".to_string()),
            ..Default::default()
        };
        let connection = HttpConnection::new(&config).unwrap();
        // Trailing slash is normalized away
        assert_eq!(
            connection.endpoint_uri(),
            "https://collector.example.com/collector/events"
        );
        assert_eq!(connection.http_method(), HttpMethod::Post);
    }

    #[test]
    fn test_get_endpoint_uri() {
        let config = NetworkConfig {
            endpoint: Some("https://collector.example.com".to_string()),
            method: HttpMethod::Get,
            ..Default::default()
        };
        let connection = HttpConnection::new(&config).unwrap();
        assert_eq!(
            connection.endpoint_uri(),
            "https://collector.example.com/collector/event"
        );
    }

    #[test]
    fn test_query_string_encodes_values() {
        let payload = json!({
            "e": "screen view",
            "n": 42,
            "tna": "a/b"
        });
        let query = query_string(&payload);

        assert!(query.contains("e=screen%20view"));
        assert!(query.contains("n=42"));
        assert!(query.contains("tna=a%2Fb"));
    }
}

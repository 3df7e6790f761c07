//! Network transport seam
//!
//! The emitter only knows this contract: hand a cycle's [`Request`]s to a
//! [`Transport`], get one [`RequestResult`] back per request. Transport
//! internals (TLS, connection pooling, headers) stay behind the trait;
//! [`HttpConnection`] is the reqwest-backed default.

mod http;
mod request;

pub use http::HttpConnection;
pub use request::{Request, RequestResult, NO_RETRY_STATUS_CODES};

use async_trait::async_trait;
use serde::Deserialize;

/// HTTP method used for event delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl Default for HttpMethod {
    fn default() -> Self {
        HttpMethod::Post
    }
}

/// Collector path for POST batches
pub const POST_PATH: &str = "/collector/events";
/// Collector path for single-event GET delivery
pub const GET_PATH: &str = "/collector/event";
/// Content type for POST bodies
pub const POST_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Abstract transport the emitter dispatches through.
///
/// `send` dispatches the whole cycle's requests (concurrently where the
/// implementation supports it) and returns exactly one result per request,
/// in any order. A request that times out or fails at the transport level
/// yields a result with no status code; it must never abort its siblings.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, requests: Vec<Request>) -> Vec<RequestResult>;

    /// Method requests should be built for
    fn http_method(&self) -> HttpMethod;

    /// Full delivery URI, for diagnostics
    fn endpoint_uri(&self) -> String;
}

//! Request and result value types, and retry classification

use std::collections::HashMap;

use serde_json::Value;

/// Status codes that are never retried by default: the collector has
/// definitively rejected the payload and a resend cannot change that.
pub const NO_RETRY_STATUS_CODES: &[u16] = &[400, 401, 403, 410, 422];

/// One wire call: a serialized body plus bookkeeping for the queued events
/// it represents.
#[derive(Debug, Clone)]
pub struct Request {
    /// Final JSON body (POST envelope) or flat payload (GET)
    pub payload: Value,
    /// Queue ids of the events in this request
    pub event_ids: Vec<i64>,
    /// Set when the body can never fit the transport's byte budget
    pub oversize: bool,
}

impl Request {
    pub fn new(payload: Value, event_ids: Vec<i64>) -> Self {
        Self {
            payload,
            event_ids,
            oversize: false,
        }
    }

    /// A single-event request that exceeds the byte budget on its own
    pub fn oversize(payload: Value, event_id: i64) -> Self {
        Self {
            payload,
            event_ids: vec![event_id],
            oversize: true,
        }
    }
}

/// Outcome of one request
#[derive(Debug, Clone)]
pub struct RequestResult {
    /// HTTP status, or `None` for transport-level failure or timeout
    pub status_code: Option<u16>,
    /// Carried over from the request
    pub oversize: bool,
    /// Queue ids this outcome applies to
    pub event_ids: Vec<i64>,
}

impl RequestResult {
    pub fn new(status_code: Option<u16>, request: &Request) -> Self {
        Self {
            status_code,
            oversize: request.oversize,
            event_ids: request.event_ids.clone(),
        }
    }

    /// 2xx response
    pub fn is_successful(&self) -> bool {
        matches!(self.status_code, Some(code) if (200..300).contains(&code))
    }

    /// Whether the events should stay queued for a future drain cycle.
    ///
    /// Precedence: oversize requests are never retried (no resend can make
    /// them fit); a caller-supplied override wins over both default sets;
    /// otherwise everything retries except [`NO_RETRY_STATUS_CODES`].
    /// Missing status (network failure, timeout) is transient and retries.
    pub fn should_retry(&self, custom_rules: &HashMap<u16, bool>) -> bool {
        if self.is_successful() {
            return false;
        }
        if self.oversize {
            return false;
        }
        match self.status_code {
            Some(code) => match custom_rules.get(&code) {
                Some(&retry) => retry,
                None => !NO_RETRY_STATUS_CODES.contains(&code),
            },
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(status: Option<u16>, oversize: bool) -> RequestResult {
        let mut request = Request::new(json!({}), vec![1]);
        request.oversize = oversize;
        RequestResult::new(status, &request)
    }

    #[test]
    fn test_success_detection() {
        assert!(result(Some(200), false).is_successful());
        assert!(result(Some(204), false).is_successful());
        assert!(!result(Some(301), false).is_successful());
        assert!(!result(Some(500), false).is_successful());
        assert!(!result(None, false).is_successful());
    }

    #[test]
    fn test_default_retry_classification() {
        let rules = HashMap::new();

        // Transient: 5xx and missing status retry
        assert!(result(Some(500), false).should_retry(&rules));
        assert!(result(Some(503), false).should_retry(&rules));
        assert!(result(None, false).should_retry(&rules));

        // Permanent rejections do not
        for code in NO_RETRY_STATUS_CODES {
            assert!(!result(Some(*code), false).should_retry(&rules));
        }

        // Other 4xx retry by default
        assert!(result(Some(404), false).should_retry(&rules));
        assert!(result(Some(429), false).should_retry(&rules));
    }

    #[test]
    fn test_custom_rules_override_both_directions() {
        let rules = HashMap::from([(500, false), (422, true)]);

        assert!(!result(Some(500), false).should_retry(&rules));
        assert!(result(Some(422), false).should_retry(&rules));
        // Unlisted codes keep the defaults
        assert!(result(Some(503), false).should_retry(&rules));
        assert!(!result(Some(401), false).should_retry(&rules));
    }

    #[test]
    fn test_oversize_never_retries() {
        let rules = HashMap::from([(500, true)]);
        assert!(!result(Some(500), true).should_retry(&rules));
        assert!(!result(None, true).should_retry(&rules));
    }

    #[test]
    fn test_success_never_retries() {
        assert!(!result(Some(200), false).should_retry(&HashMap::new()));
    }
}

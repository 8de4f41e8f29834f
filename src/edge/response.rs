//! Canonical short-circuit responses and rate-limit header stamping.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::envelope::{CdnRequest, HeaderEntry, HeaderMap};
use crate::bucket::Decision;

/// The short-circuit response envelope returned instead of forwarding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdnResponse {
    pub status: String,
    pub status_description: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "HeaderMap::is_empty")]
    pub headers: HeaderMap,
}

fn error_body(status: &str, title: &str, detail: &str) -> String {
    json!({
        "errors": [{
            "status": status,
            "title": title,
            "detail": detail,
        }]
    })
    .to_string()
}

impl CdnResponse {
    pub fn unauthorized() -> Self {
        Self {
            status: "401".to_string(),
            status_description: "Unauthorized".to_string(),
            body: error_body(
                "401",
                "Unauthorized",
                "Authentication credentials were missing, incorrect or expired. \
                 Obtain a new access token and retry the request.",
            ),
            headers: HeaderMap::new(),
        }
    }

    pub fn forbidden() -> Self {
        Self {
            status: "403".to_string(),
            status_description: "Forbidden".to_string(),
            body: error_body(
                "403",
                "Forbidden",
                "You do not have permission to access this resource. \
                 Check that your client has been granted the required scopes.",
            ),
            headers: HeaderMap::new(),
        }
    }

    /// The 429 carries the rate-limit headers so callers can back off
    /// intelligently.
    pub fn too_many_requests(decision: &Decision) -> Self {
        let mut headers = HeaderMap::new();
        for (canonical, value) in rate_limit_header_values(decision) {
            headers.insert(
                canonical.to_ascii_lowercase(),
                vec![HeaderEntry {
                    key: canonical.to_string(),
                    value,
                }],
            );
        }

        Self {
            status: "429".to_string(),
            status_description: "Too Many Requests".to_string(),
            body: error_body(
                "429",
                "Too Many Requests",
                "You have exceeded your rate limit. Please try your request again later.",
            ),
            headers,
        }
    }
}

/// Stamp the decision's header set onto a request about to be
/// forwarded.
pub fn stamp_rate_limit_headers(request: &mut CdnRequest, decision: &Decision) {
    for (canonical, value) in rate_limit_header_values(decision) {
        request.set_header(canonical, value);
    }
}

fn rate_limit_header_values(decision: &Decision) -> Vec<(&'static str, String)> {
    let mut values = vec![
        ("X-RateLimit-Limit", decision.limit.to_string()),
        ("X-RateLimit-Remaining", decision.remaining.to_string()),
        ("X-RateLimit-Reset", decision.reset.to_string()),
    ];
    if decision.collision {
        values.push(("X-RateLimit-Collision", "true".to_string()));
    }
    values
}

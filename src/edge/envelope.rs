//! The CDN viewer-request envelope.
//!
//! Header values are arrays of `{key, value}` objects under the
//! lowercased header name; `key` keeps the canonical casing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One header value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub key: String,
    pub value: String,
}

/// Headers keyed by lowercased name.
pub type HeaderMap = HashMap<String, Vec<HeaderEntry>>;

/// The request carried inside a viewer-request event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdnRequest {
    pub uri: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub headers: HeaderMap,
}

impl CdnRequest {
    /// First value of a header, by lowercased name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|values| values.first())
            .map(|entry| entry.value.as_str())
    }

    /// Set or override a header.
    pub fn set_header(&mut self, canonical_name: &str, value: impl Into<String>) {
        self.headers.insert(
            canonical_name.to_ascii_lowercase(),
            vec![HeaderEntry {
                key: canonical_name.to_string(),
                value: value.into(),
            }],
        );
    }
}

/// The viewer-request event as delivered by the CDN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerRequestEvent {
    #[serde(rename = "Records")]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub cf: CdnEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdnEvent {
    pub request: CdnRequest,
}

impl ViewerRequestEvent {
    /// The request of the first record, if any.
    pub fn into_request(self) -> Option<CdnRequest> {
        self.records.into_iter().next().map(|record| record.cf.request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_deserializes_and_reads_headers() {
        let json = r#"{
            "Records": [{
                "cf": {
                    "request": {
                        "uri": "/uk/api/things",
                        "method": "GET",
                        "headers": {
                            "authorization": [
                                {"key": "Authorization", "value": "Bearer abc"}
                            ]
                        }
                    }
                }
            }]
        }"#;

        let event: ViewerRequestEvent = serde_json::from_str(json).unwrap();
        let request = event.into_request().unwrap();

        assert_eq!(request.uri, "/uk/api/things");
        assert_eq!(request.header("authorization"), Some("Bearer abc"));
        assert_eq!(request.header("x-rate-limiter"), None);
    }

    #[test]
    fn test_set_header_lowercases_key_and_overrides() {
        let mut request = CdnRequest {
            uri: "/".to_string(),
            method: "GET".to_string(),
            headers: HeaderMap::new(),
        };

        request.set_header("X-Client-Id", "unknown");
        request.set_header("X-Client-Id", "client-a");

        let entries = &request.headers["x-client-id"];
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "X-Client-Id");
        assert_eq!(entries[0].value, "client-a");
    }

    #[test]
    fn test_empty_records_yields_no_request() {
        let event: ViewerRequestEvent = serde_json::from_str(r#"{"Records": []}"#).unwrap();
        assert!(event.into_request().is_none());
    }
}

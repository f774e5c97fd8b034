//! Single-attempt HTTP plumbing and response body classification.

use crate::error::{LinkplayError, Result};
use crate::tls::TlsClients;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Why one attempt in the fallback matrix failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    #[error("timed out: {0}")]
    Timeout(String),

    /// The certificate chain did not verify against the pinned root
    #[error("TLS verification failed: {0}")]
    TlsVerification(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP status {0}")]
    Status(u16),
}

/// Performs one GET and returns the body text
///
/// This is the seam between the fallback logic and the network; tests swap in
/// scripted senders.
#[async_trait]
pub trait HttpSender: Send + Sync {
    async fn get(&self, url: &str, verify_tls: bool) -> std::result::Result<String, AttemptError>;
}

/// [`HttpSender`] backed by reqwest
pub struct ReqwestSender {
    clients: TlsClients,
}

impl ReqwestSender {
    pub(crate) fn new(clients: TlsClients) -> Self {
        Self { clients }
    }

    /// Whether a verified client is available at all
    pub fn can_verify(&self) -> bool {
        self.clients.verified.is_some()
    }
}

#[async_trait]
impl HttpSender for ReqwestSender {
    async fn get(&self, url: &str, verify_tls: bool) -> std::result::Result<String, AttemptError> {
        let client = if verify_tls {
            self.clients
                .verified
                .as_ref()
                .ok_or_else(|| AttemptError::TlsVerification("pinned root unavailable".to_string()))?
        } else {
            &self.clients.unverified
        };

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(&e, verify_tls))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Status(status.as_u16()));
        }

        response.text().await.map_err(|e| classify(&e, verify_tls))
    }
}

fn classify(err: &reqwest::Error, verify_tls: bool) -> AttemptError {
    if err.is_timeout() {
        return AttemptError::Timeout(err.to_string());
    }
    if verify_tls && mentions_certificate(err) {
        return AttemptError::TlsVerification(err.to_string());
    }
    AttemptError::Connect(err.to_string())
}

/// Walk the source chain looking for a certificate/handshake failure
fn mentions_certificate(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        let text = e.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("handshake") || text.contains("ssl") {
            return true;
        }
        current = e.source();
    }
    false
}

/// Body returned by the device, classified by shape
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    /// Empty body; treated as success
    Empty,
    /// Plain-text acknowledgement such as `OK`
    Text(String),
    Json(Value),
}

impl RawPayload {
    /// Classify a response body.
    ///
    /// Only bodies that open with `{` or `[` are parsed as JSON; anything else
    /// non-empty is kept as text.
    pub fn parse(body: &str) -> Result<Self> {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Ok(RawPayload::Empty);
        }
        if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
            return Ok(RawPayload::Text(trimmed.to_string()));
        }
        serde_json::from_str(trimmed)
            .map(RawPayload::Json)
            .map_err(|e| {
                let preview: String = trimmed.chars().take(80).collect();
                LinkplayError::Response(format!("{} in {:?}", e, preview))
            })
    }

    /// The JSON object, if the body was one
    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            RawPayload::Json(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    /// The JSON object, or an empty map for any other shape
    pub fn into_object(self) -> Map<String, Value> {
        match self {
            RawPayload::Json(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawPayload::Empty => true,
            RawPayload::Text(_) => false,
            RawPayload::Json(Value::Object(map)) => map.is_empty(),
            RawPayload::Json(Value::Array(items)) => items.is_empty(),
            RawPayload::Json(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_body_is_success() {
        assert_eq!(RawPayload::parse("").unwrap(), RawPayload::Empty);
        assert_eq!(RawPayload::parse("  \r\n").unwrap(), RawPayload::Empty);
    }

    #[test]
    fn plain_text_ack_is_kept() {
        assert_eq!(RawPayload::parse("OK\r\n").unwrap(), RawPayload::Text("OK".into()));
        assert!(RawPayload::parse("OK").unwrap().as_object().is_none());
    }

    #[test]
    fn json_object_and_array_parse() {
        let payload = RawPayload::parse(r#" {"vol":"50"} "#).unwrap();
        assert_eq!(payload.as_object().unwrap()["vol"], json!("50"));

        let payload = RawPayload::parse("[1,2]").unwrap();
        assert_eq!(payload, RawPayload::Json(json!([1, 2])));
        assert!(payload.into_object().is_empty());
    }

    #[test]
    fn broken_json_is_a_response_error() {
        let err = RawPayload::parse(r#"{"vol": "#).unwrap_err();
        assert!(matches!(err, LinkplayError::Response(_)));
    }

    #[test]
    fn certificate_errors_are_detected_in_source_chain() {
        #[derive(Debug)]
        struct Outer(std::io::Error);
        impl std::fmt::Display for Outer {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("error sending request")
            }
        }
        impl std::error::Error for Outer {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                Some(&self.0)
            }
        }

        let inner = std::io::Error::new(std::io::ErrorKind::Other, "certificate verify failed");
        assert!(mentions_certificate(&Outer(inner)));

        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(!mentions_certificate(&Outer(inner)));
    }
}

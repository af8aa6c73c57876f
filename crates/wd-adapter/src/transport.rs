//! HTTP transport for the WebDriver wire protocol.
//!
//! Every remote command is `verb + path + optional JSON body`; responses
//! arrive inside a `{"value": ...}` envelope, with errors carried as
//! `{"value": {"error": ..., "message": ...}}`. The [`WdTransport`] trait is
//! the seam tests use to substitute a scripted remote end.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::AdapterError;

/// HTTP verbs used by the WebDriver protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Delete,
}

/// A remote end that accepts WebDriver commands.
///
/// Implementations return the unwrapped `value` from the response envelope,
/// or [`AdapterError::Driver`] when the remote end reported an error payload.
#[async_trait]
pub trait WdTransport: Send + Sync {
    async fn execute(
        &self,
        verb: Verb,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, AdapterError>;

    /// Base URL this transport talks to, used for logging and retry decisions.
    fn base_url(&self) -> &Url;
}

/// Builds transports for a given base URL.
///
/// The factory indirection exists because session opening may retry against
/// a second URL (the legacy `/wd/hub` base path) and tests need to observe
/// which URLs were attempted.
pub trait TransportFactory: Send + Sync {
    fn transport(&self, base: Url) -> Result<Box<dyn WdTransport>, AdapterError>;
}

/// Production transport over reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(base: Url, timeout: Option<Duration>) -> Result<Self, AdapterError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Self { client, base })
    }

    fn join(&self, path: &str) -> Result<Url, AdapterError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| AdapterError::InvalidServer(self.base.to_string()))?;
            segments.pop_if_empty();
            for segment in path.trim_matches('/').split('/') {
                if !segment.is_empty() {
                    segments.push(segment);
                }
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl WdTransport for HttpTransport {
    async fn execute(
        &self,
        verb: Verb,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, AdapterError> {
        let url = self.join(path)?;
        let mut request = match verb {
            Verb::Get => self.client.get(url),
            Verb::Post => self.client.post(url),
            Verb::Delete => self.client.delete(url),
        };
        if verb == Verb::Post {
            // WebDriver requires a JSON body on every POST, even when empty.
            request = request.json(&body.unwrap_or_else(|| Value::Object(Default::default())));
        }

        let response = request.send().await?;
        let status = response.status();
        let payload: Value = match response.json().await {
            Ok(payload) => payload,
            Err(err) if status.is_success() => return Err(err.into()),
            Err(_) => {
                return Err(AdapterError::protocol(format!(
                    "HTTP {status} with non-JSON body from {path}"
                )))
            }
        };

        unwrap_envelope(status.as_u16(), payload, path)
    }

    fn base_url(&self) -> &Url {
        &self.base
    }
}

/// Default factory producing [`HttpTransport`] instances.
pub struct HttpTransportFactory {
    pub timeout: Option<Duration>,
}

impl TransportFactory for HttpTransportFactory {
    fn transport(&self, base: Url) -> Result<Box<dyn WdTransport>, AdapterError> {
        Ok(Box::new(HttpTransport::new(base, self.timeout)?))
    }
}

/// Unwrap the `{"value": ...}` envelope, converting error payloads into
/// [`AdapterError::Driver`].
pub fn unwrap_envelope(status: u16, payload: Value, path: &str) -> Result<Value, AdapterError> {
    let value = match payload {
        Value::Object(mut map) => map.remove("value").unwrap_or(Value::Null),
        other => other,
    };

    if let Value::Object(obj) = &value {
        if let Some(code) = obj.get("error").and_then(Value::as_str) {
            let message = obj
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or(code)
                .to_string();
            return Err(AdapterError::driver(code, message));
        }
    }
    if !(200..300).contains(&status) {
        return Err(AdapterError::protocol(format!(
            "HTTP {status} returned for {path}"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_success_unwraps_value() {
        let value = unwrap_envelope(200, json!({"value": {"sessionId": "abc"}}), "/session");
        assert_eq!(value.unwrap(), json!({"sessionId": "abc"}));
    }

    #[test]
    fn envelope_error_becomes_driver_error() {
        let err = unwrap_envelope(
            404,
            json!({"value": {"error": "no such element", "message": "not found"}}),
            "/session/x/element",
        )
        .unwrap_err();
        match err {
            AdapterError::Driver { code, message } => {
                assert_eq!(code, "no such element");
                assert_eq!(message, "not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn envelope_http_error_without_payload_is_protocol() {
        let err = unwrap_envelope(404, json!({"value": null}), "/session").unwrap_err();
        assert!(matches!(err, AdapterError::Protocol(_)));
    }

    #[test]
    fn path_join_keeps_base_path() {
        let transport = HttpTransport::new(
            Url::parse("http://host:4723/wd/hub").unwrap(),
            None,
        )
        .unwrap();
        let url = transport.join("/session/abc/url").unwrap();
        assert_eq!(url.as_str(), "http://host:4723/wd/hub/session/abc/url");
    }
}

//! The narrow seam between the statement client and whatever actually moves
//! bytes: a request/response pair, a JSON response envelope, and the
//! `HttpTransport` trait with its `reqwest` implementation.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::trace;
use url::Url;

pub use reqwest::Method;

/// An outbound request. Clonable so a retry loop can re-issue it.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub uri: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: Method, uri: Url) -> Self {
        Self {
            method,
            uri,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Appends a header. Repeated names produce repeated headers.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}

/// Response headers in arrival order, with case-insensitive name lookup.
#[derive(Debug, Clone, Default)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self(entries)
    }

    /// First value for `name`, if any.
    pub fn get<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.get_all(name).next()
    }

    /// All values for `name`, in arrival order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.0
            .iter()
            .filter(move |(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

/// A raw transport response: status line, headers, and the whole body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Body-less response view used for cancellation exchanges.
#[derive(Debug, Clone)]
pub struct StatusResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
}

impl StatusResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl From<HttpResponse> for StatusResponse {
    fn from(response: HttpResponse) -> Self {
        Self {
            status: response.status,
            reason: response.reason,
            headers: response.headers,
        }
    }
}

/// A response whose body was decoded as JSON into `T`, when possible.
///
/// The raw body and the decoding error are retained so protocol failures can
/// report what the server actually sent.
#[derive(Debug)]
pub struct JsonResponse<T> {
    status: u16,
    reason: String,
    headers: Headers,
    body: Vec<u8>,
    value: Option<T>,
    decode_error: Option<serde_json::Error>,
}

impl<T: DeserializeOwned> JsonResponse<T> {
    pub fn new(response: HttpResponse) -> Self {
        let (value, decode_error) = match serde_json::from_slice(&response.body) {
            Ok(value) => (Some(value), None),
            Err(error) => (None, Some(error)),
        };
        Self {
            status: response.status,
            reason: response.reason,
            headers: response.headers,
            body: response.body,
            value,
            decode_error,
        }
    }
}

impl<T> JsonResponse<T> {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// True iff the body decoded as a `T`.
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn decode_error(&self) -> Option<&serde_json::Error> {
        self.decode_error.as_ref()
    }

    /// Consumes the envelope, yielding the decoded value or handing the
    /// envelope back for error reporting.
    pub fn try_into_value(mut self) -> Result<T, Self> {
        match self.value.take() {
            Some(value) => Ok(value),
            None => Err(self),
        }
    }
}

/// A transport-level failure, before the protocol gets a say.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request task aborted")]
    Aborted,
}

/// Synchronous-in-spirit request execution. Implementations must be shareable
/// across threads; the client drives retries and detached requests itself.
#[async_trait]
pub trait HttpTransport: Send + Sync + fmt::Debug {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Handle to a request running detached from the caller.
#[derive(Debug)]
pub struct ResponseHandle {
    inner: JoinHandle<Result<HttpResponse, HttpError>>,
}

impl ResponseHandle {
    /// Waits up to `timeout` for the response. `Ok(None)` means the wait
    /// timed out; the request itself keeps running.
    pub async fn wait(self, timeout: Duration) -> Result<Option<StatusResponse>, HttpError> {
        match tokio::time::timeout(timeout, self.inner).await {
            Err(_elapsed) => Ok(None),
            Ok(Ok(Ok(response))) => Ok(Some(StatusResponse::from(response))),
            Ok(Ok(Err(error))) => Err(error),
            Ok(Err(_join_error)) => Err(HttpError::Aborted),
        }
    }

    pub fn abort(&self) {
        self.inner.abort();
    }
}

/// Fires a request without tying it to the caller; dropping the handle
/// leaves the request running to completion.
pub fn execute_detached(
    transport: &Arc<dyn HttpTransport>,
    request: HttpRequest,
) -> ResponseHandle {
    let transport = Arc::clone(transport);
    ResponseHandle {
        inner: tokio::spawn(async move { transport.execute(request).await }),
    }
}

/// `HttpTransport` over a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        trace!(method = %request.method, uri = %request.uri, "executing request");

        let mut builder = self
            .client
            .request(request.method.clone(), request.uri.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let reason = status.canonical_reason().unwrap_or_default().to_string();
        let headers = Headers::new(
            response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
        );
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status: status.as_u16(),
            reason,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    fn response(status: u16, headers: Vec<(String, String)>, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            reason: String::new(),
            headers: Headers::new(headers),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let headers = Headers::new(vec![
            ("X-Presto-Set-Session".to_string(), "a=1".to_string()),
            ("x-presto-set-session".to_string(), "b=2".to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ]);
        assert_eq!(headers.get("X-PRESTO-SET-SESSION"), Some("a=1"));
        assert_eq!(
            headers.get_all("x-presto-set-session").collect::<Vec<_>>(),
            vec!["a=1", "b=2"]
        );
        assert_eq!(headers.get("X-Missing"), None);
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        name: String,
    }

    #[test]
    fn envelope_decodes_json_bodies() {
        let envelope =
            JsonResponse::<Payload>::new(response(200, Vec::new(), r#"{"name":"ok"}"#));
        assert!(envelope.has_value());
        assert_eq!(
            envelope.value(),
            Some(&Payload {
                name: "ok".to_string()
            })
        );
    }

    #[test]
    fn envelope_retains_undecodable_bodies() {
        let envelope = JsonResponse::<Payload>::new(response(200, Vec::new(), "not json"));
        assert!(!envelope.has_value());
        assert!(envelope.decode_error().is_some());
        assert_eq!(envelope.body_text(), "not json");
        assert!(envelope.try_into_value().is_err());
    }

    #[test]
    fn status_response_success_is_2xx() {
        for (status, success) in [(200, true), (204, true), (299, true), (199, false), (500, false)]
        {
            let status_response = StatusResponse::from(response(status, Vec::new(), ""));
            assert_eq!(status_response.is_success(), success);
        }
    }
}

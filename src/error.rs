use std::sync::Arc;

use http::Method;
use thiserror::Error;

use crate::transport::{TransportError, TransportErrorKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimeoutPhase {
    Transport,
    Deadline,
}

impl std::fmt::Display for TimeoutPhase {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Transport => "transport",
            Self::Deadline => "deadline",
        };
        formatter.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    InvalidUri,
    RequestBuild,
    BodyNotAllowed,
    InvalidHeaderName,
    InvalidHeaderValue,
    SerializeJson,
    SerializeForm,
    Transport,
    Timeout,
    DeadlineExceeded,
    ReadBody,
    ResponseBodyTooLarge,
    Deserialize,
    BodyUnavailable,
    TlsBackendInit,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUri => "invalid_uri",
            Self::RequestBuild => "request_build",
            Self::BodyNotAllowed => "body_not_allowed",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::SerializeJson => "serialize_json",
            Self::SerializeForm => "serialize_form",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::ReadBody => "read_body",
            Self::ResponseBodyTooLarge => "response_body_too_large",
            Self::Deserialize => "deserialize",
            Self::BodyUnavailable => "body_unavailable",
            Self::TlsBackendInit => "tls_backend_init",
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid request uri: {uri}")]
    InvalidUri { uri: String },
    #[error("failed to build http request: {source}")]
    RequestBuild {
        #[source]
        source: http::Error,
    },
    #[error("Request with {method} method cannot have body")]
    BodyNotAllowed { method: Method, uri: String },
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("failed to serialize request json: {source}")]
    SerializeJson {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize request form: {source}")]
    SerializeForm {
        #[source]
        source: serde_urlencoded::ser::Error,
    },
    #[error("http transport error ({kind}) for {method} {uri}: {source}")]
    Transport {
        kind: TransportErrorKind,
        method: Method,
        uri: String,
        #[source]
        source: TransportError,
    },
    #[error("http request timed out in {phase} after {timeout_ms}ms for {method} {uri}")]
    Timeout {
        phase: TimeoutPhase,
        timeout_ms: u128,
        method: Method,
        uri: String,
    },
    #[error("http request deadline exceeded after {timeout_ms}ms for {method} {uri}")]
    DeadlineExceeded {
        timeout_ms: u128,
        method: Method,
        uri: String,
    },
    #[error("failed to read response body: {source}")]
    ReadBody {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("response body too large ({actual_bytes} bytes > {limit_bytes} bytes)")]
    ResponseBodyTooLarge {
        limit_bytes: usize,
        actual_bytes: usize,
    },
    #[error("failed to decode response json: {source}; body={body}")]
    Deserialize {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("response body is unavailable: {source}")]
    BodyUnavailable {
        #[source]
        source: Arc<Error>,
    },
    #[error("failed to initialize tls backend {backend}: {message}")]
    TlsBackendInit {
        backend: &'static str,
        message: String,
    },
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUri { .. } => ErrorCode::InvalidUri,
            Self::RequestBuild { .. } => ErrorCode::RequestBuild,
            Self::BodyNotAllowed { .. } => ErrorCode::BodyNotAllowed,
            Self::InvalidHeaderName { .. } => ErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::SerializeJson { .. } => ErrorCode::SerializeJson,
            Self::SerializeForm { .. } => ErrorCode::SerializeForm,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::DeadlineExceeded { .. } => ErrorCode::DeadlineExceeded,
            Self::ReadBody { .. } => ErrorCode::ReadBody,
            Self::ResponseBodyTooLarge { .. } => ErrorCode::ResponseBodyTooLarge,
            Self::Deserialize { .. } => ErrorCode::Deserialize,
            Self::BodyUnavailable { .. } => ErrorCode::BodyUnavailable,
            Self::TlsBackendInit { .. } => ErrorCode::TlsBackendInit,
        }
    }

    /// Short type-like name of the error, as reported in synthetic response bodies.
    pub fn name(&self) -> String {
        let name = match self {
            Self::InvalidUri { .. } => "InvalidUriError",
            Self::RequestBuild { .. } => "RequestBuildError",
            Self::BodyNotAllowed { .. } => "TypeError",
            Self::InvalidHeaderName { .. } | Self::InvalidHeaderValue { .. } => "HeaderError",
            Self::SerializeJson { .. } | Self::SerializeForm { .. } => "SerializeError",
            Self::Transport { source, .. } => return source.name().to_owned(),
            Self::Timeout { .. } | Self::DeadlineExceeded { .. } => "TimeoutError",
            Self::ReadBody { .. } | Self::ResponseBodyTooLarge { .. } => "ReadBodyError",
            Self::Deserialize { .. } => "SyntaxError",
            Self::BodyUnavailable { .. } => "BodyUnavailableError",
            Self::TlsBackendInit { .. } => "TlsError",
        };
        name.to_owned()
    }

    /// Human readable message. Transport failures report the transport's own message.
    pub fn message(&self) -> String {
        match self {
            Self::Transport { source, .. } => source.message().to_owned(),
            other => other.to_string(),
        }
    }

    /// Ordered `(name, value)` listing of everything this error records.
    ///
    /// The list always starts with `name`, `message` and `code`.
    pub fn properties(&self) -> Vec<(String, String)> {
        let mut properties = vec![
            ("name".to_owned(), self.name()),
            ("message".to_owned(), self.message()),
            ("code".to_owned(), self.code().as_str().to_owned()),
        ];
        let mut push = |name: &str, value: String| properties.push((name.to_owned(), value));
        match self {
            Self::InvalidUri { uri } => push("uri", uri.clone()),
            Self::BodyNotAllowed { method, uri } => {
                push("method", method.to_string());
                push("uri", uri.clone());
            }
            Self::InvalidHeaderName { name, .. } | Self::InvalidHeaderValue { name, .. } => {
                push("header", name.clone());
            }
            Self::Transport {
                kind,
                method,
                uri,
                source,
            } => {
                push("kind", kind.to_string());
                push("method", method.to_string());
                push("uri", uri.clone());
                for (name, value) in source.fields() {
                    push(name, value.clone());
                }
                if let Some(cause) = std::error::Error::source(source) {
                    push("cause", cause.to_string());
                }
            }
            Self::Timeout {
                phase,
                timeout_ms,
                method,
                uri,
            } => {
                push("phase", phase.to_string());
                push("timeout_ms", timeout_ms.to_string());
                push("method", method.to_string());
                push("uri", uri.clone());
            }
            Self::DeadlineExceeded {
                timeout_ms,
                method,
                uri,
            } => {
                push("timeout_ms", timeout_ms.to_string());
                push("method", method.to_string());
                push("uri", uri.clone());
            }
            Self::ResponseBodyTooLarge {
                limit_bytes,
                actual_bytes,
            } => {
                push("limit_bytes", limit_bytes.to_string());
                push("actual_bytes", actual_bytes.to_string());
            }
            Self::TlsBackendInit { backend, .. } => push("backend", (*backend).to_owned()),
            Self::RequestBuild { source } => push("cause", source.to_string()),
            Self::ReadBody { source } => push("cause", source.to_string()),
            Self::SerializeJson { source } => push("cause", source.to_string()),
            Self::SerializeForm { source } => push("cause", source.to_string()),
            Self::Deserialize { body, .. } => push("body", body.clone()),
            Self::BodyUnavailable { source } => push("cause", source.to_string()),
        }
        properties
    }

    pub(crate) fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

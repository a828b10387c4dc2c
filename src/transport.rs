//! The seam between the client and the network.
//!
//! A [`Transport`] executes one fully built request and hands back a response whose body can be
//! read exactly once. The client never touches sockets itself; [`crate::HyperTransport`] is the
//! bundled implementation and tests plug in scripted ones.

use std::convert::Infallible;
use std::error::Error as StdError;
use std::future::Future;

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};

pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

/// Single-shot response body handed back by a [`Transport`].
pub type ResponseBody = UnsyncBoxBody<Bytes, BoxError>;

/// Executes HTTP requests on behalf of a [`crate::Client`].
pub trait Transport: Send + Sync {
    /// Sends `request` and resolves once the response head is available.
    ///
    /// Rejections caused by a body on a method that forbids one should use
    /// [`TransportErrorKind::BodyNotAllowed`]; the client also recognizes the phrase
    /// `cannot have body` in the message of any other error.
    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<ResponseBody>, TransportError>> + Send;
}

impl<T> Transport for std::sync::Arc<T>
where
    T: Transport,
{
    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<ResponseBody>, TransportError>> + Send {
        (**self).execute(request)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    BodyNotAllowed,
    Dns,
    Connect,
    Tls,
    Read,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::BodyNotAllowed => "body_not_allowed",
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Read => "read",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

/// Failure reported by a [`Transport`].
///
/// Besides a kind and a message the error keeps a name and an ordered list of extra fields, all
/// of which end up in the body of the synthetic response built from it.
#[derive(Debug)]
pub struct TransportError {
    kind: TransportErrorKind,
    name: String,
    message: String,
    fields: Vec<(String, String)>,
    source: Option<BoxError>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            name: "TransportError".to_owned(),
            message: message.into(),
            fields: Vec::new(),
            source: None,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    pub fn body_not_allowed(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::BodyNotAllowed, message).with_name("TypeError")
    }

    pub fn from_source<E>(kind: TransportErrorKind, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let mut error = Self::new(kind, source.to_string());
        error.source = Some(Box::new(source));
        error
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.message)
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

fn map_infallible_to_box_error(never: Infallible) -> BoxError {
    match never {}
}

/// An empty [`ResponseBody`].
pub fn empty_body() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(map_infallible_to_box_error)
        .boxed_unsync()
}

/// A [`ResponseBody`] yielding `body` in one frame.
pub fn full_body(body: impl Into<Bytes>) -> ResponseBody {
    Full::new(body.into())
        .map_err(map_infallible_to_box_error)
        .boxed_unsync()
}

pub(crate) enum ReadBodyError {
    Read(BoxError),
    TooLarge { actual_bytes: usize },
}

/// Pulls frames from `body` into `collected` until the body ends.
///
/// Every chunk is appended as soon as its frame arrives, so dropping the future between frames
/// loses nothing and a later call continues where the previous one stopped.
pub(crate) async fn read_body_limited(
    body: &mut ResponseBody,
    collected: &mut Vec<u8>,
    max_bytes: usize,
) -> Result<(), ReadBodyError> {
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(ReadBodyError::Read)?;
        if let Some(data) = frame.data_ref() {
            let total_len = collected.len().saturating_add(data.len());
            if total_len > max_bytes {
                return Err(ReadBodyError::TooLarge {
                    actual_bytes: total_len,
                });
            }
            collected.extend_from_slice(data);
        }
    }
    Ok(())
}

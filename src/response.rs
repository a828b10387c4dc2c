use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_core::Stream;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, StatusCode, Version};
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex as AsyncMutex, OnceCell};
use tracing::debug;

use crate::Result;
use crate::SYNTHETIC_STATUS;
use crate::error::Error;
use crate::form::{FormData, decode_form};
use crate::provenance::Provenance;
use crate::transport::{ReadBodyError, ResponseBody, full_body, read_body_limited};
use crate::util::{decode_text_permissive, truncate_body};

const STREAM_CHUNK_SIZE: usize = 16 * 1024;

/// Reads a single-shot body once and keeps the result.
///
/// Readers take turns on an async lock around the transport body and the bytes collected so far.
/// A reader that is cancelled mid-read leaves both in place, so the next one resumes instead of
/// starting over. The first finished read, or failure, is kept for every later call.
struct BodyCache {
    read: AsyncMutex<BodyRead>,
    cached: OnceCell<std::result::Result<Bytes, Arc<Error>>>,
    max_bytes: usize,
}

struct BodyRead {
    source: ResponseBody,
    collected: Vec<u8>,
}

impl BodyCache {
    fn new(source: ResponseBody, max_bytes: usize) -> Self {
        Self {
            read: AsyncMutex::new(BodyRead {
                source,
                collected: Vec::new(),
            }),
            cached: OnceCell::new(),
            max_bytes: max_bytes.max(1),
        }
    }

    fn is_materialized(&self) -> bool {
        self.cached.initialized()
    }

    async fn materialize(&self) -> Result<Bytes> {
        if let Some(cached) = self.cached.get() {
            return Self::view(cached);
        }

        let mut read = self.read.lock().await;
        if let Some(cached) = self.cached.get() {
            return Self::view(cached);
        }

        let BodyRead { source, collected } = &mut *read;
        let outcome = match read_body_limited(source, collected, self.max_bytes).await {
            Ok(()) => {
                let body = Bytes::from(std::mem::take(collected));
                debug!(bytes = body.len(), "response body materialized");
                Ok(body)
            }
            Err(ReadBodyError::Read(source)) => Err(Arc::new(Error::ReadBody { source })),
            Err(ReadBodyError::TooLarge { actual_bytes }) => {
                Err(Arc::new(Error::ResponseBodyTooLarge {
                    limit_bytes: self.max_bytes,
                    actual_bytes,
                }))
            }
        };
        let cached = self.cached.get_or_init(|| async move { outcome }).await;
        Self::view(cached)
    }

    fn view(cached: &std::result::Result<Bytes, Arc<Error>>) -> Result<Bytes> {
        match cached {
            Ok(body) => Ok(body.clone()),
            Err(error) => Err(Error::BodyUnavailable {
                source: Arc::clone(error),
            }),
        }
    }
}

/// A response returned by [`crate::Client`].
///
/// The body is read from the transport on the first call to any body view and every later call,
/// of any view, is answered from that buffer. A body that failed to read keeps failing with
/// [`Error::BodyUnavailable`].
pub struct Response {
    status: StatusCode,
    status_text: Option<String>,
    version: Version,
    headers: HeaderMap,
    body: BodyCache,
    synthetic: bool,
    provenance: Option<Provenance>,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Response")
            .field("status", &self.status)
            .field("status_text", &self.status_text())
            .field("version", &self.version)
            .field("headers", &self.headers)
            .field("synthetic", &self.synthetic)
            .field("body_materialized", &self.body.is_materialized())
            .field("provenance", &self.provenance)
            .finish()
    }
}

impl Response {
    /// Builds a response around an in-memory body.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: None,
            version: Version::HTTP_11,
            headers,
            body: BodyCache::new(full_body(body), usize::MAX),
            synthetic: false,
            provenance: None,
        }
    }

    pub(crate) fn from_transport(response: http::Response<ResponseBody>, max_bytes: usize) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            status: parts.status,
            status_text: None,
            version: parts.version,
            headers: parts.headers,
            body: BodyCache::new(body, max_bytes),
            synthetic: false,
            provenance: None,
        }
    }

    /// The `569` response standing in for a request that could not be completed.
    pub(crate) fn synthetic(error: &Error) -> Self {
        let body = error
            .properties()
            .into_iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join("\n");
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        let status = StatusCode::from_u16(SYNTHETIC_STATUS).unwrap_or(StatusCode::BAD_GATEWAY);
        let mut response = Self::new(status, headers, body);
        response.status_text = Some(error.message());
        response.synthetic = true;
        response
    }

    pub(crate) fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Reason phrase. Synthetic responses report the error message here.
    pub fn status_text(&self) -> &str {
        match &self.status_text {
            Some(text) => text,
            None => self.status.canonical_reason().unwrap_or(""),
        }
    }

    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// `true` when the client built this response itself after an unrecoverable failure.
    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    pub fn provenance(&self) -> Option<&Provenance> {
        self.provenance.as_ref()
    }

    /// Whether the body has already been pulled from the transport.
    pub fn is_materialized(&self) -> bool {
        self.body.is_materialized()
    }

    pub async fn bytes(&self) -> Result<Bytes> {
        self.body.materialize().await
    }

    pub async fn array_buffer(&self) -> Result<Vec<u8>> {
        Ok(self.body.materialize().await?.to_vec())
    }

    pub async fn blob(&self) -> Result<Blob> {
        let bytes = self.body.materialize().await?;
        Ok(Blob {
            bytes,
            content_type: self.content_type().map(ToOwned::to_owned),
        })
    }

    /// UTF-8 text of the body. Invalid UTF-8 is mapped byte for byte instead of failing.
    pub async fn text(&self) -> Result<String> {
        let bytes = self.body.materialize().await?;
        Ok(decode_text_permissive(&bytes))
    }

    pub async fn json<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let text = self.text().await?;
        serde_json::from_str(&text).map_err(|source| Error::Deserialize {
            source,
            body: truncate_body(text.as_bytes()),
        })
    }

    /// Best-effort form decoding; never fails on content that is not a form.
    pub async fn form_data(&self) -> Result<FormData> {
        let text = self.text().await?;
        Ok(decode_form(self.content_type(), &text))
    }

    /// A fresh stream over the body. Every call starts from the first byte.
    pub async fn stream(&self) -> Result<BodyStream> {
        let bytes = self.body.materialize().await?;
        Ok(BodyStream::new(bytes))
    }

    pub async fn body(&self) -> Result<BodyStream> {
        self.stream().await
    }
}

/// Immutable binary snapshot of a response body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    bytes: Bytes,
    content_type: Option<String>,
}

impl Blob {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    pub fn text(&self) -> String {
        decode_text_permissive(&self.bytes)
    }
}

/// Chunked stream over a cached body.
#[derive(Clone, Debug)]
pub struct BodyStream {
    remaining: Bytes,
    chunk_size: usize,
}

impl BodyStream {
    fn new(bytes: Bytes) -> Self {
        Self {
            remaining: bytes,
            chunk_size: STREAM_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }
}

impl Stream for BodyStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.remaining.is_empty() {
            return Poll::Ready(None);
        }
        let take = self.chunk_size.min(self.remaining.len());
        let chunk = self.remaining.split_to(take);
        Poll::Ready(Some(Ok(chunk)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let chunks = self.remaining.len().div_ceil(self.chunk_size);
        (chunks, Some(chunks))
    }
}

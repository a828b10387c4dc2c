use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Request, Uri};
use serde::Serialize;

use crate::Result;
use crate::client::Client;
use crate::error::Error;
use crate::recovery::RecoveryPolicy;
use crate::response::Response;
use crate::transport::Transport;
use crate::util::{parse_header_name, parse_header_value};

/// Per-call settings: method, headers, body and per-request overrides.
#[derive(Clone, Debug)]
pub struct RequestOptions {
    method: Method,
    headers: HeaderMap,
    body: Option<Bytes>,
    timeout: Option<Duration>,
    recovery_policy: Option<RecoveryPolicy>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            recovery_policy: None,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn try_with_header(self, name: &str, value: &str) -> Result<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.with_header(name, value))
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_json<T>(self, payload: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(payload).map_err(|source| Error::SerializeJson { source })?;
        Ok(self
            .with_body(body)
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json")))
    }

    pub fn with_form<T>(self, payload: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let encoded =
            serde_urlencoded::to_string(payload).map_err(|source| Error::SerializeForm { source })?;
        Ok(self.with_body(encoded).with_header(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        ))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout.max(Duration::from_millis(1)));
        self
    }

    pub fn with_recovery_policy(mut self, recovery_policy: RecoveryPolicy) -> Self {
        self.recovery_policy = Some(recovery_policy);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn recovery_policy(&self) -> Option<&RecoveryPolicy> {
        self.recovery_policy.as_ref()
    }

    pub(crate) fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub(crate) fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub(crate) fn take_body(&mut self) -> Option<Bytes> {
        self.body.take()
    }
}

/// A target plus the options it is sent with.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
    target: String,
    options: RequestOptions,
}

impl RequestDescriptor {
    pub fn new(target: impl Into<String>, options: RequestOptions) -> Self {
        Self {
            target: target.into(),
            options,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn method(&self) -> &Method {
        &self.options.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.options.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.options.body.as_ref()
    }

    pub(crate) fn options_mut(&mut self) -> &mut RequestOptions {
        &mut self.options
    }
}

pub(crate) fn method_forbids_body(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

/// Builds the request handed to the transport.
///
/// With `strict_bodies` set, a body on `GET` or `HEAD` is refused with
/// [`Error::BodyNotAllowed`] before anything is sent.
pub(crate) fn build_http_request(
    descriptor: &RequestDescriptor,
    default_headers: &HeaderMap,
    strict_bodies: bool,
) -> Result<Request<Bytes>> {
    let uri: Uri = descriptor
        .target
        .parse()
        .map_err(|_| Error::InvalidUri {
            uri: descriptor.target.clone(),
        })?;
    if uri.scheme().is_none() || uri.authority().is_none() {
        return Err(Error::InvalidUri {
            uri: descriptor.target.clone(),
        });
    }

    let method = descriptor.options.method.clone();
    if strict_bodies && descriptor.options.body.is_some() && method_forbids_body(&method) {
        return Err(Error::BodyNotAllowed {
            method,
            uri: descriptor.target.clone(),
        });
    }

    let headers = crate::util::merge_headers(default_headers, &descriptor.options.headers);
    let mut request_builder = Request::builder().method(method).uri(uri);
    for (name, value) in &headers {
        request_builder = request_builder.header(name, value);
    }
    request_builder
        .body(descriptor.options.body.clone().unwrap_or_default())
        .map_err(|source| Error::RequestBuild { source })
}

/// Fluent form of [`Client::send`], returned by [`Client::get`] and friends.
pub struct RequestBuilder<'a, T> {
    client: &'a Client<T>,
    target: String,
    options: RequestOptions,
}

impl<'a, T> RequestBuilder<'a, T>
where
    T: Transport,
{
    pub(crate) fn new(client: &'a Client<T>, method: Method, target: String) -> Self {
        Self {
            client,
            target,
            options: RequestOptions::new(method),
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.options = self.options.with_header(name, value);
        self
    }

    pub fn try_header(mut self, name: &str, value: &str) -> Result<Self> {
        self.options = self.options.try_with_header(name, value)?;
        Ok(self)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.options = self.options.with_body(body);
        self
    }

    pub fn json<P>(mut self, payload: &P) -> Result<Self>
    where
        P: Serialize + ?Sized,
    {
        self.options = self.options.with_json(payload)?;
        Ok(self)
    }

    pub fn form<P>(mut self, payload: &P) -> Result<Self>
    where
        P: Serialize + ?Sized,
    {
        self.options = self.options.with_form(payload)?;
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_timeout(timeout);
        self
    }

    pub fn recovery_policy(mut self, recovery_policy: RecoveryPolicy) -> Self {
        self.options = self.options.with_recovery_policy(recovery_policy);
        self
    }

    pub async fn send(self) -> Response {
        self.client.send(self.target, self.options).await
    }
}

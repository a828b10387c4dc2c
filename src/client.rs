use std::time::{Duration, Instant};

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use tokio::time::timeout;
use tracing::{Instrument, debug, info_span, warn};

use crate::error::{Error, TimeoutPhase};
use crate::hyper_transport::HyperTransport;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::provenance::{AttemptOutcome, AttemptRecord, CallArguments, Provenance};
use crate::recovery::{AttemptStage, RecoveryPolicy, classify_attempt_error};
use crate::request::{RequestBuilder, RequestDescriptor, RequestOptions, build_http_request};
use crate::response::Response;
use crate::transport::Transport;
use crate::util::{
    deadline_exceeded_error, parse_header_name, parse_header_value, phase_timeout,
    redact_uri_for_logs,
};
use crate::{Result, SYNTHETIC_STATUS};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CLIENT_NAME: &str = "refetch";
const DEFAULT_MAX_RESPONSE_BODY_BYTES: usize = 8 * 1024 * 1024;

pub struct ClientBuilder<T> {
    transport: T,
    client_name: String,
    default_headers: HeaderMap,
    request_timeout: Duration,
    total_timeout: Option<Duration>,
    max_response_body_bytes: usize,
    strict_request_bodies: bool,
    recovery_policy: RecoveryPolicy,
}

impl<T> ClientBuilder<T>
where
    T: Transport,
{
    fn new(transport: T) -> Self {
        Self {
            transport,
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
            default_headers: HeaderMap::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            total_timeout: None,
            max_response_body_bytes: DEFAULT_MAX_RESPONSE_BODY_BYTES,
            strict_request_bodies: true,
            recovery_policy: RecoveryPolicy::standard(),
        }
    }

    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    pub fn try_default_header(self, name: &str, value: &str) -> Result<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.default_header(name, value))
    }

    /// Upper bound for a single transport call.
    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout.max(Duration::from_millis(1));
        self
    }

    /// Deadline shared by every attempt of one `send`.
    pub fn total_timeout(mut self, total_timeout: Duration) -> Self {
        self.total_timeout = Some(total_timeout.max(Duration::from_millis(1)));
        self
    }

    pub fn max_response_body_bytes(mut self, max_response_body_bytes: usize) -> Self {
        self.max_response_body_bytes = max_response_body_bytes.max(1);
        self
    }

    /// Refuse to build `GET`/`HEAD` requests that carry a body, the way a fetch `Request`
    /// constructor does. The refusal enters the recovery ladder like a transport rejection.
    pub fn strict_request_bodies(mut self, strict: bool) -> Self {
        self.strict_request_bodies = strict;
        self
    }

    pub fn recovery_policy(mut self, recovery_policy: RecoveryPolicy) -> Self {
        self.recovery_policy = recovery_policy;
        self
    }

    pub fn build(self) -> Client<T> {
        Client {
            transport: self.transport,
            client_name: self.client_name,
            default_headers: self.default_headers,
            request_timeout: self.request_timeout,
            total_timeout: self.total_timeout,
            max_response_body_bytes: self.max_response_body_bytes,
            strict_request_bodies: self.strict_request_bodies,
            recovery_policy: self.recovery_policy,
            metrics: Metrics::default(),
        }
    }
}

/// Request orchestrator over an injected [`Transport`].
///
/// [`Client::send`] always resolves to a [`Response`]; see the crate docs for the recovery
/// ladder and the synthetic `569` responses.
#[derive(Clone)]
pub struct Client<T> {
    transport: T,
    client_name: String,
    default_headers: HeaderMap,
    request_timeout: Duration,
    total_timeout: Option<Duration>,
    max_response_body_bytes: usize,
    strict_request_bodies: bool,
    recovery_policy: RecoveryPolicy,
    metrics: Metrics,
}

impl Client<HyperTransport> {
    /// Client over the bundled hyper transport with default settings.
    pub fn with_hyper() -> Result<Self> {
        Ok(Self::new(HyperTransport::new()?))
    }
}

impl<T> Client<T>
where
    T: Transport,
{
    pub fn builder(transport: T) -> ClientBuilder<T> {
        ClientBuilder::new(transport)
    }

    pub fn new(transport: T) -> Self {
        Self::builder(transport).build()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn request(&self, method: Method, target: impl Into<String>) -> RequestBuilder<'_, T> {
        RequestBuilder::new(self, method, target.into())
    }

    pub fn get(&self, target: impl Into<String>) -> RequestBuilder<'_, T> {
        self.request(Method::GET, target)
    }

    pub fn head(&self, target: impl Into<String>) -> RequestBuilder<'_, T> {
        self.request(Method::HEAD, target)
    }

    pub fn post(&self, target: impl Into<String>) -> RequestBuilder<'_, T> {
        self.request(Method::POST, target)
    }

    pub fn put(&self, target: impl Into<String>) -> RequestBuilder<'_, T> {
        self.request(Method::PUT, target)
    }

    pub fn patch(&self, target: impl Into<String>) -> RequestBuilder<'_, T> {
        self.request(Method::PATCH, target)
    }

    pub fn delete(&self, target: impl Into<String>) -> RequestBuilder<'_, T> {
        self.request(Method::DELETE, target)
    }

    /// Sends `options` to `target`, repairing body placement when needed.
    ///
    /// Never fails. Unrecoverable errors come back as a synthetic response with status `569`.
    pub async fn send(&self, target: impl Into<String>, options: RequestOptions) -> Response {
        self.send_descriptor(RequestDescriptor::new(target, options))
            .await
    }

    pub async fn send_descriptor(&self, original: RequestDescriptor) -> Response {
        let call = CallArguments::new(original.target().to_owned(), original.options().clone());
        let _in_flight = self.metrics.record_request_started();
        let recovery_policy = original
            .options()
            .recovery_policy()
            .cloned()
            .unwrap_or_else(|| self.recovery_policy.clone());
        let per_attempt_timeout = original
            .options()
            .timeout()
            .unwrap_or(self.request_timeout);
        let redacted_uri = redact_uri_for_logs(original.target());
        let request_started_at = Instant::now();
        let mut attempts = Vec::with_capacity(3);
        let mut stage = AttemptStage::AsGiven;

        loop {
            let descriptor = recovery_policy.descriptor_for_stage(&original, stage);
            let span = info_span!(
                "refetch.attempt",
                client = %self.client_name,
                method = %descriptor.method(),
                uri = %redacted_uri,
                attempt = stage.attempt_number(),
                stage = %stage
            );
            let attempt_started = Instant::now();
            let result = self
                .execute_attempt(
                    stage,
                    &descriptor,
                    &redacted_uri,
                    per_attempt_timeout,
                    request_started_at,
                )
                .instrument(span.clone())
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    attempts.push(AttemptRecord::new(
                        stage,
                        descriptor.method().clone(),
                        AttemptOutcome::Responded { status },
                        attempt_started.elapsed(),
                    ));
                    if let Some(next) = recovery_policy.next_stage_after_status(stage, status) {
                        span.in_scope(|| {
                            warn!(
                                status = status.as_u16(),
                                next_stage = %next,
                                "retrying request without body after method not allowed"
                            );
                        });
                        // Drained so the connection can go back to the pool.
                        if let Err(error) = response.bytes().instrument(span.clone()).await {
                            span.in_scope(|| {
                                debug!(error = %error, "discarding unreadable 405 body");
                            });
                        }
                        stage = next;
                        continue;
                    }
                    self.metrics.record_status(status.as_u16());
                    return response.with_provenance(Provenance::new(call, descriptor, attempts));
                }
                Err(error) => {
                    attempts.push(AttemptRecord::new(
                        stage,
                        descriptor.method().clone(),
                        AttemptOutcome::Failed {
                            code: error.code().as_str(),
                            message: error.message(),
                        },
                        attempt_started.elapsed(),
                    ));
                    let failure = classify_attempt_error(&error);
                    if let Some(next) = recovery_policy.next_stage_after_error(stage, failure) {
                        span.in_scope(|| {
                            warn!(
                                error = %error,
                                next_stage = %next,
                                "retrying request as POST after body was rejected"
                            );
                        });
                        stage = next;
                        continue;
                    }
                    span.in_scope(|| {
                        warn!(
                            error = %error,
                            code = error.code().as_str(),
                            "request failed; returning synthetic response"
                        );
                    });
                    self.metrics.record_synthesized(error.code().as_str());
                    self.metrics.record_status(SYNTHETIC_STATUS);
                    return Response::synthetic(&error)
                        .with_provenance(Provenance::new(call, descriptor, attempts));
                }
            }
        }
    }

    async fn execute_attempt(
        &self,
        stage: AttemptStage,
        descriptor: &RequestDescriptor,
        redacted_uri: &str,
        per_attempt_timeout: Duration,
        request_started_at: Instant,
    ) -> Result<Response> {
        let request = build_http_request(
            descriptor,
            &self.default_headers,
            self.strict_request_bodies,
        )?;
        let method = descriptor.method();
        let Some(transport_timeout) =
            phase_timeout(per_attempt_timeout, self.total_timeout, request_started_at)
        else {
            return Err(deadline_exceeded_error(
                self.total_timeout,
                method,
                redacted_uri,
            ));
        };

        self.metrics.record_attempt(stage);
        debug!("sending request");
        let started = Instant::now();
        match timeout(transport_timeout, self.transport.execute(request)).await {
            Ok(Ok(response)) => {
                debug!(
                    status = response.status().as_u16(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "attempt completed"
                );
                Ok(Response::from_transport(
                    response,
                    self.max_response_body_bytes,
                ))
            }
            Ok(Err(source)) => Err(Error::Transport {
                kind: source.kind(),
                method: method.clone(),
                uri: redacted_uri.to_owned(),
                source,
            }),
            Err(_) => {
                let phase = if transport_timeout < per_attempt_timeout {
                    TimeoutPhase::Deadline
                } else {
                    TimeoutPhase::Transport
                };
                Err(Error::Timeout {
                    phase,
                    timeout_ms: transport_timeout.as_millis(),
                    method: method.clone(),
                    uri: redacted_uri.to_owned(),
                })
            }
        }
    }
}

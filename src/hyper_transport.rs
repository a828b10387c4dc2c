use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
#[cfg(feature = "tls-rustls-ring")]
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use crate::Result;
#[cfg(feature = "tls-rustls-ring")]
use crate::error::Error;
use crate::transport::{BoxError, ResponseBody, Transport, TransportError, TransportErrorKind};

const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 8;

#[cfg(feature = "tls-rustls-ring")]
type Connector = hyper_rustls::HttpsConnector<HttpConnector>;
#[cfg(not(feature = "tls-rustls-ring"))]
type Connector = HttpConnector;

/// [`Transport`] over `hyper-util`'s pooled client.
///
/// With the `tls-rustls-ring` feature both `http` and `https` targets are served; without it only
/// plain `http`.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<Connector, Full<Bytes>>,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("HyperTransport").finish_non_exhaustive()
    }
}

impl HyperTransport {
    pub fn new() -> Result<Self> {
        Self::with_pool(DEFAULT_POOL_IDLE_TIMEOUT, DEFAULT_POOL_MAX_IDLE_PER_HOST)
    }

    pub fn with_pool(pool_idle_timeout: Duration, pool_max_idle_per_host: usize) -> Result<Self> {
        let connector = build_connector()?;
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(pool_idle_timeout)
            .pool_max_idle_per_host(pool_max_idle_per_host)
            .build(connector);
        Ok(Self { client })
    }
}

#[cfg(feature = "tls-rustls-ring")]
fn build_connector() -> Result<Connector> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    let https = HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
        .map_err(|source| Error::TlsBackendInit {
            backend: "tls-rustls-ring",
            message: source.to_string(),
        })?
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(http);
    Ok(https)
}

#[cfg(not(feature = "tls-rustls-ring"))]
fn build_connector() -> Result<Connector> {
    Ok(HttpConnector::new())
}

impl Transport for HyperTransport {
    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = std::result::Result<Response<ResponseBody>, TransportError>> + Send
    {
        let request = request.map(Full::new);
        let client = self.client.clone();
        async move {
            let response: Response<Incoming> =
                client.request(request).await.map_err(|source| {
                    let kind = classify_transport_error(&source);
                    TransportError::from_source(kind, source)
                })?;
            Ok(response.map(|body| {
                body.map_err(|source| Box::new(source) as BoxError)
                    .boxed_unsync()
            }))
        }
    }
}

fn classify_transport_error(error: &hyper_util::client::legacy::Error) -> TransportErrorKind {
    let text = error.to_string().to_ascii_lowercase();
    if error.is_connect() {
        if text.contains("dns")
            || text.contains("name or service not known")
            || text.contains("failed to lookup address")
        {
            return TransportErrorKind::Dns;
        }
        if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
            return TransportErrorKind::Tls;
        }
        return TransportErrorKind::Connect;
    }

    if text.contains("read")
        || text.contains("connection reset")
        || text.contains("broken pipe")
        || text.contains("unexpected eof")
    {
        return TransportErrorKind::Read;
    }

    TransportErrorKind::Other
}

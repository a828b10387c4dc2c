//! `refetch` is a resilient HTTP request orchestrator with a repeatable response body cache.
//!
//! A [`Client`] wraps any [`Transport`] and never fails: a request either resolves to the
//! origin's response, to the response of a repaired retry, or to a synthetic response with the
//! sentinel status `569` describing the failure. Every returned [`Response`] reads its body from
//! the transport at most once and serves text, JSON, bytes, blob, stream and form views from
//! that single buffer.
//!
//! # Quick Start
//!
//! ```no_run
//! use refetch::prelude::{Client, RequestOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::with_hyper()?;
//!
//!     // A body on GET is repaired transparently: POST first, then GET with the body in a header.
//!     let response = client
//!         .send(
//!             "https://api.example.com/search",
//!             RequestOptions::get().with_body(r#"{"q":"rust"}"#),
//!         )
//!         .await;
//!
//!     println!("status={} synthetic={}", response.status(), response.is_synthetic());
//!     println!("text={}", response.text().await?);
//!     let value: serde_json::Value = response.json().await?;
//!     println!("json={value}");
//!     Ok(())
//! }
//! ```
//!
//! # Recovery Ladder
//!
//! 1. The request is sent as given.
//! 2. If the body was rejected for the method, it is sent again as `POST` with the original
//!    method in a `method` header.
//! 3. If that returns `405`, it is sent with the original method, no body, and the body in a
//!    `body` header.
//!
//! Any other failure becomes a `569` response whose body lists the error's properties.

/// Header carrying the caller's original method when the request is re-sent as `POST`.
pub const METHOD_HEADER: &str = "method";
/// Header carrying the stripped request body on the final recovery attempt.
pub const BODY_HEADER: &str = "body";
/// Status code reserved for responses synthesized by the client itself.
pub const SYNTHETIC_STATUS: u16 = 569;

mod client;
mod error;
mod form;
mod hyper_transport;
mod metrics;
mod provenance;
mod recovery;
mod request;
mod response;
mod transport;
mod util;

pub use crate::client::{Client, ClientBuilder};
pub use crate::error::{Error, ErrorCode, TimeoutPhase};
pub use crate::form::FormData;
pub use crate::hyper_transport::HyperTransport;
pub use crate::metrics::MetricsSnapshot;
pub use crate::provenance::{AttemptOutcome, AttemptRecord, CallArguments, Provenance};
pub use crate::recovery::{AttemptStage, RecoveryPolicy};
pub use crate::request::{RequestBuilder, RequestDescriptor, RequestOptions};
pub use crate::response::{Blob, BodyStream, Response};
pub use crate::transport::{
    ResponseBody, Transport, TransportError, TransportErrorKind, empty_body, full_body,
};

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        AttemptOutcome, AttemptStage, Blob, BodyStream, Client, ClientBuilder, Error, ErrorCode,
        FormData, HyperTransport, MetricsSnapshot, Provenance, RecoveryPolicy, RequestBuilder,
        RequestDescriptor, RequestOptions, Response, Result, Transport, TransportError,
        TransportErrorKind,
    };
}

#[cfg(test)]
mod tests;

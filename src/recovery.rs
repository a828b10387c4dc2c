use http::header::HeaderName;
use http::{Method, StatusCode};
use tracing::warn;

use crate::error::Error;
use crate::request::RequestDescriptor;
use crate::transport::TransportErrorKind;
use crate::util::{header_value_from_bytes, parse_header_value};
use crate::{BODY_HEADER, METHOD_HEADER};

const BODY_NOT_ALLOWED_PHRASE: &str = "cannot have body";

/// Position of an attempt on the recovery ladder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttemptStage {
    /// The request exactly as the caller described it.
    AsGiven,
    /// Re-sent as `POST` after the body was rejected for the original method.
    ForcePost,
    /// Original method, body removed, after the `POST` came back `405`.
    StripBody,
}

impl AttemptStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AsGiven => "as_given",
            Self::ForcePost => "force_post",
            Self::StripBody => "strip_body",
        }
    }

    pub const fn attempt_number(self) -> usize {
        match self {
            Self::AsGiven => 1,
            Self::ForcePost => 2,
            Self::StripBody => 3,
        }
    }
}

impl std::fmt::Display for AttemptStage {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Which repairs the client may apply to a request before giving up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveryPolicy {
    method_override: bool,
    strip_body_on_405: bool,
    stash_original_method: bool,
    stash_body: bool,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl RecoveryPolicy {
    pub const fn standard() -> Self {
        Self {
            method_override: true,
            strip_body_on_405: true,
            stash_original_method: true,
            stash_body: true,
        }
    }

    /// One attempt only. Failures are still turned into synthetic responses.
    pub const fn disabled() -> Self {
        Self {
            method_override: false,
            strip_body_on_405: false,
            stash_original_method: false,
            stash_body: false,
        }
    }

    pub const fn method_override(mut self, enabled: bool) -> Self {
        self.method_override = enabled;
        self
    }

    pub const fn strip_body_on_405(mut self, enabled: bool) -> Self {
        self.strip_body_on_405 = enabled;
        self
    }

    pub const fn stash_original_method(mut self, enabled: bool) -> Self {
        self.stash_original_method = enabled;
        self
    }

    pub const fn stash_body(mut self, enabled: bool) -> Self {
        self.stash_body = enabled;
        self
    }

    pub const fn method_override_enabled(&self) -> bool {
        self.method_override
    }

    pub const fn strip_body_on_405_enabled(&self) -> bool {
        self.strip_body_on_405
    }

    pub(crate) fn next_stage_after_error(
        &self,
        stage: AttemptStage,
        failure: AttemptFailure,
    ) -> Option<AttemptStage> {
        match (stage, failure) {
            (AttemptStage::AsGiven, AttemptFailure::BodyNotAllowed) if self.method_override => {
                Some(AttemptStage::ForcePost)
            }
            _ => None,
        }
    }

    pub(crate) fn next_stage_after_status(
        &self,
        stage: AttemptStage,
        status: StatusCode,
    ) -> Option<AttemptStage> {
        match stage {
            AttemptStage::ForcePost
                if status == StatusCode::METHOD_NOT_ALLOWED && self.strip_body_on_405 =>
            {
                Some(AttemptStage::StripBody)
            }
            _ => None,
        }
    }

    /// Descriptor for `stage`, always derived from the caller's original descriptor.
    pub(crate) fn descriptor_for_stage(
        &self,
        original: &RequestDescriptor,
        stage: AttemptStage,
    ) -> RequestDescriptor {
        match stage {
            AttemptStage::AsGiven => original.clone(),
            AttemptStage::ForcePost => self.force_post(original),
            AttemptStage::StripBody => self.strip_body(original),
        }
    }

    fn force_post(&self, original: &RequestDescriptor) -> RequestDescriptor {
        let mut descriptor = original.clone();
        let original_method = original.method().clone();
        let options = descriptor.options_mut();
        options.set_method(Method::POST);
        if self.stash_original_method {
            match parse_header_value(METHOD_HEADER, original_method.as_str()) {
                Ok(value) => {
                    options
                        .headers_mut()
                        .insert(HeaderName::from_static(METHOD_HEADER), value);
                }
                Err(error) => {
                    warn!(error = %error, "could not record original method in request header");
                }
            }
        }
        descriptor
    }

    fn strip_body(&self, original: &RequestDescriptor) -> RequestDescriptor {
        let mut descriptor = original.clone();
        let options = descriptor.options_mut();
        let Some(body) = options.take_body() else {
            return descriptor;
        };
        if self.stash_body {
            match header_value_from_bytes(BODY_HEADER, &body) {
                Ok(value) => {
                    options
                        .headers_mut()
                        .insert(HeaderName::from_static(BODY_HEADER), value);
                }
                Err(error) => {
                    warn!(
                        error = %error,
                        body_len = body.len(),
                        "could not move request body into header; sending without it"
                    );
                }
            }
        }
        descriptor
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AttemptFailure {
    BodyNotAllowed,
    Unclassified,
}

/// Decides whether a failed attempt was a rejected body on a body-less method.
///
/// Structured signals win: the request-construction error and
/// [`TransportErrorKind::BodyNotAllowed`]. Otherwise the error text is searched for the phrase
/// `cannot have body`, ignoring case.
pub(crate) fn classify_attempt_error(error: &Error) -> AttemptFailure {
    if matches!(error, Error::BodyNotAllowed { .. })
        || error.transport_kind() == Some(TransportErrorKind::BodyNotAllowed)
    {
        return AttemptFailure::BodyNotAllowed;
    }

    let message = error.message().to_ascii_lowercase();
    if message.contains(BODY_NOT_ALLOWED_PHRASE) {
        return AttemptFailure::BodyNotAllowed;
    }
    AttemptFailure::Unclassified
}

//! Diagnostic annotations attached to every response the client returns.
//!
//! Nothing in the client reads these back; they exist so a caller can see what was asked for,
//! what was finally sent, and how each attempt ended.

use std::time::Duration;

use http::{Method, StatusCode};

use crate::recovery::AttemptStage;
use crate::request::{RequestDescriptor, RequestOptions};

/// The arguments of the original `send` call.
#[derive(Clone, Debug)]
pub struct CallArguments {
    target: String,
    options: RequestOptions,
}

impl CallArguments {
    pub(crate) fn new(target: String, options: RequestOptions) -> Self {
        Self { target, options }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }
}

/// How an attempt settled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    Responded { status: StatusCode },
    Failed { code: &'static str, message: String },
}

impl AttemptOutcome {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Responded { status } => Some(*status),
            Self::Failed { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Clone, Debug)]
pub struct AttemptRecord {
    stage: AttemptStage,
    method: Method,
    outcome: AttemptOutcome,
    elapsed: Duration,
}

impl AttemptRecord {
    pub(crate) fn new(
        stage: AttemptStage,
        method: Method,
        outcome: AttemptOutcome,
        elapsed: Duration,
    ) -> Self {
        Self {
            stage,
            method,
            outcome,
            elapsed,
        }
    }

    pub fn stage(&self) -> AttemptStage {
        self.stage
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn outcome(&self) -> &AttemptOutcome {
        &self.outcome
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

#[derive(Clone, Debug)]
pub struct Provenance {
    call: CallArguments,
    sent: RequestDescriptor,
    attempts: Vec<AttemptRecord>,
}

impl Provenance {
    pub(crate) fn new(
        call: CallArguments,
        sent: RequestDescriptor,
        attempts: Vec<AttemptRecord>,
    ) -> Self {
        Self {
            call,
            sent,
            attempts,
        }
    }

    /// What the caller passed to `send`.
    pub fn call(&self) -> &CallArguments {
        &self.call
    }

    /// The descriptor of the final attempt.
    pub fn sent(&self) -> &RequestDescriptor {
        &self.sent
    }

    /// How the final attempt settled.
    pub fn outcome(&self) -> Option<&AttemptOutcome> {
        self.attempts.last().map(AttemptRecord::outcome)
    }

    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    pub fn final_stage(&self) -> Option<AttemptStage> {
        self.attempts.last().map(AttemptRecord::stage)
    }
}

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::recovery::AttemptStage;
use crate::util::lock_unpoisoned;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Calls to `send`.
    pub requests: u64,
    /// Requests handed to the transport. Requests refused while being built are not counted.
    pub attempts: u64,
    /// Transport calls made as `POST` after a rejected body.
    pub method_override_retries: u64,
    /// Transport calls made without a body after a `405`.
    pub body_strip_retries: u64,
    pub synthesized_errors: u64,
    pub in_flight: u64,
    pub status_counts: BTreeMap<u16, u64>,
    pub error_counts: BTreeMap<String, u64>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    requests: AtomicU64,
    attempts: AtomicU64,
    method_override_retries: AtomicU64,
    body_strip_retries: AtomicU64,
    synthesized_errors: AtomicU64,
    in_flight: AtomicU64,
    status_counts: Mutex<BTreeMap<u16, u64>>,
    error_counts: Mutex<BTreeMap<String, u64>>,
}

pub(crate) struct InFlightGuard {
    metrics: Metrics,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.inner.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Metrics {
    pub(crate) fn record_request_started(&self) -> InFlightGuard {
        self.inner.requests.fetch_add(1, Ordering::Relaxed);
        self.inner.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            metrics: self.clone(),
        }
    }

    pub(crate) fn record_attempt(&self, stage: AttemptStage) {
        self.inner.attempts.fetch_add(1, Ordering::Relaxed);
        match stage {
            AttemptStage::AsGiven => {}
            AttemptStage::ForcePost => {
                self.inner
                    .method_override_retries
                    .fetch_add(1, Ordering::Relaxed);
            }
            AttemptStage::StripBody => {
                self.inner.body_strip_retries.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn record_status(&self, status: u16) {
        let mut status_counts = lock_unpoisoned(&self.inner.status_counts);
        *status_counts.entry(status).or_insert(0) += 1;
    }

    pub(crate) fn record_synthesized(&self, code: &str) {
        self.inner
            .synthesized_errors
            .fetch_add(1, Ordering::Relaxed);
        let mut error_counts = lock_unpoisoned(&self.inner.error_counts);
        *error_counts.entry(code.to_owned()).or_insert(0) += 1;
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.inner.requests.load(Ordering::Relaxed),
            attempts: self.inner.attempts.load(Ordering::Relaxed),
            method_override_retries: self.inner.method_override_retries.load(Ordering::Relaxed),
            body_strip_retries: self.inner.body_strip_retries.load(Ordering::Relaxed),
            synthesized_errors: self.inner.synthesized_errors.load(Ordering::Relaxed),
            in_flight: self.inner.in_flight.load(Ordering::Relaxed),
            status_counts: lock_unpoisoned(&self.inner.status_counts).clone(),
            error_counts: lock_unpoisoned(&self.inner.error_counts).clone(),
        }
    }
}

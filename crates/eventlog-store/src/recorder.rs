//! Partial-failure batch ingestion.
//!
//! [`BatchEventRecorder::record_events`] stores each event of a batch as
//! its own unit of work. A failing event is classified, reported in the
//! returned [`BatchReport`] and skipped; it never rolls back or blocks
//! the events around it.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::{EventBackend, ResolvedTypes};
use crate::error::{StoreError, StoreResult};
use crate::models::Event;
use crate::registry::TypeRegistry;

/// Why an event could not be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// An event with the same message id is already stored.
    Duplicate,
    /// Anything else.
    UnknownProblem,
}

impl FailureKind {
    /// Map a per-event error to its failure kind.
    pub fn classify(err: &StoreError) -> Self {
        match err {
            StoreError::Duplicate { .. } => Self::Duplicate,
            _ => Self::UnknownProblem,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate => f.write_str("duplicate"),
            Self::UnknownProblem => f.write_str("unknown problem"),
        }
    }
}

/// An event that was not stored, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub event: Event,
}

/// Outcome of one batch call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub attempted: usize,
    /// Failed events, in input order.
    pub failures: Vec<FailureRecord>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.attempted - self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Records batches of events, one transaction per event.
#[derive(Clone)]
pub struct BatchEventRecorder {
    registry: TypeRegistry,
    backend: Arc<dyn EventBackend>,
}

impl BatchEventRecorder {
    pub fn new(registry: TypeRegistry, backend: Arc<dyn EventBackend>) -> Self {
        Self { registry, backend }
    }

    /// Record `events` one after another.
    pub async fn record_events(&self, events: &[Event]) -> BatchReport {
        self.record_events_concurrent(events, 1).await
    }

    /// Record `events` with up to `concurrency` units in flight.
    ///
    /// Failures still come back in input order.
    pub async fn record_events_concurrent(&self, events: &[Event], concurrency: usize) -> BatchReport {
        let outcomes: Vec<Option<FailureRecord>> = stream::iter(events)
            .map(|event| self.record_isolated(event))
            .buffered(concurrency.max(1))
            .collect()
            .await;

        let report = BatchReport {
            attempted: events.len(),
            failures: outcomes.into_iter().flatten().collect(),
        };
        info!(
            attempted = report.attempted,
            succeeded = report.succeeded(),
            failed = report.failures.len(),
            "event batch recorded"
        );
        report
    }

    /// Run one unit of work; every error and panic becomes a failure record.
    async fn record_isolated(&self, event: &Event) -> Option<FailureRecord> {
        let outcome = AssertUnwindSafe(self.record_event(event)).catch_unwind().await;
        let kind = match outcome {
            Ok(Ok(_)) => return None,
            Ok(Err(err)) => {
                let kind = FailureKind::classify(&err);
                warn!(message_id = %event.message_id, %kind, %err, "failed to record event");
                kind
            }
            Err(_) => {
                warn!(message_id = %event.message_id, "panic while recording event");
                FailureKind::UnknownProblem
            }
        };
        Some(FailureRecord {
            kind,
            event: event.clone(),
        })
    }

    async fn record_event(&self, event: &Event) -> StoreResult<i64> {
        let event_type = self.registry.event_type(&event.event_type).await?;

        let mut trait_types = Vec::with_capacity(event.traits.len());
        for t in &event.traits {
            trait_types.push(self.registry.trait_type(&t.name, t.data_type()).await?);
        }

        let types = ResolvedTypes {
            event_type,
            trait_types,
        };
        self.backend.persist_event(event, &types).await
    }
}

// ── tests ────────────────────────────────────────────────────────────

//! The contract the registry and recorder need from a backing store.
//!
//! [`SqliteBackend`](crate::sqlite::SqliteBackend) is the production
//! implementation; tests substitute doubles to force failures and races.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::models::{Event, EventTypeRecord, TraitTypeRecord, TypeKey, TypeRecord};

/// Result of trying to insert a new type record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// This call inserted the record.
    Created(TypeRecord),
    /// The store's uniqueness constraint rejected the insert because a
    /// record for the key already exists.
    AlreadyExists,
}

/// Type records resolved for one event, in the event's trait order.
#[derive(Debug, Clone)]
pub struct ResolvedTypes {
    pub event_type: EventTypeRecord,
    pub trait_types: Vec<TraitTypeRecord>,
}

/// Storage operations used by [`TypeRegistry`](crate::registry::TypeRegistry)
/// and [`BatchEventRecorder`](crate::recorder::BatchEventRecorder).
#[async_trait]
pub trait EventBackend: Send + Sync {
    /// Look up the record for `key`. `None` when it does not exist yet.
    async fn find_type(&self, key: &TypeKey) -> StoreResult<Option<TypeRecord>>;

    /// Insert a record for `key`.
    ///
    /// A uniqueness conflict is reported as
    /// [`CreateOutcome::AlreadyExists`], not as an error.
    async fn create_type(&self, key: &TypeKey) -> StoreResult<CreateOutcome>;

    /// Persist `event` and its traits in one transaction, returning the
    /// new event id.
    ///
    /// `types.trait_types[i]` must belong to `event.traits[i]`.
    async fn persist_event(&self, event: &Event, types: &ResolvedTypes) -> StoreResult<i64>;
}

//! Get-or-create memoization of trait and event type identifiers.
//!
//! [`TypeRegistry`] maps a [`TypeKey`] to the store-assigned record for
//! that key. Lookups go to the [`RecencyCache`] first, then to the store;
//! a missing record is created on first use.
//!
//! Uniqueness is the store's job. Two callers can both miss and both try
//! to create the same key; the loser gets [`CreateOutcome::AlreadyExists`]
//! and re-reads the winner's record, so every caller converges on one id.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{CreateOutcome, EventBackend};
use crate::cache::RecencyCache;
use crate::error::{StoreError, StoreResult};
use crate::models::{DataType, EventTypeRecord, TraitTypeRecord, TypeKey, TypeRecord};

/// Cache shared by the registry, keyed by [`TypeKey::cache_key`].
pub type TypeCache = RecencyCache<String, TypeRecord>;

/// Resolves type keys to durable records, creating them on first use.
#[derive(Clone)]
pub struct TypeRegistry {
    backend: Arc<dyn EventBackend>,
    cache: Arc<TypeCache>,
    conflicts: Arc<AtomicU64>,
}

impl TypeRegistry {
    pub fn new(backend: Arc<dyn EventBackend>, cache: Arc<TypeCache>) -> Self {
        Self {
            backend,
            cache,
            conflicts: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Return the record for `key`, creating it if the store has none.
    ///
    /// Store errors other than a creation conflict are returned as-is and
    /// leave the cache untouched.
    pub async fn get_or_create(&self, key: &TypeKey) -> StoreResult<TypeRecord> {
        let cache_key = key.cache_key();
        if let Some(record) = self.cache.get(&cache_key) {
            return Ok(record);
        }

        if let Some(record) = self.backend.find_type(key).await? {
            self.cache.set(cache_key, record.clone());
            return Ok(record);
        }

        let record = match self.backend.create_type(key).await? {
            CreateOutcome::Created(record) => {
                debug!(%key, id = record.id(), "type created");
                record
            }
            CreateOutcome::AlreadyExists => {
                self.conflicts.fetch_add(1, Ordering::Relaxed);
                warn!(%key, "type created concurrently, re-reading");
                self.backend
                    .find_type(key)
                    .await?
                    .ok_or_else(|| StoreError::NotFound {
                        entity: "type record",
                        id: key.to_string(),
                    })?
            }
        };

        self.cache.set(cache_key, record.clone());
        Ok(record)
    }

    /// Trait type for `(name, data_type)`.
    pub async fn trait_type(&self, name: &str, data_type: DataType) -> StoreResult<TraitTypeRecord> {
        match self.get_or_create(&TypeKey::trait_type(name, data_type)).await? {
            TypeRecord::Trait(record) => Ok(record),
            TypeRecord::Event(record) => Err(StoreError::Corrupt(format!(
                "trait key {name} resolved to event type {}",
                record.id
            ))),
        }
    }

    /// Event type for `name`.
    pub async fn event_type(&self, name: &str) -> StoreResult<EventTypeRecord> {
        match self.get_or_create(&TypeKey::event_type(name)).await? {
            TypeRecord::Event(record) => Ok(record),
            TypeRecord::Trait(record) => Err(StoreError::Corrupt(format!(
                "event key {name} resolved to trait type {}",
                record.id
            ))),
        }
    }

    /// How many creations lost a race and fell back to re-reading.
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    pub fn cache(&self) -> &TypeCache {
        &self.cache
    }
}

// ── tests ────────────────────────────────────────────────────────────

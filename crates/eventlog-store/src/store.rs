//! The event store facade.
//!
//! [`EventStore`] is built once at startup and owns everything the
//! ingest and query paths share: the database handle, the type cache,
//! the registry and the batch recorder.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::backend::EventBackend;
use crate::cache::RecencyCache;
use crate::config::StoreConfig;
use crate::db::Database;
use crate::error::StoreResult;
use crate::models::{DataType, Event, Trait};
use crate::query::{self, EventFilter};
use crate::recorder::{BatchEventRecorder, BatchReport};
use crate::registry::TypeRegistry;
use crate::sqlite::SqliteBackend;

/// SQLite-backed event storage with memoized type resolution.
#[derive(Clone)]
pub struct EventStore {
    db: Database,
    registry: TypeRegistry,
    recorder: BatchEventRecorder,
    config: StoreConfig,
}

impl EventStore {
    /// Wrap an already-migrated database.
    pub fn new(db: Database, config: StoreConfig) -> StoreResult<Self> {
        let backend: Arc<dyn EventBackend> = Arc::new(SqliteBackend::new(db.clone()));
        let cache = Arc::new(
            RecencyCache::builder("type_registry")
                .max_size(config.cache_size)
                .build()?,
        );
        let cache_size = cache.max_size();
        let registry = TypeRegistry::new(Arc::clone(&backend), cache);
        let recorder = BatchEventRecorder::new(registry.clone(), backend);

        info!(
            cache_size,
            recorder_concurrency = config.recorder_concurrency,
            "event store ready"
        );

        Ok(Self {
            db,
            registry,
            recorder,
            config,
        })
    }

    /// Open the database at `path`, migrate it and build the store.
    pub async fn open(path: impl AsRef<Path> + Send + 'static, config: StoreConfig) -> StoreResult<Self> {
        let db = Database::open_and_migrate(path).await?;
        Self::new(db, config)
    }

    /// A migrated in-memory store.
    pub async fn open_in_memory(config: StoreConfig) -> StoreResult<Self> {
        let db = Database::open_in_memory()?;
        db.run_migrations().await?;
        Self::new(db, config)
    }

    /// Record a batch using the configured concurrency.
    ///
    /// Never fails as a whole; see [`BatchReport::failures`].
    pub async fn record_events(&self, events: &[Event]) -> BatchReport {
        self.recorder
            .record_events_concurrent(events, self.config.recorder_concurrency)
            .await
    }

    /// Record a batch with an explicit concurrency.
    pub async fn record_events_concurrent(&self, events: &[Event], concurrency: usize) -> BatchReport {
        self.recorder.record_events_concurrent(events, concurrency).await
    }

    #[instrument(skip(self))]
    pub async fn get_events(&self, filter: &EventFilter) -> StoreResult<Vec<Event>> {
        let filter = filter.clone();
        self.db
            .execute(move |conn| query::select_events(conn, &filter))
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_event_types(&self) -> StoreResult<Vec<String>> {
        self.db.execute(query::select_event_types).await
    }

    #[instrument(skip(self))]
    pub async fn get_trait_types(&self, event_type: &str) -> StoreResult<Vec<(String, DataType)>> {
        let event_type = event_type.to_string();
        self.db
            .execute(move |conn| query::select_trait_types(conn, &event_type))
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_traits(&self, event_type: &str, trait_name: Option<&str>) -> StoreResult<Vec<Trait>> {
        let event_type = event_type.to_string();
        let trait_name = trait_name.map(str::to_string);
        self.db
            .execute(move |conn| query::select_traits(conn, &event_type, trait_name.as_deref()))
            .await
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

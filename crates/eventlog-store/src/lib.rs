//! # eventlog-store
//!
//! Storage engine for eventlog.
//!
//! Events arrive in batches, each carrying a type name and a list of
//! typed traits. Every distinct event type and `(trait name, data type)`
//! pair gets a durable integer id the first time it is seen; a bounded
//! recency cache keeps the hot ids in process so steady-state ingest does
//! not round-trip to SQLite for them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  EventStore (facade, queries)           │
//! ├─────────────────────────────────────────┤
//! │  BatchEventRecorder (per-event units)   │
//! │  TypeRegistry (get-or-create)           │
//! │  RecencyCache (LRU, one mutex)          │
//! ├─────────────────────────────────────────┤
//! │  EventBackend ← SqliteBackend           │
//! │  Database (rusqlite WAL)                │
//! │  Migrations (versioned, transactional)  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use eventlog_store::{Event, EventStore, StoreConfig};
//!
//! let store = EventStore::open("data/events.db", StoreConfig::default()).await?;
//! let report = store.record_events(&events).await;
//! for failure in &report.failures {
//!     eprintln!("{}: {}", failure.kind, failure.event.message_id);
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod migration;
pub mod models;
pub mod query;
pub mod recorder;
pub mod registry;
pub mod sqlite;
pub mod store;

// ── re-exports ───────────────────────────────────────────────────────

pub use backend::{CreateOutcome, EventBackend, ResolvedTypes};
pub use cache::{CacheStats, RecencyCache, RecencyCacheBuilder};
pub use config::StoreConfig;
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use models::{
    DataType, Event, EventTypeRecord, Trait, TraitRow, TraitTypeRecord, TraitValue, TypeKey,
    TypeRecord,
};
pub use query::{EventFilter, TraitFilter};
pub use recorder::{BatchEventRecorder, BatchReport, FailureKind, FailureRecord};
pub use registry::{TypeCache, TypeRegistry};
pub use sqlite::SqliteBackend;
pub use store::EventStore;
